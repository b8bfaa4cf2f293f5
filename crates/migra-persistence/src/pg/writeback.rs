//! Write-back de respuestas resueltas sobre registros de dominio.
//!
//! Traduce respuestas de cuestionario (enlazadas o no a un gap resuelto) en
//! mutaciones tipadas sobre `assets`, con estas garantías:
//! - Toda escritura lleva predicados de tenant + engagement.
//! - Sólo se escriben columnas de la lista permitida (`AssetChanges`); los
//!   campos sin columna se agrupan en los canales laterales JSON.
//! - Los UPDATE van en lotes de tamaño fijo, todos dentro de la transacción
//!   del llamador; un lote fallido aborta la operación completa.
//! - Los alcances de cumplimiento se unen (unión de conjuntos) en una tabla
//!   aparte; re-aplicar las mismas respuestas nunca pierde alcances previos.
//!
//! Idempotencia: re-ejecutar con el mismo conjunto resuelto produce el mismo
//! estado final en campos no-compliance (last-write-wins por nombre
//! normalizado) y un conjunto de alcances igual o mayor (unión monótona).

use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;
use diesel::prelude::*;
use log::{debug, info};
use serde_json::{Map, Value};
use uuid::Uuid;

use migra_core::state::TenantScope;
use migra_domain::{as_text_list, first_number, flatten_text, normalize_field_name, FieldTarget, Gap,
                   QuestionnaireResponse, SideChannel};

use crate::error::WriteBackError;
use crate::schema::{asset_compliance_scopes, assets};

/// Payload de actualización tipado. Lista cerrada de columnas: un campo
/// `None` no se toca. Escribir un nombre de columna arbitrario no es
/// expresable con esta estructura.
#[derive(AsChangeset, Debug, Default, Clone, PartialEq)]
#[diesel(table_name = assets)]
pub struct AssetChanges {
    pub application_name: Option<String>,
    pub environment: Option<String>,
    pub criticality: Option<String>,
    pub business_owner: Option<String>,
    pub operating_system: Option<String>,
    pub cpu_cores: Option<i32>,
    pub memory_gb: Option<f64>,
    pub storage_gb: Option<f64>,
    pub monthly_cost: Option<f64>,
    pub dependencies: Option<Vec<String>>,
    pub technical_details: Option<Value>,
    pub custom_attributes: Option<Value>,
    pub updated_at: Option<chrono::DateTime<Utc>>,
}

impl AssetChanges {
    /// ¿Hay al menos una columna de datos por escribir? (`updated_at` no
    /// cuenta: sólo acompaña a cambios reales.)
    pub fn is_empty(&self) -> bool {
        self.application_name.is_none()
        && self.environment.is_none()
        && self.criticality.is_none()
        && self.business_owner.is_none()
        && self.operating_system.is_none()
        && self.cpu_cores.is_none()
        && self.memory_gb.is_none()
        && self.storage_gb.is_none()
        && self.monthly_cost.is_none()
        && self.dependencies.is_none()
        && self.technical_details.is_none()
        && self.custom_attributes.is_none()
    }
}

/// Resolución de registros objetivo dentro del alcance del tenant.
/// Abstraído para poder testear el armado del plan sin base de datos.
pub trait TargetIndex {
    fn contains(&self, id: Uuid) -> bool;
    fn by_name(&self, application_name: &str) -> Vec<Uuid>;
}

/// Índice en memoria, para tests y para armados de plan fuera de línea.
#[derive(Debug, Default)]
pub struct InMemoryTargetIndex {
    by_id: BTreeSet<Uuid>,
    by_name: BTreeMap<String, Vec<Uuid>>,
}

impl InMemoryTargetIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: Uuid, application_name: &str) {
        self.by_id.insert(id);
        self.by_name.entry(application_name.to_string()).or_default().push(id);
    }
}

impl TargetIndex for InMemoryTargetIndex {
    fn contains(&self, id: Uuid) -> bool {
        self.by_id.contains(&id)
    }

    fn by_name(&self, application_name: &str) -> Vec<Uuid> {
        self.by_name.get(application_name).cloned().unwrap_or_default()
    }
}

/// Plan de escritura ya resuelto: a quién, qué y con qué alcances.
#[derive(Debug, Default)]
pub struct WriteBackPlan {
    pub targets: Vec<Uuid>,
    pub changes: AssetChanges,
    pub compliance_scopes: Vec<String>,
    /// Respuestas descartadas (sin valor utilizable o numérico imparseable).
    pub skipped: usize,
}

/// Resultado observable de una aplicación de write-back.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct WriteBackReport {
    pub updated_assets: usize,
    pub applied_fields: Vec<String>,
    pub compliance_scopes_added: usize,
    pub skipped_responses: usize,
}

/// Une respuestas enlazadas a gaps resueltos con respuestas huérfanas que
/// traen valor (manejo defensivo de datos parcialmente vinculados).
fn collect_pairs<'a>(gaps: &'a [Gap],
                     responses: &'a [QuestionnaireResponse])
                     -> Vec<(&'a QuestionnaireResponse, Option<&'a Gap>)> {
    let resolved: BTreeMap<Uuid, &Gap> = gaps.iter().filter(|g| g.is_resolved()).map(|g| (g.id(), g)).collect();

    responses.iter()
             .filter(|r| r.has_value())
             .filter_map(|r| match r.gap_id() {
                 Some(gid) => resolved.get(&gid).map(|g| (r, Some(*g))),
                 None => Some((r, None)),
             })
             .collect()
}

/// Construye el plan de escritura sin tocar la base: normaliza nombres,
/// resuelve objetivos en dos niveles (pista explícita de ID, luego nombre
/// legible) y arma el payload tipado con last-write-wins por campo.
///
/// # Errores
/// `WriteBackError::UnresolvedTargets` cuando hay respuestas utilizables
/// pero ninguna pista resuelve al menos un registro: abortar entero antes
/// que arriesgar una actualización masiva sin alcance.
pub fn build_plan(gaps: &[Gap],
                  responses: &[QuestionnaireResponse],
                  index: &dyn TargetIndex)
                  -> Result<WriteBackPlan, WriteBackError> {
    let pairs = collect_pairs(gaps, responses);
    if pairs.is_empty() {
        return Ok(WriteBackPlan::default());
    }

    let mut targets: BTreeSet<Uuid> = BTreeSet::new();
    let mut changes = AssetChanges::default();
    let mut compliance: BTreeSet<String> = BTreeSet::new();
    let mut technical: Map<String, Value> = Map::new();
    let mut custom: Map<String, Value> = Map::new();
    let mut skipped = 0usize;

    for (response, gap) in &pairs {
        let field = normalize_field_name(response.field_name());

        // Nivel 1: pista explícita de ID (prefijo compuesto, respuesta o
        // metadata del gap). Nivel 2: nombre legible dentro del alcance.
        let id_hint = field.record_hint
                           .or_else(|| response.asset_hint())
                           .or_else(|| gap.and_then(|g| g.asset_hint()));
        match id_hint.filter(|id| index.contains(*id)) {
            Some(id) => {
                targets.insert(id);
            }
            None => {
                if let Some(name) = gap.and_then(|g| g.application_hint()) {
                    targets.extend(index.by_name(name));
                }
            }
        }

        let value = response.value();
        match field.target {
            FieldTarget::Environment => assign_text(&mut changes.environment, value, &mut skipped),
            FieldTarget::Criticality => assign_text(&mut changes.criticality, value, &mut skipped),
            FieldTarget::BusinessOwner => assign_text(&mut changes.business_owner, value, &mut skipped),
            FieldTarget::ApplicationName => assign_text(&mut changes.application_name, value, &mut skipped),
            FieldTarget::OperatingSystem => assign_text(&mut changes.operating_system, value, &mut skipped),
            FieldTarget::CpuCores => match first_number(value) {
                Some(n) => changes.cpu_cores = Some(n as i32),
                None => skipped += 1,
            },
            FieldTarget::MemoryGb => assign_number(&mut changes.memory_gb, value, &mut skipped),
            FieldTarget::StorageGb => assign_number(&mut changes.storage_gb, value, &mut skipped),
            FieldTarget::MonthlyCost => assign_number(&mut changes.monthly_cost, value, &mut skipped),
            // Columna tipada como lista: se preserva la estructura.
            FieldTarget::Dependencies => changes.dependencies = Some(as_text_list(value)),
            FieldTarget::ComplianceScope => compliance.extend(as_text_list(value)),
            FieldTarget::Side(SideChannel::TechnicalDetails) => {
                technical.insert(field.name.clone(), value.clone());
            }
            FieldTarget::Side(SideChannel::CustomAttributes) => {
                custom.insert(field.name.clone(), value.clone());
            }
        }
    }

    if targets.is_empty() {
        return Err(WriteBackError::UnresolvedTargets);
    }

    if !technical.is_empty() {
        changes.technical_details = Some(Value::Object(technical));
    }
    if !custom.is_empty() {
        changes.custom_attributes = Some(Value::Object(custom));
    }
    if !changes.is_empty() {
        changes.updated_at = Some(Utc::now());
    }

    Ok(WriteBackPlan { targets: targets.into_iter().collect(),
                       changes,
                       compliance_scopes: compliance.into_iter().collect(),
                       skipped })
}

fn assign_text(slot: &mut Option<String>, value: &Value, skipped: &mut usize) {
    match flatten_text(value) {
        Some(text) => *slot = Some(text),
        None => *skipped += 1,
    }
}

fn assign_number(slot: &mut Option<f64>, value: &Value, skipped: &mut usize) {
    match first_number(value) {
        Some(n) => *slot = Some(n),
        None => *skipped += 1,
    }
}

/// Carga el índice de objetivos directamente del alcance en la base.
pub fn load_target_index(conn: &mut PgConnection,
                         scope: &TenantScope)
                         -> Result<InMemoryTargetIndex, WriteBackError> {
    let rows: Vec<(Uuid, String)> = assets::table.filter(assets::tenant_id.eq(scope.tenant_id))
                                                 .filter(assets::engagement_id.eq(scope.engagement_id))
                                                 .select((assets::id, assets::application_name))
                                                 .load(conn)?;
    let mut index = InMemoryTargetIndex::new();
    for (id, name) in rows {
        index.insert(id, &name);
    }
    Ok(index)
}

/// Aplica el write-back DENTRO de la transacción del llamador: los lotes de
/// UPDATE y la unión de alcances de cumplimiento nunca comprometen por
/// separado. Cualquier fallo de lote se propaga y revierte todo.
pub fn apply_write_back(conn: &mut PgConnection,
                        scope: &TenantScope,
                        gaps: &[Gap],
                        responses: &[QuestionnaireResponse],
                        batch_size: usize)
                        -> Result<WriteBackReport, WriteBackError> {
    if scope.tenant_id.is_nil() || scope.engagement_id.is_nil() {
        return Err(WriteBackError::MissingScope);
    }

    let index = load_target_index(conn, scope)?;
    let plan = build_plan(gaps, responses, &index)?;
    if plan.targets.is_empty() {
        return Ok(WriteBackReport { skipped_responses: plan.skipped, ..WriteBackReport::default() });
    }

    let batch_size = batch_size.max(1);
    let mut updated = 0usize;
    if !plan.changes.is_empty() {
        for batch in plan.targets.chunks(batch_size) {
            debug!("write-back batch de {} registros", batch.len());
            updated += diesel::update(assets::table.filter(assets::id.eq_any(batch))
                                                   .filter(assets::tenant_id.eq(scope.tenant_id))
                                                   .filter(assets::engagement_id.eq(scope.engagement_id)))
                .set(&plan.changes)
                .execute(conn)?;
        }
    }

    // Unión monótona: filas existentes se conservan tal cual.
    let mut scopes_added = 0usize;
    for asset_id in &plan.targets {
        for scope_value in &plan.compliance_scopes {
            scopes_added +=
                diesel::insert_into(asset_compliance_scopes::table)
                    .values((asset_compliance_scopes::asset_id.eq(asset_id),
                             asset_compliance_scopes::scope.eq(scope_value)))
                    .on_conflict_do_nothing()
                    .execute(conn)?;
        }
    }

    let report = WriteBackReport { updated_assets: updated,
                                   applied_fields: applied_field_names(&plan.changes),
                                   compliance_scopes_added: scopes_added,
                                   skipped_responses: plan.skipped };
    info!("write-back aplicado: {} assets, {} alcances nuevos", report.updated_assets,
          report.compliance_scopes_added);
    Ok(report)
}

fn applied_field_names(changes: &AssetChanges) -> Vec<String> {
    let mut out = vec![];
    let mut push = |cond: bool, name: &str| {
        if cond {
            out.push(name.to_string());
        }
    };
    push(changes.application_name.is_some(), "application_name");
    push(changes.environment.is_some(), "environment");
    push(changes.criticality.is_some(), "criticality");
    push(changes.business_owner.is_some(), "business_owner");
    push(changes.operating_system.is_some(), "operating_system");
    push(changes.cpu_cores.is_some(), "cpu_cores");
    push(changes.memory_gb.is_some(), "memory_gb");
    push(changes.storage_gb.is_some(), "storage_gb");
    push(changes.monthly_cost.is_some(), "monthly_cost");
    push(changes.dependencies.is_some(), "dependencies");
    push(changes.technical_details.is_some(), "technical_details");
    push(changes.custom_attributes.is_some(), "custom_attributes");
    out
}

/// Conveniencia para llamadores sin transacción propia: abre una de
/// lectura-escritura y aplica el write-back completo dentro de ella.
pub fn write_back_transactional(conn: &mut PgConnection,
                                scope: &TenantScope,
                                gaps: &[Gap],
                                responses: &[QuestionnaireResponse],
                                batch_size: usize)
                                -> Result<WriteBackReport, WriteBackError> {
    conn.build_transaction()
        .read_write()
        .run(|conn| apply_write_back(conn, scope, gaps, responses, batch_size))
}

/// Fila para insertar en `assets` (seed de tests de integración y tooling).
#[derive(Insertable, Debug)]
#[diesel(table_name = assets)]
pub struct NewAssetRow<'a> {
    pub id: &'a Uuid,
    pub tenant_id: &'a Uuid,
    pub engagement_id: &'a Uuid,
    pub application_name: &'a str,
}

pub fn insert_asset(conn: &mut PgConnection, row: &NewAssetRow<'_>) -> Result<(), WriteBackError> {
    diesel::insert_into(assets::table).values(row).execute(conn)?;
    Ok(())
}

/// Alcances de cumplimiento registrados para un asset, ordenados.
pub fn compliance_scopes_for(conn: &mut PgConnection, asset_id: Uuid) -> Result<Vec<String>, WriteBackError> {
    let rows: Vec<String> =
        asset_compliance_scopes::table.filter(asset_compliance_scopes::asset_id.eq(asset_id))
                                      .select(asset_compliance_scopes::scope)
                                      .order(asset_compliance_scopes::scope.asc())
                                      .load(conn)?;
    Ok(rows)
}
