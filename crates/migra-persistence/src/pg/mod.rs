//! Implementaciones Postgres (Diesel) de los traits del core.
//!
//! Objetivo del módulo:
//! - Persistencia durable del log de eventos con paridad 1:1 respecto al
//!   backend en memoria: el replay reconstruye el mismo estado y los mismos
//!   fingerprints.
//! - EventStore append-only con orden total por `seq` (BIGSERIAL), sin
//!   updates ni deletes.
//! - Inserción de la fila de checkpoint dentro de la MISMA transacción que su
//!   evento `CheckpointSaved`, y de la fila de auditoría de error junto a
//!   cada `PhaseFailed`.
//! - Manejo de errores transitorios con reintento y backoff en `append` y
//!   `list`.
//! - `PgFlowRepository` delega el replay a la implementación InMemory para
//!   asegurar paridad exacta.

pub mod writeback;

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::r2d2::{self, ConnectionManager};
use serde_json::Value;
use uuid::Uuid;

use log::{debug, error, warn};
use migra_core::errors::{classify_error, ErrorClass};
use migra_core::spec::FlowTypeSpec;
use migra_core::state::FlowInstance;
use migra_core::{EventStore, FlowEvent, FlowEventKind, FlowRepository, InMemoryFlowRepository};

use crate::error::PersistenceError;
use crate::migrations::run_pending_migrations;
use crate::schema::{flow_checkpoints, flow_event_log, flow_execution_errors};

/// Alias de tipo para el pool r2d2 de conexiones Postgres.
pub type PgPool = r2d2::Pool<ConnectionManager<PgConnection>>;

/// Proveedor abstracto de conexiones.
///
/// Permite inyectar un pool real (producción/tests de integración) o
/// simular en tests unitarios sin acoplar a r2d2. Debe devolver una conexión
/// válida o `PersistenceError::TransientIo` en caso de error.
pub trait ConnectionProvider: Send + Sync + 'static {
    fn connection(&self) -> Result<r2d2::PooledConnection<ConnectionManager<PgConnection>>, PersistenceError>;
}

/// Implementación de provider respaldada por un `PgPool`.
pub struct PoolProvider {
    pub pool: PgPool,
}

impl ConnectionProvider for PoolProvider {
    fn connection(&self) -> Result<r2d2::PooledConnection<ConnectionManager<PgConnection>>, PersistenceError> {
        self.pool
            .get()
            .map_err(|e| PersistenceError::TransientIo(format!("pool error: {e}")))
    }
}

/// Fila para insertar en `flow_event_log`. Se inserta siempre dentro de una
/// transacción Diesel (`build_transaction().read_write()`), devolviendo
/// `seq` y `ts` vía `RETURNING`.
#[derive(Insertable, Debug)]
#[diesel(table_name = flow_event_log)]
pub struct NewEventRow<'a> {
    pub flow_id: &'a Uuid,
    pub event_type: &'a str,
    pub payload: &'a Value,
}

/// Fila mapeada de `flow_event_log` para lecturas.
#[derive(Queryable, Debug)]
pub struct EventRow {
    pub seq: i64,
    pub flow_id: Uuid,
    pub ts: DateTime<Utc>,
    pub event_type: String,
    pub payload: Value,
}

/// Fila para insertar en `flow_checkpoints`, referenciando el `seq` del
/// evento `CheckpointSaved` que la produjo.
#[derive(Insertable, Debug)]
#[diesel(table_name = flow_checkpoints)]
pub struct NewCheckpointRow<'a> {
    pub flow_id: &'a Uuid,
    pub phase: &'a str,
    pub data: &'a Value,
    pub progress: f64,
    pub can_resume: bool,
    pub produced_in_seq: i64,
}

/// Fila para insertar en `flow_execution_errors`.
#[derive(Insertable, Debug)]
#[diesel(table_name = flow_execution_errors)]
pub struct NewErrorRow<'a> {
    pub flow_id: &'a Uuid,
    pub phase: &'a str,
    pub attempt_number: i32,
    pub error_class: &'a str,
    pub details: Option<&'a Value>,
}

/// Fila mapeada de `flow_execution_errors` para lecturas.
#[derive(Queryable, Debug)]
pub struct ErrorRow {
    pub id: i64,
    pub flow_id: Uuid,
    pub phase: String,
    pub attempt_number: i32,
    pub error_class: String,
    pub details: Option<Value>,
    pub ts: DateTime<Utc>,
}

/// Determina si un error es transitorio (recomendado reintentar con backoff).
fn is_retryable(e: &PersistenceError) -> bool {
    match e {
        PersistenceError::SerializationConflict => true,
        PersistenceError::TransientIo(_) => true,
        // Algunos mensajes (según driver/pg) llegan como Unknown con texto.
        // Best-effort sin acoplar a SQLSTATE.
        PersistenceError::Unknown(msg) => {
            let m = msg.to_lowercase();
            m.contains("deadlock detected")
            || m.contains("could not serialize access due to concurrent update")
            || m.contains("terminating connection due to administrator command")
            || m.contains("connection closed")
            || m.contains("connection refused")
            || m.contains("timeout")
        }
        _ => false,
    }
}

/// Retry simple con backoff lineal corto (hasta 3 intentos: 15/30/45 ms).
/// No altera semántica de negocio; sólo repite la unidad de trabajo `f`.
fn with_retry<F, T>(mut f: F) -> Result<T, PersistenceError>
    where F: FnMut() -> Result<T, PersistenceError>
{
    let mut attempts = 0;
    loop {
        match f() {
            Err(e) if is_retryable(&e) && attempts < 3 => {
                let delay_ms = 15 * ((attempts + 1) as u64);
                warn!("retryable error (attempt {}): {:?} -> sleeping {}ms",
                      attempts + 1,
                      e,
                      delay_ms);
                std::thread::sleep(std::time::Duration::from_millis(delay_ms));
                attempts += 1;
            }
            r => return r,
        }
    }
}

// SERIALIZACIÓN: guardamos el enum completo como JSON (payload), y además
// persistimos `event_type` (minúsculas) para cumplir constraint y facilitar
// consultas.
fn serialize_full_enum(kind: &FlowEventKind) -> Value {
    serde_json::to_value(kind).expect("serialize FlowEventKind")
}

/// Mapea la variante del enum a un string en minúsculas, estable en el tiempo.
fn event_type_for(kind: &FlowEventKind) -> &'static str {
    match kind {
        FlowEventKind::FlowInitialized { .. } => "flowinitialized",
        FlowEventKind::PhaseValidationFailed { .. } => "phasevalidationfailed",
        FlowEventKind::PhaseStarted { .. } => "phasestarted",
        FlowEventKind::PhaseFinished { .. } => "phasefinished",
        FlowEventKind::PhaseFailed { .. } => "phasefailed",
        FlowEventKind::PhaseSkipped { .. } => "phaseskipped",
        FlowEventKind::RetryScheduled { .. } => "retryscheduled",
        FlowEventKind::CheckpointSaved { .. } => "checkpointsaved",
        FlowEventKind::InputProvided { .. } => "inputprovided",
        FlowEventKind::FlowPaused { .. } => "flowpaused",
        FlowEventKind::FlowResumed { .. } => "flowresumed",
        FlowEventKind::RolledBack { .. } => "rolledback",
        FlowEventKind::FlowFailed { .. } => "flowfailed",
        FlowEventKind::FlowCompleted { .. } => "flowcompleted",
    }
}

/// Deserializa una `EventRow` a `FlowEvent` usando el JSON completo del enum
/// almacenado en `payload`. Si el JSON no es válido devuelve `None`.
fn deserialize_full_enum(row: EventRow) -> Option<FlowEvent> {
    let kind: FlowEventKind = serde_json::from_value(row.payload).ok()?;
    Some(FlowEvent { seq: row.seq as u64,
                     flow_id: row.flow_id,
                     kind,
                     ts: row.ts })
}

/// Implementación Postgres de `EventStore` (append-only).
pub struct PgEventStore<P: ConnectionProvider> {
    pub provider: P,
}

impl<P: ConnectionProvider> PgEventStore<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// Lista errores de ejecución para un flow_id, ordenados por ts.
    pub fn list_errors(&self, flow_id: Uuid) -> Vec<ErrorRow> {
        debug!("list_errors:start flow_id={flow_id}");
        let rows: Vec<ErrorRow> =
            with_retry(|| {
                let mut conn = self.provider.connection()?;
                flow_execution_errors::table.filter(flow_execution_errors::flow_id.eq(flow_id))
                                            .order(flow_execution_errors::ts.asc())
                                            .load(&mut conn)
                                            .map_err(PersistenceError::from)
            }).unwrap_or_else(|e| {
                  error!("list_errors:load error flow_id={flow_id} err={:?}", e);
                  vec![]
              });
        debug!("list_errors:done flow_id={flow_id} count={}", rows.len());
        rows
    }
}

impl<P: ConnectionProvider> EventStore for PgEventStore<P> {
    fn append_kind(&mut self, flow_id: Uuid, kind: FlowEventKind) -> FlowEvent {
        debug!("append_kind:start flow_id={flow_id} type={}", event_type_for(&kind));
        let event_type = event_type_for(&kind);
        let payload = serialize_full_enum(&kind);
        // Transacción atómica: evento más filas derivadas (checkpoint,
        // auditoría de error). Si falla cualquiera, se revierte todo.
        let inserted: (i64, DateTime<Utc>) = with_retry(|| {
            let mut conn = self.provider.connection()?;
            conn.build_transaction()
                .read_write()
                .run(|tx_conn| {
                    let (seq, ts): (i64, DateTime<Utc>) = diesel::insert_into(flow_event_log::table)
                        .values(NewEventRow { flow_id: &flow_id, event_type, payload: &payload })
                        .returning((flow_event_log::seq, flow_event_log::ts))
                        .get_result(tx_conn)?;

                    if let FlowEventKind::CheckpointSaved { checkpoint, .. } = &kind {
                        let row = NewCheckpointRow { flow_id: &flow_id,
                                                     phase: &checkpoint.phase,
                                                     data: &checkpoint.data,
                                                     progress: checkpoint.progress,
                                                     can_resume: checkpoint.can_resume,
                                                     produced_in_seq: seq };
                        diesel::insert_into(flow_checkpoints::table).values(&row).execute(tx_conn)?;
                    }

                    if let FlowEventKind::PhaseFailed { phase, attempt, error, .. } = &kind {
                        let error_class = match classify_error(error) {
                            ErrorClass::Validation => "validation",
                            ErrorClass::Transient => "transient",
                            ErrorClass::Permanent => "permanent",
                            ErrorClass::Runtime => "runtime",
                        };
                        let details = serde_json::to_value(error).ok();
                        let row = NewErrorRow { flow_id: &flow_id,
                                                phase,
                                                attempt_number: *attempt as i32,
                                                error_class,
                                                details: details.as_ref() };
                        diesel::insert_into(flow_execution_errors::table).values(&row).execute(tx_conn)?;
                    }

                    Ok::<(i64, DateTime<Utc>), diesel::result::Error>((seq, ts))
                })
                .map_err(PersistenceError::from)
        })
        .expect("insert event (with derived rows)");

        let ev = FlowEvent { seq: inserted.0 as u64,
                             flow_id,
                             kind,
                             ts: inserted.1 };
        debug!("append_kind:done flow_id={flow_id} seq={}", ev.seq);
        ev
    }

    fn list(&self, flow_id: Uuid) -> Vec<FlowEvent> {
        debug!("list:start flow_id={flow_id}");
        let rows: Vec<EventRow> = with_retry(|| {
                                      let mut conn = self.provider.connection()?;
                                      flow_event_log::table.filter(flow_event_log::flow_id.eq(flow_id))
                                                           .order(flow_event_log::seq.asc())
                                                           .load(&mut conn)
                                                           .map_err(PersistenceError::from)
                                  }).unwrap_or_else(|e| {
                                        error!("list:load error flow_id={flow_id} err={:?}", e);
                                        panic!("diesel load error: {e}");
                                    });
        let events: Vec<FlowEvent> = rows.into_iter().filter_map(deserialize_full_enum).collect();
        debug!("list:done flow_id={flow_id} count={}", events.len());
        events
    }
}

/// Implementación Postgres de `FlowRepository` delegada a la versión
/// InMemory, para asegurar paridad exacta de reglas de replay con el core.
pub struct PgFlowRepository;

impl PgFlowRepository {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PgFlowRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl FlowRepository for PgFlowRepository {
    fn load(&self, flow_id: Uuid, events: &[FlowEvent], spec: &FlowTypeSpec) -> FlowInstance {
        InMemoryFlowRepository::new().load(flow_id, events, spec)
    }
}

/// Construye un pool Postgres r2d2 a partir de URL.
///
/// - Valida y ajusta tamaños (si `min_size > max_size`, usa `min = max`).
/// - Ejecuta migraciones inmediatamente tras el primer `get()`.
pub fn build_pool(database_url: &str, min_size: u32, max_size: u32) -> Result<PgPool, PersistenceError> {
    let validated_min = if min_size == 0 { 1 } else { min_size };
    let validated_max = if max_size == 0 { 1 } else { max_size };
    if validated_min > validated_max {
        eprintln!("WARN: min_size > max_size ({} > {}), ajustando min=max",
                  validated_min, validated_max);
    }
    let final_min = validated_min.min(validated_max);
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    let pool = r2d2::Pool::builder().min_idle(Some(final_min))
                                    .max_size(validated_max)
                                    .build(manager)
                                    .map_err(|e| PersistenceError::TransientIo(format!("pool build: {e}")))?;
    {
        let mut conn = pool.get()
                           .map_err(|e| PersistenceError::TransientIo(format!("pool get for migrations: {e}")))?;
        run_pending_migrations(&mut conn)?;
    }
    Ok(pool)
}

/// Helper de desarrollo: carga `.env`, lee configuración y construye un pool
/// ya migrado.
pub fn build_dev_pool_from_env() -> Result<PgPool, PersistenceError> {
    crate::config::init_dotenv();
    let cfg = crate::config::DbConfig::from_env();
    build_pool(&cfg.url, cfg.min_connections, cfg.max_connections)
}
