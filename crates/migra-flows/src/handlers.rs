//! Handlers de fase registrados por nombre.
//!
//! Cada handler recibe el estado de trabajo del flujo como payload y
//! devuelve un delta JSON que el motor fusiona. Los fallos viajan como
//! `HandlerFailure` tipado; ningún pánico cruza esta frontera.

use std::collections::HashMap;

use log::{info, warn};
use rayon::prelude::*;
use serde_json::{json, Map, Value};

use migra_core::errors::{classify_error, ErrorClass, FlowEngineError, HandlerFailure};
use migra_core::registry::{ErrorDecision, ErrorHandler, HandlerContext, PhaseHandler, RecoveryAction};

/// Campos núcleo cuya ausencia en un registro recolectado constituye un gap.
const CORE_FIELDS: &[&str] = &["environment", "criticality", "business_owner", "operating_system"];

/// Detecta plataformas: cruza las pistas de infraestructura del estado con
/// el catálogo de plataformas conocidas de la configuración.
pub struct DetectPlatformsHandler;

impl PhaseHandler for DetectPlatformsHandler {
    fn handle(&self, ctx: &HandlerContext, payload: &Value) -> Result<Value, HandlerFailure> {
        let known: Vec<&str> = payload.get("known_platforms")
                                      .and_then(Value::as_array)
                                      .map(|a| a.iter().filter_map(Value::as_str).collect())
                                      .unwrap_or_else(|| vec!["vmware", "aws", "azure", "gcp", "hyperv"]);
        let hints: Vec<&str> = payload.get("platform_hints")
                                      .and_then(Value::as_array)
                                      .map(|a| a.iter().filter_map(Value::as_str).collect())
                                      .unwrap_or_default();

        let detected: Vec<&str> = hints.iter().copied().filter(|h| known.contains(h)).collect();
        if detected.is_empty() {
            return Err(HandlerFailure::Permanent("ninguna pista de plataforma coincide con el catálogo conocido".to_string()));
        }
        info!("flow {}: {} plataformas detectadas", ctx.flow_id, detected.len());
        Ok(json!({ "detected_platforms": detected }))
    }
}

/// Recolecta datos de cada plataforma detectada en paralelo (sub-unidades
/// dentro de una sola fase). Las plataformas sin fuente se contabilizan
/// como fallos parciales; si todas fallan, la fase falla transitoria.
pub struct CollectPlatformDataHandler;

impl PhaseHandler for CollectPlatformDataHandler {
    fn handle(&self, ctx: &HandlerContext, payload: &Value) -> Result<Value, HandlerFailure> {
        let platforms: Vec<String> = payload.get("detected_platforms")
                                            .and_then(Value::as_array)
                                            .map(|a| {
                                                a.iter()
                                                 .filter_map(Value::as_str)
                                                 .map(str::to_string)
                                                 .collect()
                                            })
                                            .unwrap_or_default();
        let sources = payload.get("platform_data_sources").and_then(Value::as_object).cloned().unwrap_or_default();

        // Sub-unidades paralelas: todas deben completar o quedar
        // contabilizadas como fallo parcial antes de los post-handlers.
        let results: Vec<(String, Result<(Value, f64), String>)> =
            platforms.par_iter()
                     .map(|platform| {
                         let outcome = match sources.get(platform) {
                             Some(src) => {
                                 let records = src.get("records").cloned().unwrap_or_else(|| json!([]));
                                 let quality = src.get("quality").and_then(Value::as_f64).unwrap_or(0.0);
                                 Ok((records, quality))
                             }
                             None => Err(format!("sin fuente de datos para {platform}")),
                         };
                         (platform.clone(), outcome)
                     })
                     .collect();

        let mut collected = Map::new();
        let mut scores = Map::new();
        let mut failures = vec![];
        for (platform, outcome) in results {
            match outcome {
                Ok((records, quality)) => {
                    collected.insert(platform.clone(), records);
                    scores.insert(platform, json!(quality));
                }
                Err(reason) => {
                    warn!("flow {}: fallo parcial de recolección: {reason}", ctx.flow_id);
                    failures.push(json!({ "platform": platform, "reason": reason }));
                }
            }
        }

        if collected.is_empty() {
            return Err(HandlerFailure::Transient("todas las plataformas fallaron al recolectar".to_string()));
        }
        Ok(json!({
            "collected_data": Value::Object(collected),
            "quality_scores": Value::Object(scores),
            "collection_failures": failures,
        }))
    }
}

/// Analiza cobertura: cada campo núcleo ausente en un registro recolectado
/// produce un gap con pistas para localizar el registro de dominio.
pub struct AnalyzeGapsHandler;

impl PhaseHandler for AnalyzeGapsHandler {
    fn handle(&self, _ctx: &HandlerContext, payload: &Value) -> Result<Value, HandlerFailure> {
        let collected = payload.get("collected_data")
                               .and_then(Value::as_object)
                               .ok_or_else(|| HandlerFailure::Permanent("no hay datos recolectados para analizar".to_string()))?;

        let mut gaps = vec![];
        for records in collected.values() {
            let Some(records) = records.as_array() else { continue };
            for record in records {
                let app = record.get("application_name").and_then(Value::as_str).unwrap_or("unknown");
                for field in CORE_FIELDS {
                    let missing = match record.get(*field) {
                        None | Some(Value::Null) => true,
                        Some(Value::String(s)) => s.trim().is_empty(),
                        _ => false,
                    };
                    if missing {
                        let priority = if *field == "criticality" { "high" } else { "medium" };
                        gaps.push(json!({
                            "field_name": field,
                            "category": "coverage",
                            "priority": priority,
                            "application_name": app,
                        }));
                    }
                }
            }
        }

        let gap_count = gaps.len();
        Ok(json!({ "identified_gaps": gaps, "gap_count": gap_count }))
    }
}

/// Agrupa los gaps en un cuestionario ordenado por prioridad.
pub struct PrepareQuestionnaireHandler;

impl PhaseHandler for PrepareQuestionnaireHandler {
    fn handle(&self, _ctx: &HandlerContext, payload: &Value) -> Result<Value, HandlerFailure> {
        let gaps = payload.get("identified_gaps").and_then(Value::as_array).cloned().unwrap_or_default();

        let mut questions: Vec<Value> = gaps.iter()
                                            .map(|g| {
                                                let field = g.get("field_name").and_then(Value::as_str).unwrap_or("");
                                                let app = g.get("application_name").and_then(Value::as_str).unwrap_or("");
                                                json!({
                                                    "field_name": field,
                                                    "application_name": app,
                                                    "priority": g.get("priority").cloned().unwrap_or(json!("medium")),
                                                    "prompt": format!("valor de {field} para {app}"),
                                                })
                                            })
                                            .collect();
        // "high" antes que "medium" antes que "low"
        questions.sort_by_key(|q| match q.get("priority").and_then(Value::as_str) {
            Some("critical") => 0,
            Some("high") => 1,
            Some("medium") => 2,
            _ => 3,
        });

        Ok(json!({ "questionnaire": { "questions": questions } }))
    }
}

/// Ingiere respuestas manuales aportadas fuera de banda y calcula la tasa
/// de resolución respecto al cuestionario vigente.
pub struct IngestResponsesHandler;

impl PhaseHandler for IngestResponsesHandler {
    fn handle(&self, _ctx: &HandlerContext, payload: &Value) -> Result<Value, HandlerFailure> {
        let responses = payload.get("manual_responses").and_then(Value::as_array).cloned().unwrap_or_default();
        let question_count = payload.pointer("/questionnaire/questions")
                                    .and_then(Value::as_array)
                                    .map(Vec::len)
                                    .unwrap_or(0);

        let resolved: Vec<Value> = responses.into_iter()
                                            .filter(|r| match r.get("value") {
                                                None | Some(Value::Null) => false,
                                                Some(Value::String(s)) => !s.trim().is_empty(),
                                                Some(_) => true,
                                            })
                                            .collect();
        let rate = if question_count == 0 {
            1.0
        } else {
            (resolved.len() as f64 / question_count as f64).min(1.0)
        };

        Ok(json!({ "resolved_responses": resolved, "resolution_rate": rate }))
    }
}

/// Sintetiza el resultado del flujo en un resumen de evaluación.
pub struct SynthesizeHandler;

impl PhaseHandler for SynthesizeHandler {
    fn handle(&self, _ctx: &HandlerContext, payload: &Value) -> Result<Value, HandlerFailure> {
        let platforms = payload.get("detected_platforms").and_then(Value::as_array).map(Vec::len).unwrap_or(0);
        let applications: usize = payload.get("collected_data")
                                         .and_then(Value::as_object)
                                         .map(|m| {
                                             m.values()
                                              .filter_map(Value::as_array)
                                              .map(Vec::len)
                                              .sum()
                                         })
                                         .unwrap_or(0);
        let gap_count = payload.get("gap_count").and_then(Value::as_u64).unwrap_or(0);
        let resolved = payload.get("resolved_responses").and_then(Value::as_array).map(Vec::len).unwrap_or(0);
        let rate = payload.get("resolution_rate").and_then(Value::as_f64).unwrap_or(0.0);

        Ok(json!({
            "assessment_summary": {
                "platforms": platforms,
                "applications": applications,
                "gap_count": gap_count,
                "resolved_count": resolved,
                "resolution_rate": rate,
            }
        }))
    }
}

/// Handler de inicialización: siembra la configuración visible del flujo en
/// el estado antes de la primera fase.
pub struct InitAssessmentHandler;

impl PhaseHandler for InitAssessmentHandler {
    fn handle(&self, _ctx: &HandlerContext, payload: &Value) -> Result<Value, HandlerFailure> {
        let tier = payload.get("automation_tier").cloned().unwrap_or(json!(2));
        Ok(json!({ "automation_tier": tier }))
    }
}

/// Handler de finalización: marca el cierre observable del flujo.
pub struct FinalizeAssessmentHandler;

impl PhaseHandler for FinalizeAssessmentHandler {
    fn handle(&self, ctx: &HandlerContext, _payload: &Value) -> Result<Value, HandlerFailure> {
        info!("flow {}: finalizado", ctx.flow_id);
        Ok(json!({ "finalized": true }))
    }
}

/// Handler genérico de plan de trabajo para los flujos simples (planning,
/// execution, modernization, etc.).
pub struct CompileWorkplanHandler;

impl PhaseHandler for CompileWorkplanHandler {
    fn handle(&self, ctx: &HandlerContext, payload: &Value) -> Result<Value, HandlerFailure> {
        let inputs = payload.as_object().map(|m| m.len()).unwrap_or(0);
        Ok(json!({
            "workplan": {
                "phase": ctx.phase,
                "input_keys": inputs,
            }
        }))
    }
}

/// Handler genérico de publicación de resumen para los flujos simples.
pub struct PublishSummaryHandler;

impl PhaseHandler for PublishSummaryHandler {
    fn handle(&self, ctx: &HandlerContext, payload: &Value) -> Result<Value, HandlerFailure> {
        Ok(json!({
            "report": {
                "phase": ctx.phase,
                "has_workplan": payload.get("workplan").is_some(),
            }
        }))
    }
}

/// Handler de error por defecto: decide por clasificación tipada, nunca por
/// inspección de strings. Las fases con objetivo de rollback configurado
/// revierten en lugar de detenerse.
pub struct DefaultErrorHandler {
    rollback_to: HashMap<String, String>,
}

impl DefaultErrorHandler {
    pub fn new() -> Self {
        Self { rollback_to: HashMap::new() }
    }

    /// Configura un objetivo de rollback para los fallos terminales de una
    /// fase concreta.
    pub fn with_rollback(mut self, phase: &str, to_phase: &str) -> Self {
        self.rollback_to.insert(phase.to_string(), to_phase.to_string());
        self
    }
}

impl Default for DefaultErrorHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorHandler for DefaultErrorHandler {
    fn classify(&self, phase: &str, error: &FlowEngineError, _attempt: u32) -> ErrorDecision {
        match classify_error(error) {
            ErrorClass::Validation => ErrorDecision::halt(),
            ErrorClass::Transient => match self.rollback_to.get(phase) {
                Some(target) => ErrorDecision { recoverable: true,
                                                action: RecoveryAction::Rollback { to_phase: target.clone() } },
                None => ErrorDecision { recoverable: true, action: RecoveryAction::Retry },
            },
            ErrorClass::Permanent | ErrorClass::Runtime => ErrorDecision::halt(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use migra_core::state::TenantScope;
    use uuid::Uuid;

    fn ctx(phase: &str) -> HandlerContext {
        HandlerContext { flow_id: Uuid::new_v4(),
                         phase: phase.to_string(),
                         scope: TenantScope::new(Uuid::new_v4(), Uuid::new_v4()),
                         user_id: None }
    }

    #[test]
    fn deteccion_filtra_por_catalogo_conocido() {
        let payload = json!({
            "known_platforms": ["vmware", "aws"],
            "platform_hints": ["vmware", "mainframe", "aws"],
        });
        let out = DetectPlatformsHandler.handle(&ctx("platform-detection"), &payload).unwrap();
        assert_eq!(out["detected_platforms"], json!(["vmware", "aws"]));
    }

    #[test]
    fn recoleccion_contabiliza_fallos_parciales() {
        let payload = json!({
            "detected_platforms": ["vmware", "aws", "azure"],
            "platform_data_sources": {
                "vmware": {"records": [{"application_name": "erp"}], "quality": 0.9},
                "aws": {"records": [], "quality": 0.8},
            }
        });
        let out = CollectPlatformDataHandler.handle(&ctx("automated-collection"), &payload).unwrap();
        assert_eq!(out["collected_data"].as_object().unwrap().len(), 2);
        assert_eq!(out["collection_failures"].as_array().unwrap().len(), 1);
        assert_eq!(out["collection_failures"][0]["platform"], json!("azure"));
    }

    #[test]
    fn recoleccion_sin_fuentes_falla_transitoria() {
        let payload = json!({ "detected_platforms": ["vmware"], "platform_data_sources": {} });
        let err = CollectPlatformDataHandler.handle(&ctx("automated-collection"), &payload).unwrap_err();
        assert!(matches!(err, HandlerFailure::Transient(_)));
    }

    #[test]
    fn analisis_detecta_campos_nucleo_ausentes() {
        let payload = json!({
            "collected_data": {
                "vmware": [
                    {"application_name": "erp", "environment": "prod", "criticality": "",
                     "business_owner": "ops", "operating_system": "rhel"},
                ]
            }
        });
        let out = AnalyzeGapsHandler.handle(&ctx("gap-analysis"), &payload).unwrap();
        let gaps = out["identified_gaps"].as_array().unwrap();
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0]["field_name"], json!("criticality"));
        assert_eq!(gaps[0]["priority"], json!("high"));
    }

    #[test]
    fn cuestionario_ordena_por_prioridad() {
        let payload = json!({
            "identified_gaps": [
                {"field_name": "environment", "priority": "medium", "application_name": "a"},
                {"field_name": "criticality", "priority": "high", "application_name": "a"},
            ]
        });
        let out = PrepareQuestionnaireHandler.handle(&ctx("manual-collection"), &payload).unwrap();
        let questions = out.pointer("/questionnaire/questions").unwrap().as_array().unwrap();
        assert_eq!(questions[0]["field_name"], json!("criticality"));
    }

    #[test]
    fn ingestion_descarta_respuestas_vacias() {
        let payload = json!({
            "questionnaire": {"questions": [{"field_name": "environment"}, {"field_name": "criticality"}]},
            "manual_responses": [
                {"field_name": "environment", "value": "production"},
                {"field_name": "criticality", "value": "  "},
            ]
        });
        let out = IngestResponsesHandler.handle(&ctx("manual-collection"), &payload).unwrap();
        assert_eq!(out["resolved_responses"].as_array().unwrap().len(), 1);
        assert_eq!(out["resolution_rate"], json!(0.5));
    }

    #[test]
    fn error_handler_decide_por_clase_tipada() {
        let h = DefaultErrorHandler::new().with_rollback("gap-analysis", "automated-collection");

        let transient = FlowEngineError::Retryable { phase: "x".into(), reason: "io".into() };
        assert_eq!(h.classify("automated-collection", &transient, 3).action, RecoveryAction::Retry);
        assert_eq!(h.classify("gap-analysis", &transient, 3).action,
                   RecoveryAction::Rollback { to_phase: "automated-collection".into() });

        let fatal = FlowEngineError::Fatal { phase: "x".into(), reason: "bad".into() };
        assert_eq!(h.classify("gap-analysis", &fatal, 1).action, RecoveryAction::Halt);
    }
}
