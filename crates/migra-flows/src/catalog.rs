//! Catálogo de tipos de flujo de evaluación de migración.
//!
//! Aquí vive la configuración declarativa completa: los nueve tipos de
//! flujo, sus tablas de rollback y el `AppContext` con todos los registros
//! resueltos. `build_app_context` es el único punto de entrada; verifica la
//! completitud nominal antes de devolver el contexto.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Map};

use migra_core::errors::StartupValidationError;
use migra_core::executor::TaskExecutor;
use migra_core::registry::{AppContext, ErrorHandlerRegistry, HandlerRegistry, ValidatorRegistry};
use migra_core::rollback::{RollbackPlan, RollbackTable};
use migra_core::spec::{FlowCaps, FlowCatalog, FlowTypeSpec, PhaseCaps, PhaseSpec, RetryPolicy, UnitOfWork};

use crate::handlers::{AnalyzeGapsHandler, CollectPlatformDataHandler, CompileWorkplanHandler,
                      DefaultErrorHandler, DetectPlatformsHandler, FinalizeAssessmentHandler,
                      IngestResponsesHandler, InitAssessmentHandler, PrepareQuestionnaireHandler,
                      PublishSummaryHandler, SynthesizeHandler};
use crate::validators::{CollectionConfigValidator, DataQualityValidator, PlatformCredentialsValidator};

fn handler(name: &str) -> UnitOfWork {
    UnitOfWork::Handler(name.to_string())
}

/// Flujo principal: recolección de datos en cinco fases, con pausa,
/// rollback y sub-unidades paralelas en la recolección automática.
fn data_collection_spec() -> FlowTypeSpec {
    let phases = vec![
        PhaseSpec::new("platform-detection", handler("detect-platforms"))
            .with_optional_inputs(["platform_hints", "known_platforms"])
            .with_caps(PhaseCaps { can_pause: false, can_skip: false, can_rollback: true }),
        PhaseSpec::new("automated-collection", handler("collect-platform-data"))
            .with_required_inputs(["detected_platforms"])
            .with_optional_inputs(["platform_data_sources", "platform_credentials"])
            .with_validators(["platform-credentials", "collection-config"])
            .with_retry(RetryPolicy { max_attempts: 3,
                                      initial_delay: Duration::from_millis(500),
                                      backoff_multiplier: 2.0,
                                      max_delay: Duration::from_secs(10) })
            .with_timeout(Duration::from_secs(300))
            .with_caps(PhaseCaps { can_pause: true, can_skip: false, can_rollback: true }),
        PhaseSpec::new("gap-analysis", handler("analyze-gaps"))
            .with_required_inputs(["collected_data"])
            .with_validators(["data-quality"])
            .with_caps(PhaseCaps { can_pause: true, can_skip: false, can_rollback: true }),
        // Suspensión natural: la fase exige `manual_responses`, que solo
        // llega vía `provide_input` de un operador. `can_skip` queda en
        // false para que la falta de respuestas bloquee en lugar de omitir.
        PhaseSpec::new("manual-collection", handler("ingest-responses"))
            .with_required_inputs(["manual_responses"])
            .with_optional_inputs(["identified_gaps"])
            .with_pre_handlers(["prepare-questionnaire"])
            .with_caps(PhaseCaps { can_pause: true, can_skip: false, can_rollback: true }),
        PhaseSpec::new("synthesis", handler("synthesize-assessment"))
            .with_optional_inputs(["resolved_responses", "resolution_rate", "gap_count"])
            .with_caps(PhaseCaps { can_pause: false, can_skip: false, can_rollback: true }),
    ];

    let mut defaults = Map::new();
    defaults.insert("automation_tier".to_string(), json!(2));
    defaults.insert("batch_size".to_string(), json!(100));
    defaults.insert("timeout_ms".to_string(), json!(30_000));

    FlowTypeSpec::new("data-collection", "default")
        .with_display("Recolección de datos", "Descubre plataformas, recolecta inventario y resuelve gaps de cobertura")
        .with_phases(phases)
        .with_caps(FlowCaps { pause_resume: true,
                              rollback: true,
                              checkpointing: true,
                              branching: true,
                              parallel_units: true,
                              max_iterations: 3 })
        .with_init_handler("init-assessment")
        .with_final_handler("finalize-assessment")
        .with_defaults(defaults)
        .with_tags(["assessment", "collection"])
}

fn data_collection_rollback_table() -> RollbackTable {
    RollbackTable::new()
        .with_phase("platform-detection",
                    RollbackPlan::clearing(&["detected_platforms", "collected_data", "quality_scores",
                                             "collection_failures", "identified_gaps", "gap_count",
                                             "questionnaire", "resolved_responses", "resolution_rate",
                                             "assessment_summary"]))
        .with_phase("automated-collection",
                    RollbackPlan::clearing(&["collected_data", "quality_scores", "collection_failures"])
                        .retaining(&["detected_platforms"]))
        .with_phase("gap-analysis",
                    RollbackPlan::clearing(&["identified_gaps", "gap_count"]).retaining(&["collected_data"]))
        .with_phase("manual-collection",
                    RollbackPlan::clearing(&["questionnaire", "resolved_responses", "resolution_rate"])
                        .retaining(&["identified_gaps"]))
        .with_phase("synthesis", RollbackPlan::clearing(&["assessment_summary"]))
}

/// Flujo de baja de sistemas: la fase de apagado es irreversible y no
/// pausable; revertirla exige confirmación explícita del operador.
fn decommissioning_spec() -> FlowTypeSpec {
    let phases = vec![
        PhaseSpec::new("decommission-plan", handler("compile-workplan"))
            .with_caps(PhaseCaps { can_pause: true, can_skip: false, can_rollback: true }),
        PhaseSpec::new("shutdown", handler("publish-summary"))
            .with_required_inputs(["workplan"])
            .with_caps(PhaseCaps { can_pause: false, can_skip: false, can_rollback: false }),
    ];

    FlowTypeSpec::new("decommissioning", "default")
        .with_display("Baja de sistemas", "Planifica y ejecuta el apagado de cargas retiradas")
        .with_phases(phases)
        .with_caps(FlowCaps { pause_resume: true, rollback: true, ..FlowCaps::default() })
        .with_tags(["execution"])
}

fn decommissioning_rollback_table() -> RollbackTable {
    RollbackTable::new()
        .with_phase("decommission-plan", RollbackPlan::clearing(&["workplan"]))
        .with_phase("shutdown", RollbackPlan::clearing(&["report"]))
}

/// Flujo de evaluación con una fase de executor externo: el motor solo
/// conoce las claves de entrada y el contrato de salidas.
fn assessment_spec() -> FlowTypeSpec {
    let phases = vec![
        PhaseSpec::new("scope-definition", handler("compile-workplan"))
            .with_caps(PhaseCaps { can_pause: true, can_skip: false, can_rollback: true }),
        PhaseSpec::new("readiness-analysis",
                       UnitOfWork::Executor { inputs: vec!["collected_data".to_string()],
                                              required_outputs: vec!["readiness_scores".to_string()] })
            .with_required_inputs(["collected_data"])
            .with_retry(RetryPolicy::default())
            .with_timeout(Duration::from_secs(120))
            .with_caps(PhaseCaps { can_pause: true, can_skip: false, can_rollback: true }),
        PhaseSpec::new("publish-assessment", handler("publish-summary"))
            .with_required_inputs(["readiness_scores"]),
    ];

    FlowTypeSpec::new("assessment", "default")
        .with_display("Evaluación", "Puntúa la preparación de migración de las cargas inventariadas")
        .with_phases(phases)
        .with_caps(FlowCaps { pause_resume: true, rollback: true, ..FlowCaps::default() })
        .with_tags(["assessment"])
}

fn assessment_rollback_table() -> RollbackTable {
    RollbackTable::new()
        .with_phase("scope-definition", RollbackPlan::clearing(&["workplan"]))
        .with_phase("readiness-analysis",
                    RollbackPlan::clearing(&["readiness_scores"]).retaining(&["collected_data"]))
        .with_phase("publish-assessment", RollbackPlan::clearing(&["report"]))
}

/// Flujos simples de dos fases: plan de trabajo y publicación de resumen.
fn simple_spec(name: &str, display: &str, description: &str) -> FlowTypeSpec {
    let phases = vec![
        PhaseSpec::new("compile-workplan", handler("compile-workplan"))
            .with_caps(PhaseCaps { can_pause: true, can_skip: false, can_rollback: false }),
        PhaseSpec::new("publish-summary", handler("publish-summary"))
            .with_required_inputs(["workplan"])
            .with_caps(PhaseCaps { can_pause: false, can_skip: true, can_rollback: false }),
    ];

    FlowTypeSpec::new(name, "default")
        .with_display(display, description)
        .with_phases(phases)
        .with_caps(FlowCaps { pause_resume: true, ..FlowCaps::default() })
        .with_tags(["planning"])
}

/// Construye el catálogo de los nueve tipos de flujo.
pub fn build_catalog() -> Result<FlowCatalog, migra_core::errors::FlowEngineError> {
    let mut catalog = FlowCatalog::new();
    catalog.register(data_collection_spec())?;
    catalog.register(assessment_spec())?;
    catalog.register(decommissioning_spec())?;
    catalog.register(simple_spec("discovery", "Descubrimiento",
                                 "Inventario inicial de aplicaciones e infraestructura"))?;
    catalog.register(simple_spec("planning", "Planificación",
                                 "Construye olas de migración a partir de la evaluación"))?;
    catalog.register(simple_spec("execution", "Ejecución",
                                 "Coordina la ejecución de una ola de migración"))?;
    catalog.register(simple_spec("modernization", "Modernización",
                                 "Refactorización y replataformado de cargas seleccionadas"))?;
    catalog.register(simple_spec("cost-optimization", "Optimización de costes",
                                 "Dimensionado y ajuste de costes post-migración"))?;
    catalog.register(simple_spec("observability-setup", "Observabilidad",
                                 "Instrumentación de las cargas migradas"))?;
    Ok(catalog)
}

/// Tablas de rollback por tipo de flujo. Los flujos simples no declaran
/// rollback y no necesitan tabla.
pub fn build_rollback_tables() -> HashMap<String, RollbackTable> {
    let mut tables = HashMap::new();
    tables.insert("data-collection".to_string(), data_collection_rollback_table());
    tables.insert("assessment".to_string(), assessment_rollback_table());
    tables.insert("decommissioning".to_string(), decommissioning_rollback_table());
    tables
}

/// Construye y verifica el contexto de aplicación completo. Cualquier
/// referencia nominal sin resolver aborta el arranque con la lista
/// completa de faltantes.
pub fn build_app_context(executor: Arc<dyn TaskExecutor>) -> Result<Arc<AppContext>, StartupValidationError> {
    let catalog = build_catalog().map_err(|e| StartupValidationError { missing: vec![format!("catalog:{e}")] })?;

    let mut validators = ValidatorRegistry::new();
    validators.register("data-quality", Arc::new(DataQualityValidator));
    validators.register("platform-credentials", Arc::new(PlatformCredentialsValidator));
    validators.register("collection-config", Arc::new(CollectionConfigValidator));

    let mut handlers = HandlerRegistry::new();
    handlers.register("detect-platforms", Arc::new(DetectPlatformsHandler));
    handlers.register("collect-platform-data", Arc::new(CollectPlatformDataHandler));
    handlers.register("analyze-gaps", Arc::new(AnalyzeGapsHandler));
    handlers.register("prepare-questionnaire", Arc::new(PrepareQuestionnaireHandler));
    handlers.register("ingest-responses", Arc::new(IngestResponsesHandler));
    handlers.register("synthesize-assessment", Arc::new(SynthesizeHandler));
    handlers.register("init-assessment", Arc::new(InitAssessmentHandler));
    handlers.register("finalize-assessment", Arc::new(FinalizeAssessmentHandler));
    handlers.register("compile-workplan", Arc::new(CompileWorkplanHandler));
    handlers.register("publish-summary", Arc::new(PublishSummaryHandler));

    let mut error_handlers = ErrorHandlerRegistry::new();
    error_handlers.register("default",
                            Arc::new(DefaultErrorHandler::new().with_rollback("gap-analysis",
                                                                              "automated-collection")));

    let ctx = AppContext { catalog,
                           validators,
                           handlers,
                           error_handlers,
                           rollback_tables: build_rollback_tables(),
                           executor };
    ctx.verify()?;
    Ok(Arc::new(ctx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use migra_core::executor::NullExecutor;

    #[test]
    fn el_contexto_completo_verifica_al_arranque() {
        let ctx = build_app_context(Arc::new(NullExecutor)).unwrap();
        assert_eq!(ctx.catalog.len(), 9);
        assert!(ctx.catalog.get("data-collection").is_some());
        assert!(ctx.rollback_tables.contains_key("decommissioning"));
    }

    #[test]
    fn cada_fase_rollbackeable_tiene_plan_en_su_tabla() {
        let ctx = build_app_context(Arc::new(NullExecutor)).unwrap();
        for spec in ctx.catalog.iter() {
            if !spec.caps.rollback {
                continue;
            }
            let table = ctx.rollback_tables.get(&spec.name).unwrap();
            for phase in &spec.phases {
                assert!(table.plan_for(&phase.name).is_some(),
                        "fase {} de {} sin plan de rollback", phase.name, spec.name);
            }
        }
    }

    #[test]
    fn las_referencias_nominales_faltantes_se_acumulan() {
        let catalog = build_catalog().unwrap();
        let ctx = AppContext { catalog,
                               validators: ValidatorRegistry::new(),
                               handlers: HandlerRegistry::new(),
                               error_handlers: ErrorHandlerRegistry::new(),
                               rollback_tables: HashMap::new(),
                               executor: Arc::new(NullExecutor) };
        let err = ctx.verify().unwrap_err();
        assert!(err.missing.contains(&"validator:data-quality".to_string()));
        assert!(err.missing.contains(&"handler:collect-platform-data".to_string()));
        assert!(err.missing.contains(&"error_handler:default".to_string()));
    }
}
