mod core;
mod flow_ctx;

pub use core::{AdvanceOutcome, FlowEngine};
pub use flow_ctx::FlowCtx;

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::{json, Map, Value};
    use uuid::Uuid;

    use super::*;
    use crate::errors::{FlowEngineError, HandlerFailure};
    use crate::event::{kind_variant_name, EventStore, FlowEventKind, InMemoryEventStore};
    use crate::executor::{NullExecutor, TaskExecutor};
    use crate::registry::{AppContext, ErrorDecision, ErrorHandler, ErrorHandlerRegistry, HandlerContext,
                          HandlerRegistry, PhaseHandler, PhaseValidator, RecoveryAction, ValidationReport,
                          ValidatorRegistry};
    use crate::rollback::{RollbackPlan, RollbackTable};
    use crate::spec::{FlowCaps, FlowCatalog, FlowTypeSpec, PhaseCaps, PhaseSpec, RetryPolicy, UnitOfWork};
    use crate::state::{FlowStatus, InMemoryFlowRepository, PhaseStatus, TenantScope};

    struct Emit {
        key: &'static str,
        value: Value,
    }

    impl PhaseHandler for Emit {
        fn handle(&self, _: &HandlerContext, _: &Value) -> Result<Value, HandlerFailure> {
            let mut m = Map::new();
            m.insert(self.key.to_string(), self.value.clone());
            Ok(Value::Object(m))
        }
    }

    /// Falla con error transitorio `remaining` veces y luego emite su clave.
    struct Flaky {
        key: &'static str,
        remaining: AtomicU32,
    }

    impl PhaseHandler for Flaky {
        fn handle(&self, _: &HandlerContext, _: &Value) -> Result<Value, HandlerFailure> {
            if self.remaining
                   .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                   .is_ok()
            {
                return Err(HandlerFailure::Transient("connection reset".into()));
            }
            let mut m = Map::new();
            m.insert(self.key.to_string(), json!(true));
            Ok(Value::Object(m))
        }
    }

    struct RejectWith(&'static str);

    impl PhaseValidator for RejectWith {
        fn validate(&self, _: &Value, _: &Value, _: &Value) -> ValidationReport {
            ValidationReport::failed(vec![self.0.to_string()])
        }
    }

    struct Halting;

    impl ErrorHandler for Halting {
        fn classify(&self, _: &str, _: &FlowEngineError, _: u32) -> ErrorDecision {
            ErrorDecision::halt()
        }
    }

    struct ShortExecutor;

    impl TaskExecutor for ShortExecutor {
        fn execute(&self,
                   _: &str,
                   _: &str,
                   _: &Map<String, Value>)
                   -> Result<Map<String, Value>, HandlerFailure> {
            let mut m = Map::new();
            m.insert("partial".into(), json!(1));
            Ok(m)
        }
    }

    fn fast_retry(max_attempts: u32) -> RetryPolicy {
        RetryPolicy { max_attempts,
                      initial_delay: Duration::from_millis(1),
                      backoff_multiplier: 2.0,
                      max_delay: Duration::from_millis(4) }
    }

    fn scope() -> TenantScope {
        TenantScope::new(Uuid::new_v4(), Uuid::new_v4())
    }

    struct CtxBuilder {
        catalog: FlowCatalog,
        validators: ValidatorRegistry,
        handlers: HandlerRegistry,
        error_handlers: ErrorHandlerRegistry,
        rollback_tables: HashMap<String, RollbackTable>,
        executor: Arc<dyn TaskExecutor>,
    }

    impl CtxBuilder {
        fn new(spec: FlowTypeSpec) -> Self {
            let mut catalog = FlowCatalog::new();
            catalog.register(spec).unwrap();
            let mut error_handlers = ErrorHandlerRegistry::new();
            error_handlers.register("halt", Arc::new(Halting));
            Self { catalog,
                   validators: ValidatorRegistry::new(),
                   handlers: HandlerRegistry::new(),
                   error_handlers,
                   rollback_tables: HashMap::new(),
                   executor: Arc::new(NullExecutor) }
        }

        fn handler(mut self, name: &str, h: Arc<dyn PhaseHandler>) -> Self {
            self.handlers.register(name, h);
            self
        }

        fn validator(mut self, name: &str, v: Arc<dyn PhaseValidator>) -> Self {
            self.validators.register(name, v);
            self
        }

        fn error_handler(mut self, name: &str, h: Arc<dyn ErrorHandler>) -> Self {
            self.error_handlers.register(name, h);
            self
        }

        fn rollback_table(mut self, flow_type: &str, table: RollbackTable) -> Self {
            self.rollback_tables.insert(flow_type.to_string(), table);
            self
        }

        fn executor(mut self, e: Arc<dyn TaskExecutor>) -> Self {
            self.executor = e;
            self
        }

        fn engine(self) -> FlowEngine<InMemoryEventStore, InMemoryFlowRepository> {
            let ctx = AppContext { catalog: self.catalog,
                                   validators: self.validators,
                                   handlers: self.handlers,
                                   error_handlers: self.error_handlers,
                                   rollback_tables: self.rollback_tables,
                                   executor: self.executor };
            ctx.verify().unwrap();
            FlowEngine::new(InMemoryEventStore::default(), InMemoryFlowRepository::new(), Arc::new(ctx))
        }
    }

    fn variant_counts(engine: &FlowEngine<InMemoryEventStore, InMemoryFlowRepository>,
                      flow_id: Uuid)
                      -> HashMap<&'static str, usize> {
        let mut out = HashMap::new();
        for ev in engine.event_store().list(flow_id) {
            *out.entry(kind_variant_name(&ev.kind)).or_insert(0) += 1;
        }
        out
    }

    #[test]
    fn transient_failures_retry_until_budget_then_succeed() {
        let spec = FlowTypeSpec::new("assessment", "halt")
            .with_phases(vec![PhaseSpec::new("collect", UnitOfWork::Handler("collect".into()))
                                  .with_retry(fast_retry(3))]);
        let mut engine = CtxBuilder::new(spec)
            .handler("collect", Arc::new(Flaky { key: "inventory", remaining: AtomicU32::new(2) }))
            .engine();

        let id = engine.start_flow("assessment", scope()).unwrap();
        let out = engine.advance(id).unwrap();
        assert!(matches!(out, AdvanceOutcome::FlowCompleted { .. }));

        let counts = variant_counts(&engine, id);
        // Dos fallos, dos reintentos agendados, tercer intento exitoso.
        assert_eq!(counts["PhaseFailed"], 2);
        assert_eq!(counts["RetryScheduled"], 2);
        assert_eq!(counts["PhaseStarted"], 3);

        let instance = engine.load(id).unwrap();
        assert_eq!(instance.attempts_for("collect"), 3);
        assert_eq!(instance.status, FlowStatus::Completed);
    }

    #[test]
    fn exhausted_retry_budget_fails_the_flow() {
        let spec = FlowTypeSpec::new("assessment", "halt")
            .with_phases(vec![PhaseSpec::new("collect", UnitOfWork::Handler("collect".into()))
                                  .with_retry(fast_retry(2))]);
        let mut engine = CtxBuilder::new(spec)
            .handler("collect", Arc::new(Flaky { key: "inventory", remaining: AtomicU32::new(99) }))
            .engine();

        let id = engine.start_flow("assessment", scope()).unwrap();
        let err = engine.advance(id).unwrap_err();
        assert!(matches!(err, FlowEngineError::Retryable { .. }));
        assert_eq!(engine.load(id).unwrap().status, FlowStatus::Failed);
        // Un flujo fallido rechaza avanzar hasta que el operador intervenga.
        assert!(matches!(engine.advance(id).unwrap_err(), FlowEngineError::FlowHasFailed));
    }

    #[test]
    fn retry_failed_grants_a_fresh_budget() {
        let spec = FlowTypeSpec::new("assessment", "halt")
            .with_phases(vec![PhaseSpec::new("collect", UnitOfWork::Handler("collect".into()))
                                  .with_retry(fast_retry(2))]);
        // Falla 3 veces en total: agota el primer presupuesto (2) y gasta uno
        // del segundo.
        let mut engine = CtxBuilder::new(spec)
            .handler("collect", Arc::new(Flaky { key: "inventory", remaining: AtomicU32::new(3) }))
            .engine();

        let id = engine.start_flow("assessment", scope()).unwrap();
        assert!(engine.advance(id).is_err());
        engine.retry_failed(id).unwrap();
        let out = engine.advance(id).unwrap();
        assert!(matches!(out, AdvanceOutcome::FlowCompleted { .. }));
    }

    #[test]
    fn all_validators_run_and_errors_aggregate() {
        let spec = FlowTypeSpec::new("assessment", "halt")
            .with_phases(vec![PhaseSpec::new("collect", UnitOfWork::Handler("collect".into()))
                                  .with_validators(["v-one", "v-two", "v-three"])]);
        let mut engine = CtxBuilder::new(spec)
            .handler("collect", Arc::new(Emit { key: "inventory", value: json!([]) }))
            .validator("v-one", Arc::new(RejectWith("first problem")))
            .validator("v-two", Arc::new(RejectWith("second problem")))
            .validator("v-three", Arc::new(RejectWith("third problem")))
            .engine();

        let id = engine.start_flow("assessment", scope()).unwrap();
        let err = engine.advance(id).unwrap_err();
        match err {
            FlowEngineError::Validation { errors, .. } => {
                assert_eq!(errors,
                           vec!["first problem", "second problem", "third problem"]);
            }
            other => panic!("expected validation error, got {other:?}"),
        }

        let counts = variant_counts(&engine, id);
        // La validación no consume intentos de ejecución.
        assert_eq!(counts.get("PhaseStarted"), None);
        assert_eq!(counts["PhaseValidationFailed"], 1);
    }

    #[test]
    fn pause_then_resume_preserves_state_exactly() {
        let caps = PhaseCaps { can_pause: true, can_skip: false, can_rollback: true };
        let spec = FlowTypeSpec::new("assessment", "halt")
            .with_caps(FlowCaps { pause_resume: true, rollback: true, ..FlowCaps::default() })
            .with_phases(vec![
                PhaseSpec::new("collect", UnitOfWork::Handler("collect".into())).with_caps(caps),
                PhaseSpec::new("analyze", UnitOfWork::Handler("analyze".into())).with_caps(caps),
            ]);
        let mut engine = CtxBuilder::new(spec)
            .handler("collect", Arc::new(Emit { key: "inventory", value: json!(["vm-1", "vm-2"]) }))
            .handler("analyze", Arc::new(Emit { key: "gaps", value: json!(["os-missing"]) }))
            .engine();

        let id = engine.start_flow("assessment", scope()).unwrap();
        engine.advance(id).unwrap();
        engine.pause(id).unwrap();

        let before = engine.load(id).unwrap();
        assert_eq!(before.status, FlowStatus::Paused);
        assert!(matches!(engine.advance(id).unwrap_err(), FlowEngineError::FlowIsPaused));

        engine.resume(id).unwrap();
        let after = engine.load(id).unwrap();
        assert_eq!(after.status, FlowStatus::Running);
        assert_eq!(before.state_value(), after.state_value());
        assert_eq!(before.cursor, after.cursor);

        assert!(matches!(engine.advance(id).unwrap(), AdvanceOutcome::FlowCompleted { .. }));
    }

    #[test]
    fn missing_inputs_skip_when_allowed() {
        let spec = FlowTypeSpec::new("assessment", "halt")
            .with_phases(vec![
                PhaseSpec::new("optional-enrich", UnitOfWork::Handler("enrich".into()))
                    .with_required_inputs(["external_feed"])
                    .with_caps(PhaseCaps { can_skip: true, ..PhaseCaps::default() }),
                PhaseSpec::new("report", UnitOfWork::Handler("report".into())),
            ]);
        let mut engine = CtxBuilder::new(spec)
            .handler("enrich", Arc::new(Emit { key: "enriched", value: json!(true) }))
            .handler("report", Arc::new(Emit { key: "report", value: json!("done") }))
            .engine();

        let id = engine.start_flow("assessment", scope()).unwrap();
        let out = engine.advance(id).unwrap();
        assert_eq!(out, AdvanceOutcome::PhaseSkipped { phase: "optional-enrich".into() });

        let instance = engine.run_to_completion(id).unwrap();
        assert_eq!(instance.phases[0].status, PhaseStatus::Skipped);
        assert!(!instance.phase_state.contains_key("enriched"));
        assert!(instance.phase_state.contains_key("report"));
    }

    #[test]
    fn operator_skip_rejected_when_required_inputs_are_present() {
        let spec = FlowTypeSpec::new("assessment", "halt")
            .with_phases(vec![
                PhaseSpec::new("collect", UnitOfWork::Handler("collect".into())),
                PhaseSpec::new("optional-enrich", UnitOfWork::Handler("enrich".into()))
                    .with_required_inputs(["external_feed"])
                    .with_caps(PhaseCaps { can_skip: true, ..PhaseCaps::default() }),
            ]);
        let mut engine = CtxBuilder::new(spec)
            .handler("collect", Arc::new(Emit { key: "external_feed", value: json!({"rows": 3}) }))
            .handler("enrich", Arc::new(Emit { key: "enriched", value: json!(true) }))
            .engine();

        let id = engine.start_flow("assessment", scope()).unwrap();
        engine.advance(id).unwrap();

        // Con el input requerido ya en el estado la fase debe ejecutarse.
        let err = engine.skip_phase(id, "operator shortcut").unwrap_err();
        assert_eq!(err, FlowEngineError::SkipNotAllowed("optional-enrich".into()));
        assert_eq!(variant_counts(&engine, id).get("PhaseSkipped"), None);

        let instance = engine.run_to_completion(id).unwrap();
        assert!(instance.phase_state.contains_key("enriched"));
    }

    #[test]
    fn operator_skip_allowed_while_required_inputs_are_absent() {
        let spec = FlowTypeSpec::new("assessment", "halt")
            .with_phases(vec![
                PhaseSpec::new("collect", UnitOfWork::Handler("collect".into())),
                PhaseSpec::new("optional-enrich", UnitOfWork::Handler("enrich".into()))
                    .with_required_inputs(["external_feed"])
                    .with_caps(PhaseCaps { can_skip: true, ..PhaseCaps::default() }),
            ]);
        let mut engine = CtxBuilder::new(spec)
            .handler("collect", Arc::new(Emit { key: "inventory", value: json!(["vm-1"]) }))
            .handler("enrich", Arc::new(Emit { key: "enriched", value: json!(true) }))
            .engine();

        let id = engine.start_flow("assessment", scope()).unwrap();
        engine.advance(id).unwrap();

        engine.skip_phase(id, "feed unavailable this cycle").unwrap();
        let instance = engine.run_to_completion(id).unwrap();
        assert_eq!(instance.phases[1].status, PhaseStatus::Skipped);
        assert!(!instance.phase_state.contains_key("enriched"));
    }

    #[test]
    fn missing_inputs_block_when_skip_not_allowed() {
        let spec = FlowTypeSpec::new("assessment", "halt")
            .with_phases(vec![PhaseSpec::new("collect", UnitOfWork::Handler("collect".into()))
                                  .with_required_inputs(["credentials"])]);
        let mut engine = CtxBuilder::new(spec)
            .handler("collect", Arc::new(Emit { key: "inventory", value: json!([]) }))
            .engine();

        let id = engine.start_flow("assessment", scope()).unwrap();
        let err = engine.advance(id).unwrap_err();
        match err {
            FlowEngineError::Validation { errors, .. } => {
                assert_eq!(errors, vec!["required input missing: credentials"]);
            }
            other => panic!("expected validation error, got {other:?}"),
        }

        // El operador aporta el input y el flujo avanza.
        engine.provide_input(id, "operator", json!({"credentials": {"user": "svc"}})).unwrap();
        assert!(matches!(engine.advance(id).unwrap(), AdvanceOutcome::FlowCompleted { .. }));
    }

    #[test]
    fn rollback_clears_per_table_and_retains_the_rest() {
        let caps = PhaseCaps { can_pause: false, can_skip: false, can_rollback: true };
        let spec = FlowTypeSpec::new("assessment", "halt")
            .with_caps(FlowCaps { rollback: true, ..FlowCaps::default() })
            .with_phases(vec![
                PhaseSpec::new("collect", UnitOfWork::Handler("collect".into())).with_caps(caps),
                PhaseSpec::new("analyze", UnitOfWork::Handler("analyze".into())).with_caps(caps),
                PhaseSpec::new("report", UnitOfWork::Handler("report".into())).with_caps(caps),
            ]);
        let table = RollbackTable::new()
            .with_phase("analyze", RollbackPlan::clearing(&["gaps"]).retaining(&["inventory"]))
            .with_phase("report", RollbackPlan::clearing(&["report"]));
        let mut engine = CtxBuilder::new(spec)
            .handler("collect", Arc::new(Emit { key: "inventory", value: json!(["vm-1"]) }))
            .handler("analyze", Arc::new(Emit { key: "gaps", value: json!(["cpu-unknown"]) }))
            .handler("report", Arc::new(Emit { key: "report", value: json!("summary") }))
            .rollback_table("assessment", table)
            .engine();

        let id = engine.start_flow("assessment", scope()).unwrap();
        engine.advance(id).unwrap();
        engine.advance(id).unwrap();

        // Cursor en "report"; revertimos hasta "analyze".
        let cleared = engine.rollback_to(id, "analyze", false).unwrap();
        assert_eq!(cleared, vec!["gaps"]);

        let instance = engine.load(id).unwrap();
        assert_eq!(instance.status, FlowStatus::RolledBack);
        assert!(instance.phase_state.contains_key("inventory"));
        assert!(!instance.phase_state.contains_key("gaps"));
        assert_eq!(instance.cursor, 1);

        // Re-ejecutable desde la fase objetivo.
        let done = engine.run_to_completion(id).unwrap();
        assert_eq!(done.status, FlowStatus::Completed);
        assert!(done.phase_state.contains_key("gaps"));
    }

    #[test]
    fn irreversible_phase_requires_acknowledgement() {
        let spec = FlowTypeSpec::new("decom", "halt")
            .with_caps(FlowCaps { rollback: true, ..FlowCaps::default() })
            .with_phases(vec![
                PhaseSpec::new("plan", UnitOfWork::Handler("plan".into()))
                    .with_caps(PhaseCaps { can_rollback: true, ..PhaseCaps::default() }),
                PhaseSpec::new("shutdown", UnitOfWork::Handler("shutdown".into())),
            ]);
        let mut engine = CtxBuilder::new(spec)
            .handler("plan", Arc::new(Emit { key: "plan", value: json!({}) }))
            .handler("shutdown", Arc::new(Emit { key: "stopped", value: json!(true) }))
            .engine();

        let id = engine.start_flow("decom", scope()).unwrap();
        engine.advance(id).unwrap();

        let err = engine.rollback_to(id, "plan", false).unwrap_err();
        assert_eq!(err, FlowEngineError::IrreversiblePhase("shutdown".into()));
        assert!(engine.rollback_to(id, "plan", true).is_ok());
    }

    #[test]
    fn executor_outputs_are_checked_against_contract() {
        let spec = FlowTypeSpec::new("assessment", "halt")
            .with_phases(vec![PhaseSpec::new("automated",
                                             UnitOfWork::Executor { inputs: vec!["inventory".into()],
                                                                    required_outputs: vec!["partial".into(),
                                                                                           "metrics".into()] })
                                  .with_retry(RetryPolicy::none())]);
        let mut engine = CtxBuilder::new(spec).executor(Arc::new(ShortExecutor)).engine();

        let id = engine.start_flow("assessment", scope()).unwrap();
        let err = engine.advance(id).unwrap_err();
        assert_eq!(err, FlowEngineError::MissingOutputs(vec!["metrics".into()]));
        assert_eq!(engine.load(id).unwrap().status, FlowStatus::Failed);
    }

    #[test]
    fn init_handler_seeds_state_before_first_phase() {
        let spec = FlowTypeSpec::new("assessment", "halt")
            .with_init_handler("seed")
            .with_phases(vec![PhaseSpec::new("collect", UnitOfWork::Handler("collect".into()))
                                  .with_required_inputs(["tenant_defaults"])]);
        let mut engine = CtxBuilder::new(spec)
            .handler("seed", Arc::new(Emit { key: "tenant_defaults", value: json!({"region": "eu"}) }))
            .handler("collect", Arc::new(Emit { key: "inventory", value: json!([]) }))
            .engine();

        let id = engine.start_flow("assessment", scope()).unwrap();
        assert!(matches!(engine.advance(id).unwrap(), AdvanceOutcome::FlowCompleted { .. }));
    }

    #[test]
    fn replay_is_deterministic_across_loads() {
        let spec = FlowTypeSpec::new("assessment", "halt")
            .with_phases(vec![
                PhaseSpec::new("collect", UnitOfWork::Handler("collect".into())),
                PhaseSpec::new("analyze", UnitOfWork::Handler("analyze".into())),
            ]);
        let mut engine = CtxBuilder::new(spec)
            .handler("collect", Arc::new(Emit { key: "inventory", value: json!(["vm-1"]) }))
            .handler("analyze", Arc::new(Emit { key: "gaps", value: json!([]) }))
            .engine();

        let id = engine.start_flow("assessment", scope()).unwrap();
        engine.run_to_completion(id).unwrap();

        let a = engine.load(id).unwrap();
        let b = engine.load(id).unwrap();
        assert_eq!(a.state_value(), b.state_value());
        assert_eq!(a.cursor, b.cursor);
        assert_eq!(a.phases[0].fingerprint, b.phases[0].fingerprint);
    }

    #[test]
    fn checkpoints_accumulate_one_per_completed_phase() {
        let spec = FlowTypeSpec::new("assessment", "halt")
            .with_phases(vec![
                PhaseSpec::new("collect", UnitOfWork::Handler("collect".into())),
                PhaseSpec::new("analyze", UnitOfWork::Handler("analyze".into())),
            ]);
        let mut engine = CtxBuilder::new(spec)
            .handler("collect", Arc::new(Emit { key: "inventory", value: json!(["vm-1"]) }))
            .handler("analyze", Arc::new(Emit { key: "gaps", value: json!([]) }))
            .engine();

        let id = engine.start_flow("assessment", scope()).unwrap();
        let instance = engine.run_to_completion(id).unwrap();
        assert_eq!(instance.checkpoints.len(), 2);
        assert!(instance.latest_checkpoint_for("analyze").is_some());
        let progresses: Vec<f64> = instance.checkpoints.iter().map(|c| c.progress).collect();
        assert_eq!(progresses, vec![0.5, 1.0]);
    }

    #[test]
    fn checkpoint_is_saved_after_completion_handler_inputs() {
        let spec = FlowTypeSpec::new("assessment", "halt")
            .with_phases(vec![
                PhaseSpec::new("collect", UnitOfWork::Handler("collect".into()))
                    .with_completion_handler("notify"),
                PhaseSpec::new("report", UnitOfWork::Handler("report".into())),
            ]);
        let mut engine = CtxBuilder::new(spec)
            .handler("collect", Arc::new(Emit { key: "inventory", value: json!(["vm-1"]) }))
            .handler("notify", Arc::new(Emit { key: "summary_ref", value: json!("reports/summary") }))
            .handler("report", Arc::new(Emit { key: "report", value: json!("done") }))
            .engine();

        let id = engine.start_flow("assessment", scope()).unwrap();
        engine.advance(id).unwrap();

        // El checkpoint cierra la fase: PhaseFinished, luego los inputs del
        // completion handler y por último CheckpointSaved.
        let variants: Vec<&str> = engine.event_store()
                                        .list(id)
                                        .iter()
                                        .map(|e| kind_variant_name(&e.kind))
                                        .collect();
        let finished = variants.iter().position(|v| *v == "PhaseFinished").unwrap();
        let provided = variants.iter().position(|v| *v == "InputProvided").unwrap();
        let saved = variants.iter().position(|v| *v == "CheckpointSaved").unwrap();
        assert!(finished < provided);
        assert!(provided < saved);

        let instance = engine.run_to_completion(id).unwrap();
        assert!(instance.latest_checkpoint_for("collect").is_some());
        assert!(instance.phase_state.contains_key("summary_ref"));
    }

    #[test]
    fn failed_rollback_recovery_still_fails_the_flow() {
        struct RevertToPlan;
        impl ErrorHandler for RevertToPlan {
            fn classify(&self, _: &str, _: &FlowEngineError, _: u32) -> ErrorDecision {
                ErrorDecision { recoverable: true,
                                action: RecoveryAction::Rollback { to_phase: "plan".into() } }
            }
        }

        struct AlwaysFails;
        impl PhaseHandler for AlwaysFails {
            fn handle(&self, _: &HandlerContext, _: &Value) -> Result<Value, HandlerFailure> {
                Err(HandlerFailure::Permanent("target unreachable".into()))
            }
        }

        // "shutdown" es irreversible, así que la decisión de rollback del
        // error handler no puede aplicarse sin reconocimiento del operador.
        let spec = FlowTypeSpec::new("decom", "revert")
            .with_caps(FlowCaps { rollback: true, ..FlowCaps::default() })
            .with_phases(vec![
                PhaseSpec::new("plan", UnitOfWork::Handler("plan".into()))
                    .with_caps(PhaseCaps { can_rollback: true, ..PhaseCaps::default() }),
                PhaseSpec::new("shutdown", UnitOfWork::Handler("shutdown".into())),
                PhaseSpec::new("verify", UnitOfWork::Handler("verify".into()))
                    .with_retry(RetryPolicy::none()),
            ]);
        let mut engine = CtxBuilder::new(spec)
            .error_handler("revert", Arc::new(RevertToPlan))
            .handler("plan", Arc::new(Emit { key: "plan", value: json!({}) }))
            .handler("shutdown", Arc::new(Emit { key: "stopped", value: json!(true) }))
            .handler("verify", Arc::new(AlwaysFails))
            .engine();

        let id = engine.start_flow("decom", scope()).unwrap();
        engine.advance(id).unwrap();
        engine.advance(id).unwrap();

        let err = engine.advance(id).unwrap_err();
        assert!(matches!(err, FlowEngineError::Fatal { .. }));

        // El fallo queda registrado en el log y el flujo no sigue corriendo.
        let counts = variant_counts(&engine, id);
        assert_eq!(counts["FlowFailed"], 1);
        assert_eq!(counts.get("RolledBack"), None);
        assert_eq!(engine.load(id).unwrap().status, FlowStatus::Failed);
    }

    #[test]
    fn completed_flow_rejects_further_operations() {
        let spec = FlowTypeSpec::new("assessment", "halt")
            .with_phases(vec![PhaseSpec::new("collect", UnitOfWork::Handler("collect".into()))]);
        let mut engine = CtxBuilder::new(spec)
            .handler("collect", Arc::new(Emit { key: "inventory", value: json!([]) }))
            .engine();

        let id = engine.start_flow("assessment", scope()).unwrap();
        engine.run_to_completion(id).unwrap();

        assert!(matches!(engine.advance(id).unwrap_err(), FlowEngineError::FlowCompleted));
        assert!(matches!(engine.provide_input(id, "operator", json!({})).unwrap_err(),
                         FlowEngineError::FlowCompleted));
    }

    #[test]
    fn unknown_flow_type_is_rejected_on_start() {
        let spec = FlowTypeSpec::new("assessment", "halt")
            .with_phases(vec![PhaseSpec::new("collect", UnitOfWork::Handler("collect".into()))]);
        let mut engine = CtxBuilder::new(spec)
            .handler("collect", Arc::new(Emit { key: "inventory", value: json!([]) }))
            .engine();
        let err = engine.start_flow("nope", scope()).unwrap_err();
        assert_eq!(err, FlowEngineError::UnknownFlowType("nope".into()));
    }

    #[test]
    fn flow_ctx_delegates_to_engine() {
        let caps = PhaseCaps { can_pause: true, ..PhaseCaps::default() };
        let spec = FlowTypeSpec::new("assessment", "halt")
            .with_caps(FlowCaps { pause_resume: true, ..FlowCaps::default() })
            .with_phases(vec![PhaseSpec::new("collect", UnitOfWork::Handler("collect".into())).with_caps(caps)]);
        let mut engine = CtxBuilder::new(spec)
            .handler("collect", Arc::new(Emit { key: "inventory", value: json!([]) }))
            .engine();
        let id = engine.start_flow("assessment", scope()).unwrap();

        let mut ctx = FlowCtx::new(&mut engine, id);
        ctx.pause().unwrap();
        ctx.resume().unwrap();
        let instance = ctx.run_to_completion().unwrap();
        assert_eq!(instance.status, FlowStatus::Completed);
    }

    #[test]
    fn validation_warnings_are_recorded_without_blocking() {
        struct Warns;
        impl PhaseValidator for Warns {
            fn validate(&self, _: &Value, _: &Value, _: &Value) -> ValidationReport {
                ValidationReport::ok().with_warnings(vec!["coverage below tier target".into()])
            }
        }

        let spec = FlowTypeSpec::new("assessment", "halt")
            .with_phases(vec![PhaseSpec::new("collect", UnitOfWork::Handler("collect".into()))
                                  .with_validators(["warns"])]);
        let mut engine = CtxBuilder::new(spec)
            .handler("collect", Arc::new(Emit { key: "inventory", value: json!([]) }))
            .validator("warns", Arc::new(Warns))
            .engine();

        let id = engine.start_flow("assessment", scope()).unwrap();
        engine.run_to_completion(id).unwrap();
        let instance = engine.load(id).unwrap();
        assert_eq!(instance.phases[0].warnings, vec!["coverage below tier target"]);
        assert_eq!(instance.status, FlowStatus::Completed);
    }

    #[test]
    fn event_log_ends_with_completion_event() {
        let spec = FlowTypeSpec::new("assessment", "halt")
            .with_phases(vec![PhaseSpec::new("collect", UnitOfWork::Handler("collect".into()))]);
        let mut engine = CtxBuilder::new(spec)
            .handler("collect", Arc::new(Emit { key: "inventory", value: json!([]) }))
            .engine();
        let id = engine.start_flow("assessment", scope()).unwrap();
        engine.run_to_completion(id).unwrap();

        let events = engine.event_store().list(id);
        assert!(matches!(events.last().map(|e| &e.kind),
                         Some(FlowEventKind::FlowCompleted { .. })));
        // seqs estrictamente crecientes desde 0
        for (i, ev) in events.iter().enumerate() {
            assert_eq!(ev.seq, i as u64);
        }
    }
}
