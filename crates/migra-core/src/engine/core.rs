//! Motor de flujos por fases: avance secuencial, retry con backoff,
//! pause/resume, skip y rollback, todo sobre un log de eventos append-only.
//!
//! El motor nunca retiene estado mutable por flujo: cada operación
//! reconstruye la instancia desde el log (`FlowRepository`), decide y emite
//! nuevos eventos. Dos procesos leyendo el mismo log llegan a la misma
//! instancia.

use std::sync::Arc;
use std::time::Instant;

use log::{debug, info, warn};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::checkpoint::Checkpoint;
use crate::constants::ENGINE_VERSION;
use crate::errors::{FlowEngineError, HandlerFailure};
use crate::event::{EventStore, FlowEventKind};
use crate::hashing::hash_value;
use crate::registry::{AppContext, HandlerContext, RecoveryAction};
use crate::spec::{FlowTypeSpec, PhaseSpec, UnitOfWork};
use crate::state::{FlowInstance, FlowRepository, FlowStatus, PhaseStatus, TenantScope};

/// Resultado de un paso de avance.
#[derive(Debug, Clone, PartialEq)]
pub enum AdvanceOutcome {
    PhaseCompleted { phase: String },
    PhaseSkipped { phase: String },
    /// La fase falló y el error handler decidió revertir.
    RolledBack { to_phase: String },
    FlowCompleted { flow_fingerprint: String },
}

pub struct FlowEngine<E: EventStore, R: FlowRepository> {
    event_store: E,
    repository: R,
    ctx: Arc<AppContext>,
}

impl<E: EventStore, R: FlowRepository> FlowEngine<E, R> {
    pub fn new(event_store: E, repository: R, ctx: Arc<AppContext>) -> Self {
        Self { event_store, repository, ctx }
    }

    pub fn event_store(&self) -> &E {
        &self.event_store
    }

    pub fn context(&self) -> &AppContext {
        &self.ctx
    }

    /// Crea un flujo nuevo del tipo dado, emite `FlowInitialized` y ejecuta
    /// el init handler si el spec lo declara.
    pub fn start_flow(&mut self, flow_type: &str, scope: TenantScope) -> Result<Uuid, FlowEngineError> {
        let ctx = Arc::clone(&self.ctx);
        let spec = ctx.catalog
                      .get(flow_type)
                      .ok_or_else(|| FlowEngineError::UnknownFlowType(flow_type.to_string()))?;

        let flow_id = Uuid::new_v4();
        self.event_store.append_kind(flow_id,
                                     FlowEventKind::FlowInitialized { flow_type: spec.name.clone(),
                                                                      definition_hash: spec.definition_hash(),
                                                                      phase_count: spec.len(),
                                                                      tenant_id: scope.tenant_id,
                                                                      engagement_id: scope.engagement_id });
        info!("flow {flow_id} started (type={flow_type}, phases={})", spec.len());

        if let Some(init) = &spec.init_handler {
            let handler = ctx.handlers
                             .get(init)
                             .ok_or_else(|| FlowEngineError::Internal(format!("handler not registered: {init}")))?;
            let hctx = HandlerContext { flow_id,
                                        phase: "init".to_string(),
                                        scope,
                                        user_id: None };
            let seed = handler.handle(&hctx, &Value::Object(spec.defaults.clone()))
                              .map_err(|f| failure_to_error("init", f))?;
            if seed != Value::Null {
                self.event_store.append_kind(flow_id,
                                             FlowEventKind::InputProvided { phase: "init".to_string(),
                                                                            source: init.clone(),
                                                                            data: seed });
            }
        }

        Ok(flow_id)
    }

    /// Reconstruye la instancia desde el log.
    pub fn load(&self, flow_id: Uuid) -> Result<FlowInstance, FlowEngineError> {
        let events = self.event_store.list(flow_id);
        if events.is_empty() {
            return Err(FlowEngineError::FlowNotInitialized);
        }
        let flow_type = crate::state::flow_type_of(&events).ok_or(FlowEngineError::FlowNotInitialized)?;
        let spec = self.ctx
                       .catalog
                       .get(flow_type)
                       .ok_or_else(|| FlowEngineError::UnknownFlowType(flow_type.to_string()))?;
        Ok(self.repository.load(flow_id, &events, spec))
    }

    /// Avanza el flujo exactamente una fase: valida, ejecuta con retry y
    /// emite el desenlace. Los fallos de validación nunca consumen intentos.
    pub fn advance(&mut self, flow_id: Uuid) -> Result<AdvanceOutcome, FlowEngineError> {
        let ctx = Arc::clone(&self.ctx);
        let instance = self.load(flow_id)?;
        guard_active(&instance)?;

        let spec = ctx.catalog
                      .get(&instance.flow_type)
                      .ok_or_else(|| FlowEngineError::UnknownFlowType(instance.flow_type.clone()))?;

        if instance.cursor >= spec.len() {
            return self.finalize(flow_id, &ctx, spec, &instance);
        }
        let phase_index = instance.cursor;
        let phase = &spec.phases[phase_index];

        // Inputs requeridos ausentes: skip automático si la fase lo permite,
        // error de validación si no.
        let missing = missing_required_inputs(phase, &instance);
        if !missing.is_empty() && phase.caps.can_skip {
            let reason = format!("missing required inputs: {}", missing.join(", "));
            warn!("flow {flow_id}: skipping phase {} ({reason})", phase.name);
            self.event_store.append_kind(flow_id,
                                         FlowEventKind::PhaseSkipped { phase_index,
                                                                       phase: phase.name.clone(),
                                                                       reason });
            return Ok(AdvanceOutcome::PhaseSkipped { phase: phase.name.clone() });
        }

        // Validación agregada: corren TODOS los validadores y los errores se
        // unen, incluidos los inputs ausentes.
        let (mut errors, warnings) = run_validators(&ctx, phase, spec, &instance);
        for key in &missing {
            errors.push(format!("required input missing: {key}"));
        }
        if !errors.is_empty() {
            self.event_store.append_kind(flow_id,
                                         FlowEventKind::PhaseValidationFailed { phase_index,
                                                                                phase: phase.name.clone(),
                                                                                errors: errors.clone(),
                                                                                warnings: warnings.clone() });
            return Err(FlowEngineError::Validation { phase: phase.name.clone(),
                                                     errors,
                                                     warnings });
        }

        // Ejecución con presupuesto de retry. El primer intento es
        // attempts+1 para que un resume tras fallo no repita numeración.
        let first_attempt = instance.attempts_for(&phase.name) + 1;
        let mut attempt = first_attempt;
        loop {
            self.event_store.append_kind(flow_id,
                                         FlowEventKind::PhaseStarted { phase_index,
                                                                       phase: phase.name.clone(),
                                                                       attempt });
            debug!("flow {flow_id}: phase {} attempt {attempt}", phase.name);
            let started = Instant::now();
            let result = self.execute_phase(flow_id, &ctx, phase, &instance);

            let result = match result {
                Ok(delta) => match phase.timeout {
                    Some(budget) if started.elapsed() > budget => {
                        Err(FlowEngineError::PhaseTimeout { phase: phase.name.clone(),
                                                            timeout_ms: budget.as_millis() as u64 })
                    }
                    _ => Ok(delta),
                },
                Err(e) => Err(e),
            };

            match result {
                Ok(delta) => {
                    return self.finish_phase(flow_id, &ctx, spec, phase, phase_index, &instance, delta,
                                             warnings);
                }
                Err(err) => {
                    let fingerprint = failure_fingerprint(&phase.name, attempt, &err);
                    self.event_store.append_kind(flow_id,
                                                 FlowEventKind::PhaseFailed { phase_index,
                                                                              phase: phase.name.clone(),
                                                                              attempt,
                                                                              error: err.clone(),
                                                                              fingerprint });

                    let retryable = matches!(err,
                                             FlowEngineError::Retryable { .. }
                                             | FlowEngineError::PhaseTimeout { .. });
                    if retryable && attempt < phase.retry.max_attempts {
                        let delay = phase.retry.delay_for(attempt);
                        attempt += 1;
                        self.event_store.append_kind(flow_id,
                                                     FlowEventKind::RetryScheduled { phase_index,
                                                                                     phase: phase.name.clone(),
                                                                                     attempt,
                                                                                     delay_ms: delay.as_millis()
                                                                                               as u64 });
                        std::thread::sleep(delay);
                        continue;
                    }

                    return self.settle_failure(flow_id, &ctx, spec, phase, &err, attempt);
                }
            }
        }
    }

    /// Avanza hasta completar el flujo o hasta el primer error no resuelto
    /// por el error handler.
    pub fn run_to_completion(&mut self, flow_id: Uuid) -> Result<FlowInstance, FlowEngineError> {
        let spec_len = self.load(flow_id)?.phases.len();
        let max_iter = self.ctx
                           .catalog
                           .get(&self.load(flow_id)?.flow_type)
                           .map(|s| s.caps.max_iterations.max(1) as usize)
                           .unwrap_or(1);
        let budget = (spec_len + 2) * max_iter + spec_len;

        for _ in 0..budget {
            match self.advance(flow_id)? {
                AdvanceOutcome::FlowCompleted { .. } => return self.load(flow_id),
                _ => continue,
            }
        }
        Err(FlowEngineError::Internal("iteration budget exceeded".to_string()))
    }

    /// Pausa el flujo en la frontera de la fase actual.
    pub fn pause(&mut self, flow_id: Uuid) -> Result<(), FlowEngineError> {
        let ctx = Arc::clone(&self.ctx);
        let instance = self.load(flow_id)?;
        guard_active(&instance)?;
        let spec = ctx.catalog
                      .get(&instance.flow_type)
                      .ok_or_else(|| FlowEngineError::UnknownFlowType(instance.flow_type.clone()))?;
        let phase = current_phase_spec(spec, &instance)?;
        if !spec.caps.pause_resume || !phase.caps.can_pause {
            return Err(FlowEngineError::PauseNotAllowed(phase.name.clone()));
        }
        self.event_store.append_kind(flow_id,
                                     FlowEventKind::FlowPaused { phase_index: instance.cursor,
                                                                 phase: phase.name.clone() });
        info!("flow {flow_id} paused at phase {}", phase.name);
        Ok(())
    }

    /// Reanuda un flujo pausado. El estado tras resume es idéntico al estado
    /// previo a la pausa: ambos derivan del mismo log.
    pub fn resume(&mut self, flow_id: Uuid) -> Result<(), FlowEngineError> {
        let instance = self.load(flow_id)?;
        if instance.status != FlowStatus::Paused {
            return Err(FlowEngineError::Internal("flow is not paused".to_string()));
        }
        let phase = instance.current_phase().unwrap_or("").to_string();
        self.event_store.append_kind(flow_id,
                                     FlowEventKind::FlowResumed { phase_index: instance.cursor, phase });
        Ok(())
    }

    /// Rehabilita un flujo fallido: la fase fallida recupera presupuesto de
    /// retry completo.
    pub fn retry_failed(&mut self, flow_id: Uuid) -> Result<(), FlowEngineError> {
        let instance = self.load(flow_id)?;
        if instance.status != FlowStatus::Failed {
            return Err(FlowEngineError::Internal("flow has not failed".to_string()));
        }
        let phase = instance.current_phase().unwrap_or("").to_string();
        self.event_store.append_kind(flow_id,
                                     FlowEventKind::FlowResumed { phase_index: instance.cursor, phase });
        Ok(())
    }

    /// Salta la fase actual por decisión del operador.
    pub fn skip_phase(&mut self, flow_id: Uuid, reason: &str) -> Result<(), FlowEngineError> {
        let ctx = Arc::clone(&self.ctx);
        let instance = self.load(flow_id)?;
        guard_active(&instance)?;
        let spec = ctx.catalog
                      .get(&instance.flow_type)
                      .ok_or_else(|| FlowEngineError::UnknownFlowType(instance.flow_type.clone()))?;
        let phase = current_phase_spec(spec, &instance)?;
        if !phase.caps.can_skip {
            return Err(FlowEngineError::SkipNotAllowed(phase.name.clone()));
        }
        // Saltar solo aplica cuando a la fase le faltan inputs requeridos;
        // con los inputs presentes la fase debe ejecutarse.
        if missing_required_inputs(phase, &instance).is_empty() {
            return Err(FlowEngineError::SkipNotAllowed(phase.name.clone()));
        }
        self.event_store.append_kind(flow_id,
                                     FlowEventKind::PhaseSkipped { phase_index: instance.cursor,
                                                                   phase: phase.name.clone(),
                                                                   reason: reason.to_string() });
        Ok(())
    }

    /// Revierte el flujo hasta `target_phase`. Las fases irreversibles en el
    /// rango exigen `ack_irreversible`; la tabla de rollback del tipo de
    /// flujo determina qué claves de estado se limpian y cuáles se retienen.
    pub fn rollback_to(&mut self,
                       flow_id: Uuid,
                       target_phase: &str,
                       ack_irreversible: bool)
                       -> Result<Vec<String>, FlowEngineError> {
        let ctx = Arc::clone(&self.ctx);
        let instance = self.load(flow_id)?;
        if instance.status == FlowStatus::Completed {
            return Err(FlowEngineError::FlowCompleted);
        }
        let spec = ctx.catalog
                      .get(&instance.flow_type)
                      .ok_or_else(|| FlowEngineError::UnknownFlowType(instance.flow_type.clone()))?;
        if !spec.caps.rollback {
            return Err(FlowEngineError::RollbackNotAllowed(spec.name.clone()));
        }
        let (target_index, _) = spec.phase(target_phase)
                                    .ok_or_else(|| FlowEngineError::UnknownPhase(target_phase.to_string()))?;
        if target_index > instance.cursor {
            return Err(FlowEngineError::Internal(format!("cannot roll back forward to {target_phase}")));
        }

        // De la más reciente a la objetivo, inclusive.
        let upper = instance.cursor.min(spec.len().saturating_sub(1));
        let undo: Vec<&str> = (target_index..=upper).rev().map(|i| spec.phases[i].name.as_str()).collect();
        for name in &undo {
            let (_, p) = spec.phase(name).ok_or_else(|| FlowEngineError::UnknownPhase(name.to_string()))?;
            if !p.caps.can_rollback && !ack_irreversible {
                return Err(FlowEngineError::IrreversiblePhase(p.name.clone()));
            }
        }

        let table = ctx.rollback_tables.get(&spec.name).cloned().unwrap_or_default();
        let cleared: Vec<String> = table.keys_to_clear(&undo)
                                        .into_iter()
                                        .filter(|k| instance.phase_state.contains_key(k))
                                        .collect();
        let retained: Vec<String> = table.keys_to_retain(&undo)
                                         .into_iter()
                                         .filter(|k| instance.phase_state.contains_key(k))
                                         .collect();

        info!("flow {flow_id}: rollback to {target_phase} (cleared {} keys)", cleared.len());
        self.event_store.append_kind(flow_id,
                                     FlowEventKind::RolledBack { to_phase_index: target_index,
                                                                 to_phase: target_phase.to_string(),
                                                                 cleared: cleared.clone(),
                                                                 retained });
        Ok(cleared)
    }

    /// Aporta datos externos al estado del flujo (p.ej. respuestas manuales
    /// recolectadas fuera de banda). Permitido también en pausa.
    pub fn provide_input(&mut self, flow_id: Uuid, source: &str, data: Value) -> Result<(), FlowEngineError> {
        let instance = self.load(flow_id)?;
        if instance.status == FlowStatus::Completed {
            return Err(FlowEngineError::FlowCompleted);
        }
        let phase = instance.current_phase().unwrap_or("").to_string();
        self.event_store.append_kind(flow_id,
                                     FlowEventKind::InputProvided { phase,
                                                                    source: source.to_string(),
                                                                    data });
        Ok(())
    }

    // ---- internos ----

    /// Corre pre-handlers, unidad de trabajo y post-handlers acumulando el
    /// delta de estado de la fase.
    fn execute_phase(&mut self,
                     flow_id: Uuid,
                     ctx: &AppContext,
                     phase: &PhaseSpec,
                     instance: &FlowInstance)
                     -> Result<Value, FlowEngineError> {
        let hctx = HandlerContext { flow_id,
                                    phase: phase.name.clone(),
                                    scope: instance.scope,
                                    user_id: None };
        let mut working = instance.state_value();
        let mut delta = Value::Object(Map::new());

        for name in &phase.pre_handlers {
            let out = self.invoke_handler(ctx, name, &hctx, &working, &phase.name)?;
            working = crate::merge::merge_json(&working, &out);
            delta = crate::merge::merge_json(&delta, &out);
        }

        let out = match &phase.work {
            UnitOfWork::Handler(name) => self.invoke_handler(ctx, name, &hctx, &working, &phase.name)?,
            UnitOfWork::Executor { inputs, required_outputs } => {
                let mut payload = Map::new();
                if let Value::Object(state) = &working {
                    for key in inputs {
                        if let Some(v) = state.get(key) {
                            payload.insert(key.clone(), v.clone());
                        }
                    }
                }
                let outputs = ctx.executor
                                 .execute(&instance.flow_type, &phase.name, &payload)
                                 .map_err(|f| failure_to_error(&phase.name, f))?;
                let missing: Vec<String> = required_outputs.iter()
                                                           .filter(|k| !outputs.contains_key(*k))
                                                           .cloned()
                                                           .collect();
                if !missing.is_empty() {
                    return Err(FlowEngineError::MissingOutputs(missing));
                }
                Value::Object(outputs)
            }
        };
        working = crate::merge::merge_json(&working, &out);
        delta = crate::merge::merge_json(&delta, &out);

        for name in &phase.post_handlers {
            let out = self.invoke_handler(ctx, name, &hctx, &working, &phase.name)?;
            working = crate::merge::merge_json(&working, &out);
            delta = crate::merge::merge_json(&delta, &out);
        }

        Ok(delta)
    }

    fn invoke_handler(&self,
                      ctx: &AppContext,
                      name: &str,
                      hctx: &HandlerContext,
                      payload: &Value,
                      phase: &str)
                      -> Result<Value, FlowEngineError> {
        let handler = ctx.handlers
                         .get(name)
                         .ok_or_else(|| FlowEngineError::Internal(format!("handler not registered: {name}")))?;
        handler.handle(hctx, payload).map_err(|f| failure_to_error(phase, f))
    }

    #[allow(clippy::too_many_arguments)]
    fn finish_phase(&mut self,
                    flow_id: Uuid,
                    ctx: &AppContext,
                    spec: &FlowTypeSpec,
                    phase: &PhaseSpec,
                    phase_index: usize,
                    instance: &FlowInstance,
                    delta: Value,
                    warnings: Vec<String>)
                    -> Result<AdvanceOutcome, FlowEngineError> {
        let fingerprint = hash_value(&json!({
            "engine": ENGINE_VERSION,
            "definition": spec.definition_hash(),
            "phase": phase.name,
            "delta": delta,
        }));
        self.event_store.append_kind(flow_id,
                                     FlowEventKind::PhaseFinished { phase_index,
                                                                    phase: phase.name.clone(),
                                                                    state_delta: delta.clone(),
                                                                    warnings,
                                                                    fingerprint });

        if let Some(name) = &phase.completion_handler {
            let hctx = HandlerContext { flow_id,
                                        phase: phase.name.clone(),
                                        scope: instance.scope,
                                        user_id: None };
            let refreshed = self.load(flow_id)?;
            let out = self.invoke_handler(ctx, name, &hctx, &refreshed.state_value(), &phase.name)?;
            if out != Value::Null {
                self.event_store.append_kind(flow_id,
                                             FlowEventKind::InputProvided { phase: phase.name.clone(),
                                                                            source: name.clone(),
                                                                            data: out });
            }
        }

        // El checkpoint cierra la fase: se emite después de que el
        // completion handler haya aportado sus inputs.
        if spec.caps.checkpointing {
            let progress = (phase_index + 1) as f64 / spec.len().max(1) as f64;
            let cp = Checkpoint::new(&phase.name, delta, progress, spec.caps.pause_resume);
            self.event_store.append_kind(flow_id,
                                         FlowEventKind::CheckpointSaved { phase_index,
                                                                          phase: phase.name.clone(),
                                                                          checkpoint: cp });
        }

        if phase_index + 1 >= spec.len() {
            let refreshed = self.load(flow_id)?;
            return self.finalize(flow_id, ctx, spec, &refreshed);
        }
        Ok(AdvanceOutcome::PhaseCompleted { phase: phase.name.clone() })
    }

    fn finalize(&mut self,
                flow_id: Uuid,
                ctx: &AppContext,
                spec: &FlowTypeSpec,
                instance: &FlowInstance)
                -> Result<AdvanceOutcome, FlowEngineError> {
        if let Some(name) = &spec.final_handler {
            let hctx = HandlerContext { flow_id,
                                        phase: "final".to_string(),
                                        scope: instance.scope,
                                        user_id: None };
            let out = self.invoke_handler(ctx, name, &hctx, &instance.state_value(), "final")?;
            if out != Value::Null {
                self.event_store.append_kind(flow_id,
                                             FlowEventKind::InputProvided { phase: "final".to_string(),
                                                                            source: name.clone(),
                                                                            data: out });
            }
        }

        let fingerprints: Vec<&str> = instance.phases
                                              .iter()
                                              .filter(|s| s.status == PhaseStatus::Completed)
                                              .filter_map(|s| s.fingerprint.as_deref())
                                              .collect();
        let flow_fingerprint = hash_value(&json!({
            "engine": ENGINE_VERSION,
            "definition": spec.definition_hash(),
            "phases": fingerprints,
        }));
        self.event_store.append_kind(flow_id,
                                     FlowEventKind::FlowCompleted { flow_fingerprint: flow_fingerprint.clone() });
        info!("flow {flow_id} completed");
        Ok(AdvanceOutcome::FlowCompleted { flow_fingerprint })
    }

    /// Fallo terminal del intento: consulta el error handler del tipo de
    /// flujo y aplica su decisión.
    fn settle_failure(&mut self,
                      flow_id: Uuid,
                      ctx: &AppContext,
                      spec: &FlowTypeSpec,
                      phase: &PhaseSpec,
                      err: &FlowEngineError,
                      attempt: u32)
                      -> Result<AdvanceOutcome, FlowEngineError> {
        let decision = ctx.error_handlers
                          .get(&spec.error_handler)
                          .map(|h| h.classify(&phase.name, err, attempt))
                          .unwrap_or_else(crate::registry::ErrorDecision::halt);

        match decision.action {
            RecoveryAction::Rollback { to_phase } => {
                warn!("flow {flow_id}: phase {} failed, rolling back to {to_phase}", phase.name);
                match self.rollback_to(flow_id, &to_phase, false) {
                    Ok(_) => Ok(AdvanceOutcome::RolledBack { to_phase }),
                    // Si el rollback no es posible (fase irreversible en el
                    // rango, objetivo desconocido) el flujo queda fallido
                    // igual que con Halt.
                    Err(rollback_err) => {
                        warn!("flow {flow_id}: rollback to {to_phase} rejected: {rollback_err}");
                        self.event_store.append_kind(flow_id,
                                                     FlowEventKind::FlowFailed { phase: phase.name.clone(),
                                                                                 error: err.clone() });
                        Err(err.clone())
                    }
                }
            }
            // Retry tras presupuesto agotado significa: el flujo queda
            // fallido y un `retry_failed` del operador renueva el presupuesto.
            RecoveryAction::Retry | RecoveryAction::Halt => {
                self.event_store.append_kind(flow_id,
                                             FlowEventKind::FlowFailed { phase: phase.name.clone(),
                                                                         error: err.clone() });
                warn!("flow {flow_id} failed at phase {}: {err}", phase.name);
                Err(err.clone())
            }
        }
    }
}

fn guard_active(instance: &FlowInstance) -> Result<(), FlowEngineError> {
    match instance.status {
        FlowStatus::Completed => Err(FlowEngineError::FlowCompleted),
        FlowStatus::Paused => Err(FlowEngineError::FlowIsPaused),
        FlowStatus::Failed => Err(FlowEngineError::FlowHasFailed),
        _ => Ok(()),
    }
}

fn current_phase_spec<'a>(spec: &'a FlowTypeSpec,
                          instance: &FlowInstance)
                          -> Result<&'a PhaseSpec, FlowEngineError> {
    spec.phases.get(instance.cursor).ok_or(FlowEngineError::FlowCompleted)
}

fn missing_required_inputs(phase: &PhaseSpec, instance: &FlowInstance) -> Vec<String> {
    phase.required_inputs
         .iter()
         .filter(|k| !instance.phase_state.contains_key(*k))
         .cloned()
         .collect()
}

/// Corre todos los validadores de la fase y agrega errores y warnings.
fn run_validators(ctx: &AppContext,
                  phase: &PhaseSpec,
                  spec: &FlowTypeSpec,
                  instance: &FlowInstance)
                  -> (Vec<String>, Vec<String>) {
    let state = instance.state_value();
    let input = phase_input(phase, &state);
    let overrides = Value::Object(spec.defaults.clone());

    let mut errors = vec![];
    let mut warnings = vec![];
    for name in &phase.validators {
        match ctx.validators.get(name) {
            Some(v) => {
                let report = v.validate(&input, &state, &overrides);
                errors.extend(report.errors);
                warnings.extend(report.warnings);
            }
            None => errors.push(format!("validator not registered: {name}")),
        }
    }
    (errors, warnings)
}

/// Proyección del estado a los inputs declarados de la fase.
fn phase_input(phase: &PhaseSpec, state: &Value) -> Value {
    let mut out = Map::new();
    if let Value::Object(map) = state {
        for key in phase.required_inputs.iter().chain(phase.optional_inputs.iter()) {
            if let Some(v) = map.get(key) {
                out.insert(key.clone(), v.clone());
            }
        }
    }
    Value::Object(out)
}

fn failure_to_error(phase: &str, f: HandlerFailure) -> FlowEngineError {
    match f {
        HandlerFailure::Transient(reason) => FlowEngineError::Retryable { phase: phase.to_string(), reason },
        HandlerFailure::Permanent(reason) => FlowEngineError::Fatal { phase: phase.to_string(), reason },
    }
}

fn failure_fingerprint(phase: &str, attempt: u32, err: &FlowEngineError) -> String {
    hash_value(&json!({
        "engine": ENGINE_VERSION,
        "phase": phase,
        "attempt": attempt,
        "error": err.to_string(),
    }))
}
