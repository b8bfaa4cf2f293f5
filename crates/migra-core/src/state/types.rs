//! Estado reconstruido de un flujo (`FlowInstance`) vía replay de eventos.
//!
//! El repositorio aplica un replay lineal: consume eventos en orden y
//! actualiza la instancia evento a evento. El estado acumulado
//! (`phase_state`) sólo crece por fusión de deltas; nunca se muta en sitio
//! fuera del replay, de modo que dos lecturas del mismo log producen
//! instancias idénticas.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::checkpoint::{merge_checkpoint, Checkpoint};
use crate::errors::FlowEngineError;
use crate::event::{FlowEvent, FlowEventKind};
use crate::merge::merge_json;
use crate::spec::FlowTypeSpec;

/// Alcance obligatorio de tenant para toda instancia y toda mutación del
/// almacén de dominio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantScope {
    pub tenant_id: Uuid,
    pub engagement_id: Uuid,
}

impl TenantScope {
    pub fn new(tenant_id: Uuid, engagement_id: Uuid) -> Self {
        Self { tenant_id, engagement_id }
    }
}

/// Estado observable de una fase tras el replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

/// Estado global del flujo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowStatus {
    NotStarted,
    Running,
    Paused,
    /// Estado derivado revertido a una fase anterior; re-ejecutable desde
    /// ella.
    RolledBack,
    Completed,
    Failed,
}

/// Estado de una fase en la instancia.
#[derive(Debug, Clone)]
pub struct PhaseSlot {
    pub phase: String,
    pub status: PhaseStatus,
    /// Intentos de ejecución consumidos (los fallos de validación no cuentan).
    pub attempts: u32,
    pub warnings: Vec<String>,
    pub validation_errors: Vec<String>,
    pub last_error: Option<FlowEngineError>,
    pub fingerprint: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl PhaseSlot {
    fn pending(phase: &str) -> Self {
        Self { phase: phase.to_string(),
               status: PhaseStatus::Pending,
               attempts: 0,
               warnings: vec![],
               validation_errors: vec![],
               last_error: None,
               fingerprint: None,
               started_at: None,
               finished_at: None }
    }

    fn reset(&mut self) {
        let phase = self.phase.clone();
        *self = PhaseSlot::pending(&phase);
    }
}

pub struct FlowInstance {
    pub id: Uuid,
    pub flow_type: String,
    pub scope: TenantScope,
    pub status: FlowStatus,
    pub phases: Vec<PhaseSlot>,
    /// Índice de la próxima fase no terminada.
    pub cursor: usize,
    /// Estado clave-valor acumulado por fusión de deltas de fase,
    /// checkpoints e inputs externos.
    pub phase_state: IndexMap<String, Value>,
    /// Historial aditivo de checkpoints (nunca se descartan).
    pub checkpoints: Vec<Checkpoint>,
}

impl FlowInstance {
    pub fn current_phase(&self) -> Option<&str> {
        self.phases.get(self.cursor).map(|s| s.phase.as_str())
    }

    pub fn attempts_for(&self, phase: &str) -> u32 {
        self.phases
            .iter()
            .find(|s| s.phase == phase)
            .map(|s| s.attempts)
            .unwrap_or(0)
    }

    /// Checkpoint más reciente de la fase objetivo, si existe.
    pub fn latest_checkpoint_for(&self, phase: &str) -> Option<&Checkpoint> {
        self.checkpoints.iter().rev().find(|c| c.phase == phase)
    }

    /// Estado completo como objeto JSON (para validadores y handlers).
    pub fn state_value(&self) -> Value {
        let mut map = serde_json::Map::new();
        for (k, v) in &self.phase_state {
            map.insert(k.clone(), v.clone());
        }
        Value::Object(map)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.status, FlowStatus::Completed | FlowStatus::Failed)
    }
}

/// Trait para reconstruir (`replay`) el estado de un flujo a partir de
/// eventos.
pub trait FlowRepository {
    fn load(&self, flow_id: Uuid, events: &[FlowEvent], spec: &FlowTypeSpec) -> FlowInstance;
}

pub struct InMemoryFlowRepository;

impl InMemoryFlowRepository {
    pub fn new() -> Self {
        Self
    }
}

impl Default for InMemoryFlowRepository {
    fn default() -> Self {
        Self::new()
    }
}

fn merge_delta(state: &mut IndexMap<String, Value>, delta: &Value) {
    if let Value::Object(map) = delta {
        for (k, v) in map {
            let merged = match state.get(k) {
                Some(existing) => merge_json(existing, v),
                None => v.clone(),
            };
            state.insert(k.clone(), merged);
        }
    }
}

impl FlowRepository for InMemoryFlowRepository {
    fn load(&self, flow_id: Uuid, events: &[FlowEvent], spec: &FlowTypeSpec) -> FlowInstance {
        let mut phases: Vec<PhaseSlot> = spec.phases.iter().map(|p| PhaseSlot::pending(&p.name)).collect();
        let mut status = FlowStatus::NotStarted;
        let mut scope = TenantScope::new(Uuid::nil(), Uuid::nil());
        let mut phase_state: IndexMap<String, Value> = IndexMap::new();
        let mut checkpoints: Vec<Checkpoint> = vec![];

        for ev in events {
            match &ev.kind {
                FlowEventKind::FlowInitialized { tenant_id, engagement_id, .. } => {
                    scope = TenantScope::new(*tenant_id, *engagement_id);
                }
                FlowEventKind::PhaseValidationFailed { phase_index, errors, .. } => {
                    if let Some(slot) = phases.get_mut(*phase_index) {
                        slot.validation_errors = errors.clone();
                    }
                }
                FlowEventKind::PhaseStarted { phase_index, attempt, .. } => {
                    if let Some(slot) = phases.get_mut(*phase_index) {
                        slot.status = PhaseStatus::Running;
                        slot.started_at.get_or_insert(ev.ts);
                        slot.attempts = slot.attempts.max(*attempt);
                    }
                    status = FlowStatus::Running;
                }
                FlowEventKind::PhaseFinished { phase_index,
                                               state_delta,
                                               warnings,
                                               fingerprint,
                                               .. } => {
                    if let Some(slot) = phases.get_mut(*phase_index) {
                        slot.status = PhaseStatus::Completed;
                        slot.warnings = warnings.clone();
                        slot.fingerprint = Some(fingerprint.clone());
                        slot.finished_at = Some(ev.ts);
                        slot.last_error = None;
                    }
                    merge_delta(&mut phase_state, state_delta);
                }
                FlowEventKind::PhaseFailed { phase_index, error, fingerprint, .. } => {
                    if let Some(slot) = phases.get_mut(*phase_index) {
                        slot.status = PhaseStatus::Failed;
                        slot.last_error = Some(error.clone());
                        slot.fingerprint = Some(fingerprint.clone());
                        slot.finished_at = Some(ev.ts);
                    }
                }
                FlowEventKind::PhaseSkipped { phase_index, .. } => {
                    if let Some(slot) = phases.get_mut(*phase_index) {
                        slot.status = PhaseStatus::Skipped;
                        slot.finished_at = Some(ev.ts);
                    }
                }
                FlowEventKind::RetryScheduled { phase_index, .. } => {
                    // El intento agendado re-entra en ejecución; el slot vuelve
                    // a considerarse en curso.
                    if let Some(slot) = phases.get_mut(*phase_index) {
                        slot.status = PhaseStatus::Running;
                    }
                }
                FlowEventKind::CheckpointSaved { checkpoint, .. } => {
                    merge_checkpoint(&mut phase_state, checkpoint);
                    checkpoints.push(checkpoint.clone());
                }
                FlowEventKind::InputProvided { data, .. } => {
                    merge_delta(&mut phase_state, data);
                }
                FlowEventKind::FlowPaused { .. } => status = FlowStatus::Paused,
                FlowEventKind::FlowResumed { phase_index, .. } => {
                    if let Some(slot) = phases.get_mut(*phase_index) {
                        // Reanudar un slot fallido renueva su presupuesto de
                        // reintentos completo.
                        if slot.status == PhaseStatus::Failed {
                            slot.status = PhaseStatus::Pending;
                            slot.attempts = 0;
                        }
                    }
                    status = FlowStatus::Running;
                }
                FlowEventKind::RolledBack { to_phase_index, cleared, .. } => {
                    for key in cleared {
                        phase_state.shift_remove(key);
                    }
                    for slot in phases.iter_mut().skip(*to_phase_index) {
                        slot.reset();
                    }
                    status = FlowStatus::RolledBack;
                }
                FlowEventKind::FlowFailed { .. } => status = FlowStatus::Failed,
                FlowEventKind::FlowCompleted { .. } => status = FlowStatus::Completed,
            }
        }

        let cursor = phases.iter()
                           .position(|s| !matches!(s.status, PhaseStatus::Completed | PhaseStatus::Skipped))
                           .unwrap_or(phases.len());

        FlowInstance { id: flow_id,
                       flow_type: spec.name.clone(),
                       scope,
                       status,
                       phases,
                       cursor,
                       phase_state,
                       checkpoints }
    }
}

/// Extrae el tipo de flujo desde el evento inicial, sin necesitar el spec.
pub fn flow_type_of(events: &[FlowEvent]) -> Option<&str> {
    events.iter().find_map(|e| match &e.kind {
        FlowEventKind::FlowInitialized { flow_type, .. } => Some(flow_type.as_str()),
        _ => None,
    })
}
