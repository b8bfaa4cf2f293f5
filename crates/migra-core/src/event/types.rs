//! Tipos de evento del flujo y estructura `FlowEvent`.
//!
//! Rol en el flujo:
//! - Cada ejecución del `FlowEngine` emite eventos a un `EventStore`
//!   append-only.
//! - Estos eventos permiten reconstruir el estado del `FlowRepository`
//!   (replay) sin depender de estructuras mutables.
//! - El enum `FlowEventKind` define el contrato observable y estable del
//!   motor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::checkpoint::Checkpoint;
use crate::errors::FlowEngineError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FlowEventKind {
    /// Emisión inicial de un flujo: fija tipo, `definition_hash`, cantidad de
    /// fases y el alcance de tenant. Invariante: debe ser el primer evento de
    /// un `flow_id`.
    FlowInitialized {
        flow_type: String,
        definition_hash: String,
        phase_count: usize,
        tenant_id: Uuid,
        engagement_id: Uuid,
    },
    /// La validación de la fase falló. No consume intento: todos los errores
    /// de todos los validadores viajan juntos.
    PhaseValidationFailed {
        phase_index: usize,
        phase: String,
        errors: Vec<String>,
        warnings: Vec<String>,
    },
    /// Una fase comenzó su intento `attempt` (1-based). No implica éxito.
    PhaseStarted {
        phase_index: usize,
        phase: String,
        attempt: u32,
    },
    /// La fase terminó correctamente; `state_delta` se fusiona al estado.
    PhaseFinished {
        phase_index: usize,
        phase: String,
        state_delta: Value,
        warnings: Vec<String>,
        fingerprint: String,
    },
    /// Un intento de la fase falló con error clasificable.
    PhaseFailed {
        phase_index: usize,
        phase: String,
        attempt: u32,
        error: FlowEngineError,
        fingerprint: String,
    },
    /// Fase saltada: sus inputs requeridos están ausentes y `can_skip` lo
    /// permite. Bypassea validación y ejecución.
    PhaseSkipped {
        phase_index: usize,
        phase: String,
        reason: String,
    },
    /// Reintento agendado tras un fallo reintentable.
    RetryScheduled {
        phase_index: usize,
        phase: String,
        attempt: u32,
        delay_ms: u64,
    },
    /// Snapshot persistido; su `data` se fusiona aditivamente en el estado.
    CheckpointSaved {
        phase_index: usize,
        phase: String,
        checkpoint: Checkpoint,
    },
    /// Datos externos aportados al estado (respuestas manuales del operador o
    /// handlers de ciclo de vida). `data` se fusiona por clave.
    InputProvided {
        phase: String,
        source: String,
        data: Value,
    },
    /// Flujo pausado en la frontera de la fase indicada.
    FlowPaused { phase_index: usize, phase: String },
    /// Flujo reanudado; la fase indicada re-entra en ejecución.
    FlowResumed { phase_index: usize, phase: String },
    /// Rollback ejecutado hacia la fase objetivo. `cleared` enumera las
    /// claves de estado eliminadas; `retained` las conservadas por política.
    RolledBack {
        to_phase_index: usize,
        to_phase: String,
        cleared: Vec<String>,
        retained: Vec<String>,
    },
    /// El flujo quedó en estado fallido pendiente de intervención manual.
    FlowFailed { phase: String, error: FlowEngineError },
    /// Evento de cierre con fingerprint agregado del flujo (hash de
    /// fingerprints ordenados de fases exitosas).
    FlowCompleted { flow_fingerprint: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowEvent {
    pub seq: u64, // asignado por el EventStore (orden append)
    pub flow_id: Uuid,
    pub kind: FlowEventKind,
    pub ts: DateTime<Utc>, // metadato (no entra en fingerprint)
}

/// Nombre legible de la variante del evento para logging/diagnóstico.
pub fn kind_variant_name(kind: &FlowEventKind) -> &'static str {
    match kind {
        FlowEventKind::FlowInitialized { .. } => "FlowInitialized",
        FlowEventKind::PhaseValidationFailed { .. } => "PhaseValidationFailed",
        FlowEventKind::PhaseStarted { .. } => "PhaseStarted",
        FlowEventKind::PhaseFinished { .. } => "PhaseFinished",
        FlowEventKind::PhaseFailed { .. } => "PhaseFailed",
        FlowEventKind::PhaseSkipped { .. } => "PhaseSkipped",
        FlowEventKind::RetryScheduled { .. } => "RetryScheduled",
        FlowEventKind::CheckpointSaved { .. } => "CheckpointSaved",
        FlowEventKind::InputProvided { .. } => "InputProvided",
        FlowEventKind::FlowPaused { .. } => "FlowPaused",
        FlowEventKind::FlowResumed { .. } => "FlowResumed",
        FlowEventKind::RolledBack { .. } => "RolledBack",
        FlowEventKind::FlowFailed { .. } => "FlowFailed",
        FlowEventKind::FlowCompleted { .. } => "FlowCompleted",
    }
}
