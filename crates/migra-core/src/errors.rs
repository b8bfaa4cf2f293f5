//! Errores específicos del core y su clasificación.
//!
//! El motor no inspecciona strings para decidir recuperación: cada error
//! terminal de fase se clasifica con `classify_error` y el error handler del
//! tipo de flujo decide la acción (retry / rollback / halt) sobre esa base.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fallo reportado por un handler o por el task executor externo.
///
/// Ningún pánico cruza la frontera de un handler: los fallos viajan como
/// valores, distinguiendo transitorios (reintentables) de permanentes.
#[derive(Debug, Error, PartialEq, Clone, Serialize, Deserialize)]
pub enum HandlerFailure {
    #[error("transient failure: {0}")]
    Transient(String),
    #[error("permanent failure: {0}")]
    Permanent(String),
}

#[derive(Debug, Error, PartialEq, Clone, Serialize, Deserialize)]
pub enum FlowEngineError {
    #[error("flow already completed")]
    FlowCompleted,
    #[error("flow is paused; resume it first")]
    FlowIsPaused,
    #[error("flow has failed previously (halt invariant)")]
    FlowHasFailed,
    #[error("flow not initialized")]
    FlowNotInitialized,
    #[error("unknown flow type: {0}")]
    UnknownFlowType(String),
    #[error("unknown phase: {0}")]
    UnknownPhase(String),
    /// Errores de todos los validadores de la fase, agregados (union).
    /// Un fallo de validación nunca consume un intento de retry.
    #[error("validation failed for phase {phase}: {errors:?}")]
    Validation {
        phase: String,
        errors: Vec<String>,
        warnings: Vec<String>,
    },
    #[error("retryable execution failure in phase {phase}: {reason}")]
    Retryable { phase: String, reason: String },
    #[error("fatal execution failure in phase {phase}: {reason}")]
    Fatal { phase: String, reason: String },
    #[error("phase {phase} exceeded its timeout of {timeout_ms} ms")]
    PhaseTimeout { phase: String, timeout_ms: u64 },
    #[error("missing declared executor outputs: {0:?}")]
    MissingOutputs(Vec<String>),
    #[error("pause not allowed for phase {0}")]
    PauseNotAllowed(String),
    #[error("skip not allowed for phase {0}")]
    SkipNotAllowed(String),
    #[error("rollback not allowed for flow type {0}")]
    RollbackNotAllowed(String),
    /// Gate deliberado: una fase irreversible exige reconocimiento manual del
    /// operador antes de cualquier acción destructiva.
    #[error("phase {0} is irreversible; operator acknowledgement required")]
    IrreversiblePhase(String),
    #[error("internal: {0}")]
    Internal(String),
}

/// Clase gruesa de un error, usada por error handlers y por la capa de
/// persistencia para auditoría.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Validation,
    Transient,
    Permanent,
    Runtime,
}

/// Clasifica un `FlowEngineError` sin inspección de strings.
pub fn classify_error(e: &FlowEngineError) -> ErrorClass {
    match e {
        FlowEngineError::Validation { .. } => ErrorClass::Validation,
        FlowEngineError::Retryable { .. } | FlowEngineError::PhaseTimeout { .. } => ErrorClass::Transient,
        FlowEngineError::Fatal { .. } | FlowEngineError::IrreversiblePhase(_) => ErrorClass::Permanent,
        _ => ErrorClass::Runtime,
    }
}

/// Error de arranque: nombres declarados por algún `FlowTypeSpec` que no
/// están registrados. Se agregan todos para que el operador vea el cuadro
/// completo en una sola pasada; el proceso no debe aceptar tráfico.
#[derive(Debug, Error, PartialEq, Clone)]
#[error("unresolved registrations at startup: {missing:?}")]
pub struct StartupValidationError {
    /// Entradas con formato `"{clase}:{nombre}"`, p.ej. `validator:data-quality`.
    pub missing: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_is_typed_not_textual() {
        let retry = FlowEngineError::Retryable { phase: "x".into(), reason: "conn reset".into() };
        let timeout = FlowEngineError::PhaseTimeout { phase: "x".into(), timeout_ms: 10 };
        let fatal = FlowEngineError::Fatal { phase: "x".into(), reason: "irreversible".into() };
        assert_eq!(classify_error(&retry), ErrorClass::Transient);
        assert_eq!(classify_error(&timeout), ErrorClass::Transient);
        assert_eq!(classify_error(&fatal), ErrorClass::Permanent);
        let val = FlowEngineError::Validation { phase: "x".into(), errors: vec![], warnings: vec![] };
        assert_eq!(classify_error(&val), ErrorClass::Validation);
    }
}
