//! Handlers de error por tipo de flujo: deciden la acción de recuperación
//! cuando una fase agota su política de reintentos o falla de forma
//! permanente.

use std::collections::HashMap;
use std::sync::Arc;

use crate::errors::FlowEngineError;

/// Acción de recuperación elegida por el handler de error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Reintentar la fase (consume un nuevo presupuesto tras `resume`).
    Retry,
    /// Revertir el flujo a una fase anterior.
    Rollback { to_phase: String },
    /// Detener el flujo en estado fallido.
    Halt,
}

#[derive(Debug, Clone)]
pub struct ErrorDecision {
    pub recoverable: bool,
    pub action: RecoveryAction,
}

impl ErrorDecision {
    pub fn halt() -> Self {
        Self { recoverable: false, action: RecoveryAction::Halt }
    }
}

pub trait ErrorHandler: Send + Sync {
    fn classify(&self, phase: &str, error: &FlowEngineError, attempt: u32) -> ErrorDecision;
}

#[derive(Default)]
pub struct ErrorHandlerRegistry {
    inner: HashMap<String, Arc<dyn ErrorHandler>>,
}

impl ErrorHandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &str, handler: Arc<dyn ErrorHandler>) {
        self.inner.insert(name.to_string(), handler);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ErrorHandler>> {
        self.inner.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.contains_key(name)
    }
}
