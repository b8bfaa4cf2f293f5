//! Registro de handlers de fase (pre, work, post y ciclo de vida).

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use uuid::Uuid;

use crate::errors::HandlerFailure;
use crate::state::TenantScope;

/// Contexto inyectado a cada handler. El alcance de tenant viaja siempre
/// con la invocación; un handler nunca lo deduce del payload.
#[derive(Debug, Clone)]
pub struct HandlerContext {
    pub flow_id: Uuid,
    pub phase: String,
    pub scope: TenantScope,
    pub user_id: Option<String>,
}

/// Contrato de handler. Devuelve un delta JSON que el motor fusiona en el
/// estado del flujo, o un `HandlerFailure` clasificado como transitorio o
/// permanente.
pub trait PhaseHandler: Send + Sync {
    fn handle(&self, ctx: &HandlerContext, payload: &Value) -> Result<Value, HandlerFailure>;
}

#[derive(Default)]
pub struct HandlerRegistry {
    inner: HashMap<String, Arc<dyn PhaseHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &str, handler: Arc<dyn PhaseHandler>) {
        self.inner.insert(name.to_string(), handler);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn PhaseHandler>> {
        self.inner.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.contains_key(name)
    }
}
