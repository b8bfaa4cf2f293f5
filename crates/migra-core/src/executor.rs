//! Ejecutor de tareas delegadas.
//!
//! Algunas fases no ejecutan un handler local sino una tarea externa
//! (colección automatizada, análisis pesado). El motor entrega los inputs
//! declarados y exige los outputs declarados; si falta alguno, la fase
//! falla de forma permanente.

use serde_json::{Map, Value};

use crate::errors::HandlerFailure;

pub trait TaskExecutor: Send + Sync {
    fn execute(&self,
               flow_type: &str,
               phase: &str,
               inputs: &Map<String, Value>)
               -> Result<Map<String, Value>, HandlerFailure>;
}

/// Ejecutor nulo para contextos donde ningún flujo declara trabajo
/// delegado. Falla de forma permanente si se invoca.
pub struct NullExecutor;

impl TaskExecutor for NullExecutor {
    fn execute(&self,
               flow_type: &str,
               phase: &str,
               _inputs: &Map<String, Value>)
               -> Result<Map<String, Value>, HandlerFailure> {
        Err(HandlerFailure::Permanent(format!(
            "no hay ejecutor configurado para {flow_type}/{phase}"
        )))
    }
}
