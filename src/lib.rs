//! MigraFlow
//!
//! Fachada del workspace: re-exporta el motor (migra-core), el dominio
//! (migra-domain), el catálogo de flujos (migra-flows) y la persistencia
//! (migra-persistence), más un constructor de motor en memoria para demos
//! y tests de integración.

use std::sync::Arc;

pub use migra_core;
pub use migra_domain;
pub use migra_flows;
pub use migra_persistence;

use migra_core::errors::StartupValidationError;
use migra_core::executor::{NullExecutor, TaskExecutor};
use migra_core::{FlowEngine, InMemoryEventStore, InMemoryFlowRepository};

pub type InMemoryEngine = FlowEngine<InMemoryEventStore, InMemoryFlowRepository>;

/// Motor en memoria con el catálogo completo de flujos registrado.
pub fn build_inmemory_engine(executor: Arc<dyn TaskExecutor>) -> Result<InMemoryEngine, StartupValidationError> {
    let ctx = migra_flows::build_app_context(executor)?;
    Ok(FlowEngine::new(InMemoryEventStore::default(), InMemoryFlowRepository::new(), ctx))
}

/// Variante sin executor externo: las fases de executor fallan permanente.
pub fn build_demo_engine() -> Result<InMemoryEngine, StartupValidationError> {
    build_inmemory_engine(Arc::new(NullExecutor))
}
