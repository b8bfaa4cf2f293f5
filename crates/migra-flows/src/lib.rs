//! migra-flows: catálogo de flujos de evaluación de migración y sus
//! validadores y handlers registrados por nombre.
//!
//! El crate es pura configuración más lógica de fase determinista; el motor
//! (migra-core) y la persistencia (migra-persistence) no conocen estos tipos
//! de flujo concretos.

pub mod catalog;
pub mod handlers;
pub mod tiers;
pub mod validators;

pub use catalog::{build_app_context, build_catalog, build_rollback_tables};
pub use handlers::DefaultErrorHandler;
pub use tiers::AutomationTier;
