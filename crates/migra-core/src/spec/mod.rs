//! Definiciones declarativas: fases, tipos de flujo y catálogo.

pub mod catalog;
pub mod flow_type;
pub mod phase;

pub use catalog::FlowCatalog;
pub use flow_type::{FlowCaps, FlowTypeSpec};
pub use phase::{PhaseCaps, PhaseSpec, RetryPolicy, UnitOfWork};
