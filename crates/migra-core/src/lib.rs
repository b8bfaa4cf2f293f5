//! migra-core: motor de flujos de evaluación por fases, basado en eventos
pub mod checkpoint;
pub mod constants;
pub mod engine;
pub mod errors;
pub mod event;
pub mod executor;
pub mod hashing;
pub mod merge;
pub mod registry;
pub mod rollback;
pub mod spec;
pub mod state;

pub use checkpoint::{merge_checkpoint, Checkpoint};
pub use engine::{AdvanceOutcome, FlowCtx, FlowEngine};
pub use errors::{classify_error, ErrorClass, FlowEngineError, HandlerFailure, StartupValidationError};
pub use event::{EventStore, FlowEvent, FlowEventKind, InMemoryEventStore};
pub use executor::{NullExecutor, TaskExecutor};
pub use registry::{AppContext, ErrorDecision, ErrorHandler, ErrorHandlerRegistry, HandlerContext,
                   HandlerRegistry, PhaseHandler, PhaseValidator, RecoveryAction, ValidationReport,
                   ValidatorRegistry};
pub use rollback::{RollbackPlan, RollbackTable};
pub use spec::{FlowCaps, FlowCatalog, FlowTypeSpec, PhaseCaps, PhaseSpec, RetryPolicy, UnitOfWork};
pub use state::{FlowInstance, FlowRepository, FlowStatus, InMemoryFlowRepository, PhaseSlot, PhaseStatus,
                TenantScope};
