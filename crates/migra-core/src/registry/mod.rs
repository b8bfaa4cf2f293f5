mod context;
mod error_handler;
mod handler;
mod validator;

pub use context::AppContext;
pub use error_handler::{ErrorDecision, ErrorHandler, ErrorHandlerRegistry, RecoveryAction};
pub use handler::{HandlerContext, HandlerRegistry, PhaseHandler};
pub use validator::{PhaseValidator, ValidationReport, ValidatorRegistry};
