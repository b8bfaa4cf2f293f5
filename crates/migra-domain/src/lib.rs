//! migra-domain: entidades de dominio de la evaluación de migración
pub mod asset;
pub mod errors;
pub mod fields;
pub mod gap;
pub mod response;

pub use asset::Asset;
pub use errors::DomainError;
pub use fields::{as_text_list, first_number, flatten_text, normalize_field_name, FieldTarget,
                 NormalizedField, SideChannel};
pub use gap::{Gap, GapPriority, GapStatus};
pub use response::{QuestionnaireResponse, ResponseStatus};
