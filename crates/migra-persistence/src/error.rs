//! Errores de persistencia.
//! Mapea errores de Diesel / conexión a variantes semánticas, y define el
//! error tipado del write-back (que nunca se traga: protege datos de
//! cumplimiento y de negocio).

use diesel::result::{DatabaseErrorKind, Error as DieselError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("unique violation: {0}")]
    UniqueViolation(String),
    #[error("check violation: {0}")]
    CheckViolation(String),
    #[error("foreign key violation: {0}")]
    ForeignKeyViolation(String),
    #[error("not found")]
    NotFound,
    #[error("serialization conflict (retryable)")]
    SerializationConflict,
    #[error("transient IO / connection pool error: {0}")]
    TransientIo(String),
    #[error("unknown database error: {0}")]
    Unknown(String),
}

impl From<DieselError> for PersistenceError {
    fn from(err: DieselError) -> Self {
        match err {
            DieselError::NotFound => Self::NotFound,
            DieselError::DatabaseError(kind, info) => match kind {
                DatabaseErrorKind::UniqueViolation => Self::UniqueViolation(info.message().to_string()),
                DatabaseErrorKind::CheckViolation => Self::CheckViolation(info.message().to_string()),
                DatabaseErrorKind::ForeignKeyViolation => Self::ForeignKeyViolation(info.message().to_string()),
                DatabaseErrorKind::SerializationFailure => Self::SerializationConflict,
                other => Self::Unknown(format!("db error kind {:?}: {}", other, info.message())),
            },
            DieselError::DeserializationError(e) => Self::Unknown(format!("deser: {e}")),
            DieselError::SerializationError(e) => Self::Unknown(format!("ser: {e}")),
            DieselError::BrokenTransactionManager => Self::TransientIo("broken transaction manager".into()),
            DieselError::QueryBuilderError(e) => Self::Unknown(format!("query builder: {e}")),
            other => Self::Unknown(format!("unhandled diesel error: {other:?}")),
        }
    }
}

/// Error del subsistema de write-back. Propagación obligatoria: cualquier
/// condición que impida proceder de forma segura aborta la operación entera
/// sin escribir datos parciales de tenant.
#[derive(Debug, Error)]
pub enum WriteBackError {
    #[error("write-back requires a concrete tenant and engagement scope")]
    MissingScope,
    #[error("no target records could be resolved for the supplied responses")]
    UnresolvedTargets,
    #[error("batch update failed, aborting entire write-back: {0}")]
    Batch(#[from] PersistenceError),
}

impl From<DieselError> for WriteBackError {
    fn from(err: DieselError) -> Self {
        WriteBackError::Batch(PersistenceError::from(err))
    }
}
