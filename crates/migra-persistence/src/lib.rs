//! migra-persistence
//!
//! Implementaciones Postgres de `EventStore` y `FlowRepository`, más el
//! subsistema de write-back de respuestas resueltas sobre registros de
//! dominio con alcance de tenant.
//!
//! Módulos:
//! - `pg`: implementaciones sobre Postgres (event log append-only,
//!   checkpoints, write-back por lotes).
//! - `migrations`: runner embebido de migraciones Diesel.
//! - `config`: carga de configuración desde .env.
//! - `schema`: tablas Diesel declaradas para compilar queries.

pub mod config;
pub mod error;
pub mod migrations;
pub mod pg;
pub mod schema;

pub use config::init_dotenv;
pub use error::{PersistenceError, WriteBackError};
pub use pg::writeback::{apply_write_back, build_plan, write_back_transactional, AssetChanges,
                        InMemoryTargetIndex, TargetIndex, WriteBackPlan, WriteBackReport};
pub use pg::{build_dev_pool_from_env, build_pool, ConnectionProvider, PgEventStore, PgFlowRepository,
             PgPool, PoolProvider};
