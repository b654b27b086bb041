//! Storage layer for the WZRD voice bot.
//!
//! Provides the SQLite connection pool (`r2d2`) and the embedded schema
//! migrations for the `digital_twins`, `conversations` and `messages`
//! tables. Queries over those tables live in `wzrd-context`.
//!
//! The schema is declared here once, statically; nothing in the workspace
//! introspects table layouts at runtime.

mod migrations;
mod pool;

pub use migrations::{run_migrations, MigrationError};
pub use pool::{create_pool, DbPool, DbRuntimeSettings, PoolError};
