//! Database access layer.
//!
//! - `pool`: connection pool with validation and health tracking
//! - `executor`: statement execution on one connection, per backend
//! - `facade`: the instrumented statement API and transactions
//! - `row` / `types`: owned, backend-independent result rows
//! - `macros`: backend dispatch over [`DbConnection`]

#[macro_use]
pub mod macros;
pub mod executor;
pub mod facade;
pub(crate) mod params;
pub mod pool;
pub mod row;
pub mod types;

pub use executor::{ExecOutcome, QueryExecutor};
pub use facade::{Database, Transaction, namespaced_table};
pub use pool::{
    ConnectionManager, DbConnection, EntryState, HealthSnapshot, PoolStats, PooledConnection,
};
pub use row::{FromSqlValue, Row};
pub use types::SqlValue;
