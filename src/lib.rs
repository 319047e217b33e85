//! SQL Bridge Library
//!
//! A pooled, dialect-aware access layer over SQLite, MySQL, PostgreSQL and an
//! embedded in-memory engine. Client modules write SQL once with `?`
//! placeholders; the bridge adapts it to the configured backend, screens it,
//! runs it on a validated pooled connection and records what happened.

pub mod bridge;
pub mod config;
pub mod db;
pub mod dialect;
pub mod error;
pub mod instrument;
pub mod migration;
pub mod models;
pub mod query;
pub mod scheduler;

pub use bridge::SqlBridge;
pub use config::BridgeConfig;
pub use db::{Database, Row, Transaction};
pub use error::{DbError, DbResult};
pub use migration::{Migration, MigrationManager};
