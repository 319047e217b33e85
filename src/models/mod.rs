//! Data models for the SQL bridge.
//!
//! This module re-exports all model types used throughout the crate.

pub mod connection;
pub mod query;

// Re-export commonly used types
pub use connection::{ConnectionConfig, ConnectionConfigError, ConnectionStatus, DatabaseType};
pub use query::{IntoParams, QueryParam};
