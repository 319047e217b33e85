//! Statement construction.

pub mod builder;

pub use builder::{Order, QueryBuilder, StatementKind};
