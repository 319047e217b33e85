//! Backend dispatch macro.
//!
//! Connections are held as a `DbConnection` enum so the pool can stay
//! monomorphic. The macro below expands the per-variant match at compile time
//! and keeps call sites linear.

/// Generate match arms over `DbConnection` variants.
///
/// # Example
///
/// ```ignore
/// impl_db_dispatch!(conn, {
///     MySql(c) => mysql::execute(c, sql, params, limit).await,
///     Postgres(c) => postgres::execute(c, sql, params, limit).await,
///     SQLite(c) => sqlite::execute(c, sql, params, limit).await,
/// });
/// ```
#[macro_export]
macro_rules! impl_db_dispatch {
    ($conn:expr, { $($variant:ident($c:ident) => $body:expr),+ $(,)? }) => {
        match $conn {
            $(
                $crate::db::pool::DbConnection::$variant($c) => $body,
            )+
        }
    };
}

pub use impl_db_dispatch;
