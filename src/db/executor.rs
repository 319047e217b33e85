//! Statement execution on a single checked-out connection.
//!
//! # Architecture
//!
//! The executor uses database-specific implementations organized in submodules:
//! - `mysql`: MySQL-specific fetch and execute
//! - `postgres`: PostgreSQL-specific fetch and execute
//! - `sqlite`: SQLite-specific fetch and execute (also serves the embedded engine)
//!
//! Statements without parameters run through the raw `Executor` path so DDL
//! that cannot be prepared (triggers, procedures) still works.

use crate::db::pool::DbConnection;
use crate::db::row::Row;
use crate::db::types::DecodeRow;
use crate::error::{DbError, DbResult};
use crate::models::QueryParam;
use futures_util::StreamExt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

/// Outcome of a non-query statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExecOutcome {
    pub rows_affected: u64,
    /// Key generated by the statement, where the driver reports one.
    pub last_insert_id: Option<i64>,
}

/// Runs statements with an optional per-statement timeout.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryExecutor {
    statement_timeout: Option<Duration>,
}

impl QueryExecutor {
    pub fn new(statement_timeout: Option<Duration>) -> Self {
        Self { statement_timeout }
    }

    pub fn statement_timeout(&self) -> Option<Duration> {
        self.statement_timeout
    }

    /// Run a row-returning statement. `max_rows` stops the stream early.
    pub async fn fetch(
        &self,
        conn: &mut DbConnection,
        sql: &str,
        params: &[QueryParam],
        max_rows: Option<usize>,
    ) -> DbResult<Vec<Row>> {
        debug!(sql = %sql, params = params.len(), max_rows = ?max_rows, "Executing query");
        let limit = self.statement_timeout;
        impl_db_dispatch!(conn, {
            MySql(c) => mysql::fetch_rows(c, sql, params, max_rows, limit).await.map(decode_rows),
            Postgres(c) => postgres::fetch_rows(c, sql, params, max_rows, limit).await.map(decode_rows),
            SQLite(c) => sqlite::fetch_rows(c, sql, params, max_rows, limit).await.map(decode_rows),
        })
    }

    /// Run a statement that returns no rows.
    pub async fn execute(
        &self,
        conn: &mut DbConnection,
        sql: &str,
        params: &[QueryParam],
    ) -> DbResult<ExecOutcome> {
        debug!(sql = %sql, params = params.len(), "Executing statement");
        let limit = self.statement_timeout;
        impl_db_dispatch!(conn, {
            MySql(c) => mysql::execute(c, sql, params, limit).await,
            Postgres(c) => postgres::execute(c, sql, params, limit).await,
            SQLite(c) => sqlite::execute(c, sql, params, limit).await,
        })
    }
}

/// Decode backend rows, sharing one column-name list across the result.
fn decode_rows<R: DecodeRow>(rows: Vec<R>) -> Vec<Row> {
    let Some(first) = rows.first() else {
        return Vec::new();
    };
    let columns: Arc<[String]> = first.column_names().into();
    rows.iter()
        .map(|r| Row::new(Arc::clone(&columns), r.decode_values()))
        .collect()
}

fn collect_rows<R>(results: Vec<Result<R, sqlx::Error>>) -> DbResult<Vec<R>> {
    results
        .into_iter()
        .collect::<Result<Vec<_>, _>>()
        .map_err(DbError::from)
}

async fn with_timeout<T>(
    operation: &str,
    limit: Option<Duration>,
    fut: impl Future<Output = T>,
) -> DbResult<T> {
    match limit {
        Some(limit) => timeout(limit, fut)
            .await
            .map_err(|_| timeout_error(operation, limit)),
        None => Ok(fut.await),
    }
}

fn timeout_error(operation: &str, limit: Duration) -> DbError {
    DbError::timeout(operation, limit.as_secs().max(1) as u32)
}

/// Drivers keep reporting the previous key when nothing was inserted.
fn generated_key(rows_affected: u64, id: i64) -> Option<i64> {
    (rows_affected > 0 && id > 0).then_some(id)
}

// =============================================================================
// Database-Specific Implementations
// =============================================================================
//
// Each module below provides the same interface adapted to its database type.
// The code structure is intentionally parallel to make differences obvious.

mod mysql {
    use super::*;
    use crate::db::params::bind_mysql_param;
    use sqlx::mysql::{MySqlConnection, MySqlRow};

    pub async fn fetch_rows(
        conn: &mut MySqlConnection,
        sql: &str,
        params: &[QueryParam],
        max_rows: Option<usize>,
        limit: Option<Duration>,
    ) -> DbResult<Vec<MySqlRow>> {
        let take = max_rows.unwrap_or(usize::MAX);
        let results = if params.is_empty() {
            let stream = sqlx::Executor::fetch(&mut *conn, sql);
            with_timeout("query execution", limit, stream.take(take).collect::<Vec<_>>()).await?
        } else {
            let mut query = sqlx::query(sql);
            for param in params {
                query = bind_mysql_param(query, param);
            }
            let stream = query.fetch(&mut *conn);
            with_timeout("query execution", limit, stream.take(take).collect::<Vec<_>>()).await?
        };
        collect_rows(results)
    }

    pub async fn execute(
        conn: &mut MySqlConnection,
        sql: &str,
        params: &[QueryParam],
        limit: Option<Duration>,
    ) -> DbResult<ExecOutcome> {
        let result = if params.is_empty() {
            with_timeout("statement execution", limit, sqlx::Executor::execute(&mut *conn, sql))
                .await?
        } else {
            let mut query = sqlx::query(sql);
            for param in params {
                query = bind_mysql_param(query, param);
            }
            with_timeout("statement execution", limit, query.execute(&mut *conn)).await?
        }?;

        let rows_affected = result.rows_affected();
        let id = i64::try_from(result.last_insert_id()).unwrap_or_default();
        Ok(ExecOutcome {
            rows_affected,
            last_insert_id: generated_key(rows_affected, id),
        })
    }
}

mod postgres {
    use super::*;
    use crate::db::params::bind_postgres_param;
    use sqlx::postgres::{PgConnection, PgRow};

    pub async fn fetch_rows(
        conn: &mut PgConnection,
        sql: &str,
        params: &[QueryParam],
        max_rows: Option<usize>,
        limit: Option<Duration>,
    ) -> DbResult<Vec<PgRow>> {
        let take = max_rows.unwrap_or(usize::MAX);
        let results = if params.is_empty() {
            let stream = sqlx::Executor::fetch(&mut *conn, sql);
            with_timeout("query execution", limit, stream.take(take).collect::<Vec<_>>()).await?
        } else {
            let mut query = sqlx::query(sql);
            for param in params {
                query = bind_postgres_param(query, param);
            }
            let stream = query.fetch(&mut *conn);
            with_timeout("query execution", limit, stream.take(take).collect::<Vec<_>>()).await?
        };
        collect_rows(results)
    }

    pub async fn execute(
        conn: &mut PgConnection,
        sql: &str,
        params: &[QueryParam],
        limit: Option<Duration>,
    ) -> DbResult<ExecOutcome> {
        let result = if params.is_empty() {
            with_timeout("statement execution", limit, sqlx::Executor::execute(&mut *conn, sql))
                .await?
        } else {
            let mut query = sqlx::query(sql);
            for param in params {
                query = bind_postgres_param(query, param);
            }
            with_timeout("statement execution", limit, query.execute(&mut *conn)).await?
        }?;

        // PostgreSQL reports keys only through RETURNING or lastval()
        Ok(ExecOutcome {
            rows_affected: result.rows_affected(),
            last_insert_id: None,
        })
    }
}

mod sqlite {
    use super::*;
    use crate::db::params::bind_sqlite_param;
    use sqlx::sqlite::{SqliteConnection, SqliteRow};

    pub async fn fetch_rows(
        conn: &mut SqliteConnection,
        sql: &str,
        params: &[QueryParam],
        max_rows: Option<usize>,
        limit: Option<Duration>,
    ) -> DbResult<Vec<SqliteRow>> {
        let take = max_rows.unwrap_or(usize::MAX);
        let results = if params.is_empty() {
            let stream = sqlx::Executor::fetch(&mut *conn, sql);
            with_timeout("query execution", limit, stream.take(take).collect::<Vec<_>>()).await?
        } else {
            let mut query = sqlx::query(sql);
            for param in params {
                query = bind_sqlite_param(query, param);
            }
            let stream = query.fetch(&mut *conn);
            with_timeout("query execution", limit, stream.take(take).collect::<Vec<_>>()).await?
        };
        collect_rows(results)
    }

    pub async fn execute(
        conn: &mut SqliteConnection,
        sql: &str,
        params: &[QueryParam],
        limit: Option<Duration>,
    ) -> DbResult<ExecOutcome> {
        let result = if params.is_empty() {
            with_timeout("statement execution", limit, sqlx::Executor::execute(&mut *conn, sql))
                .await?
        } else {
            let mut query = sqlx::query(sql);
            for param in params {
                query = bind_sqlite_param(query, param);
            }
            with_timeout("statement execution", limit, query.execute(&mut *conn)).await?
        }?;

        let rows_affected = result.rows_affected();
        Ok(ExecOutcome {
            rows_affected,
            last_insert_id: generated_key(rows_affected, result.last_insert_rowid()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_key_requires_affected_rows() {
        assert_eq!(generated_key(1, 42), Some(42));
        assert_eq!(generated_key(0, 42), None);
        assert_eq!(generated_key(1, 0), None);
    }

    #[test]
    fn test_timeout_error_rounds_up_to_a_second() {
        let err = timeout_error("query execution", Duration::from_millis(200));
        assert!(matches!(err, DbError::Timeout { elapsed_secs: 1, .. }));
    }

    #[test]
    fn test_decode_rows_empty() {
        let rows: Vec<sqlx::sqlite::SqliteRow> = Vec::new();
        assert!(decode_rows(rows).is_empty());
    }
}
