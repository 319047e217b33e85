//! Statement API used by client modules.
//!
//! Every call goes through the same pipeline: dialect adaptation, screening,
//! placeholder binding, checkout, execution, then the statistics, monitor and
//! logger hooks, and finally row mapping.

use crate::db::executor::{ExecOutcome, QueryExecutor};
use crate::db::pool::{ConnectionManager, PooledConnection};
use crate::db::row::Row;
use crate::dialect::{Dialect, adapter};
use crate::error::{DbError, DbResult};
use crate::instrument::{Instruments, LogCategory, QueryKind, truncate_sql};
use crate::models::{DatabaseType, IntoParams, QueryParam};
use crate::query::{QueryBuilder, StatementKind};
use futures_util::future::BoxFuture;
use regex::Regex;
use std::borrow::Cow;
use std::sync::{Arc, LazyLock};
use std::time::{Duration, Instant};
use tracing::warn;

const LOG_SQL_WIDTH: usize = 120;

static RETURNING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bRETURNING\b").unwrap());

/// Who issued a statement. Decides which pipeline steps apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Origin {
    /// Adapted and screened
    Client,
    /// Adapted only; schema scripts legitimately drop and truncate
    Migration,
    /// Generated by the bridge itself
    Internal,
}

/// A statement after adaptation, screening and placeholder binding.
struct Prepared<'a> {
    source: &'a str,
    bound: Cow<'a, str>,
}

/// Everything a statement needs besides its connection.
#[derive(Debug)]
pub(crate) struct ExecutionContext {
    dialect: Arc<dyn Dialect>,
    executor: QueryExecutor,
    instruments: Instruments,
    adapt_sql: bool,
}

impl ExecutionContext {
    fn prepare<'a>(&self, sql: &'a str, n_params: usize, origin: Origin) -> DbResult<Prepared<'a>> {
        let adapted = if self.adapt_sql && origin != Origin::Internal {
            adapter::adapt_sql(sql, self.dialect.database_type())
        } else {
            Cow::Borrowed(sql)
        };

        if origin == Origin::Client {
            let logger = &self.instruments.logger;
            match self.instruments.validator.check(&adapted) {
                Ok(findings) => {
                    for finding in findings {
                        logger.warn(
                            LogCategory::Security,
                            format!(
                                "{}: {} [{}]",
                                finding.rule,
                                finding.detail,
                                truncate_sql(&adapted, LOG_SQL_WIDTH)
                            ),
                        );
                    }
                }
                Err(e) => {
                    self.instruments.statistics.record_rejected();
                    logger.error(
                        LogCategory::Security,
                        format!("Rejected: {} [{}]", e, truncate_sql(&adapted, LOG_SQL_WIDTH)),
                    );
                    return Err(e);
                }
            }
        }

        let expected = self.dialect.placeholder_count(&adapted);
        if expected != n_params {
            return Err(DbError::invalid_input(format!(
                "Statement has {} placeholders but {} parameters were supplied",
                expected, n_params
            )));
        }

        let rebound = match self.dialect.bind_placeholders(&adapted) {
            Cow::Owned(s) => Some(s),
            Cow::Borrowed(_) => None,
        };
        let bound = match rebound {
            Some(s) => Cow::Owned(s),
            None => adapted,
        };
        Ok(Prepared { source: sql, bound })
    }

    async fn fetch(
        &self,
        conn: &mut PooledConnection,
        kind: QueryKind,
        stmt: &Prepared<'_>,
        params: &[QueryParam],
        max_rows: Option<usize>,
    ) -> DbResult<Vec<Row>> {
        let started = Instant::now();
        let result = match conn.connection_mut() {
            Ok(c) => self.executor.fetch(c, &stmt.bound, params, max_rows).await,
            Err(e) => Err(e),
        };
        self.observe(conn, kind, stmt.source, started.elapsed(), result)
    }

    async fn execute(
        &self,
        conn: &mut PooledConnection,
        kind: QueryKind,
        stmt: &Prepared<'_>,
        params: &[QueryParam],
    ) -> DbResult<ExecOutcome> {
        let started = Instant::now();
        let result = match conn.connection_mut() {
            Ok(c) => self.executor.execute(c, &stmt.bound, params).await,
            Err(e) => Err(e),
        };
        self.observe(conn, kind, stmt.source, started.elapsed(), result)
    }

    /// Run an INSERT and recover its generated key.
    ///
    /// Keys come from the driver when it reports them, else from a RETURNING
    /// clause (first column), else from the dialect's last-id statement on the
    /// same connection.
    async fn insert(
        &self,
        conn: &mut PooledConnection,
        stmt: Prepared<'_>,
        params: &[QueryParam],
    ) -> DbResult<Option<i64>> {
        if self.dialect.driver_reports_generated_keys() {
            let outcome = self.execute(conn, QueryKind::Insert, &stmt, params).await?;
            return Ok(outcome.last_insert_id);
        }

        if let Some(clause) = self.dialect.returning_clause(&["*"]) {
            let stmt = if RETURNING.is_match(&stmt.bound) {
                stmt
            } else {
                let trimmed = stmt.bound.trim_end().trim_end_matches(';').trim_end();
                Prepared {
                    source: stmt.source,
                    bound: Cow::Owned(format!("{}{}", trimmed, clause)),
                }
            };
            let rows = self
                .fetch(conn, QueryKind::Insert, &stmt, params, Some(1))
                .await?;
            return Ok(rows.first().and_then(first_key));
        }

        let outcome = self.execute(conn, QueryKind::Insert, &stmt, params).await?;
        let Some(lookup) = self.dialect.last_insert_id_sql() else {
            return Ok(None);
        };
        if outcome.rows_affected == 0 {
            return Ok(None);
        }
        let c = conn.connection_mut()?;
        let rows = self
            .executor
            .fetch(c, lookup, &[], Some(1))
            .await
            .map_err(|e| e.with_sql(lookup))?;
        Ok(rows.first().and_then(first_key).filter(|id| *id != 0))
    }

    async fn batch(
        &self,
        conn: &mut PooledConnection,
        stmt: &Prepared<'_>,
        sets: &[Vec<QueryParam>],
    ) -> DbResult<Vec<u64>> {
        let started = Instant::now();
        let mut counts = Vec::with_capacity(sets.len());
        let result: DbResult<()> = async {
            for params in sets {
                let c = conn.connection_mut()?;
                let outcome = self.executor.execute(c, &stmt.bound, params).await?;
                counts.push(outcome.rows_affected);
            }
            Ok(())
        }
        .await;
        self.observe(conn, QueryKind::Batch, stmt.source, started.elapsed(), result)?;
        Ok(counts)
    }

    /// Run the post-execution hooks and attach statement context to errors.
    fn observe<T>(
        &self,
        conn: &mut PooledConnection,
        kind: QueryKind,
        sql: &str,
        elapsed: Duration,
        result: DbResult<T>,
    ) -> DbResult<T> {
        let Instruments {
            statistics,
            monitor,
            logger,
            ..
        } = &self.instruments;

        match result {
            Ok(value) => {
                let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
                if statistics.record(kind, sql, elapsed) {
                    logger.warn(
                        LogCategory::Performance,
                        format!(
                            "Slow {:?} took {:.1} ms [{}]",
                            kind,
                            elapsed_ms,
                            truncate_sql(sql, LOG_SQL_WIDTH)
                        ),
                    );
                }
                let complexity = monitor.record(sql, elapsed);
                logger.debug(
                    LogCategory::Query,
                    format!(
                        "{:?} in {:.1} ms, {:?} complexity [{}]",
                        kind,
                        elapsed_ms,
                        complexity,
                        truncate_sql(sql, LOG_SQL_WIDTH)
                    ),
                );
                Ok(value)
            }
            Err(e) => {
                statistics.record_failure();
                // The session state is unknown after a timeout or a broken link
                if matches!(e, DbError::Timeout { .. } | DbError::Connection { .. }) {
                    conn.mark_invalid();
                }
                logger.error(
                    LogCategory::Query,
                    format!("{} [{}]", e, truncate_sql(sql, LOG_SQL_WIDTH)),
                );
                Err(e.with_sql(sql))
            }
        }
    }

    fn map_rows<T>(
        &self,
        sql: &str,
        rows: &[Row],
        mapper: impl Fn(&Row) -> DbResult<T>,
    ) -> DbResult<Vec<T>> {
        rows.iter()
            .enumerate()
            .map(|(idx, row)| {
                mapper(row).map_err(|e| {
                    self.instruments.logger.error(
                        LogCategory::Query,
                        format!(
                            "Mapping row {} failed: {} [{}]",
                            idx,
                            e,
                            truncate_sql(sql, LOG_SQL_WIDTH)
                        ),
                    );
                    DbError::mapping(idx, e.to_string())
                })
            })
            .collect()
    }
}

fn first_key(row: &Row) -> Option<i64> {
    row.get_at::<Option<i64>>(0).ok().flatten()
}

fn collect_sets<I, P>(param_sets: I) -> Vec<Vec<QueryParam>>
where
    I: IntoIterator<Item = P>,
    P: IntoParams,
{
    param_sets.into_iter().map(IntoParams::into_params).collect()
}

fn check_batch_widths(sets: &[Vec<QueryParam>]) -> DbResult<()> {
    let Some(first) = sets.first() else {
        return Ok(());
    };
    match sets.iter().position(|s| s.len() != first.len()) {
        Some(idx) => Err(DbError::invalid_input(format!(
            "Parameter set {} has {} values, the first set has {}",
            idx,
            sets[idx].len(),
            first.len()
        ))),
        None => Ok(()),
    }
}

/// Table name prefixed with a sanitized namespace.
///
/// The namespace is lowercased and anything outside `[a-z0-9]` becomes `_`.
pub fn namespaced_table(namespace: &str, table: &str) -> String {
    let prefix: String = namespace
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("{}_{}", prefix, table)
}

/// Pooled, instrumented access to the configured database.
///
/// Cheap to clone; clones share the pool and the instruments.
#[derive(Debug, Clone)]
pub struct Database {
    connections: ConnectionManager,
    ctx: Arc<ExecutionContext>,
}

impl Database {
    pub fn new(connections: ConnectionManager, instruments: Instruments, adapt_sql: bool) -> Self {
        let dialect = connections.dialect();
        Self::with_dialect(connections, dialect, instruments, adapt_sql)
    }

    /// Like [`Database::new`], with a dialect other than the backend's default.
    pub fn with_dialect(
        connections: ConnectionManager,
        dialect: Arc<dyn Dialect>,
        instruments: Instruments,
        adapt_sql: bool,
    ) -> Self {
        let executor = QueryExecutor::new(connections.config().pool_options.statement_timeout());
        let ctx = ExecutionContext {
            dialect,
            executor,
            instruments,
            adapt_sql,
        };
        Self {
            connections,
            ctx: Arc::new(ctx),
        }
    }

    pub fn connections(&self) -> &ConnectionManager {
        &self.connections
    }

    pub fn dialect(&self) -> Arc<dyn Dialect> {
        Arc::clone(&self.ctx.dialect)
    }

    pub fn database_type(&self) -> DatabaseType {
        self.ctx.dialect.database_type()
    }

    pub fn instruments(&self) -> &Instruments {
        &self.ctx.instruments
    }

    /// A fresh builder for this database's dialect.
    pub fn builder(&self) -> QueryBuilder {
        QueryBuilder::new(self.dialect())
    }

    async fn checkout(&self) -> DbResult<PooledConnection> {
        self.connections.get_connection().await.inspect_err(|e| {
            self.ctx.instruments.statistics.record_failure();
            self.ctx.instruments.logger.error(
                LogCategory::Connection,
                format!("Connection checkout failed: {}", e),
            );
        })
    }

    /// Run a SELECT and map every row.
    pub async fn query<T, P, F>(&self, sql: &str, params: P, mapper: F) -> DbResult<Vec<T>>
    where
        P: IntoParams,
        F: Fn(&Row) -> DbResult<T>,
    {
        self.query_with(Origin::Client, sql, params, mapper).await
    }

    pub(crate) async fn query_with<T, P, F>(
        &self,
        origin: Origin,
        sql: &str,
        params: P,
        mapper: F,
    ) -> DbResult<Vec<T>>
    where
        P: IntoParams,
        F: Fn(&Row) -> DbResult<T>,
    {
        let params = params.into_params();
        let stmt = self.ctx.prepare(sql, params.len(), origin)?;
        let rows = {
            let mut conn = self.checkout().await?;
            self.ctx
                .fetch(&mut conn, QueryKind::Query, &stmt, &params, None)
                .await?
        };
        self.ctx.map_rows(sql, &rows, mapper)
    }

    /// Run a SELECT and map only the first row.
    pub async fn query_first<T, P, F>(&self, sql: &str, params: P, mapper: F) -> DbResult<Option<T>>
    where
        P: IntoParams,
        F: Fn(&Row) -> DbResult<T>,
    {
        let params = params.into_params();
        let stmt = self.ctx.prepare(sql, params.len(), Origin::Client)?;
        let rows = {
            let mut conn = self.checkout().await?;
            self.ctx
                .fetch(&mut conn, QueryKind::Query, &stmt, &params, Some(1))
                .await?
        };
        Ok(self.ctx.map_rows(sql, &rows, mapper)?.into_iter().next())
    }

    /// Run a SELECT assembled with a [`QueryBuilder`].
    pub async fn query_builder<T, F>(&self, builder: &QueryBuilder, mapper: F) -> DbResult<Vec<T>>
    where
        F: Fn(&Row) -> DbResult<T>,
    {
        if builder.kind() != Some(StatementKind::Select) {
            return Err(DbError::invalid_input(
                "query_builder expects a SELECT; use update_builder for writes",
            ));
        }
        let sql = builder.build()?;
        self.query(&sql, builder.parameters(), mapper).await
    }

    /// Run an INSERT, UPDATE or DELETE assembled with a [`QueryBuilder`].
    pub async fn update_builder(&self, builder: &QueryBuilder) -> DbResult<u64> {
        if builder.kind() == Some(StatementKind::Select) {
            return Err(DbError::invalid_input(
                "update_builder expects a write; use query_builder for SELECT",
            ));
        }
        let sql = builder.build()?;
        self.update(&sql, builder.parameters()).await
    }

    /// Run a write statement. Returns the affected row count.
    pub async fn update(&self, sql: &str, params: impl IntoParams) -> DbResult<u64> {
        self.update_with(Origin::Client, sql, params).await
    }

    pub(crate) async fn update_with(
        &self,
        origin: Origin,
        sql: &str,
        params: impl IntoParams,
    ) -> DbResult<u64> {
        let params = params.into_params();
        let stmt = self.ctx.prepare(sql, params.len(), origin)?;
        let mut conn = self.checkout().await?;
        let outcome = self
            .ctx
            .execute(&mut conn, QueryKind::Update, &stmt, &params)
            .await?;
        Ok(outcome.rows_affected)
    }

    /// Run an INSERT. Returns the generated key when there is one.
    pub async fn insert(&self, sql: &str, params: impl IntoParams) -> DbResult<Option<i64>> {
        let params = params.into_params();
        let stmt = self.ctx.prepare(sql, params.len(), Origin::Client)?;
        let mut conn = self.checkout().await?;
        self.ctx.insert(&mut conn, stmt, &params).await
    }

    /// Run one statement per parameter set inside a single transaction.
    ///
    /// Returns the affected row count of each set, in order. Any failure rolls
    /// the whole batch back.
    pub async fn batch_update<I, P>(&self, sql: &str, param_sets: I) -> DbResult<Vec<u64>>
    where
        I: IntoIterator<Item = P>,
        P: IntoParams,
    {
        let sets = collect_sets(param_sets);
        if sets.is_empty() {
            return Ok(Vec::new());
        }
        check_batch_widths(&sets)?;
        let stmt = self.ctx.prepare(sql, sets[0].len(), Origin::Client)?;

        let mut tx = self.begin_with(Origin::Client).await?;
        match self.ctx.batch(&mut tx.conn, &stmt, &sets).await {
            Ok(counts) => {
                tx.commit().await?;
                Ok(counts)
            }
            Err(e) => {
                tx.rollback_after_error().await;
                Err(e)
            }
        }
    }

    /// Start a transaction on a dedicated connection.
    pub async fn begin(&self) -> DbResult<Transaction> {
        self.begin_with(Origin::Client).await
    }

    pub(crate) async fn begin_with(&self, origin: Origin) -> DbResult<Transaction> {
        let conn = self.checkout().await?;
        Transaction::begin(conn, Arc::clone(&self.ctx), origin).await
    }

    /// Run `work` in a transaction: commit on `Ok`, roll back on `Err`.
    ///
    /// ```ignore
    /// let id = db
    ///     .transaction(|tx| Box::pin(async move {
    ///         tx.update("UPDATE accounts SET balance = balance - ? WHERE id = ?", (10, 1)).await?;
    ///         tx.insert("INSERT INTO ledger (account, amount) VALUES (?, ?)", (1, -10)).await
    ///     }))
    ///     .await?;
    /// ```
    pub async fn transaction<T, F>(&self, work: F) -> DbResult<T>
    where
        F: for<'t> FnOnce(&'t mut Transaction) -> BoxFuture<'t, DbResult<T>>,
    {
        self.transaction_with(Origin::Client, work).await
    }

    pub(crate) async fn transaction_with<T, F>(&self, origin: Origin, work: F) -> DbResult<T>
    where
        F: for<'t> FnOnce(&'t mut Transaction) -> BoxFuture<'t, DbResult<T>>,
    {
        let mut tx = self.begin_with(origin).await?;
        match work(&mut tx).await {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(e) => {
                tx.rollback_after_error().await;
                Err(e)
            }
        }
    }

    /// Whether `table` exists in the current schema.
    pub async fn table_exists(&self, table: &str) -> DbResult<bool> {
        let sql = self.ctx.dialect.table_exists_sql(table);
        let stmt = self.ctx.prepare(&sql, 0, Origin::Internal)?;
        let mut conn = self.checkout().await?;
        let rows = self
            .ctx
            .fetch(&mut conn, QueryKind::Query, &stmt, &[], Some(1))
            .await?;
        let count = match rows.first() {
            Some(row) => row.get_at::<i64>(0)?,
            None => 0,
        };
        Ok(count > 0)
    }

    pub fn namespaced_table(&self, namespace: &str, table: &str) -> String {
        namespaced_table(namespace, table)
    }
}

/// A transaction bound to one pooled connection.
///
/// Dropping it without `commit` or `rollback` discards the connection, which
/// makes the server roll the work back.
#[derive(Debug)]
pub struct Transaction {
    conn: PooledConnection,
    ctx: Arc<ExecutionContext>,
    origin: Origin,
    finished: bool,
}

impl Transaction {
    async fn begin(
        conn: PooledConnection,
        ctx: Arc<ExecutionContext>,
        origin: Origin,
    ) -> DbResult<Self> {
        let mut tx = Self {
            conn,
            ctx,
            origin,
            finished: false,
        };
        let begin = tx.ctx.dialect.begin_transaction_sql();
        if let Err(e) = tx.control(begin).await {
            tx.finished = true;
            tx.conn.mark_invalid();
            tx.ctx.instruments.statistics.record_failure();
            return Err(e);
        }
        Ok(tx)
    }

    async fn control(&mut self, sql: &str) -> DbResult<()> {
        let conn = self.conn.connection_mut()?;
        self.ctx
            .executor
            .execute(conn, sql, &[])
            .await
            .map(|_| ())
            .map_err(|e| e.with_sql(sql))
    }

    pub async fn query<T, P, F>(&mut self, sql: &str, params: P, mapper: F) -> DbResult<Vec<T>>
    where
        P: IntoParams,
        F: Fn(&Row) -> DbResult<T>,
    {
        let params = params.into_params();
        let stmt = self.ctx.prepare(sql, params.len(), self.origin)?;
        let rows = self
            .ctx
            .fetch(&mut self.conn, QueryKind::Query, &stmt, &params, None)
            .await?;
        self.ctx.map_rows(sql, &rows, mapper)
    }

    pub async fn query_first<T, P, F>(
        &mut self,
        sql: &str,
        params: P,
        mapper: F,
    ) -> DbResult<Option<T>>
    where
        P: IntoParams,
        F: Fn(&Row) -> DbResult<T>,
    {
        let params = params.into_params();
        let stmt = self.ctx.prepare(sql, params.len(), self.origin)?;
        let rows = self
            .ctx
            .fetch(&mut self.conn, QueryKind::Query, &stmt, &params, Some(1))
            .await?;
        Ok(self.ctx.map_rows(sql, &rows, mapper)?.into_iter().next())
    }

    pub async fn update(&mut self, sql: &str, params: impl IntoParams) -> DbResult<u64> {
        let params = params.into_params();
        let stmt = self.ctx.prepare(sql, params.len(), self.origin)?;
        let outcome = self
            .ctx
            .execute(&mut self.conn, QueryKind::Update, &stmt, &params)
            .await?;
        Ok(outcome.rows_affected)
    }

    pub async fn insert(&mut self, sql: &str, params: impl IntoParams) -> DbResult<Option<i64>> {
        let params = params.into_params();
        let stmt = self.ctx.prepare(sql, params.len(), self.origin)?;
        self.ctx.insert(&mut self.conn, stmt, &params).await
    }

    pub async fn batch_update<I, P>(&mut self, sql: &str, param_sets: I) -> DbResult<Vec<u64>>
    where
        I: IntoIterator<Item = P>,
        P: IntoParams,
    {
        let sets = collect_sets(param_sets);
        if sets.is_empty() {
            return Ok(Vec::new());
        }
        check_batch_widths(&sets)?;
        let stmt = self.ctx.prepare(sql, sets[0].len(), self.origin)?;
        self.ctx.batch(&mut self.conn, &stmt, &sets).await
    }

    pub async fn commit(mut self) -> DbResult<()> {
        self.finished = true;
        match self.control("COMMIT").await {
            Ok(()) => {
                self.ctx.instruments.statistics.record_transaction();
                Ok(())
            }
            Err(e) => {
                self.conn.mark_invalid();
                self.ctx.instruments.statistics.record_failure();
                self.ctx
                    .instruments
                    .logger
                    .error(LogCategory::Query, format!("Commit failed: {}", e));
                Err(e)
            }
        }
    }

    pub async fn rollback(mut self) -> DbResult<()> {
        self.finished = true;
        self.ctx.instruments.statistics.record_rollback();
        if let Err(e) = self.control("ROLLBACK").await {
            self.conn.mark_invalid();
            return Err(e);
        }
        Ok(())
    }

    /// Roll back after a failed unit of work. A failed ROLLBACK is only logged;
    /// the connection is discarded either way.
    async fn rollback_after_error(self) {
        let logger = Arc::clone(&self.ctx.instruments.logger);
        if let Err(e) = self.rollback().await {
            logger.error(LogCategory::Query, format!("Rollback failed: {}", e));
        }
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if !self.finished {
            warn!(connection = self.conn.id(), "Transaction dropped without commit, discarding its connection");
            self.conn.mark_invalid();
            self.ctx.instruments.statistics.record_rollback();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespaced_table_sanitizes() {
        assert_eq!(namespaced_table("Shop", "orders"), "shop_orders");
        assert_eq!(namespaced_table("my-plugin.v2", "kv"), "my_plugin_v2_kv");
    }

    #[test]
    fn test_check_batch_widths() {
        let ok = vec![vec![QueryParam::Int(1)], vec![QueryParam::Int(2)]];
        assert!(check_batch_widths(&ok).is_ok());

        let ragged = vec![vec![QueryParam::Int(1)], vec![]];
        assert!(matches!(
            check_batch_widths(&ragged),
            Err(DbError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_collect_sets() {
        let sets = collect_sets(vec![("a", 1), ("b", 2)]);
        assert_eq!(sets.len(), 2);
        assert_eq!(sets[1], vec![QueryParam::String("b".into()), QueryParam::Int(2)]);
    }
}
