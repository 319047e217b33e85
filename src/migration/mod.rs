//! Versioned schema migrations, tracked per namespace.
//!
//! Each namespace owns an ordered list of migrations. Applied versions are
//! recorded in `bridge_schema_migrations`; the highest recorded version is the
//! namespace's watermark. A run applies every registered migration above the
//! watermark, each in its own transaction together with its tracking row.
//!
//! Backends without transactional DDL (MySQL) commit schema statements as
//! they run. A migration failing there can leave part of its schema changes
//! behind with the watermark unchanged; the run reports this in its error and
//! the schema has to be repaired before the namespace is registered again.

use crate::db::{Database, Transaction};
use crate::db::facade::Origin;
use crate::dialect::{Feature, SqlType};
use crate::error::{DbError, DbResult};
use crate::instrument::LogCategory;
use chrono::{NaiveDateTime, Utc};
use futures_util::future::BoxFuture;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Instant;

pub const TRACKING_TABLE: &str = "bridge_schema_migrations";

/// The procedure behind one migration.
///
/// Both directions run inside the transaction that also updates the tracking
/// table, so a failing step leaves no trace.
pub trait MigrationStep: Send + Sync {
    fn migrate<'a>(&'a self, tx: &'a mut Transaction) -> BoxFuture<'a, DbResult<()>>;

    fn rollback<'a>(&'a self, _tx: &'a mut Transaction) -> BoxFuture<'a, DbResult<()>> {
        Box::pin(async { Err(DbError::invalid_input("migration has no rollback")) })
    }
}

/// A migration made of fixed statement lists.
#[derive(Debug, Clone, Default)]
pub struct SqlMigration {
    up: Vec<String>,
    down: Vec<String>,
}

impl SqlMigration {
    pub fn new<U, D>(up: U, down: D) -> Self
    where
        U: IntoIterator,
        U::Item: Into<String>,
        D: IntoIterator,
        D::Item: Into<String>,
    {
        Self {
            up: up.into_iter().map(Into::into).collect(),
            down: down.into_iter().map(Into::into).collect(),
        }
    }
}

impl MigrationStep for SqlMigration {
    fn migrate<'a>(&'a self, tx: &'a mut Transaction) -> BoxFuture<'a, DbResult<()>> {
        Box::pin(run_script(tx, &self.up))
    }

    fn rollback<'a>(&'a self, tx: &'a mut Transaction) -> BoxFuture<'a, DbResult<()>> {
        Box::pin(run_script(tx, &self.down))
    }
}

async fn run_script(tx: &mut Transaction, statements: &[String]) -> DbResult<()> {
    for sql in statements {
        tx.update(sql, ()).await?;
    }
    Ok(())
}

#[derive(Clone)]
pub struct Migration {
    version: i64,
    description: String,
    step: Arc<dyn MigrationStep>,
}

impl Migration {
    pub fn new(
        version: i64,
        description: impl Into<String>,
        step: impl MigrationStep + 'static,
    ) -> Self {
        Self {
            version,
            description: description.into(),
            step: Arc::new(step),
        }
    }

    /// Migration from `up` statements, reverted by `down` statements.
    pub fn sql<U, D>(version: i64, description: impl Into<String>, up: U, down: D) -> Self
    where
        U: IntoIterator,
        U::Item: Into<String>,
        D: IntoIterator,
        D::Item: Into<String>,
    {
        Self::new(version, description, SqlMigration::new(up, down))
    }

    pub fn version(&self) -> i64 {
        self.version
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

impl std::fmt::Debug for Migration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Migration")
            .field("version", &self.version)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationState {
    Pending,
    Applying,
    Applied,
    /// Terminal until the namespace is registered again
    Failed,
}

/// Outcome of one `run_migrations` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub namespace: String,
    pub from_version: i64,
    pub to_version: i64,
    pub applied: Vec<i64>,
}

/// A row of the tracking table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppliedMigration {
    pub version: i64,
    pub description: String,
    pub applied_at: NaiveDateTime,
}

#[derive(Debug)]
struct NamespaceEntry {
    migrations: Vec<Migration>,
    states: BTreeMap<i64, MigrationState>,
}

#[derive(Debug, Default)]
struct Registry {
    order: Vec<String>,
    namespaces: HashMap<String, NamespaceEntry>,
}

#[derive(Debug)]
pub struct MigrationManager {
    db: Database,
    registry: Mutex<Registry>,
    /// Runs and rollbacks never overlap.
    run_lock: tokio::sync::Mutex<()>,
}

impl MigrationManager {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            registry: Mutex::new(Registry::default()),
            run_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Declare the migrations of `namespace`, replacing any earlier set.
    ///
    /// Versions must be positive and unique. Registering again also clears a
    /// `Failed` state.
    pub fn register_migrations(
        &self,
        namespace: &str,
        mut migrations: Vec<Migration>,
    ) -> DbResult<()> {
        if namespace.trim().is_empty() {
            return Err(DbError::invalid_input("Migration namespace cannot be empty"));
        }
        migrations.sort_by_key(|m| m.version);
        if let Some(m) = migrations.iter().find(|m| m.version <= 0) {
            return Err(DbError::migration(
                namespace,
                m.version,
                "versions must be positive",
            ));
        }
        if let Some(pair) = migrations.windows(2).find(|w| w[0].version == w[1].version) {
            return Err(DbError::migration(
                namespace,
                pair[0].version,
                "duplicate version",
            ));
        }

        let states = migrations
            .iter()
            .map(|m| (m.version, MigrationState::Pending))
            .collect();
        let count = migrations.len();
        {
            let mut registry = self.lock_registry();
            if !registry.namespaces.contains_key(namespace) {
                registry.order.push(namespace.to_string());
            }
            registry.namespaces.insert(
                namespace.to_string(),
                NamespaceEntry { migrations, states },
            );
        }
        self.logger().debug(
            LogCategory::Migration,
            format!("Registered {} migrations for '{}'", count, namespace),
        );
        Ok(())
    }

    /// Apply every registered migration above the namespace's watermark.
    pub async fn run_migrations(&self, namespace: &str) -> DbResult<MigrationReport> {
        let _running = self.run_lock.lock().await;
        let migrations = self.registered(namespace)?;
        if let Some(failed) = self.failed_version(namespace) {
            return Err(DbError::migration(
                namespace,
                failed,
                "an earlier run failed; register the namespace again to retry",
            ));
        }

        self.ensure_tracking_table().await?;
        let from_version = self.watermark(namespace).await?;
        let mut report = MigrationReport {
            namespace: namespace.to_string(),
            from_version,
            to_version: from_version,
            applied: Vec::new(),
        };

        for migration in &migrations {
            if migration.version <= from_version {
                self.set_state(namespace, migration.version, MigrationState::Applied);
                continue;
            }
            self.apply(namespace, migration).await?;
            report.applied.push(migration.version);
            report.to_version = migration.version;
        }

        if report.applied.is_empty() {
            self.logger().debug(
                LogCategory::Migration,
                format!("'{}' is up to date at version {}", namespace, from_version),
            );
        } else {
            self.logger().info(
                LogCategory::Migration,
                format!(
                    "'{}' migrated from version {} to {}",
                    namespace, report.from_version, report.to_version
                ),
            );
        }
        Ok(report)
    }

    /// Run every registered namespace in registration order.
    ///
    /// Stops at the first failing namespace.
    pub async fn run_all(&self) -> DbResult<Vec<MigrationReport>> {
        let namespaces = self.lock_registry().order.clone();
        let mut reports = Vec::with_capacity(namespaces.len());
        for namespace in namespaces {
            reports.push(self.run_migrations(&namespace).await?);
        }
        Ok(reports)
    }

    /// Highest applied version of `namespace`, 0 when none.
    pub async fn current_version(&self, namespace: &str) -> DbResult<i64> {
        self.ensure_tracking_table().await?;
        self.watermark(namespace).await
    }

    /// State of every registered migration of `namespace`, by version.
    pub fn states(&self, namespace: &str) -> BTreeMap<i64, MigrationState> {
        self.lock_registry()
            .namespaces
            .get(namespace)
            .map(|entry| entry.states.clone())
            .unwrap_or_default()
    }

    /// Tracking rows of `namespace`, oldest version first.
    pub async fn history(&self, namespace: &str) -> DbResult<Vec<AppliedMigration>> {
        self.ensure_tracking_table().await?;
        let sql = format!(
            "SELECT version, description, applied_at FROM {} WHERE namespace = ? ORDER BY version",
            TRACKING_TABLE
        );
        self.db
            .query_with(Origin::Internal, &sql, (namespace,), |row| {
                Ok(AppliedMigration {
                    version: row.get_i64("version")?,
                    description: row.get_string("description")?,
                    applied_at: row.get_timestamp("applied_at")?,
                })
            })
            .await
    }

    /// Revert the latest applied migration of `namespace`.
    ///
    /// Only the version at the watermark can be rolled back, so the watermark
    /// always drops to the previous applied version.
    pub async fn rollback(&self, namespace: &str, version: i64) -> DbResult<()> {
        let _running = self.run_lock.lock().await;
        let migration = self
            .registered(namespace)?
            .into_iter()
            .find(|m| m.version == version)
            .ok_or_else(|| DbError::migration(namespace, version, "not registered"))?;

        self.ensure_tracking_table().await?;
        let watermark = self.watermark(namespace).await?;
        if watermark != version {
            return Err(DbError::migration(
                namespace,
                version,
                format!("only the latest applied version ({}) can be rolled back", watermark),
            ));
        }

        let delete = format!(
            "DELETE FROM {} WHERE namespace = ? AND version = ?",
            TRACKING_TABLE
        );
        let step = Arc::clone(&migration.step);
        let ns = namespace.to_string();
        self.db
            .transaction_with(Origin::Migration, move |tx| {
                Box::pin(async move {
                    step.rollback(tx).await?;
                    tx.update(&delete, (ns, version)).await?;
                    Ok::<(), DbError>(())
                })
            })
            .await
            .map_err(|e| self.failure(namespace, version, "Rollback", e))?;

        self.set_state(namespace, version, MigrationState::Pending);
        self.logger().warn(
            LogCategory::Migration,
            format!("Rolled back '{}' version {}", namespace, version),
        );
        Ok(())
    }

    async fn apply(&self, namespace: &str, migration: &Migration) -> DbResult<()> {
        let version = migration.version;
        self.set_state(namespace, version, MigrationState::Applying);
        self.logger().info(
            LogCategory::Migration,
            format!(
                "Applying '{}' version {}: {}",
                namespace, version, migration.description
            ),
        );

        let dialect = self.db.dialect();
        let transactional_ddl = dialect.supports(Feature::TransactionalDdl);
        if !transactional_ddl {
            self.logger().warn(
                LogCategory::Migration,
                format!(
                    "{} commits DDL implicitly; '{}' version {} cannot be rolled back if it fails midway",
                    dialect.name(),
                    namespace,
                    version
                ),
            );
        }

        let insert = format!(
            "INSERT INTO {} (namespace, version, description, applied_at) VALUES (?, ?, ?, ?)",
            TRACKING_TABLE
        );
        let step = Arc::clone(&migration.step);
        let ns = namespace.to_string();
        let description = migration.description.clone();
        let started = Instant::now();

        let result = self
            .db
            .transaction_with(Origin::Migration, move |tx| {
                Box::pin(async move {
                    step.migrate(tx).await?;
                    tx.update(&insert, (ns, version, description, Utc::now().naive_utc()))
                        .await?;
                    Ok::<(), DbError>(())
                })
            })
            .await;

        match result {
            Ok(()) => {
                self.set_state(namespace, version, MigrationState::Applied);
                self.logger().debug(
                    LogCategory::Migration,
                    format!(
                        "'{}' version {} applied in {} ms",
                        namespace,
                        version,
                        started.elapsed().as_millis()
                    ),
                );
                Ok(())
            }
            Err(e) if transactional_ddl => {
                self.set_state(namespace, version, MigrationState::Failed);
                Err(self.failure(namespace, version, "Migration", e))
            }
            Err(e) => {
                self.set_state(namespace, version, MigrationState::Failed);
                let e = DbError::migration(
                    namespace,
                    version,
                    format!(
                        "{}; schema changes made before the failure may be committed, \
                         repair them before registering '{}' again",
                        e, namespace
                    ),
                );
                Err(self.failure(namespace, version, "Migration", e))
            }
        }
    }

    fn failure(&self, namespace: &str, version: i64, what: &str, e: DbError) -> DbError {
        self.logger().error(
            LogCategory::Migration,
            format!("{} '{}' version {} failed: {}", what, namespace, version, e),
        );
        match e {
            DbError::Migration { .. } => e,
            other => DbError::migration(namespace, version, other.to_string()),
        }
    }

    async fn ensure_tracking_table(&self) -> DbResult<()> {
        let dialect = self.db.dialect();
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (\
             namespace {} NOT NULL, \
             version {} NOT NULL, \
             description {} NOT NULL, \
             applied_at {} NOT NULL, \
             PRIMARY KEY (namespace, version))",
            TRACKING_TABLE,
            dialect.column_type(SqlType::String(128)),
            dialect.column_type(SqlType::Long),
            dialect.column_type(SqlType::String(255)),
            dialect.column_type(SqlType::Timestamp),
        );
        self.db.update_with(Origin::Internal, &sql, ()).await?;
        Ok(())
    }

    async fn watermark(&self, namespace: &str) -> DbResult<i64> {
        let sql = format!(
            "SELECT COALESCE(MAX(version), 0) AS watermark FROM {} WHERE namespace = ?",
            TRACKING_TABLE
        );
        let versions = self
            .db
            .query_with(Origin::Internal, &sql, (namespace,), |row| row.get_at::<i64>(0))
            .await?;
        Ok(versions.into_iter().next().unwrap_or(0))
    }

    fn registered(&self, namespace: &str) -> DbResult<Vec<Migration>> {
        self.lock_registry()
            .namespaces
            .get(namespace)
            .map(|entry| entry.migrations.clone())
            .ok_or_else(|| {
                DbError::invalid_input(format!(
                    "No migrations registered for namespace '{}'",
                    namespace
                ))
            })
    }

    fn failed_version(&self, namespace: &str) -> Option<i64> {
        self.lock_registry()
            .namespaces
            .get(namespace)?
            .states
            .iter()
            .find(|(_, state)| **state == MigrationState::Failed)
            .map(|(version, _)| *version)
    }

    fn set_state(&self, namespace: &str, version: i64, state: MigrationState) {
        if let Some(entry) = self.lock_registry().namespaces.get_mut(namespace) {
            entry.states.insert(version, state);
        }
    }

    fn logger(&self) -> &crate::instrument::EnhancedLogger {
        &self.db.instruments().logger
    }

    fn lock_registry(&self) -> std::sync::MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }
}
