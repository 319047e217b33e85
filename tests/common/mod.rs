//! Shared setup for integration tests.

#![allow(dead_code)]

use sql_bridge::config::{BridgeSettings, PoolOptions};
use sql_bridge::db::{ConnectionManager, Database};
use sql_bridge::dialect::{Dialect, EmbeddedDialect, Feature, SqlType};
use sql_bridge::instrument::Instruments;
use sql_bridge::models::{ConnectionConfig, DatabaseType};
use std::sync::Arc;
use tempfile::NamedTempFile;

/// File-backed SQLite connection manager, already initialized.
pub async fn sqlite_manager(temp_file: &NamedTempFile, pool_options: PoolOptions) -> ConnectionManager {
    let url = format!("sqlite:{}", temp_file.path().display());
    let config = ConnectionConfig::new(url, pool_options).unwrap();
    let manager = ConnectionManager::new(config);
    manager.initialize().await.unwrap();
    manager
}

/// Embedded in-memory connection manager, already initialized.
pub async fn embedded_manager(name: &str, pool_options: PoolOptions) -> ConnectionManager {
    let config = ConnectionConfig::new(format!("mem:{}", name), pool_options).unwrap();
    let manager = ConnectionManager::new(config);
    manager.initialize().await.unwrap();
    manager
}

pub fn database(manager: &ConnectionManager, settings: &BridgeSettings) -> Database {
    let instruments = Instruments::new(settings, manager.database_type());
    Database::new(manager.clone(), instruments, settings.adapt_sql)
}

/// A SQLite-backed database with a `users` table.
pub async fn users_db() -> (Database, NamedTempFile) {
    let temp_file = NamedTempFile::new().unwrap();
    let manager = sqlite_manager(&temp_file, PoolOptions::default()).await;
    let db = database(&manager, &BridgeSettings::default());
    db.update(
        "CREATE TABLE users (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT NOT NULL, age INTEGER)",
        (),
    )
    .await
    .unwrap();
    (db, temp_file)
}

pub async fn count_users(db: &Database) -> i64 {
    db.query_first("SELECT COUNT(*) AS n FROM users", (), |row| row.get_i64("n"))
        .await
        .unwrap()
        .unwrap_or(0)
}

/// The embedded dialect with some capabilities switched off, for exercising
/// the fallbacks other backends need.
#[derive(Debug, Default)]
pub struct RestrictedDialect {
    inner: EmbeddedDialect,
    missing: Vec<Feature>,
    keys_from_driver: bool,
}

impl RestrictedDialect {
    pub fn new(missing: &[Feature], keys_from_driver: bool) -> Self {
        Self {
            inner: EmbeddedDialect::default(),
            missing: missing.to_vec(),
            keys_from_driver,
        }
    }
}

impl Dialect for RestrictedDialect {
    fn name(&self) -> &'static str {
        "Restricted"
    }

    fn database_type(&self) -> DatabaseType {
        self.inner.database_type()
    }

    fn column_type(&self, ty: SqlType) -> String {
        self.inner.column_type(ty)
    }

    fn auto_increment_column(&self, ty: SqlType) -> String {
        self.inner.auto_increment_column(ty)
    }

    fn driver_reports_generated_keys(&self) -> bool {
        self.keys_from_driver
    }

    fn last_insert_id_sql(&self) -> Option<&'static str> {
        self.inner.last_insert_id_sql()
    }

    fn format_date(&self, expr: &str, pattern: &str) -> String {
        self.inner.format_date(expr, pattern)
    }

    fn table_exists_sql(&self, table: &str) -> String {
        self.inner.table_exists_sql(table)
    }

    fn begin_transaction_sql(&self) -> &'static str {
        self.inner.begin_transaction_sql()
    }

    fn supports(&self, feature: Feature) -> bool {
        !self.missing.contains(&feature) && self.inner.supports(feature)
    }

    fn upsert(&self, table: &str, columns: &[&str], key_columns: &[&str]) -> Option<String> {
        self.inner.upsert(table, columns, key_columns)
    }
}

/// A database on the embedded engine that speaks through `dialect`.
pub async fn restricted_db(name: &str, dialect: RestrictedDialect) -> Database {
    let manager = embedded_manager(name, PoolOptions::default()).await;
    let settings = BridgeSettings::default();
    let instruments = Instruments::new(&settings, manager.database_type());
    Database::with_dialect(manager, Arc::new(dialect), instruments, settings.adapt_sql)
}
