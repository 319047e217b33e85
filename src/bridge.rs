//! The assembled bridge: pool, facade, migrations and background upkeep.

use crate::config::BridgeSettings;
use crate::db::{ConnectionManager, Database, HealthSnapshot, PoolStats};
use crate::error::DbResult;
use crate::instrument::{
    Instruments, LogCategory, PerformanceReport, StatisticsSnapshot, ValidationMode,
};
use crate::migration::{MigrationManager, MigrationReport};
use crate::models::{ConnectionConfig, ConnectionStatus, DatabaseType};
use crate::scheduler::{Scheduler, TaskHandle, TokioScheduler};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Point-in-time view of the bridge, as printed by the `status` command.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub database_type: DatabaseType,
    pub connection: String,
    pub status: ConnectionStatus,
    pub health: HealthSnapshot,
    pub pool: PoolStats,
    pub statistics: StatisticsSnapshot,
    pub performance: PerformanceReport,
    pub validation_mode: ValidationMode,
}

#[derive(Debug)]
pub struct SqlBridge {
    connections: ConnectionManager,
    database: Database,
    migrations: Arc<MigrationManager>,
    instruments: Instruments,
    settings: BridgeSettings,
    scheduler: Arc<dyn Scheduler>,
    tasks: Mutex<Vec<TaskHandle>>,
}

impl SqlBridge {
    pub fn new(
        config: ConnectionConfig,
        settings: BridgeSettings,
        scheduler: Arc<dyn Scheduler>,
    ) -> Self {
        let connections = ConnectionManager::new(config);
        let instruments = Instruments::new(&settings, connections.database_type());
        let database = Database::new(connections.clone(), instruments.clone(), settings.adapt_sql);
        let migrations = Arc::new(MigrationManager::new(database.clone()));
        Self {
            connections,
            database,
            migrations,
            instruments,
            settings,
            scheduler,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Bridge running its upkeep on the current tokio runtime.
    pub fn with_tokio(config: ConnectionConfig, settings: BridgeSettings) -> Self {
        Self::new(config, settings, Arc::new(TokioScheduler))
    }

    /// Open the pool and schedule log flushing and performance sampling.
    ///
    /// Calling it again only re-validates the pool.
    pub async fn start(&self) -> DbResult<()> {
        self.connections.initialize().await?;
        self.instruments.logger.info(
            LogCategory::Connection,
            format!(
                "Connected to {} at {}",
                self.connections.database_type(),
                self.connections.config().masked_connection_string()
            ),
        );

        let mut tasks = self.lock_tasks();
        if !tasks.is_empty() {
            return Ok(());
        }
        if self.instruments.logger.log_dir().is_some() {
            tasks.push(self.schedule_log_flush());
        }
        tasks.push(self.schedule_sampling());
        info!(tasks = tasks.len(), "SQL bridge started");
        Ok(())
    }

    fn schedule_log_flush(&self) -> TaskHandle {
        let logger = Arc::downgrade(&self.instruments.logger);
        self.scheduler.schedule_repeating(
            "log-flush",
            self.settings.log_flush_interval,
            Arc::new(move || {
                let logger = logger.clone();
                Box::pin(async move {
                    let Some(logger) = logger.upgrade() else {
                        return;
                    };
                    match tokio::task::spawn_blocking(move || logger.flush()).await {
                        Ok(Ok(0)) => {}
                        Ok(Ok(lines)) => debug!(lines, "Flushed bridge logs"),
                        Ok(Err(e)) => warn!(error = %e, "Failed to flush bridge logs"),
                        Err(e) => warn!(error = %e, "Log flush task panicked"),
                    }
                })
            }),
        )
    }

    fn schedule_sampling(&self) -> TaskHandle {
        let monitor = Arc::downgrade(&self.instruments.monitor);
        let connections = self.connections.clone();
        self.scheduler.schedule_repeating(
            "performance-sample",
            self.settings.monitor_interval,
            Arc::new(move || {
                let monitor = monitor.clone();
                let connections = connections.clone();
                Box::pin(async move {
                    let Some(monitor) = monitor.upgrade() else {
                        return;
                    };
                    let sample = monitor.sample(connections.stats());
                    debug!(
                        resident_bytes = sample.resident_bytes,
                        in_use = sample.pool.in_use,
                        idle = sample.pool.idle,
                        "Performance sample"
                    );
                })
            }),
        )
    }

    /// Run every registered migration namespace in the background.
    ///
    /// The outcome is delivered on the returned receiver; cancelling the handle
    /// drops it.
    pub fn spawn_migrations(
        &self,
    ) -> (TaskHandle, oneshot::Receiver<DbResult<Vec<MigrationReport>>>) {
        let (tx, rx) = oneshot::channel();
        let migrations = Arc::clone(&self.migrations);
        let handle = self.scheduler.spawn(
            "migrations",
            Box::pin(async move {
                let result = migrations.run_all().await;
                match &result {
                    Ok(reports) => debug!(namespaces = reports.len(), "Background migrations finished"),
                    Err(e) => warn!(error = %e, "Background migrations failed"),
                }
                let _ = tx.send(result);
            }),
        );
        (handle, rx)
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn migrations(&self) -> &MigrationManager {
        &self.migrations
    }

    pub fn connections(&self) -> &ConnectionManager {
        &self.connections
    }

    pub fn instruments(&self) -> &Instruments {
        &self.instruments
    }

    pub fn settings(&self) -> &BridgeSettings {
        &self.settings
    }

    /// Snapshot of status, pool, statistics and performance. Does not probe.
    pub fn status_report(&self) -> StatusReport {
        StatusReport {
            database_type: self.connections.database_type(),
            connection: self.connections.config().masked_connection_string(),
            status: self.connections.status(),
            health: self.connections.health(),
            pool: self.connections.stats(),
            statistics: self.instruments.statistics.snapshot(),
            performance: self.instruments.monitor.report(),
            validation_mode: self.instruments.validator.mode(),
        }
    }

    /// Stop upkeep, close the pool and write out buffered log entries.
    pub async fn shutdown(&self) {
        let tasks: Vec<TaskHandle> = self.lock_tasks().drain(..).collect();
        for task in &tasks {
            task.cancel();
        }
        self.connections.close().await;
        self.instruments
            .logger
            .info(LogCategory::Connection, "SQL bridge stopped");
        if let Err(e) = self.instruments.logger.flush() {
            warn!(error = %e, "Final log flush failed");
        }
    }

    fn lock_tasks(&self) -> std::sync::MutexGuard<'_, Vec<TaskHandle>> {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner())
    }
}
