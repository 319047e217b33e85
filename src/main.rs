//! SQL bridge - admin entry point.
//!
//! Opens the configured database through the bridge and runs one command:
//! a status report, a query, a write statement or a table check. Output is
//! JSON on stdout; diagnostics go to the tracing subscriber on stderr.

use serde_json::{Value, json};
use sql_bridge::bridge::SqlBridge;
use sql_bridge::config::{BridgeConfig, Command};
use sql_bridge::error::{DbError, DbResult};
use sql_bridge::models::ConnectionConfig;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &BridgeConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = BridgeConfig::parse_args();
    init_tracing(&config);

    let db_config = config.database_config()?;
    let connection = ConnectionConfig::new(
        db_config.connection_string.clone(),
        db_config.pool_options.clone(),
    )?;

    info!(
        db_type = %connection.db_type,
        database = db_config.database.as_deref().unwrap_or("-"),
        "Starting SQL bridge v{}",
        env!("CARGO_PKG_VERSION")
    );

    let bridge = SqlBridge::with_tokio(connection, config.settings());
    if let Err(e) = bridge.start().await {
        error!(error = %e, suggestion = e.suggestion().unwrap_or(""), "Failed to start SQL bridge");
        bridge.shutdown().await;
        return Err(e.into());
    }

    let command = config.command.clone().unwrap_or(Command::Status);
    let outcome = run_command(&bridge, command).await;
    bridge.shutdown().await;

    let output = outcome?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn run_command(bridge: &SqlBridge, command: Command) -> DbResult<Value> {
    let db = bridge.database();
    match command {
        Command::Status => serde_json::to_value(bridge.status_report())
            .map_err(|e| DbError::internal(format!("Failed to render status: {}", e))),
        Command::Query { sql } => {
            let rows = db
                .query(&sql, (), |row| Ok(Value::Object(row.to_json())))
                .await?;
            Ok(json!({ "count": rows.len(), "rows": rows }))
        }
        Command::Execute { sql } => {
            let rows_affected = db.update(&sql, ()).await?;
            Ok(json!({ "rows_affected": rows_affected }))
        }
        Command::TableExists { table } => {
            let exists = db.table_exists(&table).await?;
            Ok(json!({ "table": table, "exists": exists }))
        }
    }
}
