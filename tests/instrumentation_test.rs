//! Integration tests for statistics, sampling, category logs and screening
//! as wired together by `SqlBridge`.

use sql_bridge::config::{BridgeSettings, PoolOptions};
use sql_bridge::error::DbError;
use sql_bridge::instrument::{Complexity, LogCategory, QueryKind, ValidationMode};
use sql_bridge::models::{ConnectionConfig, ConnectionStatus};
use sql_bridge::SqlBridge;
use std::time::Duration;
use tempfile::TempDir;

fn embedded_config(name: &str) -> ConnectionConfig {
    ConnectionConfig::new(format!("mem:{}", name), PoolOptions::default()).unwrap()
}

async fn started(name: &str, settings: BridgeSettings) -> SqlBridge {
    let bridge = SqlBridge::with_tokio(embedded_config(name), settings);
    bridge.start().await.unwrap();
    bridge
        .database()
        .update("CREATE TABLE events (id INTEGER PRIMARY KEY, kind TEXT)", ())
        .await
        .unwrap();
    bridge
}

#[tokio::test]
async fn test_slow_queries_are_counted_and_logged() {
    let settings = BridgeSettings {
        slow_query_threshold: Duration::ZERO,
        ..Default::default()
    };
    let bridge = started("instrument-slow", settings).await;
    let statistics = &bridge.instruments().statistics;
    statistics.reset();

    bridge
        .database()
        .query("SELECT id FROM events", (), |row| row.get_i64("id"))
        .await
        .unwrap();

    let snapshot = statistics.snapshot();
    assert_eq!(snapshot.queries, 1);
    assert_eq!(snapshot.slow_queries, 1);
    let slow = statistics.slow_queries();
    assert_eq!(slow.len(), 1);
    assert_eq!(slow[0].kind, QueryKind::Query);
    assert_eq!(slow[0].sql, "SELECT id FROM events");

    let warnings = bridge
        .instruments()
        .logger
        .recent(LogCategory::Performance, 1);
    assert!(warnings[0].message.starts_with("Slow Query"));
    assert!(warnings[0].message.contains("SELECT id FROM events"));
    bridge.shutdown().await;
}

#[tokio::test]
async fn test_monitor_tracks_complexity_and_tables() {
    let bridge = started("instrument-monitor", BridgeSettings::default()).await;
    let db = bridge.database();
    db.update("INSERT INTO events (kind) VALUES (?)", ("login",))
        .await
        .unwrap();
    db.query(
        "SELECT e.kind FROM events e JOIN events f ON e.id = f.id WHERE e.kind = ?",
        ("login",),
        |row| row.get_string("kind"),
    )
    .await
    .unwrap();

    let monitor = &bridge.instruments().monitor;
    assert!(monitor.count(Complexity::Medium) >= 1);
    let hottest = monitor.hottest_tables(1);
    assert_eq!(hottest[0].0, "events");
    bridge.shutdown().await;
}

#[tokio::test]
async fn test_sampling_task_runs_on_interval() {
    let settings = BridgeSettings {
        monitor_interval: Duration::from_millis(20),
        ..Default::default()
    };
    let bridge = started("instrument-sampling", settings).await;
    tokio::time::sleep(Duration::from_millis(150)).await;

    let samples = bridge.instruments().monitor.samples();
    assert!(!samples.is_empty());
    assert_eq!(samples[0].pool.max, bridge.connections().max_connections());

    bridge.shutdown().await;
    let after_shutdown = bridge.instruments().monitor.samples().len();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(bridge.instruments().monitor.samples().len(), after_shutdown);
}

#[tokio::test]
async fn test_shutdown_writes_category_logs() {
    let dir = TempDir::new().unwrap();
    let settings = BridgeSettings {
        log_dir: Some(dir.path().to_path_buf()),
        // Keep the periodic flush out of the way
        log_flush_interval: Duration::from_secs(3600),
        ..Default::default()
    };
    let bridge = started("instrument-logs", settings).await;
    bridge.shutdown().await;

    let files: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    let connection_log = files
        .iter()
        .find(|name| name.starts_with("connection-") && name.ends_with(".log"))
        .expect("connection log written");

    let content = std::fs::read_to_string(dir.path().join(connection_log)).unwrap();
    assert!(content.starts_with("# sql-bridge connection log for "));
    assert!(content.contains("[INFO]"));
    assert!(content.contains("Connected to Embedded"));
    assert!(content.contains("SQL bridge stopped"));
    assert_eq!(bridge.instruments().logger.buffered(LogCategory::Connection), 0);
}

#[tokio::test]
async fn test_strict_mode_rejects_before_execution() {
    let settings = BridgeSettings {
        validation_mode: ValidationMode::Strict,
        ..Default::default()
    };
    let bridge = started("instrument-strict", settings).await;
    let statistics = &bridge.instruments().statistics;
    statistics.reset();

    let err = bridge
        .database()
        .query(
            "SELECT id FROM events WHERE kind = '' OR '1'='1'",
            (),
            |row| row.get_i64("id"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Validation { .. }));

    let snapshot = statistics.snapshot();
    assert_eq!(snapshot.rejected, 1);
    assert_eq!(snapshot.queries, 0);
    assert_eq!(
        bridge.instruments().logger.buffered(LogCategory::Security),
        1
    );
    bridge.shutdown().await;
}

#[tokio::test]
async fn test_strict_mode_accepts_comment_markers_inside_literals() {
    let settings = BridgeSettings {
        validation_mode: ValidationMode::Strict,
        ..Default::default()
    };
    let bridge = started("instrument-strict-literals", settings).await;
    let db = bridge.database();
    db.update("INSERT INTO events (id, kind) VALUES (?, '#ff0000')", (1,))
        .await
        .unwrap();
    db.update("INSERT INTO events (id, kind) VALUES (?, '--')", (2,))
        .await
        .unwrap();

    let kinds = db
        .query("SELECT kind FROM events ORDER BY id", (), |row| {
            row.get_string("kind")
        })
        .await
        .unwrap();
    assert_eq!(kinds, vec!["#ff0000".to_string(), "--".to_string()]);
    assert_eq!(bridge.instruments().statistics.snapshot().rejected, 0);
    bridge.shutdown().await;
}

#[tokio::test]
async fn test_disabled_validation_lets_everything_through() {
    let settings = BridgeSettings {
        validation_mode: ValidationMode::Disabled,
        ..Default::default()
    };
    let bridge = started("instrument-disabled", settings).await;
    let rows = bridge
        .database()
        .query(
            "SELECT id FROM events WHERE kind = '' OR '1'='1'",
            (),
            |row| row.get_i64("id"),
        )
        .await
        .unwrap();
    assert!(rows.is_empty());
    assert_eq!(
        bridge.instruments().logger.buffered(LogCategory::Security),
        0
    );
    bridge.shutdown().await;
}

#[test]
fn test_status_report_serializes() {
    tokio_test::block_on(async {
        let bridge = SqlBridge::with_tokio(embedded_config("instrument-status"), BridgeSettings::default());
        bridge.start().await.unwrap();

        let report = bridge.status_report();
        assert_eq!(report.status, ConnectionStatus::Active);
        assert_eq!(report.validation_mode, ValidationMode::Permissive);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["database_type"], "embedded");
        assert_eq!(json["status"], "active");
        assert_eq!(json["pool"]["max"], 1);
        assert!(json["statistics"]["queries"].is_u64());
        assert!(json["performance"]["complexity"].is_array());

        bridge.shutdown().await;
        assert_eq!(bridge.status_report().status, ConnectionStatus::Inactive);
    });
}
