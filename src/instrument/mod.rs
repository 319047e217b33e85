//! Runtime instrumentation: statistics, performance sampling, buffered
//! category logs and statement screening.
//!
//! All four services are shared by reference. The facade records into them
//! on every statement and the bridge drives their periodic work through the
//! scheduler.

pub mod logger;
pub mod monitor;
pub mod stats;
pub mod validator;

pub use logger::{EnhancedLogger, LogCategory, LogEntry, LogLevel};
pub use monitor::{Complexity, PerformanceMonitor, PerformanceReport, PerformanceSample};
pub use stats::{QueryKind, QueryStatistics, SlowQuery, StatisticsSnapshot};
pub use validator::{Finding, QueryValidator, Severity, ValidationMode};

use crate::config::BridgeSettings;
use crate::models::DatabaseType;
use std::sync::Arc;
use unicode_width::UnicodeWidthChar;

/// The instrumentation services of one bridge.
#[derive(Debug, Clone)]
pub struct Instruments {
    pub statistics: Arc<QueryStatistics>,
    pub monitor: Arc<PerformanceMonitor>,
    pub logger: Arc<EnhancedLogger>,
    pub validator: Arc<QueryValidator>,
}

impl Instruments {
    pub fn new(settings: &BridgeSettings, db_type: DatabaseType) -> Self {
        Self {
            statistics: Arc::new(QueryStatistics::new(
                settings.slow_query_threshold,
                settings.slow_log_capacity,
            )),
            monitor: Arc::new(PerformanceMonitor::new(settings.sample_history)),
            logger: Arc::new(EnhancedLogger::new(
                settings.log_buffer_size,
                settings.buffer_level,
                settings.log_dir.clone(),
            )),
            validator: Arc::new(QueryValidator::new(settings.validation_mode, db_type)),
        }
    }
}

/// Collapse whitespace and cut `sql` to at most `max_width` display columns.
///
/// Truncated text ends with `...`, which counts toward the width.
pub fn truncate_sql(sql: &str, max_width: usize) -> String {
    let collapsed = sql.split_whitespace().collect::<Vec<_>>().join(" ");
    let total: usize = collapsed.chars().map(|c| c.width().unwrap_or(0)).sum();
    if total <= max_width {
        return collapsed;
    }

    let budget = max_width.saturating_sub(3);
    let mut width = 0;
    let mut out = String::new();
    for c in collapsed.chars() {
        let w = c.width().unwrap_or(0);
        if width + w > budget {
            break;
        }
        width += w;
        out.push(c);
    }
    out.push_str("...");
    out
}
