//! Category logger with per-category ring buffers.
//!
//! Every entry is mirrored to `tracing` immediately. Entries at or above the
//! buffer level are also kept in memory until `flush` appends them to
//! `<log_dir>/<category>-<YYYY-MM-DD>.log`.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogCategory {
    Query,
    Connection,
    Migration,
    Performance,
    Security,
    General,
}

impl LogCategory {
    pub const ALL: [LogCategory; 6] = [
        LogCategory::Query,
        LogCategory::Connection,
        LogCategory::Migration,
        LogCategory::Performance,
        LogCategory::Security,
        LogCategory::General,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LogCategory::Query => "query",
            LogCategory::Connection => "connection",
            LogCategory::Migration => "migration",
            LogCategory::Performance => "performance",
            LogCategory::Security => "security",
            LogCategory::General => "general",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl std::fmt::Display for LogCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }
}

/// An immutable log record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Local>,
    pub category: LogCategory,
    pub level: LogLevel,
    pub message: String,
    pub thread: String,
}

impl LogEntry {
    /// `[timestamp] [level] [thread] message`
    pub fn format_line(&self) -> String {
        format!(
            "[{}] [{}] [{}] {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
            self.level.as_str(),
            self.thread,
            self.message
        )
    }
}

#[derive(Debug)]
pub struct EnhancedLogger {
    buffers: [Mutex<VecDeque<LogEntry>>; 6],
    capacity: usize,
    buffer_level: LogLevel,
    log_dir: Option<PathBuf>,
    evicted: AtomicU64,
    /// Serializes flushes so two writers never interleave in one file.
    flush_lock: Mutex<()>,
}

impl EnhancedLogger {
    pub fn new(capacity: usize, buffer_level: LogLevel, log_dir: Option<PathBuf>) -> Self {
        Self {
            buffers: Default::default(),
            capacity: capacity.max(1),
            buffer_level,
            log_dir,
            evicted: AtomicU64::new(0),
            flush_lock: Mutex::new(()),
        }
    }

    pub fn log_dir(&self) -> Option<&Path> {
        self.log_dir.as_deref()
    }

    pub fn log(&self, category: LogCategory, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            LogLevel::Debug => tracing::debug!(category = %category, "{}", message),
            LogLevel::Info => tracing::info!(category = %category, "{}", message),
            LogLevel::Warn => tracing::warn!(category = %category, "{}", message),
            LogLevel::Error => tracing::error!(category = %category, "{}", message),
        }
        if level < self.buffer_level {
            return;
        }

        let entry = LogEntry {
            timestamp: Local::now(),
            category,
            level,
            message,
            thread: std::thread::current()
                .name()
                .unwrap_or("unnamed")
                .to_string(),
        };
        let mut buffer = self.buffer(category);
        if buffer.len() == self.capacity {
            buffer.pop_front();
            self.evicted.fetch_add(1, Ordering::Relaxed);
        }
        buffer.push_back(entry);
    }

    pub fn debug(&self, category: LogCategory, message: impl Into<String>) {
        self.log(category, LogLevel::Debug, message)
    }

    pub fn info(&self, category: LogCategory, message: impl Into<String>) {
        self.log(category, LogLevel::Info, message)
    }

    pub fn warn(&self, category: LogCategory, message: impl Into<String>) {
        self.log(category, LogLevel::Warn, message)
    }

    pub fn error(&self, category: LogCategory, message: impl Into<String>) {
        self.log(category, LogLevel::Error, message)
    }

    /// Up to `n` most recent buffered entries of a category, oldest first.
    pub fn recent(&self, category: LogCategory, n: usize) -> Vec<LogEntry> {
        let buffer = self.buffer(category);
        let skip = buffer.len().saturating_sub(n);
        buffer.iter().skip(skip).cloned().collect()
    }

    pub fn buffered(&self, category: LogCategory) -> usize {
        self.buffer(category).len()
    }

    /// Entries dropped because a buffer was full.
    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }

    /// Drain every buffer into its category file. Returns the lines written.
    ///
    /// Without a log directory the buffers are left untouched. Entries of a
    /// category whose file cannot be written go back into the buffer.
    pub fn flush(&self) -> io::Result<usize> {
        let Some(dir) = &self.log_dir else {
            return Ok(0);
        };
        let _guard = self.flush_lock.lock().unwrap_or_else(|e| e.into_inner());
        fs::create_dir_all(dir)?;

        let mut written = 0;
        for category in LogCategory::ALL {
            let entries: Vec<LogEntry> = self.buffer(category).drain(..).collect();
            if entries.is_empty() {
                continue;
            }
            if let Err(e) = write_category(dir, category, &entries) {
                let mut buffer = self.buffer(category);
                for entry in entries.into_iter().rev() {
                    buffer.push_front(entry);
                }
                while buffer.len() > self.capacity {
                    buffer.pop_front();
                    self.evicted.fetch_add(1, Ordering::Relaxed);
                }
                return Err(e);
            }
            written += entries.len();
        }
        Ok(written)
    }

    fn buffer(&self, category: LogCategory) -> std::sync::MutexGuard<'_, VecDeque<LogEntry>> {
        self.buffers[category.index()]
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }
}

fn write_category(dir: &Path, category: LogCategory, entries: &[LogEntry]) -> io::Result<()> {
    let mut by_day: BTreeMap<String, Vec<&LogEntry>> = BTreeMap::new();
    for entry in entries {
        by_day
            .entry(entry.timestamp.format("%Y-%m-%d").to_string())
            .or_default()
            .push(entry);
    }

    for (day, day_entries) in by_day {
        let path = dir.join(format!("{}-{}.log", category, day));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let is_new = file.metadata()?.len() == 0;
        let mut writer = BufWriter::new(file);
        if is_new {
            writeln!(writer, "# sql-bridge {} log for {}", category, day)?;
            writeln!(writer, "# [timestamp] [level] [thread] message")?;
        }
        for entry in day_entries {
            writeln!(writer, "{}", entry.format_line())?;
        }
        writer.flush()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_ring_buffer_evicts_oldest() {
        let logger = EnhancedLogger::new(2, LogLevel::Debug, None);
        for i in 0..3 {
            logger.info(LogCategory::Query, format!("entry {}", i));
        }
        let recent: Vec<String> = logger
            .recent(LogCategory::Query, 10)
            .into_iter()
            .map(|e| e.message)
            .collect();
        assert_eq!(recent, vec!["entry 1", "entry 2"]);
        assert_eq!(logger.evicted(), 1);
        assert_eq!(logger.buffered(LogCategory::Security), 0);
    }

    #[test]
    fn test_entries_below_buffer_level_are_not_kept() {
        let logger = EnhancedLogger::new(10, LogLevel::Warn, None);
        logger.info(LogCategory::General, "chatty");
        logger.warn(LogCategory::General, "kept");
        let recent = logger.recent(LogCategory::General, 10);
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].level, LogLevel::Warn);
    }

    #[test]
    fn test_flush_without_dir_keeps_entries() {
        let logger = EnhancedLogger::new(10, LogLevel::Info, None);
        logger.info(LogCategory::General, "stay");
        assert_eq!(logger.flush().unwrap(), 0);
        assert_eq!(logger.buffered(LogCategory::General), 1);
    }

    #[test]
    fn test_flush_writes_header_once() {
        let temp_dir = TempDir::new().unwrap();
        let logger = EnhancedLogger::new(10, LogLevel::Info, Some(temp_dir.path().to_path_buf()));

        logger.info(LogCategory::Migration, "first");
        assert_eq!(logger.flush().unwrap(), 1);
        logger.error(LogCategory::Migration, "second");
        assert_eq!(logger.flush().unwrap(), 1);
        assert_eq!(logger.buffered(LogCategory::Migration), 0);

        let day = Local::now().format("%Y-%m-%d").to_string();
        let path = temp_dir.path().join(format!("migration-{}.log", day));
        let content = fs::read_to_string(path).unwrap();
        assert_eq!(content.matches("# sql-bridge migration log").count(), 1);
        assert!(content.contains("[INFO]"));
        assert!(content.contains("[ERROR]"));
        assert!(content.trim_end().ends_with("second"));
    }

    #[test]
    fn test_format_line() {
        let entry = LogEntry {
            timestamp: Local::now(),
            category: LogCategory::Security,
            level: LogLevel::Warn,
            message: "tautology".to_string(),
            thread: "worker".to_string(),
        };
        assert!(entry.format_line().ends_with("] [WARN] [worker] tautology"));
    }
}
