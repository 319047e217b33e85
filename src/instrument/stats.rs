//! Query statistics.
//!
//! Counters are independent atomics so recording never blocks statement
//! execution. Only the slow-query log takes a lock.

use super::truncate_sql;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Width of statement text kept in slow-log entries.
const SLOW_LOG_SQL_WIDTH: usize = 200;

/// Kind of statement recorded by the facade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryKind {
    Query,
    Update,
    Insert,
    /// A whole batch counts once, however many parameter sets it ran.
    Batch,
}

/// One entry of the slow-query log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlowQuery {
    pub sql: String,
    pub kind: QueryKind,
    pub elapsed_ms: f64,
    pub at: DateTime<Utc>,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatisticsSnapshot {
    pub since: DateTime<Utc>,
    pub queries: u64,
    pub updates: u64,
    pub inserts: u64,
    pub batches: u64,
    pub transactions: u64,
    pub rollbacks: u64,
    pub failures: u64,
    /// Statements blocked by the validator
    pub rejected: u64,
    pub slow_queries: u64,
    pub total_query_ms: f64,
    pub total_update_ms: f64,
    pub total_insert_ms: f64,
    pub total_batch_ms: f64,
    pub average_query_ms: f64,
    pub average_update_ms: f64,
    pub average_insert_ms: f64,
    pub average_batch_ms: f64,
    pub max_ms: f64,
}

#[derive(Debug, Default)]
struct Counter {
    count: AtomicU64,
    total_us: AtomicU64,
}

impl Counter {
    fn add(&self, elapsed: Duration) {
        self.count.fetch_add(1, Ordering::Relaxed);
        self.total_us
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    fn total_ms(&self) -> f64 {
        self.total_us.load(Ordering::Relaxed) as f64 / 1000.0
    }

    fn average_ms(&self) -> f64 {
        match self.count() {
            0 => 0.0,
            n => self.total_ms() / n as f64,
        }
    }

    fn reset(&self) {
        self.count.store(0, Ordering::Relaxed);
        self.total_us.store(0, Ordering::Relaxed);
    }
}

#[derive(Debug)]
pub struct QueryStatistics {
    queries: Counter,
    updates: Counter,
    inserts: Counter,
    batches: Counter,
    transactions: AtomicU64,
    rollbacks: AtomicU64,
    failures: AtomicU64,
    rejected: AtomicU64,
    slow_queries: AtomicU64,
    max_us: AtomicU64,
    slow_threshold: Duration,
    slow_capacity: usize,
    slow_log: Mutex<VecDeque<SlowQuery>>,
    since: Mutex<DateTime<Utc>>,
}

impl QueryStatistics {
    pub fn new(slow_threshold: Duration, slow_capacity: usize) -> Self {
        Self {
            queries: Counter::default(),
            updates: Counter::default(),
            inserts: Counter::default(),
            batches: Counter::default(),
            transactions: AtomicU64::new(0),
            rollbacks: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            slow_queries: AtomicU64::new(0),
            max_us: AtomicU64::new(0),
            slow_threshold,
            slow_capacity: slow_capacity.max(1),
            slow_log: Mutex::new(VecDeque::new()),
            since: Mutex::new(Utc::now()),
        }
    }

    pub fn slow_threshold(&self) -> Duration {
        self.slow_threshold
    }

    /// Record a successful statement. Returns true when it was slow.
    pub fn record(&self, kind: QueryKind, sql: &str, elapsed: Duration) -> bool {
        match kind {
            QueryKind::Query => self.queries.add(elapsed),
            QueryKind::Update => self.updates.add(elapsed),
            QueryKind::Insert => self.inserts.add(elapsed),
            QueryKind::Batch => self.batches.add(elapsed),
        }
        self.max_us
            .fetch_max(elapsed.as_micros() as u64, Ordering::Relaxed);

        if elapsed <= self.slow_threshold {
            return false;
        }
        self.slow_queries.fetch_add(1, Ordering::Relaxed);
        let entry = SlowQuery {
            sql: truncate_sql(sql, SLOW_LOG_SQL_WIDTH),
            kind,
            elapsed_ms: elapsed.as_secs_f64() * 1000.0,
            at: Utc::now(),
        };
        let mut log = self.slow_log.lock().unwrap_or_else(|e| e.into_inner());
        if log.len() == self.slow_capacity {
            log.pop_front();
        }
        log.push_back(entry);
        true
    }

    pub fn record_query(&self, sql: &str, elapsed: Duration) -> bool {
        self.record(QueryKind::Query, sql, elapsed)
    }

    pub fn record_update(&self, sql: &str, elapsed: Duration) -> bool {
        self.record(QueryKind::Update, sql, elapsed)
    }

    pub fn record_insert(&self, sql: &str, elapsed: Duration) -> bool {
        self.record(QueryKind::Insert, sql, elapsed)
    }

    pub fn record_batch(&self, sql: &str, elapsed: Duration) -> bool {
        self.record(QueryKind::Batch, sql, elapsed)
    }

    /// A committed transaction.
    pub fn record_transaction(&self) {
        self.transactions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rollback(&self) {
        self.rollbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn average_query_ms(&self) -> f64 {
        self.queries.average_ms()
    }

    pub fn average_update_ms(&self) -> f64 {
        self.updates.average_ms()
    }

    pub fn average_insert_ms(&self) -> f64 {
        self.inserts.average_ms()
    }

    pub fn average_batch_ms(&self) -> f64 {
        self.batches.average_ms()
    }

    /// Slow-log entries, oldest first.
    pub fn slow_queries(&self) -> Vec<SlowQuery> {
        let log = self.slow_log.lock().unwrap_or_else(|e| e.into_inner());
        log.iter().cloned().collect()
    }

    pub fn snapshot(&self) -> StatisticsSnapshot {
        let since = *self.since.lock().unwrap_or_else(|e| e.into_inner());
        StatisticsSnapshot {
            since,
            queries: self.queries.count(),
            updates: self.updates.count(),
            inserts: self.inserts.count(),
            batches: self.batches.count(),
            transactions: self.transactions.load(Ordering::Relaxed),
            rollbacks: self.rollbacks.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            slow_queries: self.slow_queries.load(Ordering::Relaxed),
            total_query_ms: self.queries.total_ms(),
            total_update_ms: self.updates.total_ms(),
            total_insert_ms: self.inserts.total_ms(),
            total_batch_ms: self.batches.total_ms(),
            average_query_ms: self.queries.average_ms(),
            average_update_ms: self.updates.average_ms(),
            average_insert_ms: self.inserts.average_ms(),
            average_batch_ms: self.batches.average_ms(),
            max_ms: self.max_us.load(Ordering::Relaxed) as f64 / 1000.0,
        }
    }

    /// Zero every counter and clear the slow log.
    pub fn reset(&self) {
        for counter in [&self.queries, &self.updates, &self.inserts, &self.batches] {
            counter.reset();
        }
        for atomic in [
            &self.transactions,
            &self.rollbacks,
            &self.failures,
            &self.rejected,
            &self.slow_queries,
            &self.max_us,
        ] {
            atomic.store(0, Ordering::Relaxed);
        }
        self.slow_log
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        *self.since.lock().unwrap_or_else(|e| e.into_inner()) = Utc::now();
    }
}
