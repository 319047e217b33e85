//! Performance monitor.
//!
//! Classifies statement complexity from its text, counts table accesses and
//! keeps a bounded history of periodic samples (resident memory and pool
//! state). Everything here is heuristic: statements are matched with regexes,
//! not parsed.

use crate::db::pool::PoolStats;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{LazyLock, Mutex};
use std::time::Duration;

static JOIN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bJOIN\b").unwrap());
static WHERE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bWHERE\b").unwrap());
static GROUP_BY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bGROUP\s+BY\b").unwrap());
static ORDER_BY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bORDER\s+BY\b").unwrap());
static HAVING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bHAVING\b").unwrap());
static SUBQUERY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\(\s*SELECT\b").unwrap());
static UNION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bUNION\b").unwrap());

static TABLE_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\b(?:FROM|JOIN|INTO)\s+([`"\[]?[A-Za-z_][\w$]*[`"\]]?(?:\.[`"\[]?[A-Za-z_][\w$]*[`"\]]?)?)"#)
        .unwrap()
});
// Only a leading UPDATE names a table; "ON DUPLICATE KEY UPDATE" does not.
static UPDATE_TARGET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)^\s*UPDATE\s+([`"\[]?[A-Za-z_][\w$]*[`"\]]?(?:\.[`"\[]?[A-Za-z_][\w$]*[`"\]]?)?)"#)
        .unwrap()
});

/// Statement complexity class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Low,
    Medium,
    High,
}

impl Complexity {
    const ALL: [Complexity; 3] = [Complexity::Low, Complexity::Medium, Complexity::High];

    fn index(self) -> usize {
        match self {
            Complexity::Low => 0,
            Complexity::Medium => 1,
            Complexity::High => 2,
        }
    }

    /// Score a statement: joins, subqueries and unions weigh 2 each, GROUP BY
    /// 2, WHERE, ORDER BY and HAVING 1.
    pub fn classify(sql: &str) -> Self {
        let score = JOIN.find_iter(sql).count() * 2
            + usize::from(WHERE.is_match(sql))
            + usize::from(GROUP_BY.is_match(sql)) * 2
            + usize::from(ORDER_BY.is_match(sql))
            + usize::from(HAVING.is_match(sql))
            + SUBQUERY.find_iter(sql).count() * 2
            + UNION.find_iter(sql).count() * 2;
        match score {
            0..=2 => Complexity::Low,
            3..=5 => Complexity::Medium,
            _ => Complexity::High,
        }
    }
}

/// Tables referenced by a statement, lowercased and unquoted.
pub fn referenced_tables(sql: &str) -> Vec<String> {
    let mut tables: Vec<String> = UPDATE_TARGET
        .captures_iter(sql)
        .chain(TABLE_REF.captures_iter(sql))
        .filter_map(|caps| caps.get(1))
        .map(|m| {
            m.as_str()
                .chars()
                .filter(|c| !matches!(c, '`' | '"' | '[' | ']'))
                .collect::<String>()
                .to_lowercase()
        })
        .collect();
    tables.dedup();
    tables
}

/// One periodic sample.
#[derive(Debug, Clone, Serialize)]
pub struct PerformanceSample {
    pub at: DateTime<Utc>,
    /// Resident set size, where the platform exposes it
    pub resident_bytes: Option<u64>,
    pub pool: PoolStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComplexityStats {
    pub complexity: Complexity,
    pub count: u64,
    pub average_ms: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableAccess {
    pub table: String,
    pub count: u64,
}

/// Summary rendered for operators.
#[derive(Debug, Clone, Serialize)]
pub struct PerformanceReport {
    pub complexity: Vec<ComplexityStats>,
    pub hottest_tables: Vec<TableAccess>,
    pub samples: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resident_memory: Option<String>,
    /// Highest `in_use` seen across the sample history
    pub peak_in_use: usize,
}

#[derive(Debug)]
pub struct PerformanceMonitor {
    counts: [AtomicU64; 3],
    time_us: [AtomicU64; 3],
    table_hits: Mutex<HashMap<String, u64>>,
    samples: Mutex<VecDeque<PerformanceSample>>,
    history: usize,
}

impl PerformanceMonitor {
    pub fn new(history: usize) -> Self {
        Self {
            counts: Default::default(),
            time_us: Default::default(),
            table_hits: Mutex::new(HashMap::new()),
            samples: Mutex::new(VecDeque::new()),
            history: history.max(1),
        }
    }

    /// Record one executed statement.
    pub fn record(&self, sql: &str, elapsed: Duration) -> Complexity {
        let complexity = Complexity::classify(sql);
        let idx = complexity.index();
        self.counts[idx].fetch_add(1, Ordering::Relaxed);
        self.time_us[idx].fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);

        let tables = referenced_tables(sql);
        if !tables.is_empty() {
            let mut hits = self.table_hits.lock().unwrap_or_else(|e| e.into_inner());
            for table in tables {
                *hits.entry(table).or_insert(0) += 1;
            }
        }
        complexity
    }

    pub fn count(&self, complexity: Complexity) -> u64 {
        self.counts[complexity.index()].load(Ordering::Relaxed)
    }

    /// The `n` most accessed tables, most accessed first.
    pub fn hottest_tables(&self, n: usize) -> Vec<(String, u64)> {
        let hits = self.table_hits.lock().unwrap_or_else(|e| e.into_inner());
        let mut tables: Vec<(String, u64)> = hits.iter().map(|(t, c)| (t.clone(), *c)).collect();
        tables.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        tables.truncate(n);
        tables
    }

    /// Capture memory and pool state into the bounded history.
    pub fn sample(&self, pool: PoolStats) -> PerformanceSample {
        let sample = PerformanceSample {
            at: Utc::now(),
            resident_bytes: resident_memory_bytes(),
            pool,
        };
        let mut samples = self.samples.lock().unwrap_or_else(|e| e.into_inner());
        if samples.len() == self.history {
            samples.pop_front();
        }
        samples.push_back(sample.clone());
        sample
    }

    pub fn samples(&self) -> Vec<PerformanceSample> {
        let samples = self.samples.lock().unwrap_or_else(|e| e.into_inner());
        samples.iter().cloned().collect()
    }

    pub fn report(&self) -> PerformanceReport {
        let complexity = Complexity::ALL
            .iter()
            .map(|c| {
                let count = self.count(*c);
                let total_ms = self.time_us[c.index()].load(Ordering::Relaxed) as f64 / 1000.0;
                ComplexityStats {
                    complexity: *c,
                    count,
                    average_ms: if count == 0 { 0.0 } else { total_ms / count as f64 },
                }
            })
            .collect();
        let hottest_tables = self
            .hottest_tables(5)
            .into_iter()
            .map(|(table, count)| TableAccess { table, count })
            .collect();

        let samples = self.samples.lock().unwrap_or_else(|e| e.into_inner());
        let resident_memory = samples
            .back()
            .and_then(|s| s.resident_bytes)
            .map(|bytes| humansize::format_size(bytes, humansize::WINDOWS));
        let peak_in_use = samples.iter().map(|s| s.pool.in_use).max().unwrap_or(0);

        PerformanceReport {
            complexity,
            hottest_tables,
            samples: samples.len(),
            resident_memory,
            peak_in_use,
        }
    }
}

/// Resident set size from `/proc/self/statm`. Assumes 4 KiB pages.
fn resident_memory_bytes() -> Option<u64> {
    let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
    let pages: u64 = statm.split_whitespace().nth(1)?.parse().ok()?;
    Some(pages * 4096)
}
