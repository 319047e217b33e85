//! SQL dialect abstraction.
//!
//! A [`Dialect`] is a stateless strategy chosen once from the configured
//! [`DatabaseType`]. Every method is a pure string transformation; nothing
//! here touches a connection.
//!
//! - Identifier quoting and literal formatting
//! - Column type and auto-increment mapping
//! - Pagination, date formatting, concatenation
//! - Feature detection (RETURNING, upsert, CTEs, ...)
//! - Placeholder rewriting from portable `?` to the backend's style

pub mod adapter;
mod embedded;
mod mysql;
mod postgres;
mod sqlite;

pub use embedded::EmbeddedDialect;
pub use mysql::MySqlDialect;
pub use postgres::PostgresDialect;
pub use sqlite::SqliteDialect;

use crate::models::{DatabaseType, QueryParam};
use std::borrow::Cow;
use std::sync::Arc;

/// Portable column types understood by every dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    Integer,
    Long,
    /// Bounded character column
    String(u32),
    Text,
    Boolean,
    Timestamp,
    Blob,
    Double,
}

/// Optional SQL capabilities that differ between backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    Returning,
    MultiRowInsert,
    Upsert,
    Cte,
    WindowFunctions,
    ForeignKeys,
    TransactionalDdl,
    FullTextSearch,
}

impl Feature {
    pub const ALL: [Feature; 8] = [
        Feature::Returning,
        Feature::MultiRowInsert,
        Feature::Upsert,
        Feature::Cte,
        Feature::WindowFunctions,
        Feature::ForeignKeys,
        Feature::TransactionalDdl,
        Feature::FullTextSearch,
    ];
}

/// SQL dialect for backend-specific SQL generation.
pub trait Dialect: Send + Sync + std::fmt::Debug {
    /// Get the dialect name
    fn name(&self) -> &'static str;

    fn database_type(&self) -> DatabaseType;

    /// Quote an identifier (table, column name), escaping embedded quotes
    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    /// Native column type for a portable type
    fn column_type(&self, ty: SqlType) -> String;

    /// Full column definition of an auto-increment primary key
    fn auto_increment_column(&self, ty: SqlType) -> String;

    /// Case-insensitive match of `column` against one `?` placeholder
    fn case_insensitive_like(&self, column: &str) -> String {
        format!("LOWER({}) LIKE LOWER(?)", column)
    }

    /// Get the LIMIT/OFFSET syntax, with a leading space when non-empty
    fn limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> String {
        match (limit, offset) {
            (Some(l), Some(o)) => format!(" LIMIT {} OFFSET {}", l, o),
            (Some(l), None) => format!(" LIMIT {}", l),
            (None, Some(o)) => format!(" OFFSET {}", o),
            (None, None) => String::new(),
        }
    }

    /// Whether the driver reports generated keys with the execution result
    fn driver_reports_generated_keys(&self) -> bool {
        true
    }

    /// Statement returning the last generated key on the same connection
    fn last_insert_id_sql(&self) -> Option<&'static str>;

    /// Format `expr` with a portable pattern (`yyyy`, `yy`, `MM`, `dd`, `HH`, `mm`, `ss`)
    fn format_date(&self, expr: &str, pattern: &str) -> String;

    fn concat(&self, parts: &[&str]) -> String {
        parts.join(" || ")
    }

    /// Statement yielding a single count, non-zero when `table` exists
    fn table_exists_sql(&self, table: &str) -> String;

    /// Render a value as an inline SQL literal
    fn format_value(&self, value: &QueryParam) -> String {
        match value {
            QueryParam::Null => "NULL".to_string(),
            QueryParam::Bool(b) => self.boolean_literal(*b).to_string(),
            QueryParam::Int(i) => i.to_string(),
            QueryParam::Float(f) if f.is_finite() => f.to_string(),
            QueryParam::Float(f) => self.string_literal(&f.to_string()),
            QueryParam::Timestamp(ts) => {
                self.string_literal(&ts.format("%Y-%m-%d %H:%M:%S").to_string())
            }
            QueryParam::String(s) => self.string_literal(s),
            QueryParam::Bytes(bytes) => self.blob_literal(bytes),
        }
    }

    /// Get the boolean literal
    fn boolean_literal(&self, value: bool) -> &'static str {
        if value { "TRUE" } else { "FALSE" }
    }

    /// Quote a string literal, doubling every single quote
    fn string_literal(&self, value: &str) -> String {
        format!("'{}'", escape_string_literal(value))
    }

    fn blob_literal(&self, bytes: &[u8]) -> String {
        format!("X'{}'", hex_encode(bytes))
    }

    /// Get current timestamp expression
    fn current_timestamp(&self) -> &'static str {
        "CURRENT_TIMESTAMP"
    }

    /// Lightweight statement used to validate a connection
    fn probe_query(&self) -> &'static str {
        "SELECT 1"
    }

    fn begin_transaction_sql(&self) -> &'static str {
        "BEGIN"
    }

    fn supports(&self, feature: Feature) -> bool;

    /// RETURNING clause for `columns`, with a leading space
    fn returning_clause(&self, columns: &[&str]) -> Option<String> {
        if self.supports(Feature::Returning) && !columns.is_empty() {
            Some(format!(" RETURNING {}", columns.join(", ")))
        } else {
            None
        }
    }

    /// Insert-or-update statement keyed on `key_columns`, if supported
    fn upsert(&self, table: &str, columns: &[&str], key_columns: &[&str]) -> Option<String>;

    /// INSERT with `rows` placeholder tuples of `columns.len()` each
    fn multi_row_insert(&self, table: &str, columns: &[&str], rows: usize) -> String {
        format!(
            "INSERT INTO {} ({}) VALUES {}",
            table,
            columns.join(", "),
            values_clause(columns.len(), rows)
        )
    }

    /// Number of `?` placeholders the backend will see in `sql`
    fn placeholder_count(&self, sql: &str) -> usize {
        count_placeholders(sql)
    }

    /// Rewrite portable `?` placeholders into the backend's style
    fn bind_placeholders<'a>(&self, sql: &'a str) -> Cow<'a, str> {
        Cow::Borrowed(sql)
    }
}

/// Select the dialect for a backend.
pub fn dialect_for(db_type: DatabaseType) -> Arc<dyn Dialect> {
    match db_type {
        DatabaseType::SQLite => Arc::new(SqliteDialect),
        DatabaseType::MySQL => Arc::new(MySqlDialect),
        DatabaseType::PostgreSQL => Arc::new(PostgresDialect),
        DatabaseType::Embedded => Arc::new(EmbeddedDialect::default()),
    }
}

/// Escape a string for use inside a single-quoted SQL literal.
pub fn escape_string_literal(value: &str) -> String {
    value.replace('\'', "''")
}

/// `(?, ?, ?), (?, ?, ?)` for `rows` tuples of `width` placeholders.
pub fn values_clause(width: usize, rows: usize) -> String {
    let tuple = format!("({})", vec!["?"; width].join(", "));
    vec![tuple; rows.max(1)].join(", ")
}

/// Count `?` placeholders outside literals, quoted identifiers and comments.
///
/// `??` is an escaped `?` operator (PostgreSQL's jsonb `?`, `?|`, `?&`) and
/// does not count.
pub fn count_placeholders(sql: &str) -> usize {
    count_markers(sql, false)
}

fn count_markers(sql: &str, hash_comments: bool) -> usize {
    scan_placeholders(sql, hash_comments)
        .iter()
        .filter(|m| matches!(m, Marker::Param(_)))
        .count()
}

/// Replace each `?` placeholder with `render(n)`, numbering from 1, and
/// collapse each `??` escape to a single `?`.
pub fn number_placeholders<'a>(sql: &'a str, render: impl Fn(usize) -> String) -> Cow<'a, str> {
    let markers = scan_placeholders(sql, false);
    if markers.is_empty() {
        return Cow::Borrowed(sql);
    }

    let mut out = String::with_capacity(sql.len() + markers.len() * 2);
    let mut last = 0;
    let mut n = 0;
    for marker in markers {
        match marker {
            Marker::Param(pos) => {
                n += 1;
                out.push_str(&sql[last..pos]);
                out.push_str(&render(n));
                last = pos + 1;
            }
            Marker::Escaped(pos) => {
                out.push_str(&sql[last..=pos]);
                last = pos + 2;
            }
        }
    }
    out.push_str(&sql[last..]);
    Cow::Owned(out)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Marker {
    /// Byte offset of a `?` placeholder
    Param(usize),
    /// Byte offset of a `??` escape
    Escaped(usize),
}

/// Placeholder markers, skipping `'...'`, `"..."`, `` `...` ``, `$tag$...$tag$`,
/// `-- ...` and `/* ... */` regions, plus `# ...` when `hash_comments` is set.
fn scan_placeholders(sql: &str, hash_comments: bool) -> Vec<Marker> {
    #[derive(Clone, Copy, PartialEq)]
    enum State {
        Normal,
        Quoted(u8),
        LineComment,
        BlockComment,
    }

    let bytes = sql.as_bytes();
    let mut markers = Vec::new();
    let mut state = State::Normal;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        let next = bytes.get(i + 1).copied();
        match state {
            State::Normal => match b {
                b'\'' | b'"' | b'`' => state = State::Quoted(b),
                b'-' if next == Some(b'-') => {
                    state = State::LineComment;
                    i += 1;
                }
                b'#' if hash_comments => state = State::LineComment,
                b'/' if next == Some(b'*') => {
                    state = State::BlockComment;
                    i += 1;
                }
                b'$' => {
                    if let Some(end) = dollar_quoted_end(bytes, i) {
                        i = end;
                        continue;
                    }
                }
                b'?' if next == Some(b'?') => {
                    markers.push(Marker::Escaped(i));
                    i += 1;
                }
                b'?' => markers.push(Marker::Param(i)),
                _ => {}
            },
            State::Quoted(q) => {
                if b == q {
                    // A doubled quote stays inside the literal
                    if next == Some(q) {
                        i += 1;
                    } else {
                        state = State::Normal;
                    }
                }
            }
            State::LineComment => {
                if b == b'\n' {
                    state = State::Normal;
                }
            }
            State::BlockComment => {
                if b == b'*' && next == Some(b'/') {
                    state = State::Normal;
                    i += 1;
                }
            }
        }
        i += 1;
    }
    markers
}

/// End offset (exclusive) of a `$tag$...$tag$` body opening at `start`.
///
/// `$1` style parameters and `$` inside identifiers are not openers. An
/// unterminated body runs to the end of the statement.
fn dollar_quoted_end(bytes: &[u8], start: usize) -> Option<usize> {
    let is_ident = |b: u8| b.is_ascii_alphanumeric() || b == b'_' || b == b'$';
    if start > 0 && is_ident(bytes[start - 1]) {
        return None;
    }
    let tag_len = bytes[start + 1..]
        .iter()
        .take_while(|b| b.is_ascii_alphanumeric() || **b == b'_')
        .count();
    let close = start + 1 + tag_len;
    if bytes.get(close) != Some(&b'$') || bytes.get(start + 1).is_some_and(u8::is_ascii_digit) {
        return None;
    }
    let delimiter = &bytes[start..=close];
    let body = close + 1;
    let end = bytes[body..]
        .windows(delimiter.len())
        .position(|w| w == delimiter)
        .map(|offset| body + offset + delimiter.len())
        .unwrap_or(bytes.len());
    Some(end)
}

/// Translate a portable date pattern token by token.
///
/// `tokens` maps portable tokens to backend tokens and is matched longest
/// first; any other character goes through `literal`.
pub(crate) fn translate_date_pattern(
    pattern: &str,
    tokens: &[(&str, &str)],
    literal: impl Fn(char) -> String,
) -> String {
    let mut out = String::with_capacity(pattern.len() * 2);
    let mut rest = pattern;
    'outer: while !rest.is_empty() {
        for (portable, native) in tokens {
            if let Some(stripped) = rest.strip_prefix(portable) {
                out.push_str(native);
                rest = stripped;
                continue 'outer;
            }
        }
        let mut chars = rest.chars();
        if let Some(c) = chars.next() {
            out.push_str(&literal(c));
        }
        rest = chars.as_str();
    }
    out
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{:02x}", b);
    }
    out
}

/// Upsert column list helpers shared by the ON CONFLICT dialects.
pub(crate) fn non_key_columns<'a>(columns: &[&'a str], key_columns: &[&str]) -> Vec<&'a str> {
    columns
        .iter()
        .filter(|c| !key_columns.contains(c))
        .copied()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_string_literal() {
        assert_eq!(escape_string_literal("users"), "users");
        assert_eq!(escape_string_literal("don't"), "don''t");
        assert_eq!(escape_string_literal("' OR '1'='1"), "'' OR ''1''=''1");
    }

    #[test]
    fn test_count_placeholders_skips_literals_and_comments() {
        assert_eq!(count_placeholders("SELECT * FROM t WHERE a = ? AND b = ?"), 2);
        assert_eq!(count_placeholders("SELECT '?' FROM t WHERE a = ?"), 1);
        assert_eq!(count_placeholders("SELECT \"we?rd\" FROM t"), 0);
        assert_eq!(count_placeholders("SELECT 1 -- why?\nFROM t WHERE x = ?"), 1);
        assert_eq!(count_placeholders("SELECT /* ? */ 1"), 0);
        assert_eq!(count_placeholders("SELECT 'it''s ?' , ?"), 1);
    }

    #[test]
    fn test_count_placeholders_skips_dollar_quoted_bodies() {
        let function = "CREATE FUNCTION f() RETURNS int AS $$ SELECT CASE WHEN ? THEN 1 END $$ LANGUAGE sql";
        assert_eq!(count_placeholders(function), 0);
        assert_eq!(count_placeholders("SELECT $body$ ? $body$, ?"), 1);
        assert_eq!(count_placeholders("SELECT $1, ?"), 1);
        assert_eq!(count_placeholders("SELECT a$b, ? FROM t"), 1);
    }

    #[test]
    fn test_escaped_question_mark_operator() {
        assert_eq!(count_placeholders("SELECT * FROM docs WHERE data ?? 'owner'"), 0);
        assert_eq!(
            count_placeholders("SELECT * FROM docs WHERE data ??| ? AND id = ?"),
            2
        );
        let sql = number_placeholders("SELECT * FROM docs WHERE data ??& ? AND id = ?", |n| {
            format!("${}", n)
        });
        assert_eq!(sql, "SELECT * FROM docs WHERE data ?& $1 AND id = $2");
    }

    #[test]
    fn test_hash_comments_only_when_enabled() {
        let sql = "SELECT 1 # why?\nFROM t WHERE x = ?";
        assert_eq!(count_markers(sql, true), 1);
        assert_eq!(count_markers(sql, false), 2);
    }

    #[test]
    fn test_number_placeholders() {
        let sql = number_placeholders("UPDATE t SET a = ?, b = '?' WHERE id = ?", |n| {
            format!("${}", n)
        });
        assert_eq!(sql, "UPDATE t SET a = $1, b = '?' WHERE id = $2");
    }

    #[test]
    fn test_number_placeholders_borrows_without_placeholders() {
        let sql = number_placeholders("SELECT 1", |n| format!("${}", n));
        assert!(matches!(sql, Cow::Borrowed(_)));
    }

    #[test]
    fn test_values_clause() {
        assert_eq!(values_clause(2, 3), "(?, ?), (?, ?), (?, ?)");
        assert_eq!(values_clause(1, 0), "(?)");
    }

    #[test]
    fn test_translate_date_pattern_longest_first() {
        let tokens = [("yyyy", "%Y"), ("yy", "%y"), ("MM", "%m")];
        let out = translate_date_pattern("yyyy/yy-MM", &tokens, |c| c.to_string());
        assert_eq!(out, "%Y/%y-%m");
    }

    #[test]
    fn test_hex_encode() {
        assert_eq!(hex_encode(&[0xde, 0xad, 0x01]), "dead01");
    }

    #[test]
    fn test_dialect_for_every_type() {
        for db_type in [
            DatabaseType::SQLite,
            DatabaseType::MySQL,
            DatabaseType::PostgreSQL,
            DatabaseType::Embedded,
        ] {
            assert_eq!(dialect_for(db_type).database_type(), db_type);
        }
    }

    #[test]
    fn test_format_value_null_and_quotes_for_every_dialect() {
        for db_type in [
            DatabaseType::SQLite,
            DatabaseType::MySQL,
            DatabaseType::PostgreSQL,
            DatabaseType::Embedded,
        ] {
            let dialect = dialect_for(db_type);
            assert_eq!(dialect.format_value(&QueryParam::Null), "NULL");
            assert_eq!(
                dialect.format_value(&QueryParam::String("O'Brien".into())),
                "'O''Brien'"
            );
        }
    }
}
