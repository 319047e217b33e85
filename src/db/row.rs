//! Backend-neutral result rows.
//!
//! Getters are lenient: an integer column can be read as a string, a numeric
//! string as an integer, `0`/`1` as a boolean. Reading NULL through a
//! non-optional getter is an error; use `get::<Option<T>>` for nullable
//! columns.

use crate::db::types::{SqlValue, parse_timestamp};
use crate::error::{DbError, DbResult};
use chrono::NaiveDateTime;
use std::sync::Arc;

/// One result row. Column names are shared across all rows of a result.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<SqlValue>,
}

impl Row {
    pub fn new(columns: Arc<[String]>, values: Vec<SqlValue>) -> Self {
        Self { columns, values }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Look a column up by name, exact match first, then ignoring case.
    pub fn value(&self, column: &str) -> Option<&SqlValue> {
        let idx = self
            .columns
            .iter()
            .position(|c| c == column)
            .or_else(|| self.columns.iter().position(|c| c.eq_ignore_ascii_case(column)))?;
        self.values.get(idx)
    }

    pub fn value_at(&self, idx: usize) -> Option<&SqlValue> {
        self.values.get(idx)
    }

    /// Read a column through a lenient conversion.
    pub fn get<T: FromSqlValue>(&self, column: &str) -> DbResult<T> {
        let value = self
            .value(column)
            .ok_or_else(|| DbError::schema("no such column in result", column))?;
        convert(value, column)
    }

    /// Positional variant of [`Row::get`].
    pub fn get_at<T: FromSqlValue>(&self, idx: usize) -> DbResult<T> {
        let name = self
            .columns
            .get(idx)
            .map(String::as_str)
            .unwrap_or("<out of range>");
        let value = self
            .values
            .get(idx)
            .ok_or_else(|| DbError::schema(format!("column index {} out of range", idx), name))?;
        convert(value, name)
    }

    pub fn get_string(&self, column: &str) -> DbResult<String> {
        self.get(column)
    }

    pub fn get_i32(&self, column: &str) -> DbResult<i32> {
        self.get(column)
    }

    pub fn get_i64(&self, column: &str) -> DbResult<i64> {
        self.get(column)
    }

    pub fn get_f64(&self, column: &str) -> DbResult<f64> {
        self.get(column)
    }

    pub fn get_bool(&self, column: &str) -> DbResult<bool> {
        self.get(column)
    }

    pub fn get_timestamp(&self, column: &str) -> DbResult<NaiveDateTime> {
        self.get(column)
    }

    pub fn get_bytes(&self, column: &str) -> DbResult<Vec<u8>> {
        self.get(column)
    }

    pub fn is_null(&self, column: &str) -> DbResult<bool> {
        self.value(column)
            .map(SqlValue::is_null)
            .ok_or_else(|| DbError::schema("no such column in result", column))
    }

    pub fn to_json(&self) -> serde_json::Map<String, serde_json::Value> {
        self.columns
            .iter()
            .zip(&self.values)
            .map(|(name, value)| (name.clone(), value.to_json()))
            .collect()
    }
}

fn convert<T: FromSqlValue>(value: &SqlValue, column: &str) -> DbResult<T> {
    T::from_sql_value(value).ok_or_else(|| {
        let message = if value.is_null() {
            format!("column is NULL, cannot read as {}", T::TARGET)
        } else {
            format!("cannot read {} value as {}", value.type_name(), T::TARGET)
        };
        DbError::schema(message, column)
    })
}

/// Lenient conversion out of a decoded column value.
pub trait FromSqlValue: Sized {
    /// Name used in conversion errors.
    const TARGET: &'static str;

    /// `None` when the value cannot be represented as `Self`.
    fn from_sql_value(value: &SqlValue) -> Option<Self>;
}

impl<T: FromSqlValue> FromSqlValue for Option<T> {
    const TARGET: &'static str = T::TARGET;

    fn from_sql_value(value: &SqlValue) -> Option<Self> {
        match value {
            SqlValue::Null => Some(None),
            other => T::from_sql_value(other).map(Some),
        }
    }
}

impl FromSqlValue for String {
    const TARGET: &'static str = "string";

    fn from_sql_value(value: &SqlValue) -> Option<Self> {
        match value {
            SqlValue::Null => None,
            SqlValue::Bool(b) => Some(b.to_string()),
            SqlValue::Int(i) => Some(i.to_string()),
            SqlValue::Float(f) => Some(f.to_string()),
            SqlValue::Text(s) => Some(s.clone()),
            SqlValue::Bytes(b) => String::from_utf8(b.clone()).ok(),
            SqlValue::Timestamp(ts) => Some(ts.format("%Y-%m-%d %H:%M:%S%.f").to_string()),
        }
    }
}

impl FromSqlValue for i64 {
    const TARGET: &'static str = "i64";

    fn from_sql_value(value: &SqlValue) -> Option<Self> {
        match value {
            SqlValue::Int(i) => Some(*i),
            SqlValue::Bool(b) => Some(i64::from(*b)),
            SqlValue::Float(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Some(*f as i64),
            SqlValue::Text(s) => {
                let s = s.trim();
                s.parse().ok().or_else(|| {
                    // DECIMAL columns arrive as text, "3.000" is still integral
                    s.parse::<f64>()
                        .ok()
                        .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                        .map(|f| f as i64)
                })
            }
            _ => None,
        }
    }
}

impl FromSqlValue for i32 {
    const TARGET: &'static str = "i32";

    fn from_sql_value(value: &SqlValue) -> Option<Self> {
        i64::from_sql_value(value).and_then(|v| i32::try_from(v).ok())
    }
}

impl FromSqlValue for u64 {
    const TARGET: &'static str = "u64";

    fn from_sql_value(value: &SqlValue) -> Option<Self> {
        match value {
            // Unsigned values beyond i64 are decoded as text
            SqlValue::Text(s) => s.trim().parse().ok(),
            other => i64::from_sql_value(other).and_then(|v| u64::try_from(v).ok()),
        }
    }
}

impl FromSqlValue for f64 {
    const TARGET: &'static str = "f64";

    fn from_sql_value(value: &SqlValue) -> Option<Self> {
        match value {
            SqlValue::Float(f) => Some(*f),
            SqlValue::Int(i) => Some(*i as f64),
            SqlValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl FromSqlValue for bool {
    const TARGET: &'static str = "bool";

    fn from_sql_value(value: &SqlValue) -> Option<Self> {
        match value {
            SqlValue::Bool(b) => Some(*b),
            SqlValue::Int(i) => Some(*i != 0),
            SqlValue::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "t" | "yes" | "y" => Some(true),
                "0" | "false" | "f" | "no" | "n" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }
}

impl FromSqlValue for NaiveDateTime {
    const TARGET: &'static str = "timestamp";

    fn from_sql_value(value: &SqlValue) -> Option<Self> {
        match value {
            SqlValue::Timestamp(ts) => Some(*ts),
            SqlValue::Text(s) => parse_timestamp(s),
            _ => None,
        }
    }
}

impl FromSqlValue for Vec<u8> {
    const TARGET: &'static str = "bytes";

    fn from_sql_value(value: &SqlValue) -> Option<Self> {
        match value {
            SqlValue::Bytes(b) => Some(b.clone()),
            SqlValue::Text(s) => Some(s.clone().into_bytes()),
            _ => None,
        }
    }
}

impl FromSqlValue for SqlValue {
    const TARGET: &'static str = "value";

    fn from_sql_value(value: &SqlValue) -> Option<Self> {
        Some(value.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn row(pairs: Vec<(&str, SqlValue)>) -> Row {
        let columns: Arc<[String]> = pairs.iter().map(|(c, _)| c.to_string()).collect();
        Row::new(columns, pairs.into_iter().map(|(_, v)| v).collect())
    }

    #[test]
    fn test_lookup_prefers_exact_then_case_insensitive() {
        let r = row(vec![
            ("Name", SqlValue::Text("upper".into())),
            ("name", SqlValue::Text("lower".into())),
            ("ID", SqlValue::Int(3)),
        ]);
        assert_eq!(r.get_string("name").unwrap(), "lower");
        assert_eq!(r.get_string("Name").unwrap(), "upper");
        assert_eq!(r.get_i64("id").unwrap(), 3);
    }

    #[test]
    fn test_missing_column_is_schema_error() {
        let r = row(vec![("id", SqlValue::Int(1))]);
        let err = r.get_i64("nope").unwrap_err();
        assert!(matches!(err, DbError::Schema { ref object, .. } if object == "nope"));
    }

    #[test]
    fn test_lenient_conversions() {
        let r = row(vec![
            ("count", SqlValue::Text("42".into())),
            ("total", SqlValue::Text("3.000".into())),
            ("flag", SqlValue::Int(1)),
            ("ratio", SqlValue::Int(2)),
            ("n", SqlValue::Int(7)),
        ]);
        assert_eq!(r.get_i32("count").unwrap(), 42);
        assert_eq!(r.get_i64("total").unwrap(), 3);
        assert!(r.get_bool("flag").unwrap());
        assert_eq!(r.get_f64("ratio").unwrap(), 2.0);
        assert_eq!(r.get_string("n").unwrap(), "7");
    }

    #[test]
    fn test_null_handling() {
        let r = row(vec![("maybe", SqlValue::Null)]);
        assert!(r.is_null("maybe").unwrap());
        assert_eq!(r.get::<Option<i64>>("maybe").unwrap(), None);
        assert!(matches!(r.get_i64("maybe"), Err(DbError::Schema { .. })));
    }

    #[test]
    fn test_i32_overflow_rejected() {
        let r = row(vec![("big", SqlValue::Int(i64::from(i32::MAX) + 1))]);
        assert!(r.get_i32("big").is_err());
        assert_eq!(r.get_i64("big").unwrap(), i64::from(i32::MAX) + 1);
    }

    #[test]
    fn test_timestamp_from_text() {
        let r = row(vec![("at", SqlValue::Text("2024-03-09 08:05:00".into()))]);
        let expected = NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(8, 5, 0)
            .unwrap();
        assert_eq!(r.get_timestamp("at").unwrap(), expected);
    }

    #[test]
    fn test_to_json() {
        let r = row(vec![
            ("id", SqlValue::Int(1)),
            ("blob", SqlValue::Bytes(vec![0xFF, 0xFE, 0x00, 0x01])),
        ]);
        let json = r.to_json();
        assert_eq!(json["id"], serde_json::json!(1));
        assert_eq!(json["blob"], serde_json::json!("//4AAQ=="));
    }
}
