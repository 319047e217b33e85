//! Database-agnostic value decoding.
//!
//! Type conversion uses a two-phase approach:
//! 1. `TypeCategory` classifies column types into logical categories
//! 2. Backend-specific decoders extract a `SqlValue` for that category
//!
//! Decoding never fails a whole row. A column that cannot be decoded becomes
//! `SqlValue::Null` and is logged at debug level.

use crate::models::DatabaseType;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::mysql::{MySqlRow, MySqlTypeInfo, MySqlValueRef};
use sqlx::postgres::{PgRow, PgTypeInfo, PgValueFormat, PgValueRef};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Decode, Row, Type, TypeInfo, ValueRef};

// =============================================================================
// Values
// =============================================================================

/// A single decoded column value.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Timestamp(NaiveDateTime),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            SqlValue::Null => "null",
            SqlValue::Bool(_) => "bool",
            SqlValue::Int(_) => "int",
            SqlValue::Float(_) => "float",
            SqlValue::Text(_) => "text",
            SqlValue::Bytes(_) => "bytes",
            SqlValue::Timestamp(_) => "timestamp",
        }
    }

    /// JSON rendering used by the CLI. Bytes are base64, timestamps ISO-like.
    pub fn to_json(&self) -> JsonValue {
        use base64::{Engine as _, engine::general_purpose::STANDARD};

        match self {
            SqlValue::Null => JsonValue::Null,
            SqlValue::Bool(b) => JsonValue::Bool(*b),
            SqlValue::Int(i) => JsonValue::Number((*i).into()),
            SqlValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or_else(|| JsonValue::String(f.to_string())),
            SqlValue::Text(s) => JsonValue::String(s.clone()),
            SqlValue::Bytes(b) => JsonValue::String(STANDARD.encode(b)),
            SqlValue::Timestamp(ts) => {
                JsonValue::String(ts.format("%Y-%m-%d %H:%M:%S%.f").to_string())
            }
        }
    }
}

/// Parse the textual timestamp layouts the backends produce.
///
/// Accepts `YYYY-MM-DD HH:MM:SS[.fff]`, the `T`-separated variant, RFC 3339
/// with an offset (converted to UTC) and a bare date (midnight).
pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(text, format) {
            return Some(ts);
        }
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.naive_utc());
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

// =============================================================================
// Type Classification
// =============================================================================

/// Logical category for database column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Text,
    Binary,
    Timestamp,
    Date,
    Time,
    Json,
    Uuid,
    Unknown,
}

/// Classify a database type name into a logical category.
pub fn categorize_type(type_name: &str, db: DatabaseType) -> TypeCategory {
    let lower = type_name.to_lowercase();

    // Decimal/Numeric - check first as it overlaps with "numeric" in float checks
    if lower.contains("decimal") || lower.contains("numeric") {
        // SQLite's NUMERIC is actually a float
        if db.is_sqlite_family() && lower == "numeric" {
            return TypeCategory::Float;
        }
        return TypeCategory::Decimal;
    }

    if lower == "bool" || lower == "boolean" {
        return TypeCategory::Boolean;
    }

    if lower.contains("timestamp") || lower.contains("datetime") {
        return TypeCategory::Timestamp;
    }
    if lower == "date" {
        return TypeCategory::Date;
    }
    if lower == "time" || lower == "timetz" {
        return TypeCategory::Time;
    }

    // Before the integer check: "tinyblob" and "tinytext" contain "tiny"
    if lower.contains("blob") || lower.contains("binary") || lower == "bytea" {
        return TypeCategory::Binary;
    }
    if lower.contains("text") || lower.contains("char") || lower == "name" {
        return TypeCategory::Text;
    }

    // "interval" and "point" contain "int"
    if lower == "interval" || lower == "point" {
        return TypeCategory::Unknown;
    }
    if lower.contains("int") || lower.contains("serial") {
        return TypeCategory::Integer;
    }

    if lower.contains("float")
        || lower.contains("double")
        || lower == "real"
    {
        return TypeCategory::Float;
    }

    if lower == "json" || lower == "jsonb" {
        return TypeCategory::Json;
    }
    if lower == "uuid" {
        return TypeCategory::Uuid;
    }

    TypeCategory::Unknown
}

// =============================================================================
// Decimal Type Support
// =============================================================================

/// Wrapper type for raw DECIMAL/NUMERIC values as strings.
/// This preserves the exact database representation.
#[derive(Debug)]
pub struct RawDecimal(pub String);

impl Type<sqlx::MySql> for RawDecimal {
    fn type_info() -> MySqlTypeInfo {
        <String as Type<sqlx::MySql>>::type_info()
    }

    fn compatible(ty: &MySqlTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("decimal") || name.contains("numeric")
    }
}

impl<'r> Decode<'r, sqlx::MySql> for RawDecimal {
    fn decode(value: MySqlValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        // MySQL sends DECIMAL as text in both protocols
        let s = <&str as Decode<sqlx::MySql>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

impl Type<sqlx::Postgres> for RawDecimal {
    fn type_info() -> PgTypeInfo {
        <String as Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("numeric") || name.contains("decimal")
    }
}

impl<'r> Decode<'r, sqlx::Postgres> for RawDecimal {
    fn decode(value: PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        match value.format() {
            PgValueFormat::Text => Ok(RawDecimal(value.as_str()?.to_string())),
            PgValueFormat::Binary => numeric_to_string(value.as_bytes()?)
                .map(RawDecimal)
                .ok_or_else(|| "malformed NUMERIC value".into()),
        }
    }
}

/// Render PostgreSQL's binary NUMERIC layout.
///
/// Header is four big-endian words (digit count, weight, sign, display
/// scale) followed by base-10000 digit groups. Group `i` carries weight
/// `weight - i`.
fn numeric_to_string(bytes: &[u8]) -> Option<String> {
    if bytes.len() < 8 {
        return None;
    }
    let word = |at: usize| [bytes[at], bytes[at + 1]];
    let ndigits = i16::from_be_bytes(word(0)).max(0) as usize;
    let weight = i16::from_be_bytes(word(2)) as i32;
    let sign = u16::from_be_bytes(word(4));
    let dscale = u16::from_be_bytes(word(6)) as usize;

    if sign == 0xC000 {
        return Some("NaN".to_string());
    }
    if bytes.len() < 8 + ndigits * 2 {
        return None;
    }
    let digits: Vec<i16> = (0..ndigits)
        .map(|i| i16::from_be_bytes(word(8 + i * 2)))
        .collect();
    let group = |index: i32| -> i16 {
        if index < 0 {
            0
        } else {
            digits.get(index as usize).copied().unwrap_or(0)
        }
    };

    let mut out = String::new();
    if sign == 0x4000 {
        out.push('-');
    }
    if weight >= 0 {
        out.push_str(&group(0).to_string());
        for index in 1..=weight {
            out.push_str(&format!("{:04}", group(index)));
        }
    } else {
        out.push('0');
    }

    if dscale > 0 {
        let mut fraction = String::new();
        let mut index = weight + 1;
        while fraction.len() < dscale {
            fraction.push_str(&format!("{:04}", group(index)));
            index += 1;
        }
        fraction.truncate(dscale);
        out.push('.');
        out.push_str(&fraction);
    }
    Some(out)
}

// =============================================================================
// Row Decoding Trait
// =============================================================================

/// Converts a backend row into column names and unified values.
pub trait DecodeRow {
    fn column_names(&self) -> Vec<String>;
    fn decode_values(&self) -> Vec<SqlValue>;
}

impl DecodeRow for MySqlRow {
    fn column_names(&self) -> Vec<String> {
        self.columns().iter().map(|c| c.name().to_string()).collect()
    }

    fn decode_values(&self) -> Vec<SqlValue> {
        self.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let type_name = col.type_info().name();
                let category = categorize_type(type_name, DatabaseType::MySQL);
                mysql::decode_column(self, idx, category)
            })
            .collect()
    }
}

impl DecodeRow for PgRow {
    fn column_names(&self) -> Vec<String> {
        self.columns().iter().map(|c| c.name().to_string()).collect()
    }

    fn decode_values(&self) -> Vec<SqlValue> {
        self.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let type_name = col.type_info().name();
                let category = categorize_type(type_name, DatabaseType::PostgreSQL);
                postgres::decode_column(self, idx, category)
            })
            .collect()
    }
}

impl DecodeRow for SqliteRow {
    fn column_names(&self) -> Vec<String> {
        self.columns().iter().map(|c| c.name().to_string()).collect()
    }

    fn decode_values(&self) -> Vec<SqlValue> {
        self.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let declared = categorize_type(col.type_info().name(), DatabaseType::SQLite);
                sqlite::decode_column(self, idx, declared)
            })
            .collect()
    }
}

fn undecodable(idx: usize, category: TypeCategory, err: impl std::fmt::Display) -> SqlValue {
    tracing::debug!(column = idx, ?category, error = %err, "Column could not be decoded");
    SqlValue::Null
}

// =============================================================================
// Database-Specific Decoders
// =============================================================================

mod mysql {
    use super::*;

    pub fn decode_column(row: &MySqlRow, idx: usize, category: TypeCategory) -> SqlValue {
        match row.try_get_raw(idx) {
            Ok(raw) if raw.is_null() => return SqlValue::Null,
            Ok(_) => {}
            Err(e) => return undecodable(idx, category, e),
        }
        match category {
            TypeCategory::Decimal => match row.try_get::<RawDecimal, _>(idx) {
                Ok(v) => SqlValue::Text(v.0),
                Err(e) => undecodable(idx, category, e),
            },
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => match row.try_get::<bool, _>(idx) {
                Ok(v) => SqlValue::Bool(v),
                Err(_) => decode_integer(row, idx),
            },
            TypeCategory::Float => decode_float(row, idx),
            TypeCategory::Binary => match row.try_get::<Vec<u8>, _>(idx) {
                Ok(v) => SqlValue::Bytes(v),
                Err(e) => undecodable(idx, category, e),
            },
            TypeCategory::Timestamp => decode_timestamp(row, idx),
            TypeCategory::Date => match row.try_get::<NaiveDate, _>(idx) {
                Ok(d) => d
                    .and_hms_opt(0, 0, 0)
                    .map(SqlValue::Timestamp)
                    .unwrap_or(SqlValue::Null),
                Err(e) => undecodable(idx, category, e),
            },
            TypeCategory::Time => match row.try_get::<NaiveTime, _>(idx) {
                Ok(t) => SqlValue::Text(t.to_string()),
                Err(e) => undecodable(idx, category, e),
            },
            _ => decode_text(row, idx, category),
        }
    }

    fn decode_integer(row: &MySqlRow, idx: usize) -> SqlValue {
        if let Ok(v) = row.try_get::<i64, _>(idx) {
            return SqlValue::Int(v);
        }
        if let Ok(v) = row.try_get::<i32, _>(idx) {
            return SqlValue::Int(v.into());
        }
        if let Ok(v) = row.try_get::<i16, _>(idx) {
            return SqlValue::Int(v.into());
        }
        if let Ok(v) = row.try_get::<i8, _>(idx) {
            return SqlValue::Int(v.into());
        }
        match row.try_get::<u64, _>(idx) {
            // Values past i64::MAX keep their digits as text
            Ok(v) => i64::try_from(v)
                .map(SqlValue::Int)
                .unwrap_or_else(|_| SqlValue::Text(v.to_string())),
            Err(e) => undecodable(idx, TypeCategory::Integer, e),
        }
    }

    fn decode_float(row: &MySqlRow, idx: usize) -> SqlValue {
        if let Ok(v) = row.try_get::<f64, _>(idx) {
            return SqlValue::Float(v);
        }
        match row.try_get::<f32, _>(idx) {
            Ok(v) => SqlValue::Float(v.into()),
            Err(e) => undecodable(idx, TypeCategory::Float, e),
        }
    }

    fn decode_timestamp(row: &MySqlRow, idx: usize) -> SqlValue {
        if let Ok(v) = row.try_get::<NaiveDateTime, _>(idx) {
            return SqlValue::Timestamp(v);
        }
        match row.try_get::<DateTime<Utc>, _>(idx) {
            Ok(v) => SqlValue::Timestamp(v.naive_utc()),
            Err(e) => undecodable(idx, TypeCategory::Timestamp, e),
        }
    }

    fn decode_text(row: &MySqlRow, idx: usize, category: TypeCategory) -> SqlValue {
        if let Ok(v) = row.try_get::<String, _>(idx) {
            return SqlValue::Text(v);
        }
        // JSON and unknown types still carry UTF-8 payloads
        match row.try_get_unchecked::<Vec<u8>, _>(idx) {
            Ok(bytes) => match String::from_utf8(bytes) {
                Ok(text) => SqlValue::Text(text),
                Err(e) => SqlValue::Bytes(e.into_bytes()),
            },
            Err(e) => undecodable(idx, category, e),
        }
    }
}

mod postgres {
    use super::*;

    pub fn decode_column(row: &PgRow, idx: usize, category: TypeCategory) -> SqlValue {
        match row.try_get_raw(idx) {
            Ok(raw) if raw.is_null() => return SqlValue::Null,
            Ok(_) => {}
            Err(e) => return undecodable(idx, category, e),
        }
        match category {
            TypeCategory::Decimal => match row.try_get::<RawDecimal, _>(idx) {
                Ok(v) => SqlValue::Text(v.0),
                Err(e) => undecodable(idx, category, e),
            },
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => match row.try_get::<bool, _>(idx) {
                Ok(v) => SqlValue::Bool(v),
                Err(e) => undecodable(idx, category, e),
            },
            TypeCategory::Float => decode_float(row, idx),
            TypeCategory::Binary => match row.try_get::<Vec<u8>, _>(idx) {
                Ok(v) => SqlValue::Bytes(v),
                Err(e) => undecodable(idx, category, e),
            },
            TypeCategory::Timestamp => decode_timestamp(row, idx),
            TypeCategory::Date => match row.try_get::<NaiveDate, _>(idx) {
                Ok(d) => d
                    .and_hms_opt(0, 0, 0)
                    .map(SqlValue::Timestamp)
                    .unwrap_or(SqlValue::Null),
                Err(e) => undecodable(idx, category, e),
            },
            TypeCategory::Time => match row.try_get::<NaiveTime, _>(idx) {
                Ok(t) => SqlValue::Text(t.to_string()),
                Err(e) => undecodable(idx, category, e),
            },
            TypeCategory::Json | TypeCategory::Uuid => decode_raw_text(row, idx, category),
            _ => match row.try_get::<String, _>(idx) {
                Ok(v) => SqlValue::Text(v),
                Err(e) => undecodable(idx, category, e),
            },
        }
    }

    fn decode_integer(row: &PgRow, idx: usize) -> SqlValue {
        if let Ok(v) = row.try_get::<i64, _>(idx) {
            return SqlValue::Int(v);
        }
        if let Ok(v) = row.try_get::<i32, _>(idx) {
            return SqlValue::Int(v.into());
        }
        match row.try_get::<i16, _>(idx) {
            Ok(v) => SqlValue::Int(v.into()),
            Err(e) => undecodable(idx, TypeCategory::Integer, e),
        }
    }

    fn decode_float(row: &PgRow, idx: usize) -> SqlValue {
        if let Ok(v) = row.try_get::<f64, _>(idx) {
            return SqlValue::Float(v);
        }
        match row.try_get::<f32, _>(idx) {
            Ok(v) => SqlValue::Float(v.into()),
            Err(e) => undecodable(idx, TypeCategory::Float, e),
        }
    }

    fn decode_timestamp(row: &PgRow, idx: usize) -> SqlValue {
        if let Ok(v) = row.try_get::<NaiveDateTime, _>(idx) {
            return SqlValue::Timestamp(v);
        }
        match row.try_get::<DateTime<Utc>, _>(idx) {
            Ok(v) => SqlValue::Timestamp(v.naive_utc()),
            Err(e) => undecodable(idx, TypeCategory::Timestamp, e),
        }
    }

    /// JSON, JSONB and UUID without the matching sqlx features.
    fn decode_raw_text(row: &PgRow, idx: usize, category: TypeCategory) -> SqlValue {
        let raw = match row.try_get_raw(idx) {
            Ok(raw) => raw,
            Err(e) => return undecodable(idx, category, e),
        };
        let format = raw.format();
        let bytes = match raw.as_bytes() {
            Ok(bytes) => bytes,
            Err(e) => return undecodable(idx, category, e),
        };
        match (format, category) {
            (PgValueFormat::Binary, TypeCategory::Uuid) if bytes.len() == 16 => {
                let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
                SqlValue::Text(format!(
                    "{}-{}-{}-{}-{}",
                    &hex[0..8],
                    &hex[8..12],
                    &hex[12..16],
                    &hex[16..20],
                    &hex[20..32]
                ))
            }
            // Binary JSONB is prefixed with a version byte
            (PgValueFormat::Binary, TypeCategory::Json) if bytes.first() == Some(&1) => {
                SqlValue::Text(String::from_utf8_lossy(&bytes[1..]).into_owned())
            }
            _ => SqlValue::Text(String::from_utf8_lossy(bytes).into_owned()),
        }
    }
}

mod sqlite {
    use super::*;

    /// SQLite values are decoded by storage class. The declared column type
    /// only refines integers into booleans and text into timestamps.
    pub fn decode_column(row: &SqliteRow, idx: usize, declared: TypeCategory) -> SqlValue {
        let storage = match row.try_get_raw(idx) {
            Ok(raw) if raw.is_null() => return SqlValue::Null,
            Ok(raw) => raw.type_info().name().to_uppercase(),
            Err(e) => return undecodable(idx, declared, e),
        };

        match storage.as_str() {
            "INTEGER" | "BIGINT" | "INT" | "BOOLEAN" => match row.try_get_unchecked::<i64, _>(idx) {
                Ok(v) if declared == TypeCategory::Boolean => SqlValue::Bool(v != 0),
                Ok(v) => SqlValue::Int(v),
                Err(e) => undecodable(idx, declared, e),
            },
            "REAL" | "NUMERIC" => match row.try_get_unchecked::<f64, _>(idx) {
                Ok(v) => SqlValue::Float(v),
                Err(e) => undecodable(idx, declared, e),
            },
            "BLOB" => match row.try_get_unchecked::<Vec<u8>, _>(idx) {
                Ok(v) => SqlValue::Bytes(v),
                Err(e) => undecodable(idx, declared, e),
            },
            _ => match row.try_get_unchecked::<String, _>(idx) {
                Ok(text) => match declared {
                    TypeCategory::Timestamp | TypeCategory::Date => parse_timestamp(&text)
                        .map(SqlValue::Timestamp)
                        .unwrap_or(SqlValue::Text(text)),
                    _ => SqlValue::Text(text),
                },
                Err(e) => undecodable(idx, declared, e),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categorize_type_integer() {
        assert_eq!(
            categorize_type("INT", DatabaseType::MySQL),
            TypeCategory::Integer
        );
        assert_eq!(
            categorize_type("BIGINT", DatabaseType::PostgreSQL),
            TypeCategory::Integer
        );
        assert_eq!(
            categorize_type("TINYINT", DatabaseType::MySQL),
            TypeCategory::Integer
        );
        assert_eq!(
            categorize_type("SERIAL", DatabaseType::PostgreSQL),
            TypeCategory::Integer
        );
    }

    #[test]
    fn test_categorize_type_lookalikes() {
        assert_eq!(
            categorize_type("INTERVAL", DatabaseType::PostgreSQL),
            TypeCategory::Unknown
        );
        assert_eq!(
            categorize_type("POINT", DatabaseType::PostgreSQL),
            TypeCategory::Unknown
        );
        assert_eq!(
            categorize_type("TINYBLOB", DatabaseType::MySQL),
            TypeCategory::Binary
        );
        assert_eq!(
            categorize_type("TINYTEXT", DatabaseType::MySQL),
            TypeCategory::Text
        );
    }

    #[test]
    fn test_categorize_type_decimal() {
        assert_eq!(
            categorize_type("DECIMAL", DatabaseType::MySQL),
            TypeCategory::Decimal
        );
        assert_eq!(
            categorize_type("NUMERIC", DatabaseType::PostgreSQL),
            TypeCategory::Decimal
        );
        // SQLite NUMERIC is a float
        assert_eq!(
            categorize_type("numeric", DatabaseType::Embedded),
            TypeCategory::Float
        );
    }

    #[test]
    fn test_categorize_type_temporal() {
        assert_eq!(
            categorize_type("TIMESTAMPTZ", DatabaseType::PostgreSQL),
            TypeCategory::Timestamp
        );
        assert_eq!(
            categorize_type("DATETIME", DatabaseType::SQLite),
            TypeCategory::Timestamp
        );
        assert_eq!(
            categorize_type("DATE", DatabaseType::MySQL),
            TypeCategory::Date
        );
    }

    #[test]
    fn test_numeric_to_string() {
        // 12.5: two groups [12, 5000], weight 0, scale 1
        let bytes = [0, 2, 0, 0, 0, 0, 0, 1, 0, 12, 0x13, 0x88];
        assert_eq!(numeric_to_string(&bytes).as_deref(), Some("12.5"));

        // -0.05: one group [500] at weight -1, scale 2
        let bytes = [0, 1, 0xFF, 0xFF, 0x40, 0, 0, 2, 0x01, 0xF4];
        assert_eq!(numeric_to_string(&bytes).as_deref(), Some("-0.05"));

        // 10000: one group [1] at weight 1
        let bytes = [0, 1, 0, 1, 0, 0, 0, 0, 0, 1];
        assert_eq!(numeric_to_string(&bytes).as_deref(), Some("10000"));

        assert_eq!(numeric_to_string(&[0, 0]), None);
    }

    #[test]
    fn test_parse_timestamp_layouts() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(8, 5, 0)
            .unwrap();
        assert_eq!(parse_timestamp("2024-03-09 08:05:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-09T08:05:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-09T10:05:00+02:00"), Some(expected));
        assert_eq!(
            parse_timestamp("2024-03-09"),
            NaiveDate::from_ymd_opt(2024, 3, 9).unwrap().and_hms_opt(0, 0, 0)
        );
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn test_sql_value_to_json() {
        assert_eq!(SqlValue::Int(7).to_json(), serde_json::json!(7));
        assert_eq!(
            SqlValue::Bytes(b"hello world".to_vec()).to_json(),
            serde_json::json!("aGVsbG8gd29ybGQ=")
        );
        assert_eq!(SqlValue::Float(f64::NAN).to_json(), serde_json::json!("NaN"));
        assert_eq!(SqlValue::Null.to_json(), JsonValue::Null);
    }
}
