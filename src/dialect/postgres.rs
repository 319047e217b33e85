use super::sqlite::on_conflict_upsert;
use super::{Dialect, Feature, SqlType, escape_string_literal, number_placeholders, translate_date_pattern};
use crate::models::DatabaseType;
use std::borrow::Cow;

const DATE_TOKENS: &[(&str, &str)] = &[
    ("yyyy", "YYYY"),
    ("yy", "YY"),
    ("MM", "MM"),
    ("dd", "DD"),
    ("HH", "HH24"),
    ("mm", "MI"),
    ("ss", "SS"),
];

/// PostgreSQL dialect
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl Dialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "PostgreSQL"
    }

    fn database_type(&self) -> DatabaseType {
        DatabaseType::PostgreSQL
    }

    fn column_type(&self, ty: SqlType) -> String {
        match ty {
            SqlType::Integer => "INTEGER".to_string(),
            SqlType::Long => "BIGINT".to_string(),
            SqlType::String(len) => format!("VARCHAR({})", len),
            SqlType::Text => "TEXT".to_string(),
            SqlType::Boolean => "BOOLEAN".to_string(),
            SqlType::Timestamp => "TIMESTAMP".to_string(),
            SqlType::Blob => "BYTEA".to_string(),
            SqlType::Double => "DOUBLE PRECISION".to_string(),
        }
    }

    fn auto_increment_column(&self, ty: SqlType) -> String {
        match ty {
            SqlType::Long => "BIGSERIAL PRIMARY KEY".to_string(),
            _ => "SERIAL PRIMARY KEY".to_string(),
        }
    }

    fn case_insensitive_like(&self, column: &str) -> String {
        format!("{} ILIKE ?", column)
    }

    fn driver_reports_generated_keys(&self) -> bool {
        false
    }

    fn last_insert_id_sql(&self) -> Option<&'static str> {
        Some("SELECT lastval()")
    }

    fn format_date(&self, expr: &str, pattern: &str) -> String {
        // Letters outside tokens are quoted so TO_CHAR keeps them verbatim
        let format = translate_date_pattern(pattern, DATE_TOKENS, |c| {
            if c.is_ascii_alphabetic() {
                format!("\"{}\"", c)
            } else {
                c.to_string()
            }
        });
        format!("TO_CHAR({}, '{}')", expr, escape_string_literal(&format))
    }

    fn table_exists_sql(&self, table: &str) -> String {
        format!(
            "SELECT COUNT(*) FROM information_schema.tables WHERE table_schema = current_schema() AND table_name = '{}'",
            escape_string_literal(table)
        )
    }

    fn blob_literal(&self, bytes: &[u8]) -> String {
        format!("'\\x{}'::bytea", super::hex_encode(bytes))
    }

    fn format_value(&self, value: &crate::models::QueryParam) -> String {
        use crate::models::QueryParam;
        match value {
            QueryParam::Timestamp(ts) => format!(
                "TIMESTAMP {}",
                self.string_literal(&ts.format("%Y-%m-%d %H:%M:%S").to_string())
            ),
            QueryParam::Null => "NULL".to_string(),
            QueryParam::Bool(b) => self.boolean_literal(*b).to_string(),
            QueryParam::Int(i) => i.to_string(),
            QueryParam::Float(f) if f.is_finite() => f.to_string(),
            QueryParam::Float(f) => format!("{}::float8", self.string_literal(&f.to_string())),
            QueryParam::String(s) => self.string_literal(s),
            QueryParam::Bytes(bytes) => self.blob_literal(bytes),
        }
    }

    fn supports(&self, _feature: Feature) -> bool {
        true
    }

    fn upsert(&self, table: &str, columns: &[&str], key_columns: &[&str]) -> Option<String> {
        Some(on_conflict_upsert(table, columns, key_columns, "EXCLUDED"))
    }

    fn bind_placeholders<'a>(&self, sql: &'a str) -> Cow<'a, str> {
        number_placeholders(sql, |n| format!("${}", n))
    }
}
