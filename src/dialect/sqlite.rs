use super::{Dialect, Feature, SqlType, escape_string_literal, non_key_columns, translate_date_pattern};
use crate::models::DatabaseType;

const DATE_TOKENS: &[(&str, &str)] = &[
    ("yyyy", "%Y"),
    // strftime has no two-digit year
    ("yy", "%Y"),
    ("MM", "%m"),
    ("dd", "%d"),
    ("HH", "%H"),
    ("mm", "%M"),
    ("ss", "%S"),
];

/// SQLite dialect
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl Dialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "SQLite"
    }

    fn database_type(&self) -> DatabaseType {
        DatabaseType::SQLite
    }

    fn column_type(&self, ty: SqlType) -> String {
        match ty {
            SqlType::Integer | SqlType::Long => "INTEGER".to_string(),
            SqlType::String(len) => format!("VARCHAR({})", len),
            SqlType::Text => "TEXT".to_string(),
            SqlType::Boolean => "BOOLEAN".to_string(),
            SqlType::Timestamp => "TIMESTAMP".to_string(),
            SqlType::Blob => "BLOB".to_string(),
            SqlType::Double => "REAL".to_string(),
        }
    }

    fn auto_increment_column(&self, _ty: SqlType) -> String {
        // Only INTEGER PRIMARY KEY aliases the rowid
        "INTEGER PRIMARY KEY AUTOINCREMENT".to_string()
    }

    fn case_insensitive_like(&self, column: &str) -> String {
        format!("{} LIKE ? COLLATE NOCASE", column)
    }

    fn limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> String {
        match (limit, offset) {
            (Some(l), Some(o)) => format!(" LIMIT {} OFFSET {}", l, o),
            (Some(l), None) => format!(" LIMIT {}", l),
            (None, Some(o)) => format!(" LIMIT -1 OFFSET {}", o),
            (None, None) => String::new(),
        }
    }

    fn last_insert_id_sql(&self) -> Option<&'static str> {
        Some("SELECT last_insert_rowid()")
    }

    fn format_date(&self, expr: &str, pattern: &str) -> String {
        let format = translate_date_pattern(pattern, DATE_TOKENS, |c| match c {
            '%' => "%%".to_string(),
            other => other.to_string(),
        });
        format!("strftime('{}', {})", escape_string_literal(&format), expr)
    }

    fn table_exists_sql(&self, table: &str) -> String {
        format!(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = '{}'",
            escape_string_literal(table)
        )
    }

    fn boolean_literal(&self, value: bool) -> &'static str {
        if value { "1" } else { "0" }
    }

    fn supports(&self, feature: Feature) -> bool {
        match feature {
            Feature::Returning
            | Feature::MultiRowInsert
            | Feature::Upsert
            | Feature::Cte
            | Feature::WindowFunctions
            | Feature::ForeignKeys
            | Feature::TransactionalDdl
            | Feature::FullTextSearch => true,
        }
    }

    fn upsert(&self, table: &str, columns: &[&str], key_columns: &[&str]) -> Option<String> {
        Some(on_conflict_upsert(table, columns, key_columns, "excluded"))
    }
}

/// `INSERT ... ON CONFLICT (keys) DO UPDATE SET col = <excluded>.col`.
pub(super) fn on_conflict_upsert(
    table: &str,
    columns: &[&str],
    key_columns: &[&str],
    excluded: &str,
) -> String {
    let placeholders = vec!["?"; columns.len()].join(", ");
    let updates: Vec<String> = non_key_columns(columns, key_columns)
        .into_iter()
        .map(|c| format!("{} = {}.{}", c, excluded, c))
        .collect();
    let action = if updates.is_empty() {
        "DO NOTHING".to_string()
    } else {
        format!("DO UPDATE SET {}", updates.join(", "))
    };
    format!(
        "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT ({}) {}",
        table,
        columns.join(", "),
        placeholders,
        key_columns.join(", "),
        action
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::QueryParam;

    #[test]
    fn test_quote_identifier() {
        assert_eq!(SqliteDialect.quote_identifier("users"), "\"users\"");
        assert_eq!(SqliteDialect.quote_identifier("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_limit_offset_only_offset() {
        assert_eq!(SqliteDialect.limit_offset(None, Some(20)), " LIMIT -1 OFFSET 20");
        assert_eq!(SqliteDialect.limit_offset(Some(5), Some(10)), " LIMIT 5 OFFSET 10");
        assert_eq!(SqliteDialect.limit_offset(None, None), "");
    }

    #[test]
    fn test_format_date() {
        assert_eq!(
            SqliteDialect.format_date("created_at", "yyyy-MM-dd HH:mm:ss"),
            "strftime('%Y-%m-%d %H:%M:%S', created_at)"
        );
    }

    #[test]
    fn test_format_value_literals() {
        assert_eq!(SqliteDialect.format_value(&QueryParam::Bool(true)), "1");
        assert_eq!(
            SqliteDialect.format_value(&QueryParam::Bytes(vec![0xca, 0xfe])),
            "X'cafe'"
        );
        assert_eq!(SqliteDialect.format_value(&QueryParam::Int(-3)), "-3");
    }

    #[test]
    fn test_upsert() {
        let sql = SqliteDialect
            .upsert("players", &["id", "name", "score"], &["id"])
            .unwrap();
        assert_eq!(
            sql,
            "INSERT INTO players (id, name, score) VALUES (?, ?, ?) ON CONFLICT (id) DO UPDATE SET name = excluded.name, score = excluded.score"
        );
    }

    #[test]
    fn test_upsert_only_keys_does_nothing() {
        let sql = SqliteDialect.upsert("tags", &["name"], &["name"]).unwrap();
        assert!(sql.ends_with("ON CONFLICT (name) DO NOTHING"));
    }

    #[test]
    fn test_auto_increment_column() {
        assert_eq!(
            SqliteDialect.auto_increment_column(SqlType::Long),
            "INTEGER PRIMARY KEY AUTOINCREMENT"
        );
    }

    #[test]
    fn test_placeholders_unchanged() {
        assert_eq!(SqliteDialect.bind_placeholders("SELECT ?"), "SELECT ?");
    }
}
