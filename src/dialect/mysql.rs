use super::{
    Dialect, Feature, SqlType, count_markers, escape_string_literal, non_key_columns,
    translate_date_pattern,
};
use crate::models::DatabaseType;

const DATE_TOKENS: &[(&str, &str)] = &[
    ("yyyy", "%Y"),
    ("yy", "%y"),
    ("MM", "%m"),
    ("dd", "%d"),
    ("HH", "%H"),
    ("mm", "%i"),
    ("ss", "%s"),
];

/// MySQL / MariaDB dialect
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlDialect;

impl Dialect for MySqlDialect {
    fn name(&self) -> &'static str {
        "MySQL"
    }

    fn database_type(&self) -> DatabaseType {
        DatabaseType::MySQL
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }

    fn column_type(&self, ty: SqlType) -> String {
        match ty {
            SqlType::Integer => "INT".to_string(),
            SqlType::Long => "BIGINT".to_string(),
            SqlType::String(len) => format!("VARCHAR({})", len),
            SqlType::Text => "TEXT".to_string(),
            SqlType::Boolean => "BOOLEAN".to_string(),
            SqlType::Timestamp => "DATETIME".to_string(),
            SqlType::Blob => "BLOB".to_string(),
            SqlType::Double => "DOUBLE".to_string(),
        }
    }

    fn auto_increment_column(&self, ty: SqlType) -> String {
        match ty {
            SqlType::Long => "BIGINT AUTO_INCREMENT PRIMARY KEY".to_string(),
            _ => "INT AUTO_INCREMENT PRIMARY KEY".to_string(),
        }
    }

    fn limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> String {
        match (limit, offset) {
            (Some(l), Some(o)) => format!(" LIMIT {} OFFSET {}", l, o),
            (Some(l), None) => format!(" LIMIT {}", l),
            // MySQL has no OFFSET without LIMIT
            (None, Some(o)) => format!(" LIMIT {} OFFSET {}", u64::MAX, o),
            (None, None) => String::new(),
        }
    }

    fn last_insert_id_sql(&self) -> Option<&'static str> {
        Some("SELECT LAST_INSERT_ID()")
    }

    fn format_date(&self, expr: &str, pattern: &str) -> String {
        let format = translate_date_pattern(pattern, DATE_TOKENS, |c| match c {
            '%' => "%%".to_string(),
            other => other.to_string(),
        });
        format!("DATE_FORMAT({}, '{}')", expr, self.escape(&format))
    }

    fn concat(&self, parts: &[&str]) -> String {
        format!("CONCAT({})", parts.join(", "))
    }

    fn table_exists_sql(&self, table: &str) -> String {
        format!(
            "SELECT COUNT(*) FROM information_schema.tables WHERE table_schema = DATABASE() AND table_name = '{}'",
            self.escape(table)
        )
    }

    fn string_literal(&self, value: &str) -> String {
        format!("'{}'", self.escape(value))
    }

    fn current_timestamp(&self) -> &'static str {
        "NOW()"
    }

    fn begin_transaction_sql(&self) -> &'static str {
        "START TRANSACTION"
    }

    fn supports(&self, feature: Feature) -> bool {
        match feature {
            Feature::MultiRowInsert
            | Feature::Upsert
            | Feature::Cte
            | Feature::WindowFunctions
            | Feature::ForeignKeys
            | Feature::FullTextSearch => true,
            // DDL commits implicitly
            Feature::Returning | Feature::TransactionalDdl => false,
        }
    }

    fn placeholder_count(&self, sql: &str) -> usize {
        count_markers(sql, true)
    }

    fn upsert(&self, table: &str, columns: &[&str], key_columns: &[&str]) -> Option<String> {
        let placeholders = vec!["?"; columns.len()].join(", ");
        let updates: Vec<String> = non_key_columns(columns, key_columns)
            .into_iter()
            .map(|c| format!("{} = VALUES({})", c, c))
            .collect();
        if updates.is_empty() {
            return Some(format!(
                "INSERT IGNORE INTO {} ({}) VALUES ({})",
                table,
                columns.join(", "),
                placeholders
            ));
        }
        Some(format!(
            "INSERT INTO {} ({}) VALUES ({}) ON DUPLICATE KEY UPDATE {}",
            table,
            columns.join(", "),
            placeholders,
            updates.join(", ")
        ))
    }
}

impl MySqlDialect {
    /// Backslash is an escape character in MySQL string literals.
    fn escape(&self, value: &str) -> String {
        escape_string_literal(&value.replace('\\', "\\\\"))
    }
}
