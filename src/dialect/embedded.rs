use super::{Dialect, Feature, SqlType, SqliteDialect};
use crate::models::DatabaseType;

/// Dialect of the embedded test engine.
///
/// The engine is an in-memory SQLite database, so SQL generation follows
/// [`SqliteDialect`]. Only identity and full-text support differ.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbeddedDialect {
    sqlite: SqliteDialect,
}

impl Dialect for EmbeddedDialect {
    fn name(&self) -> &'static str {
        "Embedded"
    }

    fn database_type(&self) -> DatabaseType {
        DatabaseType::Embedded
    }

    fn quote_identifier(&self, name: &str) -> String {
        self.sqlite.quote_identifier(name)
    }

    fn column_type(&self, ty: SqlType) -> String {
        self.sqlite.column_type(ty)
    }

    fn auto_increment_column(&self, ty: SqlType) -> String {
        self.sqlite.auto_increment_column(ty)
    }

    fn case_insensitive_like(&self, column: &str) -> String {
        self.sqlite.case_insensitive_like(column)
    }

    fn limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> String {
        self.sqlite.limit_offset(limit, offset)
    }

    fn last_insert_id_sql(&self) -> Option<&'static str> {
        self.sqlite.last_insert_id_sql()
    }

    fn format_date(&self, expr: &str, pattern: &str) -> String {
        self.sqlite.format_date(expr, pattern)
    }

    fn table_exists_sql(&self, table: &str) -> String {
        self.sqlite.table_exists_sql(table)
    }

    fn boolean_literal(&self, value: bool) -> &'static str {
        self.sqlite.boolean_literal(value)
    }

    fn supports(&self, feature: Feature) -> bool {
        // Test databases are throwaway; no FTS tables are created there
        feature != Feature::FullTextSearch && self.sqlite.supports(feature)
    }

    fn upsert(&self, table: &str, columns: &[&str], key_columns: &[&str]) -> Option<String> {
        self.sqlite.upsert(table, columns, key_columns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_differs_from_sqlite() {
        let dialect = EmbeddedDialect::default();
        assert_eq!(dialect.name(), "Embedded");
        assert_eq!(dialect.database_type(), DatabaseType::Embedded);
        assert!(!dialect.supports(Feature::FullTextSearch));
        assert!(dialect.supports(Feature::Returning));
    }

    #[test]
    fn test_generation_matches_sqlite() {
        let dialect = EmbeddedDialect::default();
        assert_eq!(
            dialect.limit_offset(None, Some(3)),
            SqliteDialect.limit_offset(None, Some(3))
        );
        assert_eq!(dialect.boolean_literal(false), "0");
        assert_eq!(
            dialect.table_exists_sql("t"),
            SqliteDialect.table_exists_sql("t")
        );
    }
}
