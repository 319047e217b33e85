//! Statement screening for injection patterns and destructive operations.
//!
//! This is a second line of defense. Bound parameters remain the primary
//! protection; the validator only looks at the final statement text a caller
//! hands to the facade.

use crate::error::{DbError, DbResult};
use crate::models::DatabaseType;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlparser::ast::Statement;
use sqlparser::dialect::{Dialect, GenericDialect, MySqlDialect, SQLiteDialect};
use sqlparser::parser::Parser;
use sqlparser::tokenizer::{Token, Tokenizer, Whitespace};
use std::sync::LazyLock;

static TAUTOLOGY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bOR\s+('[^']*'?|\d+)\s*=\s*('[^']*'?|\d+)").unwrap()
});

static UNION_INJECTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)'\s*\)?\s*UNION\s+(?:ALL\s+)?SELECT\b").unwrap());

static STACKED_FALLBACK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i);\s*(?:SELECT|INSERT|UPDATE|DELETE|DROP|CREATE|ALTER|TRUNCATE|GRANT|EXEC)\b")
        .unwrap()
});

/// How findings affect execution.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum ValidationMode {
    /// Injection findings reject the statement
    Strict,
    /// Findings are logged, the statement runs
    #[default]
    Permissive,
    /// No screening at all
    Disabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Looks like an injection attempt
    Injection,
    /// Legitimate but destructive
    Dangerous,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub rule: &'static str,
    pub severity: Severity,
    pub detail: String,
}

impl Finding {
    fn injection(rule: &'static str, detail: impl Into<String>) -> Self {
        Self {
            rule,
            severity: Severity::Injection,
            detail: detail.into(),
        }
    }

    fn dangerous(detail: impl Into<String>) -> Self {
        Self {
            rule: "dangerous_operation",
            severity: Severity::Dangerous,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct QueryValidator {
    mode: ValidationMode,
    db_type: DatabaseType,
}

impl QueryValidator {
    pub fn new(mode: ValidationMode, db_type: DatabaseType) -> Self {
        Self { mode, db_type }
    }

    pub fn mode(&self) -> ValidationMode {
        self.mode
    }

    /// Screen `sql` according to the configured mode.
    ///
    /// Returns the findings that did not block execution.
    pub fn check(&self, sql: &str) -> DbResult<Vec<Finding>> {
        if self.mode == ValidationMode::Disabled {
            return Ok(Vec::new());
        }
        let findings = self.inspect(sql);
        if self.mode == ValidationMode::Strict {
            if let Some(blocking) = findings.iter().find(|f| f.severity == Severity::Injection) {
                return Err(DbError::validation(blocking.rule, blocking.detail.clone()));
            }
        }
        Ok(findings)
    }

    /// Run every rule regardless of mode.
    pub fn inspect(&self, sql: &str) -> Vec<Finding> {
        let mut findings = Vec::new();

        for caps in TAUTOLOGY.captures_iter(sql) {
            let left = caps[1].trim_matches('\'');
            let right = caps[2].trim_matches('\'');
            if left == right {
                findings.push(Finding::injection(
                    "tautology",
                    format!("always-true condition `{}`", caps[0].trim()),
                ));
                break;
            }
        }

        if self.has_commented_literal(sql) {
            findings.push(Finding::injection(
                "comment_terminated_literal",
                "string literal followed directly by a comment",
            ));
        }

        if UNION_INJECTION.is_match(sql) {
            findings.push(Finding::injection(
                "union_injection",
                "UNION SELECT appended after a string literal",
            ));
        }

        match Parser::parse_sql(self.parser_dialect().as_ref(), sql) {
            Ok(statements) => {
                if statements.len() > 1 {
                    findings.push(Finding::injection(
                        "stacked_statements",
                        format!("{} statements in one call", statements.len()),
                    ));
                }
                findings.extend(
                    statements
                        .iter()
                        .filter_map(dangerous_operation)
                        .map(Finding::dangerous),
                );
            }
            Err(e) => {
                tracing::debug!(error = %e, "Statement not parseable, falling back to pattern checks");
                if STACKED_FALLBACK.is_match(sql) {
                    findings.push(Finding::injection(
                        "stacked_statements",
                        "statement separator followed by another statement",
                    ));
                }
            }
        }

        findings
    }

    /// A string literal whose closing quote is followed only by a comment.
    ///
    /// Tokenizing keeps comment markers inside literals out of the picture;
    /// `#` opens a comment only under MySQL.
    fn has_commented_literal(&self, sql: &str) -> bool {
        let dialect = self.parser_dialect();
        let tokens = match Tokenizer::new(dialect.as_ref(), sql).tokenize() {
            Ok(tokens) => tokens,
            Err(e) => {
                tracing::debug!(error = %e, "Statement not tokenizable, skipping literal check");
                return false;
            }
        };

        let mut after_literal = false;
        for token in tokens {
            match token {
                Token::SingleQuotedString(_)
                | Token::DoubleQuotedString(_)
                | Token::NationalStringLiteral(_)
                | Token::EscapedStringLiteral(_) => after_literal = true,
                Token::Whitespace(
                    Whitespace::SingleLineComment { .. } | Whitespace::MultiLineComment(_),
                ) if after_literal => return true,
                Token::Whitespace(_) => {}
                _ => after_literal = false,
            }
        }
        false
    }

    fn parser_dialect(&self) -> Box<dyn Dialect> {
        match self.db_type {
            DatabaseType::SQLite | DatabaseType::Embedded => Box::new(SQLiteDialect {}),
            DatabaseType::MySQL => Box::new(MySqlDialect {}),
            // `?` placeholders tokenize as JSON operators under the PostgreSQL dialect
            DatabaseType::PostgreSQL => Box::new(GenericDialect {}),
        }
    }
}

fn dangerous_operation(stmt: &Statement) -> Option<&'static str> {
    match stmt {
        Statement::Drop { object_type, .. } => {
            use sqlparser::ast::ObjectType;
            match object_type {
                ObjectType::Table => Some("DROP TABLE"),
                ObjectType::Index => Some("DROP INDEX"),
                ObjectType::Database | ObjectType::Schema => Some("DROP DATABASE"),
                _ => None,
            }
        }
        Statement::AlterTable(alter_table) => {
            use sqlparser::ast::AlterTableOperation;
            alter_table
                .operations
                .iter()
                .any(|op| matches!(op, AlterTableOperation::DropColumn { .. }))
                .then_some("ALTER TABLE DROP COLUMN")
        }
        Statement::Truncate { .. } => Some("TRUNCATE"),
        Statement::Delete(delete) if delete.selection.is_none() => Some("DELETE without WHERE"),
        Statement::Update(update) if update.selection.is_none() => Some("UPDATE without WHERE"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator(mode: ValidationMode) -> QueryValidator {
        QueryValidator::new(mode, DatabaseType::SQLite)
    }

    fn rules(sql: &str) -> Vec<&'static str> {
        validator(ValidationMode::Permissive)
            .inspect(sql)
            .into_iter()
            .map(|f| f.rule)
            .collect()
    }

    #[test]
    fn test_clean_statements_have_no_findings() {
        assert!(rules("SELECT * FROM users WHERE name = ? AND age > ?").is_empty());
        assert!(rules("UPDATE users SET name = ? WHERE id = ?").is_empty());
        assert!(rules("SELECT * FROM t WHERE a = 1 OR b = 2").is_empty());
    }

    #[test]
    fn test_tautology_detected() {
        assert!(rules("SELECT * FROM users WHERE name = '' OR '1'='1'").contains(&"tautology"));
        assert!(rules("SELECT * FROM users WHERE id = 5 OR 1=1").contains(&"tautology"));
    }

    #[test]
    fn test_comment_terminated_literal() {
        assert!(
            rules("SELECT * FROM users WHERE name = 'admin'-- ' AND pw = 'x'")
                .contains(&"comment_terminated_literal")
        );
    }

    #[test]
    fn test_comment_markers_inside_literals_are_clean() {
        assert!(rules("UPDATE themes SET color = '#ff0000' WHERE id = ?").is_empty());
        assert!(rules("SELECT * FROM separators WHERE sep = '--'").is_empty());
        assert!(rules("SELECT * FROM notes WHERE body = '/* draft */'").is_empty());

        let strict = validator(ValidationMode::Strict);
        assert!(strict
            .check("UPDATE themes SET color = '#ff0000' WHERE id = ?")
            .is_ok());
        assert!(strict.check("SELECT * FROM separators WHERE sep = '--'").is_ok());
    }

    #[test]
    fn test_hash_comment_only_under_mysql() {
        let sql = "SELECT * FROM users WHERE name = 'admin' # AND pw = 'x'";
        let mysql = QueryValidator::new(ValidationMode::Permissive, DatabaseType::MySQL);
        assert!(mysql
            .inspect(sql)
            .iter()
            .any(|f| f.rule == "comment_terminated_literal"));
        assert!(!rules(sql).contains(&"comment_terminated_literal"));

        assert!(
            rules("SELECT * FROM users WHERE name = 'admin' /* ' AND pw = 'x' */")
                .contains(&"comment_terminated_literal")
        );
    }

    #[test]
    fn test_union_injection() {
        assert!(
            rules("SELECT name FROM users WHERE id = '1' UNION SELECT password FROM admins")
                .contains(&"union_injection")
        );
        assert!(!rules("SELECT a FROM x UNION SELECT b FROM y").contains(&"union_injection"));
    }

    #[test]
    fn test_stacked_statements() {
        assert!(rules("SELECT 1; DROP TABLE users").contains(&"stacked_statements"));
    }

    #[test]
    fn test_dangerous_operations() {
        let findings = validator(ValidationMode::Permissive).inspect("DELETE FROM users");
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Dangerous);
        assert_eq!(findings[0].detail, "DELETE without WHERE");
        assert!(rules("DELETE FROM users WHERE id = 1").is_empty());
        assert_eq!(rules("DROP TABLE users"), vec!["dangerous_operation"]);
    }

    #[test]
    fn test_strict_blocks_injection_only() {
        let strict = validator(ValidationMode::Strict);
        let err = strict
            .check("SELECT * FROM users WHERE id = 5 OR 1=1")
            .unwrap_err();
        assert!(matches!(err, DbError::Validation { .. }));

        let findings = strict.check("DELETE FROM users").unwrap();
        assert_eq!(findings.len(), 1);
    }

    #[test]
    fn test_disabled_skips() {
        let findings = validator(ValidationMode::Disabled)
            .check("SELECT 1; DROP TABLE users")
            .unwrap();
        assert!(findings.is_empty());
    }
}
