//! Best-effort rewriting of statements written for another dialect.
//!
//! Client modules often ship SQL authored against one backend. The rules here
//! cover the common portability gaps (auto-increment keywords, identifier
//! quotes, insert-or-ignore, `NOW()`, serial types). Rewriting is textual and
//! does not understand string literals; anything unrecognized passes through
//! unchanged.

use crate::models::DatabaseType;
use regex::Regex;
use std::borrow::Cow;
use std::sync::LazyLock;

static INT_AUTO_INCREMENT_PK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(BIG)?INT(?:EGER)?(?:\(\d+\))?\s+(?:NOT\s+NULL\s+)?AUTO_INCREMENT\s+PRIMARY\s+KEY\b")
        .unwrap()
});

static INTEGER_PK_AUTOINCREMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bINTEGER\s+PRIMARY\s+KEY\s+AUTOINCREMENT\b").unwrap()
});

static SERIAL_PK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(BIG)?SERIAL\s+PRIMARY\s+KEY\b").unwrap()
});

static BACKTICK_IDENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"`([^`]*)`").unwrap());

static INSERT_IGNORE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bINSERT\s+IGNORE\s+INTO\b").unwrap());

static INSERT_OR_IGNORE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bINSERT\s+OR\s+IGNORE\s+INTO\b").unwrap());

static NOW_CALL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bNOW\(\s*\)").unwrap());

static TABLE_OPTIONS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\)\s*(?:ENGINE|DEFAULT\s+CHARSET|CHARSET)\s*=[^;]*").unwrap()
});

static DATETIME_TYPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bDATETIME\b").unwrap());

static BLOB_TYPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:LONG|MEDIUM|TINY)?BLOB\b").unwrap());

static ON_CONFLICT_OR_RETURNING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:ON\s+CONFLICT|RETURNING)\b").unwrap());

/// Rewrite `sql` for `target`. Returns the input untouched when no rule applies.
pub fn adapt_sql(sql: &str, target: DatabaseType) -> Cow<'_, str> {
    let mut out = Cow::Borrowed(sql);
    match target {
        DatabaseType::SQLite | DatabaseType::Embedded => {
            replace(&mut out, &INT_AUTO_INCREMENT_PK, "INTEGER PRIMARY KEY AUTOINCREMENT");
            replace(&mut out, &SERIAL_PK, "INTEGER PRIMARY KEY AUTOINCREMENT");
            replace(&mut out, &BACKTICK_IDENT, "\"$1\"");
            replace(&mut out, &INSERT_IGNORE, "INSERT OR IGNORE INTO");
            replace(&mut out, &NOW_CALL, "CURRENT_TIMESTAMP");
            replace(&mut out, &TABLE_OPTIONS, ")");
        }
        DatabaseType::MySQL => {
            replace(&mut out, &INTEGER_PK_AUTOINCREMENT, "INT AUTO_INCREMENT PRIMARY KEY");
            replace_with(&mut out, &SERIAL_PK, |caps| {
                if caps.get(1).is_some() {
                    "BIGINT AUTO_INCREMENT PRIMARY KEY".to_string()
                } else {
                    "INT AUTO_INCREMENT PRIMARY KEY".to_string()
                }
            });
            replace(&mut out, &INSERT_OR_IGNORE, "INSERT IGNORE INTO");
        }
        DatabaseType::PostgreSQL => {
            replace(&mut out, &INTEGER_PK_AUTOINCREMENT, "SERIAL PRIMARY KEY");
            replace_with(&mut out, &INT_AUTO_INCREMENT_PK, |caps| {
                if caps.get(1).is_some() {
                    "BIGSERIAL PRIMARY KEY".to_string()
                } else {
                    "SERIAL PRIMARY KEY".to_string()
                }
            });
            replace(&mut out, &BACKTICK_IDENT, "\"$1\"");
            replace(&mut out, &TABLE_OPTIONS, ")");
            replace(&mut out, &DATETIME_TYPE, "TIMESTAMP");
            replace(&mut out, &BLOB_TYPE, "BYTEA");

            let ignores = INSERT_IGNORE.is_match(&out) || INSERT_OR_IGNORE.is_match(&out);
            if ignores && !ON_CONFLICT_OR_RETURNING.is_match(&out) {
                replace(&mut out, &INSERT_IGNORE, "INSERT INTO");
                replace(&mut out, &INSERT_OR_IGNORE, "INSERT INTO");
                let trimmed = out.trim_end().trim_end_matches(';').trim_end().to_string();
                out = Cow::Owned(format!("{} ON CONFLICT DO NOTHING", trimmed));
            }
        }
    }
    out
}

fn replace(sql: &mut Cow<'_, str>, pattern: &Regex, replacement: &str) {
    let rewritten = match pattern.replace_all(&**sql, replacement) {
        Cow::Owned(s) => s,
        Cow::Borrowed(_) => return,
    };
    *sql = Cow::Owned(rewritten);
}

fn replace_with(
    sql: &mut Cow<'_, str>,
    pattern: &Regex,
    replacement: impl Fn(&regex::Captures<'_>) -> String,
) {
    let rewritten = match pattern.replace_all(&**sql, |caps: &regex::Captures<'_>| replacement(caps)) {
        Cow::Owned(s) => s,
        Cow::Borrowed(_) => return,
    };
    *sql = Cow::Owned(rewritten);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_portable_sql_passes_through_borrowed() {
        let sql = "SELECT id, name FROM players WHERE id = ?";
        for target in [
            DatabaseType::SQLite,
            DatabaseType::MySQL,
            DatabaseType::PostgreSQL,
            DatabaseType::Embedded,
        ] {
            assert!(matches!(adapt_sql(sql, target), Cow::Borrowed(_)));
        }
    }

    #[test]
    fn test_mysql_table_to_sqlite() {
        let sql = "CREATE TABLE `homes` (`id` INT NOT NULL AUTO_INCREMENT PRIMARY KEY, `name` VARCHAR(32)) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4";
        assert_eq!(
            adapt_sql(sql, DatabaseType::SQLite),
            "CREATE TABLE \"homes\" (\"id\" INTEGER PRIMARY KEY AUTOINCREMENT, \"name\" VARCHAR(32))"
        );
    }

    #[test]
    fn test_sqlite_table_to_mysql() {
        let sql = "CREATE TABLE homes (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT)";
        assert_eq!(
            adapt_sql(sql, DatabaseType::MySQL),
            "CREATE TABLE homes (id INT AUTO_INCREMENT PRIMARY KEY, name TEXT)"
        );
    }

    #[test]
    fn test_serial_to_mysql() {
        assert_eq!(
            adapt_sql("id BIGSERIAL PRIMARY KEY", DatabaseType::MySQL),
            "id BIGINT AUTO_INCREMENT PRIMARY KEY"
        );
    }

    #[test]
    fn test_mysql_table_to_postgres() {
        let sql = "CREATE TABLE `logs` (`id` BIGINT AUTO_INCREMENT PRIMARY KEY, `at` DATETIME, `raw` LONGBLOB)";
        assert_eq!(
            adapt_sql(sql, DatabaseType::PostgreSQL),
            "CREATE TABLE \"logs\" (\"id\" BIGSERIAL PRIMARY KEY, \"at\" TIMESTAMP, \"raw\" BYTEA)"
        );
    }

    #[test]
    fn test_insert_ignore_variants() {
        assert_eq!(
            adapt_sql("INSERT IGNORE INTO t (a) VALUES (?)", DatabaseType::SQLite),
            "INSERT OR IGNORE INTO t (a) VALUES (?)"
        );
        assert_eq!(
            adapt_sql("INSERT OR IGNORE INTO t (a) VALUES (?)", DatabaseType::MySQL),
            "INSERT IGNORE INTO t (a) VALUES (?)"
        );
        assert_eq!(
            adapt_sql("INSERT OR IGNORE INTO t (a) VALUES (?);", DatabaseType::PostgreSQL),
            "INSERT INTO t (a) VALUES (?) ON CONFLICT DO NOTHING"
        );
    }

    #[test]
    fn test_now_to_sqlite() {
        assert_eq!(
            adapt_sql("UPDATE t SET seen = NOW() WHERE id = ?", DatabaseType::Embedded),
            "UPDATE t SET seen = CURRENT_TIMESTAMP WHERE id = ?"
        );
    }
}
