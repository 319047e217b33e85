//! Fluent SQL statement builder.
//!
//! A builder renders exactly one statement kind, fixed by the first of
//! [`select`](QueryBuilder::select), [`insert_into`](QueryBuilder::insert_into),
//! [`update`](QueryBuilder::update) or [`delete_from`](QueryBuilder::delete_from).
//! Output always uses portable `?` placeholders; the facade rewrites them for
//! the backend at execution time.
//!
//! Parameters are kept per clause and concatenated in render order, so
//! `parameters()` lines up with the placeholders in `build()` no matter in
//! which order the clauses were added.

use crate::dialect::{Dialect, values_clause};
use crate::error::{DbError, DbResult};
use crate::models::{IntoParams, QueryParam};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
}

/// Sort direction for [`QueryBuilder::order_by`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

impl Order {
    fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueryBuilder {
    dialect: Arc<dyn Dialect>,
    kind: Option<StatementKind>,
    table: Option<String>,
    columns: Vec<String>,
    joins: Vec<String>,
    conditions: Vec<String>,
    group_by: Vec<String>,
    having: Vec<String>,
    order_by: Vec<String>,
    limit: Option<u64>,
    offset: Option<u64>,
    assignments: Vec<String>,
    rows: Vec<Vec<QueryParam>>,
    pending_row: Vec<QueryParam>,
    set_params: Vec<QueryParam>,
    join_params: Vec<QueryParam>,
    where_params: Vec<QueryParam>,
    having_params: Vec<QueryParam>,
}

impl QueryBuilder {
    pub fn new(dialect: Arc<dyn Dialect>) -> Self {
        Self {
            dialect,
            kind: None,
            table: None,
            columns: Vec::new(),
            joins: Vec::new(),
            conditions: Vec::new(),
            group_by: Vec::new(),
            having: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            offset: None,
            assignments: Vec::new(),
            rows: Vec::new(),
            pending_row: Vec::new(),
            set_params: Vec::new(),
            join_params: Vec::new(),
            where_params: Vec::new(),
            having_params: Vec::new(),
        }
    }

    /// Fix the statement kind on first use. Returns false when another kind
    /// was already chosen, in which case the call is ignored.
    fn structural(&mut self, kind: StatementKind) -> bool {
        *self.kind.get_or_insert(kind) == kind
    }

    /// Start a SELECT. An empty column list selects `*`.
    pub fn select(&mut self, columns: &[&str]) -> &mut Self {
        if self.structural(StatementKind::Select) {
            self.columns.extend(columns.iter().map(|c| c.to_string()));
        }
        self
    }

    pub fn from(&mut self, table: &str) -> &mut Self {
        self.table = Some(table.to_string());
        self
    }

    pub fn join(&mut self, table: &str, on: &str) -> &mut Self {
        self.add_join("INNER JOIN", table, on, ())
    }

    pub fn left_join(&mut self, table: &str, on: &str) -> &mut Self {
        self.add_join("LEFT JOIN", table, on, ())
    }

    pub fn right_join(&mut self, table: &str, on: &str) -> &mut Self {
        self.add_join("RIGHT JOIN", table, on, ())
    }

    /// Inner join whose ON condition carries placeholders.
    pub fn join_with(&mut self, table: &str, on: &str, params: impl IntoParams) -> &mut Self {
        self.add_join("INNER JOIN", table, on, params)
    }

    fn add_join(&mut self, keyword: &str, table: &str, on: &str, params: impl IntoParams) -> &mut Self {
        self.joins.push(format!("{} {} ON {}", keyword, table, on));
        self.join_params.extend(params.into_params());
        self
    }

    /// Add a WHERE condition, joined to earlier ones with AND.
    pub fn where_(&mut self, condition: &str, params: impl IntoParams) -> &mut Self {
        self.and(condition, params)
    }

    pub fn and(&mut self, condition: &str, params: impl IntoParams) -> &mut Self {
        self.add_condition("AND", condition, params)
    }

    pub fn or(&mut self, condition: &str, params: impl IntoParams) -> &mut Self {
        self.add_condition("OR", condition, params)
    }

    fn add_condition(&mut self, connector: &str, condition: &str, params: impl IntoParams) -> &mut Self {
        if self.conditions.is_empty() {
            self.conditions.push(condition.to_string());
        } else {
            self.conditions.push(format!("{} {}", connector, condition));
        }
        self.where_params.extend(params.into_params());
        self
    }

    pub fn group_by(&mut self, columns: &[&str]) -> &mut Self {
        self.group_by.extend(columns.iter().map(|c| c.to_string()));
        self
    }

    /// Add a HAVING condition, joined to earlier ones with AND.
    pub fn having(&mut self, condition: &str, params: impl IntoParams) -> &mut Self {
        self.having.push(condition.to_string());
        self.having_params.extend(params.into_params());
        self
    }

    pub fn order_by(&mut self, column: &str, order: Order) -> &mut Self {
        self.order_by.push(format!("{} {}", column, order.as_sql()));
        self
    }

    pub fn limit(&mut self, limit: u64) -> &mut Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(&mut self, offset: u64) -> &mut Self {
        self.offset = Some(offset);
        self
    }

    pub fn insert_into(&mut self, table: &str) -> &mut Self {
        if self.structural(StatementKind::Insert) {
            self.table = Some(table.to_string());
        }
        self
    }

    pub fn columns(&mut self, columns: &[&str]) -> &mut Self {
        self.columns.extend(columns.iter().map(|c| c.to_string()));
        self
    }

    /// Set the values of the row being built, replacing earlier ones.
    pub fn values(&mut self, params: impl IntoParams) -> &mut Self {
        self.pending_row = params.into_params();
        self
    }

    /// Commit the current row; following `values` calls start a new one.
    pub fn add_batch(&mut self) -> &mut Self {
        if !self.pending_row.is_empty() {
            self.rows.push(std::mem::take(&mut self.pending_row));
        }
        self
    }

    pub fn update(&mut self, table: &str) -> &mut Self {
        if self.structural(StatementKind::Update) {
            self.table = Some(table.to_string());
        }
        self
    }

    pub fn set(&mut self, column: &str, value: impl Into<QueryParam>) -> &mut Self {
        self.assignments.push(format!("{} = ?", column));
        self.set_params.push(value.into());
        self
    }

    pub fn delete_from(&mut self, table: &str) -> &mut Self {
        if self.structural(StatementKind::Delete) {
            self.table = Some(table.to_string());
        }
        self
    }

    /// Clear all state so the builder can be used for a new statement.
    pub fn reset(&mut self) -> &mut Self {
        let dialect = Arc::clone(&self.dialect);
        *self = Self::new(dialect);
        self
    }

    pub fn kind(&self) -> Option<StatementKind> {
        self.kind
    }

    /// Render the statement.
    pub fn build(&self) -> DbResult<String> {
        let kind = self.kind.ok_or_else(|| {
            DbError::invalid_input(
                "Query builder has no statement kind; call select, insert_into, update or delete_from first",
            )
        })?;
        let table = self
            .table
            .as_deref()
            .ok_or_else(|| DbError::invalid_input("Query builder has no table"))?;

        let sql = match kind {
            StatementKind::Select => self.build_select(table),
            StatementKind::Insert => self.build_insert(table)?,
            StatementKind::Update => {
                if self.assignments.is_empty() {
                    return Err(DbError::invalid_input("UPDATE requires at least one set()"));
                }
                format!(
                    "UPDATE {} SET {}{}",
                    table,
                    self.assignments.join(", "),
                    self.where_clause()
                )
            }
            StatementKind::Delete => format!("DELETE FROM {}{}", table, self.where_clause()),
        };
        Ok(sql)
    }

    /// Parameters in placeholder order.
    pub fn parameters(&self) -> Vec<QueryParam> {
        match self.kind {
            Some(StatementKind::Select) => self
                .join_params
                .iter()
                .chain(&self.where_params)
                .chain(&self.having_params)
                .cloned()
                .collect(),
            Some(StatementKind::Insert) => self.insert_rows().into_iter().flatten().cloned().collect(),
            Some(StatementKind::Update) => self
                .set_params
                .iter()
                .chain(&self.where_params)
                .cloned()
                .collect(),
            Some(StatementKind::Delete) => self.where_params.clone(),
            None => Vec::new(),
        }
    }

    fn build_select(&self, table: &str) -> String {
        let columns = if self.columns.is_empty() {
            "*".to_string()
        } else {
            self.columns.join(", ")
        };
        let mut sql = format!("SELECT {} FROM {}", columns, table);
        for join in &self.joins {
            sql.push(' ');
            sql.push_str(join);
        }
        sql.push_str(&self.where_clause());
        if !self.group_by.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&self.group_by.join(", "));
        }
        if !self.having.is_empty() {
            sql.push_str(" HAVING ");
            sql.push_str(&self.having.join(" AND "));
        }
        if !self.order_by.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.order_by.join(", "));
        }
        sql.push_str(&self.dialect.limit_offset(self.limit, self.offset));
        sql
    }

    fn build_insert(&self, table: &str) -> DbResult<String> {
        let rows = self.insert_rows();
        let width = rows.first().map(|r| r.len()).unwrap_or(0);
        if width == 0 {
            return Err(DbError::invalid_input("INSERT requires values()"));
        }
        if rows.iter().any(|r| r.len() != width) {
            return Err(DbError::invalid_input(
                "Every INSERT row must have the same number of values",
            ));
        }
        if !self.columns.is_empty() && self.columns.len() != width {
            return Err(DbError::invalid_input(format!(
                "INSERT names {} columns but rows carry {} values",
                self.columns.len(),
                width
            )));
        }

        if self.columns.is_empty() {
            return Ok(format!(
                "INSERT INTO {} VALUES {}",
                table,
                values_clause(width, rows.len())
            ));
        }
        let columns: Vec<&str> = self.columns.iter().map(String::as_str).collect();
        Ok(self.dialect.multi_row_insert(table, &columns, rows.len()))
    }

    fn insert_rows(&self) -> Vec<&Vec<QueryParam>> {
        let mut rows: Vec<&Vec<QueryParam>> = self.rows.iter().collect();
        if !self.pending_row.is_empty() {
            rows.push(&self.pending_row);
        }
        rows
    }

    fn where_clause(&self) -> String {
        if self.conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.conditions.join(" "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{MySqlDialect, PostgresDialect, SqliteDialect, count_placeholders};

    fn sqlite() -> QueryBuilder {
        QueryBuilder::new(Arc::new(SqliteDialect))
    }

    #[test]
    fn test_select_with_everything() {
        let mut qb = sqlite();
        qb.select(&["p.name", "COUNT(*) AS homes"])
            .from("players p")
            .left_join("homes h", "h.owner = p.id")
            .where_("p.active = ?", (true,))
            .and("p.level > ?", (10,))
            .group_by(&["p.name"])
            .having("COUNT(*) > ?", (1,))
            .order_by("homes", Order::Desc)
            .limit(5)
            .offset(10);

        assert_eq!(
            qb.build().unwrap(),
            "SELECT p.name, COUNT(*) AS homes FROM players p LEFT JOIN homes h ON h.owner = p.id WHERE p.active = ? AND p.level > ? GROUP BY p.name HAVING COUNT(*) > ? ORDER BY homes DESC LIMIT 5 OFFSET 10"
        );
        assert_eq!(
            qb.parameters(),
            vec![QueryParam::Bool(true), QueryParam::Int(10), QueryParam::Int(1)]
        );
    }

    #[test]
    fn test_select_star_and_or() {
        let mut qb = sqlite();
        qb.select(&[])
            .from("t")
            .where_("a = ?", (1,))
            .or("b = ?", (2,));
        assert_eq!(qb.build().unwrap(), "SELECT * FROM t WHERE a = ? OR b = ?");
    }

    #[test]
    fn test_parameters_follow_render_order_not_call_order() {
        let mut qb = sqlite();
        qb.select(&["x"])
            .from("t")
            .having("SUM(y) > ?", (100,))
            .where_("z = ?", ("w",))
            .join_with("u", "u.id = t.uid AND u.kind = ?", ("admin",));

        let sql = qb.build().unwrap();
        assert_eq!(
            sql,
            "SELECT x FROM t INNER JOIN u ON u.id = t.uid AND u.kind = ? WHERE z = ? HAVING SUM(y) > ?"
        );
        assert_eq!(
            qb.parameters(),
            vec![
                QueryParam::String("admin".into()),
                QueryParam::String("w".into()),
                QueryParam::Int(100)
            ]
        );
        assert_eq!(count_placeholders(&sql), qb.parameters().len());
    }

    #[test]
    fn test_update_set_params_before_where_params() {
        let mut qb = sqlite();
        qb.update("players")
            .where_("id = ?", (7,))
            .set("name", "bob")
            .set("level", 3);
        assert_eq!(
            qb.build().unwrap(),
            "UPDATE players SET name = ?, level = ? WHERE id = ?"
        );
        assert_eq!(
            qb.parameters(),
            vec![
                QueryParam::String("bob".into()),
                QueryParam::Int(3),
                QueryParam::Int(7)
            ]
        );
    }

    #[test]
    fn test_update_without_set_fails() {
        let mut qb = sqlite();
        qb.update("t");
        assert!(matches!(qb.build(), Err(DbError::InvalidInput { .. })));
    }

    #[test]
    fn test_delete() {
        let mut qb = sqlite();
        qb.delete_from("sessions").where_("expires < ?", (100,));
        assert_eq!(qb.build().unwrap(), "DELETE FROM sessions WHERE expires < ?");
        assert_eq!(qb.parameters(), vec![QueryParam::Int(100)]);
    }

    #[test]
    fn test_single_row_insert() {
        let mut qb = sqlite();
        qb.insert_into("users").columns(&["name", "age"]).values(("alice", 30));
        assert_eq!(qb.build().unwrap(), "INSERT INTO users (name, age) VALUES (?, ?)");
        assert_eq!(qb.parameters().len(), 2);
    }

    #[test]
    fn test_batch_insert_delegates_to_dialect() {
        let mut qb = QueryBuilder::new(Arc::new(MySqlDialect));
        qb.insert_into("users")
            .columns(&["name", "age"])
            .values(("a", 1))
            .add_batch()
            .values(("b", 2))
            .add_batch()
            .values(("c", 3));
        let sql = qb.build().unwrap();
        assert_eq!(
            sql,
            "INSERT INTO users (name, age) VALUES (?, ?), (?, ?), (?, ?)"
        );
        assert_eq!(count_placeholders(&sql), 6);
        assert_eq!(qb.parameters().len(), 6);
    }

    #[test]
    fn test_insert_without_columns() {
        let mut qb = sqlite();
        qb.insert_into("kv").values(("k", "v"));
        assert_eq!(qb.build().unwrap(), "INSERT INTO kv VALUES (?, ?)");
    }

    #[test]
    fn test_insert_width_mismatch() {
        let mut qb = sqlite();
        qb.insert_into("kv").columns(&["k"]).values(("k", "v"));
        assert!(qb.build().is_err());
    }

    #[test]
    fn test_pagination_delegates_to_dialect() {
        let mut qb = QueryBuilder::new(Arc::new(PostgresDialect));
        qb.select(&["id"]).from("t").offset(40);
        assert_eq!(qb.build().unwrap(), "SELECT id FROM t OFFSET 40");

        let mut qb = sqlite();
        qb.select(&["id"]).from("t").offset(40);
        assert_eq!(qb.build().unwrap(), "SELECT id FROM t LIMIT -1 OFFSET 40");
    }

    #[test]
    fn test_first_structural_call_wins() {
        let mut qb = sqlite();
        qb.select(&["id"]).from("t").update("u");
        assert_eq!(qb.kind(), Some(StatementKind::Select));
        assert_eq!(qb.build().unwrap(), "SELECT id FROM t");

        let mut qb = sqlite();
        qb.delete_from("t").select(&["id"]).insert_into("u");
        assert_eq!(qb.build().unwrap(), "DELETE FROM t");
    }

    #[test]
    fn test_build_without_kind_fails() {
        let qb = sqlite();
        assert!(qb.build().is_err());
        assert!(qb.parameters().is_empty());
    }

    #[test]
    fn test_reset_clears_state() {
        let mut qb = sqlite();
        qb.select(&["id"]).from("t").where_("id = ?", (1,));
        qb.reset();
        assert!(qb.kind().is_none());
        qb.delete_from("t");
        assert_eq!(qb.build().unwrap(), "DELETE FROM t");
        assert!(qb.parameters().is_empty());
    }
}
