//! SQL rendering of the statement IR.
//!
//! [`ToSql`] turns a [`Select`], [`Statement`] or [`Expr`] into SQL text plus
//! its bound parameters for one [`Dialect`]. Parameters are numbered in the
//! order they appear in the text.
//!
//! Dialect differences handled here:
//!
//! - placeholders: `$1` (Postgres), `?1` (SQLite), `?` (MySQL)
//! - case-insensitive `LIKE`: native `ILIKE` on Postgres, `LOWER(..) LIKE
//!   LOWER(..)` elsewhere
//! - array operators: `&&`/`<@`/`@>` on Postgres, `json_each` subqueries on
//!   SQLite, `JSON_OVERLAPS`/`JSON_CONTAINS` on MySQL
//! - per-partition windows: a `ROW_NUMBER()` subquery on every dialect

use std::collections::BTreeSet;

use tessera_core::{
    AggregateFunc, ArrayOp, Dialect, Expr, INTERNAL_COLUMN_PREFIX, JoinKind, Select, SelectItem,
    Statement, TableRef, Value,
};

/// Column carrying the row number inside a windowed select.
pub const ROW_NUMBER_COLUMN: &str = "__rn";

/// Render IR to SQL text and parameters.
pub trait ToSql {
    /// Build the SQL and parameters for `dialect`.
    fn to_sql(&self, dialect: Dialect) -> (String, Vec<Value>);
}

impl ToSql for Expr {
    fn to_sql(&self, dialect: Dialect) -> (String, Vec<Value>) {
        let mut w = SqlWriter::new(dialect);
        w.expr(self);
        w.finish()
    }
}

impl ToSql for Select {
    fn to_sql(&self, dialect: Dialect) -> (String, Vec<Value>) {
        let mut w = SqlWriter::new(dialect);
        w.select(self);
        w.finish()
    }
}

impl ToSql for Statement {
    fn to_sql(&self, dialect: Dialect) -> (String, Vec<Value>) {
        let mut w = SqlWriter::new(dialect);
        w.statement(self);
        w.finish()
    }
}

/// Render a write with `RETURNING *` appended where the dialect supports it.
///
/// MySQL has no `RETURNING`; callers on MySQL re-read the affected rows.
pub fn to_sql_returning(statement: &Statement, dialect: Dialect) -> (String, Vec<Value>) {
    let (mut sql, params) = statement.to_sql(dialect);
    let writes = matches!(
        statement,
        Statement::Insert(_) | Statement::Update(_) | Statement::Delete(_)
    );
    if writes && !sql.is_empty() && dialect != Dialect::Mysql {
        sql.push_str(" RETURNING *");
    }
    (sql, params)
}

struct SqlWriter {
    dialect: Dialect,
    sql: String,
    params: Vec<Value>,
}

impl SqlWriter {
    fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            sql: String::new(),
            params: Vec::new(),
        }
    }

    fn finish(self) -> (String, Vec<Value>) {
        (self.sql, self.params)
    }

    fn push(&mut self, s: &str) {
        self.sql.push_str(s);
    }

    fn ident(&mut self, name: &str) {
        let quoted = self.dialect.quote_ident(name);
        self.sql.push_str(&quoted);
    }

    fn bind(&mut self, value: &Value) {
        let value = match (self.dialect, value) {
            // Arrays travel as JSON text outside Postgres.
            (Dialect::Sqlite | Dialect::Mysql, Value::Array(_)) => {
                Value::Text(value.to_json().to_string())
            }
            _ => value.clone(),
        };
        self.params.push(value);
        let placeholder = self.dialect.placeholder(self.params.len());
        self.sql.push_str(&placeholder);
    }

    fn list<T>(&mut self, items: &[T], mut each: impl FnMut(&mut Self, &T)) {
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            each(self, item);
        }
    }

    fn table(&mut self, table: &TableRef) {
        self.ident(&table.name);
        if let Some(alias) = &table.alias {
            self.push(" AS ");
            self.ident(alias);
        }
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Column { table, name } => {
                if let Some(table) = table {
                    self.ident(table);
                    self.push(".");
                }
                self.ident(name);
            }
            Expr::Field(name) => self.ident(name),
            Expr::Literal(value) => self.literal(value),
            Expr::Binary { left, op, right } => {
                self.push("(");
                self.expr(left);
                self.push(" ");
                self.push(op.as_str());
                self.push(" ");
                self.expr(right);
                self.push(")");
            }
            Expr::Not(inner) => {
                self.push("NOT ");
                self.wrapped(inner);
            }
            Expr::IsNull { expr, negated } => {
                self.push("(");
                self.expr(expr);
                self.push(if *negated { " IS NOT NULL)" } else { " IS NULL)" });
            }
            Expr::InList {
                expr,
                list,
                negated,
            } => {
                if list.is_empty() {
                    self.push(if *negated { "TRUE" } else { "FALSE" });
                    return;
                }
                self.push("(");
                self.expr(expr);
                self.push(if *negated { " NOT IN (" } else { " IN (" });
                self.list(list, |w, item| w.expr(item));
                self.push("))");
            }
            Expr::InSubquery {
                expr,
                subquery,
                negated,
            } => {
                self.push("(");
                self.expr(expr);
                self.push(if *negated { " NOT IN (" } else { " IN (" });
                self.select(subquery);
                self.push("))");
            }
            Expr::Exists { subquery, negated } => {
                self.push(if *negated { "NOT EXISTS (" } else { "EXISTS (" });
                self.select(subquery);
                self.push(")");
            }
            Expr::Like {
                expr,
                pattern,
                case_insensitive,
                negated,
            } => self.like(expr, pattern, *case_insensitive, *negated),
            Expr::Array { left, op, right } => self.array(left, *op, right),
            Expr::Coalesce(items) => {
                self.push("COALESCE(");
                self.list(items, |w, item| w.expr(item));
                self.push(")");
            }
            Expr::Concat(items) => {
                if self.dialect == Dialect::Mysql {
                    self.push("CONCAT(");
                    self.list(items, |w, item| w.expr(item));
                    self.push(")");
                } else {
                    self.push("(");
                    for (i, item) in items.iter().enumerate() {
                        if i > 0 {
                            self.push(" || ");
                        }
                        self.expr(item);
                    }
                    self.push(")");
                }
            }
            Expr::Aggregate {
                func,
                arg,
                distinct,
            } => {
                self.push(func.as_str());
                self.push("(");
                match arg {
                    None => self.push("*"),
                    Some(arg) => {
                        if *distinct {
                            self.push("DISTINCT ");
                        }
                        if *func == AggregateFunc::Avg && self.dialect == Dialect::Postgres {
                            // AVG over BIGINT is NUMERIC on Postgres
                            self.push("CAST(");
                            self.expr(arg);
                            self.push(" AS DOUBLE PRECISION)");
                        } else {
                            self.expr(arg);
                        }
                    }
                }
                self.push(")");
            }
            Expr::Raw { sql, params } => self.raw(sql, params),
        }
    }

    fn wrapped(&mut self, expr: &Expr) {
        self.push("(");
        self.expr(expr);
        self.push(")");
    }

    fn literal(&mut self, value: &Value) {
        match value {
            Value::Null => self.push("NULL"),
            Value::Bool(true) => self.push("TRUE"),
            Value::Bool(false) => self.push("FALSE"),
            other => self.bind(other),
        }
    }

    fn like(&mut self, expr: &Expr, pattern: &Expr, case_insensitive: bool, negated: bool) {
        let not = if negated { "NOT " } else { "" };
        self.push("(");
        if case_insensitive && !self.dialect.supports_ilike() {
            self.push("LOWER(");
            self.expr(expr);
            self.push(&format!(") {not}LIKE LOWER("));
            self.expr(pattern);
            self.push(")");
        } else {
            self.expr(expr);
            let op = if case_insensitive { "ILIKE" } else { "LIKE" };
            self.push(&format!(" {not}{op} "));
            self.expr(pattern);
        }
        if self.dialect == Dialect::Sqlite {
            self.push(" ESCAPE '\\'");
        }
        self.push(")");
    }

    fn array(&mut self, left: &Expr, op: ArrayOp, right: &Expr) {
        match self.dialect {
            Dialect::Postgres => {
                let symbol = match op {
                    ArrayOp::Overlaps => "&&",
                    ArrayOp::ContainedBy => "<@",
                    ArrayOp::Contains => "@>",
                };
                self.push("(");
                self.expr(left);
                self.push(&format!(" {symbol} "));
                self.expr(right);
                self.push(")");
            }
            Dialect::Sqlite => match op {
                ArrayOp::Overlaps => {
                    self.push("EXISTS (SELECT 1 FROM json_each(");
                    self.expr(left);
                    self.push(") AS \"__a\" JOIN json_each(");
                    self.expr(right);
                    self.push(") AS \"__b\" ON \"__a\".value = \"__b\".value)");
                }
                ArrayOp::ContainedBy => self.sqlite_subset(left, right),
                ArrayOp::Contains => self.sqlite_subset(right, left),
            },
            Dialect::Mysql => {
                let (func, first, second) = match op {
                    ArrayOp::Overlaps => ("JSON_OVERLAPS", left, right),
                    ArrayOp::ContainedBy => ("JSON_CONTAINS", right, left),
                    ArrayOp::Contains => ("JSON_CONTAINS", left, right),
                };
                self.push(func);
                self.push("(");
                self.expr(first);
                self.push(", ");
                self.expr(second);
                self.push(")");
            }
        }
    }

    /// Every element of `subset` appears in `superset`.
    fn sqlite_subset(&mut self, subset: &Expr, superset: &Expr) {
        self.push("NOT EXISTS (SELECT 1 FROM json_each(");
        self.expr(subset);
        self.push(") AS \"__a\" WHERE \"__a\".value NOT IN (SELECT value FROM json_each(");
        self.expr(superset);
        self.push(")))");
    }

    /// Copy `sql`, renumbering each `?` as the dialect's next placeholder.
    fn raw(&mut self, sql: &str, params: &[Value]) {
        let mut params = params.iter();
        for ch in sql.chars() {
            if ch != '?' {
                self.sql.push(ch);
                continue;
            }
            match params.next() {
                Some(value) => self.bind(value),
                None => self.sql.push(ch),
            }
        }
    }

    // ------------------------------------------------------------------
    // SELECT
    // ------------------------------------------------------------------

    fn select(&mut self, select: &Select) {
        match &select.window {
            Some(window) => {
                let mut inner = select.clone();
                inner.window = None;
                inner.order_by.clear();
                inner.limit = None;
                inner.offset = None;
                if inner.items.is_empty() {
                    inner.items.push(SelectItem::All(inner.from.alias.clone()));
                }

                self.push("SELECT * FROM (");
                self.select_core(&inner, Some((&window.partition_by, select)));
                self.push(") AS ");
                self.ident(&format!("{INTERNAL_COLUMN_PREFIX}windowed"));
                self.push(" WHERE ");
                self.ident(ROW_NUMBER_COLUMN);
                self.push(&format!(" > {}", window.offset));
                if let Some(limit) = window.limit {
                    self.push(" AND ");
                    self.ident(ROW_NUMBER_COLUMN);
                    self.push(&format!(" <= {}", window.offset + limit));
                }
                self.push(" ORDER BY ");
                self.ident(ROW_NUMBER_COLUMN);
            }
            None => {
                self.select_core(select, None);
                self.order_by(select);
                self.limit_offset(select.limit, select.offset);
            }
        }
    }

    /// `SELECT .. FROM .. WHERE .. GROUP BY ..`, optionally with a
    /// `ROW_NUMBER()` item partitioned by `window.0` and ordered by
    /// `window.1`'s `ORDER BY`.
    fn select_core(&mut self, select: &Select, window: Option<(&Vec<Expr>, &Select)>) {
        self.push("SELECT ");
        if select.distinct {
            self.push("DISTINCT ");
        }
        if select.items.is_empty() {
            self.push("*");
        } else {
            self.list(&select.items, |w, item| match item {
                SelectItem::All(None) => w.push("*"),
                SelectItem::All(Some(alias)) => {
                    w.ident(alias);
                    w.push(".*");
                }
                SelectItem::Expr { expr, alias } => {
                    w.expr(expr);
                    w.push(" AS ");
                    w.ident(alias);
                }
            });
        }
        if let Some((partition_by, ordered)) = window {
            self.push(", ROW_NUMBER() OVER (");
            if !partition_by.is_empty() {
                self.push("PARTITION BY ");
                self.list(partition_by, |w, e| w.expr(e));
            }
            if !ordered.order_by.is_empty() {
                if !partition_by.is_empty() {
                    self.push(" ");
                }
                self.push("ORDER BY ");
                self.order_terms(ordered);
            }
            self.push(") AS ");
            self.ident(ROW_NUMBER_COLUMN);
        }

        self.push(" FROM ");
        self.table(&select.from);
        for join in &select.joins {
            self.push(match join.kind {
                JoinKind::Inner => " INNER JOIN ",
                JoinKind::Left => " LEFT JOIN ",
            });
            self.table(&join.table);
            self.push(" ON ");
            self.expr(&join.on);
        }
        if let Some(filter) = &select.filter {
            self.push(" WHERE ");
            self.expr(filter);
        }
        if !select.group_by.is_empty() {
            self.push(" GROUP BY ");
            self.list(&select.group_by, |w, e| w.expr(e));
        }
    }

    fn order_by(&mut self, select: &Select) {
        if select.order_by.is_empty() {
            return;
        }
        self.push(" ORDER BY ");
        self.order_terms(select);
    }

    fn order_terms(&mut self, select: &Select) {
        self.list(&select.order_by, |w, term| {
            w.expr(&term.expr);
            w.push(" ");
            w.push(term.direction.as_sql());
        });
    }

    fn limit_offset(&mut self, limit: Option<u64>, offset: Option<u64>) {
        match (limit, offset) {
            (Some(limit), _) => self.push(&format!(" LIMIT {limit}")),
            (None, Some(_)) => match self.dialect {
                Dialect::Sqlite => self.push(" LIMIT -1"),
                Dialect::Mysql => self.push(" LIMIT 18446744073709551615"),
                Dialect::Postgres => {}
            },
            (None, None) => {}
        }
        if let Some(offset) = offset {
            self.push(&format!(" OFFSET {offset}"));
        }
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    fn statement(&mut self, statement: &Statement) {
        match statement {
            Statement::Insert(insert) => {
                if insert.rows.is_empty() {
                    return;
                }
                let columns: BTreeSet<&str> =
                    insert.rows.iter().flat_map(|row| row.columns()).collect();
                let columns: Vec<&str> = columns.into_iter().collect();

                self.push("INSERT INTO ");
                self.ident(&insert.table);
                self.push(" (");
                self.list(&columns, |w, c| w.ident(c));
                self.push(") VALUES ");
                self.list(&insert.rows, |w, row| {
                    w.push("(");
                    w.list(&columns, |w, c| match row.get(c) {
                        Some(value) => w.literal(value),
                        // SQLite has no DEFAULT inside VALUES
                        None if w.dialect == Dialect::Sqlite => w.push("NULL"),
                        None => w.push("DEFAULT"),
                    });
                    w.push(")");
                });
            }
            Statement::Update(update) => {
                if update.set.is_empty() {
                    return;
                }
                self.push("UPDATE ");
                self.ident(&update.table);
                self.push(" SET ");
                let set: Vec<(&str, &Value)> = update.set.iter().collect();
                self.list(&set, |w, (column, value)| {
                    w.ident(column);
                    w.push(" = ");
                    w.literal(value);
                });
                if let Some(filter) = &update.filter {
                    self.push(" WHERE ");
                    self.expr(filter);
                }
            }
            Statement::Delete(delete) => {
                self.push("DELETE FROM ");
                self.ident(&delete.table);
                if let Some(filter) = &delete.filter {
                    self.push(" WHERE ");
                    self.expr(filter);
                }
            }
            Statement::CreateTable(table) => {
                let statements = tessera_schema::generator_for(self.dialect).create_table(table);
                self.push(&statements.join(";\n"));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::{ColumnDef, Join, OrderTerm, PartitionWindow, Row, SqlType, TableSchema};

    fn posts() -> Select {
        Select::from(TableRef::aliased("posts", "t0")).all()
    }

    #[test]
    fn test_select_placeholders_per_dialect() {
        let select = posts()
            .filter(Expr::qcol("t0", "status").eq("published"))
            .filter(Expr::qcol("t0", "viewCount").gte(50))
            .order(OrderTerm::desc(Expr::qcol("t0", "viewCount")))
            .limit(2);

        let (sql, params) = select.to_sql(Dialect::Postgres);
        assert_eq!(
            sql,
            "SELECT \"t0\".* FROM \"posts\" AS \"t0\" WHERE ((\"t0\".\"status\" = $1) AND \
             (\"t0\".\"viewCount\" >= $2)) ORDER BY \"t0\".\"viewCount\" DESC LIMIT 2"
        );
        assert_eq!(params, vec![Value::from("published"), Value::BigInt(50)]);

        let (sql, _) = select.to_sql(Dialect::Sqlite);
        assert!(sql.contains("?1") && sql.contains("?2"));
        let (sql, _) = select.to_sql(Dialect::Mysql);
        assert!(sql.contains("`t0`.`status` = ?"));
    }

    #[test]
    fn test_ilike_emulation() {
        let e = Expr::Like {
            expr: Box::new(Expr::col("name")),
            pattern: Box::new(Expr::lit("a%")),
            case_insensitive: true,
            negated: true,
        };
        assert_eq!(e.to_sql(Dialect::Postgres).0, "(\"name\" NOT ILIKE $1)");
        assert_eq!(
            e.to_sql(Dialect::Sqlite).0,
            "(LOWER(\"name\") NOT LIKE LOWER(?1) ESCAPE '\\')"
        );
        assert_eq!(e.to_sql(Dialect::Mysql).0, "(LOWER(`name`) NOT LIKE LOWER(?))");
    }

    #[test]
    fn test_empty_in_list_is_constant() {
        let empty: Vec<Expr> = Vec::new();
        assert_eq!(Expr::col("id").in_list(empty.clone()).to_sql(Dialect::Postgres).0, "FALSE");
        let negated = Expr::InList {
            expr: Box::new(Expr::col("id")),
            list: empty,
            negated: true,
        };
        assert_eq!(negated.to_sql(Dialect::Postgres).0, "TRUE");
    }

    #[test]
    fn test_array_operators() {
        let e = Expr::Array {
            left: Box::new(Expr::col("tags")),
            op: ArrayOp::Overlaps,
            right: Box::new(Expr::lit(vec!["a", "b"])),
        };
        let (sql, params) = e.to_sql(Dialect::Postgres);
        assert_eq!(sql, "(\"tags\" && $1)");
        assert!(matches!(params[0], Value::Array(_)));

        let (sql, params) = e.to_sql(Dialect::Sqlite);
        assert!(sql.starts_with("EXISTS (SELECT 1 FROM json_each(\"tags\")"));
        assert_eq!(params, vec![Value::from("[\"a\",\"b\"]")]);

        let contains = Expr::Array {
            left: Box::new(Expr::col("tags")),
            op: ArrayOp::Contains,
            right: Box::new(Expr::lit(vec!["a"])),
        };
        assert_eq!(contains.to_sql(Dialect::Mysql).0, "JSON_CONTAINS(`tags`, ?)");
    }

    #[test]
    fn test_window_wraps_row_number() {
        let select = Select::from(TableRef::aliased("posts", "t1"))
            .all()
            .filter(Expr::qcol("t1", "authorId").in_list(["u1", "u2"]))
            .order(OrderTerm::desc(Expr::qcol("t1", "createdAt")))
            .window(PartitionWindow {
                partition_by: vec![Expr::qcol("t1", "authorId")],
                limit: Some(2),
                offset: 1,
            });
        let (sql, params) = select.to_sql(Dialect::Postgres);
        assert_eq!(
            sql,
            "SELECT * FROM (SELECT \"t1\".*, ROW_NUMBER() OVER (PARTITION BY \"t1\".\"authorId\" \
             ORDER BY \"t1\".\"createdAt\" DESC) AS \"__rn\" FROM \"posts\" AS \"t1\" WHERE \
             (\"t1\".\"authorId\" IN ($1, $2))) AS \"__windowed\" WHERE \"__rn\" > 1 AND \
             \"__rn\" <= 3 ORDER BY \"__rn\""
        );
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_joins_and_exists() {
        let sub = Select::from(TableRef::aliased("tags", "t1"))
            .item(Expr::lit(1), "one")
            .join(Join::inner(
                TableRef::aliased("post_tags", "t2"),
                Expr::qcol("t2", "tagId").eq(Expr::qcol("t1", "id")),
            ))
            .filter(Expr::qcol("t2", "postId").eq(Expr::qcol("t0", "id")));
        let select = posts().filter(Expr::not_exists(sub));
        let (sql, params) = select.to_sql(Dialect::Sqlite);
        assert!(sql.contains("WHERE NOT EXISTS (SELECT ?1 AS \"one\" FROM \"tags\" AS \"t1\" INNER JOIN"));
        assert_eq!(params, vec![Value::BigInt(1)]);
    }

    #[test]
    fn test_offset_without_limit() {
        let select = posts().offset(5);
        assert!(select.to_sql(Dialect::Postgres).0.ends_with("\"t0\" OFFSET 5"));
        assert!(select.to_sql(Dialect::Sqlite).0.ends_with("LIMIT -1 OFFSET 5"));
        assert!(
            select
                .to_sql(Dialect::Mysql)
                .0
                .ends_with("LIMIT 18446744073709551615 OFFSET 5")
        );
    }

    #[test]
    fn test_insert_uses_column_union() {
        let stmt = Statement::insert(
            "tags",
            vec![
                Row::new().with("id", "a").with("name", "x"),
                Row::new().with("id", "b").with("slug", "y"),
            ],
        );
        let (sql, params) = stmt.to_sql(Dialect::Postgres);
        assert_eq!(
            sql,
            "INSERT INTO \"tags\" (\"id\", \"name\", \"slug\") VALUES ($1, $2, DEFAULT), ($3, DEFAULT, $4)"
        );
        assert_eq!(params.len(), 4);
        assert!(stmt.to_sql(Dialect::Sqlite).0.contains("(?3, NULL, ?4)"));
    }

    #[test]
    fn test_update_delete_and_returning() {
        let update = Statement::update(
            "posts",
            Row::new().with("featured", true).with("title", "T"),
            Some(Expr::col("id").eq("p1")),
        );
        let (sql, params) = to_sql_returning(&update, Dialect::Postgres);
        assert_eq!(
            sql,
            "UPDATE \"posts\" SET \"featured\" = TRUE, \"title\" = $1 WHERE (\"id\" = $2) RETURNING *"
        );
        assert_eq!(params.len(), 2);
        assert!(!to_sql_returning(&update, Dialect::Mysql).0.contains("RETURNING"));

        let delete = Statement::delete("posts", None);
        assert_eq!(delete.to_sql(Dialect::Postgres).0, "DELETE FROM \"posts\"");
        let empty = Statement::update("posts", Row::new(), None);
        assert!(to_sql_returning(&empty, Dialect::Postgres).0.is_empty());
    }

    #[test]
    fn test_raw_renumbers_params() {
        let e = Expr::col("a").eq(1).and(Expr::Raw {
            sql: "length(\"b\") > ? AND \"c\" <> ?".into(),
            params: vec![Value::BigInt(3), Value::from("z")],
        });
        let (sql, params) = e.to_sql(Dialect::Postgres);
        assert_eq!(sql, "((\"a\" = $1) AND length(\"b\") > $2 AND \"c\" <> $3)");
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn test_aggregates_and_group_by() {
        let select = Select::from(TableRef::aliased("posts", "t0"))
            .item(Expr::qcol("t0", "authorId"), "__parent")
            .item(Expr::count_star(), "_count")
            .item(
                Expr::aggregate(AggregateFunc::Avg, Expr::qcol("t0", "viewCount")),
                "avg_viewCount",
            )
            .group_by(Expr::qcol("t0", "authorId"));
        let (sql, _) = select.to_sql(Dialect::Sqlite);
        assert!(sql.contains("COUNT(*) AS \"_count\""));
        assert!(sql.contains("AVG(\"t0\".\"viewCount\") AS \"avg_viewCount\""));
        assert!(sql.ends_with("GROUP BY \"t0\".\"authorId\""));
        assert!(
            select
                .to_sql(Dialect::Postgres)
                .0
                .contains("AVG(CAST(\"t0\".\"viewCount\" AS DOUBLE PRECISION))")
        );
    }

    #[test]
    fn test_concat_per_dialect() {
        let e = Expr::Concat(vec![Expr::col("a"), Expr::lit(": "), Expr::col("b")]);
        assert_eq!(e.to_sql(Dialect::Postgres).0, "(\"a\" || $1 || \"b\")");
        assert_eq!(e.to_sql(Dialect::Mysql).0, "CONCAT(`a`, ?, `b`)");
    }

    #[test]
    fn test_create_table_uses_ddl_generator() {
        let mut table = TableSchema::new("tags");
        table.columns.push(ColumnDef::new("id", SqlType::Text).not_null());
        table.primary_key.push("id".into());
        let (sql, params) = Statement::CreateTable(table).to_sql(Dialect::Sqlite);
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS \"tags\""));
        assert!(params.is_empty());
    }
}
