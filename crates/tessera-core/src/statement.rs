//! Statement IR: `SELECT`, `INSERT`, `UPDATE`, `DELETE` and `CREATE TABLE`.
//!
//! Statements are plain data. The engine builds them, connections execute
//! them. A SQL-speaking connection renders them with `tessera-query`.

use serde::{Deserialize, Serialize};

use crate::expr::Expr;
use crate::row::Row;
use crate::schema::TableSchema;

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    /// SQL keyword.
    pub const fn as_sql(&self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }

    /// Parse `asc`/`desc` (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Some(Direction::Asc),
            "desc" => Some(Direction::Desc),
            _ => None,
        }
    }
}

/// A table in a `FROM` or `JOIN` clause.
#[derive(Debug, Clone, PartialEq)]
pub struct TableRef {
    pub name: String,
    pub alias: Option<String>,
}

impl TableRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: None,
        }
    }

    pub fn aliased(name: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: Some(alias.into()),
        }
    }

    /// Name by which columns of this table are qualified.
    pub fn reference(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

/// Join kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
}

/// A join clause.
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub kind: JoinKind,
    pub table: TableRef,
    pub on: Expr,
}

impl Join {
    pub fn left(table: TableRef, on: Expr) -> Self {
        Self {
            kind: JoinKind::Left,
            table,
            on,
        }
    }

    pub fn inner(table: TableRef, on: Expr) -> Self {
        Self {
            kind: JoinKind::Inner,
            table,
            on,
        }
    }
}

/// A projected item.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectItem {
    /// `alias.*`, or `*` of the `FROM` table when `None`.
    All(Option<String>),
    /// `expr AS alias`.
    Expr { expr: Expr, alias: String },
}

/// An `ORDER BY` term.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderTerm {
    pub expr: Expr,
    pub direction: Direction,
}

impl OrderTerm {
    pub fn asc(expr: Expr) -> Self {
        Self {
            expr,
            direction: Direction::Asc,
        }
    }

    pub fn desc(expr: Expr) -> Self {
        Self {
            expr,
            direction: Direction::Desc,
        }
    }
}

/// Per-partition row window (`ROW_NUMBER() OVER (PARTITION BY ...)`).
///
/// Rows are numbered within each partition using the select's `ORDER BY`;
/// only rows numbered `offset + 1 ..= offset + limit` are returned.
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionWindow {
    pub partition_by: Vec<Expr>,
    pub limit: Option<u64>,
    pub offset: u64,
}

/// Output columns with this prefix are internal and stripped from results.
pub const INTERNAL_COLUMN_PREFIX: &str = "__";

/// A `SELECT` statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    pub from: TableRef,
    pub joins: Vec<Join>,
    pub items: Vec<SelectItem>,
    pub distinct: bool,
    pub filter: Option<Expr>,
    pub group_by: Vec<Expr>,
    pub order_by: Vec<OrderTerm>,
    pub window: Option<PartitionWindow>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl Select {
    /// `SELECT <nothing> FROM table`. Add items with [`Select::item`] or
    /// [`Select::all`].
    pub fn from(table: TableRef) -> Self {
        Self {
            from: table,
            joins: Vec::new(),
            items: Vec::new(),
            distinct: false,
            filter: None,
            group_by: Vec::new(),
            order_by: Vec::new(),
            window: None,
            limit: None,
            offset: None,
        }
    }

    /// Project every column of the `FROM` table.
    pub fn all(mut self) -> Self {
        let alias = self.from.alias.clone();
        self.items.push(SelectItem::All(alias));
        self
    }

    /// Project `expr AS alias`.
    pub fn item(mut self, expr: Expr, alias: impl Into<String>) -> Self {
        self.items.push(SelectItem::Expr {
            expr,
            alias: alias.into(),
        });
        self
    }

    pub fn join(mut self, join: Join) -> Self {
        self.joins.push(join);
        self
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    /// AND `expr` into the filter.
    pub fn filter(mut self, expr: Expr) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(expr),
            None => expr,
        });
        self
    }

    /// AND an optional expression into the filter.
    pub fn filter_opt(self, expr: Option<Expr>) -> Self {
        match expr {
            Some(e) => self.filter(e),
            None => self,
        }
    }

    pub fn group_by(mut self, expr: Expr) -> Self {
        self.group_by.push(expr);
        self
    }

    pub fn order(mut self, term: OrderTerm) -> Self {
        self.order_by.push(term);
        self
    }

    pub fn window(mut self, window: PartitionWindow) -> Self {
        self.window = Some(window);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Whether any projected item is an aggregate or the select is grouped.
    pub fn is_aggregate(&self) -> bool {
        !self.group_by.is_empty()
            || self.items.iter().any(|item| {
                matches!(
                    item,
                    SelectItem::Expr {
                        expr: Expr::Aggregate { .. },
                        ..
                    }
                )
            })
    }
}

/// `INSERT INTO table (...) VALUES (...), ...`.
///
/// Rows may have different column sets; missing columns take their default.
#[derive(Debug, Clone, PartialEq)]
pub struct Insert {
    pub table: String,
    pub rows: Vec<Row>,
}

/// `UPDATE table SET ... WHERE ...`. Columns in `filter` are resolved against
/// the target table.
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub table: String,
    pub set: Row,
    pub filter: Option<Expr>,
}

/// `DELETE FROM table WHERE ...`.
#[derive(Debug, Clone, PartialEq)]
pub struct Delete {
    pub table: String,
    pub filter: Option<Expr>,
}

/// Any statement a connection can execute.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Insert(Insert),
    Update(Update),
    Delete(Delete),
    CreateTable(TableSchema),
}

impl Statement {
    pub fn insert(table: impl Into<String>, rows: Vec<Row>) -> Self {
        Statement::Insert(Insert {
            table: table.into(),
            rows,
        })
    }

    pub fn update(table: impl Into<String>, set: Row, filter: Option<Expr>) -> Self {
        Statement::Update(Update {
            table: table.into(),
            set,
            filter,
        })
    }

    pub fn delete(table: impl Into<String>, filter: Option<Expr>) -> Self {
        Statement::Delete(Delete {
            table: table.into(),
            filter,
        })
    }

    /// Target table name.
    pub fn table(&self) -> &str {
        match self {
            Statement::Insert(i) => &i.table,
            Statement::Update(u) => &u.table,
            Statement::Delete(d) => &d.table,
            Statement::CreateTable(t) => &t.name,
        }
    }

    /// Short verb for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Statement::Insert(_) => "insert",
            Statement::Update(_) => "update",
            Statement::Delete(_) => "delete",
            Statement::CreateTable(_) => "create_table",
        }
    }
}
