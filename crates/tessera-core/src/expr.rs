//! Expression IR.
//!
//! Filters, computed fields, join conditions and projections are all [`Expr`]
//! trees. The IR is backend neutral: `tessera-query` renders it to SQL text for
//! a given dialect and `tessera-memory` evaluates it directly.
//!
//! [`Expr::Field`] is a *logical* field reference by name. It is only valid
//! before resolution; the query compiler rewrites every `Field` into a
//! physical [`Expr::Column`] (or a locale `COALESCE`) before a statement is
//! handed to a connection.

use crate::error::Result;
use crate::statement::Select;
use crate::value::Value;

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    And,
    Or,
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    /// SQL operator text.
    pub const fn as_str(&self) -> &'static str {
        match self {
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "<>",
            BinaryOp::Gt => ">",
            BinaryOp::Gte => ">=",
            BinaryOp::Lt => "<",
            BinaryOp::Lte => "<=",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
        }
    }

    /// Whether the operator yields a boolean from two comparable operands.
    pub const fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Gt | BinaryOp::Gte | BinaryOp::Lt | BinaryOp::Lte
        )
    }
}

/// Array set operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayOp {
    /// Left and right share at least one element (`&&`).
    Overlaps,
    /// Every element of left is in right (`<@`).
    ContainedBy,
    /// Left contains every element of right (`@>`).
    Contains,
}

/// Aggregate functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunc {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFunc {
    /// SQL function name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            AggregateFunc::Count => "COUNT",
            AggregateFunc::Sum => "SUM",
            AggregateFunc::Avg => "AVG",
            AggregateFunc::Min => "MIN",
            AggregateFunc::Max => "MAX",
        }
    }
}

/// An expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Physical column, optionally qualified by a table alias.
    Column { table: Option<String>, name: String },
    /// Logical field reference, resolved by the query compiler.
    Field(String),
    /// Bound value.
    Literal(Value),
    /// Binary operation.
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    /// Logical negation.
    Not(Box<Expr>),
    /// `IS NULL` / `IS NOT NULL`.
    IsNull { expr: Box<Expr>, negated: bool },
    /// `IN (a, b, ...)`. An empty list is false (true when negated).
    InList {
        expr: Box<Expr>,
        list: Vec<Expr>,
        negated: bool,
    },
    /// `IN (SELECT ...)`.
    InSubquery {
        expr: Box<Expr>,
        subquery: Box<Select>,
        negated: bool,
    },
    /// `EXISTS (SELECT ...)`.
    Exists { subquery: Box<Select>, negated: bool },
    /// `LIKE` with `%`/`_` wildcards and `\` as escape character.
    Like {
        expr: Box<Expr>,
        pattern: Box<Expr>,
        case_insensitive: bool,
        negated: bool,
    },
    /// Array set comparison.
    Array {
        left: Box<Expr>,
        op: ArrayOp,
        right: Box<Expr>,
    },
    /// First non-NULL argument.
    Coalesce(Vec<Expr>),
    /// String concatenation. NULL operands yield NULL.
    Concat(Vec<Expr>),
    /// Aggregate over the current group. `arg = None` means `COUNT(*)`.
    Aggregate {
        func: AggregateFunc,
        arg: Option<Box<Expr>>,
        distinct: bool,
    },
    /// Raw SQL fragment with its own parameters. Only renderable, never
    /// evaluated in-process.
    Raw { sql: String, params: Vec<Value> },
}

impl Expr {
    /// Unqualified column.
    pub fn col(name: impl Into<String>) -> Self {
        Expr::Column {
            table: None,
            name: name.into(),
        }
    }

    /// Column qualified by a table alias.
    pub fn qcol(table: impl Into<String>, name: impl Into<String>) -> Self {
        Expr::Column {
            table: Some(table.into()),
            name: name.into(),
        }
    }

    /// Logical field reference.
    pub fn field(name: impl Into<String>) -> Self {
        Expr::Field(name.into())
    }

    /// Literal value.
    pub fn lit(value: impl Into<Value>) -> Self {
        Expr::Literal(value.into())
    }

    /// Boolean literal.
    pub fn bool(value: bool) -> Self {
        Expr::Literal(Value::Bool(value))
    }

    /// Raw SQL fragment.
    pub fn raw(sql: impl Into<String>) -> Self {
        Expr::Raw {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    fn binary(self, op: BinaryOp, right: impl Into<Expr>) -> Self {
        Expr::Binary {
            left: Box::new(self),
            op,
            right: Box::new(right.into()),
        }
    }

    pub fn eq(self, right: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Eq, right)
    }

    pub fn ne(self, right: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Ne, right)
    }

    pub fn gt(self, right: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Gt, right)
    }

    pub fn gte(self, right: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Gte, right)
    }

    pub fn lt(self, right: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Lt, right)
    }

    pub fn lte(self, right: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Lte, right)
    }

    pub fn and(self, right: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::And, right)
    }

    pub fn or(self, right: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Or, right)
    }

    pub fn add(self, right: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Add, right)
    }

    /// Logical NOT.
    pub fn not(self) -> Self {
        Expr::Not(Box::new(self))
    }

    pub fn is_null(self) -> Self {
        Expr::IsNull {
            expr: Box::new(self),
            negated: false,
        }
    }

    pub fn is_not_null(self) -> Self {
        Expr::IsNull {
            expr: Box::new(self),
            negated: true,
        }
    }

    /// `self IN (values...)`.
    pub fn in_list(self, values: impl IntoIterator<Item = impl Into<Expr>>) -> Self {
        Expr::InList {
            expr: Box::new(self),
            list: values.into_iter().map(Into::into).collect(),
            negated: false,
        }
    }

    /// `self IN (subquery)`.
    pub fn in_subquery(self, subquery: Select) -> Self {
        Expr::InSubquery {
            expr: Box::new(self),
            subquery: Box::new(subquery),
            negated: false,
        }
    }

    /// `EXISTS (subquery)`.
    pub fn exists(subquery: Select) -> Self {
        Expr::Exists {
            subquery: Box::new(subquery),
            negated: false,
        }
    }

    /// `NOT EXISTS (subquery)`.
    pub fn not_exists(subquery: Select) -> Self {
        Expr::Exists {
            subquery: Box::new(subquery),
            negated: true,
        }
    }

    /// `COUNT(*)`.
    pub fn count_star() -> Self {
        Expr::Aggregate {
            func: AggregateFunc::Count,
            arg: None,
            distinct: false,
        }
    }

    /// Aggregate over an argument.
    pub fn aggregate(func: AggregateFunc, arg: Expr) -> Self {
        Expr::Aggregate {
            func,
            arg: Some(Box::new(arg)),
            distinct: false,
        }
    }

    /// AND together all expressions. Returns `None` for an empty input.
    pub fn and_all(exprs: impl IntoIterator<Item = Expr>) -> Option<Expr> {
        exprs.into_iter().reduce(|a, b| a.and(b))
    }

    /// OR together all expressions. Returns `None` for an empty input.
    pub fn or_any(exprs: impl IntoIterator<Item = Expr>) -> Option<Expr> {
        exprs.into_iter().reduce(|a, b| a.or(b))
    }

    /// Whether the tree still contains an unresolved [`Expr::Field`].
    /// Subqueries are not inspected.
    pub fn has_fields(&self) -> bool {
        let mut found = false;
        self.walk(&mut |e| {
            if matches!(e, Expr::Field(_)) {
                found = true;
            }
        });
        found
    }

    /// Names of every [`Expr::Field`] in the tree, outside subqueries.
    pub fn field_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.walk(&mut |e| {
            if let Expr::Field(name) = e {
                if !names.contains(name) {
                    names.push(name.clone());
                }
            }
        });
        names
    }

    fn walk(&self, f: &mut dyn FnMut(&Expr)) {
        f(self);
        match self {
            Expr::Binary { left, right, .. } | Expr::Array { left, right, .. } => {
                left.walk(f);
                right.walk(f);
            }
            Expr::Not(inner) | Expr::IsNull { expr: inner, .. } => inner.walk(f),
            Expr::InList { expr, list, .. } => {
                expr.walk(f);
                for item in list {
                    item.walk(f);
                }
            }
            Expr::InSubquery { expr, .. } => expr.walk(f),
            Expr::Like { expr, pattern, .. } => {
                expr.walk(f);
                pattern.walk(f);
            }
            Expr::Coalesce(items) | Expr::Concat(items) => {
                for item in items {
                    item.walk(f);
                }
            }
            Expr::Aggregate { arg: Some(arg), .. } => arg.walk(f),
            Expr::Column { .. }
            | Expr::Field(_)
            | Expr::Literal(_)
            | Expr::Exists { .. }
            | Expr::Aggregate { arg: None, .. }
            | Expr::Raw { .. } => {}
        }
    }

    /// Rewrite every [`Expr::Field`] through `resolve`. Subqueries are left
    /// untouched; they are expected to be resolved when built.
    pub fn resolve_fields(&self, resolve: &dyn Fn(&str) -> Result<Expr>) -> Result<Expr> {
        let boxed = |e: &Expr| -> Result<Box<Expr>> { Ok(Box::new(e.resolve_fields(resolve)?)) };
        Ok(match self {
            Expr::Field(name) => resolve(name)?,
            Expr::Binary { left, op, right } => Expr::Binary {
                left: boxed(left)?,
                op: *op,
                right: boxed(right)?,
            },
            Expr::Not(inner) => Expr::Not(boxed(inner)?),
            Expr::IsNull { expr, negated } => Expr::IsNull {
                expr: boxed(expr)?,
                negated: *negated,
            },
            Expr::InList {
                expr,
                list,
                negated,
            } => Expr::InList {
                expr: boxed(expr)?,
                list: list
                    .iter()
                    .map(|e| e.resolve_fields(resolve))
                    .collect::<Result<_>>()?,
                negated: *negated,
            },
            Expr::InSubquery {
                expr,
                subquery,
                negated,
            } => Expr::InSubquery {
                expr: boxed(expr)?,
                subquery: subquery.clone(),
                negated: *negated,
            },
            Expr::Like {
                expr,
                pattern,
                case_insensitive,
                negated,
            } => Expr::Like {
                expr: boxed(expr)?,
                pattern: boxed(pattern)?,
                case_insensitive: *case_insensitive,
                negated: *negated,
            },
            Expr::Array { left, op, right } => Expr::Array {
                left: boxed(left)?,
                op: *op,
                right: boxed(right)?,
            },
            Expr::Coalesce(items) => Expr::Coalesce(
                items
                    .iter()
                    .map(|e| e.resolve_fields(resolve))
                    .collect::<Result<_>>()?,
            ),
            Expr::Concat(items) => Expr::Concat(
                items
                    .iter()
                    .map(|e| e.resolve_fields(resolve))
                    .collect::<Result<_>>()?,
            ),
            Expr::Aggregate {
                func,
                arg,
                distinct,
            } => Expr::Aggregate {
                func: *func,
                arg: match arg {
                    Some(a) => Some(boxed(a)?),
                    None => None,
                },
                distinct: *distinct,
            },
            other => other.clone(),
        })
    }
}

impl From<Value> for Expr {
    fn from(value: Value) -> Self {
        Expr::Literal(value)
    }
}

impl From<&str> for Expr {
    fn from(value: &str) -> Self {
        Expr::Literal(Value::from(value))
    }
}

impl From<String> for Expr {
    fn from(value: String) -> Self {
        Expr::Literal(Value::Text(value))
    }
}

impl From<i64> for Expr {
    fn from(value: i64) -> Self {
        Expr::Literal(Value::BigInt(value))
    }
}

impl From<i32> for Expr {
    fn from(value: i32) -> Self {
        Expr::Literal(Value::from(value))
    }
}

impl From<f64> for Expr {
    fn from(value: f64) -> Self {
        Expr::Literal(Value::Double(value))
    }
}

impl From<bool> for Expr {
    fn from(value: bool) -> Self {
        Expr::Literal(Value::Bool(value))
    }
}

/// Escape `%`, `_` and `\` so that `s` matches literally inside a LIKE pattern.
pub fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}
