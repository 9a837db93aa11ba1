//! Sort specifications.

use std::fmt;
use std::sync::Arc;

use serde_json::Value as Json;
use tessera_core::{Direction, Error, Expr, OrderTerm, Result, ValidationErrorKind};

use crate::locale::Frame;

/// Caller-supplied ordering. Terms may use [`Expr::Field`] references; they
/// are resolved like any other field read.
pub type OrderFn = Arc<dyn Fn() -> Vec<OrderTerm> + Send + Sync>;

/// An `ORDER BY` request.
///
/// Ties are left in store order; no secondary key is added.
#[derive(Clone)]
pub enum OrderBy {
    /// `(field, direction)` pairs, most significant first.
    Fields(Vec<(String, Direction)>),
    Custom(OrderFn),
}

impl fmt::Debug for OrderBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderBy::Fields(fields) => f.debug_tuple("Fields").field(fields).finish(),
            OrderBy::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl OrderBy {
    pub fn asc(field: impl Into<String>) -> Self {
        OrderBy::Fields(vec![(field.into(), Direction::Asc)])
    }

    pub fn desc(field: impl Into<String>) -> Self {
        OrderBy::Fields(vec![(field.into(), Direction::Desc)])
    }

    /// Append a less significant key. No effect on a custom ordering.
    #[must_use]
    pub fn then(mut self, field: impl Into<String>, direction: Direction) -> Self {
        if let OrderBy::Fields(fields) = &mut self {
            fields.push((field.into(), direction));
        }
        self
    }

    pub fn custom<F>(order: F) -> Self
    where
        F: Fn() -> Vec<OrderTerm> + Send + Sync + 'static,
    {
        OrderBy::Custom(Arc::new(order))
    }

    /// Parse `{"field": "asc"|"desc"}`, an array of such objects, `"field"`
    /// or `"-field"` (descending), or an array of strings.
    pub fn from_json(json: &Json) -> Result<Self> {
        let mut fields = Vec::new();
        Self::collect(json, &mut fields)?;
        Ok(OrderBy::Fields(fields))
    }

    fn collect(json: &Json, out: &mut Vec<(String, Direction)>) -> Result<()> {
        match json {
            Json::String(s) => {
                out.push(match s.strip_prefix('-') {
                    Some(field) => (field.to_string(), Direction::Desc),
                    None => (s.clone(), Direction::Asc),
                });
                Ok(())
            }
            Json::Object(map) => {
                for (field, dir) in map {
                    let direction = dir.as_str().and_then(Direction::parse).ok_or_else(|| {
                        Error::validation(
                            field,
                            ValidationErrorKind::Query,
                            format!("invalid sort direction for '{field}'"),
                        )
                    })?;
                    out.push((field.clone(), direction));
                }
                Ok(())
            }
            Json::Array(items) => items.iter().try_for_each(|item| Self::collect(item, out)),
            _ => Err(Error::validation(
                "orderBy",
                ValidationErrorKind::Query,
                "orderBy must be an object, string or array",
            )),
        }
    }

    /// Physical order terms for `frame`.
    pub fn compile(&self, frame: &Frame<'_>) -> Result<Vec<OrderTerm>> {
        match self {
            OrderBy::Fields(fields) => fields
                .iter()
                .map(|(field, direction)| {
                    Ok(OrderTerm {
                        expr: frame.resolve(field)?,
                        direction: *direction,
                    })
                })
                .collect(),
            OrderBy::Custom(order) => order()
                .into_iter()
                .map(|term| {
                    Ok(OrderTerm {
                        expr: frame.resolve_expr(&term.expr)?,
                        direction: term.direction,
                    })
                })
                .collect(),
        }
    }

    /// Order by identity, ascending. Identities sort by creation time.
    pub fn by_identity() -> Self {
        OrderBy::asc(tessera_core::columns::ID)
    }
}

/// Order term over a logical field.
pub fn field_term(name: &str, direction: Direction) -> OrderTerm {
    OrderTerm {
        expr: Expr::field(name),
        direction,
    }
}
