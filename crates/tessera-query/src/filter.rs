//! Filter trees.
//!
//! A [`Where`] is the caller-facing predicate over one collection. Leaves
//! compare a field against a value, relation nodes quantify over related
//! records, and `And`/`Or`/`Not` compose. Trees arrive either built in Rust or
//! parsed from JSON with [`Where::from_json`]:
//!
//! ```text
//! { "status": "published",
//!   "viewCount": { "gte": 50 },
//!   "author": { "name": { "startsWith": "A" } },
//!   "tags": { "some": { "name": "rust" } },
//!   "OR": [ { "featured": true }, { "pinned": true } ] }
//! ```

use serde_json::Value as Json;
use tessera_core::{ArrayOp, Error, Expr, Result, Value, ValidationErrorKind, escape_like};

/// Comparison applied to one field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldOp {
    /// Equality; `Eq(Null)` is `IS NULL`.
    Eq(Value),
    /// SQL inequality (rows where the field is NULL never match);
    /// `Ne(Null)` is `IS NOT NULL`.
    Ne(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    In(Vec<Value>),
    NotIn(Vec<Value>),
    /// Raw LIKE pattern.
    Like(String),
    Ilike(String),
    NotLike(String),
    NotIlike(String),
    /// Case-sensitive substring match.
    Contains(String),
    StartsWith(String),
    EndsWith(String),
    /// `IsNull(true)` is `IS NULL`, `IsNull(false)` is `IS NOT NULL`.
    IsNull(bool),
    /// `IsNotNull(true)` is `IS NOT NULL`, `IsNotNull(false)` is `IS NULL`.
    IsNotNull(bool),
    /// Array field shares an element with the operand.
    ArrayOverlaps(Vec<Value>),
    /// Every element of the array field is in the operand.
    ArrayContained(Vec<Value>),
    /// The array field holds every element of the operand.
    ArrayContains(Vec<Value>),
}

/// Operator names accepted in JSON filters.
pub const OPERATORS: &[&str] = &[
    "eq",
    "ne",
    "gt",
    "gte",
    "lt",
    "lte",
    "in",
    "notIn",
    "like",
    "ilike",
    "notLike",
    "notIlike",
    "contains",
    "startsWith",
    "endsWith",
    "isNull",
    "isNotNull",
    "arrayOverlaps",
    "arrayContained",
    "arrayContains",
];

impl FieldOp {
    /// Apply the operator to the resolved field expression.
    pub fn apply(&self, field: Expr) -> Expr {
        match self {
            FieldOp::Eq(Value::Null) => field.is_null(),
            FieldOp::Ne(Value::Null) => field.is_not_null(),
            FieldOp::Eq(v) => field.eq(v.clone()),
            FieldOp::Ne(v) => field.ne(v.clone()),
            FieldOp::Gt(v) => field.gt(v.clone()),
            FieldOp::Gte(v) => field.gte(v.clone()),
            FieldOp::Lt(v) => field.lt(v.clone()),
            FieldOp::Lte(v) => field.lte(v.clone()),
            FieldOp::In(values) => field.in_list(values.iter().cloned().map(Expr::Literal)),
            FieldOp::NotIn(values) => Expr::InList {
                expr: Box::new(field),
                list: values.iter().cloned().map(Expr::Literal).collect(),
                negated: true,
            },
            FieldOp::Like(p) => like(field, p.clone(), false, false),
            FieldOp::Ilike(p) => like(field, p.clone(), true, false),
            FieldOp::NotLike(p) => like(field, p.clone(), false, true),
            FieldOp::NotIlike(p) => like(field, p.clone(), true, true),
            FieldOp::Contains(s) => like(field, format!("%{}%", escape_like(s)), false, false),
            FieldOp::StartsWith(s) => like(field, format!("{}%", escape_like(s)), false, false),
            FieldOp::EndsWith(s) => like(field, format!("%{}", escape_like(s)), false, false),
            FieldOp::IsNull(true) | FieldOp::IsNotNull(false) => field.is_null(),
            FieldOp::IsNull(false) | FieldOp::IsNotNull(true) => field.is_not_null(),
            FieldOp::ArrayOverlaps(v) => array(field, ArrayOp::Overlaps, v),
            FieldOp::ArrayContained(v) => array(field, ArrayOp::ContainedBy, v),
            FieldOp::ArrayContains(v) => array(field, ArrayOp::Contains, v),
        }
    }

    /// Parse `{op: operand}` entries.
    fn parse(field: &str, op: &str, operand: &Json) -> Result<Self> {
        let value = || Value::from(operand.clone());
        let text = || {
            operand
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| malformed(field, format!("'{op}' expects a string")))
        };
        let list = || -> Result<Vec<Value>> {
            match operand {
                Json::Array(items) => Ok(items.iter().cloned().map(Value::from).collect()),
                _ => Err(malformed(field, format!("'{op}' expects an array"))),
            }
        };
        let flag = || {
            operand
                .as_bool()
                .ok_or_else(|| malformed(field, format!("'{op}' expects a boolean")))
        };
        Ok(match op {
            "eq" => FieldOp::Eq(value()),
            "ne" => FieldOp::Ne(value()),
            "gt" => FieldOp::Gt(value()),
            "gte" => FieldOp::Gte(value()),
            "lt" => FieldOp::Lt(value()),
            "lte" => FieldOp::Lte(value()),
            "in" => FieldOp::In(list()?),
            "notIn" => FieldOp::NotIn(list()?),
            "like" => FieldOp::Like(text()?),
            "ilike" => FieldOp::Ilike(text()?),
            "notLike" => FieldOp::NotLike(text()?),
            "notIlike" => FieldOp::NotIlike(text()?),
            "contains" => FieldOp::Contains(text()?),
            "startsWith" => FieldOp::StartsWith(text()?),
            "endsWith" => FieldOp::EndsWith(text()?),
            "isNull" => FieldOp::IsNull(flag()?),
            "isNotNull" => FieldOp::IsNotNull(flag()?),
            "arrayOverlaps" => FieldOp::ArrayOverlaps(list()?),
            "arrayContained" => FieldOp::ArrayContained(list()?),
            "arrayContains" => FieldOp::ArrayContains(list()?),
            other => return Err(malformed(field, format!("unknown operator '{other}'"))),
        })
    }
}

fn like(field: Expr, pattern: String, case_insensitive: bool, negated: bool) -> Expr {
    Expr::Like {
        expr: Box::new(field),
        pattern: Box::new(Expr::lit(pattern)),
        case_insensitive,
        negated,
    }
}

fn array(field: Expr, op: ArrayOp, values: &[Value]) -> Expr {
    Expr::Array {
        left: Box::new(field),
        op,
        right: Box::new(Expr::Literal(Value::Array(values.to_vec()))),
    }
}

/// Relation quantifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantifier {
    /// At least one related record matches (to-many).
    Some,
    /// No related record matches (to-many).
    None,
    /// Every related record matches; true when there are none (to-many).
    Every,
    /// The related record exists and matches (to-one).
    Is,
    /// There is no matching related record, including no record at all
    /// (to-one).
    IsNot,
}

impl Quantifier {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Quantifier::Some => "some",
            Quantifier::None => "none",
            Quantifier::Every => "every",
            Quantifier::Is => "is",
            Quantifier::IsNot => "isNot",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "some" => Some(Quantifier::Some),
            "none" => Some(Quantifier::None),
            "every" => Some(Quantifier::Every),
            "is" => Some(Quantifier::Is),
            "isNot" => Some(Quantifier::IsNot),
            _ => None,
        }
    }

    /// Whether the quantifier applies to to-many relations.
    pub const fn is_to_many(&self) -> bool {
        matches!(self, Quantifier::Some | Quantifier::None | Quantifier::Every)
    }
}

/// A filter over one collection.
#[derive(Debug, Clone, PartialEq)]
pub enum Where {
    /// All must hold; empty is true.
    And(Vec<Where>),
    /// Any must hold; empty is false.
    Or(Vec<Where>),
    Not(Box<Where>),
    Field { field: String, op: FieldOp },
    Relation {
        relation: String,
        quantifier: Quantifier,
        filter: Option<Box<Where>>,
    },
    /// Trusted raw predicate over logical field references.
    Expr(Expr),
}

impl Default for Where {
    fn default() -> Self {
        Where::And(Vec::new())
    }
}

impl Where {
    /// Matches everything.
    pub fn all() -> Self {
        Where::default()
    }

    pub fn field(field: impl Into<String>, op: FieldOp) -> Self {
        Where::Field {
            field: field.into(),
            op,
        }
    }

    /// `field = value`.
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::field(field, FieldOp::Eq(value.into()))
    }

    pub fn and(filters: Vec<Where>) -> Self {
        Where::And(filters)
    }

    pub fn or(filters: Vec<Where>) -> Self {
        Where::Or(filters)
    }

    pub fn not(filter: Where) -> Self {
        Where::Not(Box::new(filter))
    }

    pub fn relation(relation: impl Into<String>, quantifier: Quantifier, filter: Option<Where>) -> Self {
        Where::Relation {
            relation: relation.into(),
            quantifier,
            filter: filter.map(Box::new),
        }
    }

    pub fn some(relation: impl Into<String>, filter: Where) -> Self {
        Self::relation(relation, Quantifier::Some, Some(filter))
    }

    pub fn none(relation: impl Into<String>, filter: Where) -> Self {
        Self::relation(relation, Quantifier::None, Some(filter))
    }

    pub fn every(relation: impl Into<String>, filter: Where) -> Self {
        Self::relation(relation, Quantifier::Every, Some(filter))
    }

    pub fn is(relation: impl Into<String>, filter: Where) -> Self {
        Self::relation(relation, Quantifier::Is, Some(filter))
    }

    pub fn is_not(relation: impl Into<String>, filter: Where) -> Self {
        Self::relation(relation, Quantifier::IsNot, Some(filter))
    }

    /// AND `other` onto this filter.
    #[must_use]
    pub fn and_also(self, other: Where) -> Self {
        match self {
            Where::And(mut items) => {
                items.push(other);
                Where::And(items)
            }
            single => Where::And(vec![single, other]),
        }
    }

    /// Whether the filter trivially matches everything.
    pub fn is_empty(&self) -> bool {
        matches!(self, Where::And(items) if items.is_empty())
    }

    /// Parse a JSON filter tree.
    ///
    /// Keys `AND`/`OR`/`NOT` compose. Any other key names a field or a
    /// relation: an object whose keys are all operators is a field
    /// comparison, an object whose keys are all quantifiers is a relation
    /// predicate, any other object is a to-one `is` predicate, and anything
    /// else is an equality (`null` meaning `IS NULL`).
    pub fn from_json(json: &Json) -> Result<Self> {
        let Json::Object(map) = json else {
            return Err(malformed("where", "filter must be an object"));
        };
        let mut parts = Vec::with_capacity(map.len());
        for (key, value) in map {
            match key.as_str() {
                "AND" => parts.push(Where::And(Self::list(key, value)?)),
                "OR" => parts.push(Where::Or(Self::list(key, value)?)),
                "NOT" => {
                    let inner = match value {
                        Json::Array(_) => Where::And(Self::list(key, value)?),
                        _ => Self::from_json(value)?,
                    };
                    parts.push(Where::not(inner));
                }
                _ => parts.push(Self::entry(key, value)?),
            }
        }
        Ok(if parts.len() == 1 {
            parts.remove(0)
        } else {
            Where::And(parts)
        })
    }

    fn list(key: &str, value: &Json) -> Result<Vec<Where>> {
        match value {
            Json::Array(items) => items.iter().map(Self::from_json).collect(),
            Json::Object(_) => Ok(vec![Self::from_json(value)?]),
            _ => Err(malformed(key, format!("'{key}' expects an array of filters"))),
        }
    }

    fn entry(key: &str, value: &Json) -> Result<Where> {
        let Json::Object(map) = value else {
            return Ok(Where::eq(key, Value::from(value.clone())));
        };
        if map.is_empty() {
            return Ok(Where::relation(key, Quantifier::Is, None));
        }
        if map.keys().all(|k| OPERATORS.contains(&k.as_str())) {
            let mut ops = map
                .iter()
                .map(|(op, operand)| Ok(Where::field(key, FieldOp::parse(key, op, operand)?)))
                .collect::<Result<Vec<_>>>()?;
            return Ok(if ops.len() == 1 {
                ops.remove(0)
            } else {
                Where::And(ops)
            });
        }
        if map.keys().all(|k| Quantifier::parse(k).is_some()) {
            let mut preds = Vec::with_capacity(map.len());
            for (q, inner) in map {
                let quantifier = Quantifier::parse(q).unwrap_or(Quantifier::Is);
                let filter = match inner {
                    Json::Null | Json::Bool(true) => None,
                    Json::Object(_) => Some(Self::from_json(inner)?),
                    _ => {
                        return Err(malformed(
                            key,
                            format!("'{q}' expects a filter object"),
                        ));
                    }
                };
                preds.push(Where::relation(key, quantifier, filter));
            }
            return Ok(if preds.len() == 1 {
                preds.remove(0)
            } else {
                Where::And(preds)
            });
        }
        Ok(Where::is(key, Self::from_json(value)?))
    }
}

fn malformed(field: &str, message: impl Into<String>) -> Error {
    Error::validation(field, ValidationErrorKind::Query, message)
}
