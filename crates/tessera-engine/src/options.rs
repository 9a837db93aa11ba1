//! Read options.
//!
//! Every option can be built in code or parsed from the JSON shape HTTP
//! adapters receive:
//!
//! ```text
//! {
//!   "where": {...}, "columns": {...}, "orderBy": ..., "limit": 10, "offset": 0,
//!   "includeDeleted": false,
//!   "with": {
//!     "author": true,
//!     "comments": {"where": {...}, "limit": 3, "_count": true,
//!                  "_aggregate": {"_sum": {"likes": true}}}
//!   }
//! }
//! ```

use std::collections::BTreeMap;

use serde_json::Value as Json;
use tessera_core::{Error, Expr, Result, ValidationErrorKind};
use tessera_query::{ColumnSelection, OrderBy, Where};

/// Relations to load, by name.
pub type WithSpec = BTreeMap<String, RelationQuery>;

fn malformed(option: &str, message: impl Into<String>) -> Error {
    Error::validation(option, ValidationErrorKind::Query, message)
}

fn parse_u64(option: &str, json: &Json) -> Result<u64> {
    json.as_u64()
        .ok_or_else(|| malformed(option, format!("{option} must be a non-negative integer")))
}

fn parse_bool(option: &str, json: &Json) -> Result<bool> {
    json.as_bool()
        .ok_or_else(|| malformed(option, format!("{option} must be a boolean")))
}

fn parse_object<'j>(option: &str, json: &'j Json) -> Result<&'j serde_json::Map<String, Json>> {
    json.as_object()
        .ok_or_else(|| malformed(option, format!("{option} must be an object")))
}

fn parse_with(json: &Json) -> Result<WithSpec> {
    parse_object("with", json)?
        .iter()
        .map(|(name, query)| Ok((name.clone(), RelationQuery::from_json(query)?)))
        .collect()
}

/// Options of `find` and `find_one`.
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    pub filter: Option<Where>,
    pub columns: Option<ColumnSelection>,
    pub with: WithSpec,
    /// Defaults to identity order.
    pub order_by: Option<OrderBy>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    /// Extra computed outputs over logical fields, by output name.
    pub extras: Vec<(String, Expr)>,
    pub include_deleted: bool,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Where) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn columns(mut self, columns: ColumnSelection) -> Self {
        self.columns = Some(columns);
        self
    }

    pub fn with(mut self, relation: impl Into<String>, query: RelationQuery) -> Self {
        self.with.insert(relation.into(), query);
        self
    }

    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order_by = Some(order);
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

    pub fn extra(mut self, name: impl Into<String>, expr: Expr) -> Self {
        self.extras.push((name.into(), expr));
        self
    }

    pub fn include_deleted(mut self, include: bool) -> Self {
        self.include_deleted = include;
        self
    }

    /// Parse the JSON option object. Extras can only be built in code.
    pub fn from_json(json: &Json) -> Result<Self> {
        let mut options = Self::new();
        for (key, value) in parse_object("options", json)? {
            match key.as_str() {
                "where" => options.filter = Some(Where::from_json(value)?),
                "columns" => options.columns = Some(ColumnSelection::from_json(value)?),
                "with" => options.with = parse_with(value)?,
                "orderBy" => options.order_by = Some(OrderBy::from_json(value)?),
                "limit" => options.limit = Some(parse_u64(key, value)?),
                "offset" => options.offset = Some(parse_u64(key, value)?),
                "includeDeleted" => options.include_deleted = parse_bool(key, value)?,
                other => return Err(malformed(other, format!("unknown find option '{other}'"))),
            }
        }
        Ok(options)
    }
}

/// Options of `count`.
#[derive(Debug, Clone, Default)]
pub struct CountOptions {
    pub filter: Option<Where>,
    pub include_deleted: bool,
}

impl CountOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Where) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn include_deleted(mut self, include: bool) -> Self {
        self.include_deleted = include;
        self
    }

    pub fn from_json(json: &Json) -> Result<Self> {
        let mut options = Self::new();
        for (key, value) in parse_object("options", json)? {
            match key.as_str() {
                "where" => options.filter = Some(Where::from_json(value)?),
                "includeDeleted" => options.include_deleted = parse_bool(key, value)?,
                other => return Err(malformed(other, format!("unknown count option '{other}'"))),
            }
        }
        Ok(options)
    }
}

/// Aggregates requested over a to-many relation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregateRequest {
    /// Always reported; kept for the request shape.
    pub count: bool,
    pub sum: Vec<String>,
    pub avg: Vec<String>,
    pub min: Vec<String>,
    pub max: Vec<String>,
}

impl AggregateRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(mut self) -> Self {
        self.count = true;
        self
    }

    pub fn sum(mut self, field: impl Into<String>) -> Self {
        self.sum.push(field.into());
        self
    }

    pub fn avg(mut self, field: impl Into<String>) -> Self {
        self.avg.push(field.into());
        self
    }

    pub fn min(mut self, field: impl Into<String>) -> Self {
        self.min.push(field.into());
        self
    }

    pub fn max(mut self, field: impl Into<String>) -> Self {
        self.max.push(field.into());
        self
    }

    /// Parse `{"_count": true, "_sum": {"field": true}, ...}`.
    pub fn from_json(json: &Json) -> Result<Self> {
        let mut request = Self::new();
        for (key, value) in parse_object("_aggregate", json)? {
            let target = match key.as_str() {
                "_count" => {
                    request.count = parse_bool(key, value)?;
                    continue;
                }
                "_sum" => &mut request.sum,
                "_avg" => &mut request.avg,
                "_min" => &mut request.min,
                "_max" => &mut request.max,
                other => return Err(malformed(other, format!("unknown aggregate '{other}'"))),
            };
            for (field, flag) in parse_object(key, value)? {
                if parse_bool(field, flag)? {
                    target.push(field.clone());
                }
            }
        }
        Ok(request)
    }
}

/// How one relation is loaded.
///
/// A query with no aggregate loads records. With an aggregate and no record
/// shaping (`columns`, `orderBy`, `limit`, `offset`, `with`) it loads only
/// the aggregate; with both it loads both.
#[derive(Debug, Clone, Default)]
pub struct RelationQuery {
    pub filter: Option<Where>,
    pub columns: Option<ColumnSelection>,
    pub order_by: Option<OrderBy>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub with: WithSpec,
    pub aggregate: Option<AggregateRequest>,
}

impl RelationQuery {
    /// Load the related records with default shaping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Only count the related records.
    pub fn counted() -> Self {
        Self::new().aggregate(AggregateRequest::new().count())
    }

    pub fn filter(mut self, filter: Where) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn columns(mut self, columns: ColumnSelection) -> Self {
        self.columns = Some(columns);
        self
    }

    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order_by = Some(order);
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

    pub fn with(mut self, relation: impl Into<String>, query: RelationQuery) -> Self {
        self.with.insert(relation.into(), query);
        self
    }

    pub fn aggregate(mut self, request: AggregateRequest) -> Self {
        self.aggregate = Some(request);
        self
    }

    fn is_shaped(&self) -> bool {
        self.columns.is_some()
            || self.order_by.is_some()
            || self.limit.is_some()
            || self.offset.is_some()
            || !self.with.is_empty()
    }

    /// Whether the record list is requested.
    pub fn wants_records(&self) -> bool {
        self.aggregate.is_none() || self.is_shaped()
    }

    /// Parse `true` or the relation option object.
    pub fn from_json(json: &Json) -> Result<Self> {
        if let Json::Bool(true) = json {
            return Ok(Self::new());
        }
        let mut query = Self::new();
        let mut aggregate: Option<AggregateRequest> = None;
        for (key, value) in parse_object("with", json)? {
            match key.as_str() {
                "where" => query.filter = Some(Where::from_json(value)?),
                "columns" => query.columns = Some(ColumnSelection::from_json(value)?),
                "orderBy" => query.order_by = Some(OrderBy::from_json(value)?),
                "limit" => query.limit = Some(parse_u64(key, value)?),
                "offset" => query.offset = Some(parse_u64(key, value)?),
                "with" => query.with = parse_with(value)?,
                "_count" => {
                    if parse_bool(key, value)? {
                        aggregate.get_or_insert_with(AggregateRequest::new).count = true;
                    }
                }
                "_aggregate" => {
                    let parsed = AggregateRequest::from_json(value)?;
                    let merged = aggregate.get_or_insert_with(AggregateRequest::new);
                    merged.count |= parsed.count;
                    merged.sum.extend(parsed.sum);
                    merged.avg.extend(parsed.avg);
                    merged.min.extend(parsed.min);
                    merged.max.extend(parsed.max);
                }
                other => {
                    return Err(malformed(other, format!("unknown relation option '{other}'")));
                }
            }
        }
        query.aggregate = aggregate;
        Ok(query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_find_options_from_json() {
        let options = FindOptions::from_json(&json!({
            "where": {"status": "published"},
            "orderBy": {"viewCount": "desc"},
            "limit": 2,
            "includeDeleted": true,
            "with": {"author": true, "comments": {"limit": 3}},
        }))
        .unwrap();
        assert_eq!(options.limit, Some(2));
        assert!(options.include_deleted);
        assert!(options.filter.is_some());
        assert_eq!(options.with.len(), 2);
        assert_eq!(options.with["comments"].limit, Some(3));
    }

    #[test]
    fn test_unknown_option_rejected() {
        let err = FindOptions::from_json(&json!({"limt": 2})).unwrap_err();
        assert!(err.is_validation());
        let err = FindOptions::from_json(&json!({"limit": -1})).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_relation_request_shapes() {
        let plain = RelationQuery::from_json(&json!(true)).unwrap();
        assert!(plain.wants_records());
        assert!(plain.aggregate.is_none());

        let counted = RelationQuery::from_json(&json!({"_count": true})).unwrap();
        assert!(!counted.wants_records());
        assert!(counted.aggregate.as_ref().is_some_and(|a| a.count));

        let both = RelationQuery::from_json(&json!({
            "limit": 2,
            "_aggregate": {"_sum": {"likes": true}, "_max": {"likes": true, "score": false}},
        }))
        .unwrap();
        assert!(both.wants_records());
        let aggregate = both.aggregate.unwrap();
        assert_eq!(aggregate.sum, vec!["likes".to_string()]);
        assert_eq!(aggregate.max, vec!["likes".to_string()]);
    }
}
