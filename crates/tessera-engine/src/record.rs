//! Resolved records.

use std::collections::BTreeMap;

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value as Json;
use tessera_core::{Row, Value, columns};

/// A record as returned to callers: its fields plus any loaded relations.
///
/// Serializes to a single JSON object with relations inline under their
/// names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    pub fields: Row,
    pub relations: BTreeMap<String, Related>,
}

impl Record {
    pub fn new(fields: Row) -> Self {
        Self {
            fields,
            relations: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.fields.get_str(columns::ID)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.fields.get_str(field)
    }

    pub fn get_i64(&self, field: &str) -> Option<i64> {
        self.fields.get(field).and_then(Value::as_i64)
    }

    pub fn related(&self, relation: &str) -> Option<&Related> {
        self.relations.get(relation)
    }

    /// The loaded to-one record, if present.
    pub fn one(&self, relation: &str) -> Option<&Record> {
        match self.relations.get(relation) {
            Some(Related::One(Some(record))) => Some(record),
            _ => None,
        }
    }

    /// The loaded to-many records; empty when not loaded.
    pub fn many(&self, relation: &str) -> &[Record] {
        match self.relations.get(relation) {
            Some(Related::Many(docs) | Related::ListWithAggregate { docs, .. }) => docs,
            _ => &[],
        }
    }

    pub fn aggregate(&self, relation: &str) -> Option<&AggregateResult> {
        match self.relations.get(relation) {
            Some(Related::Aggregate(aggregate) | Related::ListWithAggregate { aggregate, .. }) => {
                Some(aggregate)
            }
            _ => None,
        }
    }

    pub fn to_json(&self) -> Json {
        serde_json::to_value(self).unwrap_or(Json::Null)
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len() + self.relations.len()))?;
        for (name, value) in self.fields.iter() {
            map.serialize_entry(name, value)?;
        }
        for (name, related) in &self.relations {
            map.serialize_entry(name, related)?;
        }
        map.end()
    }
}

/// A loaded relation.
#[derive(Debug, Clone, PartialEq)]
pub enum Related {
    /// To-one; `None` when the reference is empty or dangling.
    One(Option<Box<Record>>),
    /// To-many list.
    Many(Vec<Record>),
    /// Aggregate-only request.
    Aggregate(AggregateResult),
    /// Record list plus aggregate over the whole filtered set.
    ListWithAggregate {
        docs: Vec<Record>,
        aggregate: AggregateResult,
    },
}

impl Serialize for Related {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Related::One(record) => record.serialize(serializer),
            Related::Many(docs) => docs.serialize(serializer),
            Related::Aggregate(aggregate) => aggregate.serialize(serializer),
            Related::ListWithAggregate { docs, aggregate } => {
                let mut map = serializer.serialize_map(None)?;
                map.serialize_entry("docs", docs)?;
                aggregate.serialize_entries(&mut map)?;
                map.end()
            }
        }
    }
}

/// Aggregates over a related set.
///
/// `count` is always present. Requested `_sum`/`_avg` default to zero and
/// `_min`/`_max` to NULL when nothing matched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateResult {
    pub count: u64,
    pub sum: BTreeMap<String, Value>,
    pub avg: BTreeMap<String, Value>,
    pub min: BTreeMap<String, Value>,
    pub max: BTreeMap<String, Value>,
}

impl AggregateResult {
    fn serialize_entries<M: SerializeMap>(&self, map: &mut M) -> Result<(), M::Error> {
        map.serialize_entry("_count", &self.count)?;
        for (key, values) in [
            ("_sum", &self.sum),
            ("_avg", &self.avg),
            ("_min", &self.min),
            ("_max", &self.max),
        ] {
            if !values.is_empty() {
                map.serialize_entry(key, values)?;
            }
        }
        Ok(())
    }
}

impl Serialize for AggregateResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        self.serialize_entries(&mut map)?;
        map.end()
    }
}
