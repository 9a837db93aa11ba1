//! Write payloads.

use std::collections::BTreeMap;

use serde_json::Value as Json;
use tessera_core::{Error, Result, Row, Value, ValidationErrorKind};
use tessera_query::Where;

const DIRECTIVES: &[&str] = &["connect", "create", "connectOrCreate", "disconnect"];

fn malformed(relation: &str, message: impl Into<String>) -> Error {
    Error::validation(relation, ValidationErrorKind::Relation, message)
}

fn one_or_many(json: &Json) -> Vec<&Json> {
    match json {
        Json::Array(items) => items.iter().collect(),
        single => vec![single],
    }
}

/// A create or update payload: plain field values plus nested writes per
/// relation.
#[derive(Debug, Clone, Default)]
pub struct Data {
    pub fields: Row,
    pub relations: BTreeMap<String, NestedWrite>,
}

impl Data {
    pub fn new() -> Self {
        Self::default()
    }

    /// Payload of plain fields.
    pub fn from_row(fields: Row) -> Self {
        Self {
            fields,
            relations: BTreeMap::new(),
        }
    }

    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.set(field, value);
        self
    }

    /// Link existing records matching `filter`.
    pub fn connect(mut self, relation: impl Into<String>, filter: Where) -> Self {
        self.nested(relation).connect.push(filter);
        self
    }

    /// Create a related record.
    pub fn create(mut self, relation: impl Into<String>, data: Data) -> Self {
        self.nested(relation).create.push(data);
        self
    }

    /// Link the first record matching `filter`, creating it from `data` if
    /// none exists.
    pub fn connect_or_create(mut self, relation: impl Into<String>, filter: Where, data: Data) -> Self {
        self.nested(relation)
            .connect_or_create
            .push(ConnectOrCreate { filter, create: data });
        self
    }

    /// Unlink related records matching `filter` (updates only).
    pub fn disconnect(mut self, relation: impl Into<String>, filter: Where) -> Self {
        self.nested(relation).disconnect.push(filter);
        self
    }

    fn nested(&mut self, relation: impl Into<String>) -> &mut NestedWrite {
        self.relations.entry(relation.into()).or_default()
    }

    /// Parse a JSON payload.
    ///
    /// A key whose value is an object made only of `connect`, `create`,
    /// `connectOrCreate` and `disconnect` is a nested write; every other key
    /// is a field value.
    pub fn from_json(json: &Json) -> Result<Self> {
        let Json::Object(map) = json else {
            return Err(Error::validation(
                "data",
                ValidationErrorKind::Type,
                "payload must be an object",
            ));
        };
        let mut data = Self::new();
        for (key, value) in map {
            match value {
                Json::Object(inner)
                    if !inner.is_empty() && inner.keys().all(|k| DIRECTIVES.contains(&k.as_str())) =>
                {
                    data.relations
                        .insert(key.clone(), NestedWrite::from_json(key, inner)?);
                }
                other => {
                    data.fields.set(key.clone(), Value::from(other.clone()));
                }
            }
        }
        Ok(data)
    }
}

impl From<Row> for Data {
    fn from(fields: Row) -> Self {
        Self::from_row(fields)
    }
}

/// Lookup-or-create directive.
#[derive(Debug, Clone)]
pub struct ConnectOrCreate {
    /// Matched in full against the related collection.
    pub filter: Where,
    pub create: Data,
}

/// Nested writes on one relation, applied in the order connect, create,
/// connectOrCreate, disconnect.
#[derive(Debug, Clone, Default)]
pub struct NestedWrite {
    pub connect: Vec<Where>,
    pub create: Vec<Data>,
    pub connect_or_create: Vec<ConnectOrCreate>,
    pub disconnect: Vec<Where>,
}

impl NestedWrite {
    /// Number of records this write links.
    pub fn link_count(&self) -> usize {
        self.connect.len() + self.create.len() + self.connect_or_create.len()
    }

    fn from_json(relation: &str, map: &serde_json::Map<String, Json>) -> Result<Self> {
        let mut write = Self::default();
        for (directive, value) in map {
            match directive.as_str() {
                "connect" => {
                    for item in one_or_many(value) {
                        write.connect.push(Where::from_json(item)?);
                    }
                }
                "create" => {
                    for item in one_or_many(value) {
                        write.create.push(Data::from_json(item)?);
                    }
                }
                "connectOrCreate" => {
                    for item in one_or_many(value) {
                        let filter = item.get("where").ok_or_else(|| {
                            malformed(relation, "connectOrCreate requires 'where'")
                        })?;
                        let create = item.get("create").ok_or_else(|| {
                            malformed(relation, "connectOrCreate requires 'create'")
                        })?;
                        write.connect_or_create.push(ConnectOrCreate {
                            filter: Where::from_json(filter)?,
                            create: Data::from_json(create)?,
                        });
                    }
                }
                "disconnect" => match value {
                    Json::Bool(true) => write.disconnect.push(Where::all()),
                    Json::Bool(false) => {}
                    other => {
                        for item in one_or_many(other) {
                            write.disconnect.push(Where::from_json(item)?);
                        }
                    }
                },
                other => {
                    return Err(malformed(relation, format!("unknown nested write '{other}'")));
                }
            }
        }
        Ok(write)
    }
}
