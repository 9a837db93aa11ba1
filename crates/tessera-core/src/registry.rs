//! The frozen set of collections.

use std::collections::{BTreeMap, BTreeSet};

use crate::collection::{Collection, columns};
use crate::error::{Error, Result};
use crate::relationship::{RelationGraph, RelationKind};
use crate::validate::validate_pattern;

/// Validated collections plus their relation graph.
///
/// Built once at startup and shared read-only (behind an `Arc`) by every
/// operation.
#[derive(Debug, Clone)]
pub struct Registry {
    collections: BTreeMap<String, Collection>,
    graph: RelationGraph,
}

impl Registry {
    /// Validate `collections` and build the relation graph.
    pub fn new(collections: Vec<Collection>) -> Result<Self> {
        let mut map = BTreeMap::new();
        for collection in collections {
            if map.contains_key(&collection.name) {
                return Err(schema_error(format!(
                    "collection '{}' declared twice",
                    collection.name
                )));
            }
            map.insert(collection.name.clone(), collection);
        }

        for collection in map.values() {
            validate_collection(collection, &map)?;
        }

        let graph = RelationGraph::build(map.values());
        for (collection, relation) in graph.cycles() {
            tracing::debug!(
                collection = %collection,
                relation = %relation,
                "Relation participates in a reference cycle"
            );
        }
        tracing::debug!(collections = map.len(), "Registry built");

        Ok(Self {
            collections: map,
            graph,
        })
    }

    /// Look up a collection.
    pub fn get(&self, name: &str) -> Result<&Collection> {
        self.collections
            .get(name)
            .ok_or_else(|| schema_error(format!("unknown collection '{name}'")))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.collections.contains_key(name)
    }

    pub fn collections(&self) -> impl Iterator<Item = &Collection> {
        self.collections.values()
    }

    pub fn graph(&self) -> &RelationGraph {
        &self.graph
    }
}

fn schema_error(message: String) -> Error {
    Error::Schema(message)
}

fn validate_collection(collection: &Collection, all: &BTreeMap<String, Collection>) -> Result<()> {
    let name = &collection.name;
    let mut seen = BTreeSet::new();

    for field in &collection.fields {
        if columns::RESERVED.contains(&field.name.as_str()) {
            return Err(schema_error(format!(
                "{name}.{} uses a reserved column name",
                field.name
            )));
        }
        if !seen.insert(field.name.as_str()) {
            return Err(schema_error(format!("{name}.{} declared twice", field.name)));
        }
        if let Some(pattern) = &field.rules.pattern {
            if let Some(msg) = validate_pattern(pattern) {
                return Err(schema_error(format!("{name}.{}: {msg}", field.name)));
            }
        }
        if let Some(fk) = &field.references {
            if !all.contains_key(&fk.collection) {
                return Err(schema_error(format!(
                    "{name}.{} references unknown collection '{}'",
                    field.name, fk.collection
                )));
            }
            if field.localized {
                return Err(schema_error(format!(
                    "{name}.{} is localized and cannot carry a foreign key",
                    field.name
                )));
            }
        }
    }

    for computed in &collection.computed {
        if !seen.insert(computed.name.as_str()) {
            return Err(schema_error(format!(
                "{name}.{} clashes with another field",
                computed.name
            )));
        }
        for referenced in computed.expr.field_names() {
            if collection.get_field(&referenced).is_none()
                && !collection.is_main_column(&referenced)
            {
                return Err(schema_error(format!(
                    "computed field {name}.{} references unknown field '{referenced}'",
                    computed.name
                )));
            }
        }
    }

    for (rel_name, relation) in &collection.relations {
        if seen.contains(rel_name.as_str()) || columns::RESERVED.contains(&rel_name.as_str()) {
            return Err(schema_error(format!(
                "relation {name}.{rel_name} clashes with a field"
            )));
        }
        match &relation.kind {
            RelationKind::BelongsTo {
                target,
                foreign_key,
                references,
            } => {
                let target = lookup_target(all, target, name, rel_name)?;
                require_column(collection, foreign_key, rel_name)?;
                require_column(target, references, rel_name)?;
            }
            RelationKind::HasMany {
                target,
                foreign_key,
                references,
            } => {
                let target = lookup_target(all, target, name, rel_name)?;
                require_column(target, foreign_key, rel_name)?;
                require_column(collection, references, rel_name)?;
            }
            RelationKind::ManyToMany {
                target,
                through,
                source_key,
                target_key,
            } => {
                lookup_target(all, target, name, rel_name)?;
                let junction = lookup_target(all, through, name, rel_name)?;
                require_column(junction, source_key, rel_name)?;
                require_column(junction, target_key, rel_name)?;
                if junction.is_localized(source_key) || junction.is_localized(target_key) {
                    return Err(schema_error(format!(
                        "relation {name}.{rel_name}: junction keys cannot be localized"
                    )));
                }
            }
            RelationKind::Polymorphic {
                type_field,
                id_field,
                targets,
            } => {
                if targets.is_empty() {
                    return Err(schema_error(format!(
                        "polymorphic relation {name}.{rel_name} has no targets"
                    )));
                }
                for target in targets.values() {
                    lookup_target(all, target, name, rel_name)?;
                }
                require_column(collection, type_field, rel_name)?;
                require_column(collection, id_field, rel_name)?;
            }
        }
    }
    Ok(())
}

fn lookup_target<'a>(
    all: &'a BTreeMap<String, Collection>,
    target: &str,
    collection: &str,
    relation: &str,
) -> Result<&'a Collection> {
    all.get(target).ok_or_else(|| {
        schema_error(format!(
            "relation {collection}.{relation} targets unknown collection '{target}'"
        ))
    })
}

/// `column` must be a main-table column of `collection`.
fn require_column(collection: &Collection, column: &str, relation: &str) -> Result<()> {
    if collection.is_main_column(column) {
        Ok(())
    } else {
        Err(schema_error(format!(
            "relation '{relation}': {}.{column} is not a (non-localized) column",
            collection.name
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::FieldDef;
    use crate::relationship::Relation;

    #[test]
    fn test_unknown_target_rejected() {
        let err = Registry::new(vec![
            Collection::new("posts")
                .field(FieldDef::text("authorId"))
                .relation("author", Relation::belongs_to("users", "authorId")),
        ])
        .unwrap_err();
        assert!(matches!(err, Error::Schema(_)));
    }

    #[test]
    fn test_missing_foreign_key_rejected() {
        let err = Registry::new(vec![
            Collection::new("users"),
            Collection::new("posts").relation("author", Relation::belongs_to("users", "authorId")),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("authorId"));
    }

    #[test]
    fn test_relation_field_clash_rejected() {
        let err = Registry::new(vec![
            Collection::new("users"),
            Collection::new("posts")
                .field(FieldDef::text("author"))
                .relation("author", Relation::belongs_to("users", "author")),
        ])
        .unwrap_err();
        assert!(matches!(err, Error::Schema(_)));
    }

    #[test]
    fn test_self_reference_tolerated() {
        let registry = Registry::new(vec![
            Collection::new("categories")
                .field(FieldDef::text("parentCategoryId"))
                .relation("parent", Relation::belongs_to("categories", "parentCategoryId"))
                .relation("children", Relation::has_many("categories", "parentCategoryId")),
        ])
        .unwrap();
        assert_eq!(registry.graph().cycles().len(), 2);
        assert!(registry.get("categories").is_ok());
        assert!(registry.get("nope").is_err());
    }

    #[test]
    fn test_reserved_field_rejected() {
        let err = Registry::new(vec![Collection::new("x").field(FieldDef::text("id"))]).unwrap_err();
        assert!(err.to_string().contains("reserved"));
    }
}
