//! Relation declarations and the relation graph.
//!
//! A [`Relation`] is declared on a collection under a name. The
//! [`RelationGraph`] is built once by the [`crate::Registry`] and answers the
//! two questions the engine asks at runtime:
//!
//! - how do I join from a record of `collection` through `relation`
//!   ([`RelationGraph::resolve`]), and
//! - which records elsewhere must be visited when a record of `collection`
//!   is deleted ([`RelationGraph::dependents`]).
//!
//! Self and mutual references are allowed. [`RelationGraph::cycles`] reports
//! them; nothing ever expands a relation that the caller did not ask for.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::collection::{Collection, columns};
use crate::error::{Error, Result};

/// Application-level action applied to dependents when a record is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CascadeAction {
    /// Delete dependents through the full delete path.
    Cascade,
    /// Clear the dependents' reference through the update path.
    SetNull,
    /// Refuse the delete while dependents exist.
    Restrict,
}

impl CascadeAction {
    pub const fn as_str(&self) -> &'static str {
        match self {
            CascadeAction::Cascade => "cascade",
            CascadeAction::SetNull => "setNull",
            CascadeAction::Restrict => "restrict",
        }
    }
}

/// Whether a relation resolves to one record or many.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    One,
    Many,
}

/// The shape of a relation.
#[derive(Debug, Clone, PartialEq)]
pub enum RelationKind {
    /// This collection holds `foreign_key`, pointing at `target.references`.
    BelongsTo {
        target: String,
        foreign_key: String,
        references: String,
    },
    /// `target.foreign_key` points back at `self.references`.
    HasMany {
        target: String,
        foreign_key: String,
        references: String,
    },
    /// Linked through the junction collection `through`, whose `source_key`
    /// references this collection's id and `target_key` the target's id.
    ManyToMany {
        target: String,
        through: String,
        source_key: String,
        target_key: String,
    },
    /// `type_field` selects the target collection from `targets`;
    /// `id_field` holds the target's id.
    Polymorphic {
        type_field: String,
        id_field: String,
        targets: BTreeMap<String, String>,
    },
}

/// A relation declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct Relation {
    pub kind: RelationKind,
    pub on_delete: Option<CascadeAction>,
}

impl Relation {
    /// To-one relation through a foreign key on this collection.
    pub fn belongs_to(target: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        Self {
            kind: RelationKind::BelongsTo {
                target: target.into(),
                foreign_key: foreign_key.into(),
                references: columns::ID.to_string(),
            },
            on_delete: None,
        }
    }

    /// To-many relation through a foreign key on the target.
    pub fn has_many(target: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        Self {
            kind: RelationKind::HasMany {
                target: target.into(),
                foreign_key: foreign_key.into(),
                references: columns::ID.to_string(),
            },
            on_delete: None,
        }
    }

    /// To-many relation through a junction collection.
    pub fn many_to_many(
        target: impl Into<String>,
        through: impl Into<String>,
        source_key: impl Into<String>,
        target_key: impl Into<String>,
    ) -> Self {
        Self {
            kind: RelationKind::ManyToMany {
                target: target.into(),
                through: through.into(),
                source_key: source_key.into(),
                target_key: target_key.into(),
            },
            on_delete: None,
        }
    }

    /// To-one relation whose target collection is chosen by a discriminator.
    pub fn polymorphic<I, K, V>(
        type_field: impl Into<String>,
        id_field: impl Into<String>,
        targets: I,
    ) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            kind: RelationKind::Polymorphic {
                type_field: type_field.into(),
                id_field: id_field.into(),
                targets: targets
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            },
            on_delete: None,
        }
    }

    /// Override the referenced column (`belongsTo`/`hasMany`, default `id`).
    pub fn references(mut self, column: impl Into<String>) -> Self {
        match &mut self.kind {
            RelationKind::BelongsTo { references, .. } | RelationKind::HasMany { references, .. } => {
                *references = column.into();
            }
            RelationKind::ManyToMany { .. } | RelationKind::Polymorphic { .. } => {}
        }
        self
    }

    /// Set the application-level delete action.
    pub fn on_delete(mut self, action: CascadeAction) -> Self {
        self.on_delete = Some(action);
        self
    }

    pub fn cardinality(&self) -> Cardinality {
        match self.kind {
            RelationKind::BelongsTo { .. } | RelationKind::Polymorphic { .. } => Cardinality::One,
            RelationKind::HasMany { .. } | RelationKind::ManyToMany { .. } => Cardinality::Many,
        }
    }

    pub fn is_to_many(&self) -> bool {
        self.cardinality() == Cardinality::Many
    }

    /// Every collection this relation may point at.
    pub fn targets(&self) -> Vec<&str> {
        match &self.kind {
            RelationKind::BelongsTo { target, .. }
            | RelationKind::HasMany { target, .. }
            | RelationKind::ManyToMany { target, .. } => vec![target.as_str()],
            RelationKind::Polymorphic { targets, .. } => {
                let mut out: Vec<&str> = targets.values().map(String::as_str).collect();
                out.dedup();
                out
            }
        }
    }

    /// Short kind name for logs and errors.
    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            RelationKind::BelongsTo { .. } => "belongsTo",
            RelationKind::HasMany { .. } => "hasMany",
            RelationKind::ManyToMany { .. } => "manyToMany",
            RelationKind::Polymorphic { .. } => "polymorphic",
        }
    }
}

/// How to get from a parent record to its related records.
#[derive(Debug, Clone, PartialEq)]
pub enum JoinPath {
    /// `parent.local = target.remote`.
    Direct {
        target: String,
        local: String,
        remote: String,
    },
    /// `parent.id = through.source_key AND through.target_key = target.id`.
    Through {
        target: String,
        through: String,
        source_key: String,
        target_key: String,
    },
    /// `parent.type_field` names the target, `parent.id_field = target.id`.
    Polymorphic {
        type_field: String,
        id_field: String,
        targets: BTreeMap<String, String>,
    },
}

/// A relation looked up through the graph.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedRelation<'a> {
    /// Collection declaring the relation.
    pub collection: &'a str,
    /// Relation name.
    pub name: &'a str,
    pub relation: &'a Relation,
}

impl ResolvedRelation<'_> {
    pub fn cardinality(&self) -> Cardinality {
        self.relation.cardinality()
    }

    pub fn cascade(&self) -> Option<CascadeAction> {
        self.relation.on_delete
    }

    /// Join columns for this relation.
    pub fn join_path(&self) -> JoinPath {
        match &self.relation.kind {
            RelationKind::BelongsTo {
                target,
                foreign_key,
                references,
            } => JoinPath::Direct {
                target: target.clone(),
                local: foreign_key.clone(),
                remote: references.clone(),
            },
            RelationKind::HasMany {
                target,
                foreign_key,
                references,
            } => JoinPath::Direct {
                target: target.clone(),
                local: references.clone(),
                remote: foreign_key.clone(),
            },
            RelationKind::ManyToMany {
                target,
                through,
                source_key,
                target_key,
            } => JoinPath::Through {
                target: target.clone(),
                through: through.clone(),
                source_key: source_key.clone(),
                target_key: target_key.clone(),
            },
            RelationKind::Polymorphic {
                type_field,
                id_field,
                targets,
            } => JoinPath::Polymorphic {
                type_field: type_field.clone(),
                id_field: id_field.clone(),
                targets: targets.clone(),
            },
        }
    }
}

/// How dependent records are located from the record being deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependentKey {
    /// `dependent.column = deleted.references`.
    Column { column: String, references: String },
    /// Junction rows where `through.column = deleted.id`. The column is the
    /// source key on the declaring side and the target key on the other.
    Junction { through: String, column: String },
    /// `dependent.type_field = type_value AND dependent.id_field = deleted.id`.
    Polymorphic {
        type_field: String,
        type_value: String,
        id_field: String,
    },
}

/// Records that reference a collection and carry a delete action.
#[derive(Debug, Clone, PartialEq)]
pub struct Dependent {
    /// Collection holding the dependent records (the junction for
    /// [`DependentKey::Junction`]).
    pub collection: String,
    /// Collection that declared the relation.
    pub declared_on: String,
    /// Relation name.
    pub relation: String,
    pub key: DependentKey,
    pub action: CascadeAction,
}

/// Precomputed relation lookups.
#[derive(Debug, Clone, Default)]
pub struct RelationGraph {
    relations: BTreeMap<String, BTreeMap<String, Relation>>,
    dependents: BTreeMap<String, Vec<Dependent>>,
}

impl RelationGraph {
    /// Build the graph. Collections are assumed to have been validated.
    pub fn build<'a>(collections: impl IntoIterator<Item = &'a Collection>) -> Self {
        let collections: Vec<&Collection> = collections.into_iter().collect();
        let mut graph = RelationGraph {
            relations: collections
                .iter()
                .map(|c| (c.name.clone(), c.relations.clone()))
                .collect(),
            dependents: BTreeMap::new(),
        };

        for collection in &collections {
            let mut found: Vec<Dependent> = Vec::new();
            let mut push = |dep: Dependent| {
                if !found
                    .iter()
                    .any(|d| d.collection == dep.collection && d.key == dep.key)
                {
                    found.push(dep);
                }
            };

            // Declared on the collection itself.
            for (name, relation) in &collection.relations {
                let Some(action) = relation.on_delete else {
                    continue;
                };
                match &relation.kind {
                    RelationKind::HasMany {
                        target,
                        foreign_key,
                        references,
                    } => push(Dependent {
                        collection: target.clone(),
                        declared_on: collection.name.clone(),
                        relation: name.clone(),
                        key: DependentKey::Column {
                            column: foreign_key.clone(),
                            references: references.clone(),
                        },
                        action,
                    }),
                    RelationKind::ManyToMany {
                        through,
                        source_key,
                        ..
                    } => push(Dependent {
                        collection: through.clone(),
                        declared_on: collection.name.clone(),
                        relation: name.clone(),
                        key: DependentKey::Junction {
                            through: through.clone(),
                            column: source_key.clone(),
                        },
                        action,
                    }),
                    RelationKind::BelongsTo { .. } | RelationKind::Polymorphic { .. } => {}
                }
            }

            // Declared elsewhere, pointing here.
            for other in &collections {
                for (name, relation) in &other.relations {
                    let Some(action) = relation.on_delete else {
                        continue;
                    };
                    match &relation.kind {
                        RelationKind::BelongsTo {
                            target,
                            foreign_key,
                            references,
                        } if *target == collection.name => push(Dependent {
                            collection: other.name.clone(),
                            declared_on: other.name.clone(),
                            relation: name.clone(),
                            key: DependentKey::Column {
                                column: foreign_key.clone(),
                                references: references.clone(),
                            },
                            action,
                        }),
                        RelationKind::ManyToMany {
                            target,
                            through,
                            target_key,
                            ..
                        } if *target == collection.name => push(Dependent {
                            collection: through.clone(),
                            declared_on: other.name.clone(),
                            relation: name.clone(),
                            key: DependentKey::Junction {
                                through: through.clone(),
                                column: target_key.clone(),
                            },
                            action,
                        }),
                        RelationKind::Polymorphic {
                            type_field,
                            id_field,
                            targets,
                        } => {
                            for (type_value, target) in targets {
                                if *target == collection.name {
                                    push(Dependent {
                                        collection: other.name.clone(),
                                        declared_on: other.name.clone(),
                                        relation: name.clone(),
                                        key: DependentKey::Polymorphic {
                                            type_field: type_field.clone(),
                                            type_value: type_value.clone(),
                                            id_field: id_field.clone(),
                                        },
                                        action,
                                    });
                                }
                            }
                        }
                        _ => {}
                    }
                }
            }

            graph.dependents.insert(collection.name.clone(), found);
        }
        graph
    }

    /// Look up `collection.relation`.
    pub fn resolve<'a>(&'a self, collection: &'a str, relation: &'a str) -> Result<ResolvedRelation<'a>> {
        let rel = self
            .relations
            .get(collection)
            .and_then(|rels| rels.get(relation))
            .ok_or_else(|| {
                Error::validation(
                    relation,
                    crate::error::ValidationErrorKind::Relation,
                    format!("unknown relation '{relation}' on {collection}"),
                )
            })?;
        Ok(ResolvedRelation {
            collection,
            name: relation,
            relation: rel,
        })
    }

    /// Records that must be visited when a record of `collection` is deleted.
    pub fn dependents(&self, collection: &str) -> &[Dependent] {
        self.dependents
            .get(collection)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// `(collection, relation)` pairs whose target can reach back to the
    /// declaring collection.
    pub fn cycles(&self) -> Vec<(String, String)> {
        let mut out = Vec::new();
        for (collection, rels) in &self.relations {
            for (name, relation) in rels {
                if relation
                    .targets()
                    .iter()
                    .any(|t| self.reaches(t, collection))
                {
                    out.push((collection.clone(), name.clone()));
                }
            }
        }
        out
    }

    fn reaches(&self, from: &str, to: &str) -> bool {
        let mut seen: BTreeSet<&str> = BTreeSet::new();
        let mut queue: VecDeque<&str> = VecDeque::from([from]);
        while let Some(current) = queue.pop_front() {
            if current == to {
                return true;
            }
            if !seen.insert(current) {
                continue;
            }
            if let Some(rels) = self.relations.get(current) {
                for relation in rels.values() {
                    queue.extend(relation.targets());
                }
            }
        }
        false
    }
}
