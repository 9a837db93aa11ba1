//! Collection declarations.
//!
//! A [`Collection`] is a plain data description of a record type: its fields,
//! relations, options, access rules and hooks. Collections are assembled with
//! the chained setters below, frozen into a [`crate::Registry`] at startup and
//! never mutated afterwards.
//!
//! # Example
//!
//! ```
//! use tessera_core::{Collection, FieldDef, Relation, CascadeAction};
//!
//! let posts = Collection::new("posts")
//!     .field(FieldDef::text("title").required().localized())
//!     .field(FieldDef::text("status").choices(["draft", "published"]))
//!     .field(FieldDef::integer("viewCount").default_value(0).min(0.0))
//!     .field(FieldDef::text("authorId"))
//!     .relation(
//!         "author",
//!         Relation::belongs_to("users", "authorId").on_delete(CascadeAction::Cascade),
//!     )
//!     .soft_delete(true)
//!     .versioned(Some(50));
//! assert!(posts.has_locales());
//! ```

use std::collections::BTreeMap;

use crate::access::{AccessArgs, AccessRules, Operation};
use crate::error::Result;
use crate::expr::Expr;
use crate::hooks::{HookContext, HookStage, Hooks};
use crate::relationship::Relation;
use crate::row::Row;
use crate::schema::ReferentialAction;
use crate::types::SqlType;
use crate::value::Value;

/// Reserved column names.
pub mod columns {
    pub const ID: &str = "id";
    pub const CREATED_AT: &str = "createdAt";
    pub const UPDATED_AT: &str = "updatedAt";
    pub const DELETED_AT: &str = "deletedAt";
    pub const PARENT_ID: &str = "parentId";
    pub const LOCALE: &str = "locale";
    pub const VERSION_ID: &str = "versionId";
    pub const VERSION_NUMBER: &str = "versionNumber";
    pub const VERSION_OPERATION: &str = "versionOperation";
    pub const VERSION_USER_ID: &str = "versionUserId";
    pub const VERSION_CREATED_AT: &str = "versionCreatedAt";

    /// Names a declared field may not use.
    pub const RESERVED: &[&str] = &[
        ID,
        CREATED_AT,
        UPDATED_AT,
        DELETED_AT,
        PARENT_ID,
        LOCALE,
        VERSION_ID,
        VERSION_NUMBER,
        VERSION_OPERATION,
        VERSION_USER_ID,
        VERSION_CREATED_AT,
    ];
}

/// Value constraints checked on every write.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldRules {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub pattern: Option<String>,
    pub choices: Vec<Value>,
}

/// Database-level foreign key declared on a field.
#[derive(Debug, Clone, PartialEq)]
pub struct ForeignKeyRef {
    pub collection: String,
    pub column: String,
    pub on_delete: ReferentialAction,
}

/// One declared field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    pub name: String,
    pub sql_type: SqlType,
    pub required: bool,
    pub unique: bool,
    /// Stored per locale in the locale shadow table.
    pub localized: bool,
    pub default: Option<Value>,
    pub rules: FieldRules,
    pub references: Option<ForeignKeyRef>,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, sql_type: SqlType) -> Self {
        Self {
            name: name.into(),
            sql_type,
            required: false,
            unique: false,
            localized: false,
            default: None,
            rules: FieldRules::default(),
            references: None,
        }
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, SqlType::Text)
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, SqlType::BigInt)
    }

    pub fn number(name: impl Into<String>) -> Self {
        Self::new(name, SqlType::Double)
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, SqlType::Bool)
    }

    pub fn timestamp(name: impl Into<String>) -> Self {
        Self::new(name, SqlType::Timestamp)
    }

    pub fn json(name: impl Into<String>) -> Self {
        Self::new(name, SqlType::Json)
    }

    pub fn text_array(name: impl Into<String>) -> Self {
        Self::new(name, SqlType::TextArray)
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn localized(mut self) -> Self {
        self.localized = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn min(mut self, min: f64) -> Self {
        self.rules.min = Some(min);
        self
    }

    pub fn max(mut self, max: f64) -> Self {
        self.rules.max = Some(max);
        self
    }

    pub fn min_length(mut self, len: usize) -> Self {
        self.rules.min_length = Some(len);
        self
    }

    pub fn max_length(mut self, len: usize) -> Self {
        self.rules.max_length = Some(len);
        self
    }

    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.rules.pattern = Some(pattern.into());
        self
    }

    pub fn choices<I, V>(mut self, choices: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.rules.choices = choices.into_iter().map(Into::into).collect();
        self
    }

    /// Declare a database-level foreign key to `collection.id`.
    pub fn references(mut self, collection: impl Into<String>, on_delete: ReferentialAction) -> Self {
        self.references = Some(ForeignKeyRef {
            collection: collection.into(),
            column: columns::ID.to_string(),
            on_delete,
        });
        self
    }
}

/// Version-history settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VersioningOptions {
    /// Keep at most this many versions per record, pruning the oldest.
    pub max_versions: Option<u32>,
}

/// Per-collection storage options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionOptions {
    pub timestamps: bool,
    pub soft_delete: bool,
    pub versioning: Option<VersioningOptions>,
}

impl Default for CollectionOptions {
    fn default() -> Self {
        Self {
            timestamps: true,
            soft_delete: false,
            versioning: None,
        }
    }
}

/// A read-only field computed from other fields.
#[derive(Debug, Clone, PartialEq)]
pub struct ComputedField {
    pub name: String,
    /// Expression over [`Expr::Field`] references.
    pub expr: Expr,
}

/// Whether a collection holds many records or exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CollectionKind {
    #[default]
    Collection,
    Global,
}

/// A declared record type.
#[derive(Debug, Clone)]
pub struct Collection {
    pub name: String,
    pub fields: Vec<FieldDef>,
    pub relations: BTreeMap<String, Relation>,
    pub options: CollectionOptions,
    pub access: AccessRules,
    pub hooks: Hooks,
    pub computed: Vec<ComputedField>,
    pub kind: CollectionKind,
}

impl Collection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            relations: BTreeMap::new(),
            options: CollectionOptions::default(),
            access: AccessRules::default(),
            hooks: Hooks::default(),
            computed: Vec::new(),
            kind: CollectionKind::Collection,
        }
    }

    /// A singleton collection.
    pub fn global(name: impl Into<String>) -> Self {
        let mut global = Self::new(name);
        global.kind = CollectionKind::Global;
        global
    }

    // ------------------------------------------------------------------
    // Declaration
    // ------------------------------------------------------------------

    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    pub fn relation(mut self, name: impl Into<String>, relation: Relation) -> Self {
        self.relations.insert(name.into(), relation);
        self
    }

    pub fn computed(mut self, name: impl Into<String>, expr: Expr) -> Self {
        self.computed.push(ComputedField {
            name: name.into(),
            expr,
        });
        self
    }

    pub fn timestamps(mut self, enabled: bool) -> Self {
        self.options.timestamps = enabled;
        self
    }

    pub fn soft_delete(mut self, enabled: bool) -> Self {
        self.options.soft_delete = enabled;
        self
    }

    /// Enable version history, optionally capped at `max_versions` per record.
    pub fn versioned(mut self, max_versions: Option<u32>) -> Self {
        self.options.versioning = Some(VersioningOptions { max_versions });
        self
    }

    /// Install the access predicate for `operation`.
    pub fn access<F>(mut self, operation: Operation, check: F) -> Self
    where
        F: Fn(&AccessArgs<'_>) -> bool + Send + Sync + 'static,
    {
        self.access.set(operation, check);
        self
    }

    pub fn before_create<F>(mut self, hook: F) -> Self
    where
        F: Fn(&HookContext, Row) -> Result<Row> + Send + Sync + 'static,
    {
        self.hooks.add_before(HookStage::BeforeCreate, hook);
        self
    }

    pub fn before_update<F>(mut self, hook: F) -> Self
    where
        F: Fn(&HookContext, Row) -> Result<Row> + Send + Sync + 'static,
    {
        self.hooks.add_before(HookStage::BeforeUpdate, hook);
        self
    }

    pub fn before_delete<F>(mut self, hook: F) -> Self
    where
        F: Fn(&HookContext, Row) -> Result<Row> + Send + Sync + 'static,
    {
        self.hooks.add_before(HookStage::BeforeDelete, hook);
        self
    }

    pub fn after_create<F>(mut self, hook: F) -> Self
    where
        F: Fn(&HookContext, &Row) -> Result<()> + Send + Sync + 'static,
    {
        self.hooks.add_after(HookStage::AfterCreate, hook);
        self
    }

    pub fn after_update<F>(mut self, hook: F) -> Self
    where
        F: Fn(&HookContext, &Row) -> Result<()> + Send + Sync + 'static,
    {
        self.hooks.add_after(HookStage::AfterUpdate, hook);
        self
    }

    pub fn after_delete<F>(mut self, hook: F) -> Self
    where
        F: Fn(&HookContext, &Row) -> Result<()> + Send + Sync + 'static,
    {
        self.hooks.add_after(HookStage::AfterDelete, hook);
        self
    }

    // ------------------------------------------------------------------
    // Lookups
    // ------------------------------------------------------------------

    pub fn get_field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn get_relation(&self, name: &str) -> Option<&Relation> {
        self.relations.get(name)
    }

    pub fn get_computed(&self, name: &str) -> Option<&ComputedField> {
        self.computed.iter().find(|c| c.name == name)
    }

    pub fn is_global(&self) -> bool {
        self.kind == CollectionKind::Global
    }

    pub fn has_timestamps(&self) -> bool {
        self.options.timestamps
    }

    pub fn has_soft_delete(&self) -> bool {
        self.options.soft_delete
    }

    pub fn is_versioned(&self) -> bool {
        self.options.versioning.is_some()
    }

    pub fn max_versions(&self) -> Option<u32> {
        self.options.versioning.and_then(|v| v.max_versions)
    }

    /// Names of the fields stored per locale.
    pub fn localized_field_names(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|f| f.localized)
            .map(|f| f.name.as_str())
            .collect()
    }

    pub fn is_localized(&self, field: &str) -> bool {
        self.get_field(field).is_some_and(|f| f.localized)
    }

    /// Whether the collection has a locale shadow table.
    pub fn has_locales(&self) -> bool {
        self.fields.iter().any(|f| f.localized)
    }

    /// Declared fields stored on the main table.
    pub fn main_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.iter().filter(|f| !f.localized)
    }

    /// Every physical column of the main table, in layout order.
    pub fn main_columns(&self) -> Vec<&str> {
        let mut cols = vec![columns::ID];
        cols.extend(self.main_fields().map(|f| f.name.as_str()));
        if self.has_timestamps() {
            cols.push(columns::CREATED_AT);
            cols.push(columns::UPDATED_AT);
        }
        if self.has_soft_delete() {
            cols.push(columns::DELETED_AT);
        }
        cols
    }

    /// Whether `name` is a physical main-table column.
    pub fn is_main_column(&self, name: &str) -> bool {
        self.main_columns().contains(&name)
    }

    /// Whether `name` can be read (main column, localized field or computed).
    pub fn is_readable(&self, name: &str) -> bool {
        self.is_main_column(name) || self.is_localized(name) || self.get_computed(name).is_some()
    }

    /// Every readable output name: main columns, localized fields, computed.
    pub fn readable_names(&self) -> Vec<&str> {
        let mut names = self.main_columns();
        names.extend(self.localized_field_names());
        names.extend(self.computed.iter().map(|c| c.name.as_str()));
        names
    }

    pub fn main_table(&self) -> &str {
        &self.name
    }

    pub fn locale_table(&self) -> String {
        format!("{}_locales", self.name)
    }

    pub fn versions_table(&self) -> String {
        format!("{}_versions", self.name)
    }

    pub fn locale_versions_table(&self) -> String {
        format!("{}_locales_versions", self.name)
    }
}
