//! Version history.
//!
//! Every committed create, update and delete of a versioned collection
//! appends a snapshot of the main row (and its locale rows) numbered
//! `1, 2, 3, ...` per record. `max_versions` prunes the oldest snapshots.

use std::collections::BTreeMap;

use serde::ser::{Serialize, SerializeMap, Serializer};
use tessera_core::{
    AggregateFunc, Collection, Connection, Direction, Error, Expr, HookStage, OrderTerm, Outcome,
    Result, Row, Select, Statement, TableRef, ValidationErrorKind, Value, columns, new_id, now,
    try_outcome, try_result,
};
use tessera_query::validate_limit;

use crate::changes::ChangeOperation;
use crate::op::Op;
use crate::state::State;

/// Operation recorded by a version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionOperation {
    Create,
    Update,
    Delete,
}

impl VersionOperation {
    pub const fn as_str(&self) -> &'static str {
        match self {
            VersionOperation::Create => "create",
            VersionOperation::Update => "update",
            VersionOperation::Delete => "delete",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "create" => Some(VersionOperation::Create),
            "update" => Some(VersionOperation::Update),
            "delete" => Some(VersionOperation::Delete),
            _ => None,
        }
    }
}

/// One stored version of a record.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionRecord {
    pub version_id: String,
    pub version_number: u64,
    pub operation: VersionOperation,
    pub user_id: Option<String>,
    pub created_at: String,
    /// Snapshot of the main row.
    pub fields: Row,
    /// Snapshot of the localized fields, by locale.
    pub locales: BTreeMap<String, Row>,
}

impl Serialize for VersionRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry(columns::VERSION_ID, &self.version_id)?;
        map.serialize_entry(columns::VERSION_NUMBER, &self.version_number)?;
        map.serialize_entry(columns::VERSION_OPERATION, self.operation.as_str())?;
        map.serialize_entry(columns::VERSION_USER_ID, &self.user_id)?;
        map.serialize_entry(columns::VERSION_CREATED_AT, &self.created_at)?;
        for (name, value) in self.fields.iter() {
            map.serialize_entry(name, value)?;
        }
        if !self.locales.is_empty() {
            map.serialize_entry("_locales", &self.locales)?;
        }
        map.end()
    }
}

/// Version to revert to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionRef {
    Number(u64),
    Id(String),
}

impl VersionRef {
    fn describe(&self) -> String {
        match self {
            VersionRef::Number(n) => format!("#{n}"),
            VersionRef::Id(id) => id.clone(),
        }
    }
}

/// Options of `find_versions`.
#[derive(Debug, Clone)]
pub struct FindVersionsOptions {
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    /// By version number; newest first by default.
    pub order: Direction,
}

impl Default for FindVersionsOptions {
    fn default() -> Self {
        Self {
            limit: None,
            offset: None,
            order: Direction::Desc,
        }
    }
}

impl FindVersionsOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn order(mut self, order: Direction) -> Self {
        self.order = order;
        self
    }
}

fn require_versioned(collection: &Collection) -> Result<()> {
    if collection.is_versioned() {
        Ok(())
    } else {
        Err(Error::validation(
            &collection.name,
            ValidationErrorKind::Query,
            format!("{} is not versioned", collection.name),
        ))
    }
}

fn number_of(row: &Row) -> u64 {
    row.get(columns::VERSION_NUMBER)
        .and_then(Value::as_i64)
        .map_or(0, |n| u64::try_from(n).unwrap_or(0))
}

fn version_from_row(mut row: Row) -> VersionRecord {
    let mut take = |column: &str| row.remove(column).unwrap_or(Value::Null);
    let version_id = take(columns::VERSION_ID);
    let version_number = take(columns::VERSION_NUMBER);
    let operation = take(columns::VERSION_OPERATION);
    let user_id = take(columns::VERSION_USER_ID);
    let created_at = take(columns::VERSION_CREATED_AT);
    VersionRecord {
        version_id: version_id.as_str().unwrap_or_default().to_string(),
        version_number: version_number
            .as_i64()
            .map_or(0, |n| u64::try_from(n).unwrap_or(0)),
        operation: operation
            .as_str()
            .and_then(VersionOperation::parse)
            .unwrap_or(VersionOperation::Update),
        user_id: user_id.as_str().map(str::to_string),
        created_at: created_at.as_str().unwrap_or_default().to_string(),
        fields: row,
        locales: BTreeMap::new(),
    }
}

fn number_literal(number: u64) -> Expr {
    Expr::lit(i64::try_from(number).unwrap_or(i64::MAX))
}

impl<'a, C: Connection> Op<'a, C> {
    /// Append the next version of `state`, then prune past `max_versions`.
    pub(crate) async fn append_version(
        &self,
        collection: &Collection,
        state: &State,
        operation: VersionOperation,
    ) -> Outcome<(), Error> {
        if !collection.is_versioned() {
            return Outcome::Ok(());
        }
        let id = state.id();
        let table = collection.versions_table();
        let latest = Select::from(TableRef::new(table.as_str()))
            .item(
                Expr::aggregate(AggregateFunc::Max, Expr::col(columns::VERSION_NUMBER)),
                "latest",
            )
            .filter(Expr::col(columns::ID).eq(id));
        let rows = try_outcome!(self.query(&latest).await);
        let number = rows
            .first()
            .and_then(|row| row.get("latest"))
            .and_then(Value::as_i64)
            .unwrap_or(0)
            + 1;

        let mut row = state.main.clone();
        row.set(columns::VERSION_ID, new_id());
        row.set(columns::VERSION_NUMBER, number);
        row.set(columns::VERSION_OPERATION, operation.as_str());
        row.set(
            columns::VERSION_USER_ID,
            self.ctx.user_id().map_or(Value::Null, Value::from),
        );
        row.set(columns::VERSION_CREATED_AT, now());
        try_outcome!(self.execute(&Statement::insert(table.as_str(), vec![row])).await);

        if collection.has_locales() && !state.locales.is_empty() {
            let localized = collection.localized_field_names();
            let rows = state
                .locales
                .iter()
                .map(|stored| {
                    let mut row = Row::new()
                        .with(columns::ID, new_id())
                        .with(columns::PARENT_ID, id)
                        .with(columns::VERSION_NUMBER, number)
                        .with(columns::LOCALE, stored.get_or_null(columns::LOCALE));
                    for name in &localized {
                        row.set(*name, stored.get_or_null(name));
                    }
                    row
                })
                .collect();
            let insert = Statement::insert(collection.locale_versions_table(), rows);
            try_outcome!(self.execute(&insert).await);
        }
        tracing::debug!(
            collection = %collection.name,
            id = %id,
            version = number,
            operation = operation.as_str(),
            "Version appended"
        );

        if let Some(max) = collection.max_versions() {
            let cutoff = number - i64::from(max);
            if cutoff > 0 {
                try_outcome!(self.prune_versions(collection, id, cutoff).await);
            }
        }
        Outcome::Ok(())
    }

    async fn prune_versions(
        &self,
        collection: &Collection,
        id: &str,
        cutoff: i64,
    ) -> Outcome<(), Error> {
        let stale = Expr::col(columns::VERSION_NUMBER).lte(cutoff);
        let delete = Statement::delete(
            collection.versions_table(),
            Some(Expr::col(columns::ID).eq(id).and(stale.clone())),
        );
        let pruned = try_outcome!(self.execute(&delete).await);
        if collection.has_locales() {
            let delete = Statement::delete(
                collection.locale_versions_table(),
                Some(Expr::col(columns::PARENT_ID).eq(id).and(stale)),
            );
            try_outcome!(self.execute(&delete).await);
        }
        tracing::debug!(collection = %collection.name, id = %id, pruned, "Versions pruned");
        Outcome::Ok(())
    }

    pub(crate) async fn find_versions(
        &self,
        collection: &Collection,
        id: &str,
        options: &FindVersionsOptions,
    ) -> Outcome<Vec<VersionRecord>, Error> {
        try_result!(require_versioned(collection));
        try_result!(validate_limit(options.limit));
        let mut select = Select::from(TableRef::new(collection.versions_table()))
            .all()
            .filter(Expr::col(columns::ID).eq(id))
            .order(OrderTerm {
                expr: Expr::col(columns::VERSION_NUMBER),
                direction: options.order,
            });
        select.limit = options.limit;
        select.offset = options.offset.filter(|&n| n > 0);
        let rows = try_outcome!(self.query(&select).await);
        let mut versions: Vec<VersionRecord> = rows.into_iter().map(version_from_row).collect();

        if collection.has_locales() && !versions.is_empty() {
            let numbers: Vec<Expr> = versions
                .iter()
                .map(|v| number_literal(v.version_number))
                .collect();
            let select = Select::from(TableRef::new(collection.locale_versions_table()))
                .all()
                .filter(
                    Expr::col(columns::PARENT_ID)
                        .eq(id)
                        .and(Expr::col(columns::VERSION_NUMBER).in_list(numbers)),
                );
            let rows = try_outcome!(self.query(&select).await);
            for mut row in rows {
                let number = number_of(&row);
                let locale = row
                    .get_str(columns::LOCALE)
                    .unwrap_or_default()
                    .to_string();
                for column in [columns::ID, columns::PARENT_ID, columns::VERSION_NUMBER, columns::LOCALE] {
                    row.remove(column);
                }
                if let Some(version) = versions.iter_mut().find(|v| v.version_number == number) {
                    version.locales.insert(locale, row);
                }
            }
        }
        Outcome::Ok(versions)
    }

    /// Restore a visible `id` to a stored version. The restore itself is
    /// recorded as a new `update` version; `deletedAt` is never touched.
    pub(crate) async fn revert_record(
        &self,
        collection: &Collection,
        id: &str,
        version: &VersionRef,
    ) -> Outcome<(), Error> {
        try_result!(require_versioned(collection));
        let current = try_outcome!(self.visible_state(collection, id).await);
        let matching = match version {
            VersionRef::Number(n) => Expr::col(columns::VERSION_NUMBER).eq(number_literal(*n)),
            VersionRef::Id(version_id) => Expr::col(columns::VERSION_ID).eq(version_id.as_str()),
        };
        let select = Select::from(TableRef::new(collection.versions_table()))
            .all()
            .filter(Expr::col(columns::ID).eq(id).and(matching));
        let Some(snapshot) = try_outcome!(self.query(&select).await).into_iter().next() else {
            return Outcome::Err(Error::not_found(
                collection.versions_table(),
                Some(format!("{id} {}", version.describe()).as_str()),
            ));
        };
        let number = number_of(&snapshot);
        tracing::info!(collection = %collection.name, id = %id, version = number, "Reverting record");

        let mut set = Row::new();
        for column in collection.main_columns() {
            if column != columns::ID && column != columns::DELETED_AT {
                set.set(column, snapshot.get_or_null(column));
            }
        }
        if collection.has_timestamps() {
            set.set(columns::UPDATED_AT, now());
        }
        let update = Statement::update(
            collection.main_table(),
            set,
            Some(Expr::col(columns::ID).eq(id)),
        );
        try_outcome!(self.execute(&update).await);

        if collection.has_locales() {
            try_outcome!(self.restore_locales(collection, id, number).await);
        }

        let Some(after) = try_outcome!(self.load_state(collection, id).await) else {
            return Outcome::Err(Error::not_found(&collection.name, Some(id)));
        };
        try_outcome!(self.append_version(collection, &after, VersionOperation::Update).await);
        let original = current.view(collection, self.write_locale());
        let hook = self.hook_context(collection, HookStage::AfterUpdate, Some(id), Some(&original));
        self.defer(
            collection,
            HookStage::AfterUpdate,
            ChangeOperation::Revert,
            Some(hook),
            after.view(collection, self.write_locale()),
        );
        Outcome::Ok(())
    }

    /// Replace the locale rows of `id` with those of version `number`.
    async fn restore_locales(
        &self,
        collection: &Collection,
        id: &str,
        number: u64,
    ) -> Outcome<(), Error> {
        let clear = Statement::delete(
            collection.locale_table(),
            Some(Expr::col(columns::PARENT_ID).eq(id)),
        );
        try_outcome!(self.execute(&clear).await);

        let select = Select::from(TableRef::new(collection.locale_versions_table()))
            .all()
            .filter(
                Expr::col(columns::PARENT_ID)
                    .eq(id)
                    .and(Expr::col(columns::VERSION_NUMBER).eq(number_literal(number))),
            );
        let stored = try_outcome!(self.query(&select).await);
        if stored.is_empty() {
            return Outcome::Ok(());
        }
        let localized = collection.localized_field_names();
        let rows = stored
            .iter()
            .map(|snapshot| {
                let mut row = Row::new()
                    .with(columns::ID, new_id())
                    .with(columns::PARENT_ID, id)
                    .with(columns::LOCALE, snapshot.get_or_null(columns::LOCALE));
                for name in &localized {
                    row.set(*name, snapshot.get_or_null(name));
                }
                row
            })
            .collect();
        try_outcome!(self.execute(&Statement::insert(collection.locale_table(), rows)).await);
        Outcome::Ok(())
    }
}
