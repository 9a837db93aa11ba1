//! Create and update, nested writes included.
//!
//! A create runs in this order: `beforeCreate`, validation of the payload
//! and of the nested write shapes, to-one nested writes (the related record
//! must exist before its key is copied), the main and locale rows, the
//! first version, then to-many nested writes. Nothing is written before
//! validation passes. Updates follow the same shape against the stored
//! record.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tessera_core::{
    Collection, Connection, Error, Expr, HookStage, Outcome, RelationKind, Result, Row, Statement,
    ValidationErrorKind, Value, columns, new_id, now, try_outcome, try_result,
};
use tessera_core::validate::{WriteKind, validate_write};
use tessera_query::{FieldOp, Where};

use crate::changes::ChangeOperation;
use crate::data::{Data, NestedWrite};
use crate::op::{BoxOutcome, Op};
use crate::state::{State, split_payload};
use crate::versions::VersionOperation;

fn nested_error(relation: &str, message: impl Into<String>) -> Error {
    Error::validation(relation, ValidationErrorKind::Relation, message)
}

/// Check the shape of nested writes before anything is written. Returns the
/// foreign keys a to-one write will fill in.
fn check_nested(
    collection: &Collection,
    relations: &BTreeMap<String, NestedWrite>,
    updating: bool,
) -> Result<BTreeSet<String>> {
    let mut satisfied = BTreeSet::new();
    for (name, write) in relations {
        let Some(relation) = collection.get_relation(name) else {
            return Err(nested_error(
                name,
                format!("unknown relation '{name}' on {}", collection.name),
            ));
        };
        if !write.disconnect.is_empty() && !updating {
            return Err(nested_error(name, "disconnect is only valid on update"));
        }
        match &relation.kind {
            RelationKind::BelongsTo { foreign_key, .. } => {
                if write.link_count() > 1 {
                    return Err(nested_error(
                        name,
                        format!("to-one relation '{name}' links at most one record"),
                    ));
                }
                if write.link_count() == 1 {
                    satisfied.insert(foreign_key.clone());
                }
            }
            RelationKind::Polymorphic { .. } => {
                return Err(nested_error(
                    name,
                    format!("nested writes through polymorphic relation '{name}' are not supported"),
                ));
            }
            RelationKind::HasMany { .. } | RelationKind::ManyToMany { .. } => {}
        }
    }
    Ok(satisfied)
}

impl<'a, C: Connection> Op<'a, C> {
    /// Create one record with its nested writes and return its id.
    pub(crate) fn create_record<'s>(
        &'s self,
        collection: &'s Collection,
        data: Data,
    ) -> BoxOutcome<'s, String> {
        Box::pin(async move {
            let Data { fields, relations } = data;
            let ctx = self.hook_context(collection, HookStage::BeforeCreate, None, None);
            let mut payload = try_result!(collection.hooks.run_before(&ctx, fields));
            let satisfied = try_result!(check_nested(collection, &relations, false));
            try_result!(validate_write(
                collection,
                &payload,
                WriteKind::Create {
                    satisfied: &satisfied
                }
            ));
            try_outcome!(self.link_parents(collection, &mut payload, &relations).await);

            let (main, localized) = split_payload(collection, payload);
            if !localized.is_empty() {
                try_result!(self.engine.config.check_write_locale(self.write_locale()));
            }
            let id = new_id();
            let mut row = Row::new().with(columns::ID, id.as_str());
            for field in collection.main_fields() {
                if let Some(value) = main.get(&field.name).or(field.default.as_ref()) {
                    row.set(field.name.as_str(), value.clone());
                }
            }
            if collection.has_timestamps() {
                let at = now();
                row.set(columns::CREATED_AT, at.as_str());
                row.set(columns::UPDATED_AT, at);
            }
            try_outcome!(
                self.execute(&Statement::insert(collection.main_table(), vec![row.clone()]))
                    .await
            );

            let mut locales = Vec::new();
            if collection.has_locales() {
                let mut values = Row::new();
                for field in collection.fields.iter().filter(|f| f.localized) {
                    if let Some(value) = localized.get(&field.name).or(field.default.as_ref()) {
                        values.set(field.name.as_str(), value.clone());
                    }
                }
                if !values.is_empty() {
                    let mut locale_row = Row::new()
                        .with(columns::ID, new_id())
                        .with(columns::PARENT_ID, id.as_str())
                        .with(columns::LOCALE, self.write_locale());
                    locale_row.merge(&values);
                    try_outcome!(
                        self.execute(&Statement::insert(
                            collection.locale_table(),
                            vec![locale_row.clone()]
                        ))
                        .await
                    );
                    locales.push(locale_row);
                }
            }
            tracing::debug!(collection = %collection.name, id = %id, "Record inserted");

            let state = State { main: row, locales };
            try_outcome!(self.append_version(collection, &state, VersionOperation::Create).await);
            try_outcome!(self.link_children(collection, &state.main, &relations, false).await);

            let hook = self.hook_context(collection, HookStage::AfterCreate, Some(id.as_str()), None);
            self.defer(
                collection,
                HookStage::AfterCreate,
                ChangeOperation::Create,
                Some(hook),
                state.view(collection, self.write_locale()),
            );
            Outcome::Ok(id)
        })
    }

    /// Update one visible record with its nested writes.
    pub(crate) fn update_record<'s>(
        &'s self,
        collection: &'s Collection,
        id: &'s str,
        data: Data,
    ) -> BoxOutcome<'s, ()> {
        Box::pin(async move {
            let Data { fields, relations } = data;
            let before = try_outcome!(self.visible_state(collection, id).await);
            let original = before.view(collection, self.write_locale());
            let ctx = self.hook_context(collection, HookStage::BeforeUpdate, Some(id), Some(&original));
            let mut payload = try_result!(collection.hooks.run_before(&ctx, fields));
            try_result!(check_nested(collection, &relations, true));
            try_result!(validate_write(collection, &payload, WriteKind::Update));
            try_outcome!(self.link_parents(collection, &mut payload, &relations).await);

            try_outcome!(self.write_fields(collection, id, payload).await);
            try_outcome!(self.link_children(collection, &before.main, &relations, true).await);

            let Some(after) = try_outcome!(self.load_state(collection, id).await) else {
                return Outcome::Err(Error::not_found(&collection.name, Some(id)));
            };
            try_outcome!(self.append_version(collection, &after, VersionOperation::Update).await);
            let hook = self.hook_context(collection, HookStage::AfterUpdate, Some(id), Some(&original));
            self.defer(
                collection,
                HookStage::AfterUpdate,
                ChangeOperation::Update,
                Some(hook),
                after.view(collection, self.write_locale()),
            );
            Outcome::Ok(())
        })
    }

    /// Update every visible record matching `filter` with one statement.
    ///
    /// Nested writes are rejected. `beforeUpdate` runs once without an id;
    /// `afterUpdate` runs per record with its state from before the update.
    pub(crate) async fn update_many(
        &self,
        collection: &Collection,
        filter: &Where,
        data: Data,
    ) -> Outcome<Vec<String>, Error> {
        let Data { fields, relations } = data;
        if let Some(name) = relations.keys().next() {
            return Outcome::Err(nested_error(
                name,
                "nested writes are only supported when updating by id",
            ));
        }
        let ctx = self.hook_context(collection, HookStage::BeforeUpdate, None, None);
        let payload = try_result!(collection.hooks.run_before(&ctx, fields));
        try_result!(validate_write(collection, &payload, WriteKind::Update));
        let (mut set, localized) = split_payload(collection, payload);
        if !localized.is_empty() {
            try_result!(self.engine.config.check_write_locale(self.write_locale()));
        }
        if collection.has_timestamps() {
            set.set(columns::UPDATED_AT, now());
        }

        let matching = try_result!(self.plan_ids(collection, filter));
        let matched = try_outcome!(self.query(&matching).await);
        let mut originals: HashMap<String, Row> = HashMap::with_capacity(matched.len());
        for row in &matched {
            let Some(id) = row.get_str(columns::ID) else {
                continue;
            };
            if let Some(state) = try_outcome!(self.load_state(collection, id).await) {
                originals.insert(id.to_string(), state.view(collection, self.write_locale()));
            }
        }
        let rows = if set.is_empty() {
            matched
        } else {
            let update = Statement::update(
                collection.main_table(),
                set,
                Some(Expr::col(columns::ID).in_subquery(matching)),
            );
            try_outcome!(self.execute_returning(&update).await)
        };
        let ids: Vec<String> = rows
            .iter()
            .filter_map(|row| row.get_str(columns::ID).map(str::to_string))
            .collect();
        tracing::debug!(collection = %collection.name, count = ids.len(), "Batch updated");

        for id in &ids {
            if !localized.is_empty() {
                try_outcome!(self.upsert_locale(collection, id, &localized).await);
            }
            let Some(after) = try_outcome!(self.load_state(collection, id).await) else {
                continue;
            };
            try_outcome!(self.append_version(collection, &after, VersionOperation::Update).await);
            let hook =
                self.hook_context(collection, HookStage::AfterUpdate, Some(id), originals.get(id));
            self.defer(
                collection,
                HookStage::AfterUpdate,
                ChangeOperation::Update,
                Some(hook),
                after.view(collection, self.write_locale()),
            );
        }
        Outcome::Ok(ids)
    }

    // ==================== Nested writes ====================

    /// Apply to-one nested writes by setting foreign keys in `payload`.
    ///
    /// A to-one `disconnect` clears the key whatever its filter.
    async fn link_parents(
        &self,
        collection: &Collection,
        payload: &mut Row,
        relations: &BTreeMap<String, NestedWrite>,
    ) -> Outcome<(), Error> {
        for (name, write) in relations {
            let Some(relation) = collection.get_relation(name) else {
                continue;
            };
            if let RelationKind::BelongsTo {
                target,
                foreign_key,
                references,
            } = &relation.kind
            {
                let target = try_result!(self.collection(target));
                if let Some(row) = try_outcome!(self.resolve_one(target, write).await) {
                    payload.set(foreign_key.as_str(), row.get_or_null(references));
                } else if !write.disconnect.is_empty() {
                    payload.set(foreign_key.as_str(), Value::Null);
                }
            }
        }
        Outcome::Ok(())
    }

    /// Main row of the record a to-one write links, if it links one.
    async fn resolve_one(
        &self,
        target: &Collection,
        write: &NestedWrite,
    ) -> Outcome<Option<Row>, Error> {
        if let Some(filter) = write.connect.first() {
            return Outcome::Ok(Some(try_outcome!(self.connect_target(target, filter).await)));
        }
        if let Some(data) = write.create.first() {
            let id = try_outcome!(self.create_record(target, data.clone()).await);
            let row = try_outcome!(self.created_row(target, &id).await);
            return Outcome::Ok(Some(row));
        }
        if let Some(directive) = write.connect_or_create.first() {
            let found = try_outcome!(self.find_rows(target, &directive.filter, Some(1)).await);
            if let Some(row) = found.into_iter().next() {
                return Outcome::Ok(Some(row));
            }
            let id = try_outcome!(self.create_record(target, directive.create.clone()).await);
            let row = try_outcome!(self.created_row(target, &id).await);
            return Outcome::Ok(Some(row));
        }
        Outcome::Ok(None)
    }

    async fn created_row(&self, collection: &Collection, id: &str) -> Outcome<Row, Error> {
        match try_outcome!(self.load_state(collection, id).await) {
            Some(state) => Outcome::Ok(state.main),
            None => Outcome::Err(Error::not_found(&collection.name, Some(id))),
        }
    }

    /// First visible record matching `filter`, or `NotFound`.
    async fn connect_target(&self, target: &Collection, filter: &Where) -> Outcome<Row, Error> {
        let rows = try_outcome!(self.find_rows(target, filter, Some(1)).await);
        match rows.into_iter().next() {
            Some(row) => Outcome::Ok(row),
            None => Outcome::Err(Error::not_found(&target.name, None)),
        }
    }

    /// Apply to-many nested writes for the stored record `parent`.
    async fn link_children(
        &self,
        collection: &Collection,
        parent: &Row,
        relations: &BTreeMap<String, NestedWrite>,
        updating: bool,
    ) -> Outcome<(), Error> {
        for (name, write) in relations {
            let Some(relation) = collection.get_relation(name) else {
                continue;
            };
            match &relation.kind {
                RelationKind::HasMany {
                    target,
                    foreign_key,
                    references,
                } => {
                    let target = try_result!(self.collection(target));
                    let key = parent.get_or_null(references);
                    try_outcome!(
                        self.link_has_many(target, foreign_key, &key, write, updating)
                            .await
                    );
                }
                RelationKind::ManyToMany {
                    target,
                    through,
                    source_key,
                    target_key,
                } => {
                    let target = try_result!(self.collection(target));
                    let junction = try_result!(self.collection(through));
                    let parent_id = parent.get_str(columns::ID).unwrap_or_default();
                    let keys = (source_key.as_str(), target_key.as_str());
                    try_outcome!(self.link_many_to_many(target, junction, keys, parent_id, write).await);
                }
                RelationKind::BelongsTo { .. } | RelationKind::Polymorphic { .. } => {}
            }
        }
        Outcome::Ok(())
    }

    async fn link_has_many(
        &self,
        target: &Collection,
        foreign_key: &str,
        key: &Value,
        write: &NestedWrite,
        updating: bool,
    ) -> Outcome<(), Error> {
        let point_here = || Data::new().set(foreign_key, key.clone());
        for filter in &write.connect {
            let row = try_outcome!(self.connect_target(target, filter).await);
            let child = row.get_str(columns::ID).unwrap_or_default();
            try_outcome!(self.update_record(target, child, point_here()).await);
        }
        for data in &write.create {
            let mut data = data.clone();
            data.fields.set(foreign_key, key.clone());
            try_outcome!(self.create_record(target, data).await);
        }
        for directive in &write.connect_or_create {
            let found = try_outcome!(self.find_rows(target, &directive.filter, Some(1)).await);
            match found.first().and_then(|row| row.get_str(columns::ID)) {
                Some(child) => {
                    try_outcome!(self.update_record(target, child, point_here()).await);
                }
                None => {
                    let mut data = directive.create.clone();
                    data.fields.set(foreign_key, key.clone());
                    try_outcome!(self.create_record(target, data).await);
                }
            }
        }
        if updating {
            for filter in &write.disconnect {
                let linked = filter.clone().and_also(Where::eq(foreign_key, key.clone()));
                let rows = try_outcome!(self.find_rows(target, &linked, None).await);
                for row in &rows {
                    let child = row.get_str(columns::ID).unwrap_or_default();
                    let unlink = Data::new().set(foreign_key, Value::Null);
                    try_outcome!(self.update_record(target, child, unlink).await);
                }
            }
        }
        Outcome::Ok(())
    }

    async fn link_many_to_many(
        &self,
        target: &Collection,
        junction: &Collection,
        (source_key, target_key): (&str, &str),
        parent_id: &str,
        write: &NestedWrite,
    ) -> Outcome<(), Error> {
        let mut linked: Vec<String> = Vec::new();
        for filter in &write.connect {
            let row = try_outcome!(self.connect_target(target, filter).await);
            linked.push(row.get_str(columns::ID).unwrap_or_default().to_string());
        }
        for data in &write.create {
            linked.push(try_outcome!(self.create_record(target, data.clone()).await));
        }
        for directive in &write.connect_or_create {
            let found = try_outcome!(self.find_rows(target, &directive.filter, Some(1)).await);
            let id = match found.first().and_then(|row| row.get_str(columns::ID)) {
                Some(id) => id.to_string(),
                None => try_outcome!(self.create_record(target, directive.create.clone()).await),
            };
            linked.push(id);
        }
        for target_id in &linked {
            let pair = Where::and(vec![
                Where::eq(source_key, parent_id),
                Where::eq(target_key, target_id.as_str()),
            ]);
            let existing = try_outcome!(self.find_rows(junction, &pair, Some(1)).await);
            if existing.is_empty() {
                let link = Data::new()
                    .set(source_key, parent_id)
                    .set(target_key, target_id.as_str());
                try_outcome!(self.create_record(junction, link).await);
            }
        }

        for filter in &write.disconnect {
            let targets = try_outcome!(self.find_rows(target, filter, None).await);
            let ids: Vec<Value> = targets
                .iter()
                .filter_map(|row| row.get(columns::ID).cloned())
                .collect();
            if ids.is_empty() {
                continue;
            }
            let pairs = Where::and(vec![
                Where::eq(source_key, parent_id),
                Where::field(target_key, FieldOp::In(ids)),
            ]);
            let rows = try_outcome!(self.find_rows(junction, &pairs, None).await);
            for row in &rows {
                let link = row.get_str(columns::ID).unwrap_or_default().to_string();
                try_outcome!(self.delete_record(junction, link, true).await);
            }
        }
        Outcome::Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::{FieldDef, Relation};

    fn posts() -> Collection {
        Collection::new("posts")
            .field(FieldDef::text("title").required())
            .field(FieldDef::text("authorId").required())
            .relation("author", Relation::belongs_to("authors", "authorId"))
            .relation("comments", Relation::has_many("comments", "postId"))
    }

    #[test]
    fn test_check_nested_reports_linked_keys() {
        let data = Data::new()
            .create("author", Data::new().set("name", "Ada"))
            .create("comments", Data::new().set("body", "hi"));
        let satisfied = check_nested(&posts(), &data.relations, false).unwrap();
        assert_eq!(satisfied.into_iter().collect::<Vec<_>>(), vec!["authorId"]);

        let disconnect_only = Data::new().disconnect("author", Where::eq("name", "Ada"));
        assert!(check_nested(&posts(), &disconnect_only.relations, true).unwrap().is_empty());
    }

    #[test]
    fn test_check_nested_rejects_bad_shapes() {
        let cases = [
            (Data::new().connect("editor", Where::eq("name", "x")), false),
            (Data::new().disconnect("author", Where::eq("name", "x")), false),
            (
                Data::new()
                    .connect("author", Where::eq("name", "a"))
                    .create("author", Data::new().set("name", "b")),
                true,
            ),
        ];
        for (data, updating) in cases {
            let err = check_nested(&posts(), &data.relations, updating).unwrap_err();
            assert!(err.is_validation());
        }
    }
}
