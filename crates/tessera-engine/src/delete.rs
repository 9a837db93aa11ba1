//! Delete, batch delete and restore.
//!
//! Deleting a record first refuses if a `restrict` relation still has
//! dependents, then visits `cascade` and `setNull` dependents through the
//! full delete and update paths, records a `delete` version and finally
//! soft- or hard-deletes the row.

use tessera_core::{
    CascadeAction, Collection, Connection, Dependent, DependentKey, Error, Expr, HookStage,
    Outcome, RestrictedDeleteError, Row, Statement, ValidationErrorKind, Value, columns, now,
    try_outcome, try_result,
};
use tessera_query::Where;

use crate::changes::ChangeOperation;
use crate::data::Data;
use crate::op::{BoxOutcome, Op};
use crate::state::State;
use crate::versions::VersionOperation;

/// Filter selecting the dependents of `deleted` through `dependent`; `None`
/// when the referenced key is empty.
fn dependent_filter(dependent: &Dependent, deleted: &Row) -> Option<Where> {
    let id = deleted.get_or_null(columns::ID);
    match &dependent.key {
        DependentKey::Column { column, references } => {
            let key = deleted.get_or_null(references);
            (!key.is_null()).then(|| Where::eq(column.as_str(), key))
        }
        DependentKey::Junction { column, .. } => Some(Where::eq(column.as_str(), id)),
        DependentKey::Polymorphic {
            type_field,
            type_value,
            id_field,
        } => Some(Where::and(vec![
            Where::eq(type_field.as_str(), type_value.as_str()),
            Where::eq(id_field.as_str(), id),
        ])),
    }
}

/// Payload clearing the reference a dependent holds.
fn unlink(dependent: &Dependent) -> Data {
    match &dependent.key {
        DependentKey::Column { column, .. } => Data::new().set(column.as_str(), Value::Null),
        DependentKey::Junction { column, .. } => Data::new().set(column.as_str(), Value::Null),
        DependentKey::Polymorphic {
            type_field,
            id_field,
            ..
        } => Data::new()
            .set(type_field.as_str(), Value::Null)
            .set(id_field.as_str(), Value::Null),
    }
}

impl<'a, C: Connection> Op<'a, C> {
    /// Delete one visible record and its dependents.
    ///
    /// With `missing_ok`, an absent or already deleted record is skipped
    /// instead of reported as `NotFound`.
    pub(crate) fn delete_record<'s>(
        &'s self,
        collection: &'s Collection,
        id: String,
        missing_ok: bool,
    ) -> BoxOutcome<'s, ()> {
        Box::pin(async move {
            if !self.begin_delete(&collection.name, &id) {
                return Outcome::Ok(());
            }
            let state = match try_outcome!(self.load_state(collection, &id).await) {
                Some(state) if !state.is_deleted() => state,
                _ if missing_ok => return Outcome::Ok(()),
                _ => return Outcome::Err(Error::not_found(&collection.name, Some(id.as_str()))),
            };
            try_outcome!(self.prepare_delete(collection, &state).await);
            try_outcome!(self.remove(collection, &[id]).await);
            Outcome::Ok(())
        })
    }

    /// Delete every visible record matching `filter`; the rows themselves
    /// go in one statement. Returns how many were deleted.
    pub(crate) async fn delete_many(
        &self,
        collection: &Collection,
        filter: &Where,
    ) -> Outcome<u64, Error> {
        let rows = try_outcome!(self.find_rows(collection, filter, None).await);
        let mut ids = Vec::with_capacity(rows.len());
        for row in &rows {
            let id = row.get_str(columns::ID).unwrap_or_default().to_string();
            if !self.begin_delete(&collection.name, &id) {
                continue;
            }
            // An earlier record's cascade may have removed this one.
            let state = match try_outcome!(self.load_state(collection, &id).await) {
                Some(state) if !state.is_deleted() => state,
                _ => continue,
            };
            try_outcome!(self.prepare_delete(collection, &state).await);
            ids.push(id);
        }
        if !ids.is_empty() {
            try_outcome!(self.remove(collection, &ids).await);
        }
        tracing::debug!(collection = %collection.name, count = ids.len(), "Batch deleted");
        Outcome::Ok(ids.len() as u64)
    }

    /// Everything a delete does before the row goes away.
    async fn prepare_delete(&self, collection: &Collection, state: &State) -> Outcome<(), Error> {
        let id = state.id();
        try_outcome!(self.check_restrict(collection, &state.main).await);

        let original = state.view(collection, self.write_locale());
        let ctx = self.hook_context(collection, HookStage::BeforeDelete, Some(id), Some(&original));
        try_result!(collection.hooks.run_before(&ctx, original.clone()));

        try_outcome!(self.visit_dependents(collection, &state.main).await);
        try_outcome!(self.append_version(collection, state, VersionOperation::Delete).await);

        let hook = self.hook_context(collection, HookStage::AfterDelete, Some(id), Some(&original));
        self.defer(
            collection,
            HookStage::AfterDelete,
            ChangeOperation::Delete,
            Some(hook),
            original,
        );
        Outcome::Ok(())
    }

    async fn check_restrict(&self, collection: &Collection, deleted: &Row) -> Outcome<(), Error> {
        let graph = self.engine.registry.graph();
        for dependent in graph.dependents(&collection.name) {
            if dependent.action != CascadeAction::Restrict {
                continue;
            }
            let Some(filter) = dependent_filter(dependent, deleted) else {
                continue;
            };
            let holder = try_result!(self.collection(&dependent.collection));
            let count = try_outcome!(self.count(holder, Some(&filter), false).await);
            if count > 0 {
                let id = deleted.get_str(columns::ID).unwrap_or_default();
                tracing::info!(
                    collection = %collection.name,
                    id = %id,
                    dependent = %dependent.collection,
                    count,
                    "Delete restricted"
                );
                return Outcome::Err(Error::RestrictedDelete(RestrictedDeleteError {
                    collection: collection.name.clone(),
                    id: id.to_string(),
                    dependent: dependent.collection.clone(),
                    relation: dependent.relation.clone(),
                    count,
                }));
            }
        }
        Outcome::Ok(())
    }

    /// Cascade to or unlink the dependents of `deleted`. Junction rows are
    /// removed under `setNull` as well.
    async fn visit_dependents(&self, collection: &Collection, deleted: &Row) -> Outcome<(), Error> {
        let graph = self.engine.registry.graph();
        for dependent in graph.dependents(&collection.name) {
            if dependent.action == CascadeAction::Restrict {
                continue;
            }
            let Some(filter) = dependent_filter(dependent, deleted) else {
                continue;
            };
            let holder = try_result!(self.collection(&dependent.collection));
            let rows = try_outcome!(self.find_rows(holder, &filter, None).await);
            if rows.is_empty() {
                continue;
            }
            tracing::debug!(
                collection = %collection.name,
                dependent = %dependent.collection,
                relation = %dependent.relation,
                action = dependent.action.as_str(),
                count = rows.len(),
                "Visiting dependents"
            );
            let removes = dependent.action == CascadeAction::Cascade
                || matches!(dependent.key, DependentKey::Junction { .. });
            for row in &rows {
                let id = row.get_str(columns::ID).unwrap_or_default();
                if removes {
                    try_outcome!(self.delete_record(holder, id.to_string(), true).await);
                } else {
                    try_outcome!(self.update_record(holder, id, unlink(dependent)).await);
                }
            }
        }
        Outcome::Ok(())
    }

    /// Soft-delete or hard-delete the rows of `ids`.
    async fn remove(&self, collection: &Collection, ids: &[String]) -> Outcome<(), Error> {
        let targets = || Expr::col(columns::ID).in_list(ids.iter().map(String::as_str));
        if collection.has_soft_delete() {
            let set = Row::new().with(columns::DELETED_AT, now());
            let update = Statement::update(collection.main_table(), set, Some(targets()));
            try_outcome!(self.execute(&update).await);
        } else {
            if collection.has_locales() {
                let locales = Statement::delete(
                    collection.locale_table(),
                    Some(Expr::col(columns::PARENT_ID).in_list(ids.iter().map(String::as_str))),
                );
                try_outcome!(self.execute(&locales).await);
            }
            let delete = Statement::delete(collection.main_table(), Some(targets()));
            try_outcome!(self.execute(&delete).await);
        }
        Outcome::Ok(())
    }

    /// Clear `deletedAt` of `id`. Restoring a live record does nothing.
    /// Returns whether the record was restored.
    pub(crate) async fn restore_record(
        &self,
        collection: &Collection,
        id: &str,
    ) -> Outcome<bool, Error> {
        if !collection.has_soft_delete() {
            return Outcome::Err(Error::validation(
                &collection.name,
                ValidationErrorKind::Query,
                format!("{} does not use soft delete", collection.name),
            ));
        }
        let Some(state) = try_outcome!(self.load_state(collection, id).await) else {
            return Outcome::Err(Error::not_found(&collection.name, Some(id)));
        };
        if !state.is_deleted() {
            return Outcome::Ok(false);
        }
        let mut set = Row::new().with(columns::DELETED_AT, Value::Null);
        if collection.has_timestamps() {
            set.set(columns::UPDATED_AT, now());
        }
        let update = Statement::update(
            collection.main_table(),
            set,
            Some(Expr::col(columns::ID).eq(id)),
        );
        try_outcome!(self.execute(&update).await);

        let Some(after) = try_outcome!(self.load_state(collection, id).await) else {
            return Outcome::Err(Error::not_found(&collection.name, Some(id)));
        };
        try_outcome!(self.append_version(collection, &after, VersionOperation::Update).await);
        self.defer(
            collection,
            HookStage::AfterUpdate,
            ChangeOperation::Restore,
            None,
            after.view(collection, self.write_locale()),
        );
        Outcome::Ok(true)
    }
}
