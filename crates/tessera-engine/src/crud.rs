//! Per-collection operations.
//!
//! Every call follows the same sequence: access check (before any I/O),
//! the work inside a savepoint, the queued `after*` hooks and change
//! events, then a read of the resulting records in the caller's locale.

use serde::Serialize;
use tessera_core::{Collection, Connection, Error, Operation, Outcome, try_outcome, try_result};
use tessera_query::{Paginated, Where};

use crate::context::Context;
use crate::data::Data;
use crate::engine::EngineInner;
use crate::op::Op;
use crate::options::{CountOptions, FindOptions};
use crate::record::Record;
use crate::versions::{FindVersionsOptions, VersionRecord, VersionRef};

/// Outcome of a delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeleteResult {
    pub success: bool,
    /// Records deleted directly (dependents visited by cascades excluded).
    pub count: u64,
}

/// Operations on one regular collection. Obtained from
/// [`crate::Engine::collection`].
#[derive(Clone, Copy)]
pub struct CollectionApi<'e> {
    engine: &'e EngineInner,
    collection: &'e Collection,
}

impl std::fmt::Debug for CollectionApi<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionApi")
            .field("collection", &self.collection.name)
            .finish_non_exhaustive()
    }
}

impl<'e> CollectionApi<'e> {
    pub(crate) fn new(engine: &'e EngineInner, collection: &'e Collection) -> Self {
        Self { engine, collection }
    }

    /// The collection's declaration.
    pub fn schema(&self) -> &'e Collection {
        self.collection
    }

    /// Records matching `options`, one page at a time.
    #[tracing::instrument(level = "debug", skip(self, ctx, options), fields(collection = %self.collection.name))]
    pub async fn find<C: Connection>(
        &self,
        ctx: &Context<'_, C>,
        options: &FindOptions,
    ) -> Outcome<Paginated<Record>, Error> {
        if let Some(reason) = ctx.cx.cancel_reason() {
            return Outcome::Cancelled(reason);
        }
        let op = Op::new(self.engine, ctx);
        try_result!(op.check_access(self.collection, Operation::Read, None, None));
        op.find(self.collection, options).await
    }

    /// First record matching `options`; `limit` and `offset` are ignored.
    #[tracing::instrument(level = "debug", skip(self, ctx, options), fields(collection = %self.collection.name))]
    pub async fn find_one<C: Connection>(
        &self,
        ctx: &Context<'_, C>,
        options: &FindOptions,
    ) -> Outcome<Option<Record>, Error> {
        if let Some(reason) = ctx.cx.cancel_reason() {
            return Outcome::Cancelled(reason);
        }
        let op = Op::new(self.engine, ctx);
        try_result!(op.check_access(self.collection, Operation::Read, None, None));
        op.find_one(self.collection, options).await
    }

    #[tracing::instrument(level = "debug", skip(self, ctx, options), fields(collection = %self.collection.name))]
    pub async fn count<C: Connection>(
        &self,
        ctx: &Context<'_, C>,
        options: &CountOptions,
    ) -> Outcome<u64, Error> {
        if let Some(reason) = ctx.cx.cancel_reason() {
            return Outcome::Cancelled(reason);
        }
        let op = Op::new(self.engine, ctx);
        try_result!(op.check_access(self.collection, Operation::Read, None, None));
        op.count(self.collection, options.filter.as_ref(), options.include_deleted)
            .await
    }

    /// Insert a record with its nested writes.
    #[tracing::instrument(level = "debug", skip(self, ctx, data), fields(collection = %self.collection.name))]
    pub async fn create<C: Connection>(
        &self,
        ctx: &Context<'_, C>,
        data: Data,
    ) -> Outcome<Record, Error> {
        if let Some(reason) = ctx.cx.cancel_reason() {
            return Outcome::Cancelled(reason);
        }
        let op = Op::new(self.engine, ctx);
        try_result!(op.check_access(self.collection, Operation::Create, None, Some(&data.fields)));
        tracing::info!(collection = %self.collection.name, "Creating record");

        let id = try_outcome!(op.atomically(op.create_record(self.collection, data)).await);
        try_result!(op.finish());
        op.fetch_record(self.collection, &id).await
    }

    /// Update one record by id, nested writes included.
    #[tracing::instrument(level = "debug", skip(self, ctx, data), fields(collection = %self.collection.name))]
    pub async fn update_by_id<C: Connection>(
        &self,
        ctx: &Context<'_, C>,
        id: &str,
        data: Data,
    ) -> Outcome<Record, Error> {
        if let Some(reason) = ctx.cx.cancel_reason() {
            return Outcome::Cancelled(reason);
        }
        let op = Op::new(self.engine, ctx);
        try_result!(op.check_access(
            self.collection,
            Operation::Update,
            Some(id),
            Some(&data.fields)
        ));
        tracing::info!(collection = %self.collection.name, id = %id, "Updating record");

        try_outcome!(op.atomically(op.update_record(self.collection, id, data)).await);
        try_result!(op.finish());
        op.fetch_record(self.collection, id).await
    }

    /// Update every visible record matching `filter`.
    #[tracing::instrument(level = "debug", skip(self, ctx, filter, data), fields(collection = %self.collection.name))]
    pub async fn update<C: Connection>(
        &self,
        ctx: &Context<'_, C>,
        filter: &Where,
        data: Data,
    ) -> Outcome<Vec<Record>, Error> {
        if let Some(reason) = ctx.cx.cancel_reason() {
            return Outcome::Cancelled(reason);
        }
        let op = Op::new(self.engine, ctx);
        try_result!(op.check_access(self.collection, Operation::Update, None, Some(&data.fields)));
        tracing::info!(collection = %self.collection.name, "Updating records");

        let ids = try_outcome!(op.atomically(op.update_many(self.collection, filter, data)).await);
        try_result!(op.finish());
        op.fetch_by_ids(self.collection, &ids).await
    }

    /// Delete one record by id, visiting its dependents.
    #[tracing::instrument(level = "debug", skip(self, ctx), fields(collection = %self.collection.name))]
    pub async fn delete_by_id<C: Connection>(
        &self,
        ctx: &Context<'_, C>,
        id: &str,
    ) -> Outcome<DeleteResult, Error> {
        if let Some(reason) = ctx.cx.cancel_reason() {
            return Outcome::Cancelled(reason);
        }
        let op = Op::new(self.engine, ctx);
        try_result!(op.check_access(self.collection, Operation::Delete, Some(id), None));
        tracing::info!(collection = %self.collection.name, id = %id, "Deleting record");

        try_outcome!(
            op.atomically(op.delete_record(self.collection, id.to_string(), false))
                .await
        );
        try_result!(op.finish());
        Outcome::Ok(DeleteResult {
            success: true,
            count: 1,
        })
    }

    /// Delete every visible record matching `filter`.
    #[tracing::instrument(level = "debug", skip(self, ctx, filter), fields(collection = %self.collection.name))]
    pub async fn delete<C: Connection>(
        &self,
        ctx: &Context<'_, C>,
        filter: &Where,
    ) -> Outcome<DeleteResult, Error> {
        if let Some(reason) = ctx.cx.cancel_reason() {
            return Outcome::Cancelled(reason);
        }
        let op = Op::new(self.engine, ctx);
        try_result!(op.check_access(self.collection, Operation::Delete, None, None));
        tracing::info!(collection = %self.collection.name, "Deleting records");

        let count = try_outcome!(op.atomically(op.delete_many(self.collection, filter)).await);
        try_result!(op.finish());
        Outcome::Ok(DeleteResult {
            success: true,
            count,
        })
    }

    /// Bring back a soft-deleted record. Restoring a live record returns it
    /// unchanged.
    #[tracing::instrument(level = "debug", skip(self, ctx), fields(collection = %self.collection.name))]
    pub async fn restore_by_id<C: Connection>(
        &self,
        ctx: &Context<'_, C>,
        id: &str,
    ) -> Outcome<Record, Error> {
        if let Some(reason) = ctx.cx.cancel_reason() {
            return Outcome::Cancelled(reason);
        }
        let op = Op::new(self.engine, ctx);
        try_result!(op.check_access(self.collection, Operation::Update, Some(id), None));
        tracing::info!(collection = %self.collection.name, id = %id, "Restoring record");

        try_outcome!(op.atomically(op.restore_record(self.collection, id)).await);
        try_result!(op.finish());
        op.fetch_record(self.collection, id).await
    }

    /// Stored versions of `id`.
    #[tracing::instrument(level = "debug", skip(self, ctx, options), fields(collection = %self.collection.name))]
    pub async fn find_versions<C: Connection>(
        &self,
        ctx: &Context<'_, C>,
        id: &str,
        options: &FindVersionsOptions,
    ) -> Outcome<Vec<VersionRecord>, Error> {
        if let Some(reason) = ctx.cx.cancel_reason() {
            return Outcome::Cancelled(reason);
        }
        let op = Op::new(self.engine, ctx);
        try_result!(op.check_access(self.collection, Operation::Read, Some(id), None));
        op.find_versions(self.collection, id, options).await
    }

    /// Restore `id` to a stored version and return the now-current record.
    #[tracing::instrument(level = "debug", skip(self, ctx), fields(collection = %self.collection.name))]
    pub async fn revert_to_version<C: Connection>(
        &self,
        ctx: &Context<'_, C>,
        id: &str,
        version: VersionRef,
    ) -> Outcome<Record, Error> {
        if let Some(reason) = ctx.cx.cancel_reason() {
            return Outcome::Cancelled(reason);
        }
        let op = Op::new(self.engine, ctx);
        try_result!(op.check_access(self.collection, Operation::Update, Some(id), None));

        try_outcome!(op.atomically(op.revert_record(self.collection, id, &version)).await);
        try_result!(op.finish());
        op.fetch_record(self.collection, id).await
    }
}
