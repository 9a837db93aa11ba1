//! Singleton collections.

use tessera_core::{Collection, Connection, Error, Operation, Outcome, try_outcome, try_result};

use crate::context::Context;
use crate::data::Data;
use crate::engine::EngineInner;
use crate::op::Op;
use crate::options::FindOptions;
use crate::record::Record;
use crate::versions::{FindVersionsOptions, VersionRecord, VersionRef};

/// Operations on a global: one implicit record, created on first use.
/// Obtained from [`crate::Engine::global`].
#[derive(Clone, Copy)]
pub struct GlobalApi<'e> {
    engine: &'e EngineInner,
    collection: &'e Collection,
}

impl std::fmt::Debug for GlobalApi<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlobalApi")
            .field("collection", &self.collection.name)
            .finish_non_exhaustive()
    }
}

impl<'e> GlobalApi<'e> {
    pub(crate) fn new(engine: &'e EngineInner, collection: &'e Collection) -> Self {
        Self { engine, collection }
    }

    pub fn schema(&self) -> &'e Collection {
        self.collection
    }

    /// Id of the stored record, creating it from field defaults if absent.
    async fn ensure<C: Connection>(&self, op: &Op<'_, C>) -> Outcome<String, Error> {
        let existing = try_outcome!(op.find_one(self.collection, &FindOptions::new()).await);
        if let Some(id) = existing.as_ref().and_then(Record::id) {
            return Outcome::Ok(id.to_string());
        }
        tracing::info!(global = %self.collection.name, "Creating global record");
        let id = try_outcome!(
            op.atomically(op.create_record(self.collection, Data::new()))
                .await
        );
        try_result!(op.finish());
        Outcome::Ok(id)
    }

    /// The global's record.
    #[tracing::instrument(level = "debug", skip(self, ctx), fields(global = %self.collection.name))]
    pub async fn get<C: Connection>(&self, ctx: &Context<'_, C>) -> Outcome<Record, Error> {
        if let Some(reason) = ctx.cx.cancel_reason() {
            return Outcome::Cancelled(reason);
        }
        let op = Op::new(self.engine, ctx);
        try_result!(op.check_access(self.collection, Operation::Read, None, None));
        let id = try_outcome!(self.ensure(&op).await);
        op.fetch_record(self.collection, &id).await
    }

    #[tracing::instrument(level = "debug", skip(self, ctx, data), fields(global = %self.collection.name))]
    pub async fn update<C: Connection>(
        &self,
        ctx: &Context<'_, C>,
        data: Data,
    ) -> Outcome<Record, Error> {
        if let Some(reason) = ctx.cx.cancel_reason() {
            return Outcome::Cancelled(reason);
        }
        let op = Op::new(self.engine, ctx);
        try_result!(op.check_access(self.collection, Operation::Update, None, Some(&data.fields)));
        let id = try_outcome!(self.ensure(&op).await);
        tracing::info!(global = %self.collection.name, "Updating global");

        try_outcome!(op.atomically(op.update_record(self.collection, &id, data)).await);
        try_result!(op.finish());
        op.fetch_record(self.collection, &id).await
    }

    /// Stored versions of the global's record; empty before it exists.
    #[tracing::instrument(level = "debug", skip(self, ctx, options), fields(global = %self.collection.name))]
    pub async fn find_versions<C: Connection>(
        &self,
        ctx: &Context<'_, C>,
        options: &FindVersionsOptions,
    ) -> Outcome<Vec<VersionRecord>, Error> {
        if let Some(reason) = ctx.cx.cancel_reason() {
            return Outcome::Cancelled(reason);
        }
        let op = Op::new(self.engine, ctx);
        try_result!(op.check_access(self.collection, Operation::Read, None, None));
        let existing = try_outcome!(op.find_one(self.collection, &FindOptions::new()).await);
        match existing.as_ref().and_then(Record::id) {
            Some(id) => op.find_versions(self.collection, id, options).await,
            None => Outcome::Ok(Vec::new()),
        }
    }

    #[tracing::instrument(level = "debug", skip(self, ctx), fields(global = %self.collection.name))]
    pub async fn revert_to_version<C: Connection>(
        &self,
        ctx: &Context<'_, C>,
        version: VersionRef,
    ) -> Outcome<Record, Error> {
        if let Some(reason) = ctx.cx.cancel_reason() {
            return Outcome::Cancelled(reason);
        }
        let op = Op::new(self.engine, ctx);
        try_result!(op.check_access(self.collection, Operation::Update, None, None));
        let existing = try_outcome!(op.find_one(self.collection, &FindOptions::new()).await);
        let Some(id) = existing.as_ref().and_then(Record::id).map(str::to_string) else {
            return Outcome::Err(Error::not_found(&self.collection.name, None));
        };

        try_outcome!(op.atomically(op.revert_record(self.collection, &id, &version)).await);
        try_result!(op.finish());
        op.fetch_record(self.collection, &id).await
    }
}
