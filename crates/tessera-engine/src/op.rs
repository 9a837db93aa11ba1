//! State of one facade call.
//!
//! An [`Op`] carries the engine, the caller's context and the locale chain
//! through every step of an operation. Mutations queue their `after*` hooks
//! and change events on it; [`Op::finish`] runs them once the outermost
//! savepoint has been released.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, PoisonError};

use tessera_core::{
    AccessArgs, Collection, Connection, Error, HookContext, HookStage, Operation, Outcome, Result,
    Row, Select, Statement, now, try_outcome,
};
use tessera_query::{Compiler, LocaleChain, ROW_NUMBER_COLUMN};

use crate::changes::{ChangeEvent, ChangeOperation};
use crate::context::Context;
use crate::engine::EngineInner;

/// Boxed future for the recursive steps (relation loading, cascades,
/// nested writes).
pub(crate) type BoxOutcome<'a, T> = Pin<Box<dyn Future<Output = Outcome<T, Error>> + Send + 'a>>;

/// Deferred post-commit work for one record.
struct Effect {
    hook: Option<(HookContext, Row)>,
    event: ChangeEvent,
}

pub(crate) struct Op<'a, C> {
    pub(crate) engine: &'a EngineInner,
    pub(crate) ctx: &'a Context<'a, C>,
    pub(crate) chain: LocaleChain,
    effects: Mutex<Vec<Effect>>,
    /// `(collection, id)` of records whose delete has started.
    deleting: Mutex<HashSet<(String, String)>>,
}

impl<'a, C: Connection> Op<'a, C> {
    pub(crate) fn new(engine: &'a EngineInner, ctx: &'a Context<'a, C>) -> Self {
        Self {
            engine,
            ctx,
            chain: engine.config.locale_chain(ctx.locale()),
            effects: Mutex::new(Vec::new()),
            deleting: Mutex::new(HashSet::new()),
        }
    }

    pub(crate) fn collection(&self, name: &str) -> Result<&'a Collection> {
        self.engine.registry.get(name)
    }

    pub(crate) fn compiler(&self) -> Compiler<'_> {
        Compiler::new(&self.engine.registry, &self.chain)
    }

    /// Locale writes of this operation go to.
    pub(crate) fn write_locale(&self) -> &str {
        self.chain.primary()
    }

    pub(crate) fn check_access(
        &self,
        collection: &Collection,
        operation: Operation,
        id: Option<&str>,
        data: Option<&Row>,
    ) -> Result<()> {
        collection.access.check(
            self.ctx.access,
            self.engine.config.default_access,
            &AccessArgs {
                collection: &collection.name,
                operation,
                user_id: self.ctx.user_id(),
                locale: self.ctx.locale(),
                id,
                data,
            },
        )
    }

    pub(crate) fn hook_context(
        &self,
        collection: &Collection,
        stage: HookStage,
        id: Option<&str>,
        original: Option<&Row>,
    ) -> HookContext {
        HookContext {
            collection: collection.name.clone(),
            stage,
            id: id.map(str::to_string),
            original: original.cloned(),
            locale: Some(self.write_locale().to_string()),
            user_id: self.ctx.user_id.clone(),
            access: self.ctx.access,
        }
    }

    /// Mark `id` as being deleted. False if it already was, which stops
    /// cascades from revisiting it.
    pub(crate) fn begin_delete(&self, collection: &str, id: &str) -> bool {
        self.deleting
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((collection.to_string(), id.to_string()))
    }

    // ==================== Statements ====================

    pub(crate) async fn query(&self, select: &Select) -> Outcome<Vec<Row>, Error> {
        tracing::debug!(table = %select.from.name, "Querying");
        let mut rows = try_outcome!(self.ctx.conn.query(self.ctx.cx, select).await);
        for row in &mut rows {
            row.remove(ROW_NUMBER_COLUMN);
        }
        Outcome::Ok(rows)
    }

    pub(crate) async fn execute(&self, statement: &Statement) -> Outcome<u64, Error> {
        tracing::debug!(table = %statement.table(), kind = statement.kind(), "Executing");
        self.ctx.conn.execute(self.ctx.cx, statement).await
    }

    pub(crate) async fn execute_returning(&self, statement: &Statement) -> Outcome<Vec<Row>, Error> {
        tracing::debug!(table = %statement.table(), kind = statement.kind(), "Executing");
        self.ctx.conn.execute_returning(self.ctx.cx, statement).await
    }

    /// Run `work` inside a savepoint, rolling back to it on any failure.
    pub(crate) async fn atomically<T>(
        &self,
        work: impl Future<Output = Outcome<T, Error>>,
    ) -> Outcome<T, Error> {
        let conn = self.ctx.conn;
        let cx = self.ctx.cx;
        let name = self.engine.next_savepoint();
        let mark = self.pending();

        try_outcome!(conn.savepoint(cx, &name).await);
        match work.await {
            Outcome::Ok(value) => {
                try_outcome!(conn.release(cx, &name).await);
                Outcome::Ok(value)
            }
            failed => {
                self.discard_from(mark);
                match conn.rollback_to(cx, &name).await {
                    Outcome::Ok(()) => {
                        tracing::debug!(savepoint = %name, "Rolled back failed operation");
                        if let Outcome::Err(e) = conn.release(cx, &name).await {
                            tracing::warn!(savepoint = %name, error = %e, "Failed to release savepoint");
                        }
                    }
                    Outcome::Err(e) => {
                        tracing::warn!(savepoint = %name, error = %e, "Failed to roll back savepoint");
                    }
                    Outcome::Cancelled(_) | Outcome::Panicked(_) => {
                        tracing::warn!(savepoint = %name, "Rollback interrupted");
                    }
                }
                failed
            }
        }
    }

    // ==================== Deferred effects ====================

    /// Queue the `after*` hooks and the change event of a committed record.
    pub(crate) fn defer(
        &self,
        collection: &Collection,
        stage: HookStage,
        operation: ChangeOperation,
        hook: Option<HookContext>,
        row: Row,
    ) {
        let id = row.get_str(tessera_core::columns::ID).unwrap_or_default().to_string();
        let hook = hook
            .filter(|_| collection.hooks.has(stage))
            .map(|ctx| (ctx, row));
        let event = ChangeEvent {
            collection: collection.name.clone(),
            operation,
            id,
            user_id: self.ctx.user_id.clone(),
            locale: self.ctx.locale.clone(),
            at: now(),
        };
        self.effects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Effect { hook, event });
    }

    fn pending(&self) -> usize {
        self.effects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn discard_from(&self, mark: usize) {
        self.effects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .truncate(mark);
    }

    /// Run queued `after*` hooks, then publish the change events.
    ///
    /// Every event is published because every write is committed; the first
    /// hook failure stops further hooks and is returned.
    pub(crate) fn finish(&self) -> Result<()> {
        let effects = std::mem::take(
            &mut *self
                .effects
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        let mut failure: Option<Error> = None;
        for effect in effects {
            if failure.is_none() {
                if let Some((ctx, row)) = &effect.hook {
                    failure = self.run_after(ctx, row).err();
                }
            }
            self.engine.sink.append(effect.event);
        }
        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn run_after(&self, ctx: &HookContext, row: &Row) -> Result<()> {
        self.engine
            .registry
            .get(&ctx.collection)?
            .hooks
            .run_after(ctx, row)
    }
}
