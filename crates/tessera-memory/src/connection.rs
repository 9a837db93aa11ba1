//! [`Connection`] implementation over the in-process store.

// Allow `impl Future` return types in trait methods - intentional for async trait compat
#![allow(clippy::manual_async_fn)]

use std::future::Future;
use std::sync::Arc;

use asupersync::sync::Mutex;
use asupersync::{Cx, Outcome};
use tessera_core::{Connection, Error, Result, Row, Select, Statement};

use crate::select::run_select;
use crate::store::Store;

#[derive(Default)]
struct State {
    store: Store,
    savepoints: Vec<(String, Store)>,
    queries: u64,
}

impl State {
    fn savepoint_position(&self, name: &str) -> Result<usize> {
        self.savepoints
            .iter()
            .rposition(|(n, _)| n == name)
            .ok_or_else(|| Error::query(format!("no such savepoint: {name}")))
    }
}

/// An in-process relational store.
///
/// Tables are created by `CreateTable` statements and enforce primary key,
/// unique, NOT NULL and foreign key constraints including `ON DELETE`
/// actions. Savepoints are snapshots. Clones share the same store.
#[derive(Clone)]
pub struct MemoryConnection {
    inner: Arc<Mutex<State>>,
}

impl std::fmt::Debug for MemoryConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryConnection")
            .field("inner", &"Arc<Mutex<State>>")
            .finish()
    }
}

impl Default for MemoryConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryConnection {
    /// An empty store.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(State::default())),
        }
    }

    /// Names of all created tables.
    pub async fn table_names(&self, cx: &Cx) -> Outcome<Vec<String>, Error> {
        self.with_state(cx, |state| Ok(state.store.table_names()))
            .await
    }

    /// Number of `SELECT`s run so far. Savepoint rollbacks do not reset it.
    pub async fn query_count(&self, cx: &Cx) -> Outcome<u64, Error> {
        self.with_state(cx, |state| Ok(state.queries)).await
    }

    /// Every row of `table` in insertion order.
    pub async fn rows(&self, cx: &Cx, table: &str) -> Outcome<Vec<Row>, Error> {
        self.with_state(cx, |state| Ok(state.store.table(table)?.rows.clone()))
            .await
    }

    async fn with_state<T>(
        &self,
        cx: &Cx,
        op: impl FnOnce(&mut State) -> Result<T>,
    ) -> Outcome<T, Error> {
        if let Some(reason) = cx.cancel_reason() {
            return Outcome::Cancelled(reason);
        }
        let Ok(mut guard) = self.inner.lock(cx).await else {
            return Outcome::Err(Error::query("failed to acquire store lock"));
        };
        match op(&mut *guard) {
            Ok(value) => Outcome::Ok(value),
            Err(e) => Outcome::Err(e),
        }
    }
}

impl Connection for MemoryConnection {
    fn query(
        &self,
        cx: &Cx,
        select: &Select,
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
        async move {
            self.with_state(cx, |state| {
                state.queries += 1;
                let rows = run_select(&state.store, select, None)?;
                tracing::trace!(table = %select.from.name, rows = rows.len(), "Query");
                Ok(rows)
            })
            .await
        }
    }

    fn execute(
        &self,
        cx: &Cx,
        statement: &Statement,
    ) -> impl Future<Output = Outcome<u64, Error>> + Send {
        async move {
            match self.execute_returning(cx, statement).await {
                Outcome::Ok(rows) => Outcome::Ok(rows.len() as u64),
                Outcome::Err(e) => Outcome::Err(e),
                Outcome::Cancelled(r) => Outcome::Cancelled(r),
                Outcome::Panicked(p) => Outcome::Panicked(p),
            }
        }
    }

    fn execute_returning(
        &self,
        cx: &Cx,
        statement: &Statement,
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
        async move {
            self.with_state(cx, |state| {
                let rows = state.store.execute(statement)?;
                tracing::debug!(
                    table = %statement.table(),
                    kind = statement.kind(),
                    rows = rows.len(),
                    "Executed statement"
                );
                Ok(rows)
            })
            .await
        }
    }

    fn savepoint(&self, cx: &Cx, name: &str) -> impl Future<Output = Outcome<(), Error>> + Send {
        async move {
            self.with_state(cx, |state| {
                let snapshot = state.store.clone();
                state.savepoints.push((name.to_string(), snapshot));
                Ok(())
            })
            .await
        }
    }

    fn rollback_to(
        &self,
        cx: &Cx,
        name: &str,
    ) -> impl Future<Output = Outcome<(), Error>> + Send {
        async move {
            self.with_state(cx, |state| {
                let position = state.savepoint_position(name)?;
                state.savepoints.truncate(position + 1);
                state.store = state.savepoints[position].1.clone();
                tracing::debug!(savepoint = name, "Rolled back to savepoint");
                Ok(())
            })
            .await
        }
    }

    fn release(&self, cx: &Cx, name: &str) -> impl Future<Output = Outcome<(), Error>> + Send {
        async move {
            self.with_state(cx, |state| {
                let position = state.savepoint_position(name)?;
                state.savepoints.truncate(position);
                Ok(())
            })
            .await
        }
    }
}
