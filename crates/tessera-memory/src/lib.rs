//! In-process store for Tessera.
//!
//! `tessera-memory` implements [`tessera_core::Connection`] by evaluating the
//! statement IR directly, without rendering SQL. It is the default store of
//! the `tessera` facade and the backend of the workspace's tests.
//!
//! # Semantics
//!
//! - Filters use SQL three-valued logic; only TRUE keeps a row.
//! - `LIKE` honours `%`, `_` and the `\` escape.
//! - Joins, correlated subqueries, grouping, `DISTINCT` and per-partition
//!   windows are supported. Raw SQL fragments are rejected.
//! - NULLs sort first in ascending order.
//! - Every statement is atomic. Savepoints snapshot the whole store.

mod connection;
mod eval;
mod select;
mod store;

pub use connection::MemoryConnection;
