//! Query and mutation resolution for Tessera.
//!
//! `tessera-engine` is the **runtime** of the workspace: it turns facade
//! calls on declared collections into statements, runs them against a
//! [`tessera_core::Connection`] and shapes the results.
//!
//! # Role In The Architecture
//!
//! - **Facade**: [`Engine`] hands out a [`CollectionApi`] per collection and
//!   a [`GlobalApi`] per global. Every call takes an explicit [`Context`].
//! - **Reads**: filters, ordering, paging and column selection compile
//!   through `tessera-query`; `with` trees load in batches, one query per
//!   relation and level.
//! - **Writes**: nested `connect`/`create`/`connectOrCreate`/`disconnect`,
//!   hooks, validation, localized rows and version history, all inside a
//!   savepoint per call.
//! - **Deletes**: `restrict`, `cascade` and `setNull` dependents, soft or
//!   hard delete, restore.
//! - **Changes**: one [`ChangeEvent`] per committed mutation, handed to the
//!   configured [`ChangeSink`].
//!
//! # Errors
//!
//! `after*` hooks run once the call's savepoint is released. When one
//! fails the call returns [`tessera_core::Error::HookFailed`] although the
//! write has been committed.

pub mod changes;
pub mod config;
pub mod context;
pub mod crud;
pub mod data;
pub mod engine;
pub mod global;
pub mod options;
pub mod record;
pub mod versions;

mod delete;
mod loader;
mod mutation;
mod op;
mod read;
mod state;

pub use changes::{ChangeEvent, ChangeOperation, ChangeSink, MemoryChangeLog, NoopSink};
pub use config::EngineConfig;
pub use context::Context;
pub use crud::{CollectionApi, DeleteResult};
pub use data::{ConnectOrCreate, Data, NestedWrite};
pub use engine::{Engine, EngineBuilder};
pub use global::GlobalApi;
pub use options::{AggregateRequest, CountOptions, FindOptions, RelationQuery, WithSpec};
pub use record::{AggregateResult, Record, Related};
pub use versions::{FindVersionsOptions, VersionOperation, VersionRecord, VersionRef};
