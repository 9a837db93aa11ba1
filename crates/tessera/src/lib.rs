//! Tessera: a headless CMS resolution engine.
//!
//! Declare collections with fields, relations, access rules and hooks; the
//! engine resolves reads and writes over them against any
//! [`Connection`]:
//!
//! - filtered, ordered, paginated reads with batched relation loading and
//!   per-relation aggregates,
//! - nested `connect`/`create`/`connectOrCreate`/`disconnect` writes,
//! - localized fields with locale fallback,
//! - soft delete, cascading deletes and version history.
//!
//! # Quick Start
//!
//! ```ignore
//! use tessera::prelude::*;
//!
//! let engine = Engine::builder()
//!     .collection(
//!         Collection::new("posts")
//!             .field(FieldDef::text("title").required().localized())
//!             .field(FieldDef::integer("viewCount").default_value(0)),
//!     )
//!     .build()?;
//!
//! let ctx = Context::system(&cx, &conn).with_locale("en");
//! engine.migrate(&ctx).await;
//! let posts = engine.collection("posts")?;
//! let page = posts
//!     .find(&ctx, &FindOptions::new().filter(Where::eq("published", true)).limit(10))
//!     .await;
//! ```
//!
//! # Crates
//!
//! | Crate | Role |
//! |-------|------|
//! | `tessera-core` | Values, rows, collections, relations, errors, statement IR |
//! | `tessera-query` | Filter compilation, localization frames, SQL rendering |
//! | `tessera-schema` | Table layout and DDL |
//! | `tessera-engine` | Query and mutation resolution |
//! | `tessera-memory` | In-memory [`Connection`] (feature `memory`) |

pub use tessera_core::{
    AccessArgs, AccessMode, CascadeAction, Collection, Connection, Cx, DefaultAccess, Dialect,
    Direction, Error, Expr, FieldDef, HookContext, HookStage, Operation, Outcome, Registry,
    Relation, Result, Row, SqlType, ValidationErrorKind, Value,
};
pub use tessera_engine::{
    AggregateRequest, AggregateResult, ChangeEvent, ChangeOperation, ChangeSink, CollectionApi,
    ConnectOrCreate, Context, CountOptions, Data, DeleteResult, Engine, EngineBuilder,
    EngineConfig, FindOptions, FindVersionsOptions, GlobalApi, MemoryChangeLog, NestedWrite,
    NoopSink, Record, Related, RelationQuery, VersionOperation, VersionRecord, VersionRef,
    WithSpec,
};
pub use tessera_query::{
    ColumnSelection, FieldOp, OrderBy, PageInfo, Paginated, Quantifier, ToSql, Where,
};
pub use tessera_schema::SchemaBuilder;

#[cfg(feature = "memory")]
pub use tessera_memory::MemoryConnection;

/// Everything a typical application needs.
pub mod prelude {
    pub use crate::{
        AggregateRequest, CascadeAction, Collection, ColumnSelection, Connection, Context,
        CountOptions, Cx, Data, DeleteResult, Direction, Engine, EngineConfig, Error, FieldDef,
        FieldOp, FindOptions, FindVersionsOptions, Operation, OrderBy, Outcome, Paginated,
        Record, Relation, RelationQuery, Value, VersionRef, Where,
    };

    #[cfg(feature = "memory")]
    pub use crate::MemoryConnection;
}
