//! Core types for Tessera.
//!
//! `tessera-core` is the **foundation layer** of the workspace. It defines the
//! data that flows between the engine and the store, the contract a store has
//! to implement, and the declarative model of collections.
//!
//! # Role In The Architecture
//!
//! - **Data model**: [`Value`], [`Row`] and [`SqlType`] carry record fields,
//!   filter operands and statement parameters.
//! - **Statement IR**: [`Expr`], [`Select`] and [`Statement`] describe every
//!   query and write the engine issues. Stores execute the IR; SQL-speaking
//!   stores render it with `tessera-query`.
//! - **Store contract**: [`Connection`] is implemented by `tessera-memory` and
//!   by any SQL driver adapter.
//! - **Declarations**: [`Collection`], [`FieldDef`] and [`Relation`] are
//!   validated into a [`Registry`] holding the [`RelationGraph`].
//! - **Structured concurrency**: re-exports `Cx` and `Outcome` from asupersync
//!   so every async operation is cancel-correct.
//!
//! Most applications should use the `tessera` facade.

pub use asupersync::{Cx, Outcome};

pub mod access;
pub mod collection;
pub mod connection;
pub mod error;
pub mod expr;
pub mod hooks;
pub mod ids;
pub mod registry;
pub mod relationship;
pub mod row;
pub mod schema;
pub mod statement;
pub mod types;
pub mod validate;
pub mod value;

pub use access::{AccessArgs, AccessFn, AccessMode, AccessRules, DefaultAccess, Operation};
pub use collection::{
    Collection, CollectionKind, CollectionOptions, ComputedField, FieldDef, FieldRules,
    ForeignKeyRef, VersioningOptions, columns,
};
pub use connection::{Connection, Dialect};
pub use error::{
    AccessDeniedError, ConstraintError, ConstraintKind, Error, FieldValidationError, HookError,
    NotFoundError, QueryError, RestrictedDeleteError, Result, ValidationError, ValidationErrorKind,
};
pub use expr::{AggregateFunc, ArrayOp, BinaryOp, Expr, escape_like};
pub use hooks::{AfterHook, BeforeHook, HookContext, HookStage, Hooks};
pub use ids::{new_id, now};
pub use registry::Registry;
pub use relationship::{
    Cardinality, CascadeAction, Dependent, DependentKey, JoinPath, Relation, RelationGraph,
    RelationKind, ResolvedRelation,
};
pub use row::Row;
pub use schema::{ColumnDef, ForeignKey, ReferentialAction, TableSchema};
pub use statement::{
    Delete, Direction, INTERNAL_COLUMN_PREFIX, Insert, Join, JoinKind, OrderTerm, PartitionWindow,
    Select, SelectItem, Statement, TableRef, Update,
};
pub use types::SqlType;
pub use value::Value;

/// Unwrap an [`Outcome`], returning early from the enclosing function (or
/// async block) on anything but `Ok`.
#[macro_export]
macro_rules! try_outcome {
    ($e:expr) => {
        match $e {
            $crate::Outcome::Ok(v) => v,
            $crate::Outcome::Err(e) => return $crate::Outcome::Err(e),
            $crate::Outcome::Cancelled(r) => return $crate::Outcome::Cancelled(r),
            $crate::Outcome::Panicked(p) => return $crate::Outcome::Panicked(p),
        }
    };
}

/// Unwrap a [`Result`] inside a function returning [`Outcome`].
#[macro_export]
macro_rules! try_result {
    ($e:expr) => {
        match $e {
            Ok(v) => v,
            Err(e) => return $crate::Outcome::Err(e),
        }
    };
}
