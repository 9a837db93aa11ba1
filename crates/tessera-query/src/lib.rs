//! Query compilation for Tessera.
//!
//! `tessera-query` is the **read-side compiler**. It turns caller requests
//! over logical fields into the physical statement IR of `tessera-core`, and
//! renders that IR as SQL.
//!
//! # Role In The Architecture
//!
//! - **Filters**: [`Where`] trees (built in Rust or parsed from JSON) are
//!   compiled by [`Compiler`] into predicates; relation quantifiers become
//!   correlated `EXISTS` subqueries.
//! - **Localization**: a [`Frame`] resolves every field read of one
//!   collection, coalescing localized fields across the [`LocaleChain`].
//! - **Ordering and paging**: [`OrderBy`], [`PageInfo`], [`Paginated`].
//! - **Selection**: [`ColumnSelection`] implements inclusion and omission
//!   modes.
//! - **Rendering**: [`ToSql`] for Postgres, SQLite and MySQL.

pub mod columns;
pub mod compile;
pub mod filter;
pub mod locale;
pub mod order;
pub mod pagination;
pub mod render;

pub use columns::ColumnSelection;
pub use compile::Compiler;
pub use filter::{FieldOp, OPERATORS, Quantifier, Where};
pub use locale::{Frame, LocaleChain};
pub use order::{OrderBy, OrderFn, field_term};
pub use pagination::{PageInfo, Paginated, validate_limit};
pub use render::{ROW_NUMBER_COLUMN, ToSql, to_sql_returning};
