//! Physical layout and DDL for Tessera collections.
//!
//! `tessera-schema` maps declared collections onto tables and renders the
//! `CREATE` statements for each supported dialect.
//!
//! # Role In The Architecture
//!
//! - **Physical layout**: [`PhysicalTables`] compiles a collection into its
//!   main, locale, version and locale-version tables.
//! - **DDL**: [`DdlGenerator`] implementations per dialect.
//! - **Migrations**: [`SchemaBuilder`] orders the tables of a whole registry
//!   for creation. The engine's `migrate` executes its statements.

pub mod builder;
pub mod ddl;
pub mod physical;

pub use builder::SchemaBuilder;
pub use ddl::{
    DdlGenerator, MysqlDdlGenerator, PostgresDdlGenerator, SqliteDdlGenerator, generator_for,
};
pub use physical::PhysicalTables;
