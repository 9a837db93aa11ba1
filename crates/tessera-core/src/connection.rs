//! The store contract.

use std::future::Future;

use asupersync::{Cx, Outcome};

use crate::error::Error;
use crate::row::Row;
use crate::statement::{Select, Statement};

/// SQL dialect of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dialect {
    #[default]
    Postgres,
    Sqlite,
    Mysql,
}

impl Dialect {
    /// Quote an identifier.
    pub fn quote_ident(&self, ident: &str) -> String {
        match self {
            Dialect::Mysql => format!("`{}`", ident.replace('`', "``")),
            Dialect::Postgres | Dialect::Sqlite => format!("\"{}\"", ident.replace('"', "\"\"")),
        }
    }

    /// Placeholder for the `index`-th (1-based) parameter.
    pub fn placeholder(&self, index: usize) -> String {
        match self {
            Dialect::Postgres => format!("${index}"),
            Dialect::Sqlite => format!("?{index}"),
            Dialect::Mysql => "?".to_string(),
        }
    }

    /// Whether `ILIKE` is native.
    pub const fn supports_ilike(&self) -> bool {
        matches!(self, Dialect::Postgres)
    }
}

/// A relational store.
///
/// Statements arrive as IR; SQL-speaking implementations render them with
/// `tessera-query` for their [`Dialect`]. All operations honour the caller's
/// [`Cx`] for cancellation.
///
/// Savepoints nest: `rollback_to(name)` discards every change since
/// `savepoint(name)` and `release(name)` keeps them.
pub trait Connection: Send + Sync {
    /// Dialect used to render statements.
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    /// Run a query and return all rows.
    fn query(
        &self,
        cx: &Cx,
        select: &Select,
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send;

    /// Execute a statement and return the number of affected rows.
    fn execute(
        &self,
        cx: &Cx,
        statement: &Statement,
    ) -> impl Future<Output = Outcome<u64, Error>> + Send;

    /// Execute a statement and return the affected rows (`RETURNING *`).
    /// Deletes return the rows as they were before removal.
    fn execute_returning(
        &self,
        cx: &Cx,
        statement: &Statement,
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send;

    /// Create a savepoint.
    fn savepoint(&self, cx: &Cx, name: &str) -> impl Future<Output = Outcome<(), Error>> + Send;

    /// Roll back to a savepoint.
    fn rollback_to(&self, cx: &Cx, name: &str)
    -> impl Future<Output = Outcome<(), Error>> + Send;

    /// Release a savepoint.
    fn release(&self, cx: &Cx, name: &str) -> impl Future<Output = Outcome<(), Error>> + Send;
}
