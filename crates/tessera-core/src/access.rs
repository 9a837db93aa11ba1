//! Access predicates.
//!
//! An access rule is a capability check: a closure that sees who is asking
//! and for what, and answers yes or no. Rules run before any I/O. Requests in
//! [`AccessMode::System`] bypass them entirely.

use std::fmt;
use std::sync::Arc;

use crate::error::{AccessDeniedError, Error, Result};
use crate::row::Row;

/// Operation being authorized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// find, findOne, count, findVersions.
    Read,
    Create,
    /// update, restore, revert.
    Update,
    Delete,
}

impl Operation {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Operation::Read => "read",
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }
}

/// Whether access rules apply to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessMode {
    /// Trusted caller; rules are skipped.
    System,
    /// End-user request; rules are enforced.
    #[default]
    User,
}

/// Outcome when a collection declares no rule for an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DefaultAccess {
    #[default]
    Allow,
    Deny,
}

/// Arguments passed to an access predicate.
#[derive(Debug, Clone, Copy)]
pub struct AccessArgs<'a> {
    pub collection: &'a str,
    pub operation: Operation,
    pub user_id: Option<&'a str>,
    pub locale: Option<&'a str>,
    /// Target record id for id-based operations.
    pub id: Option<&'a str>,
    /// Write payload for create/update.
    pub data: Option<&'a Row>,
}

/// An access predicate.
pub type AccessFn = Arc<dyn Fn(&AccessArgs<'_>) -> bool + Send + Sync>;

/// Per-operation access predicates of a collection.
#[derive(Clone, Default)]
pub struct AccessRules {
    read: Option<AccessFn>,
    create: Option<AccessFn>,
    update: Option<AccessFn>,
    delete: Option<AccessFn>,
}

impl fmt::Debug for AccessRules {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessRules")
            .field("read", &self.read.is_some())
            .field("create", &self.create.is_some())
            .field("update", &self.update.is_some())
            .field("delete", &self.delete.is_some())
            .finish()
    }
}

impl AccessRules {
    pub fn set<F>(&mut self, operation: Operation, check: F)
    where
        F: Fn(&AccessArgs<'_>) -> bool + Send + Sync + 'static,
    {
        let check: AccessFn = Arc::new(check);
        match operation {
            Operation::Read => self.read = Some(check),
            Operation::Create => self.create = Some(check),
            Operation::Update => self.update = Some(check),
            Operation::Delete => self.delete = Some(check),
        }
    }

    pub fn get(&self, operation: Operation) -> Option<&AccessFn> {
        match operation {
            Operation::Read => self.read.as_ref(),
            Operation::Create => self.create.as_ref(),
            Operation::Update => self.update.as_ref(),
            Operation::Delete => self.delete.as_ref(),
        }
    }

    /// Evaluate the rule for `args.operation`.
    pub fn check(&self, mode: AccessMode, default: DefaultAccess, args: &AccessArgs<'_>) -> Result<()> {
        if mode == AccessMode::System {
            return Ok(());
        }
        let allowed = match self.get(args.operation) {
            Some(check) => check(args),
            None => default == DefaultAccess::Allow,
        };
        if allowed {
            Ok(())
        } else {
            tracing::debug!(
                collection = args.collection,
                operation = args.operation.as_str(),
                user_id = ?args.user_id,
                "Access denied"
            );
            Err(Error::AccessDenied(AccessDeniedError {
                collection: args.collection.to_string(),
                operation: args.operation,
            }))
        }
    }
}
