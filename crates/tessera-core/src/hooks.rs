//! Lifecycle hooks.
//!
//! `before*` hooks receive the payload and return it, possibly transformed;
//! returning an error aborts the operation before anything is written
//! ([`Error::HookAbort`]). `after*` hooks observe the committed record;
//! their errors surface as [`Error::HookFailed`] even though the write has
//! already happened.
//!
//! Hooks are synchronous. Side effects that need I/O (queues, mail) are
//! reached through whatever the closure captured.

use std::fmt;
use std::sync::Arc;

use crate::access::AccessMode;
use crate::error::{Error, HookError, Result};
use crate::row::Row;

/// Which hook is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HookStage {
    BeforeCreate,
    AfterCreate,
    BeforeUpdate,
    AfterUpdate,
    BeforeDelete,
    AfterDelete,
}

impl HookStage {
    pub const fn as_str(&self) -> &'static str {
        match self {
            HookStage::BeforeCreate => "beforeCreate",
            HookStage::AfterCreate => "afterCreate",
            HookStage::BeforeUpdate => "beforeUpdate",
            HookStage::AfterUpdate => "afterUpdate",
            HookStage::BeforeDelete => "beforeDelete",
            HookStage::AfterDelete => "afterDelete",
        }
    }
}

/// What a hook knows about the running operation.
#[derive(Debug, Clone)]
pub struct HookContext {
    pub collection: String,
    pub stage: HookStage,
    /// Target record, when known (always set for update/delete and for
    /// `afterCreate`).
    pub id: Option<String>,
    /// State before the operation (update and delete).
    pub original: Option<Row>,
    pub locale: Option<String>,
    pub user_id: Option<String>,
    pub access: AccessMode,
}

/// Transforms or rejects a payload.
pub type BeforeHook = Arc<dyn Fn(&HookContext, Row) -> Result<Row> + Send + Sync>;

/// Observes a committed record.
pub type AfterHook = Arc<dyn Fn(&HookContext, &Row) -> Result<()> + Send + Sync>;

/// Registered hooks of one collection, run in registration order.
#[derive(Clone, Default)]
pub struct Hooks {
    before: Vec<(HookStage, BeforeHook)>,
    after: Vec<(HookStage, AfterHook)>,
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let before: Vec<&str> = self.before.iter().map(|(s, _)| s.as_str()).collect();
        let after: Vec<&str> = self.after.iter().map(|(s, _)| s.as_str()).collect();
        f.debug_struct("Hooks")
            .field("before", &before)
            .field("after", &after)
            .finish()
    }
}

impl Hooks {
    pub fn add_before<F>(&mut self, stage: HookStage, hook: F)
    where
        F: Fn(&HookContext, Row) -> Result<Row> + Send + Sync + 'static,
    {
        self.before.push((stage, Arc::new(hook)));
    }

    pub fn add_after<F>(&mut self, stage: HookStage, hook: F)
    where
        F: Fn(&HookContext, &Row) -> Result<()> + Send + Sync + 'static,
    {
        self.after.push((stage, Arc::new(hook)));
    }

    /// Whether any hook is registered for `stage`.
    pub fn has(&self, stage: HookStage) -> bool {
        self.before.iter().any(|(s, _)| *s == stage) || self.after.iter().any(|(s, _)| *s == stage)
    }

    /// Thread `row` through every before hook of `ctx.stage`.
    pub fn run_before(&self, ctx: &HookContext, mut row: Row) -> Result<Row> {
        for (stage, hook) in &self.before {
            if *stage != ctx.stage {
                continue;
            }
            row = hook(ctx, row).map_err(|e| {
                tracing::debug!(
                    collection = %ctx.collection,
                    stage = ctx.stage.as_str(),
                    error = %e,
                    "Hook aborted operation"
                );
                Error::HookAbort(HookError::new(ctx.collection.clone(), ctx.stage, e))
            })?;
        }
        Ok(row)
    }

    /// Run every after hook of `ctx.stage`, stopping at the first failure.
    pub fn run_after(&self, ctx: &HookContext, row: &Row) -> Result<()> {
        for (stage, hook) in &self.after {
            if *stage != ctx.stage {
                continue;
            }
            hook(ctx, row).map_err(|e| {
                tracing::warn!(
                    collection = %ctx.collection,
                    stage = ctx.stage.as_str(),
                    error = %e,
                    "Hook failed after write"
                );
                Error::HookFailed(HookError::new(ctx.collection.clone(), ctx.stage, e))
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn ctx(stage: HookStage) -> HookContext {
        HookContext {
            collection: "posts".into(),
            stage,
            id: None,
            original: None,
            locale: None,
            user_id: None,
            access: AccessMode::System,
        }
    }

    #[test]
    fn test_before_hooks_chain_in_order() {
        let mut hooks = Hooks::default();
        hooks.add_before(HookStage::BeforeCreate, |_, row| Ok(row.with("n", 1)));
        hooks.add_before(HookStage::BeforeCreate, |_, mut row| {
            let n = row.get("n").and_then(Value::as_i64).unwrap_or(0);
            row.set("n", n + 1);
            Ok(row)
        });
        hooks.add_before(HookStage::BeforeUpdate, |_, _| {
            Err(Error::Custom("wrong stage".into()))
        });
        let out = hooks
            .run_before(&ctx(HookStage::BeforeCreate), Row::new())
            .unwrap();
        assert_eq!(out.get("n"), Some(&Value::BigInt(2)));
    }

    #[test]
    fn test_before_error_is_abort() {
        let mut hooks = Hooks::default();
        hooks.add_before(HookStage::BeforeDelete, |_, _| {
            Err(Error::Custom("locked".into()))
        });
        let err = hooks
            .run_before(&ctx(HookStage::BeforeDelete), Row::new())
            .unwrap_err();
        assert!(matches!(err, Error::HookAbort(_)));
    }

    #[test]
    fn test_after_error_is_failed() {
        let mut hooks = Hooks::default();
        hooks.add_after(HookStage::AfterCreate, |_, _| Err(Error::Custom("queue down".into())));
        let err = hooks
            .run_after(&ctx(HookStage::AfterCreate), &Row::new())
            .unwrap_err();
        assert!(matches!(err, Error::HookFailed(_)));
    }
}
