//! Request context.

use std::fmt;

use tessera_core::{AccessMode, Connection, Cx};

/// Everything one operation needs to know about its caller.
///
/// Passed explicitly to every facade call; hooks see a copy of the relevant
/// parts through [`tessera_core::HookContext`].
pub struct Context<'a, C> {
    /// Capability context for cancellation.
    pub cx: &'a Cx,
    /// Store the operation runs against.
    pub conn: &'a C,
    pub access: AccessMode,
    /// Requested locale; `None` means the configured default.
    pub locale: Option<String>,
    /// Acting user, recorded on version rows and change events.
    pub user_id: Option<String>,
}

impl<C> fmt::Debug for Context<'_, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("access", &self.access)
            .field("locale", &self.locale)
            .field("user_id", &self.user_id)
            .finish_non_exhaustive()
    }
}

impl<'a, C: Connection> Context<'a, C> {
    /// An end-user request; access rules are enforced.
    pub fn new(cx: &'a Cx, conn: &'a C) -> Self {
        Self {
            cx,
            conn,
            access: AccessMode::User,
            locale: None,
            user_id: None,
        }
    }

    /// A trusted request that bypasses access rules.
    pub fn system(cx: &'a Cx, conn: &'a C) -> Self {
        Self::new(cx, conn).with_access(AccessMode::System)
    }

    pub fn with_access(mut self, access: AccessMode) -> Self {
        self.access = access;
        self
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn locale(&self) -> Option<&str> {
        self.locale.as_deref()
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }
}
