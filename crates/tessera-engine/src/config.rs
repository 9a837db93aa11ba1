//! Engine configuration.

use std::collections::BTreeMap;

use tessera_core::{DefaultAccess, Error, Result, ValidationErrorKind};
use tessera_query::LocaleChain;

/// Configuration for an [`crate::Engine`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Locale every fallback chain ends in. Writes without a requested
    /// locale go here.
    pub default_locale: String,
    /// Locales writes may target. Empty accepts any locale.
    pub locales: Vec<String>,
    /// Explicit fallback per requested locale, consulted before the default.
    pub locale_fallbacks: BTreeMap<String, String>,
    /// Deepest `with` nesting a read may request. `None` leaves the depth to
    /// the caller.
    pub max_relation_depth: Option<usize>,
    /// Outcome for operations a collection declares no access rule for.
    pub default_access: DefaultAccess,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_locale: "en".to_string(),
            locales: Vec::new(),
            locale_fallbacks: BTreeMap::new(),
            max_relation_depth: None,
            default_access: DefaultAccess::Allow,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn default_locale(mut self, locale: impl Into<String>) -> Self {
        self.default_locale = locale.into();
        self
    }

    /// Restrict writes to these locales.
    pub fn locales<I, S>(mut self, locales: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.locales = locales.into_iter().map(Into::into).collect();
        self
    }

    /// Read `fallback` when `locale` has no value.
    pub fn fallback(mut self, locale: impl Into<String>, fallback: impl Into<String>) -> Self {
        self.locale_fallbacks.insert(locale.into(), fallback.into());
        self
    }

    pub fn max_relation_depth(mut self, depth: usize) -> Self {
        self.max_relation_depth = Some(depth);
        self
    }

    pub fn default_access(mut self, access: DefaultAccess) -> Self {
        self.default_access = access;
        self
    }

    /// Locales consulted for a request in `requested`.
    pub fn locale_chain(&self, requested: Option<&str>) -> LocaleChain {
        LocaleChain::new(requested, &self.locale_fallbacks, &self.default_locale)
    }

    /// Reject writes to a locale outside [`EngineConfig::locales`].
    pub fn check_write_locale(&self, locale: &str) -> Result<()> {
        if self.locales.is_empty()
            || locale == self.default_locale
            || self.locales.iter().any(|l| l == locale)
        {
            return Ok(());
        }
        Err(Error::validation(
            "locale",
            ValidationErrorKind::Locale,
            format!("locale '{locale}' is not configured"),
        ))
    }
}
