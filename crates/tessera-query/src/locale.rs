//! Locale resolution on the read side.
//!
//! A query over a localized collection LEFT JOINs one row of the locale
//! table per locale in the [`LocaleChain`] and reads every localized field
//! as `COALESCE(l0.f, l1.f, ...)`, so the requested locale wins and the
//! configured fallbacks fill the gaps.

use std::collections::BTreeMap;

use tessera_core::{
    Collection, Error, Expr, Join, Result, Select, SelectItem, TableRef, ValidationErrorKind,
    columns,
};

/// Locales consulted for a read, most preferred first.
///
/// `[requested, fallback(requested), default]`, without duplicates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocaleChain {
    locales: Vec<String>,
}

impl LocaleChain {
    pub fn new(
        requested: Option<&str>,
        fallbacks: &BTreeMap<String, String>,
        default: &str,
    ) -> Self {
        let mut locales: Vec<String> = Vec::with_capacity(3);
        let mut push = |locale: &str| {
            if !locales.iter().any(|l| l == locale) {
                locales.push(locale.to_string());
            }
        };
        if let Some(requested) = requested {
            push(requested);
            if let Some(fallback) = fallbacks.get(requested) {
                push(fallback);
            }
        }
        push(default);
        Self { locales }
    }

    /// Chain consisting of a single locale.
    pub fn single(locale: &str) -> Self {
        Self {
            locales: vec![locale.to_string()],
        }
    }

    pub fn locales(&self) -> &[String] {
        &self.locales
    }

    /// The locale writes go to.
    pub fn primary(&self) -> &str {
        self.locales.first().map_or("", String::as_str)
    }
}

/// One collection in a query: its alias and its locale joins.
#[derive(Debug, Clone)]
pub struct Frame<'r> {
    collection: &'r Collection,
    alias: String,
    /// `(join alias, locale)`, in chain order.
    locale_joins: Vec<(String, String)>,
}

impl<'r> Frame<'r> {
    pub(crate) fn new(collection: &'r Collection, alias: String, chain: &LocaleChain) -> Self {
        let locale_joins = if collection.has_locales() {
            chain
                .locales()
                .iter()
                .enumerate()
                .map(|(i, locale)| (format!("{alias}_l{i}"), locale.clone()))
                .collect()
        } else {
            Vec::new()
        };
        Self {
            collection,
            alias,
            locale_joins,
        }
    }

    pub fn collection(&self) -> &'r Collection {
        self.collection
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn table_ref(&self) -> TableRef {
        TableRef::aliased(self.collection.main_table(), &self.alias)
    }

    /// LEFT JOINs of the locale table, one per chain locale.
    pub fn joins(&self) -> Vec<Join> {
        let locale_table = self.collection.locale_table();
        self.locale_joins
            .iter()
            .map(|(join_alias, locale)| {
                Join::left(
                    TableRef::aliased(&locale_table, join_alias),
                    Expr::qcol(join_alias, columns::PARENT_ID)
                        .eq(self.column(columns::ID))
                        .and(Expr::qcol(join_alias, columns::LOCALE).eq(locale.as_str())),
                )
            })
            .collect()
    }

    /// `SELECT` over the main table with the locale joins, no items.
    pub fn select(&self) -> Select {
        let mut select = Select::from(self.table_ref());
        select.joins = self.joins();
        select
    }

    /// Physical main-table column.
    pub fn column(&self, name: &str) -> Expr {
        Expr::qcol(&self.alias, name)
    }

    /// Physical expression reading field `name`.
    pub fn resolve(&self, name: &str) -> Result<Expr> {
        if let Some(computed) = self.collection.get_computed(name) {
            return computed.expr.resolve_fields(&|f| self.resolve_stored(f));
        }
        self.resolve_stored(name)
    }

    fn resolve_stored(&self, name: &str) -> Result<Expr> {
        if self.collection.is_main_column(name) {
            return Ok(self.column(name));
        }
        if self.collection.is_localized(name) {
            let mut reads: Vec<Expr> = self
                .locale_joins
                .iter()
                .map(|(join_alias, _)| Expr::qcol(join_alias, name))
                .collect();
            return Ok(if reads.len() == 1 {
                reads.remove(0)
            } else {
                Expr::Coalesce(reads)
            });
        }
        Err(Error::validation(
            name,
            ValidationErrorKind::UnknownField,
            format!("unknown field '{name}' on {}", self.collection.name),
        ))
    }

    /// Rewrite the logical field references in `expr`.
    pub fn resolve_expr(&self, expr: &Expr) -> Result<Expr> {
        expr.resolve_fields(&|f| self.resolve(f))
    }

    /// `deletedAt IS NULL` for soft-delete collections.
    pub fn visibility(&self, include_deleted: bool) -> Option<Expr> {
        (self.collection.has_soft_delete() && !include_deleted)
            .then(|| self.column(columns::DELETED_AT).is_null())
    }

    /// `resolve(name) AS name` for every name.
    pub fn projection<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<SelectItem>> {
        names
            .iter()
            .map(|name| {
                let name = name.as_ref();
                Ok(SelectItem::Expr {
                    expr: self.resolve(name)?,
                    alias: name.to_string(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::FieldDef;

    fn pages() -> Collection {
        Collection::new("pages")
            .field(FieldDef::text("slug"))
            .field(FieldDef::text("title").localized())
            .computed(
                "label",
                Expr::Concat(vec![Expr::field("slug"), Expr::lit(": "), Expr::field("title")]),
            )
            .soft_delete(true)
    }

    #[test]
    fn test_chain_order_and_dedup() {
        let fallbacks: BTreeMap<String, String> = [("sk".to_string(), "cs".to_string())].into();
        let chain = LocaleChain::new(Some("sk"), &fallbacks, "en");
        assert_eq!(chain.locales(), ["sk", "cs", "en"]);
        let chain = LocaleChain::new(Some("en"), &fallbacks, "en");
        assert_eq!(chain.locales(), ["en"]);
        let chain = LocaleChain::new(None, &fallbacks, "en");
        assert_eq!(chain.primary(), "en");
    }

    #[test]
    fn test_localized_field_coalesces() {
        let pages = pages();
        let chain = LocaleChain::new(Some("sk"), &BTreeMap::new(), "en");
        let frame = Frame::new(&pages, "t0".into(), &chain);
        assert_eq!(frame.joins().len(), 2);
        assert_eq!(
            frame.resolve("title").unwrap(),
            Expr::Coalesce(vec![Expr::qcol("t0_l0", "title"), Expr::qcol("t0_l1", "title")])
        );
        assert_eq!(frame.resolve("slug").unwrap(), Expr::qcol("t0", "slug"));
    }

    #[test]
    fn test_computed_resolves_through_locales() {
        let pages = pages();
        let chain = LocaleChain::single("en");
        let frame = Frame::new(&pages, "t0".into(), &chain);
        let label = frame.resolve("label").unwrap();
        assert!(!label.has_fields());
        assert_eq!(
            label,
            Expr::Concat(vec![
                Expr::qcol("t0", "slug"),
                Expr::lit(": "),
                Expr::qcol("t0_l0", "title")
            ])
        );
    }

    #[test]
    fn test_unknown_field_and_visibility() {
        let pages = pages();
        let chain = LocaleChain::single("en");
        let frame = Frame::new(&pages, "t0".into(), &chain);
        assert!(frame.resolve("nope").unwrap_err().is_validation());
        assert_eq!(
            frame.visibility(false),
            Some(Expr::qcol("t0", "deletedAt").is_null())
        );
        assert_eq!(frame.visibility(true), None);
    }
}
