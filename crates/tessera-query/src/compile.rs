//! Filter compilation.
//!
//! [`Compiler`] turns a [`Where`] tree into an [`Expr`] over physical
//! columns. Relation predicates become correlated subqueries:
//!
//! | quantifier | compiled form |
//! |---|---|
//! | `some`, `is` | `EXISTS (related AND filter)` |
//! | `none`, `isNot` | `NOT EXISTS (related AND filter)` |
//! | `every` | `NOT EXISTS (related AND NOT filter)` |
//!
//! Every subquery applies the soft-delete visibility of the collections it
//! reads, so deleted records never satisfy a relation predicate.

use tessera_core::{
    Cardinality, Error, Expr, Join, JoinPath, Registry, Result, Select, ValidationErrorKind,
    columns,
};

use crate::filter::{Quantifier, Where};
use crate::locale::{Frame, LocaleChain};

/// Compiles filters for one query.
///
/// Holds the per-query alias counter; create one per statement tree.
#[derive(Debug)]
pub struct Compiler<'r> {
    registry: &'r Registry,
    chain: &'r LocaleChain,
    next_alias: usize,
}

impl<'r> Compiler<'r> {
    pub fn new(registry: &'r Registry, chain: &'r LocaleChain) -> Self {
        Self {
            registry,
            chain,
            next_alias: 0,
        }
    }

    pub fn registry(&self) -> &'r Registry {
        self.registry
    }

    pub fn chain(&self) -> &'r LocaleChain {
        self.chain
    }

    /// A fresh frame over `collection`.
    pub fn frame(&mut self, collection: &str) -> Result<Frame<'r>> {
        let collection = self.registry.get(collection)?;
        let alias = format!("t{}", self.next_alias);
        self.next_alias += 1;
        Ok(Frame::new(collection, alias, self.chain))
    }

    /// Compile `filter` against `frame`.
    pub fn compile(&mut self, frame: &Frame<'r>, filter: &Where) -> Result<Expr> {
        match filter {
            Where::And(items) => {
                let parts = items
                    .iter()
                    .map(|w| self.compile(frame, w))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Expr::and_all(parts).unwrap_or_else(|| Expr::bool(true)))
            }
            Where::Or(items) => {
                let parts = items
                    .iter()
                    .map(|w| self.compile(frame, w))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Expr::or_any(parts).unwrap_or_else(|| Expr::bool(false)))
            }
            Where::Not(inner) => Ok(self.compile(frame, inner)?.not()),
            Where::Field { field, op } => Ok(op.apply(frame.resolve(field)?)),
            Where::Relation {
                relation,
                quantifier,
                filter,
            } => self.compile_relation(frame, relation, *quantifier, filter.as_deref()),
            Where::Expr(expr) => frame.resolve_expr(expr),
        }
    }

    /// Compile an optional filter; `None` for an absent or trivially true one.
    pub fn compile_opt(&mut self, frame: &Frame<'r>, filter: Option<&Where>) -> Result<Option<Expr>> {
        match filter {
            Some(w) if !w.is_empty() => Ok(Some(self.compile(frame, w)?)),
            _ => Ok(None),
        }
    }

    fn compile_relation(
        &mut self,
        parent: &Frame<'r>,
        relation: &str,
        quantifier: Quantifier,
        filter: Option<&Where>,
    ) -> Result<Expr> {
        let registry = self.registry;
        let collection = parent.collection().name.as_str();
        let resolved = registry.graph().resolve(collection, relation)?;
        let expected = if quantifier.is_to_many() {
            Cardinality::Many
        } else {
            Cardinality::One
        };
        if resolved.cardinality() != expected {
            return Err(Error::validation(
                relation,
                ValidationErrorKind::Relation,
                format!(
                    "'{}' cannot be applied to {} relation {collection}.{relation}",
                    quantifier.as_str(),
                    resolved.relation.kind_name()
                ),
            ));
        }
        if quantifier == Quantifier::Every && filter.is_none_or(Where::is_empty) {
            return Ok(Expr::bool(true));
        }

        let path = resolved.join_path();
        if let JoinPath::Polymorphic {
            type_field,
            id_field,
            targets,
        } = &path
        {
            let mut branches = Vec::with_capacity(targets.len());
            for (type_value, target) in targets {
                let child = self.frame(target)?;
                let sub = child
                    .select()
                    .item(Expr::lit(1), "one")
                    .filter(child.column(columns::ID).eq(parent.column(id_field)))
                    .filter_opt(child.visibility(false))
                    .filter_opt(self.compile_opt(&child, filter)?);
                branches.push(
                    parent
                        .column(type_field)
                        .is_not_null()
                        .and(parent.column(type_field).eq(type_value.as_str()))
                        .and(Expr::exists(sub)),
                );
            }
            let matched = Expr::or_any(branches).unwrap_or_else(|| Expr::bool(false));
            return Ok(match quantifier {
                Quantifier::IsNot => matched.not(),
                _ => matched,
            });
        }

        let negate_filter = quantifier == Quantifier::Every;
        let sub = self.related(parent, &path, filter, negate_filter)?;
        Ok(match quantifier {
            Quantifier::Some | Quantifier::Is => Expr::exists(sub),
            Quantifier::None | Quantifier::IsNot | Quantifier::Every => Expr::not_exists(sub),
        })
    }

    /// Correlated subquery over the records related to `parent` through a
    /// direct or junction path.
    fn related(
        &mut self,
        parent: &Frame<'r>,
        path: &JoinPath,
        filter: Option<&Where>,
        negate_filter: bool,
    ) -> Result<Select> {
        let (child, mut sub) = match path {
            JoinPath::Direct {
                target,
                local,
                remote,
            } => {
                let child = self.frame(target)?;
                let sub = child
                    .select()
                    .filter(child.column(remote).eq(parent.column(local)));
                (child, sub)
            }
            JoinPath::Through {
                target,
                through,
                source_key,
                target_key,
            } => {
                let child = self.frame(target)?;
                let junction = self.frame(through)?;
                let sub = child
                    .select()
                    .join(Join::inner(
                        junction.table_ref(),
                        junction.column(target_key).eq(child.column(columns::ID)),
                    ))
                    .filter(junction.column(source_key).eq(parent.column(columns::ID)))
                    .filter_opt(junction.visibility(false));
                (child, sub)
            }
            JoinPath::Polymorphic { .. } => {
                return Err(Error::query("polymorphic path has no single related table"));
            }
        };
        sub = sub.item(Expr::lit(1), "one").filter_opt(child.visibility(false));
        if let Some(compiled) = self.compile_opt(&child, filter)? {
            sub = sub.filter(if negate_filter {
                // A NULL filter result counts as a non-match.
                Expr::Coalesce(vec![compiled, Expr::bool(false)]).not()
            } else {
                compiled
            });
        }
        Ok(sub)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FieldOp;
    use tessera_core::{CascadeAction, Collection, FieldDef, Relation, Value};

    fn registry() -> Registry {
        Registry::new(vec![
            Collection::new("users")
                .field(FieldDef::text("name"))
                .relation("posts", Relation::has_many("posts", "authorId")),
            Collection::new("posts")
                .field(FieldDef::text("title").localized())
                .field(FieldDef::text("authorId"))
                .relation("author", Relation::belongs_to("users", "authorId"))
                .relation(
                    "tags",
                    Relation::many_to_many("tags", "post_tags", "postId", "tagId")
                        .on_delete(CascadeAction::Cascade),
                )
                .soft_delete(true),
            Collection::new("tags").field(FieldDef::text("name")),
            Collection::new("post_tags")
                .field(FieldDef::text("postId"))
                .field(FieldDef::text("tagId")),
            Collection::new("comments")
                .field(FieldDef::text("targetType"))
                .field(FieldDef::text("targetId"))
                .relation(
                    "target",
                    Relation::polymorphic(
                        "targetType",
                        "targetId",
                        [("post", "posts"), ("user", "users")],
                    ),
                ),
        ])
        .unwrap()
    }

    fn compile(collection: &str, filter: &Where) -> Result<Expr> {
        let registry = registry();
        let chain = LocaleChain::single("en");
        let mut compiler = Compiler::new(&registry, &chain);
        let frame = compiler.frame(collection)?;
        compiler.compile(&frame, filter)
    }

    #[test]
    fn test_empty_and_or() {
        assert_eq!(compile("tags", &Where::And(vec![])).unwrap(), Expr::bool(true));
        assert_eq!(compile("tags", &Where::Or(vec![])).unwrap(), Expr::bool(false));
    }

    #[test]
    fn test_field_ops_resolve_to_columns() {
        let e = compile("tags", &Where::field("name", FieldOp::Ne(Value::Null))).unwrap();
        assert_eq!(e, Expr::qcol("t0", "name").is_not_null());
        let err = compile("tags", &Where::eq("nope", 1)).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_some_is_correlated_exists() {
        let e = compile("users", &Where::some("posts", Where::eq("authorId", "x"))).unwrap();
        let Expr::Exists { subquery, negated } = e else {
            panic!("expected EXISTS");
        };
        assert!(!negated);
        assert_eq!(subquery.from.reference(), "t1");
        let filter = subquery.filter.unwrap();
        assert!(!filter.has_fields());
        // correlation, child visibility and the caller filter
        assert_eq!(
            filter,
            Expr::qcol("t1", "authorId")
                .eq(Expr::qcol("t0", "id"))
                .and(Expr::qcol("t1", "deletedAt").is_null())
                .and(Expr::qcol("t1", "authorId").eq("x"))
        );
    }

    #[test]
    fn test_every_negates_filter() {
        let e = compile("posts", &Where::every("tags", Where::eq("name", "A"))).unwrap();
        let Expr::Exists { subquery, negated } = e else {
            panic!("expected NOT EXISTS");
        };
        assert!(negated);
        assert_eq!(subquery.joins.len(), 1);
        let Some(Expr::Binary { right, .. }) = subquery.filter else {
            panic!("expected filter");
        };
        assert!(matches!(*right, Expr::Not(_)));
    }

    #[test]
    fn test_every_without_filter_is_true() {
        let e = compile("posts", &Where::relation("tags", Quantifier::Every, None)).unwrap();
        assert_eq!(e, Expr::bool(true));
    }

    #[test]
    fn test_cardinality_mismatch() {
        let err = compile("posts", &Where::some("author", Where::all())).unwrap_err();
        assert!(err.is_validation());
        let err = compile("users", &Where::is("posts", Where::all())).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_polymorphic_branches() {
        let e = compile("comments", &Where::is("target", Where::all())).unwrap();
        assert!(matches!(
            e,
            Expr::Binary {
                op: tessera_core::BinaryOp::Or,
                ..
            }
        ));
        let e = compile("comments", &Where::is_not("target", Where::all())).unwrap();
        assert!(matches!(e, Expr::Not(_)));
    }

    #[test]
    fn test_localized_filter_uses_locale_join() {
        let registry = registry();
        let chain = LocaleChain::single("en");
        let mut compiler = Compiler::new(&registry, &chain);
        let frame = compiler.frame("posts").unwrap();
        let e = compiler.compile(&frame, &Where::eq("title", "Hi")).unwrap();
        assert_eq!(e, Expr::qcol("t0_l0", "title").eq("Hi"));
    }
}
