//! Select execution.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use tessera_core::{Direction, Error, JoinKind, OrderTerm, Result, Row, Select, SelectItem, Value};

use crate::eval::{Binding, Scope, eval, fold_aggregates, is_true};
use crate::store::Store;

struct Produced {
    row: Row,
    keys: Vec<Value>,
    partition: String,
}

/// Run `select` against `store`. `outer` is the enclosing query's scope for
/// correlated subqueries.
pub(crate) fn run_select(
    store: &Store,
    select: &Select,
    outer: Option<&Scope<'_>>,
) -> Result<Vec<Row>> {
    let from = store.table(&select.from.name)?;
    let from_alias = select.from.reference();
    let mut bindings: Vec<Binding<'_>> = from
        .rows
        .iter()
        .map(|row| vec![(from_alias, Some(row))])
        .collect();

    for join in &select.joins {
        let table = store.table(&join.table.name)?;
        let alias = join.table.reference();
        let mut joined = Vec::with_capacity(bindings.len());
        for binding in bindings {
            let mut matched = false;
            for row in &table.rows {
                let mut candidate = binding.clone();
                candidate.push((alias, Some(row)));
                if is_true(&eval(store, &join.on, &Scope::new(&candidate, outer))?) {
                    joined.push(candidate);
                    matched = true;
                }
            }
            if !matched && join.kind == JoinKind::Left {
                let mut candidate = binding;
                candidate.push((alias, None));
                joined.push(candidate);
            }
        }
        bindings = joined;
    }

    if let Some(filter) = &select.filter {
        let mut kept = Vec::with_capacity(bindings.len());
        for binding in bindings {
            if is_true(&eval(store, filter, &Scope::new(&binding, outer))?) {
                kept.push(binding);
            }
        }
        bindings = kept;
    }

    let mut produced = if select.is_aggregate() {
        grouped(store, select, bindings, outer)?
    } else {
        let mut produced = Vec::with_capacity(bindings.len());
        for binding in &bindings {
            let scope = Scope::new(binding, outer);
            let mut partition = String::new();
            if let Some(window) = &select.window {
                for expr in &window.partition_by {
                    partition.push_str(&eval(store, expr, &scope)?.group_key());
                    partition.push('\u{1f}');
                }
            }
            produced.push(Produced {
                row: project(store, select, binding, &scope)?,
                keys: order_keys(store, &select.order_by, &scope, None)?,
                partition,
            });
        }
        produced
    };

    produced.sort_by(|a, b| compare_keys(&a.keys, &b.keys, &select.order_by));

    if let Some(window) = &select.window {
        let mut numbers: HashMap<String, u64> = HashMap::new();
        produced.retain(|p| {
            let n = numbers.entry(p.partition.clone()).or_insert(0);
            *n += 1;
            *n > window.offset && window.limit.is_none_or(|limit| *n <= window.offset + limit)
        });
    }

    let mut rows: Vec<Row> = produced.into_iter().map(|p| p.row).collect();

    if select.distinct {
        let mut seen = HashSet::new();
        rows.retain(|row| {
            let key: String = row
                .iter()
                .map(|(column, value)| format!("{column}={}\u{1f}", value.group_key()))
                .collect();
            seen.insert(key)
        });
    }

    let offset = usize::try_from(select.offset.unwrap_or(0)).unwrap_or(usize::MAX);
    let limit = select
        .limit
        .map_or(usize::MAX, |l| usize::try_from(l).unwrap_or(usize::MAX));
    Ok(rows.into_iter().skip(offset).take(limit).collect())
}

fn project(
    store: &Store,
    select: &Select,
    binding: &Binding<'_>,
    scope: &Scope<'_>,
) -> Result<Row> {
    let mut row = Row::new();
    if select.items.is_empty() {
        if let Some(&(_, Some(from))) = binding.first() {
            row.merge(from);
        }
        return Ok(row);
    }
    for item in &select.items {
        match item {
            SelectItem::All(None) => {
                if let Some(&(_, Some(from))) = binding.first() {
                    row.merge(from);
                }
            }
            SelectItem::All(Some(alias)) => {
                let bound = binding
                    .iter()
                    .find(|(a, _)| *a == alias.as_str())
                    .ok_or_else(|| Error::query(format!("unknown table alias {alias}")))?;
                if let Some(source) = bound.1 {
                    row.merge(source);
                }
            }
            SelectItem::Expr { expr, alias } => {
                row.set(alias.clone(), eval(store, expr, scope)?);
            }
        }
    }
    Ok(row)
}

fn grouped(
    store: &Store,
    select: &Select,
    bindings: Vec<Binding<'_>>,
    outer: Option<&Scope<'_>>,
) -> Result<Vec<Produced>> {
    let mut groups: Vec<Vec<Binding<'_>>> = Vec::new();
    if select.group_by.is_empty() {
        groups.push(bindings);
    } else {
        let mut index: HashMap<String, usize> = HashMap::new();
        for binding in bindings {
            let scope = Scope::new(&binding, outer);
            let mut key = String::new();
            for expr in &select.group_by {
                key.push_str(&eval(store, expr, &scope)?.group_key());
                key.push('\u{1f}');
            }
            let slot = *index.entry(key).or_insert_with(|| {
                groups.push(Vec::new());
                groups.len() - 1
            });
            groups[slot].push(binding);
        }
    }

    let empty: Binding<'_> = Vec::new();
    let mut produced = Vec::with_capacity(groups.len());
    for group in &groups {
        let scope = Scope::new(group.first().unwrap_or(&empty), outer);
        let mut row = Row::new();
        for item in &select.items {
            let SelectItem::Expr { expr, alias } = item else {
                return Err(Error::query("'*' is not allowed in a grouped select"));
            };
            let folded = fold_aggregates(store, expr, group, outer)?;
            row.set(alias.clone(), eval(store, &folded, &scope)?);
        }
        produced.push(Produced {
            row,
            keys: order_keys(store, &select.order_by, &scope, Some((group.as_slice(), outer)))?,
            partition: String::new(),
        });
    }
    Ok(produced)
}

type GroupContext<'g, 'a> = (&'g [Binding<'a>], Option<&'g Scope<'g>>);

fn order_keys(
    store: &Store,
    terms: &[OrderTerm],
    scope: &Scope<'_>,
    group: Option<GroupContext<'_, '_>>,
) -> Result<Vec<Value>> {
    let mut keys = Vec::with_capacity(terms.len());
    for term in terms {
        keys.push(match group {
            Some((bindings, outer)) => {
                eval(store, &fold_aggregates(store, &term.expr, bindings, outer)?, scope)?
            }
            None => eval(store, &term.expr, scope)?,
        });
    }
    Ok(keys)
}

fn compare_keys(a: &[Value], b: &[Value], terms: &[OrderTerm]) -> Ordering {
    for ((left, right), term) in a.iter().zip(b).zip(terms) {
        let ord = left.sort_cmp(right);
        let ord = match term.direction {
            Direction::Asc => ord,
            Direction::Desc => ord.reverse(),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::{
        AggregateFunc, ColumnDef, Expr, Join, PartitionWindow, SqlType, Statement, TableRef,
        TableSchema,
    };

    fn store() -> Store {
        let mut store = Store::default();
        let mut authors = TableSchema::new("authors");
        authors.columns = vec![
            ColumnDef::new("id", SqlType::Text).not_null(),
            ColumnDef::new("name", SqlType::Text),
        ];
        authors.primary_key = vec!["id".to_string()];
        let mut posts = TableSchema::new("posts");
        posts.columns = vec![
            ColumnDef::new("id", SqlType::Text).not_null(),
            ColumnDef::new("authorId", SqlType::Text),
            ColumnDef::new("views", SqlType::BigInt),
        ];
        posts.primary_key = vec!["id".to_string()];
        store.execute(&Statement::CreateTable(authors)).unwrap();
        store.execute(&Statement::CreateTable(posts)).unwrap();
        store
            .execute(&Statement::insert(
                "authors",
                vec![
                    Row::new().with("id", "a1").with("name", "Ann"),
                    Row::new().with("id", "a2").with("name", "Bob"),
                    Row::new().with("id", "a3").with("name", "Cid"),
                ],
            ))
            .unwrap();
        store
            .execute(&Statement::insert(
                "posts",
                vec![
                    Row::new().with("id", "p1").with("authorId", "a1").with("views", 5),
                    Row::new().with("id", "p2").with("authorId", "a1").with("views", 7),
                    Row::new().with("id", "p3").with("authorId", "a2").with("views", 1),
                    Row::new().with("id", "p4").with("authorId", "a1").with("views", 3),
                ],
            ))
            .unwrap();
        store
    }

    fn ids(rows: &[Row]) -> Vec<&str> {
        rows.iter().filter_map(|r| r.get_str("id")).collect()
    }

    #[test]
    fn test_left_join_keeps_unmatched() {
        let store = store();
        let select = Select::from(TableRef::aliased("authors", "a"))
            .all()
            .item(Expr::qcol("p", "id"), "postId")
            .join(Join::left(
                TableRef::aliased("posts", "p"),
                Expr::qcol("p", "authorId").eq(Expr::qcol("a", "id")),
            ))
            .filter(Expr::qcol("a", "id").eq("a3"));
        let rows = run_select(&store, &select, None).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("postId"), Some(&Value::Null));
    }

    #[test]
    fn test_correlated_exists() {
        let store = store();
        let select = Select::from(TableRef::aliased("authors", "a"))
            .all()
            .filter(Expr::exists(
                Select::from(TableRef::aliased("posts", "p"))
                    .item(Expr::lit(1), "one")
                    .filter(Expr::qcol("p", "authorId").eq(Expr::qcol("a", "id")))
                    .filter(Expr::qcol("p", "views").gt(4)),
            ));
        assert_eq!(ids(&run_select(&store, &select, None).unwrap()), vec!["a1"]);
    }

    #[test]
    fn test_group_by_with_aggregates() {
        let store = store();
        let select = Select::from(TableRef::new("posts"))
            .item(Expr::col("authorId"), "author")
            .item(Expr::count_star(), "n")
            .item(Expr::aggregate(AggregateFunc::Sum, Expr::col("views")), "total")
            .group_by(Expr::col("authorId"))
            .order(OrderTerm::desc(Expr::count_star()));
        let rows = run_select(&store, &select, None).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get_str("author"), Some("a1"));
        assert_eq!(rows[0].get("n"), Some(&Value::BigInt(3)));
        assert_eq!(rows[0].get("total"), Some(&Value::BigInt(15)));
    }

    #[test]
    fn test_aggregate_over_empty_input() {
        let store = store();
        let select = Select::from(TableRef::new("posts"))
            .item(Expr::count_star(), "n")
            .item(Expr::aggregate(AggregateFunc::Max, Expr::col("views")), "max")
            .filter(Expr::col("views").gt(100));
        let rows = run_select(&store, &select, None).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("n"), Some(&Value::BigInt(0)));
        assert_eq!(rows[0].get("max"), Some(&Value::Null));
    }

    #[test]
    fn test_partition_window() {
        let store = store();
        let select = Select::from(TableRef::new("posts"))
            .all()
            .order(OrderTerm::desc(Expr::col("views")))
            .window(PartitionWindow {
                partition_by: vec![Expr::col("authorId")],
                limit: Some(1),
                offset: 1,
            });
        let rows = run_select(&store, &select, None).unwrap();
        assert_eq!(ids(&rows), vec!["p1"]);
    }

    #[test]
    fn test_order_limit_offset_and_distinct() {
        let store = store();
        let select = Select::from(TableRef::new("posts"))
            .all()
            .order(OrderTerm::asc(Expr::col("views")))
            .offset(1)
            .limit(2);
        assert_eq!(ids(&run_select(&store, &select, None).unwrap()), vec!["p4", "p1"]);

        let authors = Select::from(TableRef::new("posts"))
            .item(Expr::col("authorId"), "authorId")
            .distinct();
        assert_eq!(run_select(&store, &authors, None).unwrap().len(), 2);
    }

    #[test]
    fn test_in_subquery() {
        let store = store();
        let select = Select::from(TableRef::new("authors")).all().filter(
            Expr::col("id").in_subquery(
                Select::from(TableRef::new("posts"))
                    .item(Expr::col("authorId"), "authorId")
                    .filter(Expr::col("views").lt(2)),
            ),
        );
        assert_eq!(ids(&run_select(&store, &select, None).unwrap()), vec!["a2"]);
    }
}
