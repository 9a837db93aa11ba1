//! Relation loading.
//!
//! Relations load level by level: one query per requested relation covers
//! every parent of the level (one per target type for polymorphic
//! relations), then the nested `with` runs over the children of that level.
//! Children are correlated to their parents through an extra `__parent`
//! output holding the parent key.

use std::collections::{BTreeMap, HashMap, HashSet};

use tessera_core::{
    AggregateFunc, Cardinality, Collection, Connection, Error, Expr, Join, JoinPath, Outcome,
    PartitionWindow, Result, Row, Select, SqlType, ValidationErrorKind, Value, columns,
    try_outcome, try_result,
};
use tessera_query::{Compiler, Frame, OrderBy, validate_limit};

use crate::op::{BoxOutcome, Op};
use crate::options::{AggregateRequest, RelationQuery, WithSpec};
use crate::read::Selection;
use crate::record::{AggregateResult, Record, Related};

const PARENT_KEY: &str = "__parent";
const COUNT_ALIAS: &str = "_count";

/// How children are tied to a parent key.
#[derive(Debug, Clone, Copy)]
enum Link<'l> {
    /// `child.remote = parent key`.
    Column { remote: &'l str },
    /// `junction.source_key = parent key AND junction.target_key = child.id`.
    Junction {
        through: &'l str,
        source_key: &'l str,
        target_key: &'l str,
    },
}

/// Distinct non-null values of `column` across `records`.
fn parent_keys<'r>(records: impl IntoIterator<Item = &'r Record>, column: &str) -> Vec<Value> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter_map(|record| record.fields.get(column))
        .filter(|value| !value.is_null() && seen.insert(value.group_key()))
        .cloned()
        .collect()
}

fn key_of(record: &Record, column: &str) -> Option<String> {
    record
        .fields
        .get(column)
        .filter(|value| !value.is_null())
        .map(Value::group_key)
}

/// Select over the child frame correlated through `link`, and the
/// expression holding the parent key.
fn correlate<'r>(
    compiler: &mut Compiler<'r>,
    frame: &Frame<'r>,
    link: Link<'_>,
) -> Result<(Select, Expr)> {
    let select = frame.select();
    match link {
        Link::Column { remote } => Ok((select, frame.column(remote))),
        Link::Junction {
            through,
            source_key,
            target_key,
        } => {
            let junction = compiler.frame(through)?;
            let select = select
                .join(Join::inner(
                    junction.table_ref(),
                    junction
                        .column(target_key)
                        .eq(frame.column(columns::ID)),
                ))
                .filter_opt(junction.visibility(false));
            Ok((select, junction.column(source_key)))
        }
    }
}

/// Drop duplicate `(parent, child)` pairs, then apply `offset`/`limit`
/// within each parent.
fn slice_per_parent(
    rows: Vec<(String, Record)>,
    limit: Option<u64>,
    offset: u64,
) -> Vec<(String, Record)> {
    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut positions: HashMap<String, u64> = HashMap::new();
    let mut kept = Vec::with_capacity(rows.len());
    for (parent, child) in rows {
        let child_id = child.id().unwrap_or_default().to_string();
        if !seen.insert((parent.clone(), child_id)) {
            continue;
        }
        let position = positions.entry(parent.clone()).or_insert(0);
        *position += 1;
        if *position <= offset || limit.is_some_and(|limit| *position > offset + limit) {
            continue;
        }
        kept.push((parent, child));
    }
    kept
}

// ==================== Aggregates ====================

fn aggregate_columns(request: &AggregateRequest) -> [(AggregateFunc, &'static str, &[String]); 4] {
    [
        (AggregateFunc::Sum, "_sum", &request.sum),
        (AggregateFunc::Avg, "_avg", &request.avg),
        (AggregateFunc::Min, "_min", &request.min),
        (AggregateFunc::Max, "_max", &request.max),
    ]
}

fn check_aggregate_fields(target: &Collection, request: &AggregateRequest) -> Result<()> {
    for field in request.sum.iter().chain(&request.avg) {
        if !target.get_field(field).is_some_and(|f| f.sql_type.is_numeric()) {
            return Err(Error::validation(
                field,
                ValidationErrorKind::Type,
                format!("'{field}' on {} is not a numeric field", target.name),
            ));
        }
    }
    for field in request.min.iter().chain(&request.max) {
        if !target.is_readable(field) {
            return Err(Error::validation(
                field,
                ValidationErrorKind::UnknownField,
                format!("unknown field '{field}' on {}", target.name),
            ));
        }
    }
    Ok(())
}

/// Read one aggregate row. Missing sums and averages become zero; missing
/// extremes stay NULL.
fn aggregate_from_row(target: &Collection, request: &AggregateRequest, row: &Row) -> AggregateResult {
    let mut result = AggregateResult {
        count: row
            .get(COUNT_ALIAS)
            .and_then(Value::as_i64)
            .map_or(0, |n| u64::try_from(n).unwrap_or(0)),
        ..AggregateResult::default()
    };
    for (func, prefix, fields) in aggregate_columns(request) {
        for field in fields {
            let value = row.get_or_null(&format!("{prefix}.{field}"));
            match func {
                AggregateFunc::Sum => {
                    let value = if value.is_null() {
                        zero_of(target, field)
                    } else {
                        value
                    };
                    result.sum.insert(field.clone(), value);
                }
                AggregateFunc::Avg => {
                    let value = if value.is_null() { Value::Double(0.0) } else { value };
                    result.avg.insert(field.clone(), value);
                }
                AggregateFunc::Min => {
                    result.min.insert(field.clone(), value);
                }
                AggregateFunc::Max => {
                    result.max.insert(field.clone(), value);
                }
                AggregateFunc::Count => {}
            }
        }
    }
    result
}

fn zero_of(target: &Collection, field: &str) -> Value {
    if target
        .get_field(field)
        .is_some_and(|f| f.sql_type == SqlType::BigInt)
    {
        Value::BigInt(0)
    } else {
        Value::Double(0.0)
    }
}

impl<'a, C: Connection> Op<'a, C> {
    /// Load `with` onto `records`, nested relations included.
    ///
    /// `depth` is the nesting level of the relations in `with`, starting at 1.
    pub(crate) fn load<'s>(
        &'s self,
        collection: &'s Collection,
        records: &'s mut [Record],
        with: &'s WithSpec,
        depth: usize,
    ) -> BoxOutcome<'s, ()> {
        Box::pin(async move {
            if with.is_empty() || records.is_empty() {
                return Outcome::Ok(());
            }
            if let Some(max) = self.engine.config.max_relation_depth {
                if depth > max {
                    return Outcome::Err(Error::validation(
                        "with",
                        ValidationErrorKind::Query,
                        format!("relation nesting deeper than {max} levels"),
                    ));
                }
            }
            for (name, query) in with {
                try_outcome!(
                    self.load_relation(collection, &mut *records, name, query, depth)
                        .await
                );
            }
            Outcome::Ok(())
        })
    }

    async fn load_relation(
        &self,
        collection: &Collection,
        records: &mut [Record],
        name: &str,
        query: &RelationQuery,
        depth: usize,
    ) -> Outcome<(), Error> {
        let resolved = try_result!(self.engine.registry.graph().resolve(&collection.name, name));
        let to_many = resolved.cardinality() == Cardinality::Many;
        if query.aggregate.is_some() && !to_many {
            return Outcome::Err(Error::validation(
                name,
                ValidationErrorKind::Relation,
                format!("aggregates need a to-many relation; {}.{name} is to-one", collection.name),
            ));
        }
        tracing::debug!(
            collection = %collection.name,
            relation = name,
            kind = resolved.relation.kind_name(),
            parents = records.len(),
            depth,
            "Loading relation"
        );

        match resolved.join_path() {
            JoinPath::Direct {
                target,
                local,
                remote,
            } => {
                let target = try_result!(self.collection(&target));
                let link = Link::Column { remote: &remote };
                if to_many {
                    self.load_many(target, records, name, &local, link, query, depth)
                        .await
                } else {
                    self.load_one(target, records, name, &local, link, query, depth)
                        .await
                }
            }
            JoinPath::Through {
                target,
                through,
                source_key,
                target_key,
            } => {
                let target = try_result!(self.collection(&target));
                let link = Link::Junction {
                    through: &through,
                    source_key: &source_key,
                    target_key: &target_key,
                };
                self.load_many(target, records, name, columns::ID, link, query, depth)
                    .await
            }
            JoinPath::Polymorphic {
                type_field,
                id_field,
                targets,
            } => {
                self.load_polymorphic(records, name, &type_field, &id_field, &targets, query, depth)
                    .await
            }
        }
    }

    /// To-one: attach the first child whose key matches the parent's
    /// `local` column.
    #[allow(clippy::too_many_arguments)]
    async fn load_one(
        &self,
        target: &Collection,
        records: &mut [Record],
        name: &str,
        local: &str,
        link: Link<'_>,
        query: &RelationQuery,
        depth: usize,
    ) -> Outcome<(), Error> {
        let keys = parent_keys(records.iter(), local);
        let children = try_outcome!(self.fetch_children(target, link, &keys, query, depth).await);
        let mut by_key: HashMap<String, Record> = HashMap::new();
        for (key, child) in children {
            by_key.entry(key).or_insert(child);
        }
        for record in records.iter_mut() {
            let related = key_of(record, local)
                .and_then(|key| by_key.get(&key))
                .cloned()
                .map(Box::new);
            record.relations.insert(name.to_string(), Related::One(related));
        }
        Outcome::Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn load_many(
        &self,
        target: &Collection,
        records: &mut [Record],
        name: &str,
        local: &str,
        link: Link<'_>,
        query: &RelationQuery,
        depth: usize,
    ) -> Outcome<(), Error> {
        let keys = parent_keys(records.iter(), local);
        let mut lists: HashMap<String, Vec<Record>> = HashMap::new();
        if query.wants_records() {
            let children = try_outcome!(self.fetch_children(target, link, &keys, query, depth).await);
            for (key, child) in children {
                lists.entry(key).or_default().push(child);
            }
        }
        let aggregates = match &query.aggregate {
            Some(request) => Some(try_outcome!(
                self.aggregate_children(target, link, &keys, query, request)
                    .await
            )),
            None => None,
        };

        for record in records.iter_mut() {
            let key = key_of(record, local);
            let docs = key
                .as_ref()
                .and_then(|key| lists.get(key))
                .cloned()
                .unwrap_or_default();
            let related = match (&query.aggregate, &aggregates) {
                (Some(request), Some(found)) => {
                    let aggregate = key
                        .as_ref()
                        .and_then(|key| found.get(key))
                        .cloned()
                        .unwrap_or_else(|| aggregate_from_row(target, request, &Row::new()));
                    if query.wants_records() {
                        Related::ListWithAggregate { docs, aggregate }
                    } else {
                        Related::Aggregate(aggregate)
                    }
                }
                _ => Related::Many(docs),
            };
            record.relations.insert(name.to_string(), related);
        }
        Outcome::Ok(())
    }

    /// Children of every key, paired with the key they belong to, with
    /// their own relations loaded.
    async fn fetch_children(
        &self,
        target: &Collection,
        link: Link<'_>,
        keys: &[Value],
        query: &RelationQuery,
        depth: usize,
    ) -> Outcome<Vec<(String, Record)>, Error> {
        if keys.is_empty() {
            return Outcome::Ok(Vec::new());
        }
        let (select, selection) = try_result!(self.plan_children(target, link, keys, query));
        let rows = try_outcome!(self.query(&select).await);
        let mut pairs: Vec<(String, Record)> = rows
            .into_iter()
            .map(|mut row| {
                let parent = row.remove(PARENT_KEY).unwrap_or(Value::Null).group_key();
                (parent, Record::new(row))
            })
            .collect();
        if let Link::Junction { .. } = link {
            pairs = slice_per_parent(pairs, query.limit, query.offset.unwrap_or(0));
        }

        let (parents, mut children): (Vec<String>, Vec<Record>) = pairs.into_iter().unzip();
        try_outcome!(self.load(target, &mut children, &query.with, depth + 1).await);
        selection.strip(&mut children);
        Outcome::Ok(parents.into_iter().zip(children).collect())
    }

    fn plan_children(
        &self,
        target: &Collection,
        link: Link<'_>,
        keys: &[Value],
        query: &RelationQuery,
    ) -> Result<(Select, Selection)> {
        validate_limit(query.limit)?;
        let selection = Selection::resolve(
            &self.engine.registry,
            target,
            query.columns.as_ref(),
            &query.with,
        )?;
        let mut compiler = self.compiler();
        let frame = compiler.frame(&target.name)?;
        let (mut select, parent_key) = correlate(&mut compiler, &frame, link)?;
        let filter = compiler.compile_opt(&frame, query.filter.as_ref())?;

        select.items = frame.projection(&selection.fetch)?;
        select = select
            .item(parent_key.clone(), PARENT_KEY)
            .filter(parent_key.clone().in_list(keys.iter().cloned()))
            .filter_opt(frame.visibility(false))
            .filter_opt(filter);
        select.order_by = query
            .order_by
            .clone()
            .unwrap_or_else(OrderBy::by_identity)
            .compile(&frame)?;
        // Junction rows are windowed after deduplication instead.
        if let Link::Column { .. } = link {
            if query.limit.is_some() || query.offset.is_some_and(|n| n > 0) {
                select = select.window(PartitionWindow {
                    partition_by: vec![parent_key],
                    limit: query.limit,
                    offset: query.offset.unwrap_or(0),
                });
            }
        }
        Ok((select, selection))
    }

    async fn aggregate_children(
        &self,
        target: &Collection,
        link: Link<'_>,
        keys: &[Value],
        query: &RelationQuery,
        request: &AggregateRequest,
    ) -> Outcome<HashMap<String, AggregateResult>, Error> {
        let select = try_result!(self.plan_aggregate(target, link, keys, query, request));
        if keys.is_empty() {
            return Outcome::Ok(HashMap::new());
        }
        let rows = try_outcome!(self.query(&select).await);
        Outcome::Ok(
            rows.iter()
                .map(|row| {
                    let parent = row.get_or_null(PARENT_KEY).group_key();
                    (parent, aggregate_from_row(target, request, row))
                })
                .collect(),
        )
    }

    fn plan_aggregate(
        &self,
        target: &Collection,
        link: Link<'_>,
        keys: &[Value],
        query: &RelationQuery,
        request: &AggregateRequest,
    ) -> Result<Select> {
        check_aggregate_fields(target, request)?;
        let mut compiler = self.compiler();
        let frame = compiler.frame(&target.name)?;
        let (select, parent_key) = correlate(&mut compiler, &frame, link)?;
        let filter = compiler.compile_opt(&frame, query.filter.as_ref())?;
        // A child reachable through two junction rows counts once.
        let count = match link {
            Link::Column { .. } => Expr::count_star(),
            Link::Junction { .. } => Expr::Aggregate {
                func: AggregateFunc::Count,
                arg: Some(Box::new(frame.column(columns::ID))),
                distinct: true,
            },
        };

        let mut select = select
            .item(parent_key.clone(), PARENT_KEY)
            .item(count, COUNT_ALIAS)
            .filter(parent_key.clone().in_list(keys.iter().cloned()))
            .filter_opt(frame.visibility(false))
            .filter_opt(filter)
            .group_by(parent_key);
        for (func, prefix, fields) in aggregate_columns(request) {
            for field in fields {
                select = select.item(
                    Expr::aggregate(func, frame.resolve(field)?),
                    format!("{prefix}.{field}"),
                );
            }
        }
        Ok(select)
    }

    /// Polymorphic to-one: one query per target type present among the
    /// parents. Unknown type tags resolve to nothing.
    #[allow(clippy::too_many_arguments)]
    async fn load_polymorphic(
        &self,
        records: &mut [Record],
        name: &str,
        type_field: &str,
        id_field: &str,
        targets: &BTreeMap<String, String>,
        query: &RelationQuery,
        depth: usize,
    ) -> Outcome<(), Error> {
        let mut resolved: HashMap<(String, String), Record> = HashMap::new();
        for (type_value, target_name) in targets {
            let ids = parent_keys(
                records
                    .iter()
                    .filter(|record| record.fields.get_str(type_field) == Some(type_value.as_str())),
                id_field,
            );
            if ids.is_empty() {
                continue;
            }
            let target = try_result!(self.collection(target_name));
            let link = Link::Column {
                remote: columns::ID,
            };
            let children = try_outcome!(self.fetch_children(target, link, &ids, query, depth).await);
            for (key, child) in children {
                resolved.entry((type_value.clone(), key)).or_insert(child);
            }
        }

        for record in records.iter_mut() {
            let type_value = record.fields.get_str(type_field).map(str::to_string);
            if let Some(type_value) = &type_value {
                if !targets.contains_key(type_value) {
                    tracing::warn!(
                        relation = name,
                        type_value = %type_value,
                        "Unknown polymorphic type"
                    );
                }
            }
            let related = match (type_value, key_of(record, id_field)) {
                (Some(type_value), Some(key)) => {
                    resolved.get(&(type_value, key)).cloned().map(Box::new)
                }
                _ => None,
            };
            record.relations.insert(name.to_string(), Related::One(related));
        }
        Outcome::Ok(())
    }
}
