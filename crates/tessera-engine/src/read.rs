//! Read path: `find`, `find_one`, `count` and fetch-by-id.

use std::collections::HashMap;

use tessera_core::{
    Collection, Connection, Error, Expr, JoinPath, Outcome, Registry, Result, Select, Value,
    columns, try_outcome, try_result,
};
use tessera_query::{
    ColumnSelection, FieldOp, OrderBy, PageInfo, Paginated, Where, validate_limit,
};

use crate::op::Op;
use crate::options::{FindOptions, WithSpec};
use crate::record::Record;

const COUNT_ALIAS: &str = "count";

/// Columns fetched for a read, and which of them only serve relation
/// loading.
pub(crate) struct Selection {
    pub(crate) fetch: Vec<String>,
    hidden: Vec<String>,
}

impl Selection {
    pub(crate) fn resolve(
        registry: &Registry,
        collection: &Collection,
        columns: Option<&ColumnSelection>,
        with: &WithSpec,
    ) -> Result<Self> {
        let mut fetch: Vec<String> = match columns {
            Some(selection) => selection.resolve(collection)?,
            None => collection.readable_names(),
        }
        .into_iter()
        .map(str::to_string)
        .collect();

        let mut hidden = Vec::new();
        for relation in with.keys() {
            let resolved = registry.graph().resolve(&collection.name, relation)?;
            let keys = match resolved.join_path() {
                JoinPath::Direct { local, .. } => vec![local],
                JoinPath::Through { .. } => vec![columns::ID.to_string()],
                JoinPath::Polymorphic {
                    type_field,
                    id_field,
                    ..
                } => vec![type_field, id_field],
            };
            for key in keys {
                if !fetch.contains(&key) {
                    fetch.push(key.clone());
                    hidden.push(key);
                }
            }
        }
        Ok(Self { fetch, hidden })
    }

    /// Drop the key columns the caller did not ask for.
    pub(crate) fn strip(&self, records: &mut [Record]) {
        if self.hidden.is_empty() {
            return;
        }
        for record in records {
            for column in &self.hidden {
                record.fields.remove(column);
            }
        }
    }
}

fn count_of(rows: &[tessera_core::Row]) -> u64 {
    rows.first()
        .and_then(|row| row.get(COUNT_ALIAS))
        .and_then(Value::as_i64)
        .map_or(0, |n| u64::try_from(n).unwrap_or(0))
}

impl<'a, C: Connection> Op<'a, C> {
    /// One page of records plus pagination metadata.
    pub(crate) async fn find(
        &self,
        collection: &Collection,
        options: &FindOptions,
    ) -> Outcome<Paginated<Record>, Error> {
        try_result!(validate_limit(options.limit));
        let total = try_outcome!(
            self.count(collection, options.filter.as_ref(), options.include_deleted)
                .await
        );
        let info = try_result!(PageInfo::compute(
            total,
            options.limit,
            options.offset.unwrap_or(0)
        ));
        let docs = try_outcome!(
            self.fetch(collection, options, options.limit, options.offset)
                .await
        );
        Outcome::Ok(Paginated::new(docs, info))
    }

    pub(crate) async fn find_one(
        &self,
        collection: &Collection,
        options: &FindOptions,
    ) -> Outcome<Option<Record>, Error> {
        let docs = try_outcome!(self.fetch(collection, options, Some(1), None).await);
        Outcome::Ok(docs.into_iter().next())
    }

    pub(crate) async fn count(
        &self,
        collection: &Collection,
        filter: Option<&Where>,
        include_deleted: bool,
    ) -> Outcome<u64, Error> {
        let select = try_result!(self.plan_count(collection, filter, include_deleted));
        let rows = try_outcome!(self.query(&select).await);
        Outcome::Ok(count_of(&rows))
    }

    fn plan_count(
        &self,
        collection: &Collection,
        filter: Option<&Where>,
        include_deleted: bool,
    ) -> Result<Select> {
        let mut compiler = self.compiler();
        let frame = compiler.frame(&collection.name)?;
        let filter = compiler.compile_opt(&frame, filter)?;
        Ok(frame
            .select()
            .item(Expr::count_star(), COUNT_ALIAS)
            .filter_opt(filter)
            .filter_opt(frame.visibility(include_deleted)))
    }

    /// Records matching `options`, with their relations loaded.
    pub(crate) async fn fetch(
        &self,
        collection: &Collection,
        options: &FindOptions,
        limit: Option<u64>,
        offset: Option<u64>,
    ) -> Outcome<Vec<Record>, Error> {
        let (select, selection) = try_result!(self.plan_read(collection, options, limit, offset));
        let rows = try_outcome!(self.query(&select).await);
        let mut records: Vec<Record> = rows.into_iter().map(Record::new).collect();
        try_outcome!(self.load(collection, &mut records, &options.with, 1).await);
        selection.strip(&mut records);
        Outcome::Ok(records)
    }

    fn plan_read(
        &self,
        collection: &Collection,
        options: &FindOptions,
        limit: Option<u64>,
        offset: Option<u64>,
    ) -> Result<(Select, Selection)> {
        let selection = Selection::resolve(
            &self.engine.registry,
            collection,
            options.columns.as_ref(),
            &options.with,
        )?;
        let mut compiler = self.compiler();
        let frame = compiler.frame(&collection.name)?;
        let filter = compiler.compile_opt(&frame, options.filter.as_ref())?;

        let mut select = frame
            .select()
            .filter_opt(filter)
            .filter_opt(frame.visibility(options.include_deleted));
        select.items = frame.projection(&selection.fetch)?;
        for (name, expr) in &options.extras {
            select = select.item(frame.resolve_expr(expr)?, name.clone());
        }
        select.order_by = options
            .order_by
            .clone()
            .unwrap_or_else(OrderBy::by_identity)
            .compile(&frame)?;
        select.limit = limit;
        select.offset = offset.filter(|&n| n > 0);
        Ok((select, selection))
    }

    /// Current records by id, in the order given, soft-deleted ones included.
    pub(crate) async fn fetch_by_ids(
        &self,
        collection: &Collection,
        ids: &[String],
    ) -> Outcome<Vec<Record>, Error> {
        if ids.is_empty() {
            return Outcome::Ok(Vec::new());
        }
        let options = FindOptions::new()
            .filter(Where::field(
                columns::ID,
                FieldOp::In(ids.iter().map(Value::from).collect()),
            ))
            .include_deleted(true);
        let records = try_outcome!(self.fetch(collection, &options, None, None).await);
        let mut by_id: HashMap<String, Record> = records
            .into_iter()
            .filter_map(|record| Some((record.id()?.to_string(), record)))
            .collect();
        Outcome::Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    pub(crate) async fn fetch_record(
        &self,
        collection: &Collection,
        id: &str,
    ) -> Outcome<Record, Error> {
        let mut records = try_outcome!(self.fetch_by_ids(collection, &[id.to_string()]).await);
        match records.pop() {
            Some(record) => Outcome::Ok(record),
            None => Outcome::Err(Error::not_found(&collection.name, Some(id))),
        }
    }
}
