//! Stored state of records: raw rows as the write path sees them.

use tessera_core::{
    Collection, Connection, Error, Expr, OrderTerm, Outcome, Result, Row, Select, SelectItem,
    Statement, TableRef, Value, columns, new_id, now, try_outcome, try_result,
};
use tessera_query::{OrderBy, Where};

use crate::op::Op;

/// Main row and locale rows of one record.
#[derive(Debug, Clone)]
pub(crate) struct State {
    pub(crate) main: Row,
    pub(crate) locales: Vec<Row>,
}

impl State {
    pub(crate) fn id(&self) -> &str {
        self.main.get_str(columns::ID).unwrap_or_default()
    }

    pub(crate) fn is_deleted(&self) -> bool {
        self.main
            .get(columns::DELETED_AT)
            .is_some_and(|value| !value.is_null())
    }

    /// Main row with the localized fields stored for `locale` merged in.
    pub(crate) fn view(&self, collection: &Collection, locale: &str) -> Row {
        let mut row = self.main.clone();
        let stored = self
            .locales
            .iter()
            .find(|r| r.get_str(columns::LOCALE) == Some(locale));
        for name in collection.localized_field_names() {
            row.set(name, stored.map_or(Value::Null, |r| r.get_or_null(name)));
        }
        row
    }
}

/// Split a payload into main-table values and localized values.
pub(crate) fn split_payload(collection: &Collection, payload: Row) -> (Row, Row) {
    let mut main = Row::new();
    let mut localized = Row::new();
    for (name, value) in payload {
        if collection.is_localized(&name) {
            localized.set(name, value);
        } else {
            main.set(name, value);
        }
    }
    (main, localized)
}

fn by_id(id: &str) -> Expr {
    Expr::col(columns::ID).eq(id)
}

impl<'a, C: Connection> Op<'a, C> {
    /// Stored state of `id`, soft-deleted or not.
    pub(crate) async fn load_state(
        &self,
        collection: &Collection,
        id: &str,
    ) -> Outcome<Option<State>, Error> {
        let select = Select::from(TableRef::new(collection.main_table()))
            .all()
            .filter(by_id(id));
        let Some(main) = try_outcome!(self.query(&select).await).into_iter().next() else {
            return Outcome::Ok(None);
        };
        let locales = if collection.has_locales() {
            let select = Select::from(TableRef::new(collection.locale_table()))
                .all()
                .filter(Expr::col(columns::PARENT_ID).eq(id))
                .order(OrderTerm::asc(Expr::col(columns::LOCALE)));
            try_outcome!(self.query(&select).await)
        } else {
            Vec::new()
        };
        Outcome::Ok(Some(State { main, locales }))
    }

    /// Stored state of a visible record, or `NotFound`.
    pub(crate) async fn visible_state(
        &self,
        collection: &Collection,
        id: &str,
    ) -> Outcome<State, Error> {
        match try_outcome!(self.load_state(collection, id).await) {
            Some(state) if !state.is_deleted() => Outcome::Ok(state),
            _ => Outcome::Err(Error::not_found(&collection.name, Some(id))),
        }
    }

    /// Main rows of visible records matching `filter`, in identity order.
    pub(crate) async fn find_rows(
        &self,
        collection: &Collection,
        filter: &Where,
        limit: Option<u64>,
    ) -> Outcome<Vec<Row>, Error> {
        let select = try_result!(self.plan_match(collection, filter, limit));
        self.query(&select).await
    }

    fn plan_match(&self, collection: &Collection, filter: &Where, limit: Option<u64>) -> Result<Select> {
        let mut compiler = self.compiler();
        let frame = compiler.frame(&collection.name)?;
        let filter = compiler.compile(&frame, filter)?;
        let mut select = frame
            .select()
            .filter(filter)
            .filter_opt(frame.visibility(false));
        select.items = vec![SelectItem::All(Some(frame.alias().to_string()))];
        select.order_by = OrderBy::by_identity().compile(&frame)?;
        select.limit = limit;
        Ok(select)
    }

    /// `SELECT id` of the visible records matching `filter`.
    pub(crate) fn plan_ids(&self, collection: &Collection, filter: &Where) -> Result<Select> {
        let mut compiler = self.compiler();
        let frame = compiler.frame(&collection.name)?;
        let filter = compiler.compile(&frame, filter)?;
        Ok(frame
            .select()
            .item(frame.column(columns::ID), columns::ID)
            .filter(filter)
            .filter_opt(frame.visibility(false)))
    }

    /// Write validated field values of `id`: main columns (stamping
    /// `updatedAt`) and the write locale's row.
    pub(crate) async fn write_fields(
        &self,
        collection: &Collection,
        id: &str,
        payload: Row,
    ) -> Outcome<(), Error> {
        let (mut set, localized) = split_payload(collection, payload);
        if !localized.is_empty() {
            try_result!(self.engine.config.check_write_locale(self.write_locale()));
        }
        if collection.has_timestamps() {
            set.set(columns::UPDATED_AT, now());
        }
        if !set.is_empty() {
            let update = Statement::update(collection.main_table(), set, Some(by_id(id)));
            try_outcome!(self.execute(&update).await);
        }
        if !localized.is_empty() {
            try_outcome!(self.upsert_locale(collection, id, &localized).await);
        }
        Outcome::Ok(())
    }

    /// Insert or update the write locale's row of `id`.
    pub(crate) async fn upsert_locale(
        &self,
        collection: &Collection,
        id: &str,
        localized: &Row,
    ) -> Outcome<(), Error> {
        let table = collection.locale_table();
        let locale = self.write_locale();
        let existing = Select::from(TableRef::new(table.as_str()))
            .item(Expr::col(columns::ID), columns::ID)
            .filter(
                Expr::col(columns::PARENT_ID)
                    .eq(id)
                    .and(Expr::col(columns::LOCALE).eq(locale)),
            );
        let rows = try_outcome!(self.query(&existing).await);
        let statement = match rows.first().and_then(|row| row.get_str(columns::ID)) {
            Some(row_id) => Statement::update(table, localized.clone(), Some(by_id(row_id))),
            None => {
                let mut row = Row::new()
                    .with(columns::ID, new_id())
                    .with(columns::PARENT_ID, id)
                    .with(columns::LOCALE, locale);
                row.merge(localized);
                Statement::insert(table, vec![row])
            }
        };
        try_outcome!(self.execute(&statement).await);
        Outcome::Ok(())
    }
}
