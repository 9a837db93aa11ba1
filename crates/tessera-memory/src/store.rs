//! Tables and constraint-checked writes.

use std::collections::{BTreeMap, HashSet};

use tessera_core::{
    ConstraintError, ConstraintKind, Delete, Error, Expr, ForeignKey, Insert, ReferentialAction,
    Result, Row, Statement, TableSchema, Update, Value,
};

use crate::eval::{Scope, eval, is_true};

/// One table: its declaration and rows in insertion order. Every stored row
/// carries every declared column.
#[derive(Debug, Clone)]
pub(crate) struct Table {
    pub(crate) schema: TableSchema,
    pub(crate) rows: Vec<Row>,
}

/// All tables of a connection.
#[derive(Debug, Clone, Default)]
pub(crate) struct Store {
    tables: BTreeMap<String, Table>,
}

fn constraint(
    kind: ConstraintKind,
    table: &str,
    columns: &[String],
    message: impl Into<String>,
) -> Error {
    Error::Constraint(ConstraintError {
        kind,
        table: table.to_string(),
        columns: columns.to_vec(),
        message: message.into(),
    })
}

impl Store {
    pub(crate) fn table(&self, name: &str) -> Result<&Table> {
        self.tables
            .get(name)
            .ok_or_else(|| Error::query(format!("no such table: {name}")))
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut Table> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| Error::query(format!("no such table: {name}")))
    }

    pub(crate) fn table_names(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }

    /// Execute one statement atomically and return the affected rows. A
    /// failing statement leaves every table unchanged.
    pub(crate) fn execute(&mut self, statement: &Statement) -> Result<Vec<Row>> {
        let before = self.tables.clone();
        let result = match statement {
            Statement::CreateTable(schema) => {
                self.tables
                    .entry(schema.name.clone())
                    .or_insert_with(|| Table {
                        schema: schema.clone(),
                        rows: Vec::new(),
                    });
                Ok(Vec::new())
            }
            Statement::Insert(insert) => self.insert(insert),
            Statement::Update(update) => self.update(update),
            Statement::Delete(delete) => self.delete(delete),
        };
        if result.is_err() {
            self.tables = before;
        }
        result
    }

    fn insert(&mut self, insert: &Insert) -> Result<Vec<Row>> {
        let schema = self.table(&insert.table)?.schema.clone();
        let mut inserted = Vec::with_capacity(insert.rows.len());
        for data in &insert.rows {
            let mut row = Row::new();
            for column in data.columns() {
                if !schema.has_column(column) {
                    return Err(Error::query(format!(
                        "table {} has no column named {column}",
                        schema.name
                    )));
                }
            }
            for column in &schema.columns {
                let value = match data.get(&column.name) {
                    Some(value) => value.clone(),
                    None => column.default.clone().unwrap_or(Value::Null),
                };
                row.set(column.name.clone(), value);
            }
            check_not_null(&schema, &row)?;
            self.check_unique(&schema, &row, None)?;
            self.check_references(&schema, &row)?;
            self.table_mut(&insert.table)?.rows.push(row.clone());
            inserted.push(row);
        }
        Ok(inserted)
    }

    fn matching(&self, table: &str, filter: Option<&Expr>) -> Result<Vec<usize>> {
        let rows = &self.table(table)?.rows;
        let Some(filter) = filter else {
            return Ok((0..rows.len()).collect());
        };
        let mut indices = Vec::new();
        for (i, row) in rows.iter().enumerate() {
            let binding = [(table, Some(row))];
            if is_true(&eval(self, filter, &Scope::new(&binding, None))?) {
                indices.push(i);
            }
        }
        Ok(indices)
    }

    fn update(&mut self, update: &Update) -> Result<Vec<Row>> {
        let schema = self.table(&update.table)?.schema.clone();
        for column in update.set.columns() {
            if !schema.has_column(column) {
                return Err(Error::query(format!(
                    "table {} has no column named {column}",
                    schema.name
                )));
            }
        }
        let indices = self.matching(&update.table, update.filter.as_ref())?;
        let touches_references = schema
            .foreign_keys
            .iter()
            .any(|fk| update.set.contains(&fk.column));

        let mut updated = Vec::with_capacity(indices.len());
        for i in indices {
            let old = self.table(&update.table)?.rows[i].clone();
            let mut row = old.clone();
            row.merge(&update.set);
            check_not_null(&schema, &row)?;
            self.check_unique(&schema, &row, Some(i))?;
            if touches_references {
                self.check_references(&schema, &row)?;
            }
            self.check_referenced_keys(&schema.name, &old, &row)?;
            self.table_mut(&update.table)?.rows[i] = row.clone();
            updated.push(row);
        }
        Ok(updated)
    }

    fn delete(&mut self, delete: &Delete) -> Result<Vec<Row>> {
        let indices = self.matching(&delete.table, delete.filter.as_ref())?;
        self.remove_rows(&delete.table, &indices)
    }

    /// Remove rows by index and apply the referential actions of every
    /// foreign key pointing at them.
    fn remove_rows(&mut self, table: &str, indices: &[usize]) -> Result<Vec<Row>> {
        if indices.is_empty() {
            return Ok(Vec::new());
        }
        let doomed: HashSet<usize> = indices.iter().copied().collect();
        let target = self.table_mut(table)?;
        let mut removed = Vec::with_capacity(indices.len());
        let mut kept = Vec::with_capacity(target.rows.len() - indices.len());
        for (i, row) in std::mem::take(&mut target.rows).into_iter().enumerate() {
            if doomed.contains(&i) {
                removed.push(row);
            } else {
                kept.push(row);
            }
        }
        target.rows = kept;

        for (referencing, fk) in self.referencing(table) {
            let keys: HashSet<String> = removed
                .iter()
                .map(|row| row.get_or_null(&fk.ref_column))
                .filter(|v| !v.is_null())
                .map(|v| v.group_key())
                .collect();
            let dependents: Vec<usize> = self
                .table(&referencing)?
                .rows
                .iter()
                .enumerate()
                .filter(|(_, row)| keys.contains(&row.get_or_null(&fk.column).group_key()))
                .map(|(i, _)| i)
                .collect();
            if dependents.is_empty() {
                continue;
            }
            match fk.on_delete {
                ReferentialAction::Cascade => {
                    self.remove_rows(&referencing, &dependents)?;
                }
                ReferentialAction::SetNull => {
                    let schema = self.table(&referencing)?.schema.clone();
                    let rows = &mut self.table_mut(&referencing)?.rows;
                    for i in dependents {
                        rows[i].set(fk.column.clone(), Value::Null);
                        check_not_null(&schema, &rows[i])?;
                    }
                }
                ReferentialAction::NoAction | ReferentialAction::Restrict => {
                    return Err(constraint(
                        ConstraintKind::ForeignKey,
                        &referencing,
                        std::slice::from_ref(&fk.column),
                        format!(
                            "{} row(s) still reference {table}.{}",
                            dependents.len(),
                            fk.ref_column
                        ),
                    ));
                }
            }
        }
        Ok(removed)
    }

    /// Foreign keys of other tables (and self references) pointing at
    /// `table`.
    fn referencing(&self, table: &str) -> Vec<(String, ForeignKey)> {
        self.tables
            .values()
            .flat_map(|t| {
                t.schema
                    .foreign_keys
                    .iter()
                    .filter(|fk| fk.ref_table == table)
                    .map(|fk| (t.schema.name.clone(), fk.clone()))
            })
            .collect()
    }

    fn check_unique(&self, schema: &TableSchema, row: &Row, skip: Option<usize>) -> Result<()> {
        let rows = &self.table(&schema.name)?.rows;
        let keys = std::iter::once((ConstraintKind::PrimaryKey, &schema.primary_key))
            .chain(schema.unique.iter().map(|u| (ConstraintKind::Unique, u)));
        for (kind, columns) in keys {
            if columns.is_empty() {
                continue;
            }
            let values: Vec<Value> = columns.iter().map(|c| row.get_or_null(c)).collect();
            if values.iter().any(Value::is_null) {
                continue;
            }
            let clash = rows.iter().enumerate().any(|(i, existing)| {
                Some(i) != skip
                    && columns
                        .iter()
                        .zip(&values)
                        .all(|(c, v)| existing.get_or_null(c).group_key() == v.group_key())
            });
            if clash {
                return Err(constraint(
                    kind,
                    &schema.name,
                    columns,
                    format!(
                        "duplicate key ({})",
                        values.iter().map(Value::to_string).collect::<Vec<_>>().join(", ")
                    ),
                ));
            }
        }
        Ok(())
    }

    fn check_references(&self, schema: &TableSchema, row: &Row) -> Result<()> {
        for fk in &schema.foreign_keys {
            let value = row.get_or_null(&fk.column);
            if value.is_null() {
                continue;
            }
            let key = value.group_key();
            let present = self
                .table(&fk.ref_table)?
                .rows
                .iter()
                .any(|r| r.get_or_null(&fk.ref_column).group_key() == key);
            if !present {
                return Err(constraint(
                    ConstraintKind::ForeignKey,
                    &schema.name,
                    std::slice::from_ref(&fk.column),
                    format!("{value} is not present in {}.{}", fk.ref_table, fk.ref_column),
                ));
            }
        }
        Ok(())
    }

    /// Changing a referenced key while references exist is rejected.
    fn check_referenced_keys(&self, table: &str, old: &Row, new: &Row) -> Result<()> {
        for (referencing, fk) in self.referencing(table) {
            let before = old.get_or_null(&fk.ref_column);
            if before.is_null() || before.group_key() == new.get_or_null(&fk.ref_column).group_key()
            {
                continue;
            }
            let key = before.group_key();
            let referenced = self
                .table(&referencing)?
                .rows
                .iter()
                .any(|r| r.get_or_null(&fk.column).group_key() == key);
            if referenced {
                return Err(constraint(
                    ConstraintKind::ForeignKey,
                    &referencing,
                    std::slice::from_ref(&fk.column),
                    format!("{table}.{} {before} is still referenced", fk.ref_column),
                ));
            }
        }
        Ok(())
    }
}

fn check_not_null(schema: &TableSchema, row: &Row) -> Result<()> {
    for column in &schema.columns {
        let required = !column.nullable || schema.primary_key.contains(&column.name);
        if required && row.get_or_null(&column.name).is_null() {
            return Err(constraint(
                ConstraintKind::NotNull,
                &schema.name,
                std::slice::from_ref(&column.name),
                format!("{}.{} may not be NULL", schema.name, column.name),
            ));
        }
    }
    Ok(())
}
