//! Physical row groups of a collection.
//!
//! Every collection compiles to a main table and, depending on its
//! declaration, up to three companion tables:
//!
//! | table | present when |
//! |---|---|
//! | `<name>` | always |
//! | `<name>_locales` | some field is localized |
//! | `<name>_versions` | versioning is enabled |
//! | `<name>_locales_versions` | both of the above |

use tessera_core::{
    Collection, ColumnDef, ForeignKey, ReferentialAction, SqlType, TableSchema, columns,
};

/// The tables backing one collection.
#[derive(Debug, Clone, PartialEq)]
pub struct PhysicalTables {
    pub main: TableSchema,
    pub locales: Option<TableSchema>,
    pub versions: Option<TableSchema>,
    pub locale_versions: Option<TableSchema>,
}

impl PhysicalTables {
    /// Compile a collection declaration.
    pub fn compile(collection: &Collection) -> Self {
        let main = main_table(collection);
        let locales = collection.has_locales().then(|| locale_table(collection));
        let versions = collection.is_versioned().then(|| versions_table(collection));
        let locale_versions = (collection.has_locales() && collection.is_versioned())
            .then(|| locale_versions_table(collection));

        tracing::debug!(
            collection = %collection.name,
            locales = locales.is_some(),
            versions = versions.is_some(),
            "Compiled physical layout"
        );

        Self {
            main,
            locales,
            versions,
            locale_versions,
        }
    }

    /// All tables, main table first.
    pub fn tables(&self) -> Vec<&TableSchema> {
        let mut out = vec![&self.main];
        out.extend(self.locales.iter());
        out.extend(self.versions.iter());
        out.extend(self.locale_versions.iter());
        out
    }
}

fn id_column(name: &str) -> ColumnDef {
    ColumnDef::new(name, SqlType::Text).not_null()
}

fn main_table(collection: &Collection) -> TableSchema {
    let mut table = TableSchema::new(collection.main_table());
    table.columns.push(id_column(columns::ID));
    table.primary_key.push(columns::ID.to_string());

    for field in collection.main_fields() {
        let mut column = ColumnDef::new(&field.name, field.sql_type);
        if field.required {
            column = column.not_null();
        }
        if let Some(default) = &field.default {
            column = column.default_value(default.clone());
        }
        table.columns.push(column);
        if field.unique {
            table.unique.push(vec![field.name.clone()]);
        }
        if let Some(fk) = &field.references {
            table.foreign_keys.push(ForeignKey {
                column: field.name.clone(),
                ref_table: fk.collection.clone(),
                ref_column: fk.column.clone(),
                on_delete: fk.on_delete,
            });
        }
    }

    push_system_columns(collection, &mut table);
    table
}

fn push_system_columns(collection: &Collection, table: &mut TableSchema) {
    if collection.has_timestamps() {
        table
            .columns
            .push(ColumnDef::new(columns::CREATED_AT, SqlType::Timestamp).not_null());
        table
            .columns
            .push(ColumnDef::new(columns::UPDATED_AT, SqlType::Timestamp).not_null());
    }
    if collection.has_soft_delete() {
        table
            .columns
            .push(ColumnDef::new(columns::DELETED_AT, SqlType::Timestamp));
    }
}

fn localized_columns(collection: &Collection, table: &mut TableSchema) {
    for field in collection.fields.iter().filter(|f| f.localized) {
        table.columns.push(ColumnDef::new(&field.name, field.sql_type));
    }
}

fn locale_table(collection: &Collection) -> TableSchema {
    let mut table = TableSchema::new(collection.locale_table());
    table.columns.push(id_column(columns::ID));
    table.columns.push(id_column(columns::PARENT_ID));
    table.columns.push(ColumnDef::new(columns::LOCALE, SqlType::Text).not_null());
    localized_columns(collection, &mut table);
    table.primary_key.push(columns::ID.to_string());
    table
        .unique
        .push(vec![columns::PARENT_ID.to_string(), columns::LOCALE.to_string()]);
    table.foreign_keys.push(ForeignKey {
        column: columns::PARENT_ID.to_string(),
        ref_table: collection.main_table().to_string(),
        ref_column: columns::ID.to_string(),
        on_delete: ReferentialAction::Cascade,
    });
    table
}

fn versions_table(collection: &Collection) -> TableSchema {
    let mut table = TableSchema::new(collection.versions_table());
    table.columns.push(id_column(columns::VERSION_ID));
    table.columns.push(id_column(columns::ID));
    table
        .columns
        .push(ColumnDef::new(columns::VERSION_NUMBER, SqlType::BigInt).not_null());
    table
        .columns
        .push(ColumnDef::new(columns::VERSION_OPERATION, SqlType::Text).not_null());
    table
        .columns
        .push(ColumnDef::new(columns::VERSION_USER_ID, SqlType::Text));
    table
        .columns
        .push(ColumnDef::new(columns::VERSION_CREATED_AT, SqlType::Timestamp).not_null());
    // Snapshots never enforce field constraints; history must outlive them.
    for field in collection.main_fields() {
        table.columns.push(ColumnDef::new(&field.name, field.sql_type));
    }
    if collection.has_timestamps() {
        table
            .columns
            .push(ColumnDef::new(columns::CREATED_AT, SqlType::Timestamp));
        table
            .columns
            .push(ColumnDef::new(columns::UPDATED_AT, SqlType::Timestamp));
    }
    if collection.has_soft_delete() {
        table
            .columns
            .push(ColumnDef::new(columns::DELETED_AT, SqlType::Timestamp));
    }
    table.primary_key.push(columns::VERSION_ID.to_string());
    table
        .unique
        .push(vec![columns::ID.to_string(), columns::VERSION_NUMBER.to_string()]);
    table
}

fn locale_versions_table(collection: &Collection) -> TableSchema {
    let mut table = TableSchema::new(collection.locale_versions_table());
    table.columns.push(id_column(columns::ID));
    table.columns.push(id_column(columns::PARENT_ID));
    table
        .columns
        .push(ColumnDef::new(columns::VERSION_NUMBER, SqlType::BigInt).not_null());
    table.columns.push(ColumnDef::new(columns::LOCALE, SqlType::Text).not_null());
    localized_columns(collection, &mut table);
    table.primary_key.push(columns::ID.to_string());
    table.unique.push(vec![
        columns::PARENT_ID.to_string(),
        columns::VERSION_NUMBER.to_string(),
        columns::LOCALE.to_string(),
    ]);
    table
}
