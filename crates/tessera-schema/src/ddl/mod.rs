//! DDL generation.
//!
//! Each dialect has a [`DdlGenerator`] that turns a [`TableSchema`] into one or
//! more `CREATE` statements. The shared pieces (column lists, constraint
//! clauses, literal defaults) live here; dialect modules only decide type
//! names and where constraints go.

mod mysql;
mod postgres;
mod sqlite;

pub use mysql::MysqlDdlGenerator;
pub use postgres::PostgresDdlGenerator;
pub use sqlite::SqliteDdlGenerator;

use tessera_core::{Dialect, SqlType, TableSchema, Value};

/// Generates DDL statements for one dialect.
pub trait DdlGenerator: Send + Sync {
    /// Dialect this generator targets.
    fn dialect(&self) -> Dialect;

    /// Column type name for `sql_type`.
    fn type_name(&self, sql_type: SqlType) -> &'static str;

    /// Statements creating `table` (idempotent: `IF NOT EXISTS`).
    fn create_table(&self, table: &TableSchema) -> Vec<String>;
}

/// The generator for `dialect`.
pub fn generator_for(dialect: Dialect) -> Box<dyn DdlGenerator> {
    match dialect {
        Dialect::Postgres => Box::new(PostgresDdlGenerator),
        Dialect::Sqlite => Box::new(SqliteDdlGenerator),
        Dialect::Mysql => Box::new(MysqlDdlGenerator),
    }
}

/// Quote an identifier for `dialect`.
pub fn quote_identifier(name: &str, dialect: Dialect) -> String {
    dialect.quote_ident(name)
}

fn quote_list(names: &[String], dialect: Dialect) -> String {
    names
        .iter()
        .map(|n| quote_identifier(n, dialect))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Render a default value as a SQL literal.
pub fn literal(value: &Value, dialect: Dialect) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => {
            let text = match (dialect, *b) {
                (Dialect::Sqlite, true) => "1",
                (Dialect::Sqlite, false) => "0",
                (_, true) => "TRUE",
                (_, false) => "FALSE",
            };
            text.to_string()
        }
        Value::BigInt(i) => i.to_string(),
        Value::Double(f) => f.to_string(),
        Value::Text(s) => quote_string(s),
        Value::Array(items) if dialect == Dialect::Postgres => {
            let inner: Vec<String> = items
                .iter()
                .map(|item| match item {
                    Value::Text(s) => format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"")),
                    other => other.to_string(),
                })
                .collect();
            quote_string(&format!("{{{}}}", inner.join(",")))
        }
        Value::Array(_) | Value::Json(_) => quote_string(&value.to_json().to_string()),
    }
}

fn quote_string(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// `CREATE TABLE IF NOT EXISTS` with inline primary key, foreign keys and
/// (optionally) unique constraints.
pub(crate) fn generate_create_table(
    generator: &dyn DdlGenerator,
    table: &TableSchema,
    inline_unique: bool,
) -> String {
    let dialect = generator.dialect();
    let mut parts: Vec<String> = Vec::new();

    for column in &table.columns {
        let mut def = format!(
            "{} {}",
            quote_identifier(&column.name, dialect),
            generator.type_name(column.sql_type)
        );
        if !column.nullable {
            def.push_str(" NOT NULL");
        }
        if let Some(default) = &column.default {
            def.push_str(" DEFAULT ");
            def.push_str(&literal(default, dialect));
        }
        parts.push(def);
    }

    if !table.primary_key.is_empty() {
        parts.push(format!(
            "PRIMARY KEY ({})",
            quote_list(&table.primary_key, dialect)
        ));
    }

    if inline_unique {
        for columns in &table.unique {
            parts.push(format!("UNIQUE ({})", quote_list(columns, dialect)));
        }
    }

    for fk in &table.foreign_keys {
        parts.push(format!(
            "FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE {}",
            quote_identifier(&fk.column, dialect),
            quote_identifier(&fk.ref_table, dialect),
            quote_identifier(&fk.ref_column, dialect),
            fk.on_delete.as_sql()
        ));
    }

    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n  {}\n)",
        quote_identifier(&table.name, dialect),
        parts.join(",\n  ")
    )
}

/// Conventional name of a unique constraint or index.
pub(crate) fn unique_name(table: &str, columns: &[String]) -> String {
    format!("uk_{}_{}", table, columns.join("_"))
}
