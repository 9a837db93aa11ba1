//! SQLite DDL generator.
//!
//! SQLite cannot drop an inline UNIQUE constraint without recreating the
//! table, so unique constraints are emitted as named unique indexes.

use super::{DdlGenerator, generate_create_table, quote_identifier, unique_name};
use tessera_core::{Dialect, SqlType, TableSchema};

/// DDL generator for SQLite.
pub struct SqliteDdlGenerator;

impl DdlGenerator for SqliteDdlGenerator {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn type_name(&self, sql_type: SqlType) -> &'static str {
        match sql_type {
            SqlType::Text | SqlType::Timestamp | SqlType::Json | SqlType::TextArray => "TEXT",
            SqlType::BigInt | SqlType::Bool => "INTEGER",
            SqlType::Double => "REAL",
        }
    }

    fn create_table(&self, table: &TableSchema) -> Vec<String> {
        tracing::debug!(dialect = "sqlite", table = %table.name, "Generating DDL");

        let mut stmts = vec![generate_create_table(self, table, false)];
        for columns in &table.unique {
            let cols: Vec<String> = columns
                .iter()
                .map(|c| quote_identifier(c, Dialect::Sqlite))
                .collect();
            stmts.push(format!(
                "CREATE UNIQUE INDEX IF NOT EXISTS {} ON {}({})",
                quote_identifier(&unique_name(&table.name, columns), Dialect::Sqlite),
                quote_identifier(&table.name, Dialect::Sqlite),
                cols.join(", ")
            ));
        }
        stmts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::ColumnDef;

    #[test]
    fn test_unique_emitted_as_index() {
        let mut table = TableSchema::new("pages_locales");
        table.columns.push(ColumnDef::new("id", SqlType::Text).not_null());
        table.columns.push(ColumnDef::new("parentId", SqlType::Text).not_null());
        table.columns.push(ColumnDef::new("locale", SqlType::Text).not_null());
        table.primary_key.push("id".into());
        table.unique.push(vec!["parentId".into(), "locale".into()]);

        let stmts = SqliteDdlGenerator.create_table(&table);
        assert_eq!(stmts.len(), 2);
        assert!(!stmts[0].contains("UNIQUE"));
        assert_eq!(
            stmts[1],
            "CREATE UNIQUE INDEX IF NOT EXISTS \"uk_pages_locales_parentId_locale\" ON \"pages_locales\"(\"parentId\", \"locale\")"
        );
    }

    #[test]
    fn test_bool_is_integer() {
        assert_eq!(SqliteDdlGenerator.type_name(SqlType::Bool), "INTEGER");
    }
}
