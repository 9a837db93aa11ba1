//! PostgreSQL DDL generator.

use super::{DdlGenerator, generate_create_table};
use tessera_core::{Dialect, SqlType, TableSchema};

/// DDL generator for PostgreSQL.
pub struct PostgresDdlGenerator;

impl DdlGenerator for PostgresDdlGenerator {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    fn type_name(&self, sql_type: SqlType) -> &'static str {
        match sql_type {
            SqlType::Text => "TEXT",
            SqlType::BigInt => "BIGINT",
            SqlType::Double => "DOUBLE PRECISION",
            SqlType::Bool => "BOOLEAN",
            SqlType::Timestamp => "TIMESTAMPTZ",
            SqlType::Json => "JSONB",
            SqlType::TextArray => "TEXT[]",
        }
    }

    fn create_table(&self, table: &TableSchema) -> Vec<String> {
        tracing::debug!(dialect = "postgres", table = %table.name, "Generating DDL");
        vec![generate_create_table(self, table, true)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::ColumnDef;

    #[test]
    fn test_array_and_json_types() {
        let mut table = TableSchema::new("pages");
        table.columns.push(ColumnDef::new("tags", SqlType::TextArray));
        table.columns.push(ColumnDef::new("meta", SqlType::Json));
        let stmts = PostgresDdlGenerator.create_table(&table);
        assert_eq!(stmts.len(), 1);
        assert!(stmts[0].contains("\"tags\" TEXT[]"));
        assert!(stmts[0].contains("\"meta\" JSONB"));
    }
}
