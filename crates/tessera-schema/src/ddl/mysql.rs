//! MySQL DDL generator.
//!
//! MySQL cannot index or key unbounded `TEXT`, so text columns are
//! `VARCHAR(255)`. Arrays are stored as JSON.

use super::{DdlGenerator, generate_create_table};
use tessera_core::{Dialect, SqlType, TableSchema};

/// DDL generator for MySQL.
pub struct MysqlDdlGenerator;

impl DdlGenerator for MysqlDdlGenerator {
    fn dialect(&self) -> Dialect {
        Dialect::Mysql
    }

    fn type_name(&self, sql_type: SqlType) -> &'static str {
        match sql_type {
            SqlType::Text => "VARCHAR(255)",
            SqlType::BigInt => "BIGINT",
            SqlType::Double => "DOUBLE",
            SqlType::Bool => "BOOLEAN",
            SqlType::Timestamp => "VARCHAR(32)",
            SqlType::Json | SqlType::TextArray => "JSON",
        }
    }

    fn create_table(&self, table: &TableSchema) -> Vec<String> {
        tracing::debug!(dialect = "mysql", table = %table.name, "Generating DDL");
        vec![generate_create_table(self, table, true)]
    }
}
