//! Whole-registry schema creation.

use tessera_core::{Dialect, Registry, Statement, TableSchema};

use crate::ddl::generator_for;
use crate::physical::PhysicalTables;

/// Collects the physical tables of every collection in a registry.
///
/// Main tables come first so that foreign keys between collections always
/// point at a table created earlier in the batch.
#[derive(Debug, Clone, Default)]
pub struct SchemaBuilder {
    layouts: Vec<PhysicalTables>,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Layout of every collection in `registry`.
    pub fn from_registry(registry: &Registry) -> Self {
        let mut builder = Self::new();
        for collection in registry.collections() {
            builder.layouts.push(PhysicalTables::compile(collection));
        }
        builder
    }

    /// Add one compiled layout.
    pub fn layout(mut self, layout: PhysicalTables) -> Self {
        self.layouts.push(layout);
        self
    }

    /// Tables in creation order.
    pub fn tables(&self) -> Vec<&TableSchema> {
        let mut out: Vec<&TableSchema> = self.layouts.iter().map(|l| &l.main).collect();
        out.extend(self.layouts.iter().filter_map(|l| l.locales.as_ref()));
        out.extend(self.layouts.iter().filter_map(|l| l.versions.as_ref()));
        out.extend(self.layouts.iter().filter_map(|l| l.locale_versions.as_ref()));
        out
    }

    /// `CREATE TABLE` statements in creation order.
    pub fn statements(&self) -> Vec<Statement> {
        self.tables()
            .into_iter()
            .map(|t| Statement::CreateTable(t.clone()))
            .collect()
    }

    /// DDL text for `dialect`.
    pub fn build(&self, dialect: Dialect) -> Vec<String> {
        let generator = generator_for(dialect);
        let stmts: Vec<String> = self
            .tables()
            .into_iter()
            .flat_map(|t| generator.create_table(t))
            .collect();
        tracing::info!(
            dialect = ?dialect,
            tables = self.tables().len(),
            statements = stmts.len(),
            "Generated schema DDL"
        );
        stmts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::{Collection, FieldDef, ReferentialAction};

    fn registry() -> Registry {
        Registry::new(vec![
            Collection::new("posts")
                .field(FieldDef::text("title").localized())
                .field(FieldDef::text("authorId").references("users", ReferentialAction::Cascade)),
            Collection::new("users").field(FieldDef::text("name")).versioned(None),
        ])
        .unwrap()
    }

    #[test]
    fn test_main_tables_first() {
        let builder = SchemaBuilder::from_registry(&registry());
        let names: Vec<&str> = builder.tables().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["posts", "users", "posts_locales", "users_versions"]);
    }

    #[test]
    fn test_statements_and_ddl() {
        let builder = SchemaBuilder::from_registry(&registry());
        assert_eq!(builder.statements().len(), 4);
        let sqlite = builder.build(Dialect::Sqlite);
        // posts_locales and users_versions each add a unique index.
        assert_eq!(sqlite.len(), 6);
        assert!(sqlite.iter().all(|s| s.starts_with("CREATE")));
    }
}
