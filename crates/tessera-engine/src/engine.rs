//! The engine handle.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tessera_core::{
    Collection, Connection, Dialect, Error, Outcome, Registry, Result, try_outcome,
};
use tessera_schema::SchemaBuilder;

use crate::changes::{ChangeSink, NoopSink};
use crate::config::EngineConfig;
use crate::context::Context;
use crate::crud::CollectionApi;
use crate::global::GlobalApi;

/// Shared state behind every [`Engine`] clone.
pub(crate) struct EngineInner {
    pub(crate) registry: Registry,
    pub(crate) config: EngineConfig,
    pub(crate) sink: Arc<dyn ChangeSink>,
    savepoints: AtomicU64,
}

impl EngineInner {
    /// Fresh savepoint name, unique for the engine's lifetime.
    pub(crate) fn next_savepoint(&self) -> String {
        let n = self.savepoints.fetch_add(1, Ordering::Relaxed);
        format!("sp_{n}")
    }
}

/// Builder for [`Engine`].
pub struct EngineBuilder {
    collections: Vec<Collection>,
    config: EngineConfig,
    sink: Arc<dyn ChangeSink>,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self {
            collections: Vec::new(),
            config: EngineConfig::default(),
            sink: Arc::new(NoopSink),
        }
    }
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn collection(mut self, collection: Collection) -> Self {
        self.collections.push(collection);
        self
    }

    pub fn collections(mut self, collections: impl IntoIterator<Item = Collection>) -> Self {
        self.collections.extend(collections);
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Destination for change events. Defaults to discarding them.
    pub fn sink(mut self, sink: Arc<dyn ChangeSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Validate the declarations and build the engine.
    pub fn build(self) -> Result<Engine> {
        let registry = Registry::new(self.collections)?;
        tracing::info!(
            collections = registry.collections().count(),
            default_locale = %self.config.default_locale,
            "Engine built"
        );
        Ok(Engine {
            inner: Arc::new(EngineInner {
                registry,
                config: self.config,
                sink: self.sink,
                savepoints: AtomicU64::new(0),
            }),
        })
    }
}

/// Resolves reads and writes over a set of declared collections.
///
/// Cheap to clone; every clone shares the registry, configuration and
/// change sink. The engine holds no connection: each call takes a
/// [`Context`] naming the connection and the caller.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Operations on a regular collection.
    pub fn collection(&self, name: &str) -> Result<CollectionApi<'_>> {
        let collection = self.inner.registry.get(name)?;
        if collection.is_global() {
            return Err(Error::Schema(format!(
                "'{name}' is a global; use Engine::global"
            )));
        }
        Ok(CollectionApi::new(&self.inner, collection))
    }

    /// Operations on a global (singleton) collection.
    pub fn global(&self, name: &str) -> Result<GlobalApi<'_>> {
        let collection = self.inner.registry.get(name)?;
        if !collection.is_global() {
            return Err(Error::Schema(format!(
                "'{name}' is not a global; use Engine::collection"
            )));
        }
        Ok(GlobalApi::new(&self.inner, collection))
    }

    /// `CREATE TABLE` statements for every collection, rendered for
    /// `dialect`.
    pub fn ddl(&self, dialect: Dialect) -> Vec<String> {
        SchemaBuilder::from_registry(&self.inner.registry).build(dialect)
    }

    /// Create every table on the context's connection.
    #[tracing::instrument(level = "debug", skip(self, ctx))]
    pub async fn migrate<C: Connection>(&self, ctx: &Context<'_, C>) -> Outcome<(), Error> {
        if let Some(reason) = ctx.cx.cancel_reason() {
            return Outcome::Cancelled(reason);
        }
        let statements = SchemaBuilder::from_registry(&self.inner.registry).statements();
        tracing::info!(tables = statements.len(), "Creating tables");
        for statement in &statements {
            try_outcome!(ctx.conn.execute(ctx.cx, statement).await);
        }
        Outcome::Ok(())
    }
}
