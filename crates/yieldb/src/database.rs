//! Database handle

use std::sync::Arc;

use tracing::{debug_span, info, instrument, Instrument};

use crate::cast::{CastMode, IdCaster};
use crate::collection::Collection;
use crate::connection::{Connection, PoolConfig};
use crate::deferred::Deferred;
use crate::validation::ValidatedCollectionName;
use crate::Result;

/// Settings used when opening a [`Database`]
#[derive(Debug, Clone, Default)]
pub struct DatabaseConfig {
    /// Driver pool settings
    pub pool: PoolConfig,
    /// How `_id` values are cast in selectors, updates and pipelines
    pub cast_mode: CastMode,
}

impl DatabaseConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    pub fn with_cast_mode(mut self, cast_mode: CastMode) -> Self {
        self.cast_mode = cast_mode;
        self
    }
}

/// An open connection to the database named in the connection string
///
/// Cloning is cheap; clones share the same driver client.
#[derive(Debug, Clone)]
pub struct Database {
    conn: Arc<Connection>,
    caster: IdCaster,
}

impl Database {
    /// Connect with default settings
    ///
    /// Resolves once the server has answered a ping.
    pub async fn connect(uri: &str) -> Result<Self> {
        Self::connect_with_config(uri, DatabaseConfig::default()).await
    }

    /// Connect with explicit pool and cast settings
    #[instrument(skip_all, fields(cast_mode = ?config.cast_mode))]
    pub async fn connect_with_config(uri: &str, config: DatabaseConfig) -> Result<Self> {
        let conn = Connection::with_config(uri, config.pool).await?;
        conn.ping().await?;
        info!(database = %conn.database_name(), "Connected");

        Ok(Self::from_connection(Arc::new(conn), config.cast_mode))
    }

    /// Wrap an existing connection without contacting the server
    pub fn from_connection(conn: Arc<Connection>, cast_mode: CastMode) -> Self {
        Self {
            conn,
            caster: IdCaster::new(cast_mode),
        }
    }

    /// Get the database name
    pub fn name(&self) -> &str {
        self.conn.database_name()
    }

    /// Get the shared connection
    pub fn connection(&self) -> &Arc<Connection> {
        &self.conn
    }

    /// Get the cast mode applied by collections from this database
    pub fn cast_mode(&self) -> CastMode {
        self.caster.mode()
    }

    /// Get a collection by name
    ///
    /// Collections are created by the server on first write; nothing is
    /// sent here.
    pub fn col(&self, name: &str) -> Result<Collection> {
        let name = ValidatedCollectionName::new(name)?;
        Ok(Collection::new(name, self.conn.clone(), self.caster))
    }

    /// Close the connection
    ///
    /// Operations driven afterwards fail with a connection error.
    pub fn close(&self) -> Deferred<()> {
        let conn = self.conn.clone();
        let span = debug_span!("close", database = %conn.database_name());
        Deferred::new(
            async move {
                conn.shutdown().await?;
                info!("Connection closed");
                Ok(())
            }
            .instrument(span),
        )
    }

    /// Drop the whole database
    pub fn drop(&self) -> Deferred<()> {
        let conn = self.conn.clone();
        let span = debug_span!("drop_database", database = %conn.database_name());
        Deferred::new(
            async move {
                conn.drop_database().await?;
                info!("Database dropped");
                Ok(())
            }
            .instrument(span),
        )
    }
}
