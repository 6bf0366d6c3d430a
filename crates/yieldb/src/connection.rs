//! Shared MongoDB connection handle with pool configuration

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bson::{doc, Document};
use mongodb::{
    options::{ClientOptions, ServerApi, ServerApiVersion},
    Client, Collection, Database,
};
use tracing::{info, instrument};

use crate::{Result, YieldbError};

/// Connection pool configuration
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Minimum number of connections in the pool (default: 5)
    pub min_pool_size: Option<u32>,
    /// Maximum number of connections in the pool (default: 20)
    pub max_pool_size: Option<u32>,
    /// Maximum time a connection can remain idle before being closed (default: none)
    pub max_idle_time: Option<Duration>,
    /// Connection timeout (default: 10s)
    pub connect_timeout: Option<Duration>,
    /// Server selection timeout (default: 30s)
    pub server_selection_timeout: Option<Duration>,
    /// Application name for server logs
    pub app_name: Option<String>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_pool_size: Some(5),
            max_pool_size: Some(20),
            max_idle_time: None,
            connect_timeout: Some(Duration::from_secs(10)),
            server_selection_timeout: Some(Duration::from_secs(30)),
            app_name: Some("yieldb".to_string()),
        }
    }
}

impl PoolConfig {
    fn apply(self, client_options: &mut ClientOptions) {
        if let Some(min) = self.min_pool_size {
            client_options.min_pool_size = Some(min);
        }
        if let Some(max) = self.max_pool_size {
            client_options.max_pool_size = Some(max);
        }
        if let Some(idle) = self.max_idle_time {
            client_options.max_idle_time = Some(idle);
        }
        if let Some(connect) = self.connect_timeout {
            client_options.connect_timeout = Some(connect);
        }
        if let Some(server_sel) = self.server_selection_timeout {
            client_options.server_selection_timeout = Some(server_sel);
        }
        if let Some(app) = self.app_name {
            client_options.app_name = Some(app);
        }
    }
}

/// Driver client bound to the database named in the connection string
///
/// One `Connection` is shared (behind an `Arc`) by a [`Database`](crate::Database)
/// and every collection it hands out. It is never replaced; `close` only
/// flips the closed flag and shuts the client down.
pub struct Connection {
    client: Client,
    database: Database,
    database_name: String,
    closed: AtomicBool,
}

impl Connection {
    /// Create a new MongoDB connection with default pool settings
    pub async fn new(connection_string: &str) -> Result<Self> {
        Self::with_config(connection_string, PoolConfig::default()).await
    }

    /// Create a new MongoDB connection with custom pool configuration
    ///
    /// The driver connects lazily; use [`Connection::ping`] to verify the link.
    #[instrument(skip_all, fields(app_name = ?config.app_name))]
    pub async fn with_config(connection_string: &str, config: PoolConfig) -> Result<Self> {
        if connection_string.is_empty() {
            return Err(YieldbError::Connection(
                "Connection string cannot be empty".to_string(),
            ));
        }

        let mut client_options = ClientOptions::parse(connection_string).await?;
        config.apply(&mut client_options);

        // Set stable API version for compatibility
        let server_api = ServerApi::builder().version(ServerApiVersion::V1).build();
        client_options.server_api = Some(server_api);

        let client = Client::with_options(client_options)?;

        let database = client.default_database().ok_or_else(|| {
            YieldbError::Connection(
                "No default database specified in connection string".to_string(),
            )
        })?;

        let database_name = database.name().to_string();
        info!(database = %database_name, "Client created");

        Ok(Self {
            client,
            database,
            database_name,
            closed: AtomicBool::new(false),
        })
    }

    /// Get a reference to the database
    pub fn database(&self) -> &Database {
        &self.database
    }

    /// Get the database name
    pub fn database_name(&self) -> &str {
        &self.database_name
    }

    /// Get a reference to the client
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Get a collection by name (returns untyped document collection)
    pub fn get_collection(&self, name: &str) -> Collection<Document> {
        self.database.collection(name)
    }

    /// Returns true once the connection has been closed
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Fail if the connection has been closed
    pub fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(YieldbError::Connection("Connection is closed".to_string()));
        }
        Ok(())
    }

    /// Check if the connection is healthy by pinging the server
    pub async fn ping(&self) -> Result<()> {
        self.ensure_open()?;
        self.database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| YieldbError::Connection(format!("Ping failed: {}", e)))?;
        Ok(())
    }

    /// Drop the current database (use with caution!)
    pub async fn drop_database(&self) -> Result<()> {
        self.ensure_open()?;
        self.database.drop().await?;
        Ok(())
    }

    /// Mark the connection closed and shut the client down
    ///
    /// Waits for cursors still held by callers to be dropped.
    pub async fn shutdown(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.client.clone().shutdown().await;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn mark_closed(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("database_name", &self.database_name)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
