use std::sync::Arc;

use crate::cast::CastMode;
use crate::connection::{Connection, PoolConfig};
use crate::database::Database;

/// A database handle whose driver has not contacted any server
pub(crate) async fn offline_database() -> Database {
    offline_database_with(CastMode::default()).await
}

pub(crate) async fn offline_database_with(cast_mode: CastMode) -> Database {
    let config = PoolConfig {
        min_pool_size: None,
        ..PoolConfig::default()
    };
    let conn = Connection::with_config("mongodb://localhost:27017/yieldb_unit", config)
        .await
        .expect("offline connection");
    Database::from_connection(Arc::new(conn), cast_mode)
}
