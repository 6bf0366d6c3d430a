//! Normalized, awaitable MongoDB access
//!
//! `yieldb` sits on top of the official driver and gives every collection
//! operation the same shape: arguments are normalized up front (hex strings
//! become `ObjectId`s, bare ids become `{ _id: .. }` selectors, common option
//! keys get consistent defaults) and the operation itself is a lazy value
//! that runs when awaited.
//!
//! # Features
//! - Lazy operations that compose with `join!`/`try_join_all`
//! - Query builders that resolve to all documents or a stream
//! - `ObjectId` casting in selectors, updates and pipelines
//! - Uniform `multi`/`fullResult`/`new` option defaults
//!
//! # Example
//!
//! ```ignore
//! use yieldb::{bson::doc, Database};
//!
//! let db = Database::connect("mongodb://localhost:27017/app").await?;
//! let users = db.col("users")?;
//!
//! let (admins, total) = tokio::try_join!(
//!     users.find(doc! { "role": "admin" }, None)?.exec(),
//!     users.count((), None)?,
//! )?;
//!
//! db.close().await?;
//! ```

pub mod cast;
pub mod collection;
pub mod connection;
pub mod database;
pub mod deferred;
pub mod options;
pub mod query;
pub mod selector;
pub mod validation;

#[cfg(test)]
mod test_support;

pub use cast::{CastMode, IdCaster};
pub use collection::{Collection, InsertDocs};
pub use connection::{Connection, PoolConfig};
pub use database::{Database, DatabaseConfig};
pub use deferred::Deferred;
pub use options::{InsertResult, Options, Shaped, WriteResult};
pub use query::{Aggregate, DocumentStream, Many, One, Query, QueryMode};
pub use selector::SelectorInput;
pub use validation::ValidatedCollectionName;
pub use yieldb_common::{Result, YieldbError};

pub use bson;
pub use mongodb;
