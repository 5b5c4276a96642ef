//! Pooled data-access layer with a generic DAO, scoped units of work, and a
//! shared background executor for fire-and-forget writes.
//!
//! # Overview
//!
//! Each [`Dao`] pairs one entity type with one connection-pooled store and
//! exposes keyed reads, filtered lists, create/update/upsert/delete, deferred
//! `_ff` variants of the writes, and a custom escape hatch. Every operation
//! runs in its own unit of work that commits on success and rolls back on any
//! error; returned entities are detached snapshots with no live store
//! association.
//!
//! # Example
//!
//! ```ignore
//! use pooled_dao::{Dao, Entity, StoreConfig, fields};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct User {
//!     id: i64,
//!     name: String,
//! }
//!
//! impl Entity for User {
//!     type Key = i64;
//!     const TABLE: &'static str = "users";
//! }
//!
//! # async fn demo() -> pooled_dao::DaoResult<()> {
//! let dao: Dao<User> = Dao::connect(&StoreConfig::new("app.db")).await?;
//! let user = dao.create(fields! { "name" => "Ada" }).await?;
//! let found = dao.get(user.id).await?;
//!
//! // Deferred write; the handle delivers the result if anyone cares.
//! let handle = dao.update_ff(user.id, fields! { "name" => "Ada L." });
//! let updated = handle.await?;
//! dao.close().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod dao;
pub mod entity;
pub mod error;
pub mod executor;
pub mod macros;
pub mod store;

pub use config::{PoolOptions, StoreConfig};
pub use dao::Dao;
pub use entity::{Entity, FieldMap, FieldValue, Record, detach};
pub use error::{DaoError, DaoResult};
pub use executor::{BackgroundExecutor, FfHandle};
pub use store::{SelectQuery, SortKey, SqliteStore, Store, UnitOfWork};
