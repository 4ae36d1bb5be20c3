//! # FlatRec Store
//!
//! Embedded object store for FlatRec buffers.
//!
//! This crate provides:
//! - A [`Model`] of entity types and relations, each entity keyed by a `u64` id
//! - [`Transaction`]s: one writer at a time, snapshot-isolated readers
//! - [`Cursor`]s for put, get, iteration, removal, backlinks and relations
//! - [`Query`]s with property conditions, ordering and reusable parameters
//! - [`EntityBox`] for records generated with `flatrec_codec::define_table!`
//!
//! Objects are stored as finished, verified buffers and handed back as
//! [`bytes::Bytes`] that stay valid after the transaction ends. A store with
//! a directory keeps its committed state in one checksummed data file,
//! replaced atomically on every commit.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod cursor;
mod entity_box;
mod error;
mod model;
mod persist;
mod query;
mod snapshot;
mod store;
mod transaction;
mod types;

pub use config::{
    DebugFlags, StoreConfig, DEFAULT_FILE_MODE, DEFAULT_MAX_DB_SIZE_KB, DEFAULT_MAX_READERS,
};
pub use cursor::Cursor;
pub use entity_box::EntityBox;
pub use error::{StoreError, StoreResult};
pub use model::{EntityType, Model, Relation};
pub use persist::{compute_crc32, data_path, DATA_FILE, DATA_MAGIC, DATA_TEMP_FILE, DATA_VERSION};
pub use query::{Condition, OrderFlags, ParamTarget, Query, QueryBuilder, QueryParam};
pub use store::Store;
pub use transaction::{Transaction, TransactionState};
pub use types::{EntityTypeId, PutMode, RelationId, TransactionId};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
