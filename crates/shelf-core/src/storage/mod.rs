//! Storage layer
//!
//! The list manager never persists anything itself. It talks to a
//! [`StoreAdapter`], which owns the durable copy of every record.
//!
//! ## Adapters
//!
//! - [`MemoryStore`]: Vec-backed, filters with the query matcher
//! - [`SqliteStore`]: SQLite-backed, compiles match specifications to SQL
//!
//! Adapters see records as plain [`ItemFields`]; identity, caching and
//! observer notification all live in the list manager.

pub mod error;
pub mod memory;
pub mod schema;
pub mod sqlite;

use futures_util::future::BoxFuture;

use crate::models::ItemFields;
use crate::query::QueryOptions;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use schema::{init_schema, needs_init, SCHEMA_VERSION};
pub use sqlite::SqliteStore;

/// Per-record callback handed to [`StoreAdapter::for_each_item`]
pub type EachRecord<'a> = &'a mut (dyn FnMut(ItemFields) + Send);

/// Contract between the list manager and a durable store
///
/// `count` ignores paging. `for_each_item` honours sort, limit and offset
/// from the trailing options object and invokes the callback once per
/// matching record, in sort order.
pub trait StoreAdapter: Send + Sync {
    /// Number of stored records matching the specification
    fn count<'a>(&'a self, specs: &'a [QueryOptions]) -> BoxFuture<'a, StoreResult<usize>>;

    /// Invoke `each` for every matching stored record
    fn for_each_item<'a>(
        &'a self,
        specs: &'a [QueryOptions],
        each: EachRecord<'a>,
    ) -> BoxFuture<'a, StoreResult<()>>;

    /// Persist a new record; fails with `Duplicate` if the key exists
    fn add_item<'a>(&'a self, fields: &'a ItemFields) -> BoxFuture<'a, StoreResult<()>>;

    /// Persist changes to the record keyed by `fields.url`
    fn update_item<'a>(&'a self, fields: &'a ItemFields) -> BoxFuture<'a, StoreResult<()>>;

    /// Remove the record with this natural key
    fn delete_item_by_key<'a>(&'a self, url: &'a str) -> BoxFuture<'a, StoreResult<()>>;

    /// Release underlying resources
    fn destroy(&self) -> BoxFuture<'_, StoreResult<()>>;
}
