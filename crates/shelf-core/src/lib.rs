//! Shelf Core Library
//!
//! This crate provides the core of shelf, a reading list that keeps exactly
//! one live [`Item`] per URL in front of a pluggable durable store.
//!
//! # Architecture
//!
//! - **ReadingList**: identity map, cursor registry and observer registry;
//!   every query and mutation goes through it
//! - **StoreAdapter**: durable storage (SQLite or in-memory)
//! - **Cursor**: resumable, invalidatable view over query results
//!
//! # Quick Start
//!
//! ```text
//! let list = ReadingList::new(SqliteStore::open(config.sqlite_path())?);
//!
//! // Add an item
//! let item = list.add_item(ItemFields::new("https://example.com")).await?;
//! item.apply(ItemPatch::new().title("Example")).await?;
//!
//! // Query unread items
//! let unread = list.items(&[QueryOptions::new().eq(Field::Unread, true)]).await?;
//! ```
//!
//! # Modules
//!
//! - `list`: the list manager (main entry point)
//! - `item`: shared item handles
//! - `cursor`: paging over query results
//! - `query`: match specifications and the matcher
//! - `models`: record fields, patches and URL helpers
//! - `observer`: mutation observers
//! - `storage`: store adapters
//! - `config`: application configuration

pub mod config;
pub mod cursor;
pub mod error;
pub mod item;
pub mod list;
pub mod models;
pub mod observer;
pub mod query;
pub mod storage;

pub use config::Config;
pub use cursor::Cursor;
pub use error::{Error, Result};
pub use item::Item;
pub use list::ReadingList;
pub use models::{Field, FieldValue, ItemFields, ItemPatch, SyncStatus};
pub use observer::{ListEvent, ListObserver};
pub use query::{Condition, QueryOptions};
pub use storage::{MemoryStore, SqliteStore, StoreAdapter, StoreError};
