//! The reading list manager
//!
//! A [`ReadingList`] sits in front of a [`StoreAdapter`] and owns three
//! registries:
//!
//! - **identity map**: URL → weak item, so every live handle for a URL is
//!   the same [`Item`]
//! - **cursor registry**: weak validity flags of every outstanding
//!   [`Cursor`]
//! - **observers**: notified after each mutation
//!
//! ## Mutation path
//!
//! `add_item`, `update_item` and `delete_item` run under one async lock
//! per list, in this order: persist through the adapter, update the
//! identity map, invalidate every live cursor, notify observers.
//!
//! ## Usage
//!
//! ```ignore
//! let list = ReadingList::new(SqliteStore::open(config.sqlite_path())?);
//!
//! let item = list.add_item(ItemFields::new("https://example.com")).await?;
//! item.apply(ItemPatch::new().title("Example")).await?;
//!
//! let mut cursor = list.iterator(&[QueryOptions::new().eq(Field::Unread, true)])?;
//! let first_page = cursor.items(Some(20)).await?;
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::{debug, info};

use crate::cursor::Cursor;
use crate::error::{Error, Result};
use crate::item::{Item, ItemInner};
use crate::models::{self, normalize_url, Field, ItemFields, ItemPatch};
use crate::observer::{dispatch, same_observer, ListEvent, ListObserver};
use crate::query::{self, QueryOptions};
use crate::storage::StoreAdapter;

/// Identity map size above which stale entries are swept
const PRUNE_THRESHOLD: usize = 64;

pub(crate) struct ListInner {
    store: Box<dyn StoreAdapter>,
    items: Mutex<HashMap<String, Weak<ItemInner>>>,
    cursors: Mutex<Vec<Weak<AtomicBool>>>,
    observers: Mutex<Vec<Arc<dyn ListObserver>>>,
    /// Serializes the mutation path
    write_lock: tokio::sync::Mutex<()>,
    /// Bumped by every committed mutation
    generation: AtomicU64,
    destroyed: AtomicBool,
}

/// Identity-preserving list of reading items over a store adapter
///
/// Cloning the handle is cheap; clones share the same list.
#[derive(Clone)]
pub struct ReadingList {
    inner: Arc<ListInner>,
}

impl ReadingList {
    /// Create a list over the given store
    pub fn new(store: impl StoreAdapter + 'static) -> Self {
        Self {
            inner: Arc::new(ListInner {
                store: Box::new(store),
                items: Mutex::new(HashMap::new()),
                cursors: Mutex::new(Vec::new()),
                observers: Mutex::new(Vec::new()),
                write_lock: tokio::sync::Mutex::new(()),
                generation: AtomicU64::new(0),
                destroyed: AtomicBool::new(false),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<ListInner>) -> Self {
        Self { inner }
    }

    /// Whether two handles refer to the same list
    pub fn ptr_eq(a: &ReadingList, b: &ReadingList) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    // ==================== Queries ====================

    /// Number of stored items matching the specification
    pub async fn count(&self, specs: &[QueryOptions]) -> Result<usize> {
        self.ensure_open()?;
        query::validate(specs)?;
        self.inner
            .store
            .count(specs)
            .await
            .map_err(Error::from_store)
    }

    /// Deliver every matching item to `callback`, one at a time
    ///
    /// Each callback future is awaited before the next item is delivered.
    /// A failing callback stops the iteration and its error is returned as
    /// [`Error::Callback`].
    ///
    /// Records are fetched up front. Once a callback mutates the list, the
    /// remaining records are resolved again: live items are delivered as
    /// they are, others are re-read from the store and skipped if deleted.
    pub async fn for_each_item<F, Fut>(&self, specs: &[QueryOptions], mut callback: F) -> Result<()>
    where
        F: FnMut(Item) -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        self.ensure_open()?;
        query::validate(specs)?;

        let generation = self.generation();
        let records = self.fetch(specs).await?;
        debug!("Delivering {} item(s)", records.len());

        for fields in records {
            let item = if self.generation() == generation {
                self.hydrate(fields)
            } else {
                match self.resolve_stale(&fields.url).await? {
                    Some(item) => item,
                    None => continue,
                }
            };
            callback(item).await.map_err(Error::Callback)?;
        }
        Ok(())
    }

    /// Collect every matching item
    pub async fn items(&self, specs: &[QueryOptions]) -> Result<Vec<Item>> {
        let mut items = Vec::new();
        self.for_each_item(specs, |item| {
            items.push(item);
            futures_util::future::ready(Ok(()))
        })
        .await?;
        Ok(items)
    }

    /// Create a cursor over the specification, starting at offset 0
    pub fn iterator(&self, specs: &[QueryOptions]) -> Result<Cursor> {
        self.ensure_open()?;
        query::validate(specs)?;

        let valid = Arc::new(AtomicBool::new(true));
        let mut cursors = lock(&self.inner.cursors);
        cursors.retain(|flag| flag.strong_count() > 0);
        cursors.push(Arc::downgrade(&valid));

        Ok(Cursor::new(self.clone(), specs.to_vec(), valid))
    }

    /// Look up the item stored under `url`
    pub async fn item_for_url(&self, url: &str) -> Result<Option<Item>> {
        let specs = [QueryOptions::new()
            .eq(Field::Url, normalize_url(url))
            .limit(1)];
        Ok(self.items(&specs).await?.into_iter().next())
    }

    /// Look up the item with this server-assigned id
    pub async fn item_for_guid(&self, guid: &str) -> Result<Option<Item>> {
        let specs = [QueryOptions::new().eq(Field::Guid, guid).limit(1)];
        Ok(self.items(&specs).await?.into_iter().next())
    }

    pub async fn has_item_for_url(&self, url: &str) -> Result<bool> {
        let specs = [QueryOptions::new().eq(Field::Url, normalize_url(url))];
        Ok(self.count(&specs).await? > 0)
    }

    /// Number of items currently alive in the identity map
    pub fn cached_len(&self) -> usize {
        let mut items = lock(&self.inner.items);
        items.retain(|_, weak| weak.strong_count() > 0);
        items.len()
    }

    // ==================== Mutations ====================

    /// Add a new item
    ///
    /// The URL is required and normalized. Fails with
    /// [`Error::DuplicateKey`] if the URL or the supplied guid is already
    /// stored.
    pub async fn add_item(&self, mut fields: ItemFields) -> Result<Item> {
        self.ensure_open()?;
        fields.url = normalize_url(&fields.url);
        if fields.url.is_empty() {
            return Err(Error::Validation("item url is required".into()));
        }
        if fields.added_on.is_none() {
            fields.added_on = Some(models::now());
        }

        let _guard = self.inner.write_lock.lock().await;

        let mut existing = vec![QueryOptions::new().eq(Field::Url, fields.url.clone())];
        if let Some(guid) = &fields.guid {
            existing.push(QueryOptions::new().eq(Field::Guid, guid.clone()));
        }
        let found = self
            .inner
            .store
            .count(&existing)
            .await
            .map_err(Error::from_store)?;
        if found > 0 {
            return Err(Error::DuplicateKey { key: fields.url });
        }

        self.inner
            .store
            .add_item(&fields)
            .await
            .map_err(Error::from_store)?;
        debug!("Added item {}", fields.url);

        let item = self.hydrate(fields);
        self.after_mutation(ListEvent::Added, &item);
        Ok(item)
    }

    /// Persist the item's current fields
    pub async fn update_item(&self, item: &Item) -> Result<()> {
        self.commit(item, None).await
    }

    /// Remove the item from the store and detach it from this list
    pub async fn delete_item(&self, item: &Item) -> Result<()> {
        self.ensure_open()?;
        let _guard = self.inner.write_lock.lock().await;
        self.ensure_member(item)?;

        self.inner
            .store
            .delete_item_by_key(item.url())
            .await
            .map_err(Error::from_store)?;
        debug!("Deleted item {}", item.url());

        item.detach();
        {
            let mut items = lock(&self.inner.items);
            let cached = items
                .get(item.url())
                .is_some_and(|weak| std::ptr::eq(weak.as_ptr(), item.downgrade().as_ptr()));
            if cached {
                items.remove(item.url());
            }
        }

        self.after_mutation(ListEvent::Deleted, item);
        Ok(())
    }

    /// Persist `item`, optionally applying `patch` first
    ///
    /// Patched values are written to the item only after the store accepts
    /// them.
    pub(crate) async fn commit(&self, item: &Item, patch: Option<&ItemPatch>) -> Result<()> {
        self.ensure_open()?;
        let _guard = self.inner.write_lock.lock().await;
        self.ensure_member(item)?;

        let mut fields = item.fields();
        if let Some(patch) = patch {
            patch.apply_to(&mut fields);
        }

        self.inner
            .store
            .update_item(&fields)
            .await
            .map_err(Error::from_store)?;
        debug!("Updated item {}", item.url());

        item.replace_fields(fields);
        self.after_mutation(ListEvent::Updated, item);
        Ok(())
    }

    // ==================== Observers ====================

    pub fn add_listener(&self, observer: Arc<dyn ListObserver>) {
        lock(&self.inner.observers).push(observer);
    }

    pub fn remove_listener(&self, observer: &Arc<dyn ListObserver>) {
        lock(&self.inner.observers).retain(|existing| !same_observer(existing, observer));
    }

    // ==================== Lifecycle ====================

    /// Close the store and detach every cached item
    ///
    /// The list is unusable afterwards; every operation fails with
    /// [`Error::Destroyed`]. Calling `destroy` again is a no-op.
    pub async fn destroy(&self) -> Result<()> {
        if self.inner.destroyed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let _guard = self.inner.write_lock.lock().await;

        self.invalidate_cursors();
        let closed = self.inner.store.destroy().await;

        let items = std::mem::take(&mut *lock(&self.inner.items));
        for inner in items.into_values().filter_map(|weak| weak.upgrade()) {
            Item::from_inner(inner).detach();
        }
        lock(&self.inner.observers).clear();
        info!("Reading list destroyed");

        closed.map_err(Error::from_store)
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::SeqCst)
    }

    // ==================== Private helpers ====================

    fn ensure_open(&self) -> Result<()> {
        if self.is_destroyed() {
            return Err(Error::Destroyed);
        }
        Ok(())
    }

    fn ensure_member(&self, item: &Item) -> Result<()> {
        if item.belongs_to(&self.inner) {
            Ok(())
        } else {
            Err(Error::NotAMember)
        }
    }

    async fn fetch(&self, specs: &[QueryOptions]) -> Result<Vec<ItemFields>> {
        let mut records = Vec::new();
        self.inner
            .store
            .for_each_item(specs, &mut |fields: ItemFields| records.push(fields))
            .await
            .map_err(Error::from_store)?;
        Ok(records)
    }

    fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::SeqCst)
    }

    /// Current item for a record fetched before a mutation
    async fn resolve_stale(&self, url: &str) -> Result<Option<Item>> {
        if let Some(item) = self.live_item(url) {
            return Ok(Some(item));
        }
        let specs = [QueryOptions::new().eq(Field::Url, url).limit(1)];
        let current = self.fetch(&specs).await?.into_iter().next();
        Ok(current.map(|fields| self.hydrate(fields)))
    }

    fn live_item(&self, url: &str) -> Option<Item> {
        lock(&self.inner.items)
            .get(url)
            .and_then(Weak::upgrade)
            .map(Item::from_inner)
    }

    /// Resolve a stored record to its live item, creating one if needed
    ///
    /// A live item already holds every committed change, so the record only
    /// seeds items that are not cached.
    fn hydrate(&self, fields: ItemFields) -> Item {
        let mut items = lock(&self.inner.items);

        if let Some(inner) = items.get(&fields.url).and_then(Weak::upgrade) {
            return Item::from_inner(inner);
        }

        let item = Item::attached(fields, &self.inner);
        items.insert(item.url().to_string(), item.downgrade());

        // Amortized sweep of entries whose items were dropped
        if items.len() > PRUNE_THRESHOLD && items.len().is_power_of_two() {
            items.retain(|_, weak| weak.strong_count() > 0);
        }
        item
    }

    fn after_mutation(&self, event: ListEvent, item: &Item) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        self.invalidate_cursors();
        let observers = lock(&self.inner.observers).clone();
        dispatch(&observers, event, item);
    }

    fn invalidate_cursors(&self) {
        let cursors = std::mem::take(&mut *lock(&self.inner.cursors));
        for flag in cursors.iter().filter_map(Weak::upgrade) {
            flag.store(false, Ordering::SeqCst);
        }
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
