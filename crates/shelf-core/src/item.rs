//! Reading list items
//!
//! An [`Item`] is a cheap-to-clone handle onto one cached record. Every
//! handle for the same URL obtained from the same list while any handle is
//! alive points at the same underlying item, so a change made through one
//! is visible through all of them.
//!
//! Items never talk to storage. [`Item::apply`] and [`Item::commit`] go
//! through the owning list, which persists, invalidates cursors and notifies
//! observers.

use std::fmt;
use std::sync::{Arc, Mutex, OnceLock, PoisonError, RwLock, Weak};

use crate::error::{Error, Result};
use crate::list::{ListInner, ReadingList};
use crate::models::{self, derive_item_id, url_domain, ItemFields, ItemPatch};

pub(crate) struct ItemInner {
    /// Natural key, fixed for the item's lifetime
    url: String,
    fields: RwLock<ItemFields>,
    id: OnceLock<String>,
    /// Owning list; empty once detached
    list: Mutex<Weak<ListInner>>,
}

/// Shared handle to a cached reading list item
#[derive(Clone)]
pub struct Item {
    inner: Arc<ItemInner>,
}

impl Item {
    pub(crate) fn attached(fields: ItemFields, list: &Arc<ListInner>) -> Self {
        Self {
            inner: Arc::new(ItemInner {
                url: fields.url.clone(),
                fields: RwLock::new(fields),
                id: OnceLock::new(),
                list: Mutex::new(Arc::downgrade(list)),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<ItemInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<ItemInner> {
        Arc::downgrade(&self.inner)
    }

    /// Derived identifier: a hash of the URL, computed on first use
    pub fn id(&self) -> &str {
        self.inner.id.get_or_init(|| derive_item_id(&self.inner.url))
    }

    /// The natural key
    pub fn url(&self) -> &str {
        &self.inner.url
    }

    pub fn guid(&self) -> Option<String> {
        self.read().guid.clone()
    }

    pub fn title(&self) -> Option<String> {
        self.read().title.clone()
    }

    pub fn unread(&self) -> bool {
        self.read().unread
    }

    pub fn favorite(&self) -> bool {
        self.read().favorite
    }

    /// Snapshot of every field
    pub fn fields(&self) -> ItemFields {
        self.read().clone()
    }

    /// Host part of the URL
    pub fn domain(&self) -> Option<&str> {
        url_domain(&self.inner.url)
    }

    /// The list this item belongs to, `None` once detached
    pub fn list(&self) -> Option<ReadingList> {
        self.list_ref().upgrade().map(ReadingList::from_inner)
    }

    pub fn is_attached(&self) -> bool {
        self.list_ref().strong_count() > 0
    }

    /// Whether two handles refer to the same cached item
    pub fn ptr_eq(a: &Item, b: &Item) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    /// Change several fields in one persistence round trip
    ///
    /// The new values become visible only once the store has accepted them.
    pub async fn apply(&self, patch: ItemPatch) -> Result<()> {
        let list = self.list().ok_or(Error::NotAMember)?;
        list.commit(self, Some(&patch)).await
    }

    /// Persist the current field values through the owning list
    pub async fn commit(&self) -> Result<()> {
        let list = self.list().ok_or(Error::NotAMember)?;
        list.commit(self, None).await
    }

    /// Mark the item read, recording when and by whom
    pub async fn mark_read(&self, by: Option<String>) -> Result<()> {
        let patch = ItemPatch {
            unread: Some(false),
            marked_read_on: Some(Some(models::now())),
            marked_read_by: Some(by),
            ..Default::default()
        };
        self.apply(patch).await
    }

    // ==================== Crate-internal ====================

    /// Whether this item's back-reference points at `list`
    pub(crate) fn belongs_to(&self, list: &Arc<ListInner>) -> bool {
        std::ptr::eq(self.list_ref().as_ptr(), Arc::as_ptr(list))
    }

    pub(crate) fn replace_fields(&self, fields: ItemFields) {
        *self
            .inner
            .fields
            .write()
            .unwrap_or_else(PoisonError::into_inner) = fields;
    }

    /// Clear the back-reference to the owning list
    pub(crate) fn detach(&self) {
        *self.inner.list.lock().unwrap_or_else(PoisonError::into_inner) = Weak::new();
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, ItemFields> {
        self.inner
            .fields
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn list_ref(&self) -> Weak<ListInner> {
        self.inner
            .list
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl fmt::Debug for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Item")
            .field("url", &self.inner.url)
            .field("attached", &self.is_attached())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Field, SyncStatus};
    use crate::query::QueryOptions;
    use crate::storage::MemoryStore;

    fn list() -> ReadingList {
        ReadingList::new(MemoryStore::new())
    }

    #[tokio::test]
    async fn test_id_is_memoized_hash_of_url() {
        let list = list();
        let item = list
            .add_item(ItemFields::new("https://example.com"))
            .await
            .unwrap();

        assert_eq!(item.id(), derive_item_id("https://example.com"));
        assert!(std::ptr::eq(item.id(), item.id()));
    }

    #[tokio::test]
    async fn test_apply_batches_fields_and_persists() {
        let list = list();
        let item = list
            .add_item(ItemFields::new("https://example.com"))
            .await
            .unwrap();

        item.apply(ItemPatch::new().title("Example").favorite(true))
            .await
            .unwrap();

        assert_eq!(item.title().as_deref(), Some("Example"));
        assert!(item.favorite());

        let specs = vec![QueryOptions::new()
            .eq(Field::Title, "Example")
            .eq(Field::Favorite, true)];
        assert_eq!(list.count(&specs).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_commit_persists_current_state() {
        let list = list();
        let item = list
            .add_item(ItemFields::new("https://example.com"))
            .await
            .unwrap();

        item.replace_fields(ItemFields {
            status: SyncStatus::ChangedStatus,
            ..item.fields()
        });
        item.commit().await.unwrap();

        let specs = vec![QueryOptions::new().eq(Field::Status, SyncStatus::ChangedStatus)];
        assert_eq!(list.count(&specs).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_mark_read() {
        let list = list();
        let item = list
            .add_item(ItemFields::new("https://example.com"))
            .await
            .unwrap();

        item.mark_read(Some("laptop".to_string())).await.unwrap();

        let fields = item.fields();
        assert!(!fields.unread);
        assert!(fields.marked_read_on.is_some());
        assert_eq!(fields.marked_read_by.as_deref(), Some("laptop"));
    }

    #[tokio::test]
    async fn test_detached_item_cannot_commit() {
        let list = list();
        let item = list
            .add_item(ItemFields::new("https://example.com"))
            .await
            .unwrap();
        assert!(item.is_attached());

        list.delete_item(&item).await.unwrap();

        assert!(item.list().is_none());
        assert!(!item.is_attached());
        assert!(matches!(item.commit().await, Err(Error::NotAMember)));
        assert!(matches!(
            item.apply(ItemPatch::new().title("x")).await,
            Err(Error::NotAMember)
        ));
    }

    #[tokio::test]
    async fn test_domain() {
        let list = list();
        let item = list
            .add_item(ItemFields::new("https://www.example.com/a/b"))
            .await
            .unwrap();
        assert_eq!(item.domain(), Some("www.example.com"));
    }
}
