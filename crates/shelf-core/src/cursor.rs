//! Resumable views over query results
//!
//! A [`Cursor`] remembers its match specification and how far it has been
//! consumed. The offset lives in the cursor rather than in the store, so
//! several cursors over one list progress independently.
//!
//! Any mutation on the owning list invalidates every outstanding cursor,
//! whether or not the mutation touched the cursor's results. An invalid
//! cursor fails every further read with [`Error::InvalidCursor`].

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::item::Item;
use crate::list::ReadingList;
use crate::query::QueryOptions;

/// Cursor over the items of a [`ReadingList`] matching a specification
pub struct Cursor {
    list: ReadingList,
    specs: Vec<QueryOptions>,
    offset: usize,
    /// Shared with the list, which holds it weakly
    valid: Arc<AtomicBool>,
}

impl Cursor {
    pub(crate) fn new(list: ReadingList, specs: Vec<QueryOptions>, valid: Arc<AtomicBool>) -> Self {
        Self {
            list,
            specs,
            offset: 0,
            valid,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::SeqCst)
    }

    /// Number of items consumed so far
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn list(&self) -> &ReadingList {
        &self.list
    }

    /// Mark the cursor invalid
    pub fn invalidate(&self) {
        self.valid.store(false, Ordering::SeqCst);
    }

    /// Fetch up to `count` further items, or all remaining when `None`
    pub async fn items(&mut self, count: Option<usize>) -> Result<Vec<Item>> {
        self.ensure_valid()?;
        let Some(specs) = self.paged_specs(count) else {
            return Ok(Vec::new());
        };

        let items = self.list.items(&specs).await?;
        self.offset += items.len();
        Ok(items)
    }

    /// Stream up to `count` further items through `callback`
    ///
    /// Delivery is serialized like [`ReadingList::for_each_item`]. The
    /// offset advances by the number of items handed to the callback, even
    /// when one of them fails.
    pub async fn for_each<F, Fut>(&mut self, count: Option<usize>, mut callback: F) -> Result<()>
    where
        F: FnMut(Item) -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        self.ensure_valid()?;
        let Some(specs) = self.paged_specs(count) else {
            return Ok(());
        };

        let mut delivered = 0;
        let result = self
            .list
            .for_each_item(&specs, |item| {
                delivered += 1;
                callback(item)
            })
            .await;
        self.offset += delivered;
        result
    }

    fn ensure_valid(&self) -> Result<()> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(Error::InvalidCursor)
        }
    }

    /// Bound specification with the cursor's window merged into the last
    /// options object, or `None` when the window is empty
    fn paged_specs(&self, count: Option<usize>) -> Option<Vec<QueryOptions>> {
        let mut specs = self.specs.clone();
        if specs.is_empty() {
            specs.push(QueryOptions::new());
        }
        let last = specs.last_mut()?;

        let remaining = last.limit.map(|limit| limit.saturating_sub(self.offset));
        let limit = match (count, remaining) {
            (Some(count), Some(remaining)) => Some(count.min(remaining)),
            (Some(count), None) => Some(count),
            (None, remaining) => remaining,
        };
        if limit == Some(0) {
            return None;
        }

        last.offset = Some(last.offset.unwrap_or(0) + self.offset);
        last.limit = limit;
        Some(specs)
    }
}

impl std::fmt::Debug for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("specs", &self.specs)
            .field("offset", &self.offset)
            .field("valid", &self.is_valid())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Field, ItemFields};
    use crate::storage::{MemoryStore, SqliteStore};

    async fn list_of(n: usize) -> ReadingList {
        let list = ReadingList::new(MemoryStore::new());
        for i in 0..n {
            list.add_item(ItemFields::new(format!("https://site/{}", i)))
                .await
                .unwrap();
        }
        list
    }

    fn urls(items: &[Item]) -> Vec<String> {
        items.iter().map(|i| i.url().to_string()).collect()
    }

    #[tokio::test]
    async fn test_pages_advance_offset() {
        let list = list_of(5).await;
        let mut cursor = list.iterator(&[]).unwrap();

        let first = cursor.items(Some(2)).await.unwrap();
        assert_eq!(urls(&first), vec!["https://site/0", "https://site/1"]);
        assert_eq!(cursor.offset(), 2);

        let rest = cursor.items(None).await.unwrap();
        assert_eq!(rest.len(), 3);
        assert_eq!(cursor.offset(), 5);

        assert!(cursor.items(Some(10)).await.unwrap().is_empty());
        assert_eq!(cursor.offset(), 5);
    }

    #[tokio::test]
    async fn test_bound_limit_and_offset_are_respected() {
        let list = list_of(10).await;
        let specs = vec![QueryOptions::new().sort_by(Field::Url).offset(2).limit(5)];
        let mut cursor = list.iterator(&specs).unwrap();

        let first = cursor.items(Some(3)).await.unwrap();
        assert_eq!(
            urls(&first),
            vec!["https://site/2", "https://site/3", "https://site/4"]
        );

        // Only two remain inside the bound limit of five
        let second = cursor.items(Some(3)).await.unwrap();
        assert_eq!(urls(&second), vec!["https://site/5", "https://site/6"]);

        assert!(cursor.items(None).await.unwrap().is_empty());
        assert_eq!(cursor.offset(), 5);
    }

    #[tokio::test]
    async fn test_independent_cursors() {
        let list = list_of(4).await;
        let mut a = list.iterator(&[]).unwrap();
        let mut b = list.iterator(&[]).unwrap();

        a.items(Some(3)).await.unwrap();
        let from_b = b.items(Some(1)).await.unwrap();

        assert_eq!(urls(&from_b), vec!["https://site/0"]);
        assert_eq!(a.offset(), 3);
        assert_eq!(b.offset(), 1);
    }

    #[tokio::test]
    async fn test_for_each_advances_by_delivered() {
        let list = list_of(4).await;
        let mut cursor = list.iterator(&[]).unwrap();

        let mut seen = Vec::new();
        cursor
            .for_each(Some(3), |item| {
                seen.push(item.url().to_string());
                futures_util::future::ready(Ok(()))
            })
            .await
            .unwrap();
        assert_eq!(seen.len(), 3);
        assert_eq!(cursor.offset(), 3);
    }

    #[tokio::test]
    async fn test_for_each_failure_still_advances() {
        let list = list_of(4).await;
        let mut cursor = list.iterator(&[]).unwrap();

        let result = cursor
            .for_each(None, |item| {
                let fail = item.url() == "https://site/1";
                async move {
                    if fail {
                        anyhow::bail!("cannot handle {}", "https://site/1");
                    }
                    Ok(())
                }
            })
            .await;

        assert!(matches!(result, Err(Error::Callback(_))));
        assert_eq!(cursor.offset(), 2);

        let rest = cursor.items(None).await.unwrap();
        assert_eq!(urls(&rest), vec!["https://site/2", "https://site/3"]);
    }

    #[tokio::test]
    async fn test_invalidate_is_idempotent() {
        let list = list_of(1).await;
        let mut cursor = list.iterator(&[]).unwrap();

        cursor.invalidate();
        cursor.invalidate();

        assert!(!cursor.is_valid());
        assert!(matches!(cursor.items(Some(1)).await, Err(Error::InvalidCursor)));
    }

    #[tokio::test]
    async fn test_dropped_cursor_is_released() {
        let list = list_of(1).await;
        let cursor = list.iterator(&[]).unwrap();
        let flag = Arc::downgrade(&cursor.valid);

        drop(cursor);
        assert_eq!(flag.strong_count(), 0);

        // Mutation with no live cursors still succeeds
        list.add_item(ItemFields::new("https://site/new")).await.unwrap();
    }

    #[tokio::test]
    async fn test_mutation_during_iteration_invalidates() {
        let list = list_of(3).await;
        let mut cursor = list.iterator(&[]).unwrap();

        let writer = list.clone();
        cursor
            .for_each(Some(1), move |item| {
                let writer = writer.clone();
                async move {
                    writer.update_item(&item).await?;
                    anyhow::Ok(())
                }
            })
            .await
            .unwrap();

        assert_eq!(cursor.offset(), 1);
        assert!(matches!(cursor.items(None).await, Err(Error::InvalidCursor)));
    }

    #[tokio::test]
    async fn test_paging_over_sqlite() {
        let list = ReadingList::new(SqliteStore::open_in_memory().unwrap());
        for i in 0..6 {
            list.add_item(ItemFields::new(format!("https://site/{}", i)))
                .await
                .unwrap();
        }

        let specs = vec![QueryOptions::new().sort_by(Field::Url).descending()];
        let mut cursor = list.iterator(&specs).unwrap();

        let first = cursor.items(Some(2)).await.unwrap();
        let second = cursor.items(Some(2)).await.unwrap();
        assert_eq!(urls(&first), vec!["https://site/5", "https://site/4"]);
        assert_eq!(urls(&second), vec!["https://site/3", "https://site/2"]);
    }
}
