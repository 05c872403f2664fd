//! In-memory store adapter
//!
//! Keeps records in insertion order and answers queries with the same
//! matcher the list manager uses. Handy for tests and for short-lived lists.

use std::sync::{Mutex, PoisonError};

use futures_util::future::BoxFuture;

use super::{EachRecord, StoreAdapter, StoreError, StoreResult};
use crate::models::ItemFields;
use crate::query::{self, QueryOptions};

/// Vec-backed store adapter
#[derive(Debug)]
pub struct MemoryStore {
    /// `None` once destroyed
    records: Mutex<Option<Vec<ItemFields>>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_items(Vec::new())
    }

    /// Create a store pre-populated with records
    pub fn with_items(items: Vec<ItemFields>) -> Self {
        Self {
            records: Mutex::new(Some(items)),
        }
    }

    /// Number of stored records (0 once destroyed)
    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn with_records<T>(
        &self,
        f: impl FnOnce(&mut Vec<ItemFields>) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let mut guard = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        let records = guard.as_mut().ok_or(StoreError::Closed)?;
        f(records)
    }

    /// Matching records, sorted and paged per the trailing options object
    fn select(records: &[ItemFields], specs: &[QueryOptions]) -> Vec<ItemFields> {
        let mut selected: Vec<ItemFields> = records
            .iter()
            .filter(|fields| query::matches(fields, specs))
            .cloned()
            .collect();

        let Some(control) = query::trailing(specs) else {
            return selected;
        };

        if let Some(field) = control.sort {
            selected.sort_by(|a, b| {
                let ordering = query::compare_for_sort(&a.get(field), &b.get(field));
                if control.descending {
                    ordering.reverse()
                } else {
                    ordering
                }
            });
        }

        selected
            .into_iter()
            .skip(control.offset.unwrap_or(0))
            .take(control.limit.unwrap_or(usize::MAX))
            .collect()
    }
}

impl StoreAdapter for MemoryStore {
    fn count<'a>(&'a self, specs: &'a [QueryOptions]) -> BoxFuture<'a, StoreResult<usize>> {
        Box::pin(async move {
            self.with_records(|records| {
                Ok(records
                    .iter()
                    .filter(|fields| query::matches(fields, specs))
                    .count())
            })
        })
    }

    fn for_each_item<'a>(
        &'a self,
        specs: &'a [QueryOptions],
        each: EachRecord<'a>,
    ) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            let selected = self.with_records(|records| Ok(Self::select(records, specs)))?;
            for fields in selected {
                each(fields);
            }
            Ok(())
        })
    }

    fn add_item<'a>(&'a self, fields: &'a ItemFields) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            self.with_records(|records| {
                let duplicate = records.iter().any(|existing| {
                    existing.url == fields.url
                        || (fields.guid.is_some() && existing.guid == fields.guid)
                });
                if duplicate {
                    return Err(StoreError::Duplicate {
                        key: fields.url.clone(),
                    });
                }
                records.push(fields.clone());
                Ok(())
            })
        })
    }

    fn update_item<'a>(&'a self, fields: &'a ItemFields) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            self.with_records(|records| {
                let existing = records
                    .iter_mut()
                    .find(|existing| existing.url == fields.url)
                    .ok_or_else(|| StoreError::NotFound {
                        key: fields.url.clone(),
                    })?;
                *existing = fields.clone();
                Ok(())
            })
        })
    }

    fn delete_item_by_key<'a>(&'a self, url: &'a str) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            self.with_records(|records| {
                let pos = records
                    .iter()
                    .position(|existing| existing.url == url)
                    .ok_or_else(|| StoreError::NotFound {
                        key: url.to_string(),
                    })?;
                records.remove(pos);
                Ok(())
            })
        })
    }

    fn destroy(&self) -> BoxFuture<'_, StoreResult<()>> {
        Box::pin(async move {
            self.records
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            Ok(())
        })
    }
}
