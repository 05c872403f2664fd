//! List observers
//!
//! Observers implement any subset of [`ListObserver`]'s handlers; the
//! defaults do nothing. Handlers run synchronously after a mutation has been
//! persisted. A handler that returns an error or panics is logged and
//! skipped, so it cannot fail the mutation or starve other observers.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tracing::warn;

use crate::item::Item;

/// Receives mutation events from a [`crate::ReadingList`]
pub trait ListObserver: Send + Sync {
    fn on_item_added(&self, _item: &Item) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_item_updated(&self, _item: &Item) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_item_deleted(&self, _item: &Item) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Kind of mutation being reported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListEvent {
    Added,
    Updated,
    Deleted,
}

impl ListEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            ListEvent::Added => "added",
            ListEvent::Updated => "updated",
            ListEvent::Deleted => "deleted",
        }
    }
}

/// Deliver `event` to every observer, isolating failures
pub(crate) fn dispatch(observers: &[Arc<dyn ListObserver>], event: ListEvent, item: &Item) {
    for observer in observers {
        let outcome = catch_unwind(AssertUnwindSafe(|| match event {
            ListEvent::Added => observer.on_item_added(item),
            ListEvent::Updated => observer.on_item_updated(item),
            ListEvent::Deleted => observer.on_item_deleted(item),
        }));

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(
                "Observer failed handling {} for {}: {:#}",
                event.as_str(),
                item.url(),
                e
            ),
            Err(_) => warn!(
                "Observer panicked handling {} for {}",
                event.as_str(),
                item.url()
            ),
        }
    }
}

/// Whether two observer handles point at the same observer
pub(crate) fn same_observer(a: &Arc<dyn ListObserver>, b: &Arc<dyn ListObserver>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}
