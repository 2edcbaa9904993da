//! Local projection cache.
//!
//! An ordered, in-memory mirror of the rows matching the todo query. Two
//! writers feed it, both running inside the reducer:
//! - optimistic mutations right after a user command
//! - snapshots pushed by the query subscription
//!
//! Order is creation order as first observed: new ids are appended and never
//! re-sorted, known ids are replaced in place.
//!
//! Locally removed ids are tombstoned until the store has confirmed the delete
//! and a later delivery no longer contains them. A failed delete drops its
//! tombstone, so the next delivery brings the row back.

use crate::types::{TodoId, TodoItem};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Ordered list of live todos, unique by id
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectionCache {
    items: Vec<TodoItem>,
    /// Ids removed locally, mapped to whether the store confirmed the delete.
    /// A stale snapshot must not bring them back.
    tombstones: HashMap<TodoId, bool>,
}

impl ProjectionCache {
    /// Empty cache
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a (possibly partial, possibly repeated) snapshot
    ///
    /// Known ids are replaced in place, new ids appended. Soft-deleted rows
    /// remove their entry. Confirmed tombstones missing from the batch are
    /// pruned. Idempotent.
    pub fn reconcile(&mut self, rows: impl IntoIterator<Item = TodoItem>) {
        let mut delivered = HashSet::new();
        for item in rows {
            delivered.insert(item.id.clone());
            if self.tombstones.contains_key(&item.id) {
                tracing::trace!(id = %item.id, "Ignoring delivery for locally removed todo");
                continue;
            }
            self.upsert_local(item);
        }
        self.tombstones
            .retain(|id, confirmed| !*confirmed || delivered.contains(id));
    }

    /// Optimistic replace-or-append
    pub fn upsert_local(&mut self, item: TodoItem) {
        if item.is_soft_deleted() {
            self.remove_local(&item.id);
            return;
        }
        match self.position(&item.id) {
            Some(index) => self.items[index] = item,
            None => self.items.push(item),
        }
    }

    /// Remove by id; absent ids are ignored
    ///
    /// Returns the removed item.
    pub fn remove_local(&mut self, id: &TodoId) -> Option<TodoItem> {
        let index = self.position(id)?;
        self.tombstones.insert(id.clone(), false);
        Some(self.items.remove(index))
    }

    /// The store has applied the delete of `id`
    pub fn confirm_removal(&mut self, id: &TodoId) {
        if let Some(confirmed) = self.tombstones.get_mut(id) {
            *confirmed = true;
        }
    }

    /// The delete of `id` failed: let deliveries show the row again
    ///
    /// Returns whether `id` was tombstoned.
    pub fn forget_tombstone(&mut self, id: &TodoId) -> bool {
        self.tombstones.remove(id).is_some()
    }

    /// Number of ids currently shielded from deliveries
    #[must_use]
    pub fn tombstone_count(&self) -> usize {
        self.tombstones.len()
    }

    /// Forget every item and tombstone (new owner, wiped store)
    pub fn clear(&mut self) {
        self.items.clear();
        self.tombstones.clear();
    }

    /// Items in display order
    #[must_use]
    pub fn items(&self) -> &[TodoItem] {
        &self.items
    }

    /// Iterate in display order
    pub fn iter(&self) -> std::slice::Iter<'_, TodoItem> {
        self.items.iter()
    }

    /// Item with `id`
    #[must_use]
    pub fn get(&self, id: &TodoId) -> Option<&TodoItem> {
        self.items.iter().find(|item| &item.id == id)
    }

    /// Whether `id` is cached
    #[must_use]
    pub fn contains(&self, id: &TodoId) -> bool {
        self.position(id).is_some()
    }

    /// Number of items
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the cache is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn position(&self, id: &TodoId) -> Option<usize> {
        self.items.iter().position(|item| &item.id == id)
    }
}

impl<'a> IntoIterator for &'a ProjectionCache {
    type Item = &'a TodoItem;
    type IntoIter = std::slice::Iter<'a, TodoItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
