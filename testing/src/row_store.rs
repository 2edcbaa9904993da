//! In-memory row store for fast, deterministic testing.
//!
//! [`InMemoryRowStore`] behaves like a single-device sync engine:
//! - ids are sequential (`row-1`, `row-2`, ...) and allocated synchronously
//! - every write is recorded when it is issued, before it is durable
//! - subscriptions get an immediate snapshot and a fresh one after each change

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Panics only on a poisoned mutex

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use localfirst_core::environment::Clock;
use localfirst_core::row::{
    Fields, PendingCreate, Query, Row, RowId, RowPatch, RowStore, RowStoreError,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

/// A write as issued by the code under test.
#[derive(Clone, Debug, PartialEq)]
pub enum RecordedWrite {
    /// `create_row` call
    Create {
        /// Table name
        table: String,
        /// Allocated id
        id: RowId,
        /// Initial columns
        fields: Fields,
    },
    /// `update_row` call
    Update {
        /// Table name
        table: String,
        /// Changed columns
        patch: RowPatch,
    },
}

impl RecordedWrite {
    /// Row the write targets
    #[must_use]
    pub const fn id(&self) -> &RowId {
        match self {
            Self::Create { id, .. } => id,
            Self::Update { patch, .. } => &patch.id,
        }
    }
}

#[derive(Default)]
struct Inner {
    tables: HashMap<String, Vec<Row>>,
    next_id: u64,
    writes: Vec<RecordedWrite>,
    failure: Option<RowStoreError>,
}

/// In-memory [`RowStore`].
///
/// # Example
///
/// ```
/// use localfirst_core::row::{Fields, RowStore};
/// use localfirst_testing::{InMemoryRowStore, test_clock};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = InMemoryRowStore::new(test_clock());
/// let pending = store.create_row("todo", Fields::new());
/// assert_eq!(pending.id.as_str(), "row-1");
///
/// pending.durable.await?;
/// assert_eq!(store.len("todo"), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct InMemoryRowStore {
    inner: Arc<Mutex<Inner>>,
    clock: Arc<dyn Clock>,
    changes: Arc<watch::Sender<u64>>,
}

impl InMemoryRowStore {
    /// Create an empty store stamping rows with `clock`
    #[must_use]
    pub fn new(clock: impl Clock + 'static) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            clock: Arc::new(clock),
            changes: Arc::new(changes),
        }
    }

    /// Make every subsequent write fail with `error` (`None` to recover)
    pub fn fail_writes_with(&self, error: Option<RowStoreError>) {
        self.inner.lock().unwrap().failure = error;
    }

    /// Writes issued so far, in call order
    #[must_use]
    pub fn writes(&self) -> Vec<RecordedWrite> {
        self.inner.lock().unwrap().writes.clone()
    }

    /// Forget recorded writes (rows are kept)
    pub fn clear_writes(&self) {
        self.inner.lock().unwrap().writes.clear();
    }

    /// Every stored row of `table`, soft-deleted ones included
    #[must_use]
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.inner
            .lock()
            .unwrap()
            .tables
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of stored rows in `table`
    #[must_use]
    pub fn len(&self, table: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .tables
            .get(table)
            .map_or(0, Vec::len)
    }

    /// Insert a row directly, as if it had been synced from another device
    pub fn seed(&self, table: &str, row: Row) {
        self.inner
            .lock()
            .unwrap()
            .tables
            .entry(table.to_string())
            .or_default()
            .push(row);
        self.notify();
    }

    /// Drop every row in every table and notify subscribers
    pub fn wipe(&self) {
        self.inner.lock().unwrap().tables.clear();
        self.notify();
    }

    /// Number of open subscriptions
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.changes.receiver_count()
    }

    fn notify(&self) {
        self.changes.send_modify(|version| *version += 1);
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

impl RowStore for InMemoryRowStore {
    fn create_row(&self, table: &str, fields: Fields) -> PendingCreate {
        let id = {
            let mut inner = self.inner.lock().unwrap();
            inner.next_id += 1;
            let id = RowId::new(format!("row-{}", inner.next_id));
            inner.writes.push(RecordedWrite::Create {
                table: table.to_string(),
                id: id.clone(),
                fields: fields.clone(),
            });
            id
        };

        let row = Row::new(id.clone(), self.now(), fields);
        let table = table.to_string();
        let store = self.clone();

        PendingCreate {
            id,
            durable: Box::pin(async move {
                {
                    let mut inner = store.inner.lock().unwrap();
                    if let Some(error) = inner.failure.clone() {
                        return Err(error);
                    }
                    inner.tables.entry(table).or_default().push(row);
                }
                store.notify();
                Ok(())
            }),
        }
    }

    fn update_row(
        &self,
        table: &str,
        patch: RowPatch,
    ) -> BoxFuture<'static, Result<(), RowStoreError>> {
        self.inner.lock().unwrap().writes.push(RecordedWrite::Update {
            table: table.to_string(),
            patch: patch.clone(),
        });

        let table = table.to_string();
        let store = self.clone();

        Box::pin(async move {
            {
                let mut inner = store.inner.lock().unwrap();
                if let Some(error) = inner.failure.clone() {
                    return Err(error);
                }
                let row = inner
                    .tables
                    .get_mut(&table)
                    .and_then(|rows| rows.iter_mut().find(|row| row.id == patch.id));
                match row {
                    Some(row) => row.apply(&patch),
                    None => {
                        return Err(RowStoreError::NotFound {
                            table,
                            id: patch.id,
                        });
                    },
                }
            }
            store.notify();
            Ok(())
        })
    }

    fn subscribe(&self, query: &Query) -> BoxStream<'static, Vec<Row>> {
        let inner = Arc::clone(&self.inner);
        let query = query.clone();
        let mut changes = self.changes.subscribe();

        Box::pin(async_stream::stream! {
            loop {
                let snapshot = {
                    let inner = inner.lock().unwrap();
                    inner
                        .tables
                        .get(query.table_name())
                        .map_or_else(Vec::new, |rows| query.select(rows))
                };
                yield snapshot;

                if changes.changed().await.is_err() {
                    break;
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_clock;
    use futures::StreamExt;
    use serde_json::json;

    fn fields(value: serde_json::Value) -> Fields {
        match value {
            serde_json::Value::Object(map) => map,
            _ => Fields::new(),
        }
    }

    #[tokio::test]
    async fn create_allocates_id_before_durability() {
        let store = InMemoryRowStore::new(test_clock());
        let pending = store.create_row("todo", fields(json!({"title": "A"})));

        assert_eq!(pending.id, RowId::new("row-1"));
        assert_eq!(store.writes().len(), 1);
        assert_eq!(store.len("todo"), 0);

        pending.durable.await.unwrap();
        assert_eq!(store.len("todo"), 1);
    }

    #[tokio::test]
    async fn update_of_missing_row_fails() {
        let store = InMemoryRowStore::new(test_clock());
        let result = store
            .update_row("todo", RowPatch::new(RowId::new("nope")).set("completed", true))
            .await;

        assert!(matches!(result, Err(RowStoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn failing_writes_are_recorded_but_not_stored() {
        let store = InMemoryRowStore::new(test_clock());
        store.fail_writes_with(Some(RowStoreError::Unavailable("offline".into())));

        let pending = store.create_row("todo", Fields::new());
        assert!(pending.durable.await.is_err());
        assert_eq!(store.writes().len(), 1);
        assert_eq!(store.len("todo"), 0);
    }

    #[tokio::test]
    async fn subscription_pushes_snapshot_after_each_change() {
        let store = InMemoryRowStore::new(test_clock());
        let query = Query::table("todo").require("title").exclude_deleted();
        let mut snapshots = store.subscribe(&query);

        assert_eq!(snapshots.next().await.unwrap().len(), 0);

        let pending = store.create_row("todo", fields(json!({"title": "A"})));
        let id = pending.id.clone();
        pending.durable.await.unwrap();
        assert_eq!(snapshots.next().await.unwrap().len(), 1);

        store
            .update_row("todo", RowPatch::soft_delete(id))
            .await
            .unwrap();
        assert_eq!(snapshots.next().await.unwrap().len(), 0);
        assert_eq!(store.len("todo"), 1);
    }
}
