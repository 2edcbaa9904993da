//! Scripted owner identity.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)]

use futures::future::BoxFuture;
use localfirst_core::owner::{Mnemonic, OwnerError, OwnerIdentity};
use localfirst_core::row::Row;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct Inner {
    mnemonic: Option<Mnemonic>,
    restored: Vec<Mnemonic>,
    resets: usize,
    failure: Option<OwnerError>,
}

/// In-memory [`OwnerIdentity`] that records restore and reset calls.
///
/// An optional [`crate::InMemoryRowStore`] can be attached so a reset wipes
/// its rows, the way a real engine would. With [`InMemoryOwner::switching_to`]
/// a successful restore also swaps the attached rows for the new owner's.
#[derive(Clone, Default)]
pub struct InMemoryOwner {
    inner: Arc<Mutex<Inner>>,
    rows: Option<crate::InMemoryRowStore>,
    switch: Option<Arc<(String, Vec<Row>)>>,
}

impl InMemoryOwner {
    /// Owner whose secret is `mnemonic`
    #[must_use]
    pub fn with_mnemonic(mnemonic: Mnemonic) -> Self {
        let owner = Self::default();
        owner.inner.lock().unwrap().mnemonic = Some(mnemonic);
        owner
    }

    /// Wipe `rows` whenever local data is reset
    #[must_use]
    pub fn wiping(mut self, rows: crate::InMemoryRowStore) -> Self {
        self.rows = Some(rows);
        self
    }

    /// On a successful restore, replace the attached rows with `rows` in `table`
    ///
    /// The old rows are wiped first and the task yields before the new ones
    /// are seeded, so subscribers see the intermediate empty snapshot.
    #[must_use]
    pub fn switching_to(mut self, table: impl Into<String>, rows: Vec<Row>) -> Self {
        self.switch = Some(Arc::new((table.into(), rows)));
        self
    }

    /// Make restore and reset fail with `error` (`None` to recover)
    pub fn fail_with(&self, error: Option<OwnerError>) {
        self.inner.lock().unwrap().failure = error;
    }

    /// Phrases passed to `restore_from_secret`, in order
    #[must_use]
    pub fn restored(&self) -> Vec<Mnemonic> {
        self.inner.lock().unwrap().restored.clone()
    }

    /// How many times local data was reset
    #[must_use]
    pub fn reset_count(&self) -> usize {
        self.inner.lock().unwrap().resets
    }
}

impl OwnerIdentity for InMemoryOwner {
    fn export_secret(&self) -> Option<Mnemonic> {
        self.inner.lock().unwrap().mnemonic.clone()
    }

    fn restore_from_secret(&self, mnemonic: Mnemonic) -> BoxFuture<'static, Result<(), OwnerError>> {
        let inner = Arc::clone(&self.inner);
        let rows = self.rows.clone();
        let switch = self.switch.clone();
        Box::pin(async move {
            {
                let mut inner = inner.lock().unwrap();
                inner.restored.push(mnemonic.clone());
                if let Some(error) = inner.failure.clone() {
                    return Err(error);
                }
                inner.mnemonic = Some(mnemonic);
            }
            if let (Some(rows), Some(switch)) = (rows, switch) {
                let (table, seeded) = &*switch;
                rows.wipe();
                tokio::task::yield_now().await;
                for row in seeded {
                    rows.seed(table, row.clone());
                }
            }
            Ok(())
        })
    }

    fn reset_all_local_data(&self) -> BoxFuture<'static, Result<(), OwnerError>> {
        let inner = Arc::clone(&self.inner);
        let rows = self.rows.clone();
        Box::pin(async move {
            {
                let mut inner = inner.lock().unwrap();
                if let Some(error) = inner.failure.clone() {
                    return Err(error);
                }
                inner.resets += 1;
                inner.mnemonic = None;
            }
            if let Some(rows) = rows {
                rows.wipe();
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use localfirst_core::environment::Clock;
    use localfirst_core::row::{Fields, RowId};

    const PHRASE: &str = "one two three four five six seven eight nine ten eleven twelve";

    #[tokio::test]
    async fn restore_replaces_exported_secret() {
        let owner = InMemoryOwner::default();
        assert!(owner.export_secret().is_none());

        let mnemonic: Mnemonic = PHRASE.parse().unwrap();
        owner.restore_from_secret(mnemonic.clone()).await.unwrap();

        assert_eq!(owner.export_secret(), Some(mnemonic.clone()));
        assert_eq!(owner.restored(), vec![mnemonic]);
    }

    #[tokio::test]
    async fn restore_swaps_in_the_new_owners_rows() {
        let rows = crate::InMemoryRowStore::new(crate::test_clock());
        rows.seed(
            "todos",
            Row::new(RowId::new("old"), crate::test_clock().now(), Fields::new()),
        );
        let owner = InMemoryOwner::default().wiping(rows.clone()).switching_to(
            "todos",
            vec![Row::new(RowId::new("new"), crate::test_clock().now(), Fields::new())],
        );

        owner
            .restore_from_secret(PHRASE.parse().unwrap())
            .await
            .unwrap();

        let ids: Vec<RowId> = rows.rows("todos").into_iter().map(|row| row.id).collect();
        assert_eq!(ids, vec![RowId::new("new")]);
    }

    #[tokio::test]
    async fn failing_restore_leaves_rows_alone() {
        let rows = crate::InMemoryRowStore::new(crate::test_clock());
        rows.seed(
            "todos",
            Row::new(RowId::new("old"), crate::test_clock().now(), Fields::new()),
        );
        let owner = InMemoryOwner::default()
            .wiping(rows.clone())
            .switching_to("todos", Vec::new());
        owner.fail_with(Some(OwnerError::Rejected("unknown owner".into())));

        assert!(owner.restore_from_secret(PHRASE.parse().unwrap()).await.is_err());
        assert_eq!(rows.len("todos"), 1);
    }

    #[tokio::test]
    async fn failing_reset_is_not_counted() {
        let owner = InMemoryOwner::with_mnemonic(PHRASE.parse().unwrap());
        owner.fail_with(Some(OwnerError::Storage("disk full".into())));

        assert!(owner.reset_all_local_data().await.is_err());
        assert_eq!(owner.reset_count(), 0);
        assert!(owner.export_secret().is_some());
    }
}
