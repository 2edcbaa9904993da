//! End-to-end tests: the todo reducer running in a `Store` against the
//! in-memory row store and owner.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use localfirst_core::environment::Clock;
use localfirst_core::owner::{Mnemonic, OwnerError};
use localfirst_core::row::{Row, RowId, RowStoreError, SOFT_DELETE_FIELD};
use localfirst_runtime::{Store, wait_for_action};
use localfirst_testing::{
    InMemoryOwner, InMemoryRowStore, RecordedWrite, RecordingLocation, init_test_tracing,
    test_clock,
};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use todomvc::types::TODO_TABLE;
use todomvc::{TodoAction, TodoEnvironment, TodoId, TodoReducer, TodoState, VisibilityMode};

type TodoStore = Store<TodoState, TodoAction, TodoEnvironment, TodoReducer>;

const TIMEOUT: Duration = Duration::from_secs(2);
const PHRASE: &str = "one two three four five six seven eight nine ten eleven twelve";

struct App {
    store: TodoStore,
    rows: InMemoryRowStore,
    owner: InMemoryOwner,
    location: RecordingLocation,
    actions: broadcast::Receiver<TodoAction>,
}

impl App {
    async fn start_at(fragment: &str) -> Self {
        Self::start_with(fragment, |owner| owner).await
    }

    async fn start_with(fragment: &str, owner: impl FnOnce(InMemoryOwner) -> InMemoryOwner) -> Self {
        init_test_tracing();

        let rows = InMemoryRowStore::new(test_clock());
        let owner = owner(InMemoryOwner::with_mnemonic(PHRASE.parse().unwrap()).wiping(rows.clone()));
        let location = RecordingLocation::at(fragment);
        let env = TodoEnvironment::new(
            Arc::new(rows.clone()),
            Arc::new(owner.clone()),
            Arc::new(location.clone()),
            Arc::new(test_clock()),
        );
        let store = Store::new(TodoState::new(), TodoReducer::new(), env);
        let mut actions = store.subscribe_actions();

        store.send(TodoAction::Start).await.unwrap();
        wait_for_action(&mut actions, is_delivery, TIMEOUT).await.unwrap();

        Self {
            store,
            rows,
            owner,
            location,
            actions,
        }
    }

    async fn start() -> Self {
        Self::start_at("").await
    }

    /// Send and wait for the effects of this action to finish
    async fn send(&self, action: TodoAction) {
        let mut handle = self.store.send(action).await.unwrap();
        handle.wait_with_timeout(TIMEOUT).await.unwrap();
    }

    /// Send and wait for the next subscription delivery
    async fn send_synced(&mut self, action: TodoAction) {
        self.send(action).await;
        self.next(is_delivery).await;
    }

    async fn next(&mut self, predicate: impl Fn(&TodoAction) -> bool) -> TodoAction {
        wait_for_action(&mut self.actions, predicate, TIMEOUT)
            .await
            .unwrap()
    }

    async fn titles(&self) -> Vec<String> {
        self.store
            .state(|s| {
                s.projection
                    .iter()
                    .map(|todo| todo.title.to_string())
                    .collect()
            })
            .await
    }

    async fn ids(&self) -> Vec<TodoId> {
        self.store
            .state(|s| s.projection.iter().map(|todo| todo.id.clone()).collect())
            .await
    }
}

fn is_delivery(action: &TodoAction) -> bool {
    matches!(action, TodoAction::RowsDelivered { .. })
}

fn stored_row(id: &str, value: Value) -> Row {
    let Value::Object(fields) = value else {
        unreachable!("rows are objects")
    };
    Row::new(RowId::new(id), test_clock().now(), fields)
}

#[tokio::test]
async fn added_todo_is_not_duplicated_by_its_delivery() {
    let mut app = App::start().await;

    app.send_synced(TodoAction::Add {
        title: "Buy milk".to_string(),
    })
    .await;

    assert_eq!(app.titles().await, vec!["Buy milk"]);
    assert_eq!(app.rows.len(TODO_TABLE), 1);
}

#[tokio::test]
async fn toggle_then_remove_leaves_soft_deleted_row() {
    let mut app = App::start().await;
    app.send_synced(TodoAction::Add {
        title: "Buy milk".to_string(),
    })
    .await;
    let id = app.ids().await.remove(0);

    app.send_synced(TodoAction::Toggle { id: id.clone() }).await;
    assert!(app.store.state(|s| s.all_completed()).await);

    app.send_synced(TodoAction::Remove { id: id.clone() }).await;
    assert!(app.titles().await.is_empty());

    let stored = app.rows.rows(TODO_TABLE);
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].field(SOFT_DELETE_FIELD), Some(&Value::Bool(true)));
    assert_eq!(stored[0].field("completed"), Some(&Value::Bool(true)));
}

#[tokio::test]
async fn rows_written_elsewhere_are_appended_in_creation_order() {
    let mut app = App::start().await;
    app.send_synced(TodoAction::Add {
        title: "Local".to_string(),
    })
    .await;

    app.rows.seed(
        TODO_TABLE,
        stored_row("remote-1", json!({"title": "Remote", "completed": true, "isDeleted": false})),
    );
    app.next(is_delivery).await;

    assert_eq!(app.titles().await, vec!["Local", "Remote"]);
    assert_eq!(app.store.state(TodoState::remaining_count).await, 1);
}

#[tokio::test]
async fn malformed_rows_are_skipped() {
    let mut app = App::start().await;

    app.rows.seed(
        TODO_TABLE,
        stored_row("bad", json!({"title": "   ", "completed": false})),
    );
    app.rows.seed(
        TODO_TABLE,
        stored_row("good", json!({"title": "Fine", "completed": false})),
    );
    app.next(|action| {
        matches!(action, TodoAction::RowsDelivered { rows, .. } if rows.len() == 2)
    })
    .await;

    assert_eq!(app.titles().await, vec!["Fine"]);
}

#[tokio::test]
async fn failed_write_keeps_optimistic_state_and_records_error() {
    let mut app = App::start().await;
    app.rows
        .fail_writes_with(Some(RowStoreError::Unavailable("offline".to_string())));

    app.send(TodoAction::Add {
        title: "Buy milk".to_string(),
    })
    .await;
    let failure = app
        .next(|action| matches!(action, TodoAction::WriteFailed { .. }))
        .await;

    assert!(matches!(failure, TodoAction::WriteFailed { error, .. } if error.contains("offline")));
    assert_eq!(app.titles().await, vec!["Buy milk"]);
    assert!(
        app.store
            .state(|s| s.last_write_error.clone())
            .await
            .is_some()
    );
    assert_eq!(app.rows.len(TODO_TABLE), 0);
}

#[tokio::test]
async fn failed_remove_shows_the_row_again_on_next_delivery() {
    let mut app = App::start().await;
    app.rows.seed(
        TODO_TABLE,
        stored_row("remote-1", json!({"title": "Remote", "completed": false})),
    );
    app.next(is_delivery).await;
    let id = app.ids().await.remove(0);

    app.rows
        .fail_writes_with(Some(RowStoreError::Unavailable("offline".to_string())));
    app.send(TodoAction::Remove { id }).await;
    app.next(|action| matches!(action, TodoAction::WriteFailed { .. }))
        .await;
    assert!(app.titles().await.is_empty());

    app.rows.fail_writes_with(None);
    app.rows.seed(
        TODO_TABLE,
        stored_row("remote-2", json!({"title": "Other", "completed": false})),
    );
    app.next(|action| {
        matches!(action, TodoAction::RowsDelivered { rows, .. } if rows.len() == 2)
    })
    .await;

    let titles = app.titles().await;
    assert_eq!(titles.len(), 2);
    assert!(titles.contains(&"Remote".to_string()));
}

#[tokio::test]
async fn clear_completed_writes_only_completed_rows() {
    let mut app = App::start().await;
    for title in ["A", "B", "C"] {
        app.send_synced(TodoAction::Add {
            title: title.to_string(),
        })
        .await;
    }
    let ids = app.ids().await;
    app.send_synced(TodoAction::Toggle { id: ids[1].clone() }).await;
    app.rows.clear_writes();

    app.send_synced(TodoAction::ClearCompleted).await;

    assert_eq!(app.titles().await, vec!["A", "C"]);
    let writes = app.rows.writes();
    assert_eq!(writes.len(), 1);
    assert!(matches!(&writes[0], RecordedWrite::Update { patch, .. } if &patch.id == ids[1].as_row_id()));
}

#[tokio::test]
async fn unknown_route_is_rewritten_on_start() {
    let app = App::start_at("#/bogus").await;
    app.store.shutdown(Duration::from_millis(50)).await.ok();

    assert_eq!(app.store.state(TodoState::visibility).await, VisibilityMode::All);
    assert_eq!(app.location.replacements(), vec![String::new()]);
}

#[tokio::test]
async fn navigation_filters_visible_items() {
    let mut app = App::start_at("#/active").await;
    app.send_synced(TodoAction::Add {
        title: "A".to_string(),
    })
    .await;
    app.send_synced(TodoAction::Add {
        title: "B".to_string(),
    })
    .await;
    let ids = app.ids().await;
    app.send_synced(TodoAction::Toggle { id: ids[0].clone() }).await;

    let visible = |s: &TodoState| -> Vec<String> {
        s.visible().iter().map(|todo| todo.title.to_string()).collect()
    };
    assert_eq!(app.store.state(visible).await, vec!["B"]);

    app.send(TodoAction::Navigate {
        fragment: "#/completed".to_string(),
    })
    .await;
    assert_eq!(app.store.state(visible).await, vec!["A"]);
    assert!(app.location.replacements().is_empty());
}

#[tokio::test]
async fn restore_owner_replaces_local_projection() {
    let mut app = App::start_with("", |owner| owner.switching_to(TODO_TABLE, Vec::new())).await;
    app.send_synced(TodoAction::Add {
        title: "Old owner's todo".to_string(),
    })
    .await;

    app.send(TodoAction::RestoreOwner {
        phrase: "  TWELVE eleven ten nine eight seven six five four three two one ".to_string(),
    })
    .await;
    // Only `OwnerRestored` opens the generation 1 subscription.
    app.next(|action| matches!(action, TodoAction::RowsDelivered { generation: 1, .. }))
        .await;

    let expected: Mnemonic = "twelve eleven ten nine eight seven six five four three two one"
        .parse()
        .unwrap();
    assert_eq!(app.owner.restored(), vec![expected]);
    assert!(app.titles().await.is_empty());
}

#[tokio::test]
async fn restore_shows_only_the_new_owners_rows() {
    let new_rows = vec![stored_row(
        "new-1",
        json!({"title": "New owner's todo", "completed": false, "isDeleted": false}),
    )];
    let mut app = App::start_with("", |owner| owner.switching_to(TODO_TABLE, new_rows)).await;
    app.send_synced(TodoAction::Add {
        title: "Old owner's todo".to_string(),
    })
    .await;

    app.send(TodoAction::RestoreOwner {
        phrase: PHRASE.to_string(),
    })
    .await;
    // Only `OwnerRestored` opens the generation 1 subscription.
    app.next(|action| matches!(action, TodoAction::RowsDelivered { generation: 1, .. }))
        .await;

    assert_eq!(app.titles().await, vec!["New owner's todo"]);
    assert!(!app.store.state(|s| s.owner.is_busy()).await);
}

#[tokio::test]
async fn rejected_restore_surfaces_the_error() {
    let mut app = App::start().await;
    app.owner
        .fail_with(Some(OwnerError::Rejected("unknown owner".to_string())));

    app.send(TodoAction::RestoreOwner {
        phrase: PHRASE.to_string(),
    })
    .await;
    app.next(|action| matches!(action, TodoAction::OwnerRestoreFailed { .. }))
        .await;

    let error = app.store.state(|s| s.owner.restore_error.clone()).await;
    assert!(error.unwrap().contains("unknown owner"));
}

#[tokio::test]
async fn confirmed_reset_wipes_rows_and_projection() {
    let mut app = App::start().await;
    app.send_synced(TodoAction::Add {
        title: "A".to_string(),
    })
    .await;

    app.send(TodoAction::ConfirmReset).await;
    assert_eq!(app.owner.reset_count(), 0);

    app.send(TodoAction::RequestReset).await;
    app.send(TodoAction::ConfirmReset).await;
    app.next(|action| matches!(action, TodoAction::LocalDataReset))
        .await;

    assert_eq!(app.owner.reset_count(), 1);
    assert_eq!(app.rows.len(TODO_TABLE), 0);
    assert!(app.titles().await.is_empty());
}
