//! Scripted TodoMVC session against the in-memory row store.
//!
//! Walks through the whole app: adding, toggling, filtering, editing,
//! clearing, a failed write and finally the owner reset.

use localfirst_core::environment::SystemClock;
use localfirst_core::owner::Mnemonic;
use localfirst_core::row::RowStoreError;
use localfirst_runtime::{Store, wait_for_action};
use localfirst_testing::{InMemoryOwner, InMemoryRowStore, RecordingLocation};
use std::sync::Arc;
use std::time::Duration;
use todomvc::{TodoAction, TodoEnvironment, TodoReducer, TodoState};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

type TodoStore = Store<TodoState, TodoAction, TodoEnvironment, TodoReducer>;

const DELIVERY_TIMEOUT: Duration = Duration::from_secs(1);
const DEMO_PHRASE: &str =
    "abandon ability able about above absent absorb abstract absurd abuse access accident";

async fn print_list(store: &TodoStore, heading: &str) {
    let (visible, remaining, mode, offers_clear) = store
        .state(|s| {
            let visible: Vec<(bool, String)> = s
                .visible()
                .iter()
                .map(|todo| (todo.completed, todo.title.to_string()))
                .collect();
            (visible, s.remaining_count(), s.visibility(), s.offers_clear_completed())
        })
        .await;

    println!("\n{heading} [filter: {mode}]");
    for (completed, title) in visible {
        let status = if completed { "✓" } else { " " };
        println!("  [{status}] {title}");
    }
    let clear = if offers_clear { "  (clear completed)" } else { "" };
    println!("  {remaining} item(s) left{clear}");
}

/// Send a command and wait until the subscription has echoed it back
async fn send_and_sync(store: &TodoStore, action: TodoAction) -> anyhow::Result<()> {
    let mut deliveries = store.subscribe_actions();
    let mut handle = store.send(action).await?;
    handle.wait_with_timeout(DELIVERY_TIMEOUT).await?;
    let _ = wait_for_action(
        &mut deliveries,
        |action| matches!(action, TodoAction::RowsDelivered { .. }),
        DELIVERY_TIMEOUT,
    )
    .await;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "todomvc=debug,localfirst_runtime=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    println!("=== TodoMVC: local-first store ===");

    let rows = InMemoryRowStore::new(SystemClock);
    let phrase: Mnemonic = DEMO_PHRASE.parse()?;
    let owner = InMemoryOwner::with_mnemonic(phrase).wiping(rows.clone());
    let location = RecordingLocation::at("#/bogus");

    let env = TodoEnvironment::new(
        Arc::new(rows.clone()),
        Arc::new(owner.clone()),
        Arc::new(location.clone()),
        Arc::new(SystemClock),
    );
    let store = Store::new(TodoState::new(), TodoReducer::new(), env);

    let mut initial = store.subscribe_actions();
    store.send(TodoAction::Start).await?;
    wait_for_action(
        &mut initial,
        |action| matches!(action, TodoAction::RowsDelivered { .. }),
        DELIVERY_TIMEOUT,
    )
    .await?;
    println!("\nUnknown route rewritten to {:?}", location.replacements());

    for title in ["Buy milk", "Write documentation", "  Deploy to production  "] {
        println!("\n>>> Add {title:?}");
        send_and_sync(&store, TodoAction::Add { title: title.to_string() }).await?;
    }
    println!("\n>>> Add \"   \" (ignored)");
    store.send(TodoAction::Add { title: "   ".to_string() }).await?;
    print_list(&store, "After adding").await;

    let ids = store
        .state(|s| s.projection.iter().map(|todo| todo.id.clone()).collect::<Vec<_>>())
        .await;
    let [milk, docs, deploy] = ids.as_slice() else {
        anyhow::bail!("expected three todos, found {}", ids.len());
    };

    println!("\n>>> Toggle 'Buy milk'");
    send_and_sync(&store, TodoAction::Toggle { id: milk.clone() }).await?;

    println!("\n>>> Rename 'Write documentation'");
    store.send(TodoAction::Edit { id: docs.clone() }).await?;
    send_and_sync(&store, TodoAction::CommitEdit { title: "Write the README".to_string() })
        .await?;

    store.send(TodoAction::Navigate { fragment: "#/active".to_string() }).await?;
    print_list(&store, "Active").await;
    store.send(TodoAction::Navigate { fragment: "#/completed".to_string() }).await?;
    print_list(&store, "Completed").await;
    store.send(TodoAction::Navigate { fragment: "#/".to_string() }).await?;

    println!("\n>>> Clear completed");
    send_and_sync(&store, TodoAction::ClearCompleted).await?;
    print_list(&store, "After clearing").await;

    println!("\n>>> Toggle 'Deploy to production' while the store is offline");
    rows.fail_writes_with(Some(RowStoreError::Unavailable("offline".to_string())));
    let mut failures = store.subscribe_actions();
    store.send(TodoAction::Toggle { id: deploy.clone() }).await?;
    wait_for_action(
        &mut failures,
        |action| matches!(action, TodoAction::WriteFailed { .. }),
        DELIVERY_TIMEOUT,
    )
    .await?;
    rows.fail_writes_with(None);
    let error = store.state(|s| s.last_write_error.clone()).await;
    println!("Last write error: {}", error.unwrap_or_default());
    print_list(&store, "Optimistic state kept").await;

    store.send(TodoAction::ShowMnemonic).await?;
    let shown = store.state(|s| s.owner.mnemonic.clone()).await;
    if let Some(mnemonic) = shown {
        println!("\nRecovery phrase has {} words", mnemonic.word_count());
    }
    store.send(TodoAction::HideMnemonic).await?;

    println!("\n>>> Reset all local data");
    store.send(TodoAction::RequestReset).await?;
    store
        .send_and_wait_for(
            TodoAction::ConfirmReset,
            |action| matches!(action, TodoAction::LocalDataReset | TodoAction::ResetFailed { .. }),
            DELIVERY_TIMEOUT,
        )
        .await?;
    print_list(&store, "After reset").await;
    println!("Rows left in the store: {}", rows.len(todomvc::types::TODO_TABLE));

    if let Err(error) = store.shutdown(Duration::from_millis(100)).await {
        // The subscription stream stays open for the life of the store.
        tracing::debug!(%error, "Shutdown left the subscription running");
    }

    println!("\n=== Demo Complete ===");
    Ok(())
}
