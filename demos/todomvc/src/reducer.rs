//! Reducer logic for the TodoMVC app.
//!
//! Every command validates its input, updates the projection optimistically
//! and returns the adapter write as an effect. Nothing is awaited here and no
//! optimistic change is rolled back: a failed write comes back as
//! `WriteFailed`, and the next subscription snapshot is authoritative for the
//! rows it contains.

use crate::owner::OwnerOperation;
use crate::types::{
    COMPLETED_FIELD, TITLE_FIELD, TODO_TABLE, Title, TitleError, TodoAction, TodoId, TodoItem,
    TodoState, todo_query,
};
use futures::StreamExt;
use futures::future::BoxFuture;
use localfirst_core::environment::{Clock, Location};
use localfirst_core::owner::OwnerIdentity;
use localfirst_core::row::{Row, RowPatch, RowStore, RowStoreError};
use localfirst_core::{SmallVec, effect::Effect, reducer::Reducer, smallvec};
use std::sync::Arc;

type Effects = SmallVec<[Effect<TodoAction>; 4]>;

/// Environment dependencies for the TodoMVC reducer
#[derive(Clone)]
pub struct TodoEnvironment {
    /// Sync engine rows
    pub rows: Arc<dyn RowStore>,
    /// Owner identity of the sync engine
    pub owner: Arc<dyn OwnerIdentity>,
    /// Navigation boundary
    pub location: Arc<dyn Location>,
    /// Clock for optimistic timestamps
    pub clock: Arc<dyn Clock>,
}

impl TodoEnvironment {
    /// Creates a new `TodoEnvironment`
    #[must_use]
    pub fn new(
        rows: Arc<dyn RowStore>,
        owner: Arc<dyn OwnerIdentity>,
        location: Arc<dyn Location>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            rows,
            owner,
            location,
            clock,
        }
    }
}

/// Reducer for the TodoMVC app
#[derive(Clone, Debug, Default)]
pub struct TodoReducer;

impl TodoReducer {
    /// Creates a new `TodoReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Turn an adapter write into a fire-and-forget effect
    fn write_effect(
        id: TodoId,
        write: BoxFuture<'static, Result<(), RowStoreError>>,
    ) -> Effect<TodoAction> {
        Effect::future(async move {
            write.await.err().map(|error| TodoAction::WriteFailed {
                id,
                error: error.to_string(),
            })
        })
    }

    fn update(env: &TodoEnvironment, patch: RowPatch) -> Effect<TodoAction> {
        let id = TodoId::from(patch.id.clone());
        Self::write_effect(id, env.rows.update_row(TODO_TABLE, patch))
    }

    /// Soft-delete write; success is reported so the tombstone can be pruned
    fn soft_delete(env: &TodoEnvironment, id: TodoId) -> Effect<TodoAction> {
        let write = env
            .rows
            .update_row(TODO_TABLE, RowPatch::soft_delete(id.as_row_id().clone()));
        Effect::future(async move {
            Some(match write.await {
                Ok(()) => TodoAction::RemovalConfirmed { id },
                Err(error) => TodoAction::WriteFailed {
                    id,
                    error: error.to_string(),
                },
            })
        })
    }

    /// Open the todo query, tagging deliveries with the current generation
    fn subscribe(state: &TodoState, env: &TodoEnvironment) -> Effect<TodoAction> {
        let generation = state.generation;
        tracing::debug!(generation, "Opening query subscription");
        Effect::stream(
            env.rows
                .subscribe(&todo_query())
                .map(move |rows| TodoAction::RowsDelivered { generation, rows }),
        )
    }

    fn start(state: &mut TodoState, env: &TodoEnvironment) -> Effects {
        let mut effects = Self::navigate(state, &env.location.fragment(), env);

        if state.subscribed {
            tracing::debug!("Query subscription already open");
        } else {
            state.subscribed = true;
            effects.push(Self::subscribe(state, env));
        }

        effects
    }

    fn navigate(state: &mut TodoState, fragment: &str, env: &TodoEnvironment) -> Effects {
        let navigation = state.router.navigate(fragment);
        match navigation.rewrite {
            Some(canonical) => {
                let location = Arc::clone(&env.location);
                smallvec![Effect::future(async move {
                    location.replace_fragment(canonical);
                    None
                })]
            },
            None => SmallVec::new(),
        }
    }

    fn add(state: &mut TodoState, raw: &str, env: &TodoEnvironment) -> Effects {
        let title = match Title::parse(raw) {
            Ok(title) => title,
            Err(error) => {
                tracing::debug!(%error, "Ignoring add");
                return SmallVec::new();
            },
        };

        let pending = env
            .rows
            .create_row(TODO_TABLE, TodoItem::initial_fields(&title));
        let id = TodoId::from(pending.id);
        tracing::debug!(%id, "Todo added");

        state
            .projection
            .upsert_local(TodoItem::new(id.clone(), title, env.clock.now()));

        smallvec![Self::write_effect(id, pending.durable)]
    }

    fn toggle(state: &mut TodoState, id: &TodoId, env: &TodoEnvironment) -> Effects {
        let Some(item) = state.projection.get(id) else {
            tracing::debug!(%id, "Ignoring toggle of unknown todo");
            return SmallVec::new();
        };

        let toggled = item.with_completed(!item.completed);
        let patch = RowPatch::new(id.as_row_id().clone()).set(COMPLETED_FIELD, toggled.completed);
        state.projection.upsert_local(toggled);

        smallvec![Self::update(env, patch)]
    }

    fn toggle_all(state: &mut TodoState, completed: bool, env: &TodoEnvironment) -> Effects {
        let updated: Vec<TodoItem> = state
            .projection
            .iter()
            .map(|item| item.with_completed(completed))
            .collect();

        let mut writes = Vec::with_capacity(updated.len());
        for item in updated {
            writes.push(Self::update(
                env,
                RowPatch::new(item.id.as_row_id().clone()).set(COMPLETED_FIELD, completed),
            ));
            state.projection.upsert_local(item);
        }

        if writes.is_empty() {
            return SmallVec::new();
        }
        smallvec![Effect::merge(writes)]
    }

    fn edit(state: &mut TodoState, id: TodoId) -> Effects {
        if state.projection.contains(&id) {
            state.selection = Some(id);
        } else {
            tracing::debug!(%id, "Ignoring edit of unknown todo");
        }
        SmallVec::new()
    }

    fn commit_edit(state: &mut TodoState, raw: &str, env: &TodoEnvironment) -> Effects {
        let Some(id) = state.selection.clone() else {
            tracing::debug!("Ignoring commit without a selection");
            return SmallVec::new();
        };

        let title = match Title::parse(raw) {
            Ok(title) => title,
            Err(TitleError::Empty) => {
                state.selection = None;
                return Self::remove(state, &id, env);
            },
            Err(error) => {
                tracing::debug!(%error, "Ignoring commit, still editing");
                return SmallVec::new();
            },
        };

        state.selection = None;
        let Some(item) = state.projection.get(&id) else {
            return SmallVec::new();
        };

        let patch = RowPatch::new(id.as_row_id().clone()).set(TITLE_FIELD, title.as_str());
        let renamed = item.with_title(title);
        state.projection.upsert_local(renamed);

        smallvec![Self::update(env, patch)]
    }

    fn remove(state: &mut TodoState, id: &TodoId, env: &TodoEnvironment) -> Effects {
        if state.projection.remove_local(id).is_none() {
            tracing::debug!(%id, "Ignoring removal of unknown todo");
            return SmallVec::new();
        }
        if state.selection.as_ref() == Some(id) {
            state.selection = None;
        }

        smallvec![Self::soft_delete(env, id.clone())]
    }

    fn clear_completed(state: &mut TodoState, env: &TodoEnvironment) -> Effects {
        let completed: Vec<TodoId> = state
            .projection
            .iter()
            .filter(|item| item.completed)
            .map(|item| item.id.clone())
            .collect();

        let writes: Vec<Effect<TodoAction>> = completed
            .iter()
            .flat_map(|id| Self::remove(state, id, env))
            .collect();

        if writes.is_empty() {
            return SmallVec::new();
        }
        smallvec![Effect::merge(writes)]
    }

    fn rows_delivered(state: &mut TodoState, generation: u64, rows: &[Row]) -> Effects {
        if generation != state.generation || state.owner.is_busy() {
            tracing::debug!(
                generation,
                current = state.generation,
                "Ignoring delivery from before an owner change"
            );
            return SmallVec::new();
        }

        let items = rows.iter().filter_map(|row| match TodoItem::from_row(row) {
            Ok(item) => Some(item),
            Err(error) => {
                tracing::warn!(%error, "Skipping undecodable row");
                None
            },
        });
        state.projection.reconcile(items);

        if state
            .selection
            .as_ref()
            .is_some_and(|id| !state.projection.contains(id))
        {
            state.selection = None;
        }
        SmallVec::new()
    }

    fn restore_owner(state: &mut TodoState, phrase: &str, env: &TodoEnvironment) -> Effects {
        if state.owner.is_busy() {
            tracing::debug!("Ignoring restore while an owner operation is running");
            return SmallVec::new();
        }
        let Ok(mnemonic) = state.owner.accept_phrase(phrase) else {
            tracing::debug!("Rejected malformed recovery phrase");
            return SmallVec::new();
        };
        state.owner.begin(OwnerOperation::Restore);
        Self::forget_local_data(state);

        let restore = env.owner.restore_from_secret(mnemonic);
        smallvec![Effect::future(async move {
            Some(match restore.await {
                Ok(()) => TodoAction::OwnerRestored,
                Err(error) => TodoAction::OwnerRestoreFailed {
                    error: error.to_string(),
                },
            })
        })]
    }

    fn confirm_reset(state: &mut TodoState, env: &TodoEnvironment) -> Effects {
        if state.owner.is_busy() {
            tracing::debug!("Ignoring reset while an owner operation is running");
            return SmallVec::new();
        }
        if !state.owner.confirm_reset() {
            tracing::debug!("Ignoring reset confirmation without a request");
            return SmallVec::new();
        }
        state.owner.begin(OwnerOperation::Reset);
        Self::forget_local_data(state);

        let reset = env.owner.reset_all_local_data();
        smallvec![Effect::future(async move {
            Some(match reset.await {
                Ok(()) => TodoAction::LocalDataReset,
                Err(error) => TodoAction::ResetFailed {
                    error: error.to_string(),
                },
            })
        })]
    }

    /// Drop everything derived from the previous owner's data
    ///
    /// Bumps the generation so snapshots already queued by the open
    /// subscription are ignored.
    fn forget_local_data(state: &mut TodoState) {
        state.projection.clear();
        state.selection = None;
        state.last_write_error = None;
        state.owner.mnemonic = None;
        state.generation += 1;
    }

    /// An owner operation ended: take a fresh snapshot under the new generation
    fn finish_owner_operation(state: &mut TodoState, env: &TodoEnvironment) -> Effects {
        state.owner.finish();
        if state.subscribed {
            smallvec![Self::subscribe(state, env)]
        } else {
            SmallVec::new()
        }
    }
}

impl Reducer for TodoReducer {
    type State = TodoState;
    type Action = TodoAction;
    type Environment = TodoEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            // ========== Commands ==========
            TodoAction::Start => Self::start(state, env),
            TodoAction::Navigate { fragment } => Self::navigate(state, &fragment, env),
            TodoAction::Add { title } => Self::add(state, &title, env),
            TodoAction::Toggle { id } => Self::toggle(state, &id, env),
            TodoAction::ToggleAll { completed } => Self::toggle_all(state, completed, env),
            TodoAction::Edit { id } => Self::edit(state, id),
            TodoAction::CommitEdit { title } => Self::commit_edit(state, &title, env),
            TodoAction::CancelEdit => {
                state.selection = None;
                SmallVec::new()
            },
            TodoAction::Remove { id } => Self::remove(state, &id, env),
            TodoAction::ClearCompleted => Self::clear_completed(state, env),
            TodoAction::ShowMnemonic => {
                state.owner.mnemonic = env.owner.export_secret();
                SmallVec::new()
            },
            TodoAction::HideMnemonic => {
                state.owner.mnemonic = None;
                SmallVec::new()
            },
            TodoAction::RestoreOwner { phrase } => Self::restore_owner(state, &phrase, env),
            TodoAction::RequestReset => {
                state.owner.request_reset();
                SmallVec::new()
            },
            TodoAction::ConfirmReset => Self::confirm_reset(state, env),
            TodoAction::CancelReset => {
                state.owner.cancel_reset();
                SmallVec::new()
            },

            // ========== Events ==========
            TodoAction::RowsDelivered { generation, rows } => {
                Self::rows_delivered(state, generation, &rows)
            },
            TodoAction::RemovalConfirmed { id } => {
                state.projection.confirm_removal(&id);
                SmallVec::new()
            },
            TodoAction::WriteFailed { id, error } => {
                tracing::warn!(%id, %error, "Row write failed; keeping optimistic state");
                if state.projection.forget_tombstone(&id) {
                    tracing::debug!(%id, "Delete failed, next delivery may show the row again");
                }
                state.last_write_error = Some(error);
                SmallVec::new()
            },
            TodoAction::OwnerRestored => {
                tracing::info!("Owner restored");
                state.owner.restore_error = None;
                Self::finish_owner_operation(state, env)
            },
            TodoAction::OwnerRestoreFailed { error } => {
                tracing::warn!(%error, "Owner restore failed");
                state.owner.restore_error = Some(error);
                Self::finish_owner_operation(state, env)
            },
            TodoAction::LocalDataReset => {
                tracing::info!("Local data reset");
                Self::finish_owner_operation(state, env)
            },
            TodoAction::ResetFailed { error } => {
                tracing::warn!(%error, "Local data reset failed");
                Self::finish_owner_operation(state, env)
            },
        }
    }
}
