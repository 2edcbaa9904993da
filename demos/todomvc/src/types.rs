//! Domain types for the TodoMVC app.
//!
//! A todo list is a single `todo` table with two user-visible columns
//! (`title`, `completed`) plus the soft-delete flag. Everything here is plain
//! data; behavior lives in the reducer.

use crate::filter::{self, VisibilityMode};
use crate::owner::OwnerPanel;
use crate::projection::ProjectionCache;
use crate::router::VisibilityRouter;
use chrono::{DateTime, Utc};
use localfirst_core::row::{Fields, Query, Row, RowId, SOFT_DELETE_FIELD};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Table holding the todos.
pub const TODO_TABLE: &str = "todo";
/// Title column.
pub const TITLE_FIELD: &str = "title";
/// Completed column.
pub const COMPLETED_FIELD: &str = "completed";
/// Longest accepted title, in characters.
pub const MAX_TITLE_CHARS: usize = 1000;

/// The query the app subscribes to: live todos, oldest first.
#[must_use]
pub fn todo_query() -> Query {
    Query::table(TODO_TABLE)
        .require(TITLE_FIELD)
        .require(COMPLETED_FIELD)
        .exclude_deleted()
        .order_by_created_at()
}

/// Unique identifier for a todo item, assigned by the row store
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TodoId(RowId);

impl TodoId {
    /// Wrap a store-assigned row id
    #[must_use]
    pub const fn from_row_id(id: RowId) -> Self {
        Self(id)
    }

    /// The underlying row id
    #[must_use]
    pub const fn as_row_id(&self) -> &RowId {
        &self.0
    }
}

impl From<RowId> for TodoId {
    fn from(id: RowId) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for TodoId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Why a title was refused
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TitleError {
    /// Nothing left after trimming
    #[error("Todo title cannot be empty")]
    Empty,

    /// Over [`MAX_TITLE_CHARS`]
    #[error("Todo title too long ({len} characters, max {max})")]
    TooLong {
        /// Characters after trimming
        len: usize,
        /// Limit
        max: usize,
    },
}

/// A trimmed, non-empty title of at most [`MAX_TITLE_CHARS`] characters
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Title(String);

impl Title {
    /// Trim and validate raw input
    ///
    /// # Errors
    ///
    /// [`TitleError::Empty`] if only whitespace remains,
    /// [`TitleError::TooLong`] past the character limit.
    pub fn parse(raw: &str) -> Result<Self, TitleError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(TitleError::Empty);
        }
        let len = trimmed.chars().count();
        if len > MAX_TITLE_CHARS {
            return Err(TitleError::TooLong {
                len,
                max: MAX_TITLE_CHARS,
            });
        }
        Ok(Self(trimmed.to_string()))
    }

    /// The title text
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Title {
    type Error = TitleError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Title> for String {
    fn from(title: Title) -> Self {
        title.0
    }
}

impl std::fmt::Display for Title {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A row that could not be turned into a [`TodoItem`]
#[derive(Error, Debug)]
pub enum RowDecodeError {
    /// Missing or mistyped columns
    #[error("Row {id} has malformed columns: {source}")]
    Columns {
        /// Offending row
        id: RowId,
        /// Decoder error
        #[source]
        source: serde_json::Error,
    },

    /// The title column fails validation
    #[error("Row {id} has an invalid title: {source}")]
    Title {
        /// Offending row
        id: RowId,
        /// Validation error
        #[source]
        source: TitleError,
    },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TodoColumns {
    title: String,
    completed: bool,
    #[serde(default)]
    is_deleted: Option<bool>,
}

/// A single todo item
///
/// Items are replaced, never edited in place: toggling or renaming produces a
/// new value that takes the old one's position in the projection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoItem {
    /// Unique identifier
    pub id: TodoId,
    /// Title/description of the todo
    pub title: Title,
    /// Whether the todo is completed
    pub completed: bool,
    /// Soft-delete flag; absent on rows written before the column existed
    pub is_deleted: Option<bool>,
    /// When the row was created
    pub created_at: DateTime<Utc>,
}

impl TodoItem {
    /// Creates a new, incomplete todo item
    #[must_use]
    pub const fn new(id: TodoId, title: Title, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            title,
            completed: false,
            is_deleted: Some(false),
            created_at,
        }
    }

    /// Copy with `completed` replaced
    #[must_use]
    pub fn with_completed(&self, completed: bool) -> Self {
        Self {
            completed,
            ..self.clone()
        }
    }

    /// Copy with `title` replaced
    #[must_use]
    pub fn with_title(&self, title: Title) -> Self {
        Self {
            title,
            ..self.clone()
        }
    }

    /// Whether the soft-delete flag is set
    #[must_use]
    pub fn is_soft_deleted(&self) -> bool {
        self.is_deleted.unwrap_or(false)
    }

    /// Decode a row delivered by the todo query
    ///
    /// # Errors
    ///
    /// [`RowDecodeError`] when a column is missing, mistyped or the title is invalid.
    pub fn from_row(row: &Row) -> Result<Self, RowDecodeError> {
        let columns: TodoColumns = serde_json::from_value(Value::Object(row.fields.clone()))
            .map_err(|source| RowDecodeError::Columns {
                id: row.id.clone(),
                source,
            })?;
        let title = Title::parse(&columns.title).map_err(|source| RowDecodeError::Title {
            id: row.id.clone(),
            source,
        })?;

        Ok(Self {
            id: TodoId::from(row.id.clone()),
            title,
            completed: columns.completed,
            is_deleted: columns.is_deleted,
            created_at: row.created_at,
        })
    }

    /// Columns written when a todo is created
    #[must_use]
    pub fn initial_fields(title: &Title) -> Fields {
        let mut fields = Fields::new();
        fields.insert(TITLE_FIELD.to_string(), Value::from(title.as_str()));
        fields.insert(COMPLETED_FIELD.to_string(), Value::Bool(false));
        fields.insert(SOFT_DELETE_FIELD.to_string(), Value::Bool(false));
        fields
    }
}

/// State of the TodoMVC app
///
/// Owned by a single store; the reducer is its only writer.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TodoState {
    /// Local projection of the todo query
    pub projection: ProjectionCache,
    /// Item currently in edit mode
    pub selection: Option<TodoId>,
    /// Current filter, driven by the location fragment
    pub router: VisibilityRouter,
    /// Whether the query subscription has been opened
    pub subscribed: bool,
    /// Generation of the current subscription; deliveries tagged with an
    /// older one come from a stream opened before an owner change
    pub generation: u64,
    /// Most recent adapter write failure (no rollback is attempted)
    pub last_write_error: Option<String>,
    /// Recovery phrase and reset confirmation UI state
    pub owner: OwnerPanel,
}

impl TodoState {
    /// Creates a new empty todo state
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current filter mode
    #[must_use]
    pub const fn visibility(&self) -> VisibilityMode {
        self.router.mode()
    }

    /// Items shown under the current filter
    #[must_use]
    pub fn visible(&self) -> Vec<&TodoItem> {
        filter::apply(self.visibility(), self.projection.items())
    }

    /// Number of incomplete items
    #[must_use]
    pub fn remaining_count(&self) -> usize {
        filter::remaining_count(self.projection.items())
    }

    /// Whether "clear completed" should be offered
    #[must_use]
    pub fn offers_clear_completed(&self) -> bool {
        filter::offers_clear_completed(self.projection.items())
    }

    /// Whether the toggle-all control shows as checked
    #[must_use]
    pub fn all_completed(&self) -> bool {
        filter::all_completed(self.projection.items())
    }

    /// The item in edit mode, if any
    #[must_use]
    pub fn selected(&self) -> Option<&TodoItem> {
        self.selection.as_ref().and_then(|id| self.projection.get(id))
    }
}

/// Actions for the TodoMVC app
///
/// Commands come from the UI; events come back from effects (adapter
/// deliveries, write failures, owner operations).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum TodoAction {
    // ========== Commands ==========
    /// Command: sync the router with the current location and open the query subscription
    Start,

    /// Command: the location fragment changed
    Navigate {
        /// New fragment, e.g. `#/active`
        fragment: String,
    },

    /// Command: create a todo from raw input
    Add {
        /// Untrimmed input
        title: String,
    },

    /// Command: flip `completed`
    Toggle {
        /// Todo to toggle
        id: TodoId,
    },

    /// Command: set `completed` on every todo
    ToggleAll {
        /// Value to set
        completed: bool,
    },

    /// Command: enter edit mode
    Edit {
        /// Todo to edit
        id: TodoId,
    },

    /// Command: leave edit mode, saving (or deleting on empty input)
    CommitEdit {
        /// Untrimmed input
        title: String,
    },

    /// Command: leave edit mode without saving
    CancelEdit,

    /// Command: soft-delete a todo
    Remove {
        /// Todo to delete
        id: TodoId,
    },

    /// Command: soft-delete every completed todo
    ClearCompleted,

    /// Command: reveal the recovery phrase
    ShowMnemonic,

    /// Command: hide the recovery phrase
    HideMnemonic,

    /// Command: restore another owner from a typed phrase
    RestoreOwner {
        /// Phrase as typed
        phrase: String,
    },

    /// Command: ask to wipe local data (needs confirmation)
    RequestReset,

    /// Command: confirm the pending reset
    ConfirmReset,

    /// Command: abandon the pending reset
    CancelReset,

    // ========== Events ==========
    /// Event: the query subscription delivered a snapshot
    RowsDelivered {
        /// Subscription generation the snapshot belongs to
        generation: u64,
        /// Rows matching the todo query
        rows: Vec<Row>,
    },

    /// Event: the store applied a soft-delete
    RemovalConfirmed {
        /// Row that was deleted
        id: TodoId,
    },

    /// Event: an adapter write failed after the optimistic update
    WriteFailed {
        /// Row the write targeted
        id: TodoId,
        /// Error message
        error: String,
    },

    /// Event: owner restore succeeded
    OwnerRestored,

    /// Event: owner restore failed
    OwnerRestoreFailed {
        /// Error message
        error: String,
    },

    /// Event: local data was wiped
    LocalDataReset,

    /// Event: wiping local data failed
    ResetFailed {
        /// Error message
        error: String,
    },
}

impl TodoAction {
    /// Whether this action reports something that already happened
    #[must_use]
    pub const fn is_event(&self) -> bool {
        matches!(
            self,
            Self::RowsDelivered { .. }
                | Self::RemovalConfirmed { .. }
                | Self::WriteFailed { .. }
                | Self::OwnerRestored
                | Self::OwnerRestoreFailed { .. }
                | Self::LocalDataReset
                | Self::ResetFailed { .. }
        )
    }

    /// Whether this action is a user command
    #[must_use]
    pub const fn is_command(&self) -> bool {
        !self.is_event()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can unwrap
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn row(id: &str, value: Value) -> Row {
        let Value::Object(fields) = value else {
            unreachable!("test rows are objects")
        };
        Row::new(RowId::new(id), Utc.timestamp_opt(0, 0).unwrap(), fields)
    }

    #[test]
    fn title_is_trimmed_and_bounded() {
        assert_eq!(Title::parse("  Buy milk \n").unwrap().as_str(), "Buy milk");
        assert_eq!(Title::parse(""), Err(TitleError::Empty));
        assert_eq!(Title::parse("   "), Err(TitleError::Empty));

        let exact = "x".repeat(MAX_TITLE_CHARS);
        assert!(Title::parse(&exact).is_ok());
        assert_eq!(
            Title::parse(&format!("{exact}y")),
            Err(TitleError::TooLong {
                len: MAX_TITLE_CHARS + 1,
                max: MAX_TITLE_CHARS
            })
        );
    }

    #[test]
    fn title_limit_counts_characters_not_bytes() {
        let wide = "é".repeat(MAX_TITLE_CHARS);
        assert!(Title::parse(&wide).is_ok());
    }

    #[test]
    fn todo_item_from_row() {
        let item = TodoItem::from_row(&row(
            "row-1",
            json!({"title": "Walk dog", "completed": true, "isDeleted": false, "extra": 1}),
        ))
        .unwrap();

        assert_eq!(item.id, TodoId::from(RowId::new("row-1")));
        assert_eq!(item.title.as_str(), "Walk dog");
        assert!(item.completed);
        assert!(!item.is_soft_deleted());
    }

    #[test]
    fn todo_item_from_row_without_delete_flag() {
        let item =
            TodoItem::from_row(&row("row-1", json!({"title": "A", "completed": false}))).unwrap();
        assert_eq!(item.is_deleted, None);
        assert!(!item.is_soft_deleted());
    }

    #[test]
    fn todo_item_from_malformed_row() {
        assert!(matches!(
            TodoItem::from_row(&row("row-1", json!({"title": "A", "completed": "yes"}))),
            Err(RowDecodeError::Columns { .. })
        ));
        assert!(matches!(
            TodoItem::from_row(&row("row-2", json!({"title": "  ", "completed": false}))),
            Err(RowDecodeError::Title { .. })
        ));
    }

    #[test]
    fn initial_fields_match_the_query() {
        let title = Title::parse("A").unwrap();
        let created = row("row-1", Value::Object(TodoItem::initial_fields(&title)));
        assert!(todo_query().matches(&created));
    }

    #[test]
    fn todo_action_classification() {
        assert!(TodoAction::Add { title: "x".into() }.is_command());
        assert!(TodoAction::LocalDataReset.is_event());
        assert!(!TodoAction::ClearCompleted.is_event());
    }
}
