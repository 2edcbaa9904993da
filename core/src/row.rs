//! Row Store Adapter contract.
//!
//! The sync/storage engine is an external collaborator. Applications see it as
//! a table of loosely typed rows they can create, patch and query:
//!
//! - [`RowStore::create_row`] allocates an id synchronously and persists later
//! - [`RowStore::update_row`] writes only the fields that changed
//! - [`RowStore::subscribe`] pushes snapshots of the rows matching a [`Query`]
//!
//! Conflict resolution, encryption and replication all live behind this trait.

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Column used for soft deletes.
pub const SOFT_DELETE_FIELD: &str = "isDeleted";

/// Loosely typed row payload, keyed by column name.
pub type Fields = serde_json::Map<String, Value>;

/// Error type for `RowId` parsing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid row ID: {0}")]
pub struct ParseRowIdError(String);

/// Opaque unique identifier assigned by the row store.
///
/// # Validation
///
/// - `FromStr::from_str()`: rejects empty strings
/// - `new()`: no validation (for ids handed out by a store)
///
/// # Examples
///
/// ```
/// use localfirst_core::row::RowId;
///
/// let id = RowId::new("row-1");
/// assert_eq!(id.as_str(), "row-1");
///
/// assert!("".parse::<RowId>().is_err());
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowId(String);

impl RowId {
    /// Create a new `RowId` from a string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the row ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Convert the `RowId` into its inner `String`.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RowId {
    type Err = ParseRowIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Err(ParseRowIdError("Row ID cannot be empty".to_string()));
        }
        Ok(Self(s.to_string()))
    }
}

/// A row as delivered by a query subscription.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Row {
    /// Store-assigned identifier
    pub id: RowId,
    /// When the store created the row
    pub created_at: DateTime<Utc>,
    /// Column values
    pub fields: Fields,
}

impl Row {
    /// Create a row from its parts
    #[must_use]
    pub const fn new(id: RowId, created_at: DateTime<Utc>, fields: Fields) -> Self {
        Self {
            id,
            created_at,
            fields,
        }
    }

    /// Value of a column; `null` counts as absent
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name).filter(|value| !value.is_null())
    }

    /// Whether the soft-delete column is set to `true`
    #[must_use]
    pub fn is_soft_deleted(&self) -> bool {
        self.field(SOFT_DELETE_FIELD)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Merge a patch into this row, overwriting the patched columns
    pub fn apply(&mut self, patch: &RowPatch) {
        for (name, value) in &patch.fields {
            self.fields.insert(name.clone(), value.clone());
        }
    }
}

/// Partial update: the row id plus only the columns that changed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RowPatch {
    /// Row being updated
    pub id: RowId,
    /// Changed columns
    pub fields: Fields,
}

impl RowPatch {
    /// Start an empty patch for `id`
    #[must_use]
    pub fn new(id: RowId) -> Self {
        Self {
            id,
            fields: Fields::new(),
        }
    }

    /// Set one column
    #[must_use]
    pub fn set(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Patch that marks the row as soft-deleted
    #[must_use]
    pub fn soft_delete(id: RowId) -> Self {
        Self::new(id).set(SOFT_DELETE_FIELD, true)
    }
}

/// Query descriptor for [`RowStore::subscribe`].
///
/// # Example
///
/// ```
/// use localfirst_core::row::Query;
///
/// let query = Query::table("todo")
///     .require("title")
///     .require("completed")
///     .exclude_deleted()
///     .order_by_created_at();
/// assert_eq!(query.table_name(), "todo");
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Query {
    table: String,
    required: Vec<String>,
    exclude_deleted: bool,
    order_by_created_at: bool,
}

impl Query {
    /// Select every row of `table`
    #[must_use]
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            required: Vec::new(),
            exclude_deleted: false,
            order_by_created_at: false,
        }
    }

    /// Skip rows where `field` is absent or `null`
    #[must_use]
    pub fn require(mut self, field: impl Into<String>) -> Self {
        self.required.push(field.into());
        self
    }

    /// Skip soft-deleted rows
    #[must_use]
    pub const fn exclude_deleted(mut self) -> Self {
        self.exclude_deleted = true;
        self
    }

    /// Order results by creation time, oldest first
    #[must_use]
    pub const fn order_by_created_at(mut self) -> Self {
        self.order_by_created_at = true;
        self
    }

    /// Table this query reads
    #[must_use]
    pub fn table_name(&self) -> &str {
        &self.table
    }

    /// Whether `row` passes the query predicate
    #[must_use]
    pub fn matches(&self, row: &Row) -> bool {
        if self.exclude_deleted && row.is_soft_deleted() {
            return false;
        }
        self.required.iter().all(|field| row.field(field).is_some())
    }

    /// Filter and order `rows` the way a store would answer this query
    ///
    /// Ordering is stable: rows created at the same instant keep their input order.
    #[must_use]
    pub fn select<'a>(&self, rows: impl IntoIterator<Item = &'a Row>) -> Vec<Row> {
        let mut selected: Vec<Row> = rows
            .into_iter()
            .filter(|row| self.matches(row))
            .cloned()
            .collect();
        if self.order_by_created_at {
            selected.sort_by_key(|row| row.created_at);
        }
        selected
    }
}

/// Errors reported by a row store write.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RowStoreError {
    /// The row to update does not exist
    #[error("Row {id} not found in table {table}")]
    NotFound {
        /// Table name
        table: String,
        /// Missing row
        id: RowId,
    },

    /// The store refused the write (schema or validation failure)
    #[error("Write rejected: {0}")]
    Rejected(String),

    /// The store is not reachable or has been shut down
    #[error("Row store unavailable: {0}")]
    Unavailable(String),
}

/// Result of [`RowStore::create_row`]: the id is known now, durability later.
pub struct PendingCreate {
    /// Allocated id, immutable from here on
    pub id: RowId,
    /// Completes once the row is durable
    pub durable: BoxFuture<'static, Result<(), RowStoreError>>,
}

impl fmt::Debug for PendingCreate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingCreate")
            .field("id", &self.id)
            .field("durable", &"<future>")
            .finish()
    }
}

/// The Row Store Adapter capability.
///
/// Writes are fire-and-forget from the caller's point of view: the returned
/// futures are handed to the runtime as effects and nobody blocks on them.
pub trait RowStore: Send + Sync {
    /// Allocate an id for a new row in `table` and schedule its insertion
    fn create_row(&self, table: &str, fields: Fields) -> PendingCreate;

    /// Write the changed columns of an existing row
    fn update_row(
        &self,
        table: &str,
        patch: RowPatch,
    ) -> BoxFuture<'static, Result<(), RowStoreError>>;

    /// Subscribe to the rows matching `query`
    ///
    /// The stream yields a snapshot right away and again after every change.
    /// Consumers must tolerate repeated and partial snapshots.
    fn subscribe(&self, query: &Query) -> BoxStream<'static, Vec<Row>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn row(id: &str, secs: i64, fields: Value) -> Row {
        let Value::Object(fields) = fields else {
            unreachable!("test rows are objects")
        };
        Row::new(
            RowId::new(id),
            Utc.timestamp_opt(secs, 0).single().unwrap_or_default(),
            fields,
        )
    }

    #[test]
    fn query_skips_missing_null_and_deleted() {
        let query = Query::table("todo")
            .require("title")
            .require("completed")
            .exclude_deleted();

        assert!(query.matches(&row("a", 0, json!({"title": "A", "completed": false}))));
        assert!(!query.matches(&row("b", 0, json!({"title": "B"}))));
        assert!(!query.matches(&row("c", 0, json!({"title": null, "completed": true}))));
        assert!(!query.matches(&row(
            "d",
            0,
            json!({"title": "D", "completed": true, "isDeleted": true})
        )));
        assert!(query.matches(&row(
            "e",
            0,
            json!({"title": "E", "completed": true, "isDeleted": false})
        )));
    }

    #[test]
    fn select_orders_by_creation_time_stably() {
        let query = Query::table("todo").order_by_created_at();
        let rows = vec![
            row("late", 20, json!({})),
            row("first", 10, json!({})),
            row("second", 10, json!({})),
        ];

        let ids: Vec<_> = query
            .select(&rows)
            .into_iter()
            .map(|row| row.id.into_inner())
            .collect();
        assert_eq!(ids, ["first", "second", "late"]);
    }

    #[test]
    fn patch_overwrites_only_given_columns() {
        let mut target = row("a", 0, json!({"title": "A", "completed": false}));
        target.apply(&RowPatch::new(RowId::new("a")).set("completed", true));

        assert_eq!(target.field("title"), Some(&json!("A")));
        assert_eq!(target.field("completed"), Some(&json!(true)));
        assert!(!target.is_soft_deleted());

        target.apply(&RowPatch::soft_delete(RowId::new("a")));
        assert!(target.is_soft_deleted());
    }

    #[test]
    fn row_id_rejects_blank_input() {
        assert!("   ".parse::<RowId>().is_err());
        assert_eq!("abc".parse::<RowId>(), Ok(RowId::new("abc")));
    }
}
