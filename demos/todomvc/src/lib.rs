//! TodoMVC on a local-first row store.
//!
//! The app keeps an in-memory projection of the `todo` table and drives every
//! change through one reducer:
//!
//! - user commands update the projection optimistically and emit the row
//!   write as an effect
//! - the query subscription feeds snapshots back as `RowsDelivered`, which
//!   are reconciled into the projection without duplicating rows
//! - the location fragment selects the visibility filter
//! - the owner panel shows, restores and resets the sync identity
//!
//! # Quick Start
//!
//! ```no_run
//! use localfirst_core::environment::SystemClock;
//! use localfirst_runtime::Store;
//! use localfirst_testing::{InMemoryOwner, InMemoryRowStore, RecordingLocation};
//! use std::sync::Arc;
//! use todomvc::{TodoAction, TodoEnvironment, TodoReducer, TodoState};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let rows = InMemoryRowStore::new(SystemClock);
//! let env = TodoEnvironment::new(
//!     Arc::new(rows.clone()),
//!     Arc::new(InMemoryOwner::default().wiping(rows)),
//!     Arc::new(RecordingLocation::at("#/active")),
//!     Arc::new(SystemClock),
//! );
//! let store = Store::new(TodoState::new(), TodoReducer::new(), env);
//!
//! store.send(TodoAction::Start).await?;
//! store.send(TodoAction::Add { title: "Buy milk".to_string() }).await?;
//!
//! let remaining = store.state(TodoState::remaining_count).await;
//! println!("{remaining} items left");
//! # Ok(())
//! # }
//! ```

pub mod filter;
pub mod owner;
pub mod projection;
pub mod reducer;
pub mod router;
pub mod types;

// Re-export commonly used types
pub use filter::VisibilityMode;
pub use projection::ProjectionCache;
pub use reducer::{TodoEnvironment, TodoReducer};
pub use types::{TodoAction, TodoId, TodoItem, TodoState, Title, TitleError};
