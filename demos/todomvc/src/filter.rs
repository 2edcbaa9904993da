//! Filter engine: which todos are visible under each mode.
//!
//! Everything here is a pure function of the projection; nothing is cached.

use crate::types::TodoItem;
use serde::{Deserialize, Serialize};

/// Visibility filter
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisibilityMode {
    /// Every todo
    #[default]
    All,
    /// Incomplete todos
    Active,
    /// Completed todos
    Completed,
}

impl VisibilityMode {
    /// Every mode, in display order
    pub const ALL_MODES: [Self; 3] = [Self::All, Self::Active, Self::Completed];

    /// Token used in the location fragment (`#/<token>`)
    #[must_use]
    pub const fn route_token(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Active => "active",
            Self::Completed => "completed",
        }
    }

    /// Parse a fragment token; unknown tokens yield `None`
    #[must_use]
    pub fn from_route_token(token: &str) -> Option<Self> {
        Self::ALL_MODES
            .into_iter()
            .find(|mode| mode.route_token() == token)
    }

    /// Whether `item` is visible under this mode
    #[must_use]
    pub const fn matches(self, item: &TodoItem) -> bool {
        match self {
            Self::All => true,
            Self::Active => !item.completed,
            Self::Completed => item.completed,
        }
    }
}

impl std::fmt::Display for VisibilityMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.route_token())
    }
}

/// Items visible under `mode`, in their original order
#[must_use]
pub fn apply(mode: VisibilityMode, items: &[TodoItem]) -> Vec<&TodoItem> {
    items.iter().filter(|item| mode.matches(item)).collect()
}

/// Number of incomplete items
#[must_use]
pub fn remaining_count(items: &[TodoItem]) -> usize {
    items
        .iter()
        .filter(|item| VisibilityMode::Active.matches(item))
        .count()
}

/// "Clear completed" is offered iff at least one item is completed
#[must_use]
pub fn offers_clear_completed(items: &[TodoItem]) -> bool {
    remaining_count(items) < items.len()
}

/// Toggle-all shows as checked iff there are items and none remain
#[must_use]
pub fn all_completed(items: &[TodoItem]) -> bool {
    !items.is_empty() && remaining_count(items) == 0
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can unwrap
mod tests {
    use super::*;
    use crate::types::{Title, TodoId};
    use chrono::{TimeZone, Utc};
    use localfirst_core::row::RowId;
    use proptest::prelude::*;

    fn item(n: usize, completed: bool) -> TodoItem {
        TodoItem::new(
            TodoId::from(RowId::new(format!("row-{n}"))),
            Title::parse(&format!("todo {n}")).unwrap(),
            Utc.timestamp_opt(0, 0).unwrap(),
        )
        .with_completed(completed)
    }

    fn items(flags: &[bool]) -> Vec<TodoItem> {
        flags
            .iter()
            .enumerate()
            .map(|(n, completed)| item(n, *completed))
            .collect()
    }

    #[test]
    fn route_tokens_round_trip() {
        for mode in VisibilityMode::ALL_MODES {
            assert_eq!(VisibilityMode::from_route_token(mode.route_token()), Some(mode));
        }
        assert_eq!(VisibilityMode::from_route_token("bogus"), None);
        assert_eq!(VisibilityMode::from_route_token("Active"), None);
    }

    #[test]
    fn clear_completed_offer_and_toggle_all_state() {
        assert!(!offers_clear_completed(&[]));
        assert!(!all_completed(&[]));

        let mixed = items(&[false, true]);
        assert_eq!(remaining_count(&mixed), 1);
        assert!(offers_clear_completed(&mixed));
        assert!(!all_completed(&mixed));

        let done = items(&[true, true]);
        assert!(all_completed(&done));
    }

    proptest! {
        #[test]
        fn all_is_identity(flags in proptest::collection::vec(any::<bool>(), 0..32)) {
            let list = items(&flags);
            let visible: Vec<TodoItem> = apply(VisibilityMode::All, &list).into_iter().cloned().collect();
            prop_assert_eq!(visible, list);
        }

        #[test]
        fn active_and_completed_partition(flags in proptest::collection::vec(any::<bool>(), 0..32)) {
            let list = items(&flags);
            let active = apply(VisibilityMode::Active, &list);
            let completed = apply(VisibilityMode::Completed, &list);

            prop_assert_eq!(active.len() + completed.len(), list.len());
            prop_assert!(active.iter().all(|item| !item.completed));
            prop_assert!(completed.iter().all(|item| item.completed));
            prop_assert!(active.iter().all(|a| completed.iter().all(|c| a.id != c.id)));
            prop_assert_eq!(remaining_count(&list), active.len());
        }

        #[test]
        fn filtering_preserves_order(flags in proptest::collection::vec(any::<bool>(), 0..32)) {
            let list = items(&flags);
            for mode in VisibilityMode::ALL_MODES {
                let positions: Vec<usize> = apply(mode, &list)
                    .iter()
                    .map(|visible| list.iter().position(|item| item.id == visible.id).unwrap())
                    .collect();
                prop_assert!(positions.windows(2).all(|pair| pair[0] < pair[1]));
            }
        }
    }
}
