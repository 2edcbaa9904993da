//! Visibility router: location fragment → filter mode.
//!
//! Recognized fragments are `#/all`, `#/active` and `#/completed`. An empty
//! fragment (``, `#`, `#/`) means "all". Anything else falls back to "all" and
//! asks the caller to rewrite the location to the canonical empty fragment.

use crate::filter::VisibilityMode;
use serde::{Deserialize, Serialize};

/// Fragment the location is rewritten to when it names no known mode.
pub const CANONICAL_FRAGMENT: &str = "";

/// Fragment for `mode`, as rendered in filter links
#[must_use]
pub fn fragment_for(mode: VisibilityMode) -> String {
    match mode {
        VisibilityMode::All => "#/".to_string(),
        other => format!("#/{}", other.route_token()),
    }
}

/// Mode named by `fragment`; `None` when the fragment is unrecognized
///
/// Apart from the empty string, a fragment must start with `#`.
#[must_use]
pub fn parse_fragment(fragment: &str) -> Option<VisibilityMode> {
    if fragment.is_empty() {
        return Some(VisibilityMode::All);
    }
    let path = fragment.strip_prefix('#')?;
    let token = path.strip_prefix('/').unwrap_or(path);
    let token = token.strip_suffix('/').unwrap_or(token);
    if token.is_empty() {
        return Some(VisibilityMode::All);
    }
    VisibilityMode::from_route_token(token)
}

/// Outcome of a navigation event
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Navigation {
    /// Mode after the transition
    pub mode: VisibilityMode,
    /// Fragment the location must be replaced with, if any
    pub rewrite: Option<&'static str>,
}

/// Router state machine over {All, Active, Completed}, starting at All
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisibilityRouter {
    mode: VisibilityMode,
}

impl VisibilityRouter {
    /// Router in the initial `All` state
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current mode
    #[must_use]
    pub const fn mode(&self) -> VisibilityMode {
        self.mode
    }

    /// Transition for a navigation to `fragment`
    pub fn navigate(&mut self, fragment: &str) -> Navigation {
        let (mode, rewrite) = match parse_fragment(fragment) {
            Some(mode) => (mode, None),
            None => {
                tracing::debug!(fragment, "Unknown route, falling back to all");
                (VisibilityMode::All, Some(CANONICAL_FRAGMENT))
            },
        };
        if mode != self.mode {
            tracing::debug!(from = %self.mode, to = %mode, "Visibility changed");
        }
        self.mode = mode;
        Navigation { mode, rewrite }
    }
}
