//! # Local-First Testing
//!
//! Testing utilities and helpers for reducer-driven local-first apps.
//!
//! This crate provides:
//! - [`ReducerTest`]: Given-When-Then harness for reducers
//! - [`InMemoryRowStore`]: a row store that records writes and pushes snapshots
//! - [`InMemoryOwner`]: a scripted owner identity
//! - [`RecordingLocation`] and [`FixedClock`]: deterministic environment pieces
//!
//! ## Example
//!
//! ```ignore
//! use localfirst_testing::{InMemoryRowStore, test_clock};
//!
//! let rows = InMemoryRowStore::new(test_clock());
//! let pending = rows.create_row("todo", fields);
//! pending.durable.await?;
//! assert_eq!(rows.len("todo"), 1);
//! ```

use chrono::{DateTime, Utc};
use localfirst_core::environment::{Clock, Location};

/// In-memory row store
pub mod row_store;

/// In-memory owner identity
pub mod owner;


/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Location, Utc};
    use std::sync::{Arc, Mutex};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use localfirst_testing::mocks::FixedClock;
    /// use localfirst_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// Panics if the hardcoded timestamp fails to parse.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }

    /// Location double that remembers every fragment rewrite
    ///
    /// # Example
    ///
    /// ```
    /// use localfirst_testing::mocks::RecordingLocation;
    /// use localfirst_core::environment::Location;
    ///
    /// let location = RecordingLocation::at("#/bogus");
    /// location.replace_fragment("");
    /// assert_eq!(location.fragment(), "");
    /// assert_eq!(location.replacements(), vec![String::new()]);
    /// ```
    #[derive(Debug, Clone, Default)]
    pub struct RecordingLocation {
        fragment: Arc<Mutex<String>>,
        replacements: Arc<Mutex<Vec<String>>>,
    }

    #[allow(clippy::unwrap_used)] // Mutex poison only follows a panicking test
    impl RecordingLocation {
        /// Start at `fragment`
        #[must_use]
        pub fn at(fragment: &str) -> Self {
            Self {
                fragment: Arc::new(Mutex::new(fragment.to_string())),
                replacements: Arc::default(),
            }
        }

        /// Simulate the user navigating (does not count as a replacement)
        pub fn set(&self, fragment: &str) {
            *self.fragment.lock().unwrap() = fragment.to_string();
        }

        /// Every fragment passed to `replace_fragment`, in order
        #[must_use]
        pub fn replacements(&self) -> Vec<String> {
            self.replacements.lock().unwrap().clone()
        }
    }

    #[allow(clippy::unwrap_used)]
    impl Location for RecordingLocation {
        fn fragment(&self) -> String {
            self.fragment.lock().unwrap().clone()
        }

        fn replace_fragment(&self, fragment: &str) {
            *self.fragment.lock().unwrap() = fragment.to_string();
            self.replacements.lock().unwrap().push(fragment.to_string());
        }
    }
}

/// Install a `tracing` subscriber that writes through the test harness
///
/// Safe to call from every test; only the first call installs anything.
/// Honors `RUST_LOG`, defaulting to `debug`.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
        )
        .with_test_writer()
        .try_init();
}

// Re-export commonly used items
pub use mocks::{FixedClock, RecordingLocation, test_clock};
pub use owner::InMemoryOwner;
pub use reducer_test::{ReducerTest, assertions};
pub use row_store::{InMemoryRowStore, RecordedWrite};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        assert_eq!(clock.now(), clock.now());
    }

    #[test]
    fn recording_location_ignores_user_navigation() {
        let location = RecordingLocation::at("");
        location.set("#/active");
        assert_eq!(location.fragment(), "#/active");
        assert!(location.replacements().is_empty());
    }
}
