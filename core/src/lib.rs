//! # Local-First Core
//!
//! Core traits and types for reducer-driven, local-first applications.
//!
//! An application built on this crate keeps all of its logic in a reducer and
//! talks to the outside world (a sync/storage engine, an owner identity, the
//! browser location) only through effect descriptions and injected traits.
//!
//! ## Core Concepts
//!
//! - **State**: Domain state for a feature (owned, `Clone`)
//! - **Action**: All possible inputs to a reducer (user commands, adapter deliveries)
//! - **Reducer**: Pure function `(State, Action, Environment) → (State, Effects)`
//! - **Effect**: Side effect descriptions (not execution)
//! - **Environment**: Injected dependencies via traits
//!
//! ## External Collaborators
//!
//! - [`row::RowStore`]: create/update rows and subscribe to query results
//! - [`owner::OwnerIdentity`]: mnemonic export, restore and local reset
//! - [`environment::Location`]: the location fragment used for routing
//!
//! ## Example
//!
//! ```ignore
//! use localfirst_core::{effect::Effect, reducer::Reducer, SmallVec};
//!
//! impl Reducer for CounterReducer {
//!     type State = CounterState;
//!     type Action = CounterAction;
//!     type Environment = CounterEnvironment;
//!
//!     fn reduce(
//!         &self,
//!         state: &mut CounterState,
//!         action: CounterAction,
//!         env: &CounterEnvironment,
//!     ) -> SmallVec<[Effect<CounterAction>; 4]> {
//!         state.count += 1;
//!         SmallVec::new()
//!     }
//! }
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};
pub use smallvec::{SmallVec, smallvec};

/// Row Store Adapter contract (create, update, subscribe)
pub mod row;

/// Owner identity contract (mnemonic export, restore, reset)
pub mod owner;

/// Reducer module - The core trait for business logic
///
/// Reducers are pure functions: `(State, Action, Environment) → (State, Effects)`
///
/// They contain all business logic and are deterministic and testable.
pub mod reducer {
    use super::SmallVec;
    use super::effect::Effect;

    /// The Reducer trait - core abstraction for business logic
    ///
    /// # Type Parameters
    ///
    /// - `State`: The domain state this reducer operates on
    /// - `Action`: The action type this reducer processes
    /// - `Environment`: The injected dependencies this reducer needs
    pub trait Reducer {
        /// The state type this reducer operates on
        type State;

        /// The action type this reducer processes
        type Action;

        /// The environment type with injected dependencies
        type Environment;

        /// Reduce an action into state changes and effects
        ///
        /// This function:
        /// 1. Validates the action
        /// 2. Updates state in place
        /// 3. Returns effect descriptions to be executed
        ///
        /// Effects are never awaited here. The runtime executes them after the
        /// state lock has been released.
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]>;
    }
}

/// Effect module - Side effect descriptions
///
/// Effects describe side effects to be performed by the runtime.
/// They are values (not execution).
pub mod effect {
    use futures::Stream;
    use std::future::Future;
    use std::pin::Pin;

    /// Effect type - describes a side effect to be executed
    ///
    /// Effects are NOT executed immediately. They are descriptions of what should happen,
    /// returned from reducers and executed by the Store runtime.
    ///
    /// # Type Parameters
    ///
    /// - `Action`: The action type that effects can produce (feedback loop)
    pub enum Effect<Action> {
        /// No-op effect
        None,

        /// Run effects in parallel
        Parallel(Vec<Effect<Action>>),

        /// Arbitrary async computation
        ///
        /// Returns `Option<Action>` - if Some, the action is fed back into the reducer
        Future(Pin<Box<dyn Future<Output = Option<Action>> + Send>>),

        /// Long-lived source of actions (query subscriptions)
        ///
        /// Every item is fed back into the reducer, in order, until the stream ends.
        Stream(Pin<Box<dyn Stream<Item = Action> + Send>>),
    }

    // Manual Debug implementation since Future doesn't implement Debug
    impl<Action> std::fmt::Debug for Effect<Action>
    where
        Action: std::fmt::Debug,
    {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Effect::None => write!(f, "Effect::None"),
                Effect::Parallel(effects) => {
                    f.debug_tuple("Effect::Parallel").field(effects).finish()
                },
                Effect::Future(_) => write!(f, "Effect::Future(<future>)"),
                Effect::Stream(_) => write!(f, "Effect::Stream(<stream>)"),
            }
        }
    }

    impl<Action> Effect<Action> {
        /// Combine effects to run in parallel
        #[must_use]
        pub const fn merge(effects: Vec<Effect<Action>>) -> Effect<Action> {
            Effect::Parallel(effects)
        }

        /// Wrap a future that produces an optional feedback action
        #[must_use]
        pub fn future<F>(future: F) -> Effect<Action>
        where
            F: Future<Output = Option<Action>> + Send + 'static,
        {
            Effect::Future(Box::pin(future))
        }

        /// Wrap a stream whose items are fed back as actions
        #[must_use]
        pub fn stream<S>(stream: S) -> Effect<Action>
        where
            S: Stream<Item = Action> + Send + 'static,
        {
            Effect::Stream(Box::pin(stream))
        }

        /// Number of leaf effects that actually do work
        ///
        /// `None` counts as zero, `Parallel` counts its children.
        #[must_use]
        pub fn leaf_count(&self) -> usize {
            match self {
                Effect::None => 0,
                Effect::Parallel(effects) => effects.iter().map(Effect::leaf_count).sum(),
                Effect::Future(_) | Effect::Stream(_) => 1,
            }
        }
    }
}

/// Environment module - Dependency injection traits
///
/// All external dependencies are abstracted behind traits and injected
/// via the Environment parameter.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the system time
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }

    /// Location trait - the navigation boundary
    ///
    /// Exposes the fragment part of the current location (`#/active`) and lets
    /// the application rewrite it without creating a new history entry.
    pub trait Location: Send + Sync {
        /// The current fragment, including the leading `#` when present
        fn fragment(&self) -> String;

        /// Replace the current fragment
        fn replace_fragment(&self, fragment: &str);
    }
}
