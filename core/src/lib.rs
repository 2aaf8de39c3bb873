//! # Admission Core
//!
//! Core traits and types for the admission desk.
//!
//! Scanning, validating and admitting tickets is modelled as a reducer: every
//! input (a decoded QR payload, a manual entry, a service response, a timer
//! firing) is an action, and the reducer turns `(State, Action, Environment)`
//! into a new state plus a list of effect descriptions. The runtime crate
//! executes those effects and feeds the resulting actions back in.
//!
//! ## Core Concepts
//!
//! - **State**: Owned, cloneable domain state
//! - **Action**: Every input the state machine reacts to
//! - **Reducer**: Synchronous `(State, Action, Environment) → (State, Effects)`
//! - **Effect**: A description of I/O to perform later (never performed in `reduce`)
//! - **Environment**: Injected dependencies (clock, service clients, device control)
//!
//! ## Example
//!
//! ```ignore
//! use admission_core::*;
//!
//! impl Reducer for TurnstileReducer {
//!     type State = TurnstileState;
//!     type Action = TurnstileAction;
//!     type Environment = TurnstileEnvironment;
//!
//!     fn reduce(
//!         &self,
//!         state: &mut TurnstileState,
//!         action: TurnstileAction,
//!         env: &TurnstileEnvironment,
//!     ) -> SmallVec<[Effect<TurnstileAction>; 4]> {
//!         match action {
//!             TurnstileAction::Push => smallvec![Effect::None],
//!         }
//!     }
//! }
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};
pub use smallvec::{smallvec, SmallVec};

/// Declarative helpers for building effects
pub mod effect_macros;

/// Reducer module - the trait every state machine implements
///
/// Reducers are deterministic: given the same state, action and environment
/// they return the same new state and the same effect descriptions.
pub mod reducer {
    use super::effect::Effect;
    use smallvec::SmallVec;

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
        /// 1. Checks the action against the current state (guards)
        /// 2. Updates state in place
        /// 3. Returns descriptions of the side effects to run
        ///
        /// Most actions produce zero to two effects, so the inline capacity of
        /// the returned `SmallVec` avoids a heap allocation per reduction.
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
/// Effects are values. They are returned from reducers and executed by the
/// `Store` in the runtime crate.
pub mod effect {
    use std::future::Future;
    use std::pin::Pin;
    use std::time::Duration;

    /// Effect type - describes a side effect to be executed
    ///
    /// # Type Parameters
    ///
    /// - `Action`: The action type that effects can produce (feedback loop)
    pub enum Effect<Action> {
        /// No-op effect
        None,

        /// Run effects concurrently
        Parallel(Vec<Effect<Action>>),

        /// Run effects one after another, each to completion
        Sequential(Vec<Effect<Action>>),

        /// Dispatch an action after a delay (cool-downs, deadlines)
        Delay {
            /// How long to wait
            duration: Duration,
            /// Action to dispatch after delay
            action: Box<Action>,
        },

        /// Arbitrary async computation
        ///
        /// If the future resolves to `Some(action)`, the action is fed back
        /// into the reducer.
        Future(Pin<Box<dyn Future<Output = Option<Action>> + Send>>),
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
                Effect::Sequential(effects) => {
                    f.debug_tuple("Effect::Sequential").field(effects).finish()
                },
                Effect::Delay { duration, action } => f
                    .debug_struct("Effect::Delay")
                    .field("duration", duration)
                    .field("action", action)
                    .finish(),
                Effect::Future(_) => write!(f, "Effect::Future(<future>)"),
            }
        }
    }

    impl<Action> Effect<Action> {
        /// Combine effects to run in parallel
        #[must_use]
        pub const fn merge(effects: Vec<Effect<Action>>) -> Effect<Action> {
            Effect::Parallel(effects)
        }

        /// Chain effects to run sequentially
        #[must_use]
        pub const fn chain(effects: Vec<Effect<Action>>) -> Effect<Action> {
            Effect::Sequential(effects)
        }

        /// Returns `true` for [`Effect::None`]
        #[must_use]
        pub const fn is_none(&self) -> bool {
            matches!(self, Effect::None)
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
    ///
    /// Production uses [`SystemClock`]; tests use a fixed clock so ledger
    /// timestamps are deterministic.
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall-clock time
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)] // Test code can panic
mod tests {
    use super::effect::Effect;
    use super::environment::{Clock, SystemClock};

    #[test]
    fn system_clock_moves_forward() {
        let clock = SystemClock;
        let first = clock.now();
        let second = clock.now();
        assert!(second >= first);
    }

    #[test]
    fn combinators_nest() {
        let effect: Effect<()> = Effect::chain(vec![
            Effect::None,
            Effect::merge(vec![Effect::None, Effect::None]),
        ]);

        match effect {
            Effect::Sequential(effects) => {
                assert_eq!(effects.len(), 2);
                assert!(effects[0].is_none());
                assert!(matches!(&effects[1], Effect::Parallel(inner) if inner.len() == 2));
            },
            other => panic!("unexpected effect: {other:?}"),
        }
    }
}
