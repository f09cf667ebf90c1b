//! Reducer composition utilities
//!
//! Booking workflows are split across several reducers that share one state
//! and one action type (the lifecycle reducer owns creation and status
//! decisions, the handoff reducer owns receipt and return). They are joined
//! with [`combine_reducers`] so callers dispatch to a single reducer.
//!
//! # Example
//!
//! ```
//! use campus_rental_core::composition::combine_reducers;
//! use campus_rental_core::{effect::Effect, reducer::Reducer, smallvec, SmallVec};
//!
//! #[derive(Clone, Default)]
//! struct ShelfState {
//!     on_loan: u32,
//!     returned: u32,
//! }
//!
//! #[derive(Clone)]
//! enum ShelfAction {
//!     Lend,
//!     Return,
//! }
//!
//! struct LendReducer;
//! struct ReturnReducer;
//!
//! impl Reducer for LendReducer {
//!     type State = ShelfState;
//!     type Action = ShelfAction;
//!     type Environment = ();
//!
//!     fn reduce(&self, state: &mut ShelfState, action: ShelfAction, _env: &()) -> SmallVec<[Effect<ShelfAction>; 4]> {
//!         if matches!(action, ShelfAction::Lend) {
//!             state.on_loan += 1;
//!         }
//!         smallvec![Effect::None]
//!     }
//! }
//!
//! impl Reducer for ReturnReducer {
//!     type State = ShelfState;
//!     type Action = ShelfAction;
//!     type Environment = ();
//!
//!     fn reduce(&self, state: &mut ShelfState, action: ShelfAction, _env: &()) -> SmallVec<[Effect<ShelfAction>; 4]> {
//!         if matches!(action, ShelfAction::Return) {
//!             state.on_loan -= 1;
//!             state.returned += 1;
//!         }
//!         smallvec![Effect::None]
//!     }
//! }
//!
//! let shelf = combine_reducers(vec![Box::new(LendReducer), Box::new(ReturnReducer)]);
//! let mut state = ShelfState::default();
//! let _ = shelf.reduce(&mut state, ShelfAction::Lend, &());
//! let _ = shelf.reduce(&mut state, ShelfAction::Return, &());
//! assert_eq!((state.on_loan, state.returned), (0, 1));
//! ```

use crate::effect::Effect;
use crate::reducer::Reducer;
use smallvec::SmallVec;

/// Combines multiple reducers that operate on the same state and action types.
///
/// Each reducer sees the action in registration order and all effects are
/// concatenated. No-op effects are dropped so callers can inspect the
/// combined output without filtering `Effect::None` themselves.
#[must_use]
pub fn combine_reducers<S, A, E>(
    reducers: Vec<Box<dyn Reducer<State = S, Action = A, Environment = E> + Send + Sync>>,
) -> CombinedReducer<S, A, E>
where
    S: 'static,
    A: Clone + 'static,
    E: 'static,
{
    CombinedReducer { reducers }
}

/// A combined reducer that runs multiple reducers in sequence.
///
/// Created by [`combine_reducers`].
pub struct CombinedReducer<S, A, E>
where
    S: 'static,
    A: Clone + 'static,
    E: 'static,
{
    reducers: Vec<Box<dyn Reducer<State = S, Action = A, Environment = E> + Send + Sync>>,
}

impl<S, A, E> CombinedReducer<S, A, E>
where
    S: 'static,
    A: Clone + 'static,
    E: 'static,
{
    /// Number of reducers joined together
    #[must_use]
    pub fn len(&self) -> usize {
        self.reducers.len()
    }

    /// Returns `true` if no reducers were registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.reducers.is_empty()
    }
}

impl<S, A, E> Reducer for CombinedReducer<S, A, E>
where
    S: 'static,
    A: Clone + 'static,
    E: 'static,
{
    type State = S;
    type Action = A;
    type Environment = E;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        let mut all_effects = SmallVec::new();

        for reducer in &self.reducers {
            let effects = reducer.reduce(state, action.clone(), env);
            all_effects.extend(effects.into_iter().filter(|effect| !effect.is_noop()));
        }

        all_effects
    }
}
