//! Given-When-Then harness for reducers
//!
//! A test states the starting state, feeds one or more actions, and then
//! asserts on the final state and on the effects returned by the last action.

#![allow(clippy::module_name_repetitions)] // ReducerTest is the natural name

use campus_rental_core::{effect::Effect, reducer::Reducer};

/// Type alias for state assertion functions
type StateAssertion<S> = Box<dyn FnOnce(&S)>;

/// Type alias for effect assertion functions
type EffectAssertion<A> = Box<dyn FnOnce(&[Effect<A>])>;

/// Fluent API for testing reducers with Given-When-Then syntax
///
/// # Example
///
/// ```ignore
/// ReducerTest::new(HandoffReducer::new())
///     .with_env(environment())
///     .given_state(confirmed_booking())
///     .when_action(BookingAction::ConfirmReceipt { actor: renter })
///     .then_state(|state| assert!(state.booking().is_some_and(|b| b.item_received)))
///     .then_effects(|effects| assertions::assert_has_future_effect(effects))
///     .run();
/// ```
pub struct ReducerTest<R, S, A, E>
where
    R: Reducer<State = S, Action = A, Environment = E>,
{
    reducer: R,
    environment: Option<E>,
    initial_state: Option<S>,
    actions: Vec<A>,
    state_assertions: Vec<StateAssertion<S>>,
    effect_assertions: Vec<EffectAssertion<A>>,
}

impl<R, S, A, E> ReducerTest<R, S, A, E>
where
    R: Reducer<State = S, Action = A, Environment = E>,
{
    /// Create a new reducer test with the given reducer
    #[must_use]
    pub const fn new(reducer: R) -> Self {
        Self {
            reducer,
            environment: None,
            initial_state: None,
            actions: Vec::new(),
            state_assertions: Vec::new(),
            effect_assertions: Vec::new(),
        }
    }

    /// Set the environment for the test
    #[must_use]
    pub fn with_env(mut self, env: E) -> Self {
        self.environment = Some(env);
        self
    }

    /// Set the initial state (Given)
    #[must_use]
    pub fn given_state(mut self, state: S) -> Self {
        self.initial_state = Some(state);
        self
    }

    /// Add an action to reduce (When)
    ///
    /// May be called repeatedly; actions are reduced in order.
    #[must_use]
    pub fn when_action(mut self, action: A) -> Self {
        self.actions.push(action);
        self
    }

    /// Add several actions to reduce in order (When)
    #[must_use]
    pub fn when_actions(mut self, actions: impl IntoIterator<Item = A>) -> Self {
        self.actions.extend(actions);
        self
    }

    /// Add an assertion about the final state (Then)
    #[must_use]
    pub fn then_state<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&S) + 'static,
    {
        self.state_assertions.push(Box::new(assertion));
        self
    }

    /// Add an assertion about the effects of the last action (Then)
    #[must_use]
    pub fn then_effects<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&[Effect<A>]) + 'static,
    {
        self.effect_assertions.push(Box::new(assertion));
        self
    }

    /// Run the test and execute all assertions
    ///
    /// # Panics
    ///
    /// Panics if initial state, environment or at least one action is not
    /// set, or if any assertion fails.
    #[allow(clippy::panic)] // Test code can panic
    #[allow(clippy::expect_used)] // Test code can use expect
    pub fn run(self) {
        let mut state = self
            .initial_state
            .expect("Initial state must be set with given_state()");
        let env = self
            .environment
            .expect("Environment must be set with with_env()");
        assert!(
            !self.actions.is_empty(),
            "At least one action must be set with when_action()"
        );

        let mut effects = Vec::new();
        for action in self.actions {
            effects = self.reducer.reduce(&mut state, action, &env).into_vec();
        }

        for assertion in self.state_assertions {
            assertion(&state);
        }
        for assertion in self.effect_assertions {
            assertion(&effects);
        }
    }
}

/// Helper assertions for effects
pub mod assertions {
    use campus_rental_core::effect::Effect;

    /// Assert that there are no effects (or only no-op effects)
    ///
    /// # Panics
    ///
    /// Panics if any effect does real work.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_no_effects<A: std::fmt::Debug>(effects: &[Effect<A>]) {
        assert!(
            effects.iter().all(Effect::is_noop),
            "Expected no effects, but found {}: {:?}",
            effects.len(),
            effects
        );
    }

    /// Assert the number of effects
    ///
    /// # Panics
    ///
    /// Panics if the number of effects doesn't match expected.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_effects_count<A>(effects: &[Effect<A>], expected: usize) {
        assert_eq!(
            effects.len(),
            expected,
            "Expected {} effects, but found {}",
            expected,
            effects.len()
        );
    }

    /// Assert that effects contain at least one Future effect, searching
    /// inside `Parallel` and `Sequential` groups
    ///
    /// # Panics
    ///
    /// Panics if no Future effect is found.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_has_future_effect<A>(effects: &[Effect<A>]) {
        assert!(
            count_futures(effects) > 0,
            "Expected at least one Future effect, but none found"
        );
    }

    /// Count Future effects, including those nested in groups
    #[must_use]
    pub fn count_futures<A>(effects: &[Effect<A>]) -> usize {
        effects
            .iter()
            .map(|effect| match effect {
                Effect::Future(_) => 1,
                Effect::Parallel(inner) | Effect::Sequential(inner) => count_futures(inner),
                Effect::None | Effect::Delay { .. } => 0,
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use campus_rental_core::{SmallVec, smallvec};

    #[derive(Clone, Debug)]
    struct LockerState {
        deposits: u32,
    }

    #[derive(Clone, Debug)]
    enum LockerAction {
        Deposit,
        Collect,
        Remind,
    }

    struct LockerReducer;

    struct LockerEnv;

    impl Reducer for LockerReducer {
        type State = LockerState;
        type Action = LockerAction;
        type Environment = LockerEnv;

        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            _env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]> {
            match action {
                LockerAction::Deposit => {
                    state.deposits += 1;
                    smallvec![Effect::None]
                },
                LockerAction::Collect => {
                    state.deposits = state.deposits.saturating_sub(1);
                    smallvec![Effect::None]
                },
                LockerAction::Remind => smallvec![Effect::merge(vec![
                    Effect::future(async { None }),
                    Effect::chain(vec![Effect::future(async { None })]),
                ])],
            }
        }
    }

    #[test]
    fn single_action_updates_state() {
        ReducerTest::new(LockerReducer)
            .with_env(LockerEnv)
            .given_state(LockerState { deposits: 0 })
            .when_action(LockerAction::Deposit)
            .then_state(|state| assert_eq!(state.deposits, 1))
            .then_effects(|effects| assertions::assert_no_effects(effects))
            .run();
    }

    #[test]
    fn actions_are_reduced_in_order() {
        ReducerTest::new(LockerReducer)
            .with_env(LockerEnv)
            .given_state(LockerState { deposits: 0 })
            .when_actions([LockerAction::Deposit, LockerAction::Deposit, LockerAction::Collect])
            .then_state(|state| assert_eq!(state.deposits, 1))
            .run();
    }

    #[test]
    fn effect_assertions_see_only_the_last_action() {
        ReducerTest::new(LockerReducer)
            .with_env(LockerEnv)
            .given_state(LockerState { deposits: 2 })
            .when_action(LockerAction::Remind)
            .when_action(LockerAction::Collect)
            .then_effects(|effects| assertions::assert_effects_count(effects, 1))
            .run();
    }

    #[test]
    fn nested_futures_are_counted() {
        ReducerTest::new(LockerReducer)
            .with_env(LockerEnv)
            .given_state(LockerState { deposits: 0 })
            .when_action(LockerAction::Remind)
            .then_effects(|effects| {
                assertions::assert_has_future_effect(effects);
                assert_eq!(assertions::count_futures(effects), 2);
            })
            .run();
    }
}
