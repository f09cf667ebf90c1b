//! Client-side payment session for one booking.
//!
//! ```text
//! idle --Pay--> processing --Settled(success)--> success
//!                          --Settled(failed)---> failed
//!                          --Refused-----------> failed
//! any settled phase --Reset--> idle
//! ```
//!
//! Only one attempt may be in flight per session. A `Pay` that arrives
//! while processing is answered with `PayRejected` and changes nothing.
//! Every answer carries the attempt number of the `Pay` it belongs to, so a
//! waiting caller never picks up somebody else's result.

use crate::error::{RentalError, RentalResult};
use crate::types::{BookingId, Money, PaymentMethod, PaymentOutcome, UserId};
use campus_rental_core::{SmallVec, effect::Effect, reducer::Reducer, smallvec};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

// ============================================================================
// State
// ============================================================================

/// Where the session is
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PaymentPhase {
    /// Nothing attempted yet, or reset
    #[default]
    Idle,
    /// An attempt is in flight
    Processing,
    /// The last attempt was charged
    Success,
    /// The last attempt was declined or refused
    Failed,
}

/// Payment session state
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaymentSessionState {
    /// Booking being paid for
    pub booking_id: BookingId,
    /// Current phase
    pub phase: PaymentPhase,
    /// Reference of the last settled attempt
    pub reference_id: Option<String>,
    /// User-facing error of the last attempt
    pub error: Option<String>,
    /// Why the last command was rejected
    pub last_error: Option<RentalError>,
    /// Attempt currently in flight
    pub in_flight: Option<u64>,
    /// Attempts started in this session
    pub attempts: u32,
}

impl PaymentSessionState {
    /// Fresh session for a booking
    #[must_use]
    pub const fn new(booking_id: BookingId) -> Self {
        Self {
            booking_id,
            phase: PaymentPhase::Idle,
            reference_id: None,
            error: None,
            last_error: None,
            in_flight: None,
            attempts: 0,
        }
    }
}

// ============================================================================
// Actions (Commands + Events)
// ============================================================================

/// Actions for the payment session
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PaymentSessionAction {
    // Commands
    /// Start a payment attempt
    Pay {
        /// Caller-chosen attempt number
        attempt: u64,
        /// Paying user
        payer: UserId,
        /// Amount shown to the payer
        amount: Money,
        /// Chosen method
        method: PaymentMethod,
    },

    /// Return to idle after a settled attempt
    Reset,

    // Events
    /// The attempt settled, approved or declined
    Settled {
        /// Attempt number
        attempt: u64,
        /// Outcome reported by the payment service
        outcome: PaymentOutcome,
    },

    /// The payment service refused the attempt before charging
    Refused {
        /// Attempt number
        attempt: u64,
        /// Why
        error: RentalError,
    },

    /// `Pay` arrived while another attempt was in flight
    PayRejected {
        /// Attempt number of the rejected `Pay`
        attempt: u64,
        /// Why
        error: RentalError,
    },
}

impl PaymentSessionAction {
    /// Attempt number this action answers, if it is an answer
    #[must_use]
    pub const fn answers(&self) -> Option<u64> {
        match self {
            Self::Settled { attempt, .. }
            | Self::Refused { attempt, .. }
            | Self::PayRejected { attempt, .. } => Some(*attempt),
            Self::Pay { .. } | Self::Reset => None,
        }
    }
}

// ============================================================================
// Environment
// ============================================================================

/// Boxed future returned by [`PaymentProcessor::process`]
pub type ProcessFuture = Pin<Box<dyn Future<Output = RentalResult<PaymentOutcome>> + Send>>;

/// Runs one payment attempt end to end
pub trait PaymentProcessor: Send + Sync {
    /// Charge and settle one attempt for `booking_id`
    fn process(
        &self,
        booking_id: BookingId,
        payer: UserId,
        amount: Money,
        method: PaymentMethod,
    ) -> ProcessFuture;
}

/// Dependencies of the payment session
#[derive(Clone)]
pub struct PaymentSessionEnvironment {
    /// Settles attempts
    pub processor: Arc<dyn PaymentProcessor>,
}

impl PaymentSessionEnvironment {
    /// Creates a new `PaymentSessionEnvironment`
    #[must_use]
    pub fn new(processor: Arc<dyn PaymentProcessor>) -> Self {
        Self { processor }
    }
}

// ============================================================================
// Reducer
// ============================================================================

/// Reducer for the payment session
#[derive(Clone, Debug)]
pub struct PaymentSessionReducer;

impl PaymentSessionReducer {
    /// Creates a new `PaymentSessionReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Default for PaymentSessionReducer {
    fn default() -> Self {
        Self::new()
    }
}

impl Reducer for PaymentSessionReducer {
    type State = PaymentSessionState;
    type Action = PaymentSessionAction;
    type Environment = PaymentSessionEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            PaymentSessionAction::Pay {
                attempt,
                payer,
                amount,
                method,
            } => {
                if state.phase == PaymentPhase::Processing {
                    let error = RentalError::state("A payment for this booking is already in progress");
                    tracing::warn!(booking_id = %state.booking_id, attempt, "Concurrent payment rejected");
                    state.last_error = Some(error.clone());
                    // Answer through an effect so the waiting caller sees it
                    return smallvec![Effect::future(async move {
                        Some(PaymentSessionAction::PayRejected { attempt, error })
                    })];
                }

                state.phase = PaymentPhase::Processing;
                state.reference_id = None;
                state.error = None;
                state.last_error = None;
                state.in_flight = Some(attempt);
                state.attempts += 1;

                let processor = Arc::clone(&env.processor);
                let booking_id = state.booking_id;
                tracing::info!(%booking_id, attempt, %method, "Payment attempt started");

                smallvec![Effect::future(async move {
                    Some(match processor.process(booking_id, payer, amount, method).await {
                        Ok(outcome) => PaymentSessionAction::Settled { attempt, outcome },
                        Err(error) => PaymentSessionAction::Refused { attempt, error },
                    })
                })]
            },

            PaymentSessionAction::Settled { attempt, outcome } => {
                if state.in_flight == Some(attempt) {
                    state.phase = if outcome.succeeded() {
                        PaymentPhase::Success
                    } else {
                        PaymentPhase::Failed
                    };
                    state.reference_id.clone_from(&outcome.reference_id);
                    state.error.clone_from(&outcome.message);
                    state.in_flight = None;
                }
                SmallVec::new()
            },

            PaymentSessionAction::Refused { attempt, error } => {
                if state.in_flight == Some(attempt) {
                    state.phase = PaymentPhase::Failed;
                    state.error = Some(error.to_string());
                    state.last_error = Some(error);
                    state.in_flight = None;
                }
                SmallVec::new()
            },

            PaymentSessionAction::PayRejected { error, .. } => {
                state.last_error = Some(error);
                SmallVec::new()
            },

            PaymentSessionAction::Reset => {
                if state.phase == PaymentPhase::Processing {
                    state.last_error =
                        Some(RentalError::state("Cannot reset while a payment is in progress"));
                } else {
                    let booking_id = state.booking_id;
                    let attempts = state.attempts;
                    *state = PaymentSessionState {
                        attempts,
                        ..PaymentSessionState::new(booking_id)
                    };
                }
                SmallVec::new()
            },
        }
    }
}
