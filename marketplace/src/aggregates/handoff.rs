//! Handoff and return workflow.
//!
//! ```text
//! confirmed + paid --ConfirmReceipt (renter)--> active, itemReceived
//! active           --RequestReturn  (renter)--> returnRequested
//! returnRequested  --ConfirmReturn  (provider)-> completed, itemReturned, chat closed
//! ```
//!
//! Confirming a return also puts the item back on the market. That write is
//! best-effort: if it fails the booking still completes and the caller gets
//! a warning.

use super::booking::{
    BookingAction, BookingEnvironment, BookingState, notify, reject, require_booking,
};
use crate::error::RentalError;
use crate::notifications::NotificationDraft;
use crate::types::{Booking, BookingStatus, PaymentStatus, UserId};
use campus_rental_core::{effect::Effect, reducer::Reducer};
use smallvec::{SmallVec, smallvec};
use std::sync::Arc;

/// Receipt and return transitions
#[derive(Clone, Debug)]
pub struct HandoffReducer;

impl HandoffReducer {
    /// Creates a new `HandoffReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn validate_receipt(booking: &Booking, actor: &UserId) -> Result<(), RentalError> {
        if actor != &booking.renter_id {
            return Err(RentalError::state("Only the renter can confirm receipt"));
        }
        if booking.payment_status != PaymentStatus::Success {
            return Err(RentalError::state("Complete payment before confirming receipt"));
        }
        if booking.item_received {
            return Err(RentalError::state("Item already marked as received"));
        }
        if booking.status != BookingStatus::Confirmed {
            return Err(RentalError::state(format!(
                "Only confirmed bookings can be marked as received (this one is {})",
                booking.status
            )));
        }
        Ok(())
    }

    fn validate_return_request(booking: &Booking, actor: &UserId) -> Result<(), RentalError> {
        if actor != &booking.renter_id {
            return Err(RentalError::state("Only the renter can request a return"));
        }
        if !booking.item_received {
            return Err(RentalError::state("Confirm receipt before requesting a return"));
        }
        if booking.return_requested {
            return Err(RentalError::state("Return already requested"));
        }
        Ok(())
    }

    fn validate_return_confirmation(booking: &Booking, actor: &UserId) -> Result<(), RentalError> {
        if actor != &booking.provider_id {
            return Err(RentalError::state("Only the lender can confirm the return"));
        }
        if booking.status == BookingStatus::Completed {
            return Err(RentalError::state("Return already confirmed"));
        }
        if !booking.return_requested {
            return Err(RentalError::state("The renter has not requested a return yet"));
        }
        Ok(())
    }

    /// Put the item back on the market; failure becomes a warning
    fn release_item(env: &BookingEnvironment, booking: &Booking) -> Effect<BookingAction> {
        let store = Arc::clone(&env.store);
        let item_id = booking.item_id;
        let at = env.clock.now();
        Effect::future(async move {
            match store.set_item_available(item_id, true, at).await {
                Ok(()) => {
                    tracing::info!(%item_id, "Item available again");
                    None
                },
                Err(error) => {
                    tracing::warn!(%item_id, %error, "Item could not be released");
                    metrics::counter!("handoff.item_release.failed").increment(1);
                    Some(BookingAction::SideEffectFailed {
                        warning: format!(
                            "Return confirmed, but the item could not be marked available: {error}"
                        ),
                    })
                },
            }
        })
    }
}

impl Default for HandoffReducer {
    fn default() -> Self {
        Self::new()
    }
}

impl Reducer for HandoffReducer {
    type State = BookingState;
    type Action = BookingAction;
    type Environment = BookingEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            BookingAction::ConfirmReceipt { actor } => {
                let checked = require_booking(state)
                    .and_then(|booking| Self::validate_receipt(booking, &actor));
                if let Err(error) = checked {
                    return reject(state, error);
                }

                state.apply(&BookingAction::ReceiptConfirmed {
                    at: env.clock.now(),
                });
                let Some(booking) = state.booking() else {
                    return SmallVec::new();
                };
                tracing::info!(booking_id = %booking.id, "Item received");
                smallvec![notify(env, NotificationDraft::item_handed_over(booking))]
            },

            BookingAction::RequestReturn { actor } => {
                let checked = require_booking(state)
                    .and_then(|booking| Self::validate_return_request(booking, &actor));
                if let Err(error) = checked {
                    return reject(state, error);
                }

                state.apply(&BookingAction::ReturnRequested {
                    at: env.clock.now(),
                });
                let Some(booking) = state.booking() else {
                    return SmallVec::new();
                };
                tracing::info!(booking_id = %booking.id, "Return requested");
                smallvec![notify(env, NotificationDraft::return_requested(booking))]
            },

            BookingAction::ConfirmReturn { actor } => {
                let checked = require_booking(state)
                    .and_then(|booking| Self::validate_return_confirmation(booking, &actor));
                if let Err(error) = checked {
                    return reject(state, error);
                }

                state.apply(&BookingAction::ReturnConfirmed {
                    at: env.clock.now(),
                });
                let Some(booking) = state.booking() else {
                    return SmallVec::new();
                };
                tracing::info!(booking_id = %booking.id, "Return confirmed, booking completed");
                smallvec![Effect::chain(vec![
                    Self::release_item(env, booking),
                    notify(env, NotificationDraft::return_confirmed(booking)),
                ])]
            },

            // Everything else belongs to the lifecycle reducer
            _ => SmallVec::new(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::testkit;
    use campus_rental_testing::{ReducerTest, assertions};

    fn env() -> BookingEnvironment {
        let harness = testkit::harness();
        BookingEnvironment::new(harness.clock, harness.store, harness.notifier)
    }

    fn received() -> Booking {
        Booking {
            status: BookingStatus::Active,
            item_received: true,
            ..testkit::paid_booking()
        }
    }

    #[test]
    fn receipt_before_payment_is_rejected() {
        let unpaid = testkit::booking();
        let expected = unpaid.clone();

        ReducerTest::new(HandoffReducer::new())
            .with_env(env())
            .given_state(BookingState::loaded(unpaid))
            .when_action(BookingAction::ConfirmReceipt {
                actor: testkit::renter_id(),
            })
            .then_state(move |state| {
                assert_eq!(state.booking(), Some(&expected));
                assert_eq!(
                    state.last_error,
                    Some(RentalError::state("Complete payment before confirming receipt"))
                );
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn receipt_activates_paid_booking() {
        ReducerTest::new(HandoffReducer::new())
            .with_env(env())
            .given_state(BookingState::loaded(testkit::paid_booking()))
            .when_action(BookingAction::ConfirmReceipt {
                actor: testkit::renter_id(),
            })
            .then_state(|state| {
                let booking = state.booking().unwrap();
                assert!(booking.item_received);
                assert_eq!(booking.status, BookingStatus::Active);
                assert!(booking.received_at.is_some());
            })
            .then_effects(|effects| assert_eq!(assertions::count_futures(effects), 1))
            .run();
    }

    #[test]
    fn only_the_renter_confirms_receipt() {
        ReducerTest::new(HandoffReducer::new())
            .with_env(env())
            .given_state(BookingState::loaded(testkit::paid_booking()))
            .when_action(BookingAction::ConfirmReceipt {
                actor: testkit::provider_id(),
            })
            .then_state(|state| {
                assert!(!state.booking().unwrap().item_received);
                assert!(matches!(state.last_error, Some(RentalError::State(_))));
            })
            .run();
    }

    #[test]
    fn return_request_needs_receipt_and_happens_once() {
        ReducerTest::new(HandoffReducer::new())
            .with_env(env())
            .given_state(BookingState::loaded(testkit::paid_booking()))
            .when_action(BookingAction::RequestReturn {
                actor: testkit::renter_id(),
            })
            .then_state(|state| {
                assert!(!state.booking().unwrap().return_requested);
                assert!(state.last_error.is_some());
            })
            .run();

        ReducerTest::new(HandoffReducer::new())
            .with_env(env())
            .given_state(BookingState::loaded(received()))
            .when_actions([
                BookingAction::RequestReturn {
                    actor: testkit::renter_id(),
                },
                BookingAction::RequestReturn {
                    actor: testkit::renter_id(),
                },
            ])
            .then_state(|state| {
                let booking = state.booking().unwrap();
                assert!(booking.return_requested);
                assert!(booking.return_requested_at.is_some());
                assert_eq!(
                    state.last_error,
                    Some(RentalError::state("Return already requested"))
                );
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn confirming_return_completes_and_closes_chat() {
        let requested = Booking {
            return_requested: true,
            ..received()
        };

        ReducerTest::new(HandoffReducer::new())
            .with_env(env())
            .given_state(BookingState::loaded(requested))
            .when_action(BookingAction::ConfirmReturn {
                actor: testkit::provider_id(),
            })
            .then_state(|state| {
                let booking = state.booking().unwrap();
                assert_eq!(booking.status, BookingStatus::Completed);
                assert!(booking.return_confirmed);
                assert!(booking.item_returned);
                assert!(booking.return_requested);
                assert!(!booking.chat_enabled);
                assert!(booking.return_confirmed_at.is_some());
            })
            .then_effects(|effects| {
                assertions::assert_effects_count(effects, 1);
                assert!(matches!(effects[0], Effect::Sequential(_)));
                assert_eq!(assertions::count_futures(effects), 2);
            })
            .run();
    }

    #[test]
    fn return_cannot_be_confirmed_before_request_or_twice() {
        ReducerTest::new(HandoffReducer::new())
            .with_env(env())
            .given_state(BookingState::loaded(received()))
            .when_action(BookingAction::ConfirmReturn {
                actor: testkit::provider_id(),
            })
            .then_state(|state| {
                assert_eq!(state.booking().unwrap().status, BookingStatus::Active);
                assert!(matches!(state.last_error, Some(RentalError::State(_))));
            })
            .run();

        let completed = Booking {
            status: BookingStatus::Completed,
            return_requested: true,
            return_confirmed: true,
            item_returned: true,
            ..received()
        };
        ReducerTest::new(HandoffReducer::new())
            .with_env(env())
            .given_state(BookingState::loaded(completed))
            .when_action(BookingAction::ConfirmReturn {
                actor: testkit::provider_id(),
            })
            .then_state(|state| {
                assert_eq!(state.last_error, Some(RentalError::state("Return already confirmed")));
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }
}
