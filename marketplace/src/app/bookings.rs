//! Booking service: load, reduce, persist, then run side effects.
//!
//! Every transition is a single conditional write keyed on the booking
//! revision read just before reducing. If another writer got there first the
//! booking is re-read and the command reduced again, so a precondition that
//! no longer holds surfaces as a [`RentalError::State`].

use super::read_with_retry;
use crate::aggregates::{BookingAction, BookingEnvironment, BookingReducer, BookingState, booking_reducer};
use crate::error::{RentalError, RentalResult};
use crate::store::{DocumentStore, DocumentStoreError};
use crate::types::{Booking, BookingId, BookingStatus, ItemId, UserId, UserProfile};
use campus_rental_core::effect::Effect;
use campus_rental_core::reducer::Reducer;
use campus_rental_runtime::executor::run_effects;
use campus_rental_runtime::retry::RetryPolicy;
use chrono::NaiveDate;
use std::sync::Arc;

/// Re-reads allowed when a conditional write loses a race
const MAX_WRITE_ATTEMPTS: usize = 3;

/// A persisted transition plus any best-effort follow-up that failed
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BookingUpdate {
    /// The booking as stored
    pub booking: Booking,
    /// Side effects that did not go through (notification, item release)
    pub warnings: Vec<String>,
}

/// Booking lifecycle and handoff operations
pub struct BookingService {
    store: Arc<dyn DocumentStore>,
    environment: BookingEnvironment,
    reducer: BookingReducer,
    read_policy: RetryPolicy,
}

impl BookingService {
    /// Creates a new `BookingService`
    #[must_use]
    pub fn new(environment: BookingEnvironment, read_policy: RetryPolicy) -> Self {
        Self {
            store: Arc::clone(&environment.store),
            environment,
            reducer: booking_reducer(),
            read_policy,
        }
    }

    /// Fetch a booking
    ///
    /// # Errors
    ///
    /// [`RentalError::NotFound`] if it does not exist, or
    /// [`RentalError::TransientStore`] once read retries are exhausted.
    pub async fn get(&self, booking_id: BookingId) -> RentalResult<Booking> {
        let store = &self.store;
        read_with_retry(&self.read_policy, "get_booking", || store.get_booking(booking_id))
            .await?
            .ok_or_else(|| RentalError::not_found("booking", booking_id))
    }

    /// Create a pending booking of `item_id` for `renter`.
    ///
    /// # Errors
    ///
    /// - [`RentalError::Validation`] for missing or reversed dates, the
    ///   renter's own item, or an unusable item
    /// - [`RentalError::Conflict`] if the renter already holds a blocking
    ///   booking for the item
    /// - [`RentalError::NotFound`] if the item does not exist
    #[tracing::instrument(skip(self, renter), fields(renter_id = %renter.id))]
    pub async fn create_booking(
        &self,
        renter: &UserProfile,
        item_id: ItemId,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> RentalResult<Booking> {
        let store = &self.store;
        let item = read_with_retry(&self.read_policy, "get_item", || store.get_item(item_id))
            .await?
            .ok_or_else(|| RentalError::not_found("item", item_id))?;
        let existing = read_with_retry(&self.read_policy, "bookings_for_item_and_renter", || {
            store.bookings_for_item_and_renter(item_id, renter.id.clone())
        })
        .await?;

        let mut state = BookingState::default();
        let effects = self.reducer.reduce(
            &mut state,
            BookingAction::CreateBooking {
                booking_id: BookingId::new(),
                renter: renter.clone(),
                item: Box::new(item),
                start_date,
                end_date,
                existing,
            },
            &self.environment,
        );
        if let Some(error) = state.last_error.take() {
            metrics::counter!("bookings.rejected", "operation" => "create").increment(1);
            return Err(error);
        }
        let booking = state
            .booking
            .take()
            .ok_or_else(|| RentalError::state("Booking was not created"))?;

        let stored = self.store.insert_booking(booking).await.map_err(|error| {
            tracing::error!(%error, "Booking insert failed");
            RentalError::from(error)
        })?;
        metrics::counter!("bookings.created").increment(1);

        for warning in self.settle_effects(&mut state, effects).await {
            tracing::warn!(booking_id = %stored.id, %warning, "Booking created with a failed follow-up");
        }
        Ok(stored)
    }

    /// Provider approves (`Confirmed`) or rejects (`Cancelled`) a pending booking.
    ///
    /// # Errors
    ///
    /// [`RentalError::State`] unless the booking is pending and `actor` is
    /// its provider.
    pub async fn set_status(
        &self,
        booking_id: BookingId,
        actor: &UserId,
        status: BookingStatus,
    ) -> RentalResult<BookingUpdate> {
        self.transition(booking_id, "set_status", || BookingAction::SetStatus {
            actor: actor.clone(),
            status,
        })
        .await
    }

    /// Renter confirms they have the item.
    ///
    /// # Errors
    ///
    /// [`RentalError::State`] unless the booking is paid, confirmed and not
    /// yet received.
    pub async fn confirm_receipt(&self, booking_id: BookingId, actor: &UserId) -> RentalResult<BookingUpdate> {
        self.transition(booking_id, "confirm_receipt", || BookingAction::ConfirmReceipt {
            actor: actor.clone(),
        })
        .await
    }

    /// Renter asks the provider to collect the item.
    ///
    /// # Errors
    ///
    /// [`RentalError::State`] unless the item was received and no return
    /// was requested yet.
    pub async fn request_return(&self, booking_id: BookingId, actor: &UserId) -> RentalResult<BookingUpdate> {
        self.transition(booking_id, "request_return", || BookingAction::RequestReturn {
            actor: actor.clone(),
        })
        .await
    }

    /// Provider confirms the item is back; the booking completes and the
    /// item is listed again.
    ///
    /// # Errors
    ///
    /// [`RentalError::State`] unless a return was requested and the booking
    /// is not already completed.
    pub async fn confirm_return(&self, booking_id: BookingId, actor: &UserId) -> RentalResult<BookingUpdate> {
        self.transition(booking_id, "confirm_return", || BookingAction::ConfirmReturn {
            actor: actor.clone(),
        })
        .await
    }

    /// Bookings made by `renter`, newest first
    ///
    /// # Errors
    ///
    /// [`RentalError::TransientStore`] once read retries are exhausted.
    pub async fn by_renter(&self, renter: &UserId) -> RentalResult<Vec<Booking>> {
        let store = &self.store;
        let mut bookings = read_with_retry(&self.read_policy, "bookings_by_renter", || {
            store.bookings_by_renter(renter.clone())
        })
        .await?;
        newest_first(&mut bookings);
        Ok(bookings)
    }

    /// Bookings of items owned by `provider`, newest first
    ///
    /// # Errors
    ///
    /// [`RentalError::TransientStore`] once read retries are exhausted.
    pub async fn by_provider(&self, provider: &UserId) -> RentalResult<Vec<Booking>> {
        let store = &self.store;
        let mut bookings = read_with_retry(&self.read_policy, "bookings_by_provider", || {
            store.bookings_by_provider(provider.clone())
        })
        .await?;
        newest_first(&mut bookings);
        Ok(bookings)
    }

    async fn transition<F>(
        &self,
        booking_id: BookingId,
        operation: &'static str,
        command: F,
    ) -> RentalResult<BookingUpdate>
    where
        F: Fn() -> BookingAction,
    {
        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let booking = self.get(booking_id).await?;
            let expected_revision = booking.revision;

            let mut state = BookingState::loaded(booking);
            let effects = self.reducer.reduce(&mut state, command(), &self.environment);
            if let Some(error) = state.last_error.take() {
                metrics::counter!("bookings.rejected", "operation" => operation).increment(1);
                return Err(error);
            }
            let updated = state
                .booking
                .clone()
                .ok_or_else(|| RentalError::not_found("booking", booking_id))?;

            match self.store.update_booking(updated, expected_revision).await {
                Ok(stored) => {
                    metrics::counter!("bookings.transitions", "operation" => operation).increment(1);
                    tracing::debug!(%booking_id, operation, revision = stored.revision, "Booking persisted");

                    let warnings = self.settle_effects(&mut state, effects).await;
                    return Ok(BookingUpdate {
                        booking: stored,
                        warnings,
                    });
                },
                Err(DocumentStoreError::RevisionMismatch { expected, actual, .. }) => {
                    metrics::counter!("bookings.write_conflicts").increment(1);
                    tracing::warn!(%booking_id, operation, attempt, expected, actual, "Booking changed underneath, re-reading");
                },
                Err(error) => {
                    tracing::error!(%booking_id, operation, %error, "Booking update failed");
                    return Err(error.into());
                },
            }
        }

        Err(RentalError::state(
            "The booking was changed by someone else. Please refresh and try again.",
        ))
    }
}

impl BookingService {
    /// Run follow-up effects and fold their feedback into `state`, returning
    /// the warnings collected so far
    async fn settle_effects<I>(&self, state: &mut BookingState, effects: I) -> Vec<String>
    where
        I: IntoIterator<Item = Effect<BookingAction>>,
    {
        for feedback in run_effects(effects).await {
            let _ = self.reducer.reduce(state, feedback, &self.environment);
        }
        std::mem::take(&mut state.warnings)
    }
}

fn newest_first(bookings: &mut [Booking]) {
    bookings.reverse();
    bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::testkit::{self, date};
    use crate::types::{Money, PaymentStatus};

    async fn service() -> (BookingService, testkit::Harness) {
        let harness = testkit::harness();
        let env = BookingEnvironment::new(
            Arc::clone(&harness.clock),
            harness.store.clone(),
            Arc::clone(&harness.notifier),
        );
        (BookingService::new(env, RetryPolicy::no_retry()), harness)
    }

    #[tokio::test]
    async fn failed_follow_ups_are_collected_as_warnings() {
        let (service, _harness) = service().await;
        let mut state = BookingState::loaded(testkit::booking());
        let effects = vec![
            Effect::future(async {
                Some(BookingAction::SideEffectFailed {
                    warning: "bell offline".to_string(),
                })
            }),
            Effect::None,
        ];

        let warnings = service.settle_effects(&mut state, effects).await;

        assert_eq!(warnings, vec!["bell offline".to_string()]);
        assert!(state.warnings.is_empty());
    }

    #[tokio::test]
    async fn create_persists_pending_booking() {
        let (service, harness) = service().await;
        let item = testkit::item();
        harness.store.insert_item(item.clone()).await.unwrap();

        let booking = service
            .create_booking(&testkit::renter(), item.id, Some(date(2025, 6, 1)), Some(date(2025, 6, 3)))
            .await
            .unwrap();

        assert_eq!(booking.total_price, Money::new(300));
        assert_eq!(booking.revision, 1);
        assert_eq!(service.get(booking.id).await.unwrap(), booking);
        assert!(harness.store.notifications_for_user(item.provider_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_item_is_not_found() {
        let (service, _harness) = service().await;
        let err = service
            .create_booking(&testkit::renter(), ItemId::new(), Some(date(2025, 6, 1)), Some(date(2025, 6, 1)))
            .await
            .unwrap_err();
        assert!(matches!(err, RentalError::NotFound { kind: "item", .. }));
    }

    #[tokio::test]
    async fn rejected_transitions_write_nothing() {
        let (service, harness) = service().await;
        let stored = harness.store.insert_booking(testkit::booking()).await.unwrap();

        let err = service
            .confirm_receipt(stored.id, &testkit::renter_id())
            .await
            .unwrap_err();

        assert!(matches!(err, RentalError::State(_)));
        assert_eq!(service.get(stored.id).await.unwrap(), stored);
    }

    #[tokio::test]
    async fn approval_notifies_renter() {
        let (service, harness) = service().await;
        let stored = harness.store.insert_booking(testkit::booking()).await.unwrap();

        let update = service
            .set_status(stored.id, &testkit::provider_id(), BookingStatus::Confirmed)
            .await
            .unwrap();

        assert_eq!(update.booking.status, BookingStatus::Confirmed);
        assert_eq!(update.booking.payment_status, PaymentStatus::Pending);
        assert_eq!(update.booking.revision, 2);
        assert!(update.warnings.is_empty());

        let inbox = harness.notifier.list_for_user(&testkit::renter_id()).await.unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].title, "Booking approved");
        assert_eq!(inbox[0].metadata.booking_id, Some(stored.id));
    }

    #[tokio::test]
    async fn failed_notification_is_a_warning_not_a_rollback() {
        let (service, harness) = service().await;
        let stored = harness.store.insert_booking(testkit::paid_booking()).await.unwrap();
        harness.store.fail_notification_writes(true);

        let update = service
            .confirm_receipt(stored.id, &testkit::renter_id())
            .await
            .unwrap();

        assert_eq!(update.booking.status, BookingStatus::Active);
        assert_eq!(update.warnings.len(), 1);
        assert!(update.warnings[0].starts_with("Notification could not be sent"));
    }

    #[tokio::test]
    async fn store_write_failures_surface() {
        let (service, harness) = service().await;
        let stored = harness.store.insert_booking(testkit::booking()).await.unwrap();
        harness.store.fail_next_writes(1);

        let err = service
            .set_status(stored.id, &testkit::provider_id(), BookingStatus::Cancelled)
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(service.get(stored.id).await.unwrap().status, BookingStatus::Pending);
    }
}
