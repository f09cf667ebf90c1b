//! Payment settlement and the per-booking payment session.
//!
//! [`PaymentService::process_payment`] owns the whole attempt: pre-checks,
//! the gateway charge and the settlement commit. The commit writes the
//! ledger row and the booking update together, conditional on the booking
//! revision read just before it, so two concurrent attempts on the same
//! booking can never both record a success.
//!
//! [`PaymentSession`] is what a payment screen holds. It runs attempts
//! through a [`Store`] so the phase (idle, processing, success, failed) is
//! observable and a second `pay` while one is in flight is refused.

use super::ledger::NewTransaction;
use super::read_with_retry;
use crate::aggregates::payment_session::{
    PaymentPhase, PaymentProcessor, PaymentSessionAction, PaymentSessionEnvironment,
    PaymentSessionReducer, PaymentSessionState, ProcessFuture,
};
use crate::error::{RentalError, RentalResult};
use crate::notifications::{NotificationCenter, NotificationDraft};
use crate::payment_gateway::{GatewayReceipt, PaymentGateway};
use crate::store::{DocumentStore, DocumentStoreError};
use crate::types::{
    Booking, BookingId, BookingStatus, Money, PaymentMethod, PaymentOutcome, TransactionStatus,
    UserId,
};
use campus_rental_core::environment::Clock;
use campus_rental_runtime::retry::RetryPolicy;
use campus_rental_runtime::{Store, StoreError};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Commit attempts before giving up on a booking that keeps changing
const MAX_COMMIT_ATTEMPTS: usize = 3;

/// Shown when the gateway declined
pub const DECLINED_MESSAGE: &str = "Payment failed. Please try again.";

/// Shown when the charge went through but could not be recorded
pub const UNRECORDED_MESSAGE: &str = "Something went wrong. Please retry.";

// ============================================================================
// Service
// ============================================================================

/// Charges bookings and records the outcome
#[derive(Clone)]
pub struct PaymentService {
    store: Arc<dyn DocumentStore>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<NotificationCenter>,
    clock: Arc<dyn Clock>,
    read_policy: RetryPolicy,
}

impl PaymentService {
    /// Creates a new `PaymentService`
    #[must_use]
    pub fn new(
        store: Arc<dyn DocumentStore>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<NotificationCenter>,
        clock: Arc<dyn Clock>,
        read_policy: RetryPolicy,
    ) -> Self {
        Self {
            store,
            gateway,
            notifier,
            clock,
            read_policy,
        }
    }

    /// Charge `amount` for a booking and settle the result.
    ///
    /// A declined charge is an `Ok` outcome with status `Failed`; the booking
    /// goes back to pending and can be paid again.
    ///
    /// # Errors
    ///
    /// Refused before any ledger row is written when:
    /// - `payer` is not the booking's renter ([`RentalError::State`])
    /// - the booking is already paid, or is neither pending nor approved
    ///   ([`RentalError::State`])
    /// - `amount` differs from the booking total ([`RentalError::Validation`])
    /// - the booking does not exist ([`RentalError::NotFound`])
    #[tracing::instrument(skip(self, payer), fields(payer = %payer))]
    pub async fn process_payment(
        &self,
        booking_id: BookingId,
        payer: &UserId,
        amount: Money,
        method: PaymentMethod,
    ) -> RentalResult<PaymentOutcome> {
        let booking = self.load(booking_id).await?;
        Self::validate_payment(&booking, payer, amount)?;

        metrics::counter!("payments.attempts").increment(1);
        let receipt = self.gateway.charge(booking_id, amount, method).await;

        self.settle(booking_id, payer, amount, method, receipt).await
    }

    async fn load(&self, booking_id: BookingId) -> RentalResult<Booking> {
        let store = &self.store;
        read_with_retry(&self.read_policy, "get_booking", || store.get_booking(booking_id))
            .await?
            .ok_or_else(|| RentalError::not_found("booking", booking_id))
    }

    fn validate_payment(booking: &Booking, payer: &UserId, amount: Money) -> RentalResult<()> {
        if payer != &booking.renter_id {
            return Err(RentalError::state("Only the renter can pay for this booking"));
        }
        Self::validate_payable(booking)?;
        if amount != booking.total_price {
            return Err(RentalError::validation(format!(
                "Amount {amount} does not match the booking total {}",
                booking.total_price
            )));
        }
        Ok(())
    }

    fn validate_payable(booking: &Booking) -> RentalResult<()> {
        booking.payment_refusal().map_or(Ok(()), |refusal| Err(RentalError::state(refusal)))
    }

    async fn settle(
        &self,
        booking_id: BookingId,
        payer: &UserId,
        amount: Money,
        method: PaymentMethod,
        receipt: GatewayReceipt,
    ) -> RentalResult<PaymentOutcome> {
        let status = if receipt.approved {
            TransactionStatus::Success
        } else {
            TransactionStatus::Failed
        };

        for attempt in 1..=MAX_COMMIT_ATTEMPTS {
            // The booking may have moved while the gateway was charging
            let booking = self.load(booking_id).await?;
            if let Some(refusal) = booking.payment_refusal() {
                metrics::counter!("payments.refused_at_commit").increment(1);
                tracing::warn!(
                    %booking_id,
                    %payer,
                    reference_id = %receipt.reference_id,
                    approved = receipt.approved,
                    refusal,
                    "Booking no longer payable at commit"
                );
                return Err(RentalError::state(format!(
                    "{refusal} (payment reference {})",
                    receipt.reference_id
                )));
            }

            let now = self.clock.now();
            let transaction =
                NewTransaction::from_booking(&booking, amount, method, status, receipt.reference_id.clone())
                    .stamp(now);
            let transaction_id = transaction.id;
            let expected_revision = booking.revision;

            let mut updated = booking;
            updated.payment_status = status.into();
            updated.payment_method = Some(method);
            updated.updated_at = now;
            if receipt.approved {
                updated.status = BookingStatus::Confirmed;
                updated.transaction_id = Some(transaction_id);
                updated.chat_enabled = true;
            } else {
                updated.status = BookingStatus::Pending;
            }

            match self.store.commit_payment(transaction, updated, expected_revision).await {
                Ok(stored) => {
                    metrics::counter!(
                        "payments.settled",
                        "outcome" => if receipt.approved { "success" } else { "failed" }
                    )
                    .increment(1);
                    tracing::info!(
                        %booking_id,
                        %transaction_id,
                        reference_id = %receipt.reference_id,
                        approved = receipt.approved,
                        "Payment settled"
                    );

                    let mut warnings = Vec::new();
                    if receipt.approved {
                        let draft = NotificationDraft::payment_received(&stored, amount);
                        if let Err(error) = self.notifier.post(draft).await {
                            warnings.push(format!("Notification could not be sent: {error}"));
                        }
                    }

                    return Ok(PaymentOutcome {
                        status,
                        reference_id: Some(receipt.reference_id),
                        transaction_id: Some(transaction_id),
                        message: (!receipt.approved).then(|| DECLINED_MESSAGE.to_string()),
                        warnings,
                    });
                },
                Err(DocumentStoreError::RevisionMismatch { expected, actual, .. }) => {
                    metrics::counter!("payments.commit_conflicts").increment(1);
                    tracing::warn!(%booking_id, attempt, expected, actual, "Booking changed during payment, re-reading");
                },
                Err(error) => {
                    metrics::counter!("payments.unrecorded").increment(1);
                    tracing::error!(
                        %booking_id,
                        reference_id = %receipt.reference_id,
                        approved = receipt.approved,
                        %error,
                        "Payment could not be recorded"
                    );
                    return Ok(PaymentOutcome {
                        status: TransactionStatus::Failed,
                        reference_id: Some(receipt.reference_id),
                        transaction_id: None,
                        message: Some(UNRECORDED_MESSAGE.to_string()),
                        warnings: Vec::new(),
                    });
                },
            }
        }

        Err(RentalError::state(
            "The booking was changed by someone else. Please refresh and try again.",
        ))
    }
}

impl PaymentProcessor for PaymentService {
    fn process(
        &self,
        booking_id: BookingId,
        payer: UserId,
        amount: Money,
        method: PaymentMethod,
    ) -> ProcessFuture {
        let service = self.clone();
        Box::pin(async move { service.process_payment(booking_id, &payer, amount, method).await })
    }
}

// ============================================================================
// Session
// ============================================================================

type SessionStore =
    Store<PaymentSessionState, PaymentSessionAction, PaymentSessionEnvironment, PaymentSessionReducer>;

/// Payment screen state for one booking and one payer
pub struct PaymentSession {
    store: SessionStore,
    payer: UserId,
    next_attempt: AtomicU64,
    wait_timeout: Duration,
}

impl PaymentSession {
    /// Open a session on `booking_id` for `payer`
    #[must_use]
    pub fn new(
        booking_id: BookingId,
        payer: UserId,
        processor: Arc<dyn PaymentProcessor>,
        wait_timeout: Duration,
    ) -> Self {
        Self {
            store: Store::new(
                PaymentSessionState::new(booking_id),
                PaymentSessionReducer::new(),
                PaymentSessionEnvironment::new(processor),
            ),
            payer,
            next_attempt: AtomicU64::new(1),
            wait_timeout,
        }
    }

    /// Pay and wait for the attempt to settle.
    ///
    /// The attempt keeps running if the caller stops waiting.
    ///
    /// # Errors
    ///
    /// - [`RentalError::State`] if an attempt is already in flight, or the
    ///   attempt did not settle within the wait timeout
    /// - whatever [`PaymentService::process_payment`] refused with
    pub async fn pay(&self, amount: Money, method: PaymentMethod) -> RentalResult<PaymentOutcome> {
        let attempt = self.next_attempt.fetch_add(1, Ordering::Relaxed);
        let answer = self
            .store
            .send_and_wait_for(
                PaymentSessionAction::Pay {
                    attempt,
                    payer: self.payer.clone(),
                    amount,
                    method,
                },
                move |action| action.answers() == Some(attempt),
                self.wait_timeout,
            )
            .await
            .map_err(session_error)?;

        match answer {
            PaymentSessionAction::Settled { outcome, .. } => Ok(outcome),
            PaymentSessionAction::Refused { error, .. } | PaymentSessionAction::PayRejected { error, .. } => {
                Err(error)
            },
            other => Err(RentalError::state(format!("Unexpected payment answer: {other:?}"))),
        }
    }

    /// Return to idle after a settled attempt.
    ///
    /// # Errors
    ///
    /// [`RentalError::State`] while an attempt is in flight.
    pub async fn reset(&self) -> RentalResult<()> {
        let _ = self.store.send(PaymentSessionAction::Reset).await.map_err(session_error)?;
        match self.store.state(|s| (s.phase, s.last_error.clone())).await {
            (PaymentPhase::Processing, Some(error)) => Err(error),
            _ => Ok(()),
        }
    }

    /// Current phase
    pub async fn phase(&self) -> PaymentPhase {
        self.store.state(|s| s.phase).await
    }

    /// Copy of the whole session state
    pub async fn snapshot(&self) -> PaymentSessionState {
        self.store.state(PaymentSessionState::clone).await
    }
}

fn session_error(error: StoreError) -> RentalError {
    match error {
        StoreError::Timeout => RentalError::state(
            "Payment is still processing. Check your transactions before trying again.",
        ),
        StoreError::ShutdownInProgress | StoreError::ShutdownTimeout(_) | StoreError::ChannelClosed => {
            RentalError::state(format!("Payment session closed: {error}"))
        },
    }
}
