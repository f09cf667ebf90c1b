//! Booking aggregate: creation and provider decisions.
//!
//! Owns the shared [`BookingState`], [`BookingAction`] and
//! [`BookingEnvironment`] used by every booking reducer, and the
//! [`LifecycleReducer`] that handles `CreateBooking` and `SetStatus`.
//! Receipt and return live in [`HandoffReducer`](super::handoff::HandoffReducer).
//!
//! Reducers never touch storage. A service loads the booking, reduces a
//! command against it, persists the result with a conditional write and
//! only then runs the returned effects (notifications, item release).

use crate::error::RentalError;
use crate::notifications::{NotificationCenter, NotificationDraft};
use crate::store::DocumentStore;
use crate::types::{
    Booking, BookingId, BookingStatus, Item, NotificationId, PaymentStatus, RentalPeriod, UserId,
    UserProfile,
};
use campus_rental_core::{SmallVec, effect::Effect, environment::Clock, reducer::Reducer, smallvec};
use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;

// ============================================================================
// State
// ============================================================================

/// State of one booking while a command is processed
#[derive(Clone, Debug, Default)]
pub struct BookingState {
    /// The booking, once created or loaded
    pub booking: Option<Booking>,
    /// Why the last command was rejected
    pub last_error: Option<RentalError>,
    /// Non-fatal side-effect failures reported by effects
    pub warnings: Vec<String>,
}

impl BookingState {
    /// State holding a loaded booking
    #[must_use]
    pub const fn loaded(booking: Booking) -> Self {
        Self {
            booking: Some(booking),
            last_error: None,
            warnings: Vec::new(),
        }
    }

    /// The booking, if any
    #[must_use]
    pub const fn booking(&self) -> Option<&Booking> {
        self.booking.as_ref()
    }

    /// Apply an event or feedback action
    pub fn apply(&mut self, action: &BookingAction) {
        match action {
            BookingAction::BookingCreated { booking } => {
                self.booking = Some((**booking).clone());
                self.last_error = None;
            },
            BookingAction::StatusChanged { status, at } => {
                if let Some(booking) = self.booking.as_mut() {
                    booking.status = *status;
                    booking.updated_at = *at;
                }
                self.last_error = None;
            },
            BookingAction::ReceiptConfirmed { at } => {
                if let Some(booking) = self.booking.as_mut() {
                    booking.item_received = true;
                    booking.received_at = Some(*at);
                    booking.status = BookingStatus::Active;
                    booking.updated_at = *at;
                }
                self.last_error = None;
            },
            BookingAction::ReturnRequested { at } => {
                if let Some(booking) = self.booking.as_mut() {
                    booking.return_requested = true;
                    booking.return_requested_at = Some(*at);
                    booking.updated_at = *at;
                }
                self.last_error = None;
            },
            BookingAction::ReturnConfirmed { at } => {
                if let Some(booking) = self.booking.as_mut() {
                    booking.status = BookingStatus::Completed;
                    booking.return_confirmed = true;
                    booking.item_returned = true;
                    booking.return_confirmed_at = Some(*at);
                    booking.chat_enabled = false;
                    booking.updated_at = *at;
                }
                self.last_error = None;
            },
            BookingAction::ValidationFailed { error } => {
                self.last_error = Some(error.clone());
            },
            BookingAction::SideEffectFailed { warning } => {
                self.warnings.push(warning.clone());
            },
            BookingAction::NotificationSent { .. }
            | BookingAction::CreateBooking { .. }
            | BookingAction::SetStatus { .. }
            | BookingAction::ConfirmReceipt { .. }
            | BookingAction::RequestReturn { .. }
            | BookingAction::ConfirmReturn { .. } => {},
        }
    }
}

// ============================================================================
// Actions (Commands + Events)
// ============================================================================

/// Actions for the booking aggregate
#[derive(Clone, Debug, PartialEq)]
pub enum BookingAction {
    // Commands
    /// Request to rent an item
    CreateBooking {
        /// Id for the new booking
        booking_id: BookingId,
        /// Requesting renter
        renter: UserProfile,
        /// Item being booked
        item: Box<Item>,
        /// First day, if selected
        start_date: Option<NaiveDate>,
        /// Last day, if selected
        end_date: Option<NaiveDate>,
        /// The renter's existing bookings of this item
        existing: Vec<Booking>,
    },

    /// Provider approves (`Confirmed`) or rejects (`Cancelled`) a pending request
    SetStatus {
        /// Acting user
        actor: UserId,
        /// Requested status
        status: BookingStatus,
    },

    /// Renter confirms they have the item
    ConfirmReceipt {
        /// Acting user
        actor: UserId,
    },

    /// Renter asks the provider to collect the item
    RequestReturn {
        /// Acting user
        actor: UserId,
    },

    /// Provider confirms the item is back
    ConfirmReturn {
        /// Acting user
        actor: UserId,
    },

    // Events
    /// A booking was created
    BookingCreated {
        /// The new booking
        booking: Box<Booking>,
    },

    /// Status moved along the lifecycle
    StatusChanged {
        /// New status
        status: BookingStatus,
        /// When
        at: DateTime<Utc>,
    },

    /// Renter received the item
    ReceiptConfirmed {
        /// When
        at: DateTime<Utc>,
    },

    /// Renter requested the return
    ReturnRequested {
        /// When
        at: DateTime<Utc>,
    },

    /// Provider confirmed the return
    ReturnConfirmed {
        /// When
        at: DateTime<Utc>,
    },

    /// A command was rejected
    ValidationFailed {
        /// Why
        error: RentalError,
    },

    // Feedback from effects
    /// A notification was stored
    NotificationSent {
        /// Stored notification
        notification_id: NotificationId,
    },

    /// A best-effort side effect failed
    SideEffectFailed {
        /// What went wrong, for the caller
        warning: String,
    },
}

impl BookingAction {
    /// Whether this action is a command
    #[must_use]
    pub const fn is_command(&self) -> bool {
        matches!(
            self,
            Self::CreateBooking { .. }
                | Self::SetStatus { .. }
                | Self::ConfirmReceipt { .. }
                | Self::RequestReturn { .. }
                | Self::ConfirmReturn { .. }
        )
    }
}

// ============================================================================
// Environment
// ============================================================================

/// Dependencies of the booking reducers
#[derive(Clone)]
pub struct BookingEnvironment {
    /// Time source
    pub clock: Arc<dyn Clock>,
    /// Document store, for side effects only
    pub store: Arc<dyn DocumentStore>,
    /// Notification trigger
    pub notifier: Arc<NotificationCenter>,
}

impl BookingEnvironment {
    /// Creates a new `BookingEnvironment`
    #[must_use]
    pub fn new(
        clock: Arc<dyn Clock>,
        store: Arc<dyn DocumentStore>,
        notifier: Arc<NotificationCenter>,
    ) -> Self {
        Self {
            clock,
            store,
            notifier,
        }
    }

    /// Today's date according to the clock
    #[must_use]
    pub fn today(&self) -> NaiveDate {
        self.clock.now().date_naive()
    }
}

/// Effect that posts a notification and reports the outcome back
#[must_use]
pub fn notify(env: &BookingEnvironment, draft: NotificationDraft) -> Effect<BookingAction> {
    let notifier = Arc::clone(&env.notifier);
    Effect::future(async move {
        match notifier.post(draft).await {
            Ok(notification) => Some(BookingAction::NotificationSent {
                notification_id: notification.id,
            }),
            Err(error) => Some(BookingAction::SideEffectFailed {
                warning: format!("Notification could not be sent: {error}"),
            }),
        }
    })
}

/// Reject a command: record the error, produce no effects
pub(crate) fn reject(state: &mut BookingState, error: RentalError) -> SmallVec<[Effect<BookingAction>; 4]> {
    tracing::debug!(%error, "Booking command rejected");
    state.apply(&BookingAction::ValidationFailed { error });
    SmallVec::new()
}

/// The loaded booking, or the reason there is none
pub(crate) fn require_booking(state: &BookingState) -> Result<&Booking, RentalError> {
    state
        .booking
        .as_ref()
        .ok_or_else(|| RentalError::state("Booking has not been loaded"))
}

// ============================================================================
// Reducer
// ============================================================================

/// Creation and provider decisions
#[derive(Clone, Debug)]
pub struct LifecycleReducer;

impl LifecycleReducer {
    /// Creates a new `LifecycleReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validate a booking request and build the pending booking
    fn validate_create(
        booking_id: BookingId,
        renter: &UserProfile,
        item: &Item,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
        existing: &[Booking],
        env: &BookingEnvironment,
    ) -> Result<Booking, RentalError> {
        if start_date.is_none() || end_date.is_none() {
            return Err(RentalError::validation("Please select start and end dates"));
        }
        if renter.id == item.provider_id {
            return Err(RentalError::validation("You cannot book your own item"));
        }
        let period = RentalPeriod::new(start_date, end_date)?;
        if item.price_per_day.is_zero() {
            return Err(RentalError::validation("Item price must be greater than zero"));
        }
        if !item.available {
            return Err(RentalError::validation("This item is currently unavailable"));
        }

        let today = env.today();
        if existing
            .iter()
            .any(|b| b.item_id == item.id && b.renter_id == renter.id && b.blocks_new_requests(today))
        {
            return Err(RentalError::conflict(
                "You already have an upcoming booking for this item. Please wait until it ends.",
            ));
        }

        let total_price = period.total_price(item.price_per_day)?;
        let now = env.clock.now();
        let renter_name = if renter.name.trim().is_empty() {
            renter.email.clone().unwrap_or_default()
        } else {
            renter.name.clone()
        };

        Ok(Booking {
            id: booking_id,
            item_id: item.id,
            renter_id: renter.id.clone(),
            provider_id: item.provider_id.clone(),
            item_title: item.title.clone(),
            renter_name,
            renter_email: renter.email.clone(),
            provider_name: item.provider_name.clone(),
            start_date: period.start_date(),
            end_date: period.end_date(),
            total_price,
            status: BookingStatus::Pending,
            payment_status: PaymentStatus::Pending,
            payment_method: None,
            transaction_id: None,
            chat_enabled: false,
            item_received: false,
            return_requested: false,
            return_confirmed: false,
            item_returned: false,
            return_requested_at: None,
            return_confirmed_at: None,
            received_at: None,
            last_message_preview: None,
            last_message_at: None,
            last_message_sender_id: None,
            created_at: now,
            updated_at: now,
            revision: 0,
        })
    }

    /// Validate an approve/reject decision
    fn validate_decision(
        booking: &Booking,
        actor: &UserId,
        status: BookingStatus,
    ) -> Result<(), RentalError> {
        if actor != &booking.provider_id {
            return Err(RentalError::state(
                "Only the lender can approve or decline this booking",
            ));
        }
        if !matches!(status, BookingStatus::Confirmed | BookingStatus::Cancelled) {
            return Err(RentalError::state(format!(
                "A booking request cannot be moved to {status}"
            )));
        }
        if !booking.status.can_transition_to(status) {
            return Err(RentalError::state(format!(
                "Only pending bookings can be approved or declined (this one is {})",
                booking.status
            )));
        }
        Ok(())
    }
}

impl Default for LifecycleReducer {
    fn default() -> Self {
        Self::new()
    }
}

impl Reducer for LifecycleReducer {
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
            // ========== Create ==========
            BookingAction::CreateBooking {
                booking_id,
                renter,
                item,
                start_date,
                end_date,
                existing,
            } => {
                if state.booking.is_some() {
                    return reject(state, RentalError::state("Booking already exists"));
                }
                match Self::validate_create(
                    booking_id, &renter, &item, start_date, end_date, &existing, env,
                ) {
                    Ok(booking) => {
                        tracing::info!(
                            booking_id = %booking.id,
                            item_id = %booking.item_id,
                            renter_id = %booking.renter_id,
                            total_price = %booking.total_price,
                            "Booking created"
                        );
                        state.apply(&BookingAction::BookingCreated {
                            booking: Box::new(booking),
                        });
                        // No notification on creation
                        SmallVec::new()
                    },
                    Err(error) => reject(state, error),
                }
            },

            // ========== Approve / Reject ==========
            BookingAction::SetStatus { actor, status } => {
                let booking = match require_booking(state) {
                    Ok(booking) => booking,
                    Err(error) => return reject(state, error),
                };
                if let Err(error) = Self::validate_decision(booking, &actor, status) {
                    return reject(state, error);
                }

                let at = env.clock.now();
                state.apply(&BookingAction::StatusChanged { status, at });

                let Some(booking) = state.booking() else {
                    return SmallVec::new();
                };
                tracing::info!(booking_id = %booking.id, %status, "Booking decided");
                smallvec![notify(
                    env,
                    NotificationDraft::booking_decided(booking, status == BookingStatus::Confirmed),
                )]
            },

            // ========== Events and feedback ==========
            event if !event.is_command() => {
                state.apply(&event);
                SmallVec::new()
            },

            // Handoff commands belong to the handoff reducer
            _ => SmallVec::new(),
        }
    }
}
