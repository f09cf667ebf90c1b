//! Application services and the [`Marketplace`] facade that wires them.
//!
//! Services load documents through the [`DocumentStore`], reduce commands
//! with the aggregates, persist with conditional writes and then run the
//! best-effort follow-ups. Reads retry transient store failures with the
//! configured backoff; writes never retry blindly.

pub mod bookings;
pub mod catalog;
pub mod chat;
pub mod dashboard;
pub mod ledger;
pub mod payments;

pub use bookings::{BookingService, BookingUpdate};
pub use catalog::{Catalog, ListingDraft};
pub use chat::{ChatGate, ChatService, SentMessage};
pub use dashboard::{Dashboard, ProviderDashboard, RenterDashboard};
pub use ledger::{Ledger, NewTransaction, total_successful};
pub use payments::{PaymentService, PaymentSession};

use crate::aggregates::BookingEnvironment;
use crate::config::Config;
use crate::error::{RentalError, RentalResult};
use crate::notifications::NotificationCenter;
use crate::payment_gateway::{Randomness, SimulatedGateway};
use crate::shell::ShellEvent;
use crate::store::{DocumentStore, DocumentStoreError};
use crate::types::{BookingId, UserId};
use campus_rental_core::environment::Clock;
use campus_rental_core::event_bus::{BroadcastEventBus, EventBus, EventStream};
use campus_rental_runtime::retry::{RetryPolicy, retry_with_predicate};
use std::future::Future;
use std::sync::Arc;

/// Events buffered per shell subscriber
const SHELL_EVENT_CAPACITY: usize = 64;

/// Run a store read, retrying transient failures
pub(crate) async fn read_with_retry<F, Fut, T>(
    policy: &RetryPolicy,
    operation: &'static str,
    read: F,
) -> RentalResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DocumentStoreError>>,
{
    retry_with_predicate(policy, operation, read, DocumentStoreError::is_transient)
        .await
        .map_err(RentalError::from)
}

/// Every marketplace service over one store
pub struct Marketplace {
    config: Config,
    store: Arc<dyn DocumentStore>,
    shell: Arc<BroadcastEventBus<ShellEvent>>,
    notifications: Arc<NotificationCenter>,
    bookings: Arc<BookingService>,
    payments: PaymentService,
    ledger: Ledger,
    catalog: Catalog,
    chat: ChatService,
    dashboard: Dashboard,
}

impl Marketplace {
    /// Wire the services
    #[must_use]
    pub fn new(
        config: Config,
        store: Arc<dyn DocumentStore>,
        clock: Arc<dyn Clock>,
        randomness: Arc<dyn Randomness>,
    ) -> Self {
        let read_policy = config.store_reads.retry_policy();
        let shell = Arc::new(BroadcastEventBus::new(SHELL_EVENT_CAPACITY));
        let notifications = Arc::new(NotificationCenter::new(
            Arc::clone(&store),
            Arc::clone(&shell) as Arc<dyn EventBus<ShellEvent>>,
            Arc::clone(&clock),
        ));

        let bookings = Arc::new(BookingService::new(
            BookingEnvironment::new(Arc::clone(&clock), Arc::clone(&store), Arc::clone(&notifications)),
            read_policy.clone(),
        ));
        let gateway = SimulatedGateway::shared(config.payment.clone(), randomness);
        let payments = PaymentService::new(
            Arc::clone(&store),
            gateway,
            Arc::clone(&notifications),
            Arc::clone(&clock),
            read_policy.clone(),
        );
        let ledger = Ledger::new(Arc::clone(&store), read_policy.clone());
        let catalog = Catalog::new(Arc::clone(&store), Arc::clone(&clock), read_policy.clone());
        let chat = ChatService::new(Arc::clone(&store), Arc::clone(&notifications), clock, read_policy);
        let dashboard = Dashboard::new(Arc::clone(&bookings), ledger.clone(), catalog.clone());

        tracing::info!(
            success_rate = config.payment.success_rate,
            reference_prefix = %config.payment.reference_prefix,
            "Marketplace ready"
        );

        Self {
            config,
            store,
            shell,
            notifications,
            bookings,
            payments,
            ledger,
            catalog,
            chat,
            dashboard,
        }
    }

    /// Active configuration
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Underlying store
    #[must_use]
    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Booking lifecycle
    #[must_use]
    pub fn bookings(&self) -> &BookingService {
        &self.bookings
    }

    /// Payment settlement
    #[must_use]
    pub const fn payments(&self) -> &PaymentService {
        &self.payments
    }

    /// Transaction history
    #[must_use]
    pub const fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Listings
    #[must_use]
    pub const fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Booking chat
    #[must_use]
    pub const fn chat(&self) -> &ChatService {
        &self.chat
    }

    /// Dashboard summaries
    #[must_use]
    pub const fn dashboard(&self) -> &Dashboard {
        &self.dashboard
    }

    /// Notification inbox
    #[must_use]
    pub fn notifications(&self) -> &NotificationCenter {
        &self.notifications
    }

    /// Events for the application shell
    #[must_use]
    pub fn shell_events(&self) -> EventStream<ShellEvent> {
        self.shell.subscribe()
    }

    /// A payment session for `payer` on `booking_id`
    #[must_use]
    pub fn payment_session(&self, booking_id: BookingId, payer: UserId) -> PaymentSession {
        PaymentSession::new(
            booking_id,
            payer,
            Arc::new(self.payments.clone()),
            self.config.payment.wait_timeout,
        )
    }

    /// Ask the shell to show the payment sheet.
    ///
    /// # Errors
    ///
    /// [`RentalError::State`] if `user` is not the renter or the booking
    /// cannot be paid.
    pub async fn open_payment(&self, booking_id: BookingId, user: &UserId) -> RentalResult<()> {
        let booking = self.bookings.get(booking_id).await?;
        if &booking.renter_id != user {
            return Err(RentalError::state("Only the renter can pay for this booking"));
        }
        if let Some(refusal) = booking.payment_refusal() {
            return Err(RentalError::state(refusal));
        }
        self.publish(ShellEvent::OpenPayment { booking_id }).await;
        Ok(())
    }

    /// Ask the shell to open a booking's chat.
    ///
    /// # Errors
    ///
    /// [`RentalError::State`] if chat is closed or `user` is not a participant.
    pub async fn open_chat(&self, booking_id: BookingId, user: &UserId) -> RentalResult<()> {
        let booking = self.bookings.get(booking_id).await?;
        if !booking.is_participant(user) {
            return Err(RentalError::state("Only the renter and the lender can use this chat"));
        }
        if !ChatGate::is_open(&booking) {
            return Err(RentalError::state("Chat is available once the booking is paid"));
        }
        self.publish(ShellEvent::OpenChat { booking_id }).await;
        Ok(())
    }

    /// Ask the shell to show a profile
    pub async fn open_profile(&self, user_id: UserId) {
        self.publish(ShellEvent::OpenProfile { user_id }).await;
    }

    async fn publish(&self, event: ShellEvent) {
        if let Err(error) = self.shell.publish(event).await {
            tracing::debug!(%error, "Shell event dropped");
        }
    }
}
