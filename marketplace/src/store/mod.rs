//! Document storage boundary.
//!
//! The marketplace talks to its document database only through
//! [`DocumentStore`]. The trait mirrors the collections and indexed queries
//! the database exposes, plus two conditional writes:
//!
//! - [`DocumentStore::update_booking`] replaces a booking only if its
//!   `revision` still matches what the caller read
//! - [`DocumentStore::commit_payment`] appends a transaction and applies the
//!   booking update in one atomic step under the same revision check
//!
//! Every write is announced on a change feed ([`DocumentStore::subscribe_changes`]);
//! [`Subscription`] turns that feed into live query snapshots.

use crate::types::{
    Booking, BookingId, Category, ChatMessage, Item, ItemId, Notification, NotificationId,
    Transaction, UserId,
};
use chrono::{DateTime, Utc};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;
use tokio::sync::broadcast;

pub mod memory;
pub mod subscription;

pub use memory::InMemoryDocumentStore;
pub use subscription::Subscription;

/// Boxed future returned by [`DocumentStore`] methods
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, DocumentStoreError>> + Send + 'a>>;

/// Storage-level failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DocumentStoreError {
    /// Backend unreachable or failed mid-call
    #[error("Document store unavailable: {0}")]
    Unavailable(String),

    /// Conditional write lost to a concurrent writer
    #[error("Revision mismatch on {id}: expected {expected}, found {actual}")]
    RevisionMismatch {
        /// Document id
        id: String,
        /// Revision the writer read
        expected: u64,
        /// Revision currently stored
        actual: u64,
    },

    /// Document missing
    #[error("{collection} document not found: {id}")]
    NotFound {
        /// Collection searched
        collection: Collection,
        /// Document id
        id: String,
    },

    /// Stored document could not be decoded or encoded
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl DocumentStoreError {
    /// Whether retrying the same call may succeed
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Document collections
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Collection {
    /// Listed items
    Items,
    /// Bookings
    Bookings,
    /// Payment ledger
    Transactions,
    /// In-app notifications
    Notifications,
    /// Chat messages
    Messages,
}

impl Collection {
    /// Collection name on the wire
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Items => "items",
            Self::Bookings => "bookings",
            Self::Transactions => "transactions",
            Self::Notifications => "notifications",
            Self::Messages => "messages",
        }
    }

    /// Name of a single document of this collection
    #[must_use]
    pub const fn singular(self) -> &'static str {
        match self {
            Self::Items => "item",
            Self::Bookings => "booking",
            Self::Transactions => "transaction",
            Self::Notifications => "notification",
            Self::Messages => "message",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A write observed on the change feed
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChangeEvent {
    /// Collection written
    pub collection: Collection,
    /// Id of the written document
    pub id: String,
}

/// Gateway to the document database.
///
/// Query results come back in insertion order; callers sort.
pub trait DocumentStore: Send + Sync {
    // ---------------------------------------------------------------- items

    /// Insert a new item
    fn insert_item(&self, item: Item) -> StoreFuture<'_, ()>;

    /// Fetch an item
    fn get_item(&self, id: ItemId) -> StoreFuture<'_, Option<Item>>;

    /// Set the availability flag (last write wins)
    ///
    /// Fails with [`DocumentStoreError::NotFound`] if the item is missing.
    fn set_item_available(
        &self,
        id: ItemId,
        available: bool,
        at: DateTime<Utc>,
    ) -> StoreFuture<'_, ()>;

    /// Items owned by `provider`
    fn items_by_provider(&self, provider: UserId) -> StoreFuture<'_, Vec<Item>>;

    /// Available items, optionally limited to one category
    fn available_items(&self, category: Option<Category>) -> StoreFuture<'_, Vec<Item>>;

    // ------------------------------------------------------------- bookings

    /// Insert a new booking; the stored copy starts at revision 1
    fn insert_booking(&self, booking: Booking) -> StoreFuture<'_, Booking>;

    /// Fetch a booking
    fn get_booking(&self, id: BookingId) -> StoreFuture<'_, Option<Booking>>;

    /// Bookings made by `renter`
    fn bookings_by_renter(&self, renter: UserId) -> StoreFuture<'_, Vec<Booking>>;

    /// Bookings of items owned by `provider`
    fn bookings_by_provider(&self, provider: UserId) -> StoreFuture<'_, Vec<Booking>>;

    /// Bookings of one item by one renter
    fn bookings_for_item_and_renter(
        &self,
        item: ItemId,
        renter: UserId,
    ) -> StoreFuture<'_, Vec<Booking>>;

    /// Replace a booking if its stored revision equals `expected_revision`.
    ///
    /// Returns the stored copy with its revision bumped.
    fn update_booking(&self, booking: Booking, expected_revision: u64) -> StoreFuture<'_, Booking>;

    /// Append `transaction` and replace `booking` atomically, conditional
    /// on `expected_revision`. Neither write happens if the check fails.
    fn commit_payment(
        &self,
        transaction: Transaction,
        booking: Booking,
        expected_revision: u64,
    ) -> StoreFuture<'_, Booking>;

    /// Refresh the last-message cache fields of a booking.
    ///
    /// Cache writes do not bump the revision.
    fn update_chat_preview(
        &self,
        id: BookingId,
        preview: String,
        sender: UserId,
        at: DateTime<Utc>,
    ) -> StoreFuture<'_, ()>;

    // --------------------------------------------------------- transactions

    /// Append a ledger row
    fn insert_transaction(&self, transaction: Transaction) -> StoreFuture<'_, ()>;

    /// Ledger rows paid by `renter`
    fn transactions_by_renter(&self, renter: UserId) -> StoreFuture<'_, Vec<Transaction>>;

    /// Ledger rows paid to `provider`
    fn transactions_by_provider(&self, provider: UserId) -> StoreFuture<'_, Vec<Transaction>>;

    /// Ledger rows for one booking
    fn transactions_by_booking(&self, booking: BookingId) -> StoreFuture<'_, Vec<Transaction>>;

    // -------------------------------------------------------- notifications

    /// Append a notification
    fn insert_notification(&self, notification: Notification) -> StoreFuture<'_, ()>;

    /// Notifications addressed to `user`
    fn notifications_for_user(&self, user: UserId) -> StoreFuture<'_, Vec<Notification>>;

    /// Set the read flag of one notification
    fn mark_notification_read(&self, id: NotificationId) -> StoreFuture<'_, ()>;

    // ------------------------------------------------------------- messages

    /// Append a chat message
    fn insert_message(&self, message: ChatMessage) -> StoreFuture<'_, ()>;

    /// Messages of one booking thread
    fn messages_for_booking(&self, booking: BookingId) -> StoreFuture<'_, Vec<ChatMessage>>;

    // ---------------------------------------------------------- change feed

    /// Receive every subsequent write
    fn subscribe_changes(&self) -> broadcast::Receiver<ChangeEvent>;
}
