//! In-memory [`DocumentStore`] for tests and the demo binary.
//!
//! Bookings are kept as JSON documents and decoded through
//! [`BookingRecord`], so legacy documents seeded with
//! [`InMemoryDocumentStore::seed_raw_booking`] behave exactly as they would
//! coming from the real database.
//!
//! Faults can be injected to exercise retry and best-effort paths.

use super::{ChangeEvent, Collection, DocumentStore, DocumentStoreError, StoreFuture};
use crate::schema::BookingRecord;
use crate::types::{
    Booking, BookingId, Category, ChatMessage, Item, ItemId, Notification, NotificationId,
    Transaction, UserId,
};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::broadcast;

const CHANGE_FEED_CAPACITY: usize = 256;

#[derive(Default)]
struct Collections {
    items: Vec<Item>,
    bookings: Vec<(BookingId, serde_json::Value)>,
    transactions: Vec<Transaction>,
    notifications: Vec<Notification>,
    messages: Vec<ChatMessage>,
}

impl Collections {
    fn booking_slot(&self, id: BookingId) -> Option<usize> {
        self.bookings.iter().position(|(stored, _)| *stored == id)
    }

    fn decode_bookings<P>(&self, keep: P) -> Result<Vec<Booking>, DocumentStoreError>
    where
        P: Fn(&Booking) -> bool,
    {
        let mut found = Vec::new();
        for (_, document) in &self.bookings {
            let booking = BookingRecord::decode(document.clone())?;
            if keep(&booking) {
                found.push(booking);
            }
        }
        Ok(found)
    }

    /// Compare-and-set on the booking revision; returns the stored copy.
    fn replace_booking(
        &mut self,
        mut booking: Booking,
        expected_revision: u64,
    ) -> Result<Booking, DocumentStoreError> {
        let slot = self
            .booking_slot(booking.id)
            .ok_or_else(|| DocumentStoreError::NotFound {
                collection: Collection::Bookings,
                id: booking.id.to_string(),
            })?;
        let current = BookingRecord::decode(self.bookings[slot].1.clone())?;
        if current.revision != expected_revision {
            return Err(DocumentStoreError::RevisionMismatch {
                id: booking.id.to_string(),
                expected: expected_revision,
                actual: current.revision,
            });
        }
        booking.revision = current.revision + 1;
        self.bookings[slot].1 = BookingRecord::encode(&booking)?;
        Ok(booking)
    }
}

/// Thread-safe in-memory document store
pub struct InMemoryDocumentStore {
    data: RwLock<Collections>,
    changes: broadcast::Sender<ChangeEvent>,
    failing_reads: AtomicUsize,
    failing_writes: AtomicUsize,
    notifications_down: AtomicBool,
    items_down: AtomicBool,
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryDocumentStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self {
            data: RwLock::new(Collections::default()),
            changes,
            failing_reads: AtomicUsize::new(0),
            failing_writes: AtomicUsize::new(0),
            notifications_down: AtomicBool::new(false),
            items_down: AtomicBool::new(false),
        }
    }

    /// Make the next `n` reads fail with [`DocumentStoreError::Unavailable`]
    pub fn fail_next_reads(&self, n: usize) {
        self.failing_reads.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` writes fail with [`DocumentStoreError::Unavailable`]
    pub fn fail_next_writes(&self, n: usize) {
        self.failing_writes.store(n, Ordering::SeqCst);
    }

    /// Fail every notification insert while `down` is set
    pub fn fail_notification_writes(&self, down: bool) {
        self.notifications_down.store(down, Ordering::SeqCst);
    }

    /// Fail every item write while `down` is set
    pub fn fail_item_writes(&self, down: bool) {
        self.items_down.store(down, Ordering::SeqCst);
    }

    /// Number of live change-feed receivers
    #[must_use]
    pub fn change_subscribers(&self) -> usize {
        self.changes.receiver_count()
    }

    /// Insert a raw booking document as an older client would have written it.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::Serialization`] if the document has no
    /// readable `id`.
    pub fn seed_raw_booking(&self, document: serde_json::Value) -> Result<BookingId, DocumentStoreError> {
        let id = document
            .get("id")
            .cloned()
            .ok_or_else(|| DocumentStoreError::Serialization("booking document has no id".to_string()))
            .and_then(|id| {
                serde_json::from_value::<BookingId>(id)
                    .map_err(|e| DocumentStoreError::Serialization(e.to_string()))
            })?;
        self.write()?.bookings.push((id, document));
        self.announce(Collection::Bookings, id);
        Ok(id)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Collections>, DocumentStoreError> {
        if take_fault(&self.failing_reads) {
            tracing::debug!("Injected read failure");
            return Err(DocumentStoreError::Unavailable("injected read failure".to_string()));
        }
        self.data
            .read()
            .map_err(|_| DocumentStoreError::Unavailable("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Collections>, DocumentStoreError> {
        if take_fault(&self.failing_writes) {
            tracing::debug!("Injected write failure");
            return Err(DocumentStoreError::Unavailable("injected write failure".to_string()));
        }
        self.data
            .write()
            .map_err(|_| DocumentStoreError::Unavailable("lock poisoned".to_string()))
    }

    fn announce(&self, collection: Collection, id: impl ToString) {
        // No receivers is fine
        let _ = self.changes.send(ChangeEvent {
            collection,
            id: id.to_string(),
        });
    }

    fn ensure_up(flag: &AtomicBool, what: &str) -> Result<(), DocumentStoreError> {
        if flag.load(Ordering::SeqCst) {
            Err(DocumentStoreError::Unavailable(format!("{what} writes are failing")))
        } else {
            Ok(())
        }
    }
}

fn take_fault(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

fn done<'a, T: Send + 'a>(result: Result<T, DocumentStoreError>) -> StoreFuture<'a, T> {
    Box::pin(std::future::ready(result))
}

impl DocumentStore for InMemoryDocumentStore {
    fn insert_item(&self, item: Item) -> StoreFuture<'_, ()> {
        let result = Self::ensure_up(&self.items_down, "item").and_then(|()| {
            let id = item.id;
            self.write()?.items.push(item);
            self.announce(Collection::Items, id);
            Ok(())
        });
        done(result)
    }

    fn get_item(&self, id: ItemId) -> StoreFuture<'_, Option<Item>> {
        done(self.read().map(|data| data.items.iter().find(|item| item.id == id).cloned()))
    }

    fn set_item_available(
        &self,
        id: ItemId,
        available: bool,
        at: DateTime<Utc>,
    ) -> StoreFuture<'_, ()> {
        let result = Self::ensure_up(&self.items_down, "item").and_then(|()| {
            let mut data = self.write()?;
            let item = data
                .items
                .iter_mut()
                .find(|item| item.id == id)
                .ok_or_else(|| DocumentStoreError::NotFound {
                    collection: Collection::Items,
                    id: id.to_string(),
                })?;
            item.available = available;
            item.updated_at = at;
            drop(data);
            self.announce(Collection::Items, id);
            Ok(())
        });
        done(result)
    }

    fn items_by_provider(&self, provider: UserId) -> StoreFuture<'_, Vec<Item>> {
        done(self.read().map(|data| {
            data.items
                .iter()
                .filter(|item| item.provider_id == provider)
                .cloned()
                .collect()
        }))
    }

    fn available_items(&self, category: Option<Category>) -> StoreFuture<'_, Vec<Item>> {
        done(self.read().map(|data| {
            data.items
                .iter()
                .filter(|item| item.available && category.is_none_or(|c| item.category == c))
                .cloned()
                .collect()
        }))
    }

    fn insert_booking(&self, mut booking: Booking) -> StoreFuture<'_, Booking> {
        booking.revision = 1;
        let result = BookingRecord::encode(&booking).and_then(|document| {
            self.write()?.bookings.push((booking.id, document));
            self.announce(Collection::Bookings, booking.id);
            Ok(booking)
        });
        done(result)
    }

    fn get_booking(&self, id: BookingId) -> StoreFuture<'_, Option<Booking>> {
        let result = self.read().and_then(|data| {
            data.booking_slot(id)
                .map(|slot| BookingRecord::decode(data.bookings[slot].1.clone()))
                .transpose()
        });
        done(result)
    }

    fn bookings_by_renter(&self, renter: UserId) -> StoreFuture<'_, Vec<Booking>> {
        done(self.read().and_then(|data| data.decode_bookings(|b| b.renter_id == renter)))
    }

    fn bookings_by_provider(&self, provider: UserId) -> StoreFuture<'_, Vec<Booking>> {
        done(self.read().and_then(|data| data.decode_bookings(|b| b.provider_id == provider)))
    }

    fn bookings_for_item_and_renter(
        &self,
        item: ItemId,
        renter: UserId,
    ) -> StoreFuture<'_, Vec<Booking>> {
        done(self.read().and_then(|data| {
            data.decode_bookings(|b| b.item_id == item && b.renter_id == renter)
        }))
    }

    fn update_booking(&self, booking: Booking, expected_revision: u64) -> StoreFuture<'_, Booking> {
        let result = self.write().and_then(|mut data| {
            let stored = data.replace_booking(booking, expected_revision)?;
            drop(data);
            self.announce(Collection::Bookings, stored.id);
            Ok(stored)
        });
        done(result)
    }

    fn commit_payment(
        &self,
        transaction: Transaction,
        booking: Booking,
        expected_revision: u64,
    ) -> StoreFuture<'_, Booking> {
        let result = self.write().and_then(|mut data| {
            let stored = data.replace_booking(booking, expected_revision)?;
            let transaction_id = transaction.id;
            data.transactions.push(transaction);
            drop(data);
            self.announce(Collection::Transactions, transaction_id);
            self.announce(Collection::Bookings, stored.id);
            Ok(stored)
        });
        done(result)
    }

    fn update_chat_preview(
        &self,
        id: BookingId,
        preview: String,
        sender: UserId,
        at: DateTime<Utc>,
    ) -> StoreFuture<'_, ()> {
        let result = self.write().and_then(|mut data| {
            let slot = data.booking_slot(id).ok_or_else(|| DocumentStoreError::NotFound {
                collection: Collection::Bookings,
                id: id.to_string(),
            })?;
            let mut booking = BookingRecord::decode(data.bookings[slot].1.clone())?;
            booking.last_message_preview = Some(preview);
            booking.last_message_sender_id = Some(sender);
            booking.last_message_at = Some(at);
            data.bookings[slot].1 = BookingRecord::encode(&booking)?;
            drop(data);
            self.announce(Collection::Bookings, id);
            Ok(())
        });
        done(result)
    }

    fn insert_transaction(&self, transaction: Transaction) -> StoreFuture<'_, ()> {
        let result = self.write().map(|mut data| {
            let id = transaction.id;
            data.transactions.push(transaction);
            drop(data);
            self.announce(Collection::Transactions, id);
        });
        done(result)
    }

    fn transactions_by_renter(&self, renter: UserId) -> StoreFuture<'_, Vec<Transaction>> {
        done(self.read().map(|data| {
            data.transactions
                .iter()
                .filter(|tx| tx.renter_id == renter)
                .cloned()
                .collect()
        }))
    }

    fn transactions_by_provider(&self, provider: UserId) -> StoreFuture<'_, Vec<Transaction>> {
        done(self.read().map(|data| {
            data.transactions
                .iter()
                .filter(|tx| tx.provider_id == provider)
                .cloned()
                .collect()
        }))
    }

    fn transactions_by_booking(&self, booking: BookingId) -> StoreFuture<'_, Vec<Transaction>> {
        done(self.read().map(|data| {
            data.transactions
                .iter()
                .filter(|tx| tx.booking_id == booking)
                .cloned()
                .collect()
        }))
    }

    fn insert_notification(&self, notification: Notification) -> StoreFuture<'_, ()> {
        let result = Self::ensure_up(&self.notifications_down, "notification").and_then(|()| {
            let id = notification.id;
            self.write()?.notifications.push(notification);
            self.announce(Collection::Notifications, id);
            Ok(())
        });
        done(result)
    }

    fn notifications_for_user(&self, user: UserId) -> StoreFuture<'_, Vec<Notification>> {
        done(self.read().map(|data| {
            data.notifications
                .iter()
                .filter(|n| n.user_id == user)
                .cloned()
                .collect()
        }))
    }

    fn mark_notification_read(&self, id: NotificationId) -> StoreFuture<'_, ()> {
        let result = self.write().and_then(|mut data| {
            let notification = data
                .notifications
                .iter_mut()
                .find(|n| n.id == id)
                .ok_or_else(|| DocumentStoreError::NotFound {
                    collection: Collection::Notifications,
                    id: id.to_string(),
                })?;
            notification.read = true;
            drop(data);
            self.announce(Collection::Notifications, id);
            Ok(())
        });
        done(result)
    }

    fn insert_message(&self, message: ChatMessage) -> StoreFuture<'_, ()> {
        let result = self.write().map(|mut data| {
            let id = message.id;
            data.messages.push(message);
            drop(data);
            self.announce(Collection::Messages, id);
        });
        done(result)
    }

    fn messages_for_booking(&self, booking: BookingId) -> StoreFuture<'_, Vec<ChatMessage>> {
        done(self.read().map(|data| {
            data.messages
                .iter()
                .filter(|m| m.booking_id == booking)
                .cloned()
                .collect()
        }))
    }

    fn subscribe_changes(&self) -> broadcast::Receiver<ChangeEvent> {
        self.changes.subscribe()
    }
}
