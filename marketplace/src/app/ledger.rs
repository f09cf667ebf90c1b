//! Transaction ledger: append-only payment records and history views.

use super::read_with_retry;
use crate::error::RentalResult;
use crate::store::{Collection, DocumentStore, Subscription};
use crate::types::{Booking, Money, PaymentMethod, Transaction, TransactionId, TransactionStatus, UserId};
use campus_rental_runtime::retry::RetryPolicy;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// A ledger row before it is stamped and stored
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewTransaction {
    /// Booking being paid
    pub booking: Booking,
    /// Amount attempted
    pub amount: Money,
    /// Payment method
    pub method: PaymentMethod,
    /// Outcome
    pub status: TransactionStatus,
    /// Gateway reference
    pub reference_id: String,
}

impl NewTransaction {
    /// Describe an attempt on `booking`
    #[must_use]
    pub fn from_booking(
        booking: &Booking,
        amount: Money,
        method: PaymentMethod,
        status: TransactionStatus,
        reference_id: impl Into<String>,
    ) -> Self {
        Self {
            booking: booking.clone(),
            amount,
            method,
            status,
            reference_id: reference_id.into(),
        }
    }

    /// Assign an id and creation time, snapshotting the display names
    #[must_use]
    pub fn stamp(self, now: DateTime<Utc>) -> Transaction {
        Transaction {
            id: TransactionId::new(),
            booking_id: self.booking.id,
            amount: self.amount,
            renter_id: self.booking.renter_id,
            provider_id: self.booking.provider_id,
            method: self.method,
            status: self.status,
            reference_id: self.reference_id,
            item_title: self.booking.item_title,
            renter_name: self.booking.renter_name,
            provider_name: self.booking.provider_name,
            created_at: now,
        }
    }
}

/// Read and append access to transactions
#[derive(Clone)]
pub struct Ledger {
    store: Arc<dyn DocumentStore>,
    read_policy: RetryPolicy,
}

impl Ledger {
    /// Creates a new `Ledger`
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, read_policy: RetryPolicy) -> Self {
        Self { store, read_policy }
    }

    /// Append a stand-alone ledger row.
    ///
    /// Payments go through [`DocumentStore::commit_payment`] instead so the
    /// row and the booking update land together.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn record(&self, entry: NewTransaction, now: DateTime<Utc>) -> RentalResult<TransactionId> {
        let transaction = entry.stamp(now);
        let id = transaction.id;
        self.store.insert_transaction(transaction).await?;
        Ok(id)
    }

    /// Payments made by `renter`, newest first
    ///
    /// # Errors
    ///
    /// [`RentalError::TransientStore`](crate::error::RentalError::TransientStore)
    /// once read retries are exhausted.
    pub async fn by_renter(&self, renter: &UserId) -> RentalResult<Vec<Transaction>> {
        let store = &self.store;
        let rows = read_with_retry(&self.read_policy, "transactions_by_renter", || {
            store.transactions_by_renter(renter.clone())
        })
        .await?;
        Ok(newest_first(rows))
    }

    /// Payments received by `provider`, newest first
    ///
    /// # Errors
    ///
    /// As [`Ledger::by_renter`].
    pub async fn by_provider(&self, provider: &UserId) -> RentalResult<Vec<Transaction>> {
        let store = &self.store;
        let rows = read_with_retry(&self.read_policy, "transactions_by_provider", || {
            store.transactions_by_provider(provider.clone())
        })
        .await?;
        Ok(newest_first(rows))
    }

    /// Every attempt on one booking, newest first
    ///
    /// # Errors
    ///
    /// As [`Ledger::by_renter`].
    pub async fn by_booking(&self, booking: crate::types::BookingId) -> RentalResult<Vec<Transaction>> {
        let store = &self.store;
        let rows = read_with_retry(&self.read_policy, "transactions_by_booking", || {
            store.transactions_by_booking(booking)
        })
        .await?;
        Ok(newest_first(rows))
    }

    /// Live view of a renter's payments
    #[must_use]
    pub fn watch_renter(&self, renter: &UserId) -> Subscription<Transaction> {
        let renter = renter.clone();
        Subscription::new(Arc::clone(&self.store), Collection::Transactions, move |store| {
            let renter = renter.clone();
            async move { store.transactions_by_renter(renter).await.map(newest_first) }
        })
    }

    /// Live view of a provider's earnings
    #[must_use]
    pub fn watch_provider(&self, provider: &UserId) -> Subscription<Transaction> {
        let provider = provider.clone();
        Subscription::new(Arc::clone(&self.store), Collection::Transactions, move |store| {
            let provider = provider.clone();
            async move { store.transactions_by_provider(provider).await.map(newest_first) }
        })
    }
}

/// Sum of the successful rows; declined attempts count for nothing
#[must_use]
pub fn total_successful(transactions: &[Transaction]) -> Money {
    transactions
        .iter()
        .filter(|t| t.status == TransactionStatus::Success)
        .fold(Money::ZERO, |total, t| total.saturating_add(t.amount))
}

fn newest_first(mut rows: Vec<Transaction>) -> Vec<Transaction> {
    // Stable sort on reversed insertion order keeps same-instant rows newest first
    rows.reverse();
    rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    rows
}
