//! Renter and provider dashboard summaries.

use super::bookings::BookingService;
use super::catalog::Catalog;
use super::ledger::{Ledger, total_successful};
use crate::error::RentalResult;
use crate::types::{Booking, BookingStatus, Item, Money, Transaction, UserId};
use std::sync::Arc;

/// What a renter sees
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenterDashboard {
    /// Bookings, newest first
    pub bookings: Vec<Booking>,
    /// Payment attempts, newest first
    pub transactions: Vec<Transaction>,
    /// Sum of successful payments
    pub total_spent: Money,
    /// Bookings confirmed or in hand
    pub active_rentals: usize,
    /// Bookings returned
    pub completed_rentals: usize,
}

/// What a provider sees
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderDashboard {
    /// Bookings of their items, newest first
    pub bookings: Vec<Booking>,
    /// Payments received, newest first
    pub transactions: Vec<Transaction>,
    /// Sum of successful payments
    pub earnings: Money,
    /// Requests waiting for a decision
    pub pending_requests: usize,
    /// Their listings, newest first
    pub listings: Vec<Item>,
    /// Listings open for booking
    pub available_listings: usize,
}

/// Builds dashboard summaries
#[derive(Clone)]
pub struct Dashboard {
    bookings: Arc<BookingService>,
    ledger: Ledger,
    catalog: Catalog,
}

impl Dashboard {
    /// Creates a new `Dashboard`
    #[must_use]
    pub fn new(bookings: Arc<BookingService>, ledger: Ledger, catalog: Catalog) -> Self {
        Self {
            bookings,
            ledger,
            catalog,
        }
    }

    /// Summary for `renter`
    ///
    /// # Errors
    ///
    /// Propagates read failures.
    pub async fn renter(&self, renter: &UserId) -> RentalResult<RenterDashboard> {
        let (bookings, transactions) =
            futures::try_join!(self.bookings.by_renter(renter), self.ledger.by_renter(renter))?;

        let active_rentals = bookings
            .iter()
            .filter(|b| matches!(b.status, BookingStatus::Confirmed | BookingStatus::Active))
            .count();
        let completed_rentals = bookings
            .iter()
            .filter(|b| b.status == BookingStatus::Completed)
            .count();

        Ok(RenterDashboard {
            total_spent: total_successful(&transactions),
            bookings,
            transactions,
            active_rentals,
            completed_rentals,
        })
    }

    /// Summary for `provider`
    ///
    /// # Errors
    ///
    /// Propagates read failures.
    pub async fn provider(&self, provider: &UserId) -> RentalResult<ProviderDashboard> {
        let (bookings, transactions, listings) = futures::try_join!(
            self.bookings.by_provider(provider),
            self.ledger.by_provider(provider),
            self.catalog.list_by_provider(provider),
        )?;

        let pending_requests = bookings
            .iter()
            .filter(|b| b.status == BookingStatus::Pending)
            .count();
        let available_listings = listings.iter().filter(|i| i.available).count();

        Ok(ProviderDashboard {
            earnings: total_successful(&transactions),
            bookings,
            transactions,
            pending_requests,
            listings,
            available_listings,
        })
    }
}
