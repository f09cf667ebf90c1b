//! Fixtures shared by unit tests.

#![allow(clippy::unwrap_used)]

use crate::notifications::NotificationCenter;
use crate::shell::ShellEvent;
use crate::store::InMemoryDocumentStore;
use crate::types::{
    Booking, BookingId, BookingStatus, Category, ImageRef, Item, ItemId, Money, PaymentStatus,
    UserId, UserProfile,
};
use campus_rental_core::environment::Clock;
use campus_rental_core::event_bus::BroadcastEventBus;
use campus_rental_testing::{test_clock, test_epoch};
use chrono::NaiveDate;
use std::sync::Arc;

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn renter() -> UserProfile {
    UserProfile::new("renter-asha", "Asha", Some("asha@campus.edu".to_string()))
}

pub fn provider() -> UserProfile {
    UserProfile::new("provider-dev", "Dev", None)
}

pub fn item() -> Item {
    Item {
        id: ItemId::new(),
        provider_id: provider().id,
        provider_name: provider().name,
        title: "Graphing calculator".to_string(),
        description: "TI-84, with cover".to_string(),
        category: Category::Gadgets,
        price_per_day: Money::new(100),
        available: true,
        images: vec![ImageRef::Url("https://cdn.example/calc.jpg".to_string())],
        created_at: test_epoch(),
        updated_at: test_epoch(),
    }
}

/// A stored-looking pending booking of [`item`] by [`renter`], Jan 10 to 12
pub fn booking() -> Booking {
    let item = item();
    Booking {
        id: BookingId::new(),
        item_id: item.id,
        renter_id: renter().id,
        provider_id: item.provider_id,
        item_title: item.title,
        renter_name: renter().name,
        renter_email: renter().email,
        provider_name: item.provider_name,
        start_date: date(2025, 1, 10),
        end_date: date(2025, 1, 12),
        total_price: Money::new(300),
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
        created_at: test_epoch(),
        updated_at: test_epoch(),
        revision: 1,
    }
}

/// [`booking`] after a successful payment
pub fn paid_booking() -> Booking {
    Booking {
        status: BookingStatus::Confirmed,
        payment_status: PaymentStatus::Success,
        chat_enabled: true,
        ..booking()
    }
}

pub fn renter_id() -> UserId {
    renter().id
}

pub fn provider_id() -> UserId {
    provider().id
}

pub struct Harness {
    pub store: Arc<InMemoryDocumentStore>,
    pub bus: Arc<BroadcastEventBus<ShellEvent>>,
    pub clock: Arc<dyn Clock>,
    pub notifier: Arc<NotificationCenter>,
}

pub fn harness() -> Harness {
    let store = Arc::new(InMemoryDocumentStore::new());
    let bus = Arc::new(BroadcastEventBus::new(64));
    let clock: Arc<dyn Clock> = Arc::new(test_clock());
    let notifier = Arc::new(NotificationCenter::new(store.clone(), bus.clone(), Arc::clone(&clock)));
    Harness {
        store,
        bus,
        clock,
        notifier,
    }
}
