//! Shared fixtures for the integration tests.

#![allow(dead_code)]
#![allow(clippy::unwrap_used)]

use campus_rental::app::ListingDraft;
use campus_rental::config::{Config, PaymentConfig};
use campus_rental::payment_gateway::ScriptedRandomness;
use campus_rental::store::InMemoryDocumentStore;
use campus_rental::types::{Category, ImageRef, Item, Money, UserProfile};
use campus_rental::Marketplace;
use campus_rental_core::environment::Clock;
use campus_rental_testing::{init_test_tracing, test_clock};
use chrono::NaiveDate;
use std::sync::Arc;
use std::time::Duration;

pub struct World {
    pub marketplace: Marketplace,
    pub store: Arc<InMemoryDocumentStore>,
    pub randomness: Arc<ScriptedRandomness>,
    pub renter: UserProfile,
    pub provider: UserProfile,
}

/// Marketplace on a fresh in-memory store, clock at 2025-01-01, instant
/// payments approved unless scripted otherwise
pub fn world() -> World {
    world_with(PaymentConfig::instant(), Arc::new(test_clock()))
}

pub fn world_with(payment: PaymentConfig, clock: Arc<dyn Clock>) -> World {
    init_test_tracing();
    let store = Arc::new(InMemoryDocumentStore::new());
    let randomness = Arc::new(ScriptedRandomness::approving());
    let mut config = Config {
        payment,
        ..Config::default()
    };
    config.store_reads.initial_delay = Duration::from_millis(1);
    config.store_reads.max_delay = Duration::from_millis(5);

    let marketplace = Marketplace::new(config, store.clone(), clock, randomness.clone());
    World {
        marketplace,
        store,
        randomness,
        renter: UserProfile::new("renter-asha", "Asha", Some("asha@campus.edu".to_string())),
        provider: UserProfile::new("provider-dev", "Dev", Some("dev@campus.edu".to_string())),
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn calculator() -> ListingDraft {
    ListingDraft {
        title: "Graphing calculator".to_string(),
        description: "TI-84 with cover".to_string(),
        category: Category::Gadgets,
        price_per_day: Money::new(100),
        images: vec![ImageRef::Url("https://cdn.example/calc.jpg".to_string())],
    }
}

impl World {
    pub async fn list_calculator(&self) -> Item {
        self.marketplace
            .catalog()
            .create_listing(&self.provider, calculator())
            .await
            .unwrap()
    }

    /// A pending Jun 1 to Jun 3 booking of a fresh listing
    pub async fn pending_booking(&self) -> (Item, campus_rental::types::Booking) {
        let item = self.list_calculator().await;
        let booking = self
            .marketplace
            .bookings()
            .create_booking(&self.renter, item.id, Some(date(2025, 6, 1)), Some(date(2025, 6, 3)))
            .await
            .unwrap();
        (item, booking)
    }
}
