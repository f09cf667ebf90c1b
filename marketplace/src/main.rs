//! Campus rental walkthrough.
//!
//! Runs one booking end to end against the in-memory store: a provider lists
//! an item, a renter books and pays for it, they chat, and the item goes out
//! and comes back.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin campus-rental-demo
//! PAYMENT_SUCCESS_RATE=0.5 RUST_LOG=debug cargo run --bin campus-rental-demo
//! ```

use anyhow::Context;
use campus_rental::app::ListingDraft;
use campus_rental::payment_gateway::ThreadRngRandomness;
use campus_rental::store::InMemoryDocumentStore;
use campus_rental::types::{Category, ImageRef, Money, PaymentMethod, UserProfile};
use campus_rental::{Config, Marketplace};
use campus_rental_core::environment::SystemClock;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Declined attempts before the walkthrough gives up
const MAX_PAYMENT_ATTEMPTS: usize = 5;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    info!("=== Campus Rental ===");

    let marketplace = Marketplace::new(
        config,
        Arc::new(InMemoryDocumentStore::new()),
        Arc::new(SystemClock),
        Arc::new(ThreadRngRandomness),
    );

    let provider = UserProfile::new("provider-dev", "Dev", Some("dev@campus.edu".to_string()));
    let renter = UserProfile::new("renter-asha", "Asha", Some("asha@campus.edu".to_string()));

    // 1. List
    let item = marketplace
        .catalog()
        .create_listing(
            &provider,
            ListingDraft {
                title: "Graphing calculator".to_string(),
                description: "TI-84 with cover".to_string(),
                category: Category::Gadgets,
                price_per_day: Money::new(100),
                images: vec![ImageRef::Url("https://cdn.example/calc.jpg".to_string())],
            },
        )
        .await?;
    info!(item_id = %item.id, "Listed {}", item.title);

    // 2. Book
    let today = Utc::now().date_naive();
    let booking = marketplace
        .bookings()
        .create_booking(&renter, item.id, Some(today), Some(today + Duration::days(2)))
        .await?;
    info!(booking_id = %booking.id, total = %booking.total_price, "Booking requested");

    // 3. Pay, retrying declines
    let session = marketplace.payment_session(booking.id, renter.id.clone());
    let mut paid = false;
    for attempt in 1..=MAX_PAYMENT_ATTEMPTS {
        let outcome = session.pay(booking.total_price, PaymentMethod::Upi).await?;
        info!(
            attempt,
            status = ?outcome.status,
            reference = outcome.reference_id.as_deref().unwrap_or("-"),
            "Payment settled"
        );
        if outcome.succeeded() {
            paid = true;
            break;
        }
        session.reset().await?;
    }
    anyhow::ensure!(paid, "payment declined {MAX_PAYMENT_ATTEMPTS} times");

    // 4. Chat
    let sent = marketplace
        .chat()
        .send_message(booking.id, &renter, "Can I pick it up after the 2pm lecture?")
        .await?;
    info!(warnings = sent.warnings.len(), "Message sent");

    // 5. Hand over and return
    marketplace.bookings().confirm_receipt(booking.id, &renter.id).await?;
    marketplace.bookings().request_return(booking.id, &renter.id).await?;
    let returned = marketplace
        .bookings()
        .confirm_return(booking.id, &provider.id)
        .await?;
    info!(status = %returned.booking.status, "Rental finished");

    // 6. Summaries
    let renter_view = marketplace.dashboard().renter(&renter.id).await?;
    let provider_view = marketplace.dashboard().provider(&provider.id).await?;
    info!(
        spent = %renter_view.total_spent,
        completed = renter_view.completed_rentals,
        "Renter dashboard"
    );
    info!(
        earned = %provider_view.earnings,
        listings_available = provider_view.available_listings,
        "Provider dashboard"
    );

    let inbox = marketplace
        .notifications()
        .list_for_user(&renter.id)
        .await
        .context("loading renter notifications")?;
    for notification in inbox {
        info!(title = %notification.title, "{}", notification.body);
    }

    Ok(())
}
