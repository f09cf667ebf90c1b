//! Storage failures: best-effort follow-ups, read retries and legacy records.
//!
//! Run with: `cargo test --test store_faults`

#![allow(clippy::unwrap_used)]

mod common;

use campus_rental::RentalError;
use campus_rental::store::DocumentStore;
use campus_rental::types::{BookingId, BookingStatus, Money, PaymentMethod, PaymentStatus};
use common::world;
use serde_json::json;

async fn paid_and_returning(world: &common::World) -> (campus_rental::types::Item, BookingId) {
    let (item, booking) = world.pending_booking().await;
    world
        .marketplace
        .payments()
        .process_payment(booking.id, &world.renter.id, Money::new(300), PaymentMethod::Card)
        .await
        .unwrap();
    let bookings = world.marketplace.bookings();
    bookings.confirm_receipt(booking.id, &world.renter.id).await.unwrap();
    bookings.request_return(booking.id, &world.renter.id).await.unwrap();
    (item, booking.id)
}

#[tokio::test]
async fn failed_item_release_is_a_warning() {
    let world = world();
    let (item, booking_id) = paid_and_returning(&world).await;
    world
        .marketplace
        .catalog()
        .toggle_availability(&world.provider.id, item.id)
        .await
        .unwrap();
    world.store.fail_item_writes(true);

    let returned = world
        .marketplace
        .bookings()
        .confirm_return(booking_id, &world.provider.id)
        .await
        .unwrap();

    assert_eq!(returned.booking.status, BookingStatus::Completed);
    assert_eq!(returned.warnings.len(), 1);
    assert!(!world.marketplace.catalog().get_item(item.id).await.unwrap().available);

    // The renter still hears about it
    let inbox = world.marketplace.notifications().list_for_user(&world.renter.id).await.unwrap();
    assert_eq!(inbox.len(), 1);
}

#[tokio::test]
async fn failed_notification_does_not_undo_payment() {
    let world = world();
    let (_, booking) = world.pending_booking().await;
    world.store.fail_notification_writes(true);

    let outcome = world
        .marketplace
        .payments()
        .process_payment(booking.id, &world.renter.id, Money::new(300), PaymentMethod::Upi)
        .await
        .unwrap();

    assert!(outcome.succeeded());
    assert_eq!(outcome.warnings.len(), 1);
    let stored = world.marketplace.bookings().get(booking.id).await.unwrap();
    assert_eq!(stored.payment_status, PaymentStatus::Success);
}

#[tokio::test]
async fn transient_reads_are_retried() {
    let world = world();
    let (_, booking) = world.pending_booking().await;

    // Default policy allows three retries
    world.store.fail_next_reads(3);
    assert_eq!(world.marketplace.bookings().get(booking.id).await.unwrap(), booking);

    world.store.fail_next_reads(4);
    let err = world.marketplace.bookings().get(booking.id).await.unwrap_err();
    assert!(matches!(err, RentalError::TransientStore(_)));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn failed_write_leaves_booking_unchanged() {
    let world = world();
    let (_, booking) = world.pending_booking().await;
    world.store.fail_next_writes(1);

    let err = world
        .marketplace
        .bookings()
        .set_status(booking.id, &world.provider.id, BookingStatus::Confirmed)
        .await
        .unwrap_err();
    assert!(matches!(err, RentalError::TransientStore(_)));
    assert_eq!(world.marketplace.bookings().get(booking.id).await.unwrap(), booking);

    // Retrying by hand works
    world
        .marketplace
        .bookings()
        .set_status(booking.id, &world.provider.id, BookingStatus::Confirmed)
        .await
        .unwrap();
}

#[tokio::test]
async fn unknown_booking_is_not_found() {
    let world = world();
    let err = world
        .marketplace
        .bookings()
        .confirm_receipt(BookingId::new(), &world.renter.id)
        .await
        .unwrap_err();
    assert!(matches!(err, RentalError::NotFound { kind: "booking", .. }));
}

/// Bookings written before chat and handoff existed still go through the
/// whole workflow
#[tokio::test]
async fn legacy_booking_is_payable() {
    let world = world();
    let item = world.list_calculator().await;
    let id = BookingId::new();
    world
        .store
        .seed_raw_booking(json!({
            "id": id,
            "itemId": item.id,
            "renterId": "renter-asha",
            "providerId": "provider-dev",
            "startDate": "2025-06-01T00:00:00Z",
            "endDate": "2025-06-03",
            "totalPrice": 300,
            "status": "pending"
        }))
        .unwrap();

    let legacy = world.marketplace.bookings().get(id).await.unwrap();
    assert_eq!(legacy.payment_status, PaymentStatus::Pending);
    assert!(!legacy.chat_enabled);
    assert!(!legacy.item_received);
    assert_eq!(legacy.period().day_count(), 3);

    // Still blocks a second request for the same item
    let err = world
        .marketplace
        .bookings()
        .create_booking(&world.renter, item.id, Some(common::date(2025, 7, 1)), Some(common::date(2025, 7, 1)))
        .await
        .unwrap_err();
    assert!(matches!(err, RentalError::Conflict(_)));

    let outcome = world
        .marketplace
        .payments()
        .process_payment(id, &world.renter.id, Money::new(300), PaymentMethod::Card)
        .await
        .unwrap();
    assert!(outcome.succeeded());

    let upgraded = world.store.get_booking(id).await.unwrap().unwrap();
    assert_eq!(upgraded.status, BookingStatus::Confirmed);
    assert!(upgraded.chat_enabled);
    assert!(upgraded.revision > legacy.revision);
}
