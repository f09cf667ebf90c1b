//! End-to-end booking scenarios against the in-memory store.
//!
//! Run with: `cargo test --test booking_scenarios`

#![allow(clippy::unwrap_used)]

mod common;

use campus_rental::RentalError;
use campus_rental::types::{BookingStatus, Money, PaymentMethod, PaymentStatus, TransactionStatus};
use common::{date, world};

/// Three inclusive days at 100 per day
#[tokio::test]
async fn three_day_rental_costs_three_days() {
    let world = world();
    let (item, booking) = world.pending_booking().await;

    assert_eq!(booking.item_id, item.id);
    assert_eq!(booking.total_price, Money::new(300));
    assert_eq!(booking.status, BookingStatus::Pending);
    assert_eq!(booking.payment_status, PaymentStatus::Pending);
    assert!(!booking.chat_enabled);
    assert!(!booking.item_received && !booking.return_requested && !booking.return_confirmed);

    // Creation notifies nobody
    let inbox = world.marketplace.notifications().list_for_user(&world.provider.id).await.unwrap();
    assert!(inbox.is_empty());
}

/// An approved payment confirms the booking
#[tokio::test]
async fn approved_payment_confirms_booking() {
    let world = world();
    let (_, booking) = world.pending_booking().await;

    let outcome = world
        .marketplace
        .payments()
        .process_payment(booking.id, &world.renter.id, Money::new(300), PaymentMethod::Card)
        .await
        .unwrap();
    assert!(outcome.succeeded());

    let rows = world.marketplace.ledger().by_booking(booking.id).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, TransactionStatus::Success);
    assert_eq!(rows[0].reference_id, outcome.reference_id.unwrap());

    let stored = world.marketplace.bookings().get(booking.id).await.unwrap();
    assert_eq!(stored.payment_status, PaymentStatus::Success);
    assert_eq!(stored.status, BookingStatus::Confirmed);
    assert_eq!(stored.transaction_id, Some(rows[0].id));
    assert!(stored.chat_enabled);

    let inbox = world.marketplace.notifications().list_for_user(&world.provider.id).await.unwrap();
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].metadata.booking_id, Some(booking.id));
}

/// A declined payment can be retried and every attempt is a ledger row
#[tokio::test]
async fn declined_payment_is_recorded_and_retryable() {
    let world = world();
    let (_, booking) = world.pending_booking().await;
    world.randomness.push_outcomes([false]);

    let declined = world
        .marketplace
        .payments()
        .process_payment(booking.id, &world.renter.id, Money::new(300), PaymentMethod::Upi)
        .await
        .unwrap();
    assert_eq!(declined.status, TransactionStatus::Failed);
    assert_eq!(declined.message.as_deref(), Some("Payment failed. Please try again."));
    assert!(declined.reference_id.is_some());

    let stored = world.marketplace.bookings().get(booking.id).await.unwrap();
    assert_eq!(stored.payment_status, PaymentStatus::Failed);
    assert_eq!(stored.status, BookingStatus::Pending);
    assert_eq!(stored.transaction_id, None);
    assert!(!stored.chat_enabled);

    // Failed payments do not notify
    let inbox = world.marketplace.notifications().list_for_user(&world.provider.id).await.unwrap();
    assert!(inbox.is_empty());

    let retried = world
        .marketplace
        .payments()
        .process_payment(booking.id, &world.renter.id, Money::new(300), PaymentMethod::Upi)
        .await
        .unwrap();
    assert!(retried.succeeded());

    let rows = world.marketplace.ledger().by_booking(booking.id).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|t| t.booking_id == booking.id));

    // Booking payment status follows the newest attempt
    let stored = world.marketplace.bookings().get(booking.id).await.unwrap();
    assert_eq!(stored.payment_status, PaymentStatus::from(rows[0].status));
    assert_eq!(stored.status, BookingStatus::Confirmed);
}

/// The lender approves first and the renter pays afterwards
#[tokio::test]
async fn approved_request_can_still_be_paid_and_received() {
    let world = world();
    let (_, booking) = world.pending_booking().await;
    let bookings = world.marketplace.bookings();

    bookings
        .set_status(booking.id, &world.provider.id, BookingStatus::Confirmed)
        .await
        .unwrap();
    world.marketplace.open_payment(booking.id, &world.renter.id).await.unwrap();

    let paid = world
        .marketplace
        .payments()
        .process_payment(booking.id, &world.renter.id, Money::new(300), PaymentMethod::Card)
        .await
        .unwrap();
    assert!(paid.succeeded());

    let stored = bookings.get(booking.id).await.unwrap();
    assert_eq!(stored.status, BookingStatus::Confirmed);
    assert_eq!(stored.payment_status, PaymentStatus::Success);
    assert_eq!(stored.transaction_id, paid.transaction_id);
    assert!(stored.chat_enabled);

    let received = bookings.confirm_receipt(booking.id, &world.renter.id).await.unwrap();
    assert_eq!(received.booking.status, BookingStatus::Active);
}

/// Receipt before payment is refused and changes nothing
#[tokio::test]
async fn receipt_before_payment_is_refused() {
    let world = world();
    let (_, booking) = world.pending_booking().await;

    let err = world
        .marketplace
        .bookings()
        .confirm_receipt(booking.id, &world.renter.id)
        .await
        .unwrap_err();

    assert!(matches!(err, RentalError::State(_)));
    assert_eq!(world.marketplace.bookings().get(booking.id).await.unwrap(), booking);
}

/// The whole rental, from request to return
#[tokio::test]
async fn full_rental_happy_path() {
    let world = world();
    let (item, booking) = world.pending_booking().await;
    let bookings = world.marketplace.bookings();

    world
        .marketplace
        .payments()
        .process_payment(booking.id, &world.renter.id, Money::new(300), PaymentMethod::Wallet)
        .await
        .unwrap();

    // Payment already confirmed it; there is nothing left to approve
    let err = bookings
        .set_status(booking.id, &world.provider.id, BookingStatus::Confirmed)
        .await
        .unwrap_err();
    assert!(matches!(err, RentalError::State(_)));

    // Unavailable while the rental runs
    world
        .marketplace
        .catalog()
        .toggle_availability(&world.provider.id, item.id)
        .await
        .unwrap();

    let received = bookings.confirm_receipt(booking.id, &world.renter.id).await.unwrap();
    assert_eq!(received.booking.status, BookingStatus::Active);
    assert!(received.booking.item_received);

    let requested = bookings.request_return(booking.id, &world.renter.id).await.unwrap();
    assert!(requested.booking.return_requested);
    assert!(requested.booking.return_requested_at.is_some());

    let returned = bookings.confirm_return(booking.id, &world.provider.id).await.unwrap();
    assert!(returned.warnings.is_empty(), "{:?}", returned.warnings);

    let finished = bookings.get(booking.id).await.unwrap();
    assert_eq!(finished.status, BookingStatus::Completed);
    assert!(finished.return_confirmed);
    assert!(finished.item_returned);
    assert!(!finished.chat_enabled);
    assert!(world.marketplace.catalog().get_item(item.id).await.unwrap().available);

    // One notification per transition, each to the actor's counterpart
    let provider_inbox = world.marketplace.notifications().list_for_user(&world.provider.id).await.unwrap();
    let renter_inbox = world.marketplace.notifications().list_for_user(&world.renter.id).await.unwrap();
    assert_eq!(provider_inbox.len(), 3);
    assert_eq!(renter_inbox.len(), 1);
}

/// One pending request per renter and item
#[tokio::test]
async fn second_request_while_pending_conflicts() {
    let world = world();
    let (item, _) = world.pending_booking().await;

    let err = world
        .marketplace
        .bookings()
        .create_booking(&world.renter, item.id, Some(date(2025, 7, 1)), Some(date(2025, 7, 2)))
        .await
        .unwrap_err();
    assert!(matches!(err, RentalError::Conflict(_)));

    let mine = world.marketplace.bookings().by_renter(&world.renter.id).await.unwrap();
    assert_eq!(mine.len(), 1);
}

#[tokio::test]
async fn declined_request_frees_the_item_for_the_renter() {
    let world = world();
    let (item, booking) = world.pending_booking().await;

    let declined = world
        .marketplace
        .bookings()
        .set_status(booking.id, &world.provider.id, BookingStatus::Cancelled)
        .await
        .unwrap();
    assert_eq!(declined.booking.status, BookingStatus::Cancelled);

    let inbox = world.marketplace.notifications().list_for_user(&world.renter.id).await.unwrap();
    assert_eq!(inbox[0].title, "Booking declined");

    let again = world
        .marketplace
        .bookings()
        .create_booking(&world.renter, item.id, Some(date(2025, 7, 1)), Some(date(2025, 7, 2)))
        .await
        .unwrap();
    assert_eq!(again.total_price, Money::new(200));

    // A cancelled booking cannot be paid
    let err = world
        .marketplace
        .payments()
        .process_payment(booking.id, &world.renter.id, Money::new(300), PaymentMethod::Card)
        .await
        .unwrap_err();
    assert_eq!(err, RentalError::state("Only pending or approved bookings can be paid"));
}

#[tokio::test]
async fn dashboards_summarise_both_sides() {
    let world = world();
    let (_, paid) = world.pending_booking().await;
    world
        .marketplace
        .payments()
        .process_payment(paid.id, &world.renter.id, Money::new(300), PaymentMethod::Card)
        .await
        .unwrap();

    let other = world.list_calculator().await;
    let pending = world
        .marketplace
        .bookings()
        .create_booking(&world.renter, other.id, Some(date(2025, 8, 1)), Some(date(2025, 8, 1)))
        .await
        .unwrap();
    world.randomness.push_outcomes([false]);
    world
        .marketplace
        .payments()
        .process_payment(pending.id, &world.renter.id, Money::new(100), PaymentMethod::Upi)
        .await
        .unwrap();

    let renter = world.marketplace.dashboard().renter(&world.renter.id).await.unwrap();
    assert_eq!(renter.bookings.len(), 2);
    assert_eq!(renter.transactions.len(), 2);
    assert_eq!(renter.total_spent, Money::new(300));
    assert_eq!(renter.active_rentals, 1);
    assert_eq!(renter.completed_rentals, 0);

    let provider = world.marketplace.dashboard().provider(&world.provider.id).await.unwrap();
    assert_eq!(provider.earnings, Money::new(300));
    assert_eq!(provider.pending_requests, 1);
    assert_eq!(provider.listings.len(), 2);
    assert_eq!(provider.available_listings, 2);
}
