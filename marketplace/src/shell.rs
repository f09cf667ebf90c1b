//! Events the core raises for the surrounding application shell.
//!
//! The shell (navigation, payment sheet, chat drawer, notification bell)
//! subscribes to a [`BroadcastEventBus`](campus_rental_core::event_bus::BroadcastEventBus)
//! of [`ShellEvent`]s instead of being called directly.

use crate::types::{BookingId, Notification, UserId};

/// Requests and announcements for the application shell
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ShellEvent {
    /// Show the payment sheet for a booking
    OpenPayment {
        /// Booking to pay for
        booking_id: BookingId,
    },
    /// Open the chat drawer of a booking
    OpenChat {
        /// Booking thread
        booking_id: BookingId,
    },
    /// Show a user's public profile
    OpenProfile {
        /// Profile to show
        user_id: UserId,
    },
    /// A notification was stored
    NotificationPosted {
        /// The stored notification
        notification: Notification,
    },
}
