//! Versioned wire record for bookings.
//!
//! Bookings written by older clients lack the chat, handoff and payment
//! fields, and some stored full timestamps where a date belongs. A
//! [`BookingRecord`] accepts every shape that has been written and fills
//! the gaps with explicit defaults, so the rest of the crate only ever sees
//! a complete [`Booking`].
//!
//! | field missing          | decoded as  |
//! |------------------------|-------------|
//! | `schemaVersion`        | 1           |
//! | `chatEnabled`, flags   | `false`     |
//! | `paymentStatus`        | `pending`   |
//! | snapshot names         | `""`        |
//! | `revision`             | 0           |

use crate::store::DocumentStoreError;
use crate::types::{
    Booking, BookingId, BookingStatus, ItemId, Money, PaymentMethod, PaymentStatus, TransactionId,
    UserId,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Version written by this crate
pub const CURRENT_SCHEMA_VERSION: u32 = 2;

const fn legacy_schema_version() -> u32 {
    1
}

/// Stored shape of a booking document
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(clippy::struct_excessive_bools)] // Mirrors the stored document
pub struct BookingRecord {
    /// Record layout version
    #[serde(default = "legacy_schema_version")]
    pub schema_version: u32,
    /// Booking ID
    pub id: BookingId,
    /// Booked item
    pub item_id: ItemId,
    /// Renter
    pub renter_id: UserId,
    /// Provider
    pub provider_id: UserId,
    /// Item title snapshot
    #[serde(default)]
    pub item_title: String,
    /// Renter name snapshot
    #[serde(default)]
    pub renter_name: String,
    /// Renter email snapshot
    #[serde(default)]
    pub renter_email: Option<String>,
    /// Provider name snapshot
    #[serde(default)]
    pub provider_name: String,
    /// First rental day
    #[serde(deserialize_with = "date_or_timestamp")]
    pub start_date: NaiveDate,
    /// Last rental day
    #[serde(deserialize_with = "date_or_timestamp")]
    pub end_date: NaiveDate,
    /// Total price
    pub total_price: Money,
    /// Lifecycle status
    pub status: BookingStatus,
    /// Payment state
    #[serde(default)]
    pub payment_status: PaymentStatus,
    /// Payment method
    #[serde(default)]
    pub payment_method: Option<PaymentMethod>,
    /// Successful ledger row
    #[serde(default)]
    pub transaction_id: Option<TransactionId>,
    /// Chat unlocked
    #[serde(default)]
    pub chat_enabled: bool,
    /// Handover confirmed
    #[serde(default)]
    pub item_received: bool,
    /// Return requested
    #[serde(default)]
    pub return_requested: bool,
    /// Return confirmed
    #[serde(default)]
    pub return_confirmed: bool,
    /// Item back with provider
    #[serde(default)]
    pub item_returned: bool,
    /// When the return was requested
    #[serde(default)]
    pub return_requested_at: Option<DateTime<Utc>>,
    /// When the return was confirmed
    #[serde(default)]
    pub return_confirmed_at: Option<DateTime<Utc>>,
    /// When the handover was confirmed
    #[serde(default)]
    pub received_at: Option<DateTime<Utc>>,
    /// Newest chat message preview
    #[serde(default)]
    pub last_message_preview: Option<String>,
    /// Newest chat message time
    #[serde(default)]
    pub last_message_at: Option<DateTime<Utc>>,
    /// Newest chat message sender
    #[serde(default)]
    pub last_message_sender_id: Option<UserId>,
    /// When created
    #[serde(default)]
    pub created_at: DateTime<Utc>,
    /// Last modification
    #[serde(default)]
    pub updated_at: DateTime<Utc>,
    /// Conditional-write counter
    #[serde(default)]
    pub revision: u64,
}

/// Accept `"2025-06-01"` or a full RFC 3339 timestamp
fn date_or_timestamp<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(date);
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc).date_naive())
        .map_err(|_| serde::de::Error::custom(format!("invalid date: {raw}")))
}

impl BookingRecord {
    /// Decode a stored document
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::Serialization`] if the document does
    /// not match any known layout.
    pub fn decode(document: serde_json::Value) -> Result<Booking, DocumentStoreError> {
        serde_json::from_value::<Self>(document)
            .map(Booking::from)
            .map_err(|e| DocumentStoreError::Serialization(e.to_string()))
    }

    /// Encode a booking at the current schema version
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::Serialization`] if encoding fails.
    pub fn encode(booking: &Booking) -> Result<serde_json::Value, DocumentStoreError> {
        serde_json::to_value(Self::from(booking.clone()))
            .map_err(|e| DocumentStoreError::Serialization(e.to_string()))
    }
}

impl From<BookingRecord> for Booking {
    fn from(record: BookingRecord) -> Self {
        Self {
            id: record.id,
            item_id: record.item_id,
            renter_id: record.renter_id,
            provider_id: record.provider_id,
            item_title: record.item_title,
            renter_name: record.renter_name,
            renter_email: record.renter_email,
            provider_name: record.provider_name,
            start_date: record.start_date,
            end_date: record.end_date,
            total_price: record.total_price,
            status: record.status,
            payment_status: record.payment_status,
            payment_method: record.payment_method,
            transaction_id: record.transaction_id,
            chat_enabled: record.chat_enabled,
            item_received: record.item_received,
            return_requested: record.return_requested,
            return_confirmed: record.return_confirmed,
            item_returned: record.item_returned,
            return_requested_at: record.return_requested_at,
            return_confirmed_at: record.return_confirmed_at,
            received_at: record.received_at,
            last_message_preview: record.last_message_preview,
            last_message_at: record.last_message_at,
            last_message_sender_id: record.last_message_sender_id,
            created_at: record.created_at,
            updated_at: record.updated_at,
            revision: record.revision,
        }
    }
}

impl From<Booking> for BookingRecord {
    fn from(booking: Booking) -> Self {
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            id: booking.id,
            item_id: booking.item_id,
            renter_id: booking.renter_id,
            provider_id: booking.provider_id,
            item_title: booking.item_title,
            renter_name: booking.renter_name,
            renter_email: booking.renter_email,
            provider_name: booking.provider_name,
            start_date: booking.start_date,
            end_date: booking.end_date,
            total_price: booking.total_price,
            status: booking.status,
            payment_status: booking.payment_status,
            payment_method: booking.payment_method,
            transaction_id: booking.transaction_id,
            chat_enabled: booking.chat_enabled,
            item_received: booking.item_received,
            return_requested: booking.return_requested,
            return_confirmed: booking.return_confirmed,
            item_returned: booking.item_returned,
            return_requested_at: booking.return_requested_at,
            return_confirmed_at: booking.return_confirmed_at,
            received_at: booking.received_at,
            last_message_preview: booking.last_message_preview,
            last_message_at: booking.last_message_at,
            last_message_sender_id: booking.last_message_sender_id,
            created_at: booking.created_at,
            updated_at: booking.updated_at,
            revision: booking.revision,
        }
    }
}
