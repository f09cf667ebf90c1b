//! Domain types for the campus rental marketplace.
//!
//! Value objects, entities and enums shared by the booking workflows, the
//! payment simulator, the ledger and the chat/notification features. Wire
//! names are camelCase to match the document collections.

use crate::error::RentalError;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            #[doc = concat!("Creates a new random `", stringify!($name), "`")]
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            #[doc = concat!("Create a `", stringify!($name), "` from a `Uuid`")]
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Get the inner UUID
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for a listed item
    ItemId
);
uuid_id!(
    /// Unique identifier for a booking
    BookingId
);
uuid_id!(
    /// Unique identifier for a ledger transaction
    TransactionId
);
uuid_id!(
    /// Unique identifier for a notification
    NotificationId
);
uuid_id!(
    /// Unique identifier for a chat message
    MessageId
);

/// Identifier of an authenticated user.
///
/// Issued by the identity provider and opaque to the marketplace.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Wrap an identity-provider user id
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw id
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Snapshot of the acting user, as supplied by the authenticated caller.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// User id
    pub id: UserId,
    /// Display name
    pub name: String,
    /// Contact email, if known
    pub email: Option<String>,
}

impl UserProfile {
    /// Build a profile snapshot
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, email: Option<String>) -> Self {
        Self {
            id: UserId::new(id),
            name: name.into(),
            email,
        }
    }
}

// ============================================================================
// Value Objects
// ============================================================================

/// An amount of money in whole currency units.
///
/// The marketplace prices items per day with no minor unit and a single
/// currency, so a plain unsigned integer is exact.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(u64);

impl Money {
    /// Zero
    pub const ZERO: Self = Self(0);

    /// Create an amount
    #[must_use]
    pub const fn new(amount: u64) -> Self {
        Self(amount)
    }

    /// The amount in whole units
    #[must_use]
    pub const fn amount(&self) -> u64 {
        self.0
    }

    /// Returns `true` if the amount is zero
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Add two amounts, returning `None` on overflow
    #[must_use]
    pub const fn checked_add(self, other: Self) -> Option<Self> {
        match self.0.checked_add(other.0) {
            Some(sum) => Some(Self(sum)),
            None => None,
        }
    }

    /// Add two amounts, clamping at the maximum
    #[must_use]
    pub const fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    /// Multiply by a day count, returning `None` on overflow
    #[must_use]
    pub const fn checked_multiply(self, days: u32) -> Option<Self> {
        match self.0.checked_mul(days as u64) {
            Some(total) => Some(Self(total)),
            None => None,
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "₹{}", self.0)
    }
}

/// An inclusive range of rental days.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RentalPeriod {
    start_date: NaiveDate,
    end_date: NaiveDate,
}

impl RentalPeriod {
    /// Build a period from optional form input.
    ///
    /// # Errors
    ///
    /// Returns [`RentalError::Validation`] if either date is missing or the
    /// end date falls before the start date.
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<Self, RentalError> {
        let (Some(start_date), Some(end_date)) = (start, end) else {
            return Err(RentalError::validation("Please select start and end dates"));
        };
        if end_date < start_date {
            return Err(RentalError::validation("End date must be after start date"));
        }
        Ok(Self {
            start_date,
            end_date,
        })
    }

    /// First rental day
    #[must_use]
    pub const fn start_date(&self) -> NaiveDate {
        self.start_date
    }

    /// Last rental day (inclusive)
    #[must_use]
    pub const fn end_date(&self) -> NaiveDate {
        self.end_date
    }

    /// Number of rental days, counting both ends. Always at least 1.
    #[must_use]
    pub fn day_count(&self) -> u32 {
        let days = (self.end_date - self.start_date).num_days() + 1;
        u32::try_from(days).unwrap_or(u32::MAX).max(1)
    }

    /// Price of the whole period at `price_per_day`
    ///
    /// # Errors
    ///
    /// Returns [`RentalError::Validation`] if the total overflows.
    pub fn total_price(&self, price_per_day: Money) -> Result<Money, RentalError> {
        price_per_day
            .checked_multiply(self.day_count())
            .ok_or_else(|| RentalError::validation("Total price is too large"))
    }
}

// ============================================================================
// Enums
// ============================================================================

/// Listing category
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Clothes
    Clothes,
    /// Gadgets
    Gadgets,
    /// Books
    Books,
    /// Accessories
    Accessories,
}

/// Canonical booking status.
///
/// ```text
/// pending   --(provider approves or payment succeeds)--> confirmed
/// pending   --(provider rejects)-----------------------> cancelled
/// confirmed --(renter confirms receipt)----------------> active
/// active    --(provider confirms return)---------------> completed
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    /// Awaiting payment or provider decision
    #[default]
    Pending,
    /// Approved or paid, item not yet handed over
    Confirmed,
    /// Item is with the renter
    Active,
    /// Item returned and return confirmed
    Completed,
    /// Rejected by the provider
    Cancelled,
}

impl BookingStatus {
    /// Whether `self -> next` is an edge of the lifecycle graph
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Confirmed | Self::Cancelled)
                | (Self::Confirmed, Self::Active | Self::Pending)
                | (Self::Active, Self::Completed)
        )
    }

    /// Statuses that stop the same renter from booking the item again
    #[must_use]
    pub const fn is_blocking(self) -> bool {
        matches!(self, Self::Pending | Self::Confirmed | Self::Active)
    }

    /// No further transitions are possible
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payment state of a booking
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    /// No attempt settled yet
    #[default]
    Pending,
    /// Last attempt succeeded
    Success,
    /// Last attempt failed
    Failed,
}

/// Payment method chosen by the renter
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    /// Credit or debit card
    Card,
    /// Unified Payments Interface
    Upi,
    /// Stored-value wallet
    Wallet,
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Card => "card",
            Self::Upi => "upi",
            Self::Wallet => "wallet",
        })
    }
}

/// Outcome recorded on a ledger row.
///
/// `Pending` exists in the wire format but is never written by the
/// payment simulator: every attempt settles as `Success` or `Failed`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    /// Not settled
    Pending,
    /// Charged
    Success,
    /// Declined
    Failed,
}

impl From<TransactionStatus> for PaymentStatus {
    fn from(status: TransactionStatus) -> Self {
        match status {
            TransactionStatus::Pending => Self::Pending,
            TransactionStatus::Success => Self::Success,
            TransactionStatus::Failed => Self::Failed,
        }
    }
}

/// Notification category
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationType {
    /// Booking lifecycle change
    Booking,
    /// New chat message
    Chat,
    /// Anything else
    #[default]
    System,
}

// ============================================================================
// Entities
// ============================================================================

/// Image reference on a listing.
///
/// Older listings store a bare URL; newer ones store a URL with an optional
/// thumbnail. Both shapes deserialize.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ImageRef {
    /// Legacy bare URL
    Url(String),
    /// URL with optional thumbnail
    Sized {
        /// Full-size image
        url: String,
        /// Thumbnail, if generated
        #[serde(default, skip_serializing_if = "Option::is_none")]
        thumb: Option<String>,
    },
}

impl ImageRef {
    /// Full-size URL
    #[must_use]
    pub fn url(&self) -> &str {
        match self {
            Self::Url(url) | Self::Sized { url, .. } => url,
        }
    }

    /// Thumbnail URL, falling back to the full-size image
    #[must_use]
    pub fn thumb(&self) -> &str {
        match self {
            Self::Sized {
                thumb: Some(thumb), ..
            } => thumb,
            _ => self.url(),
        }
    }
}

/// A listed item
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    /// Item ID
    pub id: ItemId,
    /// Owner
    pub provider_id: UserId,
    /// Owner display name at listing time
    pub provider_name: String,
    /// Title
    pub title: String,
    /// Free-text description
    pub description: String,
    /// Category
    pub category: Category,
    /// Price per rental day
    #[serde(rename = "price")]
    pub price_per_day: Money,
    /// Whether the item can currently be booked
    pub available: bool,
    /// Ordered image references
    pub images: Vec<ImageRef>,
    /// When listed
    pub created_at: DateTime<Utc>,
    /// Last modification
    pub updated_at: DateTime<Utc>,
}

/// A rental booking
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(clippy::struct_excessive_bools)] // Workflow flags mirror the stored document
pub struct Booking {
    /// Booking ID
    pub id: BookingId,
    /// Booked item
    pub item_id: ItemId,
    /// Renter
    pub renter_id: UserId,
    /// Item owner
    pub provider_id: UserId,
    /// Item title at booking time
    pub item_title: String,
    /// Renter display name at booking time
    pub renter_name: String,
    /// Renter email at booking time
    pub renter_email: Option<String>,
    /// Provider display name at booking time
    pub provider_name: String,
    /// First rental day
    pub start_date: NaiveDate,
    /// Last rental day (inclusive)
    pub end_date: NaiveDate,
    /// Fixed at creation
    pub total_price: Money,
    /// Lifecycle status
    pub status: BookingStatus,
    /// Payment state
    pub payment_status: PaymentStatus,
    /// Method of the latest settled attempt
    pub payment_method: Option<PaymentMethod>,
    /// Ledger row of the successful payment
    pub transaction_id: Option<TransactionId>,
    /// Chat unlocked by payment
    pub chat_enabled: bool,
    /// Renter confirmed handover
    pub item_received: bool,
    /// Renter asked to return the item
    pub return_requested: bool,
    /// Provider confirmed the return
    pub return_confirmed: bool,
    /// Item is back with the provider
    pub item_returned: bool,
    /// When the return was requested
    pub return_requested_at: Option<DateTime<Utc>>,
    /// When the return was confirmed
    pub return_confirmed_at: Option<DateTime<Utc>>,
    /// When the renter confirmed handover
    pub received_at: Option<DateTime<Utc>>,
    /// First 160 characters of the newest chat message
    pub last_message_preview: Option<String>,
    /// When the newest chat message was sent
    pub last_message_at: Option<DateTime<Utc>>,
    /// Who sent the newest chat message
    pub last_message_sender_id: Option<UserId>,
    /// When created
    pub created_at: DateTime<Utc>,
    /// Last modification
    pub updated_at: DateTime<Utc>,
    /// Store-managed write counter for conditional updates
    #[serde(default)]
    pub revision: u64,
}

impl Booking {
    /// The rental period
    #[must_use]
    pub const fn period(&self) -> RentalPeriod {
        RentalPeriod {
            start_date: self.start_date,
            end_date: self.end_date,
        }
    }

    /// Whether this booking stops its renter from booking the item again
    /// on `today`
    #[must_use]
    pub fn blocks_new_requests(&self, today: NaiveDate) -> bool {
        self.status.is_blocking() && self.end_date >= today
    }

    /// Why this booking cannot take a payment, if it cannot.
    ///
    /// Pending and provider-approved bookings stay payable until a payment
    /// succeeds.
    #[must_use]
    pub fn payment_refusal(&self) -> Option<&'static str> {
        if self.payment_status == PaymentStatus::Success {
            return Some("This booking has already been paid");
        }
        match self.status {
            BookingStatus::Pending | BookingStatus::Confirmed => None,
            BookingStatus::Active | BookingStatus::Completed | BookingStatus::Cancelled => {
                Some("Only pending or approved bookings can be paid")
            },
        }
    }

    /// Whether `user` is the renter or the provider
    #[must_use]
    pub fn is_participant(&self, user: &UserId) -> bool {
        &self.renter_id == user || &self.provider_id == user
    }

    /// The other party of the booking, if `user` is a participant
    #[must_use]
    pub fn counterpart_of(&self, user: &UserId) -> Option<&UserId> {
        if user == &self.renter_id {
            Some(&self.provider_id)
        } else if user == &self.provider_id {
            Some(&self.renter_id)
        } else {
            None
        }
    }
}

/// A ledger row for one payment attempt
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Transaction ID
    pub id: TransactionId,
    /// Paid booking
    pub booking_id: BookingId,
    /// Amount charged or attempted
    pub amount: Money,
    /// Payer
    pub renter_id: UserId,
    /// Payee
    pub provider_id: UserId,
    /// Payment method
    pub method: PaymentMethod,
    /// Outcome
    pub status: TransactionStatus,
    /// Human-readable gateway reference
    pub reference_id: String,
    /// Item title snapshot
    pub item_title: String,
    /// Renter name snapshot
    pub renter_name: String,
    /// Provider name snapshot
    pub provider_name: String,
    /// When recorded
    pub created_at: DateTime<Utc>,
}

/// Back-references carried by a notification
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationMetadata {
    /// Related booking
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub booking_id: Option<BookingId>,
    /// Sender of a chat message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<UserId>,
    /// Renter of the related booking
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub renter_id: Option<UserId>,
    /// Provider of the related booking
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<UserId>,
}

/// An in-app notification
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// Notification ID
    pub id: NotificationId,
    /// Recipient
    pub user_id: UserId,
    /// Short title
    pub title: String,
    /// Body text
    pub body: String,
    /// Category
    #[serde(rename = "type", default)]
    pub kind: NotificationType,
    /// Whether the recipient has seen it
    #[serde(default)]
    pub read: bool,
    /// Back-references
    #[serde(default)]
    pub metadata: NotificationMetadata,
    /// When posted
    pub created_at: DateTime<Utc>,
}

/// A chat message scoped to a booking
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Message ID
    pub id: MessageId,
    /// Booking thread
    pub booking_id: BookingId,
    /// Author
    pub sender_id: UserId,
    /// The other participant
    pub receiver_id: UserId,
    /// Message text
    pub content: String,
    /// Whether the receiver has seen it
    #[serde(default)]
    pub read: bool,
    /// When sent
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Results
// ============================================================================

/// Result of one payment attempt, as reported to the payer
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaymentOutcome {
    /// `Success` or `Failed`
    pub status: TransactionStatus,
    /// Gateway reference, present for every settled attempt
    pub reference_id: Option<String>,
    /// Ledger row written for this attempt
    pub transaction_id: Option<TransactionId>,
    /// User-facing message on failure
    pub message: Option<String>,
    /// Best-effort follow-ups that did not go through
    pub warnings: Vec<String>,
}

impl PaymentOutcome {
    /// Whether the charge was committed
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.status == TransactionStatus::Success
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn period_counts_both_ends() {
        let period = RentalPeriod::new(Some(date(2025, 6, 1)), Some(date(2025, 6, 3))).unwrap();
        assert_eq!(period.day_count(), 3);
        assert_eq!(period.total_price(Money::new(100)).unwrap(), Money::new(300));
    }

    #[test]
    fn same_day_rental_is_one_day() {
        let period = RentalPeriod::new(Some(date(2025, 6, 1)), Some(date(2025, 6, 1))).unwrap();
        assert_eq!(period.day_count(), 1);
    }

    #[test]
    fn period_rejects_missing_or_reversed_dates() {
        assert!(matches!(
            RentalPeriod::new(None, Some(date(2025, 6, 1))),
            Err(RentalError::Validation(_))
        ));
        assert_eq!(
            RentalPeriod::new(Some(date(2025, 6, 3)), Some(date(2025, 6, 1))),
            Err(RentalError::validation("End date must be after start date"))
        );
    }

    #[test]
    fn lifecycle_edges() {
        use BookingStatus::{Active, Cancelled, Completed, Confirmed, Pending};

        assert!(Pending.can_transition_to(Confirmed));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Confirmed.can_transition_to(Active));
        // A declined charge reopens an approved, unpaid booking
        assert!(Confirmed.can_transition_to(Pending));
        assert!(Active.can_transition_to(Completed));

        assert!(!Confirmed.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(Active));
        assert!(!Pending.can_transition_to(Active));
    }

    #[test]
    fn image_refs_accept_both_shapes() {
        let images: Vec<ImageRef> = serde_json::from_str(
            r#"["https://cdn/a.jpg", {"url": "https://cdn/b.jpg", "thumb": "https://cdn/b_t.jpg"}, {"url": "https://cdn/c.jpg"}]"#,
        )
        .unwrap();

        assert_eq!(images[0].thumb(), "https://cdn/a.jpg");
        assert_eq!(images[1].thumb(), "https://cdn/b_t.jpg");
        assert_eq!(images[2].url(), "https://cdn/c.jpg");
        assert_eq!(images[2].thumb(), "https://cdn/c.jpg");
    }

    #[test]
    fn enums_use_lowercase_wire_names() {
        assert_eq!(serde_json::to_string(&BookingStatus::Cancelled).unwrap(), "\"cancelled\"");
        assert_eq!(serde_json::to_string(&PaymentMethod::Upi).unwrap(), "\"upi\"");
        assert_eq!(
            serde_json::from_str::<Category>("\"accessories\"").unwrap(),
            Category::Accessories
        );
    }

    #[test]
    fn money_overflow_is_detected() {
        assert_eq!(Money::new(u64::MAX).checked_multiply(2), None);
        assert_eq!(Money::new(u64::MAX).saturating_add(Money::new(1)), Money::new(u64::MAX));
        assert_eq!(Money::new(40).to_string(), "₹40");
    }
}
