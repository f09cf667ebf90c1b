//! Notification trigger and notification center.
//!
//! Every state-changing booking operation produces one notification for the
//! counterpart of the actor. Posting is best-effort from the caller's point
//! of view: a failed post is reported, never rolled back into the booking.

use crate::error::{RentalError, RentalResult};
use crate::shell::ShellEvent;
use crate::store::{Collection, DocumentStore, Subscription};
use crate::types::{
    Booking, Money, Notification, NotificationId, NotificationMetadata, NotificationType, UserId,
};
use campus_rental_core::environment::Clock;
use campus_rental_core::event_bus::EventBus;
use std::sync::Arc;

fn or<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.trim().is_empty() { fallback } else { value }
}

/// A notification before it is stored
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NotificationDraft {
    /// Recipient
    pub user_id: UserId,
    /// Short title
    pub title: String,
    /// Body text
    pub body: String,
    /// Category
    pub kind: NotificationType,
    /// Back-references
    pub metadata: NotificationMetadata,
}

impl NotificationDraft {
    fn booking(user_id: &UserId, title: &str, body: String, booking: &Booking) -> Self {
        Self {
            user_id: user_id.clone(),
            title: title.to_string(),
            body,
            kind: NotificationType::Booking,
            metadata: NotificationMetadata {
                booking_id: Some(booking.id),
                sender_id: None,
                renter_id: Some(booking.renter_id.clone()),
                provider_id: Some(booking.provider_id.clone()),
            },
        }
    }

    /// Provider approved or declined a pending request; goes to the renter
    #[must_use]
    pub fn booking_decided(booking: &Booking, approved: bool) -> Self {
        let (title, verb) = if approved {
            ("Booking approved", "approved")
        } else {
            ("Booking declined", "declined")
        };
        let body = format!(
            "{} {verb} your request for {}.",
            or(&booking.provider_name, "Your lender"),
            or(&booking.item_title, "the item"),
        );
        Self::booking(&booking.renter_id, title, body, booking)
    }

    /// Renter paid; goes to the provider
    #[must_use]
    pub fn payment_received(booking: &Booking, amount: Money) -> Self {
        let body = format!(
            "{} paid {amount} for {}.",
            or(&booking.renter_name, "Your renter"),
            or(&booking.item_title, "the item"),
        );
        Self::booking(&booking.provider_id, "Payment received", body, booking)
    }

    /// Renter confirmed the handover; goes to the provider
    #[must_use]
    pub fn item_handed_over(booking: &Booking) -> Self {
        let body = format!(
            "{} confirmed they received {}.",
            or(&booking.renter_name, "Your renter"),
            or(&booking.item_title, "the item"),
        );
        Self::booking(&booking.provider_id, "Item handed over", body, booking)
    }

    /// Renter is ready to give the item back; goes to the provider
    #[must_use]
    pub fn return_requested(booking: &Booking) -> Self {
        let body = format!(
            "{} marked {} as ready for pickup.",
            or(&booking.renter_name, "Your renter"),
            or(&booking.item_title, "the item"),
        );
        Self::booking(&booking.provider_id, "Return requested", body, booking)
    }

    /// Provider has the item back; goes to the renter
    #[must_use]
    pub fn return_confirmed(booking: &Booking) -> Self {
        let body = format!(
            "{} confirmed the return of {}.",
            or(&booking.provider_name, "Your lender"),
            or(&booking.item_title, "the item"),
        );
        Self::booking(&booking.renter_id, "Return confirmed", body, booking)
    }

    /// A chat message arrived; goes to the receiver
    #[must_use]
    pub fn chat_message(booking: &Booking, sender: &UserId, receiver: &UserId, sender_name: &str) -> Self {
        let body = if sender_name.trim().is_empty() || booking.item_title.trim().is_empty() {
            "You have a new message about your booking.".to_string()
        } else {
            format!("{sender_name} sent a message about {}.", booking.item_title)
        };
        Self {
            user_id: receiver.clone(),
            title: "New chat message".to_string(),
            body,
            kind: NotificationType::Chat,
            metadata: NotificationMetadata {
                booking_id: Some(booking.id),
                sender_id: Some(sender.clone()),
                renter_id: Some(booking.renter_id.clone()),
                provider_id: Some(booking.provider_id.clone()),
            },
        }
    }
}

/// Stores notifications and announces them on the shell bus
pub struct NotificationCenter {
    store: Arc<dyn DocumentStore>,
    bus: Arc<dyn EventBus<ShellEvent>>,
    clock: Arc<dyn Clock>,
}

impl NotificationCenter {
    /// Creates a new notification center
    #[must_use]
    pub fn new(
        store: Arc<dyn DocumentStore>,
        bus: Arc<dyn EventBus<ShellEvent>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { store, bus, clock }
    }

    /// Store a notification and publish [`ShellEvent::NotificationPosted`].
    ///
    /// # Errors
    ///
    /// Returns [`RentalError::TransientStore`] if the insert fails. Nothing
    /// is published in that case.
    pub async fn post(&self, draft: NotificationDraft) -> RentalResult<Notification> {
        let notification = Notification {
            id: NotificationId::new(),
            user_id: draft.user_id,
            title: draft.title,
            body: draft.body,
            kind: draft.kind,
            read: false,
            metadata: draft.metadata,
            created_at: self.clock.now(),
        };

        if let Err(error) = self.store.insert_notification(notification.clone()).await {
            metrics::counter!("notifications.failed").increment(1);
            tracing::warn!(user_id = %notification.user_id, title = %notification.title, %error, "Notification not stored");
            return Err(error.into());
        }

        metrics::counter!("notifications.posted").increment(1);
        tracing::info!(
            user_id = %notification.user_id,
            title = %notification.title,
            "Notification posted"
        );

        if let Err(error) = self
            .bus
            .publish(ShellEvent::NotificationPosted {
                notification: notification.clone(),
            })
            .await
        {
            tracing::debug!(%error, "Notification not announced");
        }
        Ok(notification)
    }

    /// Notifications for `user`, newest first
    ///
    /// # Errors
    ///
    /// Returns [`RentalError::TransientStore`] if the query fails.
    pub async fn list_for_user(&self, user: &UserId) -> RentalResult<Vec<Notification>> {
        let mut notifications = self.store.notifications_for_user(user.clone()).await?;
        sort_newest_first(&mut notifications);
        Ok(notifications)
    }

    /// Number of unread notifications for `user`
    ///
    /// # Errors
    ///
    /// Returns [`RentalError::TransientStore`] if the query fails.
    pub async fn unread_count(&self, user: &UserId) -> RentalResult<usize> {
        let notifications = self.store.notifications_for_user(user.clone()).await?;
        Ok(notifications.iter().filter(|n| !n.read).count())
    }

    /// Mark one notification as read
    ///
    /// # Errors
    ///
    /// Returns [`RentalError::NotFound`] if the notification does not exist.
    pub async fn mark_read(&self, id: NotificationId) -> RentalResult<()> {
        self.store.mark_notification_read(id).await.map_err(RentalError::from)
    }

    /// Mark every unread notification of `user` as read; returns how many
    /// changed
    ///
    /// # Errors
    ///
    /// Returns the first store failure. Notifications marked before it stay
    /// marked.
    pub async fn mark_all_read(&self, user: &UserId) -> RentalResult<usize> {
        let notifications = self.store.notifications_for_user(user.clone()).await?;
        let mut marked = 0;
        for notification in notifications.iter().filter(|n| !n.read) {
            self.store.mark_notification_read(notification.id).await?;
            marked += 1;
        }
        tracing::debug!(user_id = %user, marked, "Notifications marked read");
        Ok(marked)
    }

    /// Live list of `user`'s notifications, newest first
    #[must_use]
    pub fn watch(&self, user: &UserId) -> Subscription<Notification> {
        let user = user.clone();
        Subscription::new(Arc::clone(&self.store), Collection::Notifications, move |store| {
            let user = user.clone();
            async move {
                let mut notifications = store.notifications_for_user(user).await?;
                sort_newest_first(&mut notifications);
                Ok(notifications)
            }
        })
    }
}

fn sort_newest_first(notifications: &mut [Notification]) {
    // Later inserts win ties
    notifications.reverse();
    notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::store::InMemoryDocumentStore;
    use campus_rental_core::event_bus::BroadcastEventBus;
    use campus_rental_testing::ManualClock;
    use campus_rental_testing::test_epoch;
    use futures::StreamExt;

    fn center() -> (NotificationCenter, Arc<InMemoryDocumentStore>, Arc<BroadcastEventBus<ShellEvent>>, ManualClock) {
        let store = Arc::new(InMemoryDocumentStore::new());
        let bus = Arc::new(BroadcastEventBus::new(16));
        let clock = ManualClock::new(test_epoch());
        let center = NotificationCenter::new(store.clone(), bus.clone(), Arc::new(clock.clone()));
        (center, store, bus, clock)
    }

    fn draft(user: &str, title: &str) -> NotificationDraft {
        NotificationDraft {
            user_id: UserId::new(user),
            title: title.to_string(),
            body: String::new(),
            kind: NotificationType::System,
            metadata: NotificationMetadata::default(),
        }
    }

    #[tokio::test]
    async fn posted_notifications_are_announced() {
        let (center, _store, bus, _clock) = center();
        let mut events = bus.subscribe();

        let posted = center.post(draft("asha", "Welcome")).await.unwrap();

        assert_eq!(
            events.next().await.unwrap().unwrap(),
            ShellEvent::NotificationPosted {
                notification: posted
            }
        );
    }

    #[tokio::test]
    async fn listing_is_newest_first_and_read_state_is_tracked() {
        let (center, _store, _bus, clock) = center();
        let asha = UserId::new("asha");

        center.post(draft("asha", "first")).await.unwrap();
        clock.advance(chrono::Duration::minutes(5));
        center.post(draft("asha", "second")).await.unwrap();
        center.post(draft("dev", "not yours")).await.unwrap();

        let listed = center.list_for_user(&asha).await.unwrap();
        let titles: Vec<_> = listed.iter().map(|n| n.title.as_str()).collect();
        assert_eq!(titles, ["second", "first"]);
        assert_eq!(center.unread_count(&asha).await.unwrap(), 2);

        center.mark_read(listed[0].id).await.unwrap();
        assert_eq!(center.unread_count(&asha).await.unwrap(), 1);

        assert_eq!(center.mark_all_read(&asha).await.unwrap(), 1);
        assert_eq!(center.unread_count(&asha).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn marking_a_missing_notification_is_not_found() {
        let (center, _store, _bus, _clock) = center();
        let err = center.mark_read(NotificationId::new()).await.unwrap_err();
        assert!(matches!(err, RentalError::NotFound { kind: "notification", .. }));
    }

    #[tokio::test]
    async fn failed_insert_publishes_nothing() {
        let (center, store, bus, _clock) = center();
        let mut events = bus.subscribe();
        store.fail_notification_writes(true);

        assert!(center.post(draft("asha", "lost")).await.is_err());
        let next = tokio::time::timeout(std::time::Duration::from_millis(20), events.next()).await;
        assert!(next.is_err());
    }

    #[test]
    fn templates_fall_back_when_snapshots_are_blank() {
        let booking = crate::testkit::booking();
        let mut blank = booking.clone();
        blank.renter_name = String::new();
        blank.item_title = "  ".to_string();

        let draft = NotificationDraft::item_handed_over(&blank);
        assert_eq!(draft.user_id, booking.provider_id);
        assert_eq!(draft.body, "Your renter confirmed they received the item.");

        let draft = NotificationDraft::return_confirmed(&booking);
        assert_eq!(draft.user_id, booking.renter_id);
        assert_eq!(draft.body, "Dev confirmed the return of Graphing calculator.");
    }
}
