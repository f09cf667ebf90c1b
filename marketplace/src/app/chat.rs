//! Per-booking chat between renter and provider.

use super::read_with_retry;
use crate::error::{RentalError, RentalResult};
use crate::notifications::{NotificationCenter, NotificationDraft};
use crate::store::{Collection, DocumentStore, Subscription};
use crate::types::{Booking, BookingId, BookingStatus, ChatMessage, MessageId, UserProfile};
use campus_rental_core::environment::Clock;
use campus_rental_runtime::retry::RetryPolicy;
use std::sync::Arc;

/// Characters kept in the booking's last-message preview
pub const PREVIEW_CHARS: usize = 160;

/// Whether a booking's chat accepts messages
pub struct ChatGate;

impl ChatGate {
    /// Chat is open once the booking is paid and until it ends
    #[must_use]
    pub fn is_open(booking: &Booking) -> bool {
        booking.chat_enabled
            && !matches!(booking.status, BookingStatus::Cancelled | BookingStatus::Completed)
    }
}

/// A stored message plus follow-ups that failed
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SentMessage {
    /// The message as stored
    pub message: ChatMessage,
    /// Preview or notification failures
    pub warnings: Vec<String>,
}

/// Chat threads
#[derive(Clone)]
pub struct ChatService {
    store: Arc<dyn DocumentStore>,
    notifier: Arc<NotificationCenter>,
    clock: Arc<dyn Clock>,
    read_policy: RetryPolicy,
}

impl ChatService {
    /// Creates a new `ChatService`
    #[must_use]
    pub fn new(
        store: Arc<dyn DocumentStore>,
        notifier: Arc<NotificationCenter>,
        clock: Arc<dyn Clock>,
        read_policy: RetryPolicy,
    ) -> Self {
        Self {
            store,
            notifier,
            clock,
            read_policy,
        }
    }

    /// Post a message to a booking's thread.
    ///
    /// The preview cache and the receiver's notification are best effort;
    /// their failures come back as warnings.
    ///
    /// # Errors
    ///
    /// - [`RentalError::Validation`] for a blank message
    /// - [`RentalError::State`] if chat is closed or `sender` is not part of
    ///   the booking
    /// - [`RentalError::NotFound`] for an unknown booking
    pub async fn send_message(
        &self,
        booking_id: BookingId,
        sender: &UserProfile,
        content: &str,
    ) -> RentalResult<SentMessage> {
        let content = content.trim();
        if content.is_empty() {
            return Err(RentalError::validation("Message cannot be empty"));
        }

        let booking = self.booking(booking_id).await?;
        if !ChatGate::is_open(&booking) {
            return Err(RentalError::state("Chat is available once the booking is paid"));
        }
        let receiver = booking
            .counterpart_of(&sender.id)
            .cloned()
            .ok_or_else(|| RentalError::state("Only the renter and the lender can use this chat"))?;

        let now = self.clock.now();
        let message = ChatMessage {
            id: MessageId::new(),
            booking_id,
            sender_id: sender.id.clone(),
            receiver_id: receiver.clone(),
            content: content.to_string(),
            read: false,
            created_at: now,
        };
        self.store.insert_message(message.clone()).await?;
        metrics::counter!("chat.messages").increment(1);
        tracing::debug!(%booking_id, sender_id = %sender.id, "Chat message stored");

        let mut warnings = Vec::new();
        let preview: String = content.chars().take(PREVIEW_CHARS).collect();
        if let Err(error) = self
            .store
            .update_chat_preview(booking_id, preview, sender.id.clone(), now)
            .await
        {
            tracing::warn!(%booking_id, %error, "Chat preview not updated");
            warnings.push(format!("Chat preview could not be updated: {error}"));
        }

        let draft = NotificationDraft::chat_message(&booking, &sender.id, &receiver, &sender.name);
        if let Err(error) = self.notifier.post(draft).await {
            warnings.push(format!("Notification could not be sent: {error}"));
        }

        Ok(SentMessage { message, warnings })
    }

    /// Messages of a booking, oldest first
    ///
    /// # Errors
    ///
    /// [`RentalError::TransientStore`] once read retries are exhausted.
    pub async fn list_messages(&self, booking_id: BookingId) -> RentalResult<Vec<ChatMessage>> {
        let store = &self.store;
        let messages = read_with_retry(&self.read_policy, "messages_for_booking", || {
            store.messages_for_booking(booking_id)
        })
        .await?;
        Ok(oldest_first(messages))
    }

    /// Live view of a thread
    #[must_use]
    pub fn watch(&self, booking_id: BookingId) -> Subscription<ChatMessage> {
        Subscription::new(Arc::clone(&self.store), Collection::Messages, move |store| async move {
            store.messages_for_booking(booking_id).await.map(oldest_first)
        })
    }

    async fn booking(&self, booking_id: BookingId) -> RentalResult<Booking> {
        let store = &self.store;
        read_with_retry(&self.read_policy, "get_booking", || store.get_booking(booking_id))
            .await?
            .ok_or_else(|| RentalError::not_found("booking", booking_id))
    }
}

fn oldest_first(mut messages: Vec<ChatMessage>) -> Vec<ChatMessage> {
    messages.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    messages
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::testkit;

    fn chat(harness: &testkit::Harness) -> ChatService {
        ChatService::new(
            harness.store.clone(),
            Arc::clone(&harness.notifier),
            Arc::clone(&harness.clock),
            RetryPolicy::no_retry(),
        )
    }

    #[test]
    fn gate_follows_payment_and_lifecycle() {
        assert!(!ChatGate::is_open(&testkit::booking()));
        assert!(ChatGate::is_open(&testkit::paid_booking()));

        let done = Booking {
            status: BookingStatus::Completed,
            ..testkit::paid_booking()
        };
        assert!(!ChatGate::is_open(&done));
    }

    #[tokio::test]
    async fn message_updates_preview_and_notifies_receiver() {
        let harness = testkit::harness();
        let chat = chat(&harness);
        let booking = harness.store.insert_booking(testkit::paid_booking()).await.unwrap();
        let long = "x".repeat(200);

        let sent = chat
            .send_message(booking.id, &testkit::renter(), &format!("  {long} "))
            .await
            .unwrap();
        assert!(sent.warnings.is_empty());
        assert_eq!(sent.message.receiver_id, testkit::provider_id());
        assert_eq!(sent.message.content, long);

        let stored = harness.store.get_booking(booking.id).await.unwrap().unwrap();
        assert_eq!(stored.last_message_preview.map(|p| p.len()), Some(PREVIEW_CHARS));
        assert_eq!(stored.last_message_sender_id, Some(testkit::renter_id()));
        assert_eq!(stored.revision, booking.revision);

        let inbox = harness.notifier.list_for_user(&testkit::provider_id()).await.unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].title, "New chat message");

        assert_eq!(chat.list_messages(booking.id).await.unwrap(), vec![sent.message]);
    }

    #[tokio::test]
    async fn closed_gate_and_strangers_are_refused() {
        let harness = testkit::harness();
        let chat = chat(&harness);
        let unpaid = harness.store.insert_booking(testkit::booking()).await.unwrap();
        let paid = harness.store.insert_booking(testkit::paid_booking()).await.unwrap();

        let closed = chat.send_message(unpaid.id, &testkit::renter(), "hi").await.unwrap_err();
        assert!(matches!(closed, RentalError::State(_)));

        let stranger = UserProfile::new("someone-else", "Mo", None);
        let refused = chat.send_message(paid.id, &stranger, "hi").await.unwrap_err();
        assert!(matches!(refused, RentalError::State(_)));

        let blank = chat.send_message(paid.id, &testkit::renter(), "   ").await.unwrap_err();
        assert!(matches!(blank, RentalError::Validation(_)));

        assert!(chat.list_messages(paid.id).await.unwrap().is_empty());
    }
}
