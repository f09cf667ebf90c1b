//! Typed in-process event bus.
//!
//! The marketplace shell reacts to things that happen inside the core
//! (a notification was posted, a booking card asked to open the payment
//! sheet or a chat thread). Those signals travel over an [`EventBus`] so the
//! core never holds references to UI handlers.
//!
//! # Delivery
//!
//! - Every subscriber receives every event published after it subscribed
//! - Events published with no subscribers are dropped
//! - A subscriber that falls behind by more than the bus capacity receives
//!   [`EventBusError::Lagged`] and then continues with the newest events
//!
//! # Example
//!
//! ```rust,ignore
//! use campus_rental_core::event_bus::{BroadcastEventBus, EventBus};
//! use futures::StreamExt;
//!
//! let bus = BroadcastEventBus::<String>::new(64);
//! let mut stream = bus.subscribe();
//! bus.publish("OpenChat".to_string()).await?;
//! assert_eq!(stream.next().await, Some(Ok("OpenChat".to_string())));
//! ```

use futures::Stream;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;
use tokio::sync::broadcast;

/// Errors that can occur during event bus operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventBusError {
    /// The bus has been shut down and accepts no more events
    #[error("Event bus closed")]
    Closed,

    /// The subscriber missed events because it fell behind
    #[error("Subscriber lagged behind by {0} events")]
    Lagged(u64),

    /// Generic error for other failures
    #[error("Event bus error: {0}")]
    Other(String),
}

/// Stream of events from a subscription.
pub type EventStream<E> = Pin<Box<dyn Stream<Item = Result<E, EventBusError>> + Send>>;

/// Publish/subscribe channel for a single event type.
///
/// # Dyn Compatibility
///
/// `publish` returns `Pin<Box<dyn Future>>` instead of using `async fn` so the
/// bus can be shared as `Arc<dyn EventBus<E>>` and captured by effects.
pub trait EventBus<E>: Send + Sync
where
    E: Clone + Send + 'static,
{
    /// Publish an event to all current subscribers.
    ///
    /// Returns the number of subscribers that will observe the event.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::Closed`] if the bus no longer accepts events.
    fn publish(
        &self,
        event: E,
    ) -> Pin<Box<dyn Future<Output = Result<usize, EventBusError>> + Send + '_>>;

    /// Subscribe to events published from now on.
    fn subscribe(&self) -> EventStream<E>;
}

/// [`EventBus`] backed by a `tokio::sync::broadcast` channel.
#[derive(Debug, Clone)]
pub struct BroadcastEventBus<E> {
    sender: broadcast::Sender<E>,
}

impl<E> BroadcastEventBus<E>
where
    E: Clone + Send + 'static,
{
    /// Create a bus that buffers up to `capacity` events per slow subscriber.
    ///
    /// A capacity of zero is raised to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl<E> Default for BroadcastEventBus<E>
where
    E: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new(256)
    }
}

impl<E> EventBus<E> for BroadcastEventBus<E>
where
    E: Clone + Send + Sync + 'static,
{
    fn publish(
        &self,
        event: E,
    ) -> Pin<Box<dyn Future<Output = Result<usize, EventBusError>> + Send + '_>> {
        // A send error only means nobody is listening right now.
        let delivered = self.sender.send(event).unwrap_or(0);
        Box::pin(async move { Ok(delivered) })
    }

    fn subscribe(&self) -> EventStream<E> {
        let receiver = self.sender.subscribe();
        Box::pin(futures::stream::unfold(receiver, |mut receiver| async move {
            match receiver.recv().await {
                Ok(event) => Some((Ok(event), receiver)),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    Some((Err(EventBusError::Lagged(skipped)), receiver))
                },
                Err(broadcast::error::RecvError::Closed) => None,
            }
        }))
    }
}
