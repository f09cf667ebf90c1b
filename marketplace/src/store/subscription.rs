//! Live query snapshots built on the store's change feed.
//!
//! A [`Subscription`] yields the full result of its query once on start and
//! again after every write to the watched collection that changes the
//! result. Dropping it (or calling [`Subscription::unsubscribe`]) detaches it
//! from the feed.

use super::{ChangeEvent, Collection, DocumentStore, DocumentStoreError};
use futures::Stream;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::broadcast::{
    Receiver,
    error::{RecvError, TryRecvError},
};

type SnapshotStream<T> = Pin<Box<dyn Stream<Item = Result<Vec<T>, DocumentStoreError>> + Send>>;

/// Stream of query snapshots
pub struct Subscription<T> {
    collection: Collection,
    inner: SnapshotStream<T>,
}

impl<T> Subscription<T>
where
    T: Clone + PartialEq + Send + 'static,
{
    /// Watch `collection`, re-running `query` after each relevant write.
    ///
    /// The change feed is joined before the first query runs, so no write
    /// that lands between the two is missed.
    pub fn new<F, Fut>(store: Arc<dyn DocumentStore>, collection: Collection, query: F) -> Self
    where
        F: Fn(Arc<dyn DocumentStore>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<Vec<T>, DocumentStoreError>> + Send + 'static,
    {
        let mut changes = store.subscribe_changes();
        tracing::debug!(%collection, "Subscription opened");

        let inner = async_stream::stream! {
            let mut last: Option<Vec<T>> = None;
            loop {
                match query(Arc::clone(&store)).await {
                    Ok(snapshot) => {
                        if last.as_ref() != Some(&snapshot) {
                            last = Some(snapshot.clone());
                            yield Ok(snapshot);
                        }
                    },
                    Err(error) => {
                        tracing::warn!(%collection, %error, "Subscription query failed");
                        yield Err(error);
                    },
                }

                if !wait_for_change(&mut changes, collection).await {
                    tracing::debug!(%collection, "Change feed closed, ending subscription");
                    return;
                }
                drain(&mut changes);
            }
        };

        Self {
            collection,
            inner: Box::pin(inner),
        }
    }

    /// Collection being watched
    #[must_use]
    pub const fn collection(&self) -> Collection {
        self.collection
    }

    /// Stop receiving snapshots
    pub fn unsubscribe(self) {
        tracing::debug!(collection = %self.collection, "Subscription closed");
    }
}

/// Wait for a write to `collection`. A lagged receiver counts as a change.
/// Returns `false` once the feed is closed.
async fn wait_for_change(changes: &mut Receiver<ChangeEvent>, collection: Collection) -> bool {
    loop {
        match changes.recv().await {
            Ok(event) if event.collection == collection => return true,
            Ok(_) => {},
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "Change feed lagged, re-querying");
                return true;
            },
            Err(RecvError::Closed) => return false,
        }
    }
}

/// Coalesce a burst of writes into one re-query
fn drain(changes: &mut Receiver<ChangeEvent>) {
    loop {
        match changes.try_recv() {
            Ok(_) | Err(TryRecvError::Lagged(_)) => {},
            Err(TryRecvError::Empty | TryRecvError::Closed) => break,
        }
    }
}

impl<T> Stream for Subscription<T> {
    type Item = Result<Vec<T>, DocumentStoreError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}
