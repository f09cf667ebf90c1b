//! Item listings owned by providers.

use super::read_with_retry;
use crate::error::{RentalError, RentalResult};
use crate::store::{Collection, DocumentStore, Subscription};
use crate::types::{Category, ImageRef, Item, ItemId, Money, UserId, UserProfile};
use campus_rental_core::environment::Clock;
use campus_rental_runtime::retry::RetryPolicy;
use std::sync::Arc;

/// What a provider fills in to list an item
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListingDraft {
    /// Title
    pub title: String,
    /// Description
    pub description: String,
    /// Category
    pub category: Category,
    /// Price per day
    pub price_per_day: Money,
    /// Uploaded images, first one is the cover
    pub images: Vec<ImageRef>,
}

/// Listing management and browsing
#[derive(Clone)]
pub struct Catalog {
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
    read_policy: RetryPolicy,
}

impl Catalog {
    /// Creates a new `Catalog`
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, clock: Arc<dyn Clock>, read_policy: RetryPolicy) -> Self {
        Self {
            store,
            clock,
            read_policy,
        }
    }

    /// List a new item; it starts out available.
    ///
    /// # Errors
    ///
    /// [`RentalError::Validation`] for a blank title, a zero price or no
    /// images.
    pub async fn create_listing(&self, provider: &UserProfile, draft: ListingDraft) -> RentalResult<Item> {
        Self::validate_listing(&draft)?;

        let now = self.clock.now();
        let item = Item {
            id: ItemId::new(),
            provider_id: provider.id.clone(),
            provider_name: provider.name.clone(),
            title: draft.title.trim().to_string(),
            description: draft.description.trim().to_string(),
            category: draft.category,
            price_per_day: draft.price_per_day,
            available: true,
            images: draft.images,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_item(item.clone()).await?;

        metrics::counter!("catalog.listings_created").increment(1);
        tracing::info!(item_id = %item.id, provider_id = %item.provider_id, category = ?item.category, "Item listed");
        Ok(item)
    }

    fn validate_listing(draft: &ListingDraft) -> RentalResult<()> {
        if draft.title.trim().is_empty() {
            return Err(RentalError::validation("Please finish the required fields."));
        }
        if draft.price_per_day.is_zero() {
            return Err(RentalError::validation("Item price must be greater than zero"));
        }
        if draft.images.is_empty() {
            return Err(RentalError::validation("Add at least one image for the listing."));
        }
        Ok(())
    }

    /// Flip an item between available and unavailable; owner only.
    ///
    /// # Errors
    ///
    /// [`RentalError::NotFound`] for an unknown item, [`RentalError::State`]
    /// if `owner` does not own it.
    pub async fn toggle_availability(&self, owner: &UserId, item_id: ItemId) -> RentalResult<Item> {
        let mut item = self.get_item(item_id).await?;
        if &item.provider_id != owner {
            return Err(RentalError::state("Only the owner can change this listing"));
        }

        let now = self.clock.now();
        item.available = !item.available;
        item.updated_at = now;
        self.store.set_item_available(item_id, item.available, now).await?;

        tracing::info!(%item_id, available = item.available, "Listing availability changed");
        Ok(item)
    }

    /// One item
    ///
    /// # Errors
    ///
    /// [`RentalError::NotFound`] if it does not exist.
    pub async fn get_item(&self, item_id: ItemId) -> RentalResult<Item> {
        let store = &self.store;
        read_with_retry(&self.read_policy, "get_item", || store.get_item(item_id))
            .await?
            .ok_or_else(|| RentalError::not_found("item", item_id))
    }

    /// Everything `provider` has listed, newest first
    ///
    /// # Errors
    ///
    /// [`RentalError::TransientStore`] once read retries are exhausted.
    pub async fn list_by_provider(&self, provider: &UserId) -> RentalResult<Vec<Item>> {
        let store = &self.store;
        let items = read_with_retry(&self.read_policy, "items_by_provider", || {
            store.items_by_provider(provider.clone())
        })
        .await?;
        Ok(newest_first(items))
    }

    /// Bookable items, optionally in one category, newest first
    ///
    /// # Errors
    ///
    /// [`RentalError::TransientStore`] once read retries are exhausted.
    pub async fn list_available(&self, category: Option<Category>) -> RentalResult<Vec<Item>> {
        let store = &self.store;
        let items = read_with_retry(&self.read_policy, "available_items", || store.available_items(category)).await?;
        Ok(newest_first(items))
    }

    /// Live view of bookable items
    #[must_use]
    pub fn watch_available(&self, category: Option<Category>) -> Subscription<Item> {
        Subscription::new(Arc::clone(&self.store), Collection::Items, move |store| async move {
            store.available_items(category).await.map(newest_first)
        })
    }
}

fn newest_first(mut items: Vec<Item>) -> Vec<Item> {
    items.reverse();
    items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    items
}
