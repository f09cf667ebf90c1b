//! # Campus Rental
//!
//! Booking lifecycle and payment settlement for a peer-to-peer rental
//! marketplace on a university campus. Providers list items, renters book
//! them for a date range, pay through a simulated gateway, pick the item up
//! and hand it back.
//!
//! ## Architecture
//!
//! - [`types`]: domain entities and value types
//! - [`store`]: the [`DocumentStore`](store::DocumentStore) gateway, an
//!   in-memory implementation and live query [`Subscription`](store::Subscription)s
//! - [`schema`]: stored booking records, including legacy ones
//! - [`aggregates`]: reducers for the booking lifecycle, the handoff and the
//!   payment session
//! - [`payment_gateway`]: the simulated processor
//! - [`notifications`]: in-app notifications
//! - [`app`]: services and the [`Marketplace`](app::Marketplace) facade
//!
//! ## Booking lifecycle
//!
//! ```text
//! pending ──approve / pay──▶ confirmed ──receipt──▶ active ──return──▶ completed
//!    │   ◀──failed payment──┘
//!    └──decline──▶ cancelled
//! ```
//!
//! An approved booking stays payable until a payment succeeds; a declined
//! charge sends it back to pending.
//!
//! Every booking write is conditional on the revision it was computed from.
//! A write that loses the race is recomputed against the fresh document, so
//! a payment can never be recorded twice and a stale approval cannot undo a
//! newer transition.

pub mod aggregates;
pub mod app;
pub mod config;
pub mod error;
pub mod notifications;
pub mod payment_gateway;
pub mod schema;
pub mod shell;
pub mod store;
pub mod types;

#[cfg(test)]
mod testkit;

pub use app::Marketplace;
pub use config::Config;
pub use error::{RentalError, RentalResult};
