//! Simulated payment gateway.
//!
//! There is no real processor behind the marketplace. A charge waits for a
//! random latency in the configured range, is approved with the configured
//! probability, and always comes back with a human-readable reference such
//! as `BHRTRNT_482913`.
//!
//! Randomness is injected through [`Randomness`] so tests can script the
//! outcome of every attempt.
//!
//! References are unique per gateway instance: a drawn number that was
//! already issued is redrawn. Nothing is persisted, so a restarted process
//! may hand out a number used before.

use crate::config::PaymentConfig;
use crate::types::{BookingId, Money, PaymentMethod};
use rand::Rng;
use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Outcome of one charge attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayReceipt {
    /// Whether the charge went through
    pub approved: bool,
    /// Reference shown to the user, generated for every attempt
    pub reference_id: String,
}

/// Source of the simulator's random choices
pub trait Randomness: Send + Sync {
    /// Round-trip latency within `[min, max]`
    fn latency(&self, min: Duration, max: Duration) -> Duration;

    /// Whether an attempt is approved, given the success probability
    fn approve(&self, success_rate: f64) -> bool;

    /// Six-digit reference number
    fn reference_digits(&self) -> u32;
}

/// Randomness from the thread-local generator
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRngRandomness;

impl Randomness for ThreadRngRandomness {
    fn latency(&self, min: Duration, max: Duration) -> Duration {
        if max <= min {
            return min;
        }
        let min_ms = u64::try_from(min.as_millis()).unwrap_or(u64::MAX);
        let max_ms = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
        Duration::from_millis(rand::thread_rng().gen_range(min_ms..=max_ms))
    }

    fn approve(&self, success_rate: f64) -> bool {
        let rate = if success_rate.is_finite() {
            success_rate.clamp(0.0, 1.0)
        } else {
            0.0
        };
        rand::thread_rng().gen_bool(rate)
    }

    fn reference_digits(&self) -> u32 {
        rand::thread_rng().gen_range(100_000..=999_999)
    }
}

/// Deterministic randomness for tests and demos.
///
/// Outcomes are consumed in order; once the script runs out every attempt
/// gets the fallback outcome. Latency is always the lower bound and
/// references count up from 100000.
#[derive(Debug)]
pub struct ScriptedRandomness {
    outcomes: Mutex<VecDeque<bool>>,
    fallback: bool,
    next_reference: Mutex<u32>,
}

impl ScriptedRandomness {
    /// Approve every attempt
    #[must_use]
    pub fn approving() -> Self {
        Self::with_outcomes(std::iter::empty(), true)
    }

    /// Decline every attempt
    #[must_use]
    pub fn declining() -> Self {
        Self::with_outcomes(std::iter::empty(), false)
    }

    /// Play `outcomes` in order, then fall back to `fallback`
    #[must_use]
    pub fn with_outcomes(outcomes: impl IntoIterator<Item = bool>, fallback: bool) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into_iter().collect()),
            fallback,
            next_reference: Mutex::new(100_000),
        }
    }

    /// Queue more outcomes behind the current script
    pub fn push_outcomes(&self, outcomes: impl IntoIterator<Item = bool>) {
        if let Ok(mut queue) = self.outcomes.lock() {
            queue.extend(outcomes);
        }
    }
}

impl Randomness for ScriptedRandomness {
    fn latency(&self, min: Duration, _max: Duration) -> Duration {
        min
    }

    fn approve(&self, _success_rate: f64) -> bool {
        self.outcomes
            .lock()
            .ok()
            .and_then(|mut queue| queue.pop_front())
            .unwrap_or(self.fallback)
    }

    fn reference_digits(&self) -> u32 {
        self.next_reference.lock().map_or(100_000, |mut next| {
            let digits = *next;
            *next = if digits >= 999_999 { 100_000 } else { digits + 1 };
            digits
        })
    }
}

/// Payment gateway abstraction
pub trait PaymentGateway: Send + Sync {
    /// Charge `amount` for a booking. Declines are an outcome, not an error.
    fn charge(
        &self,
        booking_id: BookingId,
        amount: Money,
        method: PaymentMethod,
    ) -> Pin<Box<dyn Future<Output = GatewayReceipt> + Send>>;
}

/// Redraws allowed before accepting a reference that was already issued
const MAX_REFERENCE_DRAWS: usize = 32;

/// Reference numbers handed out so far
#[derive(Debug, Default)]
struct IssuedReferences(Mutex<HashSet<u32>>);

impl IssuedReferences {
    fn draw(&self, randomness: &dyn Randomness) -> u32 {
        let Ok(mut issued) = self.0.lock() else {
            return randomness.reference_digits();
        };
        let mut digits = randomness.reference_digits();
        for _ in 1..MAX_REFERENCE_DRAWS {
            if !issued.contains(&digits) {
                break;
            }
            digits = randomness.reference_digits();
        }
        if !issued.insert(digits) {
            tracing::warn!(digits, issued = issued.len(), "Reusing a payment reference");
        }
        digits
    }
}

/// Gateway that simulates latency and random declines
#[derive(Clone)]
pub struct SimulatedGateway {
    config: PaymentConfig,
    randomness: Arc<dyn Randomness>,
    issued: Arc<IssuedReferences>,
}

impl SimulatedGateway {
    /// Creates a new simulated gateway
    #[must_use]
    pub fn new(config: PaymentConfig, randomness: Arc<dyn Randomness>) -> Self {
        Self {
            config,
            randomness,
            issued: Arc::new(IssuedReferences::default()),
        }
    }

    /// Creates an Arc-wrapped instance for sharing
    #[must_use]
    pub fn shared(config: PaymentConfig, randomness: Arc<dyn Randomness>) -> Arc<dyn PaymentGateway> {
        Arc::new(Self::new(config, randomness))
    }
}

impl PaymentGateway for SimulatedGateway {
    fn charge(
        &self,
        booking_id: BookingId,
        amount: Money,
        method: PaymentMethod,
    ) -> Pin<Box<dyn Future<Output = GatewayReceipt> + Send>> {
        let latency = self
            .randomness
            .latency(self.config.min_latency, self.config.max_latency);
        let randomness = Arc::clone(&self.randomness);
        let issued = Arc::clone(&self.issued);
        let success_rate = self.config.success_rate;
        let prefix = self.config.reference_prefix.clone();

        Box::pin(async move {
            // Simulate the processor round trip
            tokio::time::sleep(latency).await;

            let approved = randomness.approve(success_rate);
            let reference_id = format!("{prefix}_{}", issued.draw(randomness.as_ref()));

            metrics::counter!(
                "payments.gateway.attempts",
                "outcome" => if approved { "approved" } else { "declined" }
            )
            .increment(1);
            tracing::info!(
                %booking_id,
                amount = amount.amount(),
                %method,
                approved,
                reference_id = %reference_id,
                latency_ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
                "Simulated charge settled"
            );

            GatewayReceipt {
                approved,
                reference_id,
            }
        })
    }
}
