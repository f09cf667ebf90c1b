//! Configuration management for the rental marketplace.
//!
//! Loads configuration from environment variables with sensible defaults.
//! Values that fail to parse fall back to their default.

use campus_rental_runtime::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Simulated payment gateway
    pub payment: PaymentConfig,
    /// Retry policy for idempotent store reads
    pub store_reads: StoreReadConfig,
    /// Default log filter when `RUST_LOG` is unset
    pub log_level: String,
}

/// Simulated payment gateway configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentConfig {
    /// Probability that an attempt is approved, in [0, 1]
    pub success_rate: f64,
    /// Lower bound of the simulated round-trip latency
    pub min_latency: Duration,
    /// Upper bound of the simulated round-trip latency
    pub max_latency: Duration,
    /// Prefix of generated reference ids
    pub reference_prefix: String,
    /// How long a payment session waits for the settled outcome
    pub wait_timeout: Duration,
}

/// Backoff settings for store reads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreReadConfig {
    /// Retries after the first attempt
    pub max_retries: usize,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Cap on the backoff delay
    pub max_delay: Duration,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            success_rate: 0.9,
            min_latency: Duration::from_millis(1500),
            max_latency: Duration::from_millis(2000),
            reference_prefix: "BHRTRNT".to_string(),
            wait_timeout: Duration::from_secs(30),
        }
    }
}

impl Default for StoreReadConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(2000),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            payment: PaymentConfig::default(),
            store_reads: StoreReadConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl StoreReadConfig {
    /// Build the retry policy used around store reads
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::builder()
            .max_retries(self.max_retries)
            .initial_delay(self.initial_delay)
            .max_delay(self.max_delay)
            .build()
    }
}

impl PaymentConfig {
    /// Configuration for tests: instant, always approved
    #[must_use]
    pub fn instant() -> Self {
        Self {
            success_rate: 1.0,
            min_latency: Duration::ZERO,
            max_latency: Duration::ZERO,
            ..Self::default()
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Call `dotenvy::dotenv()` first to pick up a `.env` file.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let parse = |key: &str| lookup(key).and_then(|s| s.trim().parse::<u64>().ok());

        let success_rate = lookup("PAYMENT_SUCCESS_RATE")
            .and_then(|s| s.trim().parse::<f64>().ok())
            .filter(|rate| rate.is_finite())
            .map_or(defaults.payment.success_rate, |rate| rate.clamp(0.0, 1.0));

        let min_latency = parse("PAYMENT_MIN_LATENCY_MS")
            .map_or(defaults.payment.min_latency, Duration::from_millis);
        let max_latency = parse("PAYMENT_MAX_LATENCY_MS")
            .map_or(defaults.payment.max_latency, Duration::from_millis);
        let (min_latency, max_latency) = if min_latency <= max_latency {
            (min_latency, max_latency)
        } else {
            (max_latency, min_latency)
        };

        Self {
            payment: PaymentConfig {
                success_rate,
                min_latency,
                max_latency,
                reference_prefix: lookup("PAYMENT_REFERENCE_PREFIX")
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .unwrap_or(defaults.payment.reference_prefix),
                wait_timeout: parse("PAYMENT_WAIT_TIMEOUT_SECS")
                    .map_or(defaults.payment.wait_timeout, Duration::from_secs),
            },
            store_reads: StoreReadConfig {
                max_retries: parse("STORE_READ_MAX_RETRIES")
                    .and_then(|n| usize::try_from(n).ok())
                    .unwrap_or(defaults.store_reads.max_retries),
                initial_delay: parse("STORE_READ_INITIAL_DELAY_MS")
                    .map_or(defaults.store_reads.initial_delay, Duration::from_millis),
                max_delay: parse("STORE_READ_MAX_DELAY_MS")
                    .map_or(defaults.store_reads.max_delay, Duration::from_millis),
            },
            log_level: lookup("LOG_LEVEL")
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.log_level),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_gives_defaults() {
        assert_eq!(Config::from_lookup(|_| None), Config::default());
    }

    #[test]
    fn values_are_read() {
        let config = Config::from_lookup(lookup(&[
            ("PAYMENT_SUCCESS_RATE", "0.5"),
            ("PAYMENT_MIN_LATENCY_MS", "10"),
            ("PAYMENT_MAX_LATENCY_MS", "20"),
            ("PAYMENT_REFERENCE_PREFIX", "CAMPUS"),
            ("STORE_READ_MAX_RETRIES", "5"),
            ("LOG_LEVEL", "debug"),
        ]));

        assert!((config.payment.success_rate - 0.5).abs() < f64::EPSILON);
        assert_eq!(config.payment.min_latency, Duration::from_millis(10));
        assert_eq!(config.payment.max_latency, Duration::from_millis(20));
        assert_eq!(config.payment.reference_prefix, "CAMPUS");
        assert_eq!(config.store_reads.max_retries, 5);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn invalid_values_fall_back_and_ranges_normalize() {
        let config = Config::from_lookup(lookup(&[
            ("PAYMENT_SUCCESS_RATE", "1.7"),
            ("PAYMENT_MIN_LATENCY_MS", "900"),
            ("PAYMENT_MAX_LATENCY_MS", "300"),
            ("STORE_READ_MAX_RETRIES", "many"),
        ]));

        assert!((config.payment.success_rate - 1.0).abs() < f64::EPSILON);
        assert_eq!(config.payment.min_latency, Duration::from_millis(300));
        assert_eq!(config.payment.max_latency, Duration::from_millis(900));
        assert_eq!(config.store_reads.max_retries, 3);

        let config = Config::from_lookup(lookup(&[("PAYMENT_SUCCESS_RATE", "NaN")]));
        assert!((config.payment.success_rate - 0.9).abs() < f64::EPSILON);
    }

    #[test]
    fn retry_policy_mirrors_settings() {
        let policy = StoreReadConfig::default().retry_policy();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.initial_delay, Duration::from_millis(100));
        assert_eq!(policy.max_delay, Duration::from_secs(2));
    }
}
