//! Refresh engine configuration.
//!
//! Every pacing constant used by the scheduler and the per-tab state machine
//! lives here as a tunable default.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use refresh_em_all::RefreshConfig;
//!
//! let config = RefreshConfig::new()
//!     .with_tab_delay(Duration::from_millis(50))
//!     .with_max_retries(3)
//!     .with_history_limit(20);
//!
//! config.validate()?;
//! ```
//!
//! # JSON
//!
//! Durations are expressed in milliseconds; missing keys take defaults.
//!
//! ```json
//! {
//!   "tabDelayMs": 100,
//!   "retry": { "maxRetries": 2, "backoffBaseMs": 500, "backoff": "exponential" },
//!   "batching": {
//!     "tiers": [
//!       { "above": 50, "size": 3, "intervalMs": 1000 },
//!       { "above": 20, "size": 4, "intervalMs": 750 }
//!     ],
//!     "fallback": { "size": 5, "intervalMs": 500 }
//!   },
//!   "historyLimit": 10
//! }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Upper bound on stored history entries (synced storage is small).
pub const MAX_HISTORY_LIMIT: usize = 20;

/// Default number of retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 2;

// ============================================================================
// Duration (de)serialization
// ============================================================================

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

// ============================================================================
// BatchPlan
// ============================================================================

/// Batch size and inter-batch pause chosen for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchPlan {
    /// Tabs per batch.
    pub size: usize,
    /// Pause after each batch.
    #[serde(rename = "intervalMs", with = "millis")]
    pub interval: Duration,
}

impl BatchPlan {
    /// Creates a plan.
    #[inline]
    #[must_use]
    pub const fn new(size: usize, interval: Duration) -> Self {
        Self { size, interval }
    }
}

// ============================================================================
// BatchTier
// ============================================================================

/// A plan that applies when the tab count is strictly above a threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchTier {
    /// Tab count the snapshot must exceed.
    pub above: usize,
    /// Plan used for such snapshots.
    #[serde(flatten)]
    pub plan: BatchPlan,
}

// ============================================================================
// BatchPolicy
// ============================================================================

/// Chooses batch size and interval from the snapshot size.
///
/// Larger snapshots get smaller batches and longer pauses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchPolicy {
    /// Tiers checked from the highest threshold down.
    pub tiers: Vec<BatchTier>,
    /// Plan used when no tier matches.
    pub fallback: BatchPlan,
}

impl Default for BatchPolicy {
    fn default() -> Self {
        Self {
            tiers: vec![
                BatchTier {
                    above: 50,
                    plan: BatchPlan::new(3, Duration::from_millis(1000)),
                },
                BatchTier {
                    above: 20,
                    plan: BatchPlan::new(4, Duration::from_millis(750)),
                },
            ],
            fallback: BatchPlan::new(5, Duration::from_millis(500)),
        }
    }
}

impl BatchPolicy {
    /// Creates a policy with one plan for every tab count.
    #[inline]
    #[must_use]
    pub fn uniform(plan: BatchPlan) -> Self {
        Self {
            tiers: Vec::new(),
            fallback: plan,
        }
    }

    /// Returns the plan for `total` tabs.
    #[must_use]
    pub fn plan(&self, total: usize) -> BatchPlan {
        self.tiers
            .iter()
            .filter(|tier| total > tier.above)
            .max_by_key(|tier| tier.above)
            .map_or(self.fallback, |tier| tier.plan)
    }

    fn validate(&self) -> Result<()> {
        if self.fallback.size == 0 || self.tiers.iter().any(|t| t.plan.size == 0) {
            return Err(Error::config("Batch size must be greater than zero"));
        }

        let mut tiers = self.tiers.clone();
        tiers.sort_by_key(|t| t.above);
        let mut previous = self.fallback;
        for tier in &tiers {
            if tier.plan.size > previous.size || tier.plan.interval < previous.interval {
                return Err(Error::config(format!(
                    "Batch tier above {} must not use larger batches or shorter intervals than smaller snapshots",
                    tier.above
                )));
            }
            previous = tier.plan;
        }
        Ok(())
    }
}

// ============================================================================
// Backoff / RetryPolicy
// ============================================================================

/// Growth curve of the delay between retries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backoff {
    /// `base * 2^retry`.
    #[default]
    Exponential,
    /// `base * (retry + 1)`.
    Linear,
}

/// Per-tab retry bound and backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    #[serde(rename = "backoffBaseMs", with = "millis")]
    pub backoff_base: Duration,
    /// Delay growth curve.
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_base: Duration::from_millis(500),
            backoff: Backoff::Exponential,
        }
    }
}

impl RetryPolicy {
    /// Returns the delay before retry number `retry + 1`.
    #[must_use]
    pub fn delay(&self, retry: u32) -> Duration {
        let factor = match self.backoff {
            Backoff::Exponential => 1u32.checked_shl(retry).unwrap_or(u32::MAX),
            Backoff::Linear => retry.saturating_add(1),
        };
        self.backoff_base.saturating_mul(factor)
    }
}

// ============================================================================
// RefreshConfig
// ============================================================================

/// Complete engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RefreshConfig {
    /// Batch size / interval policy.
    pub batching: BatchPolicy,

    /// Pause after each tab within a batch.
    #[serde(rename = "tabDelayMs", with = "millis")]
    pub tab_delay: Duration,

    /// Pause before re-checking a tab that is still loading.
    #[serde(rename = "loadingWaitMs", with = "millis")]
    pub loading_wait: Duration,

    /// Loading waits allowed per tab before reloading anyway.
    pub max_loading_waits: u32,

    /// Pause between activating a discarded tab and reloading it.
    #[serde(rename = "stabilizationDelayMs", with = "millis")]
    pub stabilization_delay: Duration,

    /// Pause between media capture and reload.
    #[serde(rename = "captureSettleDelayMs", with = "millis")]
    pub capture_settle_delay: Duration,

    /// Retry policy.
    pub retry: RetryPolicy,

    /// Maximum stored history entries.
    pub history_limit: usize,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            batching: BatchPolicy::default(),
            tab_delay: Duration::from_millis(100),
            loading_wait: Duration::from_millis(500),
            max_loading_waits: 20,
            stabilization_delay: Duration::from_millis(300),
            capture_settle_delay: Duration::from_millis(100),
            retry: RetryPolicy::default(),
            history_limit: 10,
        }
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl RefreshConfig {
    /// Creates a configuration with default settings.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration with every delay set to zero.
    ///
    /// Counts and bounds keep their defaults.
    #[must_use]
    pub fn without_delays() -> Self {
        let defaults = Self::default();
        Self {
            batching: BatchPolicy {
                tiers: defaults
                    .batching
                    .tiers
                    .iter()
                    .map(|tier| BatchTier {
                        above: tier.above,
                        plan: BatchPlan::new(tier.plan.size, Duration::ZERO),
                    })
                    .collect(),
                fallback: BatchPlan::new(defaults.batching.fallback.size, Duration::ZERO),
            },
            tab_delay: Duration::ZERO,
            loading_wait: Duration::ZERO,
            stabilization_delay: Duration::ZERO,
            capture_settle_delay: Duration::ZERO,
            retry: RetryPolicy {
                backoff_base: Duration::ZERO,
                ..defaults.retry
            },
            ..defaults
        }
    }

    /// Parses a configuration from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] on malformed input and [`Error::Config`] if the
    /// result fails validation.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be read, otherwise as
    /// [`from_json_str`](Self::from_json_str).
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl RefreshConfig {
    /// Sets the batch policy.
    #[inline]
    #[must_use]
    pub fn with_batching(mut self, batching: BatchPolicy) -> Self {
        self.batching = batching;
        self
    }

    /// Sets the pause between tabs.
    #[inline]
    #[must_use]
    pub fn with_tab_delay(mut self, delay: Duration) -> Self {
        self.tab_delay = delay;
        self
    }

    /// Sets the loading re-check pause.
    #[inline]
    #[must_use]
    pub fn with_loading_wait(mut self, wait: Duration, max_waits: u32) -> Self {
        self.loading_wait = wait;
        self.max_loading_waits = max_waits;
        self
    }

    /// Sets the discarded-tab stabilization delay.
    #[inline]
    #[must_use]
    pub fn with_stabilization_delay(mut self, delay: Duration) -> Self {
        self.stabilization_delay = delay;
        self
    }

    /// Sets the retry bound.
    #[inline]
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.retry.max_retries = max_retries;
        self
    }

    /// Sets the backoff base and curve.
    #[inline]
    #[must_use]
    pub fn with_backoff(mut self, base: Duration, backoff: Backoff) -> Self {
        self.retry.backoff_base = base;
        self.retry.backoff = backoff;
        self
    }

    /// Sets the history bound.
    #[inline]
    #[must_use]
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }
}

// ============================================================================
// Validation
// ============================================================================

impl RefreshConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        self.batching.validate()?;

        if self.history_limit == 0 || self.history_limit > MAX_HISTORY_LIMIT {
            return Err(Error::config(format!(
                "History limit must be between 1 and {MAX_HISTORY_LIMIT}, got {}",
                self.history_limit
            )));
        }

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
