//! Retry, timeout and gas policy for deployment flows.

use std::time::Duration;

use alloy_core::primitives::U256;
use anyhow::ensure;
use backon::{BackoffBuilder, ConstantBackoff, ConstantBuilder};
use serde::{Deserialize, Serialize};

use crate::rpc;

/// Default number of attempts per deployment request.
pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// Default delay between two attempts.
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 2;
/// Default per-endpoint liveness timeout.
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 5;
/// Default interval between two receipt lookups.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 2;
/// Default time to wait for a receipt once a transaction is broadcast.
pub const DEFAULT_CONFIRMATION_TIMEOUT_SECS: u64 = 150;
/// Default timeout of a single receipt lookup.
pub const DEFAULT_RECEIPT_REQUEST_TIMEOUT_SECS: u64 = 5;
/// Default safety factor applied to gas estimates.
pub const DEFAULT_GAS_BUFFER_MULTIPLIER: f64 = 1.3;
/// Default gas limit used when estimation fails.
pub const DEFAULT_FALLBACK_GAS_LIMIT: u64 = 2_000_000;
/// Default pre-flight balance threshold: 0.001 of the native currency.
pub const DEFAULT_MIN_BALANCE_WEI: u64 = 1_000_000_000_000_000;

/// Gas limit policy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GasPolicy {
    /// Multiplier applied to a successful estimate.
    pub buffer_multiplier: f64,
    /// Limit used when the estimate call fails.
    pub fallback_limit: u64,
}

impl Default for GasPolicy {
    fn default() -> Self {
        Self {
            buffer_multiplier: DEFAULT_GAS_BUFFER_MULTIPLIER,
            fallback_limit: DEFAULT_FALLBACK_GAS_LIMIT,
        }
    }
}

/// Policy applied by the orchestrator to every deployment request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeploymentPolicy {
    /// Maximum number of attempts, the first one included.
    pub max_retries: u32,
    /// Fixed delay before a retry.
    pub retry_delay_secs: u64,
    /// Liveness timeout for each candidate RPC endpoint.
    pub probe_timeout_secs: u64,
    /// Interval between two receipt lookups.
    pub poll_interval_secs: u64,
    /// How long to wait for a receipt before reporting a timeout.
    pub confirmation_timeout_secs: u64,
    /// Timeout of a single receipt lookup.
    ///
    /// Capped by the HTTP client timeout ([`rpc::DEFAULT_TIMEOUT`]); larger values
    /// are rejected by [`DeploymentPolicy::validate`].
    pub receipt_request_timeout_secs: u64,
    /// Gas settings, unless the network overrides them.
    pub gas: GasPolicy,
    /// Minimum signer balance, in wei, required before submitting.
    pub min_balance: U256,
}

impl Default for DeploymentPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay_secs: DEFAULT_RETRY_DELAY_SECS,
            probe_timeout_secs: DEFAULT_PROBE_TIMEOUT_SECS,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            confirmation_timeout_secs: DEFAULT_CONFIRMATION_TIMEOUT_SECS,
            receipt_request_timeout_secs: DEFAULT_RECEIPT_REQUEST_TIMEOUT_SECS,
            gas: GasPolicy::default(),
            min_balance: U256::from(DEFAULT_MIN_BALANCE_WEI),
        }
    }
}

impl DeploymentPolicy {
    /// Reject settings that would busy-loop an endpoint or never take effect.
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(self.probe_timeout_secs > 0, "probe_timeout_secs must be at least 1");
        ensure!(self.poll_interval_secs > 0, "poll_interval_secs must be at least 1");
        ensure!(
            self.confirmation_timeout_secs > 0,
            "confirmation_timeout_secs must be at least 1"
        );
        ensure!(
            self.receipt_request_timeout_secs > 0,
            "receipt_request_timeout_secs must be at least 1"
        );
        ensure!(
            self.receipt_request_timeout() <= rpc::DEFAULT_TIMEOUT,
            "receipt_request_timeout_secs is {} but RPC requests time out after {}s",
            self.receipt_request_timeout_secs,
            rpc::DEFAULT_TIMEOUT.as_secs()
        );
        ensure!(
            self.gas.buffer_multiplier.is_finite() && self.gas.buffer_multiplier >= 1.0,
            "gas.buffer_multiplier must be at least 1.0, got {}",
            self.gas.buffer_multiplier
        );
        Ok(())
    }

    /// At least one attempt is always made.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.max(1)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }

    pub fn receipt_request_timeout(&self) -> Duration {
        Duration::from_secs(self.receipt_request_timeout_secs)
    }

    /// Delays to apply between attempts; yields `max_attempts - 1` items.
    pub fn retry_backoff(&self) -> ConstantBackoff {
        ConstantBuilder::default()
            .with_delay(self.retry_delay())
            .with_max_times((self.max_attempts() - 1) as usize)
            .build()
    }
}
