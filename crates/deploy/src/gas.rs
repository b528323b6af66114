//! Gas limit selection for deployment transactions.

use alloy_core::primitives::{Address, Bytes};

use crate::{DeployTransaction, GasPolicy, WalletSession};

/// Where a gas limit came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum GasSource {
    /// The signer's estimate, scaled by the buffer multiplier.
    Estimated,
    /// The policy fallback, used because estimation failed.
    Fallback,
}

/// A gas limit ready to be attached to a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasEstimate {
    pub gas_limit: u64,
    pub source: GasSource,
}

/// Requests an estimate from the signer and applies a safety buffer.
///
/// Estimation never fails from the caller's point of view: estimating a deployment
/// against an unsigned transaction can fail for init code whose execution depends on
/// the deployer or its nonce, so any error yields the fallback limit instead.
#[derive(Debug, Clone, Copy, Default)]
pub struct GasEstimator {
    policy: GasPolicy,
}

impl GasEstimator {
    pub fn new(policy: GasPolicy) -> Self {
        Self { policy }
    }

    pub async fn estimate<W: WalletSession>(
        &self,
        bytecode: &Bytes,
        from: Address,
        wallet: &W,
    ) -> GasEstimate {
        let tx = DeployTransaction::new(from, bytecode.clone());

        match wallet.estimate_gas(&tx).await {
            Ok(units) if units > 0 => {
                let gas_limit = self.apply_buffer(units);
                tracing::debug!(estimate = units, gas_limit, "Gas estimated");
                GasEstimate {
                    gas_limit,
                    source: GasSource::Estimated,
                }
            }
            Ok(_) => {
                tracing::warn!(fallback = self.fallback_limit(), "Signer returned a zero gas estimate, using fallback");
                self.fallback()
            }
            Err(e) => {
                tracing::warn!(error = %e, fallback = self.fallback_limit(), "Gas estimation failed, using fallback");
                self.fallback()
            }
        }
    }

    /// Scale `units` by the buffer multiplier, rounding up.
    pub fn apply_buffer(&self, units: u64) -> u64 {
        let multiplier = if self.policy.buffer_multiplier.is_finite() && self.policy.buffer_multiplier >= 1.0 {
            self.policy.buffer_multiplier
        } else {
            1.0
        };
        // Basis points keep the rounding exact for the usual one-decimal multipliers.
        let bps = (multiplier * 10_000.0).round() as u128;
        let buffered = (units as u128)
            .checked_mul(bps)
            .map_or(u128::MAX, |v| v.div_ceil(10_000));
        u64::try_from(buffered).unwrap_or(u64::MAX).max(units)
    }

    fn fallback_limit(&self) -> u64 {
        self.policy.fallback_limit.max(1)
    }

    fn fallback(&self) -> GasEstimate {
        GasEstimate {
            gas_limit: self.fallback_limit(),
            source: GasSource::Fallback,
        }
    }
}

#[cfg(test)]
mod tests {
    use alloy_core::primitives::{B256, U256};

    use super::*;
    use crate::{NetworkConfig, RawError};

    struct EstimatingWallet {
        estimate: Result<u64, RawError>,
    }

    impl WalletSession for EstimatingWallet {
        async fn connect(&self) -> Result<Address, RawError> {
            Ok(Address::ZERO)
        }

        fn current_address(&self) -> Option<Address> {
            Some(Address::ZERO)
        }

        async fn balance_of(&self, _address: Address) -> Result<U256, RawError> {
            Ok(U256::MAX)
        }

        async fn switch_network(&self, _network: &NetworkConfig) -> Result<(), RawError> {
            Ok(())
        }

        async fn estimate_gas(&self, _tx: &DeployTransaction) -> Result<u64, RawError> {
            self.estimate.clone()
        }

        async fn send_transaction(&self, _tx: &DeployTransaction) -> Result<B256, RawError> {
            Ok(B256::ZERO)
        }
    }

    fn bytecode() -> Bytes {
        Bytes::from_static(&[0x60, 0x80, 0x60, 0x40])
    }

    #[tokio::test]
    async fn test_estimate_applies_buffer() {
        let wallet = EstimatingWallet { estimate: Ok(100_000) };
        let estimate = GasEstimator::default()
            .estimate(&bytecode(), Address::ZERO, &wallet)
            .await;
        assert_eq!(estimate.gas_limit, 130_000);
        assert_eq!(estimate.source, GasSource::Estimated);
    }

    #[tokio::test]
    async fn test_estimation_failure_falls_back() {
        let wallet = EstimatingWallet {
            estimate: Err(RawError::provider(Some(-32000), "execution reverted")),
        };
        let estimate = GasEstimator::default()
            .estimate(&bytecode(), Address::ZERO, &wallet)
            .await;
        assert_eq!(estimate.gas_limit, 2_000_000);
        assert_eq!(estimate.source, GasSource::Fallback);
    }

    #[tokio::test]
    async fn test_zero_estimate_falls_back() {
        let wallet = EstimatingWallet { estimate: Ok(0) };
        let estimate = GasEstimator::new(GasPolicy {
            buffer_multiplier: 1.5,
            fallback_limit: 3_000_000,
        })
        .estimate(&bytecode(), Address::ZERO, &wallet)
        .await;
        assert_eq!(estimate.gas_limit, 3_000_000);
    }

    #[test]
    fn test_apply_buffer_rounds_up_and_never_shrinks() {
        let estimator = GasEstimator::default();
        assert_eq!(estimator.apply_buffer(21_001), 27_302);
        assert_eq!(estimator.apply_buffer(u64::MAX), u64::MAX);

        let shrinking = GasEstimator::new(GasPolicy {
            buffer_multiplier: 0.5,
            fallback_limit: 1,
        });
        assert_eq!(shrinking.apply_buffer(50_000), 50_000);
    }

    #[test]
    fn test_fallback_is_always_positive() {
        let estimator = GasEstimator::new(GasPolicy {
            buffer_multiplier: 1.3,
            fallback_limit: 0,
        });
        assert!(estimator.fallback().gas_limit > 0);
    }
}
