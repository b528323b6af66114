//! Broadcasting the deployment transaction.

use alloy_core::primitives::{Address, B256, Bytes};

use crate::{ClassifiedError, DeployTransaction, WalletSession, classify};

/// Builds the contract-creation transaction and hands it to the signer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransactionSubmitter;

impl TransactionSubmitter {
    /// Returns the transaction hash, or the classification of the signer's failure.
    pub async fn submit<W: WalletSession>(
        &self,
        bytecode: &Bytes,
        from: Address,
        gas_limit: u64,
        wallet: &W,
    ) -> Result<B256, ClassifiedError> {
        let tx = DeployTransaction::new(from, bytecode.clone()).with_gas(gas_limit);

        let hash = wallet.send_transaction(&tx).await.map_err(|e| classify(&e))?;
        tracing::info!(tx_hash = %hash, gas_limit, "Deployment transaction broadcast");
        Ok(hash)
    }
}
