//! The deployment state machine.
//!
//! [`DeploymentOrchestrator::run`] drives one [`DeploymentRequest`] through
//! connect, network switch, RPC probe, gas estimation, submission and confirmation
//! polling, and always returns exactly one [`DeploymentResult`].
//!
//! Retry policy:
//! - a failed wallet connection is terminal;
//! - only failures classified as retryable start a new attempt, after a fixed delay;
//! - each new attempt probes the RPC endpoints again from the first one;
//! - the number of attempts is bounded by [`DeploymentPolicy::max_retries`].
//!
//! Cancellation is observed at every suspension point. Once a transaction hash has
//! been obtained, cancelling only stops the confirmation polling: the transaction is
//! already broadcast and cannot be recalled, and the result carries its hash.

mod state;
mod types;

use std::sync::Arc;

use alloy_core::primitives::Address;
use tokio_util::sync::CancellationToken;

pub use state::{DeploymentState, Progress};
pub use types::{AttemptOutcome, DeploymentAttempt, DeploymentRequest, DeploymentResult};

use crate::{
    ClassifiedError, ConfirmationPoller, DeploymentPolicy, GasEstimator, NetworkConfig,
    NetworkRegistry, RawError, RpcHealthProbe, TransactionReceipt, TransactionSubmitter,
    WalletSession, classify, rpc::RpcClient,
};

/// Callback invoked on every state transition; for display only.
pub type ProgressCallback = Arc<dyn Fn(Progress) + Send + Sync>;

/// Composes the wallet, the RPC endpoints and the policy into deployment flows.
///
/// The orchestrator holds no per-request state: independent requests (on different
/// sessions) can run concurrently against the same registry.
pub struct DeploymentOrchestrator<W, R> {
    registry: Arc<NetworkRegistry>,
    wallet: Arc<W>,
    rpc: Arc<R>,
    policy: DeploymentPolicy,
    on_progress: Option<ProgressCallback>,
}

impl<W, R> DeploymentOrchestrator<W, R>
where
    W: WalletSession,
    R: RpcClient,
{
    pub fn new(registry: Arc<NetworkRegistry>, wallet: Arc<W>, rpc: Arc<R>) -> Self {
        Self {
            registry,
            wallet,
            rpc,
            policy: DeploymentPolicy::default(),
            on_progress: None,
        }
    }

    pub fn with_policy(mut self, policy: DeploymentPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn on_progress(mut self, callback: impl Fn(Progress) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Arc::new(callback));
        self
    }

    pub fn policy(&self) -> &DeploymentPolicy {
        &self.policy
    }

    pub fn registry(&self) -> &NetworkRegistry {
        &self.registry
    }

    /// Run a deployment to completion.
    pub async fn run(&self, request: DeploymentRequest) -> DeploymentResult {
        self.run_with_cancel(request, CancellationToken::new()).await
    }

    /// Run a deployment, stopping early if `cancel` fires.
    #[tracing::instrument(skip_all, fields(network = %request.target_network_id))]
    pub async fn run_with_cancel(
        &self,
        request: DeploymentRequest,
        cancel: CancellationToken,
    ) -> DeploymentResult {
        let mut flow = Flow::new(&request.target_network_id, self.on_progress.as_ref());
        flow.begin_attempt();

        tracing::info!(
            bytecode_len = request.bytecode.len(),
            max_attempts = self.policy.max_attempts(),
            "Starting deployment..."
        );

        let network = match self.registry.get(&request.target_network_id) {
            Ok(network) => network,
            Err(e) => return flow.fail(classify(&e)),
        };

        flow.enter(DeploymentState::Connecting);
        let from = match guard(&cancel, self.wallet.connect()).await {
            Ok(address) => address,
            Err(e) => return flow.fail(classify(&e)),
        };

        let mut backoff = self.policy.retry_backoff();
        let mut network_ready = false;

        loop {
            let attempt = self
                .attempt(&mut flow, &request, network, from, &mut network_ready, &cancel)
                .await;

            let error = match attempt {
                Ok(receipt) => return flow.succeed(receipt),
                Err(error) if !error.retryable => return flow.fail(error),
                Err(error) => error,
            };

            let Some(delay) = backoff.next() else {
                tracing::error!(attempts = flow.attempt_number(), "Retries exhausted");
                return flow.fail(error);
            };

            tracing::warn!(
                attempt = flow.attempt_number(),
                error = %error,
                delay_secs = delay.as_secs(),
                "Attempt failed, retrying..."
            );
            flow.retry(error);

            if let Err(e) = guard(&cancel, async {
                tokio::time::sleep(delay).await;
                Ok::<_, RawError>(())
            })
            .await
            {
                return flow.fail(classify(&e));
            }

            flow.begin_attempt();
        }
    }

    /// One pass from the network switch (if still needed) to confirmation.
    async fn attempt(
        &self,
        flow: &mut Flow<'_>,
        request: &DeploymentRequest,
        network: &NetworkConfig,
        from: Address,
        network_ready: &mut bool,
        cancel: &CancellationToken,
    ) -> Result<TransactionReceipt, ClassifiedError> {
        if !*network_ready {
            flow.enter(DeploymentState::SwitchingNetwork);
            guard(cancel, self.wallet.switch_network(network)).await?;
            *network_ready = true;
            tracing::info!(chain_id = network.chain_id, "Signer switched to target network");
        }

        flow.enter(DeploymentState::ProbingRpc);
        let probe = RpcHealthProbe::new(self.policy.probe_timeout());
        let endpoint = guard(cancel, probe.probe(self.rpc.as_ref(), &network.rpc_endpoints)).await?;
        tracing::info!(endpoint = %endpoint.url, block_number = endpoint.block_number, "Using RPC endpoint");
        flow.current().rpc_endpoint_used = Some(endpoint.url.clone());

        flow.enter(DeploymentState::EstimatingGas);
        let gas_limit = match request.requested_gas_limit {
            Some(gas_limit) => gas_limit,
            None => {
                let estimator = GasEstimator::new(network.gas.unwrap_or(self.policy.gas));
                guard(cancel, async {
                    Ok::<_, RawError>(
                        estimator
                            .estimate(&request.bytecode, from, self.wallet.as_ref())
                            .await,
                    )
                })
                .await?
                .gas_limit
            }
        };
        flow.current().gas_limit_used = Some(gas_limit);

        let balance = guard(cancel, self.wallet.balance_of(from)).await?;
        if balance < self.policy.min_balance {
            return Err(classify(&RawError::InsufficientBalance {
                balance,
                required: self.policy.min_balance,
            }));
        }

        flow.enter(DeploymentState::Submitting);
        let hash = guard_broadcast(
            cancel,
            TransactionSubmitter.submit(&request.bytecode, from, gas_limit, self.wallet.as_ref()),
        )
        .await?;
        flow.current().transaction_hash = Some(hash);

        flow.enter(DeploymentState::Polling);
        let poller =
            ConfirmationPoller::new(self.policy.poll_interval(), self.policy.confirmation_timeout())
                .with_request_timeout(self.policy.receipt_request_timeout());
        let receipt = guard(cancel, poller.poll(self.rpc.as_ref(), &endpoint.url, hash)).await?;

        if !receipt.status || receipt.contract_address.is_none() {
            return Err(classify(&RawError::Reverted { hash }));
        }

        Ok(receipt)
    }
}

/// Await `fut` unless `cancel` fires first.
async fn guard<T, E>(
    cancel: &CancellationToken,
    fut: impl Future<Output = Result<T, E>>,
) -> Result<T, E>
where
    E: From<RawError>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(RawError::Cancelled.into()),
        result = fut => result,
    }
}

/// Like [`guard`], but a completed broadcast wins over cancellation so an obtained
/// hash is never dropped.
async fn guard_broadcast<T, E>(
    cancel: &CancellationToken,
    fut: impl Future<Output = Result<T, E>>,
) -> Result<T, E>
where
    E: From<RawError>,
{
    tokio::select! {
        biased;
        result = fut => result,
        _ = cancel.cancelled() => Err(RawError::Cancelled.into()),
    }
}

/// Per-request bookkeeping: current state and the attempt log.
struct Flow<'a> {
    network_id: String,
    state: DeploymentState,
    attempts: Vec<DeploymentAttempt>,
    on_progress: Option<&'a ProgressCallback>,
}

impl<'a> Flow<'a> {
    fn new(network_id: &str, on_progress: Option<&'a ProgressCallback>) -> Self {
        Self {
            network_id: network_id.to_string(),
            state: DeploymentState::Idle,
            attempts: Vec::new(),
            on_progress,
        }
    }

    fn attempt_number(&self) -> u32 {
        self.attempts.last().map_or(0, |a| a.attempt_number)
    }

    fn begin_attempt(&mut self) {
        let attempt = DeploymentAttempt::new(self.attempt_number() + 1);
        self.attempts.push(attempt);
    }

    fn current(&mut self) -> &mut DeploymentAttempt {
        if self.attempts.is_empty() {
            self.begin_attempt();
        }
        let last = self.attempts.len() - 1;
        &mut self.attempts[last]
    }

    fn enter(&mut self, next: DeploymentState) {
        if !self.state.can_transition_to(next) {
            tracing::warn!(from = %self.state, to = %next, "Unexpected state transition");
        }
        tracing::debug!(from = %self.state, to = %next, attempt = self.attempt_number(), "State transition");
        self.state = next;

        if let Some(callback) = self.on_progress {
            callback(Progress {
                state: next,
                attempt: self.attempt_number(),
            });
        }
    }

    fn retry(&mut self, error: ClassifiedError) {
        self.current().outcome = AttemptOutcome::Retried(error);
        self.enter(DeploymentState::Retrying);
    }

    fn succeed(mut self, receipt: TransactionReceipt) -> DeploymentResult {
        self.current().outcome = AttemptOutcome::Succeeded;
        self.enter(DeploymentState::Succeeded);

        tracing::info!(
            contract_address = ?receipt.contract_address,
            tx_hash = %receipt.transaction_hash,
            gas_used = receipt.gas_used,
            block_number = receipt.block_number,
            attempts = self.attempts.len(),
            "✓ Deployment succeeded"
        );

        let transaction_hash = self.last_transaction_hash().or(Some(receipt.transaction_hash));
        DeploymentResult {
            network_id: self.network_id,
            success: true,
            contract_address: receipt.contract_address,
            transaction_hash,
            gas_used: Some(receipt.gas_used),
            block_number: Some(receipt.block_number),
            error: None,
            attempts: self.attempts,
        }
    }

    fn fail(mut self, error: ClassifiedError) -> DeploymentResult {
        self.current().outcome = AttemptOutcome::Failed(error.clone());
        self.enter(DeploymentState::Failed);

        let transaction_hash = self.last_transaction_hash();
        tracing::error!(
            kind = %error.kind,
            error = %error.message,
            tx_hash = ?transaction_hash,
            attempts = self.attempts.len(),
            "Deployment failed"
        );

        DeploymentResult {
            network_id: self.network_id,
            success: false,
            contract_address: None,
            transaction_hash,
            gas_used: None,
            block_number: None,
            error: Some(error),
            attempts: self.attempts,
        }
    }

    fn last_transaction_hash(&self) -> Option<alloy_core::primitives::B256> {
        self.attempts.iter().rev().find_map(|a| a.transaction_hash)
    }
}
