//! Waiting for a broadcast transaction to be included.

use std::time::Duration;

use alloy_core::primitives::B256;
use futures::{Stream, StreamExt, stream};
use tokio::time::Instant;
use url::Url;

use crate::{RawError, TransactionReceipt, rpc::RpcClient};

/// Outcome of a single receipt lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupOutcome {
    Found(TransactionReceipt),
    /// The node does not know a receipt yet.
    Pending,
    /// The lookup failed; treated the same as `Pending`.
    Transient(RawError),
}

/// One tick of the polling sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lookup {
    /// Zero-based tick index.
    pub tick: u32,
    pub outcome: LookupOutcome,
}

/// Shortest spacing between two receipt lookups.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Fixed-interval receipt polling bounded by a maximum wait.
#[derive(Debug, Clone, Copy)]
pub struct ConfirmationPoller {
    interval: Duration,
    max_wait: Duration,
    request_timeout: Duration,
}

impl ConfirmationPoller {
    /// `interval` is raised to [`MIN_POLL_INTERVAL`] when shorter.
    pub fn new(interval: Duration, max_wait: Duration) -> Self {
        Self {
            interval: interval.max(MIN_POLL_INTERVAL),
            max_wait,
            request_timeout: crate::rpc::DEFAULT_TIMEOUT,
        }
    }

    /// Bound on a single lookup, so one hanging request cannot stall the schedule.
    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    pub fn max_wait(&self) -> Duration {
        self.max_wait
    }

    /// The lazy, finite sequence of receipt lookups for `hash` on `endpoint`.
    ///
    /// The first lookup is immediate, the next ones are spaced by the poll interval,
    /// and the last one happens at the deadline. The stream ends after a receipt is
    /// found or once the deadline has passed.
    pub fn lookups<'a, R: RpcClient>(
        &self,
        rpc: &'a R,
        endpoint: &'a Url,
        hash: B256,
    ) -> impl Stream<Item = Lookup> + Send + 'a {
        let deadline = Instant::now() + self.max_wait;
        let interval = self.interval;
        let request_timeout = self.request_timeout;

        stream::unfold((0u32, false), move |(tick, found)| async move {
            if found {
                return None;
            }
            if tick > 0 {
                let now = Instant::now();
                if now >= deadline {
                    return None;
                }
                tokio::time::sleep(interval.min(deadline - now)).await;
            }

            let outcome =
                match tokio::time::timeout(request_timeout, rpc.transaction_receipt(endpoint, hash))
                    .await
                {
                    Ok(Ok(Some(receipt))) => LookupOutcome::Found(receipt),
                    Ok(Ok(None)) => LookupOutcome::Pending,
                    Ok(Err(e)) => LookupOutcome::Transient(e),
                    Err(_) => LookupOutcome::Transient(RawError::RequestTimeout {
                        operation: "eth_getTransactionReceipt".to_string(),
                        elapsed: request_timeout,
                    }),
                };
            let found = matches!(outcome, LookupOutcome::Found(_));

            Some((Lookup { tick, outcome }, (tick + 1, found)))
        })
    }

    /// Poll until a receipt is observed.
    ///
    /// Lookup failures count as "not yet found". Fails with
    /// [`RawError::ConfirmationTimeout`] once the maximum wait has elapsed.
    pub async fn poll<R: RpcClient>(
        &self,
        rpc: &R,
        endpoint: &Url,
        hash: B256,
    ) -> Result<TransactionReceipt, RawError> {
        let started = Instant::now();
        let lookups = self.lookups(rpc, endpoint, hash);
        futures::pin_mut!(lookups);

        while let Some(lookup) = lookups.next().await {
            match lookup.outcome {
                LookupOutcome::Found(receipt) => {
                    tracing::debug!(tx_hash = %hash, tick = lookup.tick, block_number = receipt.block_number, "Receipt found");
                    return Ok(receipt);
                }
                LookupOutcome::Pending => {
                    tracing::trace!(tx_hash = %hash, tick = lookup.tick, "Receipt not available yet");
                }
                LookupOutcome::Transient(e) => {
                    tracing::debug!(tx_hash = %hash, tick = lookup.tick, error = %e, "Receipt lookup failed, will retry");
                }
            }
        }

        Err(RawError::ConfirmationTimeout {
            hash,
            waited: started.elapsed(),
        })
    }
}

impl Default for ConfirmationPoller {
    fn default() -> Self {
        Self::new(
            Duration::from_secs(crate::config::DEFAULT_POLL_INTERVAL_SECS),
            Duration::from_secs(crate::config::DEFAULT_CONFIRMATION_TIMEOUT_SECS),
        )
    }
}
