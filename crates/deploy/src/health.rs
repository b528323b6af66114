//! RPC endpoint liveness checks.
//!
//! [`RpcHealthProbe::probe`] walks a network's endpoints in order and stops at the
//! first one that answers a latest-block query within the per-endpoint timeout.
//! [`RpcHealthProbe::survey`] checks every endpoint and produces a printable report.

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;
use url::Url;

use crate::{NetworkConfig, RawError, rpc::RpcClient};

/// An endpoint that answered its liveness call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthyEndpoint {
    pub url: Url,
    pub block_number: u64,
}

/// Sequential failover across a network's RPC endpoints.
#[derive(Debug, Clone, Copy)]
pub struct RpcHealthProbe {
    per_endpoint_timeout: Duration,
}

impl RpcHealthProbe {
    pub fn new(per_endpoint_timeout: Duration) -> Self {
        Self {
            per_endpoint_timeout,
        }
    }

    pub fn per_endpoint_timeout(&self) -> Duration {
        self.per_endpoint_timeout
    }

    /// The candidates to try, in preference order.
    ///
    /// Each call starts over from the first endpoint, so a retry never inherits the
    /// previous attempt's verdicts.
    pub fn candidates<'a>(&self, endpoints: &'a [Url]) -> impl Iterator<Item = &'a Url> + Clone {
        endpoints.iter()
    }

    /// Run one liveness call against `endpoint`, bounded by the per-endpoint timeout.
    pub async fn check<R: RpcClient>(&self, rpc: &R, endpoint: &Url) -> Result<u64, RawError> {
        match tokio::time::timeout(self.per_endpoint_timeout, rpc.block_number(endpoint)).await {
            Ok(result) => result,
            Err(_) => Err(RawError::RequestTimeout {
                operation: "eth_blockNumber".to_string(),
                elapsed: self.per_endpoint_timeout,
            }),
        }
    }

    /// Return the first endpoint that passes [`Self::check`].
    ///
    /// Worst-case latency is `endpoints.len() * per_endpoint_timeout`. Fails with
    /// [`RawError::NoHealthyEndpoint`] when every candidate fails.
    pub async fn probe<R: RpcClient>(
        &self,
        rpc: &R,
        endpoints: &[Url],
    ) -> Result<HealthyEndpoint, RawError> {
        let mut tried = 0;
        for endpoint in self.candidates(endpoints) {
            tried += 1;
            match self.check(rpc, endpoint).await {
                Ok(block_number) => {
                    tracing::debug!(endpoint = %endpoint, block_number, "RPC endpoint is healthy");
                    return Ok(HealthyEndpoint {
                        url: endpoint.clone(),
                        block_number,
                    });
                }
                Err(e) => {
                    tracing::debug!(endpoint = %endpoint, error = %e, "RPC endpoint failed liveness check");
                }
            }
        }

        Err(RawError::NoHealthyEndpoint { tried })
    }

    /// Check every endpoint of `network`.
    pub async fn survey<R: RpcClient>(&self, rpc: &R, network: &NetworkConfig) -> HealthReport {
        let mut endpoints = Vec::with_capacity(network.rpc_endpoints.len());

        for endpoint in self.candidates(&network.rpc_endpoints) {
            let started = Instant::now();
            let result = self.check(rpc, endpoint).await;
            let latency = started.elapsed();

            endpoints.push(match result {
                Ok(block_number) => EndpointHealth {
                    url: endpoint.clone(),
                    block_number: Some(block_number),
                    latency: Some(latency),
                    error: None,
                },
                Err(e) => EndpointHealth {
                    url: endpoint.clone(),
                    block_number: None,
                    latency: None,
                    error: Some(e.to_string()),
                },
            });
        }

        let healthy = compute_healthy(&endpoints);

        HealthReport {
            network_id: network.id.clone(),
            chain_id: network.chain_id,
            endpoints,
            healthy,
        }
    }
}

impl Default for RpcHealthProbe {
    fn default() -> Self {
        Self::new(crate::rpc::DEFAULT_TIMEOUT)
    }
}

/// Health report for every endpoint of a network.
pub struct HealthReport {
    pub network_id: String,
    pub chain_id: u64,
    pub endpoints: Vec<EndpointHealth>,
    /// At least one endpoint is usable.
    pub healthy: bool,
}

/// Health status for a single RPC endpoint.
pub struct EndpointHealth {
    pub url: Url,
    pub block_number: Option<u64>,
    pub latency: Option<Duration>,
    pub error: Option<String>,
}

impl EndpointHealth {
    pub fn is_up(&self) -> bool {
        self.block_number.is_some()
    }
}

fn compute_healthy(endpoints: &[EndpointHealth]) -> bool {
    endpoints.iter().any(EndpointHealth::is_up)
}

// -- Display implementations for printing health reports --

impl fmt::Display for HealthReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if self.healthy { "HEALTHY" } else { "UNHEALTHY" };
        writeln!(f, "Network Status: {}", status)?;
        writeln!(f)?;

        writeln!(f, "=== {} (chain_id={}) ===", self.network_id, self.chain_id)?;
        for endpoint in &self.endpoints {
            writeln!(f, "{}", endpoint)?;
        }

        Ok(())
    }
}

impl fmt::Display for EndpointHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = status_icon(self.is_up());
        write!(f, "  {} {} ", status, self.url)?;

        if let Some(bn) = self.block_number {
            write!(f, "block={} ", bn)?;
        }
        if let Some(latency) = self.latency {
            write!(f, "latency={}ms", latency.as_millis())?;
        }
        if let Some(ref error) = self.error {
            write!(f, "({})", error)?;
        }

        Ok(())
    }
}

fn status_icon(up: bool) -> &'static str {
    if up { "[ok]" } else { "[DOWN]" }
}
