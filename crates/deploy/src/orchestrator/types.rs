//! Request, attempt log and result types.

use alloy_core::primitives::{Address, B256, Bytes};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{ClassifiedError, ErrorKind};

/// A request to deploy `bytecode` to a registered network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRequest {
    /// Contract init code.
    pub bytecode: Bytes,
    pub target_network_id: String,
    /// Used verbatim when set; the gas estimator is skipped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_gas_limit: Option<u64>,
}

impl DeploymentRequest {
    pub fn new(bytecode: impl Into<Bytes>, target_network_id: impl Into<String>) -> Self {
        Self {
            bytecode: bytecode.into(),
            target_network_id: target_network_id.into(),
            requested_gas_limit: None,
        }
    }

    pub fn with_gas_limit(mut self, gas_limit: u64) -> Self {
        self.requested_gas_limit = Some(gas_limit);
        self
    }
}

/// How an attempt ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "error", rename_all = "snake_case")]
pub enum AttemptOutcome {
    InProgress,
    Succeeded,
    /// Failed with a retryable error; a later attempt followed.
    Retried(ClassifiedError),
    Failed(ClassifiedError),
}

/// One pass through the probe → submit → poll pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentAttempt {
    /// One-based.
    pub attempt_number: u32,
    pub started_at: DateTime<Utc>,
    pub rpc_endpoint_used: Option<Url>,
    pub gas_limit_used: Option<u64>,
    pub transaction_hash: Option<B256>,
    pub outcome: AttemptOutcome,
}

impl DeploymentAttempt {
    pub fn new(attempt_number: u32) -> Self {
        Self {
            attempt_number,
            started_at: Utc::now(),
            rpc_endpoint_used: None,
            gas_limit_used: None,
            transaction_hash: None,
            outcome: AttemptOutcome::InProgress,
        }
    }
}

/// The single terminal outcome of a deployment request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentResult {
    pub network_id: String,
    pub success: bool,
    pub contract_address: Option<Address>,
    /// Present whenever a transaction was broadcast, including on timeout.
    pub transaction_hash: Option<B256>,
    pub gas_used: Option<u64>,
    pub block_number: Option<u64>,
    pub error: Option<ClassifiedError>,
    pub attempts: Vec<DeploymentAttempt>,
}

impl DeploymentResult {
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.len()
    }

    /// The transaction may have been included even though the flow did not see it.
    pub fn needs_verification(&self) -> bool {
        !self.success && self.transaction_hash.is_some()
    }
}
