//! Failure taxonomy for deployment flows.
//!
//! Every step of a deployment reports failures as a [`RawError`] describing what
//! happened. [`classify`] maps it onto a [`ClassifiedError`], which decides what the
//! orchestrator does next: only retryable classifications consume another attempt.

use std::time::Duration;

use alloy_core::primitives::{B256, U256};
use serde::{Deserialize, Serialize};

/// EIP-1193 "user rejected request".
pub const USER_REJECTED_CODE: i64 = 4001;
/// EIP-1193 "unrecognized chain", returned by `wallet_switchEthereumChain`.
pub const UNRECOGNIZED_CHAIN_CODE: i64 = 4902;
/// JSON-RPC "method not found".
pub const METHOD_NOT_FOUND_CODE: i64 = -32601;

/// JSON-RPC codes that signal a degraded node rather than a bad request.
const TRANSIENT_RPC_CODES: &[i64] = &[
    -32603, // internal error
    -32002, // resource unavailable
    -32005, // limit exceeded
];

const USER_REJECTION_MARKERS: &[&str] = &[
    "user rejected",
    "user denied",
    "rejected by user",
    "action_rejected",
];

const CONNECTIVITY_MARKERS: &[&str] = &[
    "failed to fetch",
    "network error",
    "timeout",
    "timed out",
    "rate limit",
];

/// A failure as observed at the wallet or RPC boundary, before classification.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RawError {
    /// An error object returned by a JSON-RPC node or an EIP-1193 signer.
    #[error("provider error{}: {message}", .code.map(|c| format!(" {c}")).unwrap_or_default())]
    Provider { code: Option<i64>, message: String },

    /// The request never produced a response.
    #[error("transport failure: {0}")]
    Transport(String),

    /// A response arrived but could not be decoded.
    #[error("malformed RPC response: {0}")]
    MalformedResponse(String),

    /// A single request exceeded its own deadline.
    #[error("{operation} timed out after {}s", .elapsed.as_secs())]
    RequestTimeout { operation: String, elapsed: Duration },

    /// The signer did not answer in time; the request may still be pending there.
    #[error("signer did not answer {operation} within {}s", .elapsed.as_secs())]
    SignerTimeout { operation: String, elapsed: Duration },

    /// Every candidate endpoint failed its liveness check.
    #[error("no healthy RPC endpoint among {tried} candidate(s)")]
    NoHealthyEndpoint { tried: usize },

    /// The pre-flight balance check failed.
    #[error("balance {balance} wei is below the required {required} wei")]
    InsufficientBalance { balance: U256, required: U256 },

    /// The requested network is not in the registry.
    #[error("unknown network '{0}'")]
    UnknownNetwork(String),

    /// No receipt was observed before the confirmation deadline.
    #[error("transaction {hash} not confirmed within {}s", .waited.as_secs())]
    ConfirmationTimeout { hash: B256, waited: Duration },

    /// The transaction was mined but did not create a contract.
    #[error("transaction {hash} was mined without creating a contract")]
    Reverted { hash: B256 },

    /// The caller cancelled the flow.
    #[error("deployment cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

impl RawError {
    pub fn provider(code: Option<i64>, message: impl Into<String>) -> Self {
        Self::Provider {
            code,
            message: message.into(),
        }
    }

    /// The JSON-RPC / EIP-1193 error code, if the failure carried one.
    pub fn code(&self) -> Option<i64> {
        match self {
            Self::Provider { code, .. } => *code,
            _ => None,
        }
    }
}

/// Closed set of failure kinds surfaced to callers.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    UserRejected,
    InsufficientFunds,
    RpcUnavailable,
    Timeout,
    UnknownNetwork,
    Cancelled,
    Unknown,
}

impl ErrorKind {
    /// Whether a failure of this kind may be cured by another attempt.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::RpcUnavailable)
    }
}

/// A failure after classification: a kind, its retry policy and a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    pub retryable: bool,
    pub message: String,
}

impl ClassifiedError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            retryable: kind.is_retryable(),
            message: message.into(),
        }
    }
}

impl From<RawError> for ClassifiedError {
    fn from(raw: RawError) -> Self {
        classify(&raw)
    }
}

/// Map a raw failure onto the closed taxonomy.
///
/// Deterministic and side-effect free. Anything not positively recognised is
/// `Unknown` and never retried.
pub fn classify(raw: &RawError) -> ClassifiedError {
    ClassifiedError::new(kind_of(raw), raw.to_string())
}

fn kind_of(raw: &RawError) -> ErrorKind {
    match raw {
        RawError::Provider { code, message } => {
            let message = message.to_lowercase();
            if *code == Some(USER_REJECTED_CODE) || contains_any(&message, USER_REJECTION_MARKERS) {
                ErrorKind::UserRejected
            } else if message.contains("insufficient funds") {
                ErrorKind::InsufficientFunds
            } else if code.is_some_and(|c| TRANSIENT_RPC_CODES.contains(&c))
                || contains_any(&message, CONNECTIVITY_MARKERS)
            {
                ErrorKind::RpcUnavailable
            } else {
                ErrorKind::Unknown
            }
        }
        RawError::Transport(_)
        | RawError::MalformedResponse(_)
        | RawError::RequestTimeout { .. }
        | RawError::NoHealthyEndpoint { .. } => ErrorKind::RpcUnavailable,
        RawError::InsufficientBalance { .. } => ErrorKind::InsufficientFunds,
        RawError::UnknownNetwork(_) => ErrorKind::UnknownNetwork,
        RawError::ConfirmationTimeout { .. } | RawError::SignerTimeout { .. } => ErrorKind::Timeout,
        RawError::Cancelled => ErrorKind::Cancelled,
        RawError::Reverted { .. } => ErrorKind::Unknown,
        RawError::Other(message) => {
            let message = message.to_lowercase();
            if contains_any(&message, USER_REJECTION_MARKERS) {
                ErrorKind::UserRejected
            } else if contains_any(&message, CONNECTIVITY_MARKERS) {
                ErrorKind::RpcUnavailable
            } else {
                ErrorKind::Unknown
            }
        }
    }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}
