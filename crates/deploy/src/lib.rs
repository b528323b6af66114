//! forgecast-deploy - Contract deployment through a user-controlled signer.
//!
//! This crate drives the deployment of contract bytecode to an EVM network: it
//! switches the signer to the target chain, picks a healthy RPC endpoint, estimates
//! gas, submits the creation transaction and waits for its receipt, retrying
//! transient failures under a bounded policy.

pub mod config;
pub use config::{DeploymentPolicy, GasPolicy};

pub mod error;
pub use error::{ClassifiedError, ErrorKind, RawError, classify};

mod network;
pub use network::{NativeCurrency, NetworkConfig, NetworkRegistry};

pub mod rpc;
pub use rpc::{HttpRpcClient, RpcClient, TransactionReceipt};

mod health;
pub use health::{EndpointHealth, HealthReport, HealthyEndpoint, RpcHealthProbe};

mod wallet;
pub use wallet::{DeployTransaction, JsonRpcWallet, WalletSession};

mod gas;
pub use gas::{GasEstimate, GasEstimator, GasSource};

mod submit;
pub use submit::TransactionSubmitter;

mod poller;
pub use poller::{ConfirmationPoller, Lookup, LookupOutcome, MIN_POLL_INTERVAL};

mod orchestrator;
pub use orchestrator::{
    AttemptOutcome, DeploymentAttempt, DeploymentOrchestrator, DeploymentRequest,
    DeploymentResult, DeploymentState, Progress, ProgressCallback,
};

mod record;
pub use record::{DEPLOYMENTS_FILENAME, DeploymentLog, DeploymentRecord};

#[cfg(test)]
mod test_utils;
