//! Deployment states and their legal transitions.
//!
//! The happy path is fixed:
//! Idle -> Connecting -> SwitchingNetwork -> ProbingRpc -> EstimatingGas -> Submitting
//! -> Polling -> Succeeded. A retryable failure moves to Retrying, which resumes at
//! ProbingRpc (or at SwitchingNetwork while the switch has not succeeded yet).

use derive_more::Display;
use serde::{Deserialize, Serialize};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DeploymentState {
    Idle,
    Connecting,
    SwitchingNetwork,
    ProbingRpc,
    EstimatingGas,
    Submitting,
    Polling,
    Retrying,
    Succeeded,
    Failed,
}

impl DeploymentState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// Whether `self -> next` is a legal transition.
    pub fn can_transition_to(self, next: Self) -> bool {
        use DeploymentState::*;

        match (self, next) {
            (Idle, Connecting)
            | (Connecting, SwitchingNetwork)
            | (SwitchingNetwork, ProbingRpc)
            | (ProbingRpc, EstimatingGas)
            | (EstimatingGas, Submitting)
            | (Submitting, Polling)
            | (Polling, Succeeded) => true,
            // Connecting failures are terminal, and polling never retries: the
            // transaction is already broadcast.
            (SwitchingNetwork | ProbingRpc | EstimatingGas | Submitting, Retrying) => true,
            (Retrying, SwitchingNetwork | ProbingRpc) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

/// Progress notification, emitted on every state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[display("{state} (attempt {attempt})")]
pub struct Progress {
    pub state: DeploymentState,
    pub attempt: u32,
}
