use ciphera_canonical::NodeId;
use ciphera_core::{Credential, RevocationEvent, VerifyStatus};
use ciphera_sessions::Session;
use serde::{Deserialize, Serialize};

/// One verifier node's biometric match result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BiometricVote {
    /// Voting node.
    pub node_id: NodeId,
    /// Whether the node matched the subject.
    pub verified: bool,
}

impl BiometricVote {
    /// A positive vote.
    pub fn accept(node_id: NodeId) -> Self {
        Self {
            node_id,
            verified: true,
        }
    }

    /// A negative vote.
    pub fn reject(node_id: NodeId) -> Self {
        Self {
            node_id,
            verified: false,
        }
    }
}

/// Why a request was denied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum DenyReason {
    /// The biometric check did not pass.
    BiometricRejected,
    /// Too few nodes voted in favour.
    InsufficientVotes {
        /// Distinct positive votes from known nodes.
        positive: usize,
        /// Strict majority of known nodes.
        required: usize,
    },
    /// The credential is not valid.
    CredentialInvalid {
        /// Status reported for the credential.
        status: VerifyStatus,
    },
}

impl std::fmt::Display for DenyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DenyReason::BiometricRejected => write!(f, "biometric check failed"),
            DenyReason::InsufficientVotes { positive, required } => {
                write!(f, "{} positive votes, {} required", positive, required)
            }
            DenyReason::CredentialInvalid { status } => {
                write!(f, "credential is {:?}", status)
            }
        }
    }
}

/// Outcome of an issuance request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum IssueDecision {
    /// Credential stored at the gateway.
    Issued {
        /// The new credential.
        credential: Credential,
        /// Nodes that stored a replica.
        replicated_to: Vec<NodeId>,
    },
    /// Issuance refused.
    Denied {
        /// Why.
        reason: DenyReason,
    },
    /// The rate limiter refused the request.
    RateLimited,
}

/// Outcome of an authentication request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum AuthDecision {
    /// A session was opened.
    Accepted {
        /// The new session.
        session: Session,
    },
    /// Authentication refused.
    Denied {
        /// Why.
        reason: DenyReason,
    },
    /// The rate limiter refused the request.
    RateLimited,
}

/// Outcome of a revocation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum RevokeDecision {
    /// The credential is revoked; `event` is the revocation being propagated.
    Accepted {
        /// The revocation event.
        event: RevocationEvent,
    },
    /// The gateway has no record of the credential.
    NotFound,
}
