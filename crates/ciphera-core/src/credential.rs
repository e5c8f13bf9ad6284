use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use ciphera_canonical::{content_hash, CredentialId, Digest, EventId, HashError, NodeId, SubjectId};
use serde::{Deserialize, Serialize};

/// Domain separator for credential content hashes: `b"ciphera:credential:v1\0"`.
const CREDENTIAL_DOMAIN_SEPARATOR: &[u8] = b"ciphera:credential:v1\0";

/// Lifecycle status of a credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CredentialStatus {
    /// Issued and usable.
    Active,
    /// Revoked by an operator; terminal.
    Revoked,
    /// Past its TTL; terminal unless later revoked.
    Expired,
}

/// Result of a verification query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerifyStatus {
    /// Credential is active.
    Valid,
    /// Credential was revoked.
    Revoked,
    /// Credential passed its TTL.
    Expired,
    /// Credential is unknown.
    NotFound,
}

impl From<CredentialStatus> for VerifyStatus {
    fn from(status: CredentialStatus) -> Self {
        match status {
            CredentialStatus::Active => VerifyStatus::Valid,
            CredentialStatus::Revoked => VerifyStatus::Revoked,
            CredentialStatus::Expired => VerifyStatus::Expired,
        }
    }
}

/// Immutable issuance record of a credential.
///
/// Status is not stored here; it is derived from the [`Transition`]s held in
/// a [`CredentialRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Unique credential identifier.
    pub credential_id: CredentialId,
    /// Subject the credential asserts.
    pub subject_id: SubjectId,
    /// Node responsible for verifying this credential.
    pub owner_node: NodeId,
    /// Issuance time.
    pub issued_at: DateTime<Utc>,
    /// Lifetime from issuance.
    #[serde(with = "crate::serde_duration")]
    pub ttl: Duration,
    /// Digest over the issuance fields above.
    pub content_hash: Digest,
}

#[derive(Serialize)]
struct IssuanceFields<'a> {
    credential_id: &'a CredentialId,
    subject_id: &'a SubjectId,
    owner_node: &'a NodeId,
    issued_at: &'a DateTime<Utc>,
    ttl_ms: u64,
}

impl Credential {
    /// Builds a new credential and computes its content hash.
    pub fn issue(
        credential_id: CredentialId,
        subject_id: SubjectId,
        owner_node: NodeId,
        issued_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<Self, HashError> {
        let content_hash = Self::hash_fields(&credential_id, &subject_id, &owner_node, &issued_at, ttl)?;
        Ok(Self {
            credential_id,
            subject_id,
            owner_node,
            issued_at,
            ttl,
            content_hash,
        })
    }

    fn hash_fields(
        credential_id: &CredentialId,
        subject_id: &SubjectId,
        owner_node: &NodeId,
        issued_at: &DateTime<Utc>,
        ttl: Duration,
    ) -> Result<Digest, HashError> {
        content_hash(
            CREDENTIAL_DOMAIN_SEPARATOR,
            &IssuanceFields {
                credential_id,
                subject_id,
                owner_node,
                issued_at,
                ttl_ms: ttl.as_millis().min(u64::MAX as u128) as u64,
            },
        )
    }

    /// Recomputes the content hash and compares it with the stored one.
    pub fn verify_content_hash(&self) -> Result<bool, HashError> {
        let computed = Self::hash_fields(
            &self.credential_id,
            &self.subject_id,
            &self.owner_node,
            &self.issued_at,
            self.ttl,
        )?;
        Ok(computed == self.content_hash)
    }

    /// Time at which the TTL elapses, if representable.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        TimeDelta::from_std(self.ttl)
            .ok()
            .and_then(|ttl| self.issued_at.checked_add_signed(ttl))
    }

    /// Whether the TTL has elapsed at `now`.
    pub fn is_past_ttl(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at() {
            Some(expires_at) => now >= expires_at,
            None => false,
        }
    }
}

/// A state change recorded against a credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Transition {
    /// Initial issuance.
    Issued {
        /// Issuance time.
        at: DateTime<Utc>,
    },
    /// Revocation applied from a revocation event.
    Revoked {
        /// Revocation time from the event.
        at: DateTime<Utc>,
        /// Event that caused the revocation, when known.
        #[serde(skip_serializing_if = "Option::is_none")]
        event_id: Option<EventId>,
    },
    /// TTL expiry.
    Expired {
        /// Time the expiry was observed.
        at: DateTime<Utc>,
    },
}

/// A credential together with its transition history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    /// Issuance record.
    pub credential: Credential,
    /// Ordered transitions, starting with `Issued`.
    pub transitions: Vec<Transition>,
}

impl CredentialRecord {
    /// Starts a record with a single `Issued` transition.
    pub fn issued(credential: Credential) -> Self {
        let at = credential.issued_at;
        Self {
            credential,
            transitions: vec![Transition::Issued { at }],
        }
    }

    /// Current status derived from the transitions.
    ///
    /// A revocation anywhere in the history wins over expiry.
    pub fn status(&self) -> CredentialStatus {
        let mut status = CredentialStatus::Active;
        for transition in &self.transitions {
            match transition {
                Transition::Issued { .. } => {}
                Transition::Revoked { .. } => return CredentialStatus::Revoked,
                Transition::Expired { .. } => status = CredentialStatus::Expired,
            }
        }
        status
    }

    /// Time of the most recent revocation, if any.
    pub fn revoked_at(&self) -> Option<DateTime<Utc>> {
        self.transitions.iter().find_map(|t| match t {
            Transition::Revoked { at, .. } => Some(*at),
            _ => None,
        })
    }
}
