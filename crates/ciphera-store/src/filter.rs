//! Record filtering for store listings.

use ciphera_canonical::{NodeId, SubjectId};
use ciphera_core::{CredentialRecord, CredentialStatus};

/// Trait for selecting records in [`CredentialStore::list`](crate::CredentialStore::list).
pub trait RecordFilter {
    /// Returns true if the record matches.
    fn matches(&self, record: &CredentialRecord) -> bool;
}

/// Matches every record.
impl RecordFilter for () {
    fn matches(&self, _record: &CredentialRecord) -> bool {
        true
    }
}

/// Filter by current status.
#[derive(Debug, Clone)]
pub struct StatusFilter {
    /// Status to match.
    pub status: CredentialStatus,
}

impl RecordFilter for StatusFilter {
    fn matches(&self, record: &CredentialRecord) -> bool {
        record.status() == self.status
    }
}

/// Filter by subject.
#[derive(Debug, Clone)]
pub struct SubjectFilter {
    /// Subject to match.
    pub subject_id: SubjectId,
}

impl RecordFilter for SubjectFilter {
    fn matches(&self, record: &CredentialRecord) -> bool {
        record.credential.subject_id == self.subject_id
    }
}

/// Filter by owning node.
#[derive(Debug, Clone)]
pub struct OwnerFilter {
    /// Owner node to match.
    pub owner_node: NodeId,
}

impl RecordFilter for OwnerFilter {
    fn matches(&self, record: &CredentialRecord) -> bool {
        record.credential.owner_node == self.owner_node
    }
}

/// Composite filter: all filters must match.
pub struct AndFilter {
    /// Filters to combine.
    pub filters: Vec<Box<dyn RecordFilter + Send + Sync>>,
}

impl RecordFilter for AndFilter {
    fn matches(&self, record: &CredentialRecord) -> bool {
        self.filters.iter().all(|f| f.matches(record))
    }
}
