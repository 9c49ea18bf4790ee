//! Proposals, snapshots, and outcome records

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::VersionId;

/// State document: string keys mapping to arbitrary JSON values
pub type StateData = serde_json::Map<String, Value>;

/// A change request from an agent
///
/// Proposals never mutate after creation; the queue owns them until a
/// reconciliation cycle consumes them exactly once.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    /// Unique among currently pending proposals
    pub intent_id: String,
    /// Opaque encoded delta (see the patch engine for the grammar)
    pub delta_patch: String,
    /// Speculative change; its result is advisory, not authoritative
    #[serde(default)]
    pub provisional: bool,
}

impl Proposal {
    pub fn new(intent_id: impl Into<String>, delta_patch: impl Into<String>) -> Self {
        Proposal {
            intent_id: intent_id.into(),
            delta_patch: delta_patch.into(),
            provisional: false,
        }
    }

    pub fn provisional(intent_id: impl Into<String>, delta_patch: impl Into<String>) -> Self {
        Proposal {
            provisional: true,
            ..Proposal::new(intent_id, delta_patch)
        }
    }
}

/// Immutable snapshot of the canonical state
///
/// `version == None` denotes the unversioned bootstrap state. Once a version
/// is assigned the data never changes; new data always gets a new version.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    #[serde(default)]
    pub data: StateData,
    pub version: Option<VersionId>,
}

impl StateSnapshot {
    /// The empty, unversioned state that exists before the first commit
    pub fn bootstrap() -> Self {
        StateSnapshot {
            data: StateData::new(),
            version: None,
        }
    }

    /// A pending (not yet committed) snapshot
    pub fn pending(data: StateData) -> Self {
        StateSnapshot {
            data,
            version: None,
        }
    }

    pub fn versioned(data: StateData, version: VersionId) -> Self {
        StateSnapshot {
            data,
            version: Some(version),
        }
    }
}

/// How a consumed proposal was resolved
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Disposition {
    /// Folded into a committed version
    Applied,
    /// Folded into the provisional overlay (advisory)
    AppliedProvisional,
    /// Not applied this cycle; the agent may resubmit
    Rejected { reason: String },
    /// Provisional result overwritten by a later committed write
    Superseded,
}

/// Archived record of a consumed proposal
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProposalOutcome {
    pub intent_id: String,
    pub disposition: Disposition,
    /// Version the outcome belongs to, when one was committed that cycle
    pub version: Option<VersionId>,
}

impl ProposalOutcome {
    pub fn new(intent_id: impl Into<String>, disposition: Disposition) -> Self {
        ProposalOutcome {
            intent_id: intent_id.into(),
            disposition,
            version: None,
        }
    }

    pub fn at_version(mut self, version: VersionId) -> Self {
        self.version = Some(version);
        self
    }

    pub fn rejected(intent_id: impl Into<String>, reason: impl Into<String>) -> Self {
        ProposalOutcome::new(
            intent_id,
            Disposition::Rejected {
                reason: reason.into(),
            },
        )
    }
}
