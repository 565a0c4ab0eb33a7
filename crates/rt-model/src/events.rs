use chrono::{DateTime, Utc};
use rt_ot::AppliedOperation;

use crate::error::ModelError;
use crate::model::ModelState;
use crate::reference::{ReferenceKey, ReferenceValue};
use crate::tree::PathStep;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOrigin {
    Local,
    Remote,
}

/// One discrete change to one node.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeChangeEvent {
    pub node_id: String,
    pub path: Vec<PathStep>,
    pub operation: AppliedOperation,
    pub origin: ChangeOrigin,
    pub session_id: String,
    pub username: String,
    pub version: u64,
    pub timestamp: DateTime<Utc>,
}

impl NodeChangeEvent {
    pub fn is_local(&self) -> bool {
        self.origin == ChangeOrigin::Local
    }
}

/// Emitted once per applied operation on the changed node and on every
/// ancestor up to the root, after the per-member [`NodeChangeEvent`]s.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelChangedEvent {
    pub node_id: String,
    /// The nodes the operation targeted directly.
    pub sources: Vec<String>,
    pub origin: ChangeOrigin,
    pub version: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeEvent {
    Changed(NodeChangeEvent),
    ModelChanged(ModelChangedEvent),
    Detached { node_id: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ModelEvent {
    VersionChanged { version: u64 },
    StateChanged { from: ModelState, to: ModelState },
    /// `committed` is true once every local operation has been acknowledged.
    CommitStateChanged { committed: bool },
    Error { error: ModelError },
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidationReason {
    NodeDetached,
    ValueReplaced,
    KeyRemoved,
    ModelClosed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReferenceEvent {
    Set { key: ReferenceKey, node_id: String, value: ReferenceValue },
    Shifted { key: ReferenceKey, value: ReferenceValue },
    Cleared { key: ReferenceKey },
    Invalidated { key: ReferenceKey, reason: InvalidationReason },
}
