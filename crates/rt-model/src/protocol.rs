//! Message envelopes exchanged with the server.

use chrono::{DateTime, Utc};
use rt_ot::{DataValue, Operation};
use serde::{Deserialize, Serialize};

/// A server operation as delivered to this replica.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteOperation {
    /// The document version this operation produces.
    pub version: u64,
    pub session_id: String,
    pub username: String,
    pub timestamp: DateTime<Utc>,
    pub operation: Operation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelSnapshot {
    pub model_id: String,
    pub version: u64,
    pub data: DataValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum InboundMessage {
    Snapshot(ModelSnapshot),
    RemoteOperation(RemoteOperation),
    Acknowledgement { seq: u64, version: u64 },
    Error { code: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum OutboundMessage {
    Open {
        model_id: String,
        session_id: String,
    },
    Operation {
        model_id: String,
        seq: u64,
        context_version: u64,
        operation: Operation,
    },
    Close {
        model_id: String,
    },
}
