use rt_ot::{TransformError, ValueKind};
use thiserror::Error;

use crate::model::ModelState;

/// Local misuse. Returned synchronously; the tree is left untouched.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("unknown node {0}")]
    UnknownNode(String),
    #[error("node {id} is {actual}, expected {expected}")]
    WrongKind {
        id: String,
        expected: ValueKind,
        actual: ValueKind,
    },
    #[error("index {index} out of bounds for length {len} on node {id}")]
    IndexOutOfBounds { id: String, index: usize, len: usize },
    #[error("NaN is not a valid number (node {id})")]
    NaN { id: String },
    #[error("key {key:?} not found on node {id}")]
    UnknownKey { id: String, key: String },
    #[error("empty edit on node {id}")]
    EmptyEdit { id: String },
    #[error("value id {0} is already in use")]
    DuplicateId(String),
    #[error("text at {index} on node {id} is {actual:?}, not {expected:?}")]
    RemovedTextMismatch {
        id: String,
        index: usize,
        expected: String,
        actual: String,
    },
    #[error("no node at path")]
    PathNotFound,
    #[error("invalid path: {0}")]
    InvalidPath(String),
}

/// The server and this replica disagree. Fatal: the document is closed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProtocolError {
    #[error("expected version {expected}, got {actual}")]
    VersionGap { expected: u64, actual: u64 },
    #[error("acknowledgement for seq {actual}, but the next pending operation is {expected:?}")]
    OutOfOrderAck { expected: Option<u64>, actual: u64 },
    #[error("operation addressed to detached node {0}")]
    DetachedNode(String),
    #[error("operation addressed to unknown node {0}")]
    UnknownNode(String),
    #[error("remote operation does not apply: {0}")]
    InvalidRemote(ValidationError),
    #[error("unexpected {message} while {state}")]
    UnexpectedMessage {
        message: &'static str,
        state: ModelState,
    },
    #[error("server error {code}: {message}")]
    Server { code: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Transform(#[from] TransformError),
    #[error("model is closed")]
    Closed,
    #[error("model has no backing store")]
    NoStore,
    #[error("model not found in store: {0}")]
    NotStored(String),
    #[error("not allowed while {0}")]
    InvalidState(ModelState),
}

impl ModelError {
    /// Protocol and transform failures close the document.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ModelError::Protocol(_) | ModelError::Transform(_))
    }
}
