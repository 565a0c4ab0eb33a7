use serde::{Deserialize, Serialize};

use crate::tree::DEFAULT_TOMBSTONE_LIMIT;

/// What happens to the pending queue when a model comes back online.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconnectMode {
    /// The server kept our session: send only what was never transmitted.
    Resume,
    /// The server dropped our unacknowledged operations: resend the whole
    /// queue, renumbered from 1, against the current version.
    Resynchronize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelOptions {
    pub reconnect: ReconnectMode,
    /// Deliver node events for this session's own edits.
    pub emit_local_events: bool,
    /// Log a warning on every local edit while the pending queue is longer
    /// than this.
    pub pending_warn_threshold: usize,
    /// How many detached ids the tree remembers. Edits addressed to an id
    /// forgotten past this limit report an unknown node instead of a
    /// detached one.
    pub tombstone_limit: usize,
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            reconnect: ReconnectMode::Resynchronize,
            emit_local_events: true,
            pending_warn_threshold: 256,
            tombstone_limit: DEFAULT_TOMBSTONE_LIMIT,
        }
    }
}

impl ModelOptions {
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}
