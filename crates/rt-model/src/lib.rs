//! Realtime model client.
//!
//! - [`tree`]: the local document mirror, addressed by value id, with
//!   validate-then-apply semantics and node detachment.
//! - [`reference`]: cursor, selection and property markers that follow
//!   edits.
//! - [`concurrency`]: the pending queue of unacknowledged local edits.
//! - [`model`]: [`RealtimeModel`], the per-document synchronization state
//!   machine tying the above to a [`Transport`] and an optional
//!   [`ModelStore`].
//!
//! The transform engine itself lives in `rt-ot`.

pub mod concurrency;
pub mod error;
pub mod events;
pub mod model;
pub mod options;
pub mod protocol;
pub mod reference;
pub mod store;
pub mod transport;
pub mod tree;

pub use concurrency::{PendingOperation, PendingQueue};
pub use error::{ModelError, ProtocolError, ValidationError};
pub use events::{
    ChangeOrigin, InvalidationReason, ModelChangedEvent, ModelEvent, NodeChangeEvent, NodeEvent, ReferenceEvent,
};
pub use model::{ModelState, NodeHandle, RealtimeModel};
pub use options::{ModelOptions, ReconnectMode};
pub use protocol::{InboundMessage, ModelSnapshot, OutboundMessage, RemoteOperation};
pub use reference::{ModelReference, ReferenceKey, ReferenceStore, ReferenceValue};
pub use store::{MemoryModelStore, ModelStore, StoreError, StoredModel};
pub use transport::{NullTransport, Transport, TransportError};
pub use tree::{ModelTree, PathStep};

use rand::Rng;

/// Generates a random session id. Values created by the session are named
/// `"{session_id}:{n}"`.
pub fn generate_session_id() -> String {
    let mut rng = rand::thread_rng();
    format!("{:016x}", rng.gen::<u64>())
}
