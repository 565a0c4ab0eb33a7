#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use chrono::Utc;
use rt_model::{
    InboundMessage, MemoryModelStore, ModelOptions, ModelSnapshot, ModelStore, OutboundMessage, PendingOperation,
    RealtimeModel, RemoteOperation, StoreError, StoredModel, Transport, TransportError,
};
use rt_ot::{IdGenerator, Operation};
use serde_json::Value;

pub const MODEL_ID: &str = "doc";
pub const SNAPSHOT_VERSION: u64 = 5;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Records outbound messages; can be switched into a failing state.
#[derive(Clone, Default)]
pub struct RecordingTransport {
    sent: Arc<Mutex<Vec<OutboundMessage>>>,
    down: Arc<Mutex<bool>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_down(&self, down: bool) {
        *self.down.lock().unwrap() = down;
    }

    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn take(&self) -> Vec<OutboundMessage> {
        std::mem::take(&mut *self.sent.lock().unwrap())
    }

    /// `(seq, context_version)` of every operation message sent so far.
    pub fn operations(&self) -> Vec<(u64, u64)> {
        self.sent()
            .into_iter()
            .filter_map(|m| match m {
                OutboundMessage::Operation {
                    seq, context_version, ..
                } => Some((seq, context_version)),
                _ => None,
            })
            .collect()
    }
}

impl Transport for RecordingTransport {
    fn send(&mut self, message: OutboundMessage) -> Result<(), TransportError> {
        if *self.down.lock().unwrap() {
            return Err(TransportError::Disconnected);
        }
        self.sent.lock().unwrap().push(message);
        Ok(())
    }
}

/// A store that several models can share.
#[derive(Clone, Default)]
pub struct SharedStore(pub Arc<Mutex<MemoryModelStore>>);

impl ModelStore for SharedStore {
    fn load(&self, model_id: &str) -> Result<Option<StoredModel>, StoreError> {
        self.0.lock().unwrap().load(model_id)
    }

    fn save(&mut self, model: &StoredModel) -> Result<(), StoreError> {
        self.0.lock().unwrap().save(model)
    }

    fn remove(&mut self, model_id: &str) -> Result<(), StoreError> {
        self.0.lock().unwrap().remove(model_id)
    }

    fn append_pending(&mut self, model_id: &str, entry: &PendingOperation) -> Result<(), StoreError> {
        self.0.lock().unwrap().append_pending(model_id, entry)
    }

    fn remove_pending(&mut self, model_id: &str, seq: u64, version: u64) -> Result<(), StoreError> {
        self.0.lock().unwrap().remove_pending(model_id, seq, version)
    }
}

impl SharedStore {
    pub fn save_count(&self) -> usize {
        self.0.lock().unwrap().save_count()
    }

    pub fn pending_count(&self) -> usize {
        self.0.lock().unwrap().pending_count(MODEL_ID)
    }
}

pub fn snapshot(data: &Value) -> InboundMessage {
    let mut ids = IdGenerator::new("srv");
    InboundMessage::Snapshot(ModelSnapshot {
        model_id: MODEL_ID.into(),
        version: SNAPSHOT_VERSION,
        data: ids.json(data),
    })
}

/// A model opened against `data` at [`SNAPSHOT_VERSION`].
pub fn open_model(data: &Value, transport: &RecordingTransport, options: ModelOptions) -> RealtimeModel {
    init_tracing();
    let mut model = RealtimeModel::new(MODEL_ID, "alice", Box::new(transport.clone()))
        .with_session_id("alice")
        .with_options(options);
    model.open().expect("open must succeed");
    model
        .handle_message(snapshot(data))
        .expect("snapshot must load");
    transport.take();
    model
}

pub fn remote_op(version: u64, op: impl Into<Operation>) -> RemoteOperation {
    RemoteOperation {
        version,
        session_id: "bob".into(),
        username: "bob".into(),
        timestamp: Utc::now(),
        operation: op.into(),
    }
}

pub fn remote(version: u64, op: impl Into<Operation>) -> InboundMessage {
    InboundMessage::RemoteOperation(remote_op(version, op))
}

/// A shared sink and a listener that pushes into it.
pub fn capture<E: Send + 'static>() -> (Arc<Mutex<Vec<E>>>, impl FnMut(E) + Send + Sync + 'static) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    (events, move |e| sink.lock().unwrap().push(e))
}
