//! The per-document synchronization state machine.
//!
//! [`RealtimeModel`] owns one document: its version, the tree mirror, the
//! pending queue of unacknowledged local edits and the reference markers.
//! Local edits apply optimistically and go out through the [`Transport`];
//! server operations are transformed through the pending queue before they
//! touch the tree. Every call runs to completion before the next one, and
//! listeners are invoked synchronously from inside the call that caused the
//! event.
//!
//! Protocol and transform failures are fatal: the model emits
//! [`ModelEvent::Error`], closes itself, and returns the same error from
//! every later call.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use rt_ot::{CompoundOperation, DataValue, DiscreteOperation, IdGenerator, Operation, Transformer, ValueKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::concurrency::{PendingOperation, PendingQueue};
use crate::error::{ModelError, ProtocolError, ValidationError};
use crate::events::{ChangeOrigin, ModelChangedEvent, ModelEvent, NodeChangeEvent, NodeEvent, ReferenceEvent};
use crate::options::{ModelOptions, ReconnectMode};
use crate::protocol::{InboundMessage, ModelSnapshot, OutboundMessage, RemoteOperation};
use crate::reference::{ModelReference, ReferenceKey, ReferenceStore, ReferenceValue};
use crate::store::{ModelStore, StoredModel};
use crate::transport::Transport;
use crate::tree::{parse_pointer, AppliedChange, ModelNode, ModelTree, NodeData, PathStep};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelState {
    Detached,
    Opening,
    Synchronized,
    OfflineEditing,
    Closed,
}

impl fmt::Display for ModelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ModelState::Detached => "detached",
            ModelState::Opening => "opening",
            ModelState::Synchronized => "synchronized",
            ModelState::OfflineEditing => "offline editing",
            ModelState::Closed => "closed",
        })
    }
}

type Listener<E> = Box<dyn FnMut(E) + Send + Sync>;

/// Read-only view of one live node.
#[derive(Debug, Clone, Copy)]
pub struct NodeHandle<'a> {
    tree: &'a ModelTree,
    node: &'a ModelNode,
}

impl<'a> NodeHandle<'a> {
    pub fn id(&self) -> &'a str {
        &self.node.id
    }

    pub fn kind(&self) -> ValueKind {
        self.node.kind()
    }

    pub fn data(&self) -> &'a NodeData {
        &self.node.data
    }

    pub fn parent(&self) -> Option<NodeHandle<'a>> {
        let parent = self.tree.node(self.node.parent.as_deref()?)?;
        Some(NodeHandle {
            tree: self.tree,
            node: parent,
        })
    }

    pub fn path(&self) -> Vec<PathStep> {
        self.tree.path_of(&self.node.id).unwrap_or_default()
    }

    pub fn value(&self) -> Option<DataValue> {
        self.tree.value(&self.node.id)
    }

    pub fn json(&self) -> Value {
        self.tree.json(&self.node.id).unwrap_or(Value::Null)
    }
}

pub struct RealtimeModel {
    model_id: String,
    session_id: String,
    username: String,
    options: ModelOptions,
    state: ModelState,
    version: u64,
    tree: Option<ModelTree>,
    pending: PendingQueue,
    next_seq: u64,
    /// Highest sequence number the stored tree already includes.
    persisted_through: u64,
    references: ReferenceStore,
    transformer: Transformer,
    ids: IdGenerator,
    transport: Box<dyn Transport>,
    store: Option<Box<dyn ModelStore>>,
    fatal: Option<ModelError>,
    next_listener_id: u64,
    model_listeners: BTreeMap<u64, Listener<ModelEvent>>,
    node_listeners: BTreeMap<u64, (String, Listener<NodeEvent>)>,
    reference_listeners: BTreeMap<u64, Listener<ReferenceEvent>>,
}

impl fmt::Debug for RealtimeModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RealtimeModel")
            .field("model_id", &self.model_id)
            .field("session_id", &self.session_id)
            .field("state", &self.state)
            .field("version", &self.version)
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl RealtimeModel {
    pub fn new(model_id: impl Into<String>, username: impl Into<String>, transport: Box<dyn Transport>) -> Self {
        let session_id = crate::generate_session_id();
        Self {
            model_id: model_id.into(),
            ids: IdGenerator::new(session_id.clone()),
            session_id,
            username: username.into(),
            options: ModelOptions::default(),
            state: ModelState::Detached,
            version: 0,
            tree: None,
            pending: PendingQueue::new(),
            next_seq: 1,
            persisted_through: 0,
            references: ReferenceStore::new(),
            transformer: Transformer::default(),
            transport,
            store: None,
            fatal: None,
            next_listener_id: 1,
            model_listeners: BTreeMap::new(),
            node_listeners: BTreeMap::new(),
            reference_listeners: BTreeMap::new(),
        }
    }

    pub fn with_options(mut self, options: ModelOptions) -> Self {
        self.options = options;
        self
    }

    /// Use a fixed session id instead of a random one. Locally created
    /// values are named after it.
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self.ids = IdGenerator::new(self.session_id.clone());
        self
    }

    pub fn with_store(mut self, store: Box<dyn ModelStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_transformer(mut self, transformer: Transformer) -> Self {
        self.transformer = transformer;
        self
    }

    // ── Accessors ─────────────────────────────────────────────────────────

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn options(&self) -> &ModelOptions {
        &self.options
    }

    pub fn state(&self) -> ModelState {
        self.state
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn pending(&self) -> &PendingQueue {
        &self.pending
    }

    /// True when the server has acknowledged every local edit.
    pub fn is_committed(&self) -> bool {
        self.pending.is_empty()
    }

    /// The error that closed the model, if any.
    pub fn error(&self) -> Option<&ModelError> {
        self.fatal.as_ref()
    }

    pub fn tree(&self) -> Option<&ModelTree> {
        self.tree.as_ref()
    }

    pub fn to_json(&self) -> Value {
        self.tree.as_ref().map_or(Value::Null, ModelTree::to_json)
    }

    pub fn root_id(&self) -> Option<&str> {
        self.tree.as_ref().map(ModelTree::root_id)
    }

    pub fn node(&self, path: &[PathStep]) -> Option<NodeHandle<'_>> {
        let tree = self.tree.as_ref()?;
        let node = tree.node(tree.resolve(path)?)?;
        Some(NodeHandle { tree, node })
    }

    pub fn node_by_id(&self, id: &str) -> Option<NodeHandle<'_>> {
        let tree = self.tree.as_ref()?;
        let node = tree.node(id)?;
        Some(NodeHandle { tree, node })
    }

    /// Id of the node at a JSON Pointer such as `/items/0/title`.
    pub fn node_id_at(&self, pointer: &str) -> Result<String, ModelError> {
        let path = parse_pointer(pointer)?;
        self.node(&path)
            .map(|n| n.id().to_string())
            .ok_or_else(|| ValidationError::PathNotFound.into())
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────

    /// Ask the server for the document. The model is usable once the
    /// snapshot arrives through [`RealtimeModel::handle_message`].
    pub fn open(&mut self) -> Result<(), ModelError> {
        self.check_alive()?;
        if self.state != ModelState::Detached {
            return Err(ModelError::InvalidState(self.state));
        }
        self.set_state(ModelState::Opening);
        let message = OutboundMessage::Open {
            model_id: self.model_id.clone(),
            session_id: self.session_id.clone(),
        };
        if let Err(e) = self.transport.send(message) {
            warn!(model_id = %self.model_id, error = %e, "open request not sent");
        }
        Ok(())
    }

    /// Restore the document from the offline store and start editing
    /// without a connection.
    pub fn open_offline(&mut self) -> Result<(), ModelError> {
        self.check_alive()?;
        if self.state != ModelState::Detached {
            return Err(ModelError::InvalidState(self.state));
        }
        let store = self.store.as_ref().ok_or(ModelError::NoStore)?;
        let stored = match store.load(&self.model_id) {
            Ok(Some(stored)) => stored,
            Ok(None) => return Err(ModelError::NotStored(self.model_id.clone())),
            Err(e) => {
                warn!(model_id = %self.model_id, error = %e, "offline load failed");
                return Err(ModelError::NotStored(self.model_id.clone()));
            }
        };
        let mut tree = ModelTree::new(stored.data)?.with_tombstone_limit(self.options.tombstone_limit);
        for entry in stored
            .pending
            .iter()
            .filter(|entry| entry.sequence_number() > stored.applied_through)
        {
            if let Err(e) = tree.apply_all(entry.operation().members()) {
                warn!(model_id = %self.model_id, seq = entry.sequence_number(), error = %e, "stored edit does not replay");
                return Err(ModelError::NotStored(self.model_id.clone()));
            }
        }
        self.tree = Some(tree);
        self.version = stored.version;
        self.pending = PendingQueue::from_entries(stored.pending);
        self.persisted_through = stored.applied_through;
        self.next_seq = self.pending.next_sequence_number();
        info!(model_id = %self.model_id, version = self.version, pending = self.pending.len(), "opened offline");
        self.set_state(ModelState::OfflineEditing);
        self.emit_model(ModelEvent::VersionChanged { version: self.version });
        if !self.pending.is_empty() {
            self.emit_model(ModelEvent::CommitStateChanged { committed: false });
        }
        Ok(())
    }

    /// Detach every node, invalidate every marker and tell the server we are
    /// done. Calling it again is a no-op.
    pub fn close(&mut self) -> Result<(), ModelError> {
        if self.state == ModelState::Closed {
            return Ok(());
        }
        if matches!(self.state, ModelState::Opening | ModelState::Synchronized) {
            let message = OutboundMessage::Close {
                model_id: self.model_id.clone(),
            };
            if let Err(e) = self.transport.send(message) {
                debug!(model_id = %self.model_id, error = %e, "close request not sent");
            }
        }
        self.shut_down();
        info!(model_id = %self.model_id, version = self.version, "closed");
        Ok(())
    }

    pub fn go_offline(&mut self) -> Result<(), ModelError> {
        self.check_alive()?;
        match self.state {
            ModelState::OfflineEditing => Ok(()),
            ModelState::Synchronized => {
                info!(model_id = %self.model_id, version = self.version, "offline");
                self.set_state(ModelState::OfflineEditing);
                Ok(())
            }
            state => Err(ModelError::InvalidState(state)),
        }
    }

    /// Reconnect. `missed` holds the server operations produced while we
    /// were away, in version order; they are applied first, then the
    /// pending queue goes out per [`ReconnectMode`].
    pub fn go_online(&mut self, missed: Vec<RemoteOperation>) -> Result<(), ModelError> {
        self.check_alive()?;
        if self.state != ModelState::OfflineEditing {
            return Err(ModelError::InvalidState(self.state));
        }
        for op in missed {
            self.remote(op)?;
        }
        if self.options.reconnect == ReconnectMode::Resynchronize {
            self.pending.rebase(self.version);
            self.next_seq = self.pending.next_sequence_number();
        }
        info!(model_id = %self.model_id, version = self.version, pending = self.pending.len(), "online");
        self.set_state(ModelState::Synchronized);
        self.transmit();
        self.persist();
        Ok(())
    }

    // ── Inbound ───────────────────────────────────────────────────────────

    /// Feed one message from the server.
    ///
    /// Messages arriving after a regular [`close`](RealtimeModel::close)
    /// are dropped.
    pub fn handle_message(&mut self, message: InboundMessage) -> Result<(), ModelError> {
        self.check_alive()?;
        match (self.state, message) {
            (ModelState::Closed, message) => {
                debug!(model_id = %self.model_id, ?message, "dropped message for closed model");
                Ok(())
            }
            (ModelState::Opening, InboundMessage::Snapshot(snapshot)) => self.load_snapshot(snapshot),
            (ModelState::Synchronized, InboundMessage::RemoteOperation(op)) => self.remote(op),
            (ModelState::Synchronized, InboundMessage::Acknowledgement { seq, version }) => {
                self.acknowledge(seq, version)
            }
            (_, InboundMessage::Error { code, message }) => Err(self.fail(ProtocolError::Server { code, message }.into())),
            (state, message) => {
                let message = match message {
                    InboundMessage::Snapshot(_) => "snapshot",
                    InboundMessage::RemoteOperation(_) => "remote operation",
                    InboundMessage::Acknowledgement { .. } => "acknowledgement",
                    InboundMessage::Error { .. } => "error",
                };
                Err(self.fail(ProtocolError::UnexpectedMessage { message, state }.into()))
            }
        }
    }

    /// Apply a server operation. Its version must directly follow ours.
    pub fn apply_remote(&mut self, op: RemoteOperation) -> Result<(), ModelError> {
        self.check_open()?;
        if self.state != ModelState::Synchronized {
            return Err(ModelError::InvalidState(self.state));
        }
        self.remote(op)
    }

    /// Acknowledge the oldest pending edit. `version` is the version the
    /// server assigned to it and must directly follow ours.
    pub fn acknowledge(&mut self, seq: u64, version: u64) -> Result<(), ModelError> {
        self.check_open()?;
        if self.state != ModelState::Synchronized {
            return Err(ModelError::InvalidState(self.state));
        }
        if version != self.version + 1 {
            let err = ProtocolError::VersionGap {
                expected: self.version + 1,
                actual: version,
            };
            return Err(self.fail(err.into()));
        }
        let acked = match self.pending.acknowledge(seq) {
            Ok(acked) => acked,
            Err(e) => return Err(self.fail(e.into())),
        };
        debug!(model_id = %self.model_id, version, seq = acked.sequence_number(), "acknowledged");
        self.version = version;
        self.emit_model(ModelEvent::VersionChanged { version });
        if self.pending.is_empty() {
            self.emit_model(ModelEvent::CommitStateChanged { committed: true });
        }
        if seq <= self.persisted_through {
            if let Some(store) = self.store.as_mut() {
                if let Err(e) = store.remove_pending(&self.model_id, seq, version) {
                    warn!(model_id = %self.model_id, seq, error = %e, "removing acknowledged entry failed");
                }
            }
        } else {
            // The stored tree does not hold this edit yet.
            self.persist();
        }
        Ok(())
    }

    fn load_snapshot(&mut self, snapshot: ModelSnapshot) -> Result<(), ModelError> {
        if snapshot.model_id != self.model_id {
            let err = ProtocolError::UnexpectedMessage {
                message: "snapshot for another model",
                state: self.state,
            };
            return Err(self.fail(err.into()));
        }
        let tree = match ModelTree::new(snapshot.data) {
            Ok(tree) => tree.with_tombstone_limit(self.options.tombstone_limit),
            Err(e) => return Err(self.fail(ProtocolError::InvalidRemote(e).into())),
        };
        self.tree = Some(tree);
        self.version = snapshot.version;
        self.next_seq = 1;
        self.persisted_through = 0;
        info!(model_id = %self.model_id, version = self.version, "opened");
        self.set_state(ModelState::Synchronized);
        self.emit_model(ModelEvent::VersionChanged { version: self.version });
        self.persist();
        Ok(())
    }

    fn remote(&mut self, remote: RemoteOperation) -> Result<(), ModelError> {
        let expected = self.version + 1;
        if remote.version != expected {
            let err = ProtocolError::VersionGap {
                expected,
                actual: remote.version,
            };
            return Err(self.fail(err.into()));
        }
        let incoming = self.skip_detached(remote.operation);
        let transformed = match self
            .pending
            .transform_incoming(&self.transformer, incoming, remote.version)
        {
            Ok(op) => op,
            Err(e) => return Err(self.fail(e.into())),
        };
        let applied = match self.tree.as_mut() {
            Some(tree) => tree.apply_all(transformed.members()),
            None => return Err(ModelError::InvalidState(self.state)),
        };
        let changes = match applied {
            Ok(changes) => changes,
            Err(e) => return Err(self.fail(remote_error(e))),
        };
        debug!(
            model_id = %self.model_id,
            version = remote.version,
            session_id = %remote.session_id,
            changes = changes.len(),
            "applied remote operation"
        );
        self.version = remote.version;
        self.publish(
            &changes,
            ChangeOrigin::Remote,
            &remote.session_id,
            &remote.username,
            remote.timestamp,
        );
        self.emit_model(ModelEvent::VersionChanged { version: self.version });
        self.persist();
        Ok(())
    }

    /// Server members aimed at nodes a pending local edit already removed
    /// cannot apply here; the local edit wins and they become no-ops.
    fn skip_detached(&self, op: Operation) -> Operation {
        if self.pending.is_empty() {
            return op;
        }
        let skip = |member: DiscreteOperation| {
            if !member.is_no_op() && self.pending.detached(member.id()) {
                debug!(model_id = %self.model_id, id = member.id(), "skipping operation on locally removed node");
                member.as_no_op()
            } else {
                member
            }
        };
        match op {
            Operation::Discrete(member) => Operation::Discrete(skip(member)),
            Operation::Compound(batch) => {
                Operation::Compound(CompoundOperation::new(batch.ops.into_iter().map(skip).collect()))
            }
        }
    }

    // ── Local edits ───────────────────────────────────────────────────────

    /// Apply a local edit and queue it for the server. Returns its sequence
    /// number.
    ///
    /// Invalid edits are rejected before anything changes. Edits aimed at a
    /// detached node are a protocol error and close the model.
    pub fn apply_local(&mut self, op: impl Into<Operation>) -> Result<u64, ModelError> {
        self.check_open()?;
        let op = op.into();
        let tree = self.editable_tree_mut()?;
        if op.members().is_empty() {
            return Err(ValidationError::EmptyEdit {
                id: tree.root_id().to_string(),
            }
            .into());
        }
        let applied = tree.apply_all(op.members());
        let changes = self.checked(applied)?;
        let detached: Vec<String> = changes.iter().flat_map(|c| c.detached.iter().cloned()).collect();
        let seq = self.next_seq;
        self.next_seq += 1;
        let was_committed = self.pending.is_empty();
        self.pending
            .push(PendingOperation::new(seq, self.version, op, detached));
        debug!(model_id = %self.model_id, version = self.version, seq, "queued local operation");
        if self.pending.len() > self.options.pending_warn_threshold {
            warn!(model_id = %self.model_id, pending = self.pending.len(), "pending queue is growing");
        }

        let session_id = self.session_id.clone();
        let username = self.username.clone();
        self.publish(&changes, ChangeOrigin::Local, &session_id, &username, Utc::now());
        if was_committed {
            self.emit_model(ModelEvent::CommitStateChanged { committed: false });
        }
        if self.state == ModelState::Synchronized {
            self.transmit();
        }
        self.persist_appended(seq);
        Ok(seq)
    }

    /// Build a value from JSON with ids owned by this session.
    pub fn create_value(&mut self, json: &Value) -> DataValue {
        self.ids.json(json)
    }

    pub fn insert_text(&mut self, id: &str, index: usize, text: &str) -> Result<u64, ModelError> {
        self.apply_local(DiscreteOperation::string_insert(id, index, text))
    }

    /// Remove `len` chars at `index`; the removed text is read from the tree.
    pub fn remove_text(&mut self, id: &str, index: usize, len: usize) -> Result<u64, ModelError> {
        let looked_up = self.text_of(id);
        let text = self.checked(looked_up)?;
        let total = text.chars().count();
        if index + len > total {
            return Err(ValidationError::IndexOutOfBounds {
                id: id.to_string(),
                index: index + len,
                len: total,
            }
            .into());
        }
        let removed: String = text.chars().skip(index).take(len).collect();
        self.apply_local(DiscreteOperation::string_remove(id, index, removed))
    }

    pub fn set_string(&mut self, id: &str, value: &str) -> Result<u64, ModelError> {
        self.apply_local(DiscreteOperation::string_set(id, value))
    }

    pub fn array_insert(&mut self, id: &str, index: usize, value: &Value) -> Result<u64, ModelError> {
        let value = self.create_value(value);
        self.apply_local(DiscreteOperation::array_insert(id, index, value))
    }

    pub fn array_push(&mut self, id: &str, value: &Value) -> Result<u64, ModelError> {
        let looked_up = self.array_len(id);
        let len = self.checked(looked_up)?;
        self.array_insert(id, len, value)
    }

    pub fn array_remove(&mut self, id: &str, index: usize) -> Result<u64, ModelError> {
        self.apply_local(DiscreteOperation::array_remove(id, index))
    }

    pub fn array_replace(&mut self, id: &str, index: usize, value: &Value) -> Result<u64, ModelError> {
        let value = self.create_value(value);
        self.apply_local(DiscreteOperation::array_replace(id, index, value))
    }

    pub fn array_move(&mut self, id: &str, from_index: usize, to_index: usize) -> Result<u64, ModelError> {
        self.apply_local(DiscreteOperation::array_move(id, from_index, to_index))
    }

    pub fn array_set(&mut self, id: &str, values: &[Value]) -> Result<u64, ModelError> {
        let values = values.iter().map(|v| self.create_value(v)).collect();
        self.apply_local(DiscreteOperation::array_set(id, values))
    }

    pub fn object_set(&mut self, id: &str, key: &str, value: &Value) -> Result<u64, ModelError> {
        let value = self.create_value(value);
        self.apply_local(DiscreteOperation::object_set(id, key, value))
    }

    pub fn object_remove(&mut self, id: &str, key: &str) -> Result<u64, ModelError> {
        self.apply_local(DiscreteOperation::object_remove(id, key))
    }

    pub fn object_set_value(&mut self, id: &str, value: &serde_json::Map<String, Value>) -> Result<u64, ModelError> {
        let children: IndexMap<String, DataValue> = value
            .iter()
            .map(|(k, v)| (k.clone(), self.create_value(v)))
            .collect();
        self.apply_local(DiscreteOperation::object_set_value(id, children))
    }

    pub fn number_add(&mut self, id: &str, delta: f64) -> Result<u64, ModelError> {
        self.apply_local(DiscreteOperation::number_add(id, delta))
    }

    pub fn number_subtract(&mut self, id: &str, delta: f64) -> Result<u64, ModelError> {
        self.number_add(id, -delta)
    }

    pub fn number_increment(&mut self, id: &str) -> Result<u64, ModelError> {
        self.number_add(id, 1.0)
    }

    pub fn number_decrement(&mut self, id: &str) -> Result<u64, ModelError> {
        self.number_add(id, -1.0)
    }

    pub fn number_set(&mut self, id: &str, value: f64) -> Result<u64, ModelError> {
        self.apply_local(DiscreteOperation::number_set(id, value))
    }

    pub fn boolean_set(&mut self, id: &str, value: bool) -> Result<u64, ModelError> {
        self.apply_local(DiscreteOperation::boolean_set(id, value))
    }

    // ── References ────────────────────────────────────────────────────────

    /// Anchor this session's marker `key` to `node_id`.
    pub fn set_reference(&mut self, key: &str, node_id: &str, value: ReferenceValue) -> Result<(), ModelError> {
        self.check_open()?;
        let key = ReferenceKey::new(self.session_id.clone(), key);
        let Some(tree) = self.tree.as_ref() else {
            return Err(ModelError::InvalidState(self.state));
        };
        let result = self.references.set(tree, key, node_id, value);
        let event = self.checked(result)?;
        self.emit_reference(event);
        Ok(())
    }

    pub fn reference(&self, key: &str) -> Option<&ModelReference> {
        self.references
            .get(&ReferenceKey::new(self.session_id.clone(), key))
    }

    pub fn clear_reference(&mut self, key: &str) -> bool {
        let key = ReferenceKey::new(self.session_id.clone(), key);
        match self.references.clear(&key) {
            Some(event) => {
                self.emit_reference(event);
                true
            }
            None => false,
        }
    }

    pub fn references(&self) -> impl Iterator<Item = &ModelReference> {
        self.references.iter()
    }

    // ── Listeners ─────────────────────────────────────────────────────────

    pub fn on_model_event<F>(&mut self, listener: F) -> u64
    where
        F: FnMut(ModelEvent) + Send + Sync + 'static,
    {
        let id = self.take_listener_id();
        self.model_listeners.insert(id, Box::new(listener));
        id
    }

    pub fn off_model_event(&mut self, listener_id: u64) -> bool {
        self.model_listeners.remove(&listener_id).is_some()
    }

    /// Subscribe to changes of one node. The listener is dropped after the
    /// node's [`NodeEvent::Detached`].
    pub fn on_node<F>(&mut self, node_id: &str, listener: F) -> Result<u64, ModelError>
    where
        F: FnMut(NodeEvent) + Send + Sync + 'static,
    {
        self.check_open()?;
        let found = self.tree_ref().and_then(|tree| tree.live(node_id).map(|_| ()));
        self.checked(found)?;
        let id = self.take_listener_id();
        self.node_listeners
            .insert(id, (node_id.to_string(), Box::new(listener)));
        Ok(id)
    }

    pub fn off_node(&mut self, listener_id: u64) -> bool {
        self.node_listeners.remove(&listener_id).is_some()
    }

    pub fn on_reference<F>(&mut self, listener: F) -> u64
    where
        F: FnMut(ReferenceEvent) + Send + Sync + 'static,
    {
        let id = self.take_listener_id();
        self.reference_listeners.insert(id, Box::new(listener));
        id
    }

    pub fn off_reference(&mut self, listener_id: u64) -> bool {
        self.reference_listeners.remove(&listener_id).is_some()
    }

    fn take_listener_id(&mut self) -> u64 {
        let id = self.next_listener_id;
        self.next_listener_id = self.next_listener_id.saturating_add(1);
        id
    }

    // ── Internals ─────────────────────────────────────────────────────────

    fn check_alive(&self) -> Result<(), ModelError> {
        match &self.fatal {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    fn check_open(&self) -> Result<(), ModelError> {
        self.check_alive()?;
        if self.state == ModelState::Closed {
            return Err(ModelError::Closed);
        }
        Ok(())
    }

    /// Close the model if `result` carries a fatal error.
    fn checked<T>(&mut self, result: Result<T, ModelError>) -> Result<T, ModelError> {
        match result {
            Err(e) if e.is_fatal() => Err(self.fail(e)),
            other => other,
        }
    }

    fn text_of(&self, id: &str) -> Result<String, ModelError> {
        self.check_open()?;
        match &self.tree_ref()?.expect_kind(id, ValueKind::String)?.data {
            NodeData::String(text) => Ok(text.clone()),
            _ => Err(ValidationError::UnknownNode(id.to_string()).into()),
        }
    }

    fn array_len(&self, id: &str) -> Result<usize, ModelError> {
        self.check_open()?;
        match &self.tree_ref()?.expect_kind(id, ValueKind::Array)?.data {
            NodeData::Array(children) => Ok(children.len()),
            _ => Err(ValidationError::UnknownNode(id.to_string()).into()),
        }
    }

    fn tree_ref(&self) -> Result<&ModelTree, ModelError> {
        self.tree.as_ref().ok_or(ModelError::InvalidState(self.state))
    }

    fn editable_tree_mut(&mut self) -> Result<&mut ModelTree, ModelError> {
        match self.state {
            ModelState::Synchronized | ModelState::OfflineEditing => {}
            state => return Err(ModelError::InvalidState(state)),
        }
        let state = self.state;
        self.tree.as_mut().ok_or(ModelError::InvalidState(state))
    }

    fn set_state(&mut self, to: ModelState) {
        let from = self.state;
        if from == to {
            return;
        }
        self.state = to;
        self.emit_model(ModelEvent::StateChanged { from, to });
    }

    /// Send every entry that has not gone out yet, in order. A failed send
    /// takes the model offline; the entry is resent on reconnect.
    fn transmit(&mut self) {
        let outgoing: Vec<OutboundMessage> = self
            .pending
            .untransmitted()
            .map(|entry| OutboundMessage::Operation {
                model_id: self.model_id.clone(),
                seq: entry.sequence_number(),
                context_version: entry.context_version(),
                operation: entry.operation().clone(),
            })
            .collect();
        for message in outgoing {
            let OutboundMessage::Operation { seq, .. } = &message else {
                continue;
            };
            let seq = *seq;
            match self.transport.send(message) {
                Ok(()) => self.pending.mark_transmitted(seq),
                Err(e) => {
                    warn!(model_id = %self.model_id, seq, error = %e, "send failed, going offline");
                    self.set_state(ModelState::OfflineEditing);
                    return;
                }
            }
        }
    }

    /// Write the current state through to the store. Failures are logged
    /// and otherwise ignored.
    fn persist(&mut self) {
        let Some(store) = self.store.as_mut() else {
            return;
        };
        let Some(data) = self.tree.as_ref().and_then(ModelTree::root_value) else {
            return;
        };
        let applied_through = self.pending.iter().last().map_or(0, PendingOperation::sequence_number);
        let stored = StoredModel {
            model_id: self.model_id.clone(),
            version: self.version,
            data,
            applied_through,
            pending: self.pending.to_vec(),
        };
        match store.save(&stored) {
            Ok(()) => self.persisted_through = applied_through,
            Err(e) => warn!(model_id = %self.model_id, version = self.version, error = %e, "persisting model failed"),
        }
    }

    /// Append the entry `seq` to the store. The saved tree does not include
    /// it; reopening replays it.
    fn persist_appended(&mut self, seq: u64) {
        let Some(store) = self.store.as_mut() else {
            return;
        };
        let Some(entry) = self.pending.iter().find(|entry| entry.sequence_number() == seq) else {
            return;
        };
        if let Err(e) = store.append_pending(&self.model_id, entry) {
            warn!(model_id = %self.model_id, seq, error = %e, "persisting local edit failed");
        }
    }

    /// Record a fatal error, close the model and hand the error back.
    fn fail(&mut self, err: ModelError) -> ModelError {
        error!(model_id = %self.model_id, version = self.version, error = %err, "closing model");
        self.fatal = Some(err.clone());
        self.emit_model(ModelEvent::Error { error: err.clone() });
        self.shut_down();
        err
    }

    fn shut_down(&mut self) {
        let detached = self.tree.as_mut().map(ModelTree::detach_all).unwrap_or_default();
        self.notify_detached(&detached);
        for event in self.references.invalidate_all() {
            self.emit_reference(event);
        }
        self.set_state(ModelState::Closed);
        self.emit_model(ModelEvent::Closed);
    }

    /// Fan out the events for a batch of applied changes: markers first,
    /// then per-node changes in member order, then one model-changed event
    /// per affected node up to the root, then detachments.
    fn publish(
        &mut self,
        changes: &[AppliedChange],
        origin: ChangeOrigin,
        session_id: &str,
        username: &str,
        timestamp: DateTime<Utc>,
    ) {
        for change in changes {
            for event in self.references.transform(&change.operation.to_operation()) {
                self.emit_reference(event);
            }
            for event in self.references.detach(&change.detached) {
                self.emit_reference(event);
            }
        }

        let Some(tree) = self.tree.as_ref() else {
            return;
        };
        let deliver = origin == ChangeOrigin::Remote || self.options.emit_local_events;
        let mut node_events = Vec::new();
        let mut sources: Vec<String> = Vec::new();
        for change in changes {
            let node_id = change.operation.id().to_string();
            if deliver {
                node_events.push((
                    node_id.clone(),
                    NodeEvent::Changed(NodeChangeEvent {
                        node_id: node_id.clone(),
                        path: tree.path_of(&node_id).unwrap_or_default(),
                        operation: change.operation.clone(),
                        origin,
                        session_id: session_id.to_string(),
                        username: username.to_string(),
                        version: self.version,
                        timestamp,
                    }),
                ));
            }
            if !sources.contains(&node_id) {
                sources.push(node_id);
            }
        }
        if deliver {
            let mut bubbled: Vec<String> = Vec::new();
            for source in &sources {
                for ancestor in tree.ancestors(source) {
                    if !bubbled.contains(&ancestor) {
                        bubbled.push(ancestor);
                    }
                }
            }
            for node_id in bubbled {
                node_events.push((
                    node_id.clone(),
                    NodeEvent::ModelChanged(ModelChangedEvent {
                        node_id,
                        sources: sources.clone(),
                        origin,
                        version: self.version,
                    }),
                ));
            }
        }
        for (node_id, event) in node_events {
            self.emit_node(&node_id, event);
        }

        let detached: Vec<String> = changes.iter().flat_map(|c| c.detached.iter().cloned()).collect();
        self.notify_detached(&detached);
    }

    fn notify_detached(&mut self, ids: &[String]) {
        if ids.is_empty() {
            return;
        }
        for id in ids {
            self.emit_node(id, NodeEvent::Detached { node_id: id.clone() });
        }
        self.node_listeners.retain(|_, (node_id, _)| !ids.contains(node_id));
    }

    fn emit_model(&mut self, event: ModelEvent) {
        for listener in self.model_listeners.values_mut() {
            listener(event.clone());
        }
    }

    fn emit_node(&mut self, node_id: &str, event: NodeEvent) {
        for (target, listener) in self.node_listeners.values_mut() {
            if target.as_str() == node_id {
                listener(event.clone());
            }
        }
    }

    fn emit_reference(&mut self, event: ReferenceEvent) {
        for listener in self.reference_listeners.values_mut() {
            listener(event.clone());
        }
    }
}

/// A server operation that does not fit the local tree means the replicas
/// have diverged.
fn remote_error(err: ModelError) -> ModelError {
    match err {
        ModelError::Validation(ValidationError::UnknownNode(id)) => ProtocolError::UnknownNode(id).into(),
        ModelError::Validation(e) => ProtocolError::InvalidRemote(e).into(),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::NullTransport;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    fn offline_model(data: Value) -> RealtimeModel {
        let mut store = crate::store::MemoryModelStore::new();
        let mut ids = IdGenerator::new("srv");
        store
            .save(&StoredModel {
                model_id: "doc".into(),
                version: 3,
                data: ids.json(&data),
                applied_through: 0,
                pending: Vec::new(),
            })
            .unwrap();
        let mut model = RealtimeModel::new("doc", "ann", Box::new(NullTransport))
            .with_session_id("me")
            .with_store(Box::new(store));
        model.open_offline().unwrap();
        model
    }

    #[test]
    fn offline_edits_queue_up() {
        let mut model = offline_model(json!({"title": "hello"}));
        assert_eq!(model.state(), ModelState::OfflineEditing);
        assert_eq!(model.version(), 3);
        let title = model.node_id_at("/title").unwrap();
        assert_eq!(model.insert_text(&title, 5, " world").unwrap(), 1);
        assert_eq!(model.remove_text(&title, 0, 1).unwrap(), 2);
        assert_eq!(model.to_json(), json!({"title": "ello world"}));
        assert_eq!(model.pending().len(), 2);
        assert!(model.pending().iter().all(|p| p.context_version() == 3));
        assert!(!model.is_committed());
    }

    #[test]
    fn validation_errors_leave_model_usable() {
        let mut model = offline_model(json!({"n": 1}));
        let n = model.node_id_at("/n").unwrap();
        assert!(matches!(
            model.number_set(&n, f64::NAN),
            Err(ModelError::Validation(ValidationError::NaN { .. }))
        ));
        assert!(matches!(
            model.insert_text(&n, 0, "x"),
            Err(ModelError::Validation(ValidationError::WrongKind { .. }))
        ));
        assert!(model.pending().is_empty());
        assert_eq!(model.state(), ModelState::OfflineEditing);
        model.number_increment(&n).unwrap();
        assert_eq!(model.to_json(), json!({"n": 2.0}));
    }

    #[test]
    fn close_detaches_and_rejects_edits() {
        let mut model = offline_model(json!({"n": 1}));
        let n = model.node_id_at("/n").unwrap();
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        model.on_node(&n, move |e| sink.lock().unwrap().push(e)).unwrap();
        model.close().unwrap();
        assert_eq!(model.state(), ModelState::Closed);
        assert_eq!(
            events.lock().unwrap().as_slice(),
            &[NodeEvent::Detached { node_id: n.clone() }]
        );
        assert_eq!(model.number_increment(&n), Err(ModelError::Closed));
        assert!(model.close().is_ok());
    }

    #[test]
    fn edits_need_an_open_document() {
        let mut model = RealtimeModel::new("doc", "ann", Box::new(NullTransport));
        assert_eq!(
            model.number_increment("x"),
            Err(ModelError::InvalidState(ModelState::Detached))
        );
        assert_eq!(model.open_offline(), Err(ModelError::NoStore));
    }
}
