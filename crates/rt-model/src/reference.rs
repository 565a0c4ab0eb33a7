//! Cursor, selection and property markers anchored to model nodes.
//!
//! Markers live beside the tree and are adjusted on every applied
//! operation, local or remote, with the same positional rules the data
//! transforms use. A marker whose anchor disappears is invalidated and
//! dropped.

use std::collections::BTreeMap;

use rt_ot::xform::reference::{transform_index, transform_range};
use rt_ot::{DiscreteOperation, ValueKind};
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ValidationError};
use crate::events::{InvalidationReason, ReferenceEvent};
use crate::tree::{ModelTree, NodeData};

/// Markers are owned per session; two sessions may use the same name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReferenceKey {
    pub session_id: String,
    pub key: String,
}

impl ReferenceKey {
    pub fn new(session_id: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            key: key.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReferenceValue {
    /// A cursor before the char or element at `index`.
    Index { index: usize },
    /// A selection over `[start, end)`.
    Range { start: usize, end: usize },
    /// An object key.
    Property { key: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelReference {
    pub key: ReferenceKey,
    pub node_id: String,
    pub value: ReferenceValue,
}

#[derive(Debug, Clone, Default)]
pub struct ReferenceStore {
    refs: BTreeMap<ReferenceKey, ModelReference>,
}

fn content_len(data: &NodeData) -> Option<usize> {
    match data {
        NodeData::String(text) => Some(text.chars().count()),
        NodeData::Array(children) => Some(children.len()),
        _ => None,
    }
}

impl ReferenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Anchor (or re-anchor) the marker `key`.
    pub fn set(
        &mut self,
        tree: &ModelTree,
        key: ReferenceKey,
        node_id: &str,
        value: ReferenceValue,
    ) -> Result<ReferenceEvent, ModelError> {
        let node = tree.live(node_id)?;
        let out_of_bounds = |index: usize, len: usize| -> ModelError {
            ValidationError::IndexOutOfBounds {
                id: node_id.to_string(),
                index,
                len,
            }
            .into()
        };
        match (&value, &node.data) {
            (ReferenceValue::Index { index }, data) => {
                let len = content_len(data).ok_or_else(|| wrong_kind(node_id, ValueKind::String, node.kind()))?;
                if *index > len {
                    return Err(out_of_bounds(*index, len));
                }
            }
            (ReferenceValue::Range { start, end }, data) => {
                let len = content_len(data).ok_or_else(|| wrong_kind(node_id, ValueKind::String, node.kind()))?;
                if start > end || *end > len {
                    return Err(out_of_bounds(*end, len));
                }
            }
            (ReferenceValue::Property { key }, NodeData::Object(children)) => {
                if !children.contains_key(key) {
                    return Err(ValidationError::UnknownKey {
                        id: node_id.to_string(),
                        key: key.clone(),
                    }
                    .into());
                }
            }
            (ReferenceValue::Property { .. }, _) => {
                return Err(wrong_kind(node_id, ValueKind::Object, node.kind()));
            }
        }
        self.refs.insert(
            key.clone(),
            ModelReference {
                key: key.clone(),
                node_id: node_id.to_string(),
                value: value.clone(),
            },
        );
        Ok(ReferenceEvent::Set {
            key,
            node_id: node_id.to_string(),
            value,
        })
    }

    pub fn get(&self, key: &ReferenceKey) -> Option<&ModelReference> {
        self.refs.get(key)
    }

    pub fn clear(&mut self, key: &ReferenceKey) -> Option<ReferenceEvent> {
        self.refs
            .remove(key)
            .map(|r| ReferenceEvent::Cleared { key: r.key })
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModelReference> {
        self.refs.values()
    }

    pub fn anchored_to<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a ModelReference> + 'a {
        self.refs.values().filter(move |r| r.node_id == node_id)
    }

    pub fn len(&self) -> usize {
        self.refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    /// Adjust markers anchored to the node `op` targets.
    pub fn transform(&mut self, op: &DiscreteOperation) -> Vec<ReferenceEvent> {
        let mut events = Vec::new();
        if op.is_no_op() {
            return events;
        }
        let mut dropped = Vec::new();
        for r in self.refs.values_mut().filter(|r| r.node_id == op.id()) {
            let next = match &r.value {
                ReferenceValue::Index { index } => transform_index(op, *index)
                    .map(|index| ReferenceValue::Index { index })
                    .ok_or(InvalidationReason::ValueReplaced),
                ReferenceValue::Range { start, end } => transform_range(op, *start, *end)
                    .map(|(start, end)| ReferenceValue::Range { start, end })
                    .ok_or(InvalidationReason::ValueReplaced),
                ReferenceValue::Property { key } => match op {
                    DiscreteOperation::ObjectRemove { key: removed, .. } if removed == key => {
                        Err(InvalidationReason::KeyRemoved)
                    }
                    DiscreteOperation::ObjectSetValue { value, .. } if !value.contains_key(key) => {
                        Err(InvalidationReason::KeyRemoved)
                    }
                    _ => Ok(r.value.clone()),
                },
            };
            match next {
                Ok(value) if value != r.value => {
                    r.value = value.clone();
                    events.push(ReferenceEvent::Shifted {
                        key: r.key.clone(),
                        value,
                    });
                }
                Ok(_) => {}
                Err(reason) => dropped.push((r.key.clone(), reason)),
            }
        }
        for (key, reason) in dropped {
            self.refs.remove(&key);
            events.push(ReferenceEvent::Invalidated { key, reason });
        }
        events
    }

    /// Invalidate markers anchored to any of `ids`.
    pub fn detach(&mut self, ids: &[String]) -> Vec<ReferenceEvent> {
        self.drop_where(|r| ids.contains(&r.node_id), InvalidationReason::NodeDetached)
    }

    pub fn invalidate_all(&mut self) -> Vec<ReferenceEvent> {
        self.drop_where(|_| true, InvalidationReason::ModelClosed)
    }

    fn drop_where(
        &mut self,
        pred: impl Fn(&ModelReference) -> bool,
        reason: InvalidationReason,
    ) -> Vec<ReferenceEvent> {
        let keys: Vec<ReferenceKey> = self
            .refs
            .values()
            .filter(|r| pred(r))
            .map(|r| r.key.clone())
            .collect();
        keys.into_iter()
            .filter_map(|key| self.refs.remove(&key))
            .map(|r| ReferenceEvent::Invalidated { key: r.key, reason })
            .collect()
    }
}

fn wrong_kind(id: &str, expected: ValueKind, actual: ValueKind) -> ModelError {
    ValidationError::WrongKind {
        id: id.to_string(),
        expected,
        actual,
    }
    .into()
}
