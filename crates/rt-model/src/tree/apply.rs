use rt_ot::{AppliedOperation, DataValue, DiscreteOperation, ValueKind};

use super::{ModelTree, NodeData};
use crate::error::{ModelError, ValidationError};

/// Result of applying one discrete operation to the tree.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedChange {
    pub operation: AppliedOperation,
    /// Ids detached by the change, parents before children.
    pub detached: Vec<String>,
}

fn out_of_bounds(id: &str, index: usize, len: usize) -> ModelError {
    ValidationError::IndexOutOfBounds {
        id: id.to_string(),
        index,
        len,
    }
    .into()
}

fn not_nan(id: &str, value: f64) -> Result<(), ModelError> {
    if value.is_nan() {
        return Err(ValidationError::NaN { id: id.to_string() }.into());
    }
    Ok(())
}

fn byte_offset(text: &str, chars: usize) -> usize {
    text.char_indices().nth(chars).map(|(i, _)| i).unwrap_or(text.len())
}

impl ModelTree {
    /// Validate `op` against the current tree and apply it.
    ///
    /// Nothing is mutated unless the whole operation is valid. No-ops are
    /// accepted and change nothing (`Ok(None)`).
    pub fn apply(&mut self, op: &DiscreteOperation) -> Result<Option<AppliedChange>, ModelError> {
        if op.is_no_op() {
            return Ok(None);
        }
        let mut detached = Vec::new();
        let operation = match op {
            DiscreteOperation::StringInsert { id, index, value, .. } => {
                if value.is_empty() {
                    return Err(ValidationError::EmptyEdit { id: id.clone() }.into());
                }
                let text = self.text_mut(id)?;
                let len = text.chars().count();
                if *index > len {
                    return Err(out_of_bounds(id, *index, len));
                }
                let at = byte_offset(text, *index);
                text.insert_str(at, value);
                AppliedOperation::StringInsert {
                    id: id.clone(),
                    no_op: false,
                    index: *index,
                    value: value.clone(),
                }
            }
            DiscreteOperation::StringRemove { id, index, value, .. } => {
                if value.is_empty() {
                    return Err(ValidationError::EmptyEdit { id: id.clone() }.into());
                }
                let text = self.text_mut(id)?;
                let len = text.chars().count();
                let end = index + value.chars().count();
                if end > len {
                    return Err(out_of_bounds(id, end, len));
                }
                let (start, stop) = (byte_offset(text, *index), byte_offset(text, end));
                if &text[start..stop] != value.as_str() {
                    return Err(ValidationError::RemovedTextMismatch {
                        id: id.clone(),
                        index: *index,
                        expected: value.clone(),
                        actual: text[start..stop].to_string(),
                    }
                    .into());
                }
                text.replace_range(start..stop, "");
                AppliedOperation::StringRemove {
                    id: id.clone(),
                    no_op: false,
                    index: *index,
                    value: value.clone(),
                }
            }
            DiscreteOperation::StringSet { id, value, .. } => {
                let text = self.text_mut(id)?;
                let old_value = std::mem::replace(text, value.clone());
                AppliedOperation::StringSet {
                    id: id.clone(),
                    no_op: false,
                    value: value.clone(),
                    old_value,
                }
            }
            DiscreteOperation::ArrayInsert { id, index, value, .. } => {
                let len = self.array(id)?.len();
                if *index > len {
                    return Err(out_of_bounds(id, *index, len));
                }
                self.check_fresh(std::iter::once(value))?;
                self.attach(value.clone(), Some(id.as_str()));
                self.array_mut(id)?.insert(*index, value.id.clone());
                AppliedOperation::ArrayInsert {
                    id: id.clone(),
                    no_op: false,
                    index: *index,
                    value: value.clone(),
                }
            }
            DiscreteOperation::ArrayRemove { id, index, .. } => {
                let child = self.array_child(id, *index)?;
                let old_value = self.snapshot(&child)?;
                self.array_mut(id)?.remove(*index);
                self.detach(&child, &mut detached);
                AppliedOperation::ArrayRemove {
                    id: id.clone(),
                    no_op: false,
                    index: *index,
                    old_value,
                }
            }
            DiscreteOperation::ArrayReplace { id, index, value, .. } => {
                let child = self.array_child(id, *index)?;
                self.check_fresh(std::iter::once(value))?;
                let old_value = self.snapshot(&child)?;
                self.attach(value.clone(), Some(id.as_str()));
                self.array_mut(id)?[*index] = value.id.clone();
                self.detach(&child, &mut detached);
                AppliedOperation::ArrayReplace {
                    id: id.clone(),
                    no_op: false,
                    index: *index,
                    value: value.clone(),
                    old_value,
                }
            }
            DiscreteOperation::ArrayMove { id, from_index, to_index, .. } => {
                let len = self.array(id)?.len();
                for index in [*from_index, *to_index] {
                    if index >= len {
                        return Err(out_of_bounds(id, index, len));
                    }
                }
                let children = self.array_mut(id)?;
                let child = children.remove(*from_index);
                children.insert(*to_index, child);
                AppliedOperation::ArrayMove {
                    id: id.clone(),
                    no_op: false,
                    from_index: *from_index,
                    to_index: *to_index,
                }
            }
            DiscreteOperation::ArraySet { id, value, .. } => {
                let old_children = self.array(id)?.clone();
                self.check_fresh(value.iter())?;
                let old_value = self.snapshot_all(&old_children)?;
                for child in value {
                    self.attach(child.clone(), Some(id.as_str()));
                }
                *self.array_mut(id)? = value.iter().map(|v| v.id.clone()).collect();
                for child in &old_children {
                    self.detach(child, &mut detached);
                }
                AppliedOperation::ArraySet {
                    id: id.clone(),
                    no_op: false,
                    value: value.clone(),
                    old_value,
                }
            }
            DiscreteOperation::ObjectSet { id, key, value, .. } => {
                let old_child = self.object(id)?.get(key).cloned();
                self.check_fresh(std::iter::once(value))?;
                let old_value = match &old_child {
                    Some(child) => Some(self.snapshot(child)?),
                    None => None,
                };
                self.attach(value.clone(), Some(id.as_str()));
                self.object_mut(id)?.insert(key.clone(), value.id.clone());
                if let Some(child) = &old_child {
                    self.detach(child, &mut detached);
                }
                AppliedOperation::ObjectSet {
                    id: id.clone(),
                    no_op: false,
                    key: key.clone(),
                    value: value.clone(),
                    old_value,
                }
            }
            DiscreteOperation::ObjectRemove { id, key, .. } => {
                let Some(child) = self.object(id)?.get(key).cloned() else {
                    return Err(ValidationError::UnknownKey {
                        id: id.clone(),
                        key: key.clone(),
                    }
                    .into());
                };
                let old_value = self.snapshot(&child)?;
                self.object_mut(id)?.shift_remove(key);
                self.detach(&child, &mut detached);
                AppliedOperation::ObjectRemove {
                    id: id.clone(),
                    no_op: false,
                    key: key.clone(),
                    old_value,
                }
            }
            DiscreteOperation::ObjectSetValue { id, value, .. } => {
                let old_children = self.object(id)?.clone();
                self.check_fresh(value.values())?;
                let mut old_value = indexmap::IndexMap::new();
                for (key, child) in &old_children {
                    old_value.insert(key.clone(), self.snapshot(child)?);
                }
                for child in value.values() {
                    self.attach(child.clone(), Some(id.as_str()));
                }
                *self.object_mut(id)? = value.iter().map(|(k, v)| (k.clone(), v.id.clone())).collect();
                for child in old_children.values() {
                    self.detach(child, &mut detached);
                }
                AppliedOperation::ObjectSetValue {
                    id: id.clone(),
                    no_op: false,
                    value: value.clone(),
                    old_value,
                }
            }
            DiscreteOperation::NumberAdd { id, value, .. } => {
                not_nan(id, *value)?;
                let number = self.number_mut(id)?;
                let sum = *number + value;
                not_nan(id, sum)?;
                *number = sum;
                AppliedOperation::NumberAdd {
                    id: id.clone(),
                    no_op: false,
                    value: *value,
                }
            }
            DiscreteOperation::NumberSet { id, value, .. } => {
                not_nan(id, *value)?;
                let number = self.number_mut(id)?;
                let old_value = std::mem::replace(number, *value);
                AppliedOperation::NumberSet {
                    id: id.clone(),
                    no_op: false,
                    value: *value,
                    old_value,
                }
            }
            DiscreteOperation::BooleanSet { id, value, .. } => {
                self.expect_kind(id, ValueKind::Boolean)?;
                self.touch(id);
                let mut old_value = false;
                if let Some(NodeData::Boolean(b)) = self.nodes.get_mut(id.as_str()).map(|n| &mut n.data) {
                    old_value = std::mem::replace(b, *value);
                }
                AppliedOperation::BooleanSet {
                    id: id.clone(),
                    no_op: false,
                    value: *value,
                    old_value,
                }
            }
        };
        Ok(Some(AppliedChange { operation, detached }))
    }

    /// Apply every member in order, or none of them.
    ///
    /// Members apply in place; when one fails, the nodes the earlier members
    /// changed, added or detached are put back.
    pub fn apply_all<'a>(
        &mut self,
        ops: impl IntoIterator<Item = &'a DiscreteOperation>,
    ) -> Result<Vec<AppliedChange>, ModelError> {
        self.begin_batch();
        let mut out = Vec::new();
        for op in ops {
            match self.apply(op) {
                Ok(Some(change)) => out.push(change),
                Ok(None) => {}
                Err(e) => {
                    self.roll_back_batch();
                    return Err(e);
                }
            }
        }
        self.commit_batch();
        Ok(out)
    }

    // ── Typed accessors ───────────────────────────────────────────────────

    fn text_mut(&mut self, id: &str) -> Result<&mut String, ModelError> {
        self.expect_kind(id, ValueKind::String)?;
        self.touch(id);
        match self.nodes.get_mut(id).map(|n| &mut n.data) {
            Some(NodeData::String(text)) => Ok(text),
            _ => Err(ValidationError::UnknownNode(id.to_string()).into()),
        }
    }

    fn number_mut(&mut self, id: &str) -> Result<&mut f64, ModelError> {
        self.expect_kind(id, ValueKind::Number)?;
        self.touch(id);
        match self.nodes.get_mut(id).map(|n| &mut n.data) {
            Some(NodeData::Number(n)) => Ok(n),
            _ => Err(ValidationError::UnknownNode(id.to_string()).into()),
        }
    }

    fn array(&self, id: &str) -> Result<&Vec<String>, ModelError> {
        match &self.expect_kind(id, ValueKind::Array)?.data {
            NodeData::Array(children) => Ok(children),
            _ => Err(ValidationError::UnknownNode(id.to_string()).into()),
        }
    }

    fn array_mut(&mut self, id: &str) -> Result<&mut Vec<String>, ModelError> {
        self.expect_kind(id, ValueKind::Array)?;
        self.touch(id);
        match self.nodes.get_mut(id).map(|n| &mut n.data) {
            Some(NodeData::Array(children)) => Ok(children),
            _ => Err(ValidationError::UnknownNode(id.to_string()).into()),
        }
    }

    fn array_child(&self, id: &str, index: usize) -> Result<String, ModelError> {
        let children = self.array(id)?;
        children
            .get(index)
            .cloned()
            .ok_or_else(|| out_of_bounds(id, index, children.len()))
    }

    fn object(&self, id: &str) -> Result<&indexmap::IndexMap<String, String>, ModelError> {
        match &self.expect_kind(id, ValueKind::Object)?.data {
            NodeData::Object(children) => Ok(children),
            _ => Err(ValidationError::UnknownNode(id.to_string()).into()),
        }
    }

    fn object_mut(&mut self, id: &str) -> Result<&mut indexmap::IndexMap<String, String>, ModelError> {
        self.expect_kind(id, ValueKind::Object)?;
        self.touch(id);
        match self.nodes.get_mut(id).map(|n| &mut n.data) {
            Some(NodeData::Object(children)) => Ok(children),
            _ => Err(ValidationError::UnknownNode(id.to_string()).into()),
        }
    }

    fn snapshot(&self, id: &str) -> Result<DataValue, ModelError> {
        self.value(id)
            .ok_or_else(|| ValidationError::UnknownNode(id.to_string()).into())
    }

    fn snapshot_all(&self, ids: &[String]) -> Result<Vec<DataValue>, ModelError> {
        ids.iter().map(|id| self.snapshot(id)).collect()
    }
}
