//! Operation types.
//!
//! [`DiscreteOperation`] is the closed set of single edits, one variant per
//! (value kind, edit) pair. Every variant addresses its target by value id
//! and carries a `no_op` flag; a no-op operation is retained for protocol
//! symmetry but has no effect when applied. [`Operation`] adds the compound
//! form: an ordered batch that is submitted and acknowledged as one unit.
//!
//! Operations are plain values. Transforms never mutate their inputs; they
//! build new operations with [`DiscreteOperation::as_no_op`] and the
//! per-variant constructors.

pub mod applied;

pub use applied::AppliedOperation;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::value::{DataValue, ValueKind};

/// A single edit addressed to one value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum DiscreteOperation {
    StringInsert {
        id: String,
        no_op: bool,
        index: usize,
        value: String,
    },
    /// Removes `value` (by char count) starting at `index`.
    StringRemove {
        id: String,
        no_op: bool,
        index: usize,
        value: String,
    },
    StringSet {
        id: String,
        no_op: bool,
        value: String,
    },
    ArrayInsert {
        id: String,
        no_op: bool,
        index: usize,
        value: DataValue,
    },
    ArrayRemove {
        id: String,
        no_op: bool,
        index: usize,
    },
    ArrayReplace {
        id: String,
        no_op: bool,
        index: usize,
        value: DataValue,
    },
    ArrayMove {
        id: String,
        no_op: bool,
        from_index: usize,
        to_index: usize,
    },
    ArraySet {
        id: String,
        no_op: bool,
        value: Vec<DataValue>,
    },
    /// Adds `key` or replaces its current value.
    ObjectSet {
        id: String,
        no_op: bool,
        key: String,
        value: DataValue,
    },
    ObjectRemove {
        id: String,
        no_op: bool,
        key: String,
    },
    ObjectSetValue {
        id: String,
        no_op: bool,
        value: IndexMap<String, DataValue>,
    },
    NumberAdd {
        id: String,
        no_op: bool,
        value: f64,
    },
    NumberSet {
        id: String,
        no_op: bool,
        value: f64,
    },
    BooleanSet {
        id: String,
        no_op: bool,
        value: bool,
    },
}

/// Discriminant of [`DiscreteOperation`], used as the registry key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OperationKind {
    StringInsert,
    StringRemove,
    StringSet,
    ArrayInsert,
    ArrayRemove,
    ArrayReplace,
    ArrayMove,
    ArraySet,
    ObjectSet,
    ObjectRemove,
    ObjectSetValue,
    NumberAdd,
    NumberSet,
    BooleanSet,
}

impl OperationKind {
    pub const ALL: [OperationKind; 14] = [
        OperationKind::StringInsert,
        OperationKind::StringRemove,
        OperationKind::StringSet,
        OperationKind::ArrayInsert,
        OperationKind::ArrayRemove,
        OperationKind::ArrayReplace,
        OperationKind::ArrayMove,
        OperationKind::ArraySet,
        OperationKind::ObjectSet,
        OperationKind::ObjectRemove,
        OperationKind::ObjectSetValue,
        OperationKind::NumberAdd,
        OperationKind::NumberSet,
        OperationKind::BooleanSet,
    ];

    /// The value kind an operation of this kind targets.
    pub fn target_kind(&self) -> ValueKind {
        use OperationKind::*;
        match self {
            StringInsert | StringRemove | StringSet => ValueKind::String,
            ArrayInsert | ArrayRemove | ArrayReplace | ArrayMove | ArraySet => ValueKind::Array,
            ObjectSet | ObjectRemove | ObjectSetValue => ValueKind::Object,
            NumberAdd | NumberSet => ValueKind::Number,
            BooleanSet => ValueKind::Boolean,
        }
    }

    pub fn as_str(&self) -> &'static str {
        use OperationKind::*;
        match self {
            StringInsert => "string_insert",
            StringRemove => "string_remove",
            StringSet => "string_set",
            ArrayInsert => "array_insert",
            ArrayRemove => "array_remove",
            ArrayReplace => "array_replace",
            ArrayMove => "array_move",
            ArraySet => "array_set",
            ObjectSet => "object_set",
            ObjectRemove => "object_remove",
            ObjectSetValue => "object_set_value",
            NumberAdd => "number_add",
            NumberSet => "number_set",
            BooleanSet => "boolean_set",
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl DiscreteOperation {
    pub fn kind(&self) -> OperationKind {
        match self {
            DiscreteOperation::StringInsert { .. } => OperationKind::StringInsert,
            DiscreteOperation::StringRemove { .. } => OperationKind::StringRemove,
            DiscreteOperation::StringSet { .. } => OperationKind::StringSet,
            DiscreteOperation::ArrayInsert { .. } => OperationKind::ArrayInsert,
            DiscreteOperation::ArrayRemove { .. } => OperationKind::ArrayRemove,
            DiscreteOperation::ArrayReplace { .. } => OperationKind::ArrayReplace,
            DiscreteOperation::ArrayMove { .. } => OperationKind::ArrayMove,
            DiscreteOperation::ArraySet { .. } => OperationKind::ArraySet,
            DiscreteOperation::ObjectSet { .. } => OperationKind::ObjectSet,
            DiscreteOperation::ObjectRemove { .. } => OperationKind::ObjectRemove,
            DiscreteOperation::ObjectSetValue { .. } => OperationKind::ObjectSetValue,
            DiscreteOperation::NumberAdd { .. } => OperationKind::NumberAdd,
            DiscreteOperation::NumberSet { .. } => OperationKind::NumberSet,
            DiscreteOperation::BooleanSet { .. } => OperationKind::BooleanSet,
        }
    }

    /// Id of the target value.
    pub fn id(&self) -> &str {
        match self {
            DiscreteOperation::StringInsert { id, .. }
            | DiscreteOperation::StringRemove { id, .. }
            | DiscreteOperation::StringSet { id, .. }
            | DiscreteOperation::ArrayInsert { id, .. }
            | DiscreteOperation::ArrayRemove { id, .. }
            | DiscreteOperation::ArrayReplace { id, .. }
            | DiscreteOperation::ArrayMove { id, .. }
            | DiscreteOperation::ArraySet { id, .. }
            | DiscreteOperation::ObjectSet { id, .. }
            | DiscreteOperation::ObjectRemove { id, .. }
            | DiscreteOperation::ObjectSetValue { id, .. }
            | DiscreteOperation::NumberAdd { id, .. }
            | DiscreteOperation::NumberSet { id, .. }
            | DiscreteOperation::BooleanSet { id, .. } => id,
        }
    }

    pub fn is_no_op(&self) -> bool {
        *self.no_op_flag()
    }

    fn no_op_flag(&self) -> &bool {
        match self {
            DiscreteOperation::StringInsert { no_op, .. }
            | DiscreteOperation::StringRemove { no_op, .. }
            | DiscreteOperation::StringSet { no_op, .. }
            | DiscreteOperation::ArrayInsert { no_op, .. }
            | DiscreteOperation::ArrayRemove { no_op, .. }
            | DiscreteOperation::ArrayReplace { no_op, .. }
            | DiscreteOperation::ArrayMove { no_op, .. }
            | DiscreteOperation::ArraySet { no_op, .. }
            | DiscreteOperation::ObjectSet { no_op, .. }
            | DiscreteOperation::ObjectRemove { no_op, .. }
            | DiscreteOperation::ObjectSetValue { no_op, .. }
            | DiscreteOperation::NumberAdd { no_op, .. }
            | DiscreteOperation::NumberSet { no_op, .. }
            | DiscreteOperation::BooleanSet { no_op, .. } => no_op,
        }
    }

    /// A copy of this operation with the `no_op` flag set.
    pub fn as_no_op(&self) -> Self {
        let mut op = self.clone();
        match &mut op {
            DiscreteOperation::StringInsert { no_op, .. }
            | DiscreteOperation::StringRemove { no_op, .. }
            | DiscreteOperation::StringSet { no_op, .. }
            | DiscreteOperation::ArrayInsert { no_op, .. }
            | DiscreteOperation::ArrayRemove { no_op, .. }
            | DiscreteOperation::ArrayReplace { no_op, .. }
            | DiscreteOperation::ArrayMove { no_op, .. }
            | DiscreteOperation::ArraySet { no_op, .. }
            | DiscreteOperation::ObjectSet { no_op, .. }
            | DiscreteOperation::ObjectRemove { no_op, .. }
            | DiscreteOperation::ObjectSetValue { no_op, .. }
            | DiscreteOperation::NumberAdd { no_op, .. }
            | DiscreteOperation::NumberSet { no_op, .. }
            | DiscreteOperation::BooleanSet { no_op, .. } => *no_op = true,
        }
        op
    }

    // ── Constructors ──────────────────────────────────────────────────────

    pub fn string_insert(id: impl Into<String>, index: usize, value: impl Into<String>) -> Self {
        DiscreteOperation::StringInsert {
            id: id.into(),
            no_op: false,
            index,
            value: value.into(),
        }
    }

    pub fn string_remove(id: impl Into<String>, index: usize, value: impl Into<String>) -> Self {
        DiscreteOperation::StringRemove {
            id: id.into(),
            no_op: false,
            index,
            value: value.into(),
        }
    }

    pub fn string_set(id: impl Into<String>, value: impl Into<String>) -> Self {
        DiscreteOperation::StringSet {
            id: id.into(),
            no_op: false,
            value: value.into(),
        }
    }

    pub fn array_insert(id: impl Into<String>, index: usize, value: DataValue) -> Self {
        DiscreteOperation::ArrayInsert {
            id: id.into(),
            no_op: false,
            index,
            value,
        }
    }

    pub fn array_remove(id: impl Into<String>, index: usize) -> Self {
        DiscreteOperation::ArrayRemove {
            id: id.into(),
            no_op: false,
            index,
        }
    }

    pub fn array_replace(id: impl Into<String>, index: usize, value: DataValue) -> Self {
        DiscreteOperation::ArrayReplace {
            id: id.into(),
            no_op: false,
            index,
            value,
        }
    }

    pub fn array_move(id: impl Into<String>, from_index: usize, to_index: usize) -> Self {
        DiscreteOperation::ArrayMove {
            id: id.into(),
            no_op: false,
            from_index,
            to_index,
        }
    }

    pub fn array_set(id: impl Into<String>, value: Vec<DataValue>) -> Self {
        DiscreteOperation::ArraySet {
            id: id.into(),
            no_op: false,
            value,
        }
    }

    pub fn object_set(id: impl Into<String>, key: impl Into<String>, value: DataValue) -> Self {
        DiscreteOperation::ObjectSet {
            id: id.into(),
            no_op: false,
            key: key.into(),
            value,
        }
    }

    pub fn object_remove(id: impl Into<String>, key: impl Into<String>) -> Self {
        DiscreteOperation::ObjectRemove {
            id: id.into(),
            no_op: false,
            key: key.into(),
        }
    }

    pub fn object_set_value(id: impl Into<String>, value: IndexMap<String, DataValue>) -> Self {
        DiscreteOperation::ObjectSetValue {
            id: id.into(),
            no_op: false,
            value,
        }
    }

    pub fn number_add(id: impl Into<String>, value: f64) -> Self {
        DiscreteOperation::NumberAdd {
            id: id.into(),
            no_op: false,
            value,
        }
    }

    pub fn number_set(id: impl Into<String>, value: f64) -> Self {
        DiscreteOperation::NumberSet {
            id: id.into(),
            no_op: false,
            value,
        }
    }

    pub fn boolean_set(id: impl Into<String>, value: bool) -> Self {
        DiscreteOperation::BooleanSet {
            id: id.into(),
            no_op: false,
            value,
        }
    }
}

/// An ordered batch of discrete operations applied as one logical edit.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompoundOperation {
    pub ops: Vec<DiscreteOperation>,
}

impl CompoundOperation {
    pub fn new(ops: Vec<DiscreteOperation>) -> Self {
        Self { ops }
    }

    /// A compound operation is a no-op iff every member is (vacuously true
    /// for an empty batch).
    pub fn is_no_op(&self) -> bool {
        self.ops.iter().all(DiscreteOperation::is_no_op)
    }
}

/// Either a single edit or an ordered batch.
///
/// On the wire a discrete operation is a tagged record and a compound one is
/// a list of such records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Operation {
    Compound(CompoundOperation),
    Discrete(DiscreteOperation),
}

impl Operation {
    pub fn is_no_op(&self) -> bool {
        match self {
            Operation::Discrete(op) => op.is_no_op(),
            Operation::Compound(op) => op.is_no_op(),
        }
    }

    /// The discrete members in application order.
    pub fn members(&self) -> &[DiscreteOperation] {
        match self {
            Operation::Discrete(op) => std::slice::from_ref(op),
            Operation::Compound(op) => &op.ops,
        }
    }

    pub fn into_members(self) -> Vec<DiscreteOperation> {
        match self {
            Operation::Discrete(op) => vec![op],
            Operation::Compound(op) => op.ops,
        }
    }

    /// Concatenate operations into one, flattening nested batches.
    ///
    /// A single resulting member collapses back to a discrete operation.
    pub fn concat(parts: Vec<Operation>) -> Self {
        let mut ops: Vec<DiscreteOperation> = Vec::new();
        for part in parts {
            ops.extend(part.into_members());
        }
        if ops.len() == 1 {
            if let Some(op) = ops.pop() {
                return Operation::Discrete(op);
            }
        }
        Operation::Compound(CompoundOperation::new(ops))
    }
}

impl From<DiscreteOperation> for Operation {
    fn from(op: DiscreteOperation) -> Self {
        Operation::Discrete(op)
    }
}

impl From<CompoundOperation> for Operation {
    fn from(op: CompoundOperation) -> Self {
        Operation::Compound(op)
    }
}
