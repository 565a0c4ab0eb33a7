//! Applied operations: an operation together with the state it replaced.
//!
//! Applying a [`DiscreteOperation`] to a tree yields an [`AppliedOperation`]
//! which records whatever the edit overwrote (removed text, the replaced
//! element, the old scalar). That is enough to compute the inverse edit as
//! a pure function, without consulting the tree again.

use indexmap::IndexMap;

use super::DiscreteOperation;
use crate::value::DataValue;

#[derive(Debug, Clone, PartialEq)]
pub enum AppliedOperation {
    StringInsert {
        id: String,
        no_op: bool,
        index: usize,
        value: String,
    },
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
        old_value: String,
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
        old_value: DataValue,
    },
    ArrayReplace {
        id: String,
        no_op: bool,
        index: usize,
        value: DataValue,
        old_value: DataValue,
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
        old_value: Vec<DataValue>,
    },
    ObjectSet {
        id: String,
        no_op: bool,
        key: String,
        value: DataValue,
        old_value: Option<DataValue>,
    },
    ObjectRemove {
        id: String,
        no_op: bool,
        key: String,
        old_value: DataValue,
    },
    ObjectSetValue {
        id: String,
        no_op: bool,
        value: IndexMap<String, DataValue>,
        old_value: IndexMap<String, DataValue>,
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
        old_value: f64,
    },
    BooleanSet {
        id: String,
        no_op: bool,
        value: bool,
        old_value: bool,
    },
}

impl AppliedOperation {
    pub fn id(&self) -> &str {
        match self {
            AppliedOperation::StringInsert { id, .. }
            | AppliedOperation::StringRemove { id, .. }
            | AppliedOperation::StringSet { id, .. }
            | AppliedOperation::ArrayInsert { id, .. }
            | AppliedOperation::ArrayRemove { id, .. }
            | AppliedOperation::ArrayReplace { id, .. }
            | AppliedOperation::ArrayMove { id, .. }
            | AppliedOperation::ArraySet { id, .. }
            | AppliedOperation::ObjectSet { id, .. }
            | AppliedOperation::ObjectRemove { id, .. }
            | AppliedOperation::ObjectSetValue { id, .. }
            | AppliedOperation::NumberAdd { id, .. }
            | AppliedOperation::NumberSet { id, .. }
            | AppliedOperation::BooleanSet { id, .. } => id,
        }
    }

    /// The edit that undoes this one.
    pub fn inverse(&self) -> AppliedOperation {
        match self.clone() {
            AppliedOperation::StringInsert { id, no_op, index, value } => {
                AppliedOperation::StringRemove { id, no_op, index, value }
            }
            AppliedOperation::StringRemove { id, no_op, index, value } => {
                AppliedOperation::StringInsert { id, no_op, index, value }
            }
            AppliedOperation::StringSet { id, no_op, value, old_value } => {
                AppliedOperation::StringSet { id, no_op, value: old_value, old_value: value }
            }
            AppliedOperation::ArrayInsert { id, no_op, index, value } => {
                AppliedOperation::ArrayRemove { id, no_op, index, old_value: value }
            }
            AppliedOperation::ArrayRemove { id, no_op, index, old_value } => {
                AppliedOperation::ArrayInsert { id, no_op, index, value: old_value }
            }
            AppliedOperation::ArrayReplace { id, no_op, index, value, old_value } => {
                AppliedOperation::ArrayReplace { id, no_op, index, value: old_value, old_value: value }
            }
            AppliedOperation::ArrayMove { id, no_op, from_index, to_index } => {
                AppliedOperation::ArrayMove { id, no_op, from_index: to_index, to_index: from_index }
            }
            AppliedOperation::ArraySet { id, no_op, value, old_value } => {
                AppliedOperation::ArraySet { id, no_op, value: old_value, old_value: value }
            }
            AppliedOperation::ObjectSet { id, no_op, key, value, old_value } => match old_value {
                Some(old) => AppliedOperation::ObjectSet {
                    id,
                    no_op,
                    key,
                    value: old,
                    old_value: Some(value),
                },
                None => AppliedOperation::ObjectRemove { id, no_op, key, old_value: value },
            },
            AppliedOperation::ObjectRemove { id, no_op, key, old_value } => {
                AppliedOperation::ObjectSet { id, no_op, key, value: old_value, old_value: None }
            }
            AppliedOperation::ObjectSetValue { id, no_op, value, old_value } => {
                AppliedOperation::ObjectSetValue { id, no_op, value: old_value, old_value: value }
            }
            AppliedOperation::NumberAdd { id, no_op, value } => {
                AppliedOperation::NumberAdd { id, no_op, value: -value }
            }
            AppliedOperation::NumberSet { id, no_op, value, old_value } => {
                AppliedOperation::NumberSet { id, no_op, value: old_value, old_value: value }
            }
            AppliedOperation::BooleanSet { id, no_op, value, old_value } => {
                AppliedOperation::BooleanSet { id, no_op, value: old_value, old_value: value }
            }
        }
    }

    /// Strip the recorded old state, giving an operation that can be applied.
    pub fn to_operation(&self) -> DiscreteOperation {
        match self.clone() {
            AppliedOperation::StringInsert { id, no_op, index, value } => {
                DiscreteOperation::StringInsert { id, no_op, index, value }
            }
            AppliedOperation::StringRemove { id, no_op, index, value } => {
                DiscreteOperation::StringRemove { id, no_op, index, value }
            }
            AppliedOperation::StringSet { id, no_op, value, .. } => {
                DiscreteOperation::StringSet { id, no_op, value }
            }
            AppliedOperation::ArrayInsert { id, no_op, index, value } => {
                DiscreteOperation::ArrayInsert { id, no_op, index, value }
            }
            AppliedOperation::ArrayRemove { id, no_op, index, .. } => {
                DiscreteOperation::ArrayRemove { id, no_op, index }
            }
            AppliedOperation::ArrayReplace { id, no_op, index, value, .. } => {
                DiscreteOperation::ArrayReplace { id, no_op, index, value }
            }
            AppliedOperation::ArrayMove { id, no_op, from_index, to_index } => {
                DiscreteOperation::ArrayMove { id, no_op, from_index, to_index }
            }
            AppliedOperation::ArraySet { id, no_op, value, .. } => {
                DiscreteOperation::ArraySet { id, no_op, value }
            }
            AppliedOperation::ObjectSet { id, no_op, key, value, .. } => {
                DiscreteOperation::ObjectSet { id, no_op, key, value }
            }
            AppliedOperation::ObjectRemove { id, no_op, key, .. } => {
                DiscreteOperation::ObjectRemove { id, no_op, key }
            }
            AppliedOperation::ObjectSetValue { id, no_op, value, .. } => {
                DiscreteOperation::ObjectSetValue { id, no_op, value }
            }
            AppliedOperation::NumberAdd { id, no_op, value } => {
                DiscreteOperation::NumberAdd { id, no_op, value }
            }
            AppliedOperation::NumberSet { id, no_op, value, .. } => {
                DiscreteOperation::NumberSet { id, no_op, value }
            }
            AppliedOperation::BooleanSet { id, no_op, value, .. } => {
                DiscreteOperation::BooleanSet { id, no_op, value }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::IdGenerator;

    #[test]
    fn string_insert_inverts_to_remove() {
        let applied = AppliedOperation::StringInsert {
            id: "s".into(),
            no_op: false,
            index: 2,
            value: "ab".into(),
        };
        assert_eq!(
            applied.inverse().to_operation(),
            DiscreteOperation::string_remove("s", 2, "ab")
        );
    }

    #[test]
    fn inverse_is_an_involution() {
        let mut ids = IdGenerator::new("t");
        let samples = vec![
            AppliedOperation::ArrayMove { id: "a".into(), no_op: false, from_index: 1, to_index: 4 },
            AppliedOperation::NumberAdd { id: "n".into(), no_op: false, value: 2.5 },
            AppliedOperation::BooleanSet { id: "b".into(), no_op: false, value: true, old_value: false },
            AppliedOperation::ObjectSet {
                id: "o".into(),
                no_op: false,
                key: "k".into(),
                value: ids.number(1.0),
                old_value: Some(ids.number(2.0)),
            },
            AppliedOperation::ArrayReplace {
                id: "a".into(),
                no_op: false,
                index: 0,
                value: ids.string("new"),
                old_value: ids.string("old"),
            },
        ];
        for op in samples {
            assert_eq!(op.inverse().inverse(), op);
        }
    }

    #[test]
    fn object_add_inverts_to_remove() {
        let mut ids = IdGenerator::new("t");
        let value = ids.boolean(true);
        let applied = AppliedOperation::ObjectSet {
            id: "o".into(),
            no_op: false,
            key: "flag".into(),
            value: value.clone(),
            old_value: None,
        };
        assert_eq!(
            applied.inverse(),
            AppliedOperation::ObjectRemove {
                id: "o".into(),
                no_op: false,
                key: "flag".into(),
                old_value: value,
            }
        );
    }
}
