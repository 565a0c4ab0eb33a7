//! Lookup table from `(server kind, client kind)` to a transform function.

use std::collections::HashMap;

use super::{array, boolean, number, object, string, OperationPair, TransformError};
use crate::ops::{DiscreteOperation, OperationKind};

pub type TransformFn =
    fn(&DiscreteOperation, &DiscreteOperation) -> Result<OperationPair, TransformError>;

/// Transform functions keyed by the ordered kind pair they handle.
///
/// [`TransformRegistry::default`] holds an entry for every pair of kinds
/// that target the same value kind. Pairs across value kinds are absent: two
/// such operations can only share a target id if a replica is corrupt.
#[derive(Clone)]
pub struct TransformRegistry {
    fns: HashMap<(OperationKind, OperationKind), TransformFn>,
}

impl std::fmt::Debug for TransformRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<_> = self.fns.keys().collect();
        keys.sort();
        f.debug_struct("TransformRegistry").field("pairs", &keys).finish()
    }
}

impl TransformRegistry {
    /// A registry with no entries.
    pub fn empty() -> Self {
        Self { fns: HashMap::new() }
    }

    /// Register `f` for `(server, client)`, replacing any previous entry.
    pub fn register(&mut self, server: OperationKind, client: OperationKind, f: TransformFn) {
        self.fns.insert((server, client), f);
    }

    pub fn get(&self, server: OperationKind, client: OperationKind) -> Option<TransformFn> {
        self.fns.get(&(server, client)).copied()
    }

    pub fn contains(&self, server: OperationKind, client: OperationKind) -> bool {
        self.fns.contains_key(&(server, client))
    }

    pub fn len(&self) -> usize {
        self.fns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fns.is_empty()
    }
}

impl Default for TransformRegistry {
    fn default() -> Self {
        use OperationKind::*;
        let mut r = Self::empty();

        // ── String ────────────────────────────────────────────────────────
        r.register(StringInsert, StringInsert, string::insert_insert);
        r.register(StringInsert, StringRemove, string::insert_remove);
        r.register(StringInsert, StringSet, string::lose_to_set);
        r.register(StringRemove, StringInsert, string::remove_insert);
        r.register(StringRemove, StringRemove, string::remove_remove);
        r.register(StringRemove, StringSet, string::lose_to_set);
        r.register(StringSet, StringInsert, string::win_as_set);
        r.register(StringSet, StringRemove, string::win_as_set);
        r.register(StringSet, StringSet, string::win_as_set);

        // ── Array ─────────────────────────────────────────────────────────
        r.register(ArrayInsert, ArrayInsert, array::insert_insert);
        r.register(ArrayInsert, ArrayRemove, array::insert_remove);
        r.register(ArrayInsert, ArrayReplace, array::insert_replace);
        r.register(ArrayInsert, ArrayMove, array::insert_move);
        r.register(ArrayRemove, ArrayInsert, array::remove_insert);
        r.register(ArrayRemove, ArrayRemove, array::remove_remove);
        r.register(ArrayRemove, ArrayReplace, array::remove_replace);
        r.register(ArrayRemove, ArrayMove, array::remove_move);
        r.register(ArrayReplace, ArrayInsert, array::replace_insert);
        r.register(ArrayReplace, ArrayRemove, array::replace_remove);
        r.register(ArrayReplace, ArrayReplace, array::replace_replace);
        r.register(ArrayReplace, ArrayMove, array::replace_move);
        r.register(ArrayMove, ArrayInsert, array::move_insert);
        r.register(ArrayMove, ArrayRemove, array::move_remove);
        r.register(ArrayMove, ArrayReplace, array::move_replace);
        r.register(ArrayMove, ArrayMove, array::move_move);
        for kind in [ArrayInsert, ArrayRemove, ArrayReplace, ArrayMove] {
            r.register(kind, ArraySet, array::lose_to_set);
            r.register(ArraySet, kind, array::win_as_set);
        }
        r.register(ArraySet, ArraySet, array::win_as_set);

        // ── Object ────────────────────────────────────────────────────────
        r.register(ObjectSet, ObjectSet, object::set_set);
        r.register(ObjectSet, ObjectRemove, object::set_remove);
        r.register(ObjectRemove, ObjectSet, object::remove_set);
        r.register(ObjectRemove, ObjectRemove, object::remove_remove);
        for kind in [ObjectSet, ObjectRemove] {
            r.register(kind, ObjectSetValue, object::lose_to_set_value);
            r.register(ObjectSetValue, kind, object::win_as_set_value);
        }
        r.register(ObjectSetValue, ObjectSetValue, object::win_as_set_value);

        // ── Number ────────────────────────────────────────────────────────
        r.register(NumberAdd, NumberAdd, number::add_add);
        r.register(NumberAdd, NumberSet, number::add_set);
        r.register(NumberSet, NumberAdd, number::set_add);
        r.register(NumberSet, NumberSet, number::set_set);

        // ── Boolean ───────────────────────────────────────────────────────
        r.register(BooleanSet, BooleanSet, boolean::set_set);

        r
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_covers_every_same_family_pair() {
        let r = TransformRegistry::default();
        for s in OperationKind::ALL {
            for c in OperationKind::ALL {
                let same = s.target_kind() == c.target_kind();
                assert_eq!(r.contains(s, c), same, "({s}, {c})");
            }
        }
        assert_eq!(r.len(), 9 + 25 + 9 + 4 + 1);
    }

    #[test]
    fn register_replaces_entry() {
        fn swap(
            s: &DiscreteOperation,
            c: &DiscreteOperation,
        ) -> Result<OperationPair, TransformError> {
            Ok(OperationPair::new(c.clone(), s.clone()))
        }
        let mut r = TransformRegistry::empty();
        assert!(r.is_empty());
        r.register(OperationKind::BooleanSet, OperationKind::BooleanSet, swap);
        let f = r.get(OperationKind::BooleanSet, OperationKind::BooleanSet).unwrap();
        let a = DiscreteOperation::boolean_set("b", true);
        let b = DiscreteOperation::boolean_set("b", false);
        assert_eq!(f(&a, &b).unwrap(), OperationPair::new(b.clone(), a.clone()));
    }
}
