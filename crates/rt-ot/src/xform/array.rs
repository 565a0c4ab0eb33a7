//! Array transforms.
//!
//! A move is treated as a remove at `from_index` followed by an insert at
//! `to_index`, so every pair reduces to the four index primitives below.
//! The exceptions are a remove or a second move of the element being moved,
//! which follow the element instead of the slot.

use super::{mismatch, OperationPair, TransformError};
use crate::ops::{DiscreteOperation, OperationKind};

use DiscreteOperation::{ArrayInsert, ArrayMove, ArrayRemove, ArrayReplace};

// ── Index primitives ──────────────────────────────────────────────────────
//
// Each takes the server index first and returns `(server', client')`.

fn ins_ins(s: usize, c: usize) -> (usize, usize) {
    if s <= c {
        (s, c + 1)
    } else {
        (s + 1, c)
    }
}

fn ins_rem(i: usize, r: usize) -> (usize, usize) {
    if i <= r {
        (i, r + 1)
    } else {
        (i - 1, r)
    }
}

fn rem_ins(r: usize, i: usize) -> (usize, usize) {
    if r < i {
        (r, i - 1)
    } else {
        (r + 1, i)
    }
}

/// `None` when both remove the same element.
fn rem_rem(r1: usize, r2: usize) -> Option<(usize, usize)> {
    if r1 == r2 {
        None
    } else if r1 < r2 {
        Some((r1, r2 - 1))
    } else {
        Some((r1 - 1, r2))
    }
}

/// Where the element at `index` ends up after moving `from` to `to`.
pub(crate) fn moved_index(index: usize, from: usize, to: usize) -> usize {
    if index == from {
        return to;
    }
    let index = if index > from { index - 1 } else { index };
    if index >= to {
        index + 1
    } else {
        index
    }
}

// ── Insert ────────────────────────────────────────────────────────────────

pub(super) fn insert_insert(
    s: &DiscreteOperation,
    c: &DiscreteOperation,
) -> Result<OperationPair, TransformError> {
    let (ArrayInsert { id, index: si, value: sv, .. }, ArrayInsert { index: ci, value: cv, .. }) = (s, c)
    else {
        return Err(mismatch(s, c, OperationKind::ArrayInsert, OperationKind::ArrayInsert));
    };
    let (si, ci) = ins_ins(*si, *ci);
    Ok(OperationPair::new(
        DiscreteOperation::array_insert(id, si, sv.clone()),
        DiscreteOperation::array_insert(id, ci, cv.clone()),
    ))
}

pub(super) fn insert_remove(
    s: &DiscreteOperation,
    c: &DiscreteOperation,
) -> Result<OperationPair, TransformError> {
    let (ArrayInsert { id, index: si, value, .. }, ArrayRemove { index: ci, .. }) = (s, c) else {
        return Err(mismatch(s, c, OperationKind::ArrayInsert, OperationKind::ArrayRemove));
    };
    let (si, ci) = ins_rem(*si, *ci);
    Ok(OperationPair::new(
        DiscreteOperation::array_insert(id, si, value.clone()),
        DiscreteOperation::array_remove(id, ci),
    ))
}

pub(super) fn insert_replace(
    s: &DiscreteOperation,
    c: &DiscreteOperation,
) -> Result<OperationPair, TransformError> {
    let (ArrayInsert { id, index: si, .. }, ArrayReplace { index: ci, value, .. }) = (s, c) else {
        return Err(mismatch(s, c, OperationKind::ArrayInsert, OperationKind::ArrayReplace));
    };
    Ok(if si <= ci {
        OperationPair::new(s.clone(), DiscreteOperation::array_replace(id, ci + 1, value.clone()))
    } else {
        OperationPair::new(s.clone(), c.clone())
    })
}

pub(super) fn insert_move(
    s: &DiscreteOperation,
    c: &DiscreteOperation,
) -> Result<OperationPair, TransformError> {
    let (ArrayInsert { id, index, value, .. }, ArrayMove { from_index, to_index, .. }) = (s, c) else {
        return Err(mismatch(s, c, OperationKind::ArrayInsert, OperationKind::ArrayMove));
    };
    let (index, from) = ins_rem(*index, *from_index);
    let (index, to) = ins_ins(index, *to_index);
    Ok(OperationPair::new(
        DiscreteOperation::array_insert(id, index, value.clone()),
        DiscreteOperation::array_move(id, from, to),
    ))
}

// ── Remove ────────────────────────────────────────────────────────────────

pub(super) fn remove_insert(
    s: &DiscreteOperation,
    c: &DiscreteOperation,
) -> Result<OperationPair, TransformError> {
    let (ArrayRemove { id, index: si, .. }, ArrayInsert { index: ci, value, .. }) = (s, c) else {
        return Err(mismatch(s, c, OperationKind::ArrayRemove, OperationKind::ArrayInsert));
    };
    let (si, ci) = rem_ins(*si, *ci);
    Ok(OperationPair::new(
        DiscreteOperation::array_remove(id, si),
        DiscreteOperation::array_insert(id, ci, value.clone()),
    ))
}

pub(super) fn remove_remove(
    s: &DiscreteOperation,
    c: &DiscreteOperation,
) -> Result<OperationPair, TransformError> {
    let (ArrayRemove { id, index: si, .. }, ArrayRemove { index: ci, .. }) = (s, c) else {
        return Err(mismatch(s, c, OperationKind::ArrayRemove, OperationKind::ArrayRemove));
    };
    Ok(match rem_rem(*si, *ci) {
        None => OperationPair::new(s.as_no_op(), c.as_no_op()),
        Some((si, ci)) => OperationPair::new(
            DiscreteOperation::array_remove(id, si),
            DiscreteOperation::array_remove(id, ci),
        ),
    })
}

pub(super) fn remove_replace(
    s: &DiscreteOperation,
    c: &DiscreteOperation,
) -> Result<OperationPair, TransformError> {
    let (ArrayRemove { id, index: si, .. }, ArrayReplace { index: ci, value, .. }) = (s, c) else {
        return Err(mismatch(s, c, OperationKind::ArrayRemove, OperationKind::ArrayReplace));
    };
    Ok(if si < ci {
        OperationPair::new(s.clone(), DiscreteOperation::array_replace(id, ci - 1, value.clone()))
    } else if si == ci {
        // The client's replacement survives the removal as a fresh element.
        OperationPair::new(s.as_no_op(), DiscreteOperation::array_insert(id, *ci, value.clone()))
    } else {
        OperationPair::new(s.clone(), c.clone())
    })
}

pub(super) fn remove_move(
    s: &DiscreteOperation,
    c: &DiscreteOperation,
) -> Result<OperationPair, TransformError> {
    let (ArrayRemove { id, index, .. }, ArrayMove { from_index, to_index, .. }) = (s, c) else {
        return Err(mismatch(s, c, OperationKind::ArrayRemove, OperationKind::ArrayMove));
    };
    // Removing the element being moved: remove it where it landed.
    let Some((index, from)) = rem_rem(*index, *from_index) else {
        return Ok(OperationPair::new(DiscreteOperation::array_remove(id, *to_index), c.as_no_op()));
    };
    let (index, to) = rem_ins(index, *to_index);
    Ok(OperationPair::new(
        DiscreteOperation::array_remove(id, index),
        DiscreteOperation::array_move(id, from, to),
    ))
}

// ── Replace ───────────────────────────────────────────────────────────────

pub(super) fn replace_insert(
    s: &DiscreteOperation,
    c: &DiscreteOperation,
) -> Result<OperationPair, TransformError> {
    let (ArrayReplace { id, index: si, value, .. }, ArrayInsert { index: ci, .. }) = (s, c) else {
        return Err(mismatch(s, c, OperationKind::ArrayReplace, OperationKind::ArrayInsert));
    };
    Ok(if ci <= si {
        OperationPair::new(DiscreteOperation::array_replace(id, si + 1, value.clone()), c.clone())
    } else {
        OperationPair::new(s.clone(), c.clone())
    })
}

pub(super) fn replace_remove(
    s: &DiscreteOperation,
    c: &DiscreteOperation,
) -> Result<OperationPair, TransformError> {
    let (ArrayReplace { id, index: si, value, .. }, ArrayRemove { index: ci, .. }) = (s, c) else {
        return Err(mismatch(s, c, OperationKind::ArrayReplace, OperationKind::ArrayRemove));
    };
    Ok(if si < ci {
        OperationPair::new(s.clone(), c.clone())
    } else if si == ci {
        OperationPair::new(DiscreteOperation::array_insert(id, *si, value.clone()), c.as_no_op())
    } else {
        OperationPair::new(DiscreteOperation::array_replace(id, si - 1, value.clone()), c.clone())
    })
}

pub(super) fn replace_replace(
    s: &DiscreteOperation,
    c: &DiscreteOperation,
) -> Result<OperationPair, TransformError> {
    let (ArrayReplace { index: si, .. }, ArrayReplace { index: ci, .. }) = (s, c) else {
        return Err(mismatch(s, c, OperationKind::ArrayReplace, OperationKind::ArrayReplace));
    };
    Ok(if si == ci {
        OperationPair::new(s.clone(), c.as_no_op())
    } else {
        OperationPair::new(s.clone(), c.clone())
    })
}

pub(super) fn replace_move(
    s: &DiscreteOperation,
    c: &DiscreteOperation,
) -> Result<OperationPair, TransformError> {
    let (ArrayReplace { id, index, value, .. }, ArrayMove { from_index, to_index, .. }) = (s, c) else {
        return Err(mismatch(s, c, OperationKind::ArrayReplace, OperationKind::ArrayMove));
    };
    let index = moved_index(*index, *from_index, *to_index);
    Ok(OperationPair::new(DiscreteOperation::array_replace(id, index, value.clone()), c.clone()))
}

// ── Move ──────────────────────────────────────────────────────────────────

pub(super) fn move_insert(
    s: &DiscreteOperation,
    c: &DiscreteOperation,
) -> Result<OperationPair, TransformError> {
    let (ArrayMove { id, from_index, to_index, .. }, ArrayInsert { index, value, .. }) = (s, c) else {
        return Err(mismatch(s, c, OperationKind::ArrayMove, OperationKind::ArrayInsert));
    };
    let (from, index) = rem_ins(*from_index, *index);
    let (to, index) = ins_ins(*to_index, index);
    Ok(OperationPair::new(
        DiscreteOperation::array_move(id, from, to),
        DiscreteOperation::array_insert(id, index, value.clone()),
    ))
}

pub(super) fn move_remove(
    s: &DiscreteOperation,
    c: &DiscreteOperation,
) -> Result<OperationPair, TransformError> {
    let (ArrayMove { id, from_index, to_index, .. }, ArrayRemove { index, .. }) = (s, c) else {
        return Err(mismatch(s, c, OperationKind::ArrayMove, OperationKind::ArrayRemove));
    };
    let Some((from, index)) = rem_rem(*from_index, *index) else {
        return Ok(OperationPair::new(s.as_no_op(), DiscreteOperation::array_remove(id, *to_index)));
    };
    let (to, index) = ins_rem(*to_index, index);
    Ok(OperationPair::new(
        DiscreteOperation::array_move(id, from, to),
        DiscreteOperation::array_remove(id, index),
    ))
}

pub(super) fn move_replace(
    s: &DiscreteOperation,
    c: &DiscreteOperation,
) -> Result<OperationPair, TransformError> {
    let (ArrayMove { id, from_index, to_index, .. }, ArrayReplace { index, value, .. }) = (s, c) else {
        return Err(mismatch(s, c, OperationKind::ArrayMove, OperationKind::ArrayReplace));
    };
    let index = moved_index(*index, *from_index, *to_index);
    Ok(OperationPair::new(s.clone(), DiscreteOperation::array_replace(id, index, value.clone())))
}

pub(super) fn move_move(
    s: &DiscreteOperation,
    c: &DiscreteOperation,
) -> Result<OperationPair, TransformError> {
    let (
        ArrayMove { id, from_index: sf, to_index: st, .. },
        ArrayMove { from_index: cf, to_index: ct, .. },
    ) = (s, c)
    else {
        return Err(mismatch(s, c, OperationKind::ArrayMove, OperationKind::ArrayMove));
    };
    // Both moved the same element: the server's destination wins.
    let Some((sf, cf)) = rem_rem(*sf, *cf) else {
        return Ok(OperationPair::new(DiscreteOperation::array_move(id, *ct, *st), c.as_no_op()));
    };
    let (sf, ct) = rem_ins(sf, *ct);
    let (st, cf) = ins_rem(*st, cf);
    let (st, ct) = ins_ins(st, ct);
    Ok(OperationPair::new(
        DiscreteOperation::array_move(id, sf, st),
        DiscreteOperation::array_move(id, cf, ct),
    ))
}

// ── Set ───────────────────────────────────────────────────────────────────

pub(super) fn win_as_set(
    s: &DiscreteOperation,
    c: &DiscreteOperation,
) -> Result<OperationPair, TransformError> {
    Ok(OperationPair::new(s.clone(), c.as_no_op()))
}

pub(super) fn lose_to_set(
    s: &DiscreteOperation,
    c: &DiscreteOperation,
) -> Result<OperationPair, TransformError> {
    Ok(OperationPair::new(s.as_no_op(), c.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::Operation;
    use crate::value::{DataValue, IdGenerator, ValueData};
    use crate::xform::TransformFn;

    fn tag(v: &DataValue) -> String {
        match &v.data {
            ValueData::String { value } => value.clone(),
            other => panic!("test arrays hold strings, got {other:?}"),
        }
    }

    fn apply(list: &[String], op: &Operation) -> Vec<String> {
        let mut list = list.to_vec();
        for member in op.members() {
            if member.is_no_op() {
                continue;
            }
            match member {
                ArrayInsert { index, value, .. } => list.insert(*index, tag(value)),
                ArrayRemove { index, .. } => {
                    list.remove(*index);
                }
                ArrayReplace { index, value, .. } => list[*index] = tag(value),
                ArrayMove { from_index, to_index, .. } => {
                    let item = list.remove(*from_index);
                    list.insert(*to_index, item);
                }
                DiscreteOperation::ArraySet { value, .. } => list = value.iter().map(tag).collect(),
                other => panic!("not an array op: {other:?}"),
            }
        }
        list
    }

    fn base() -> Vec<String> {
        ["a", "b", "c", "d", "e"].iter().map(|s| s.to_string()).collect()
    }

    fn converge(s: DiscreteOperation, c: DiscreteOperation, f: TransformFn) -> Vec<String> {
        let list = base();
        let pair = f(&s, &c).unwrap();
        let via_server = apply(&apply(&list, &s.clone().into()), &pair.client);
        let via_client = apply(&apply(&list, &c.clone().into()), &pair.server);
        assert_eq!(via_server, via_client, "s={s:?} c={c:?}");
        via_server
    }

    /// Every index-bearing op shape over a five-element array.
    fn samples(ids: &mut IdGenerator, prefix: &str) -> Vec<DiscreteOperation> {
        let mut out = Vec::new();
        for i in 0..=5 {
            out.push(DiscreteOperation::array_insert("a", i, ids.string(format!("{prefix}{i}"))));
        }
        for i in 0..5 {
            out.push(DiscreteOperation::array_remove("a", i));
            out.push(DiscreteOperation::array_replace("a", i, ids.string(format!("{prefix}r{i}"))));
            for j in 0..5 {
                out.push(DiscreteOperation::array_move("a", i, j));
            }
        }
        out
    }

    #[test]
    fn every_positional_pair_converges() {
        let mut ids = IdGenerator::new("t");
        let servers = samples(&mut ids, "S");
        let clients = samples(&mut ids, "C");
        let registry = crate::xform::TransformRegistry::default();
        for s in &servers {
            for c in &clients {
                let f = registry.get(s.kind(), c.kind()).unwrap();
                converge(s.clone(), c.clone(), f);
            }
        }
    }

    #[test]
    fn concurrent_inserts_at_same_index_put_server_first() {
        let mut ids = IdGenerator::new("t");
        let out = converge(
            DiscreteOperation::array_insert("a", 2, ids.string("S")),
            DiscreteOperation::array_insert("a", 2, ids.string("C")),
            insert_insert,
        );
        assert_eq!(out, ["a", "b", "S", "C", "c", "d", "e"]);
    }

    #[test]
    fn removing_the_same_element_twice_is_absorbed() {
        let s = DiscreteOperation::array_remove("a", 1);
        let c = DiscreteOperation::array_remove("a", 1);
        let pair = remove_remove(&s, &c).unwrap();
        assert!(pair.server.is_no_op() && pair.client.is_no_op());
    }

    #[test]
    fn remove_of_moved_element_follows_it() {
        let pair = remove_move(
            &DiscreteOperation::array_remove("a", 1),
            &DiscreteOperation::array_move("a", 1, 3),
        )
        .unwrap();
        assert_eq!(pair.server, Operation::from(DiscreteOperation::array_remove("a", 3)));
        assert!(pair.client.is_no_op());
    }

    #[test]
    fn replace_of_removed_element_reinserts() {
        let mut ids = IdGenerator::new("t");
        let out = converge(
            DiscreteOperation::array_remove("a", 2),
            DiscreteOperation::array_replace("a", 2, ids.string("X")),
            remove_replace,
        );
        assert_eq!(out, ["a", "b", "X", "d", "e"]);
    }

    #[test]
    fn same_element_moved_twice_lands_at_server_destination() {
        let out = converge(
            DiscreteOperation::array_move("a", 0, 4),
            DiscreteOperation::array_move("a", 0, 2),
            move_move,
        );
        assert_eq!(out, ["b", "c", "d", "e", "a"]);
    }

    #[test]
    fn array_set_wins() {
        let mut ids = IdGenerator::new("t");
        let set = DiscreteOperation::array_set("a", vec![ids.string("z")]);
        let out = converge(set.clone(), DiscreteOperation::array_remove("a", 0), win_as_set);
        assert_eq!(out, ["z"]);
        let out = converge(DiscreteOperation::array_move("a", 0, 3), set, lose_to_set);
        assert_eq!(out, ["z"]);
    }

    #[test]
    fn moved_index_tracks_elements() {
        // [a b c d e] move 1 -> 3 gives [a c d b e]
        assert_eq!(moved_index(0, 1, 3), 0);
        assert_eq!(moved_index(1, 1, 3), 3);
        assert_eq!(moved_index(2, 1, 3), 1);
        assert_eq!(moved_index(3, 1, 3), 2);
        assert_eq!(moved_index(4, 1, 3), 4);
        // move 3 -> 1 gives [a d b c e]
        assert_eq!(moved_index(1, 3, 1), 2);
        assert_eq!(moved_index(3, 3, 1), 1);
    }
}
