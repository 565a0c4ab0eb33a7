//! String transforms. Positions and lengths are counted in chars.

use super::{mismatch, OperationPair, TransformError};
use crate::ops::{DiscreteOperation, Operation, OperationKind};
use crate::range::{range_range, RangeRelationship};

use DiscreteOperation::{StringInsert, StringRemove};

fn len(s: &str) -> usize {
    s.chars().count()
}

fn slice(s: &str, start: usize, end: usize) -> String {
    s.chars().skip(start).take(end.saturating_sub(start)).collect()
}

fn tail(s: &str, start: usize) -> String {
    s.chars().skip(start).collect()
}

/// A remove of `removed` at `index`, where `removed` is split at `at` by a
/// concurrent insert of `inserted_len` chars that has already been applied.
/// The right part goes first so the left part's index stays valid.
fn split_remove(id: &str, index: usize, removed: &str, at: usize, inserted_len: usize) -> Operation {
    let k = at - index;
    Operation::concat(vec![
        DiscreteOperation::string_remove(id, at + inserted_len, tail(removed, k)).into(),
        DiscreteOperation::string_remove(id, index, slice(removed, 0, k)).into(),
    ])
}

pub(super) fn insert_insert(
    s: &DiscreteOperation,
    c: &DiscreteOperation,
) -> Result<OperationPair, TransformError> {
    let (StringInsert { id, index: si, value: sv, .. }, StringInsert { index: ci, value: cv, .. }) = (s, c)
    else {
        return Err(mismatch(s, c, OperationKind::StringInsert, OperationKind::StringInsert));
    };
    Ok(if si <= ci {
        OperationPair::new(s.clone(), DiscreteOperation::string_insert(id, ci + len(sv), cv))
    } else {
        OperationPair::new(DiscreteOperation::string_insert(id, si + len(cv), sv), c.clone())
    })
}

pub(super) fn insert_remove(
    s: &DiscreteOperation,
    c: &DiscreteOperation,
) -> Result<OperationPair, TransformError> {
    let (StringInsert { id, index: si, value: sv, .. }, StringRemove { index: ci, value: cv, .. }) = (s, c)
    else {
        return Err(mismatch(s, c, OperationKind::StringInsert, OperationKind::StringRemove));
    };
    let (si, ci) = (*si, *ci);
    let c_end = ci + len(cv);
    Ok(if si <= ci {
        OperationPair::new(s.clone(), DiscreteOperation::string_remove(id, ci + len(sv), cv))
    } else if si >= c_end {
        OperationPair::new(DiscreteOperation::string_insert(id, si - len(cv), sv), c.clone())
    } else {
        OperationPair::new(
            DiscreteOperation::string_insert(id, ci, sv),
            split_remove(id, ci, cv, si, len(sv)),
        )
    })
}

pub(super) fn remove_insert(
    s: &DiscreteOperation,
    c: &DiscreteOperation,
) -> Result<OperationPair, TransformError> {
    let (StringRemove { id, index: si, value: sv, .. }, StringInsert { index: ci, value: cv, .. }) = (s, c)
    else {
        return Err(mismatch(s, c, OperationKind::StringRemove, OperationKind::StringInsert));
    };
    let (si, ci) = (*si, *ci);
    let s_end = si + len(sv);
    Ok(if ci <= si {
        OperationPair::new(DiscreteOperation::string_remove(id, si + len(cv), sv), c.clone())
    } else if ci >= s_end {
        OperationPair::new(s.clone(), DiscreteOperation::string_insert(id, ci - len(sv), cv))
    } else {
        OperationPair::new(
            split_remove(id, si, sv, ci, len(cv)),
            DiscreteOperation::string_insert(id, si, cv),
        )
    })
}

pub(super) fn remove_remove(
    s: &DiscreteOperation,
    c: &DiscreteOperation,
) -> Result<OperationPair, TransformError> {
    let (StringRemove { id, index: si, value: sv, .. }, StringRemove { index: ci, value: cv, .. }) = (s, c)
    else {
        return Err(mismatch(s, c, OperationKind::StringRemove, OperationKind::StringRemove));
    };
    let (si, ci) = (*si, *ci);
    let (sl, cl) = (len(sv), len(cv));
    let remove = |index: usize, value: String| DiscreteOperation::string_remove(id, index, value);

    use RangeRelationship::*;
    Ok(match range_range(si, si + sl, ci, ci + cl) {
        Precedes => OperationPair::new(s.clone(), remove(ci - sl, cv.clone())),
        PrecededBy => OperationPair::new(remove(si - cl, sv.clone()), c.clone()),
        Meets | Overlaps => {
            let delta = ci - si;
            OperationPair::new(remove(si, slice(sv, 0, delta)), remove(si, tail(cv, sl - delta)))
        }
        MetBy | OverlappedBy => {
            let delta = si - ci;
            OperationPair::new(remove(ci, tail(sv, cl - delta)), remove(ci, slice(cv, 0, delta)))
        }
        Starts => OperationPair::new(s.as_no_op(), remove(ci, tail(cv, sl))),
        StartedBy => OperationPair::new(remove(si, tail(sv, cl)), c.as_no_op()),
        Contains => {
            let start = ci - si;
            let end = start + cl;
            let kept = slice(sv, 0, start) + &tail(sv, end);
            OperationPair::new(remove(si, kept), c.as_no_op())
        }
        ContainedBy => {
            let start = si - ci;
            let end = start + sl;
            let kept = slice(cv, 0, start) + &tail(cv, end);
            OperationPair::new(s.as_no_op(), remove(ci, kept))
        }
        Finishes => OperationPair::new(s.as_no_op(), remove(ci, slice(cv, 0, cl - sl))),
        FinishedBy => OperationPair::new(remove(si, slice(sv, 0, sl - cl)), c.as_no_op()),
        EqualTo => OperationPair::new(s.as_no_op(), c.as_no_op()),
    })
}

/// Server set against a client edit: the set stands, the edit is dropped.
pub(super) fn win_as_set(
    s: &DiscreteOperation,
    c: &DiscreteOperation,
) -> Result<OperationPair, TransformError> {
    Ok(OperationPair::new(s.clone(), c.as_no_op()))
}

/// Server edit against a client set: the server edit is dropped.
pub(super) fn lose_to_set(
    s: &DiscreteOperation,
    c: &DiscreteOperation,
) -> Result<OperationPair, TransformError> {
    Ok(OperationPair::new(s.as_no_op(), c.clone()))
}
