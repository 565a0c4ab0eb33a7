//! Positional adjustment of offsets anchored in string or array content.
//!
//! Uses the same rules as the data transforms: an offset at or after an
//! insertion point shifts right, an offset inside a removed span clamps to
//! the start of the span, an offset after it shifts left.

use crate::ops::DiscreteOperation;
use crate::range::{range_index, RangeIndexRelationship};

use super::array::moved_index;

pub fn index_after_insert(index: usize, at: usize, len: usize) -> usize {
    if index >= at {
        index + len
    } else {
        index
    }
}

pub fn index_after_remove(index: usize, at: usize, len: usize) -> usize {
    match range_index(at, at + len, index) {
        RangeIndexRelationship::Before | RangeIndexRelationship::Start => index,
        RangeIndexRelationship::Within => at,
        RangeIndexRelationship::End | RangeIndexRelationship::After => index - len,
    }
}

pub fn index_after_move(index: usize, from: usize, to: usize) -> usize {
    moved_index(index, from, to)
}

/// New position of `index` after `op` has been applied to the value it
/// targets, or `None` if the op replaced the value's content wholesale.
///
/// Ops that do not shift positions (replace, and ops on non-positional
/// kinds) return the index unchanged.
pub fn transform_index(op: &DiscreteOperation, index: usize) -> Option<usize> {
    if op.is_no_op() {
        return Some(index);
    }
    match op {
        DiscreteOperation::StringInsert { index: at, value, .. } => {
            Some(index_after_insert(index, *at, value.chars().count()))
        }
        DiscreteOperation::StringRemove { index: at, value, .. } => {
            Some(index_after_remove(index, *at, value.chars().count()))
        }
        DiscreteOperation::ArrayInsert { index: at, .. } => Some(index_after_insert(index, *at, 1)),
        DiscreteOperation::ArrayRemove { index: at, .. } => Some(index_after_remove(index, *at, 1)),
        DiscreteOperation::ArrayMove { from_index, to_index, .. } => {
            Some(index_after_move(index, *from_index, *to_index))
        }
        DiscreteOperation::StringSet { .. } | DiscreteOperation::ArraySet { .. } => None,
        _ => Some(index),
    }
}

/// [`transform_index`] over both ends of a `[start, end)` selection.
pub fn transform_range(op: &DiscreteOperation, start: usize, end: usize) -> Option<(usize, usize)> {
    let a = transform_index(op, start)?;
    let b = transform_index(op, end)?;
    // A move can carry one end past the other.
    Some((a.min(b), a.max(b)))
}
