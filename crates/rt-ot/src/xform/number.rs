//! Number transforms. Deltas commute with each other; a set absorbs any
//! concurrent delta so both orders land on the same value.

use super::{mismatch, OperationPair, TransformError};
use crate::ops::{DiscreteOperation, OperationKind};

use DiscreteOperation::{NumberAdd, NumberSet};

pub(super) fn add_add(
    s: &DiscreteOperation,
    c: &DiscreteOperation,
) -> Result<OperationPair, TransformError> {
    let (NumberAdd { .. }, NumberAdd { .. }) = (s, c) else {
        return Err(mismatch(s, c, OperationKind::NumberAdd, OperationKind::NumberAdd));
    };
    Ok(OperationPair::new(s.clone(), c.clone()))
}

pub(super) fn add_set(
    s: &DiscreteOperation,
    c: &DiscreteOperation,
) -> Result<OperationPair, TransformError> {
    let (NumberAdd { id, value: delta, .. }, NumberSet { value, .. }) = (s, c) else {
        return Err(mismatch(s, c, OperationKind::NumberAdd, OperationKind::NumberSet));
    };
    Ok(OperationPair::new(s.clone(), DiscreteOperation::number_set(id, value + delta)))
}

pub(super) fn set_add(
    s: &DiscreteOperation,
    c: &DiscreteOperation,
) -> Result<OperationPair, TransformError> {
    let (NumberSet { id, value, .. }, NumberAdd { value: delta, .. }) = (s, c) else {
        return Err(mismatch(s, c, OperationKind::NumberSet, OperationKind::NumberAdd));
    };
    Ok(OperationPair::new(DiscreteOperation::number_set(id, value + delta), c.clone()))
}

pub(super) fn set_set(
    s: &DiscreteOperation,
    c: &DiscreteOperation,
) -> Result<OperationPair, TransformError> {
    let (NumberSet { .. }, NumberSet { .. }) = (s, c) else {
        return Err(mismatch(s, c, OperationKind::NumberSet, OperationKind::NumberSet));
    };
    Ok(OperationPair::new(s.clone(), c.as_no_op()))
}
