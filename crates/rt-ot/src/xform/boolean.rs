//! Boolean transforms. Only sets exist, and the server's set wins.

use super::{mismatch, OperationPair, TransformError};
use crate::ops::{DiscreteOperation, OperationKind};

/// Concurrent sets: the server's value stands.
pub(super) fn set_set(
    s: &DiscreteOperation,
    c: &DiscreteOperation,
) -> Result<OperationPair, TransformError> {
    let (DiscreteOperation::BooleanSet { .. }, DiscreteOperation::BooleanSet { .. }) = (s, c) else {
        return Err(mismatch(s, c, OperationKind::BooleanSet, OperationKind::BooleanSet));
    };
    Ok(OperationPair::new(s.clone(), c.as_no_op()))
}
