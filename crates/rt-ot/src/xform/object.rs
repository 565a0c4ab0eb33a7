//! Object transforms. Edits to different keys commute; on the same key the
//! server's edit stands.

use super::{mismatch, OperationPair, TransformError};
use crate::ops::{DiscreteOperation, OperationKind};

fn key_of(op: &DiscreteOperation) -> Option<&str> {
    match op {
        DiscreteOperation::ObjectSet { key, .. } | DiscreteOperation::ObjectRemove { key, .. } => {
            Some(key.as_str())
        }
        _ => None,
    }
}

fn keys<'a>(
    s: &'a DiscreteOperation,
    c: &'a DiscreteOperation,
    expected: (OperationKind, OperationKind),
) -> Result<(&'a str, &'a str), TransformError> {
    if (s.kind(), c.kind()) != expected {
        return Err(mismatch(s, c, expected.0, expected.1));
    }
    match (key_of(s), key_of(c)) {
        (Some(sk), Some(ck)) => Ok((sk, ck)),
        _ => Err(mismatch(s, c, expected.0, expected.1)),
    }
}

pub(super) fn set_set(
    s: &DiscreteOperation,
    c: &DiscreteOperation,
) -> Result<OperationPair, TransformError> {
    let (sk, ck) = keys(s, c, (OperationKind::ObjectSet, OperationKind::ObjectSet))?;
    Ok(if sk == ck {
        OperationPair::new(s.clone(), c.as_no_op())
    } else {
        OperationPair::new(s.clone(), c.clone())
    })
}

pub(super) fn set_remove(
    s: &DiscreteOperation,
    c: &DiscreteOperation,
) -> Result<OperationPair, TransformError> {
    let (sk, ck) = keys(s, c, (OperationKind::ObjectSet, OperationKind::ObjectRemove))?;
    Ok(if sk == ck {
        OperationPair::new(s.clone(), c.as_no_op())
    } else {
        OperationPair::new(s.clone(), c.clone())
    })
}

pub(super) fn remove_set(
    s: &DiscreteOperation,
    c: &DiscreteOperation,
) -> Result<OperationPair, TransformError> {
    let (sk, ck) = keys(s, c, (OperationKind::ObjectRemove, OperationKind::ObjectSet))?;
    Ok(if sk == ck {
        OperationPair::new(s.clone(), c.as_no_op())
    } else {
        OperationPair::new(s.clone(), c.clone())
    })
}

pub(super) fn remove_remove(
    s: &DiscreteOperation,
    c: &DiscreteOperation,
) -> Result<OperationPair, TransformError> {
    let (sk, ck) = keys(s, c, (OperationKind::ObjectRemove, OperationKind::ObjectRemove))?;
    Ok(if sk == ck {
        OperationPair::new(s.as_no_op(), c.as_no_op())
    } else {
        OperationPair::new(s.clone(), c.clone())
    })
}

/// Server replaces the whole object: the client's keyed edit is dropped.
pub(super) fn win_as_set_value(
    s: &DiscreteOperation,
    c: &DiscreteOperation,
) -> Result<OperationPair, TransformError> {
    Ok(OperationPair::new(s.clone(), c.as_no_op()))
}

pub(super) fn lose_to_set_value(
    s: &DiscreteOperation,
    c: &DiscreteOperation,
) -> Result<OperationPair, TransformError> {
    Ok(OperationPair::new(s.as_no_op(), c.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::Operation;
    use crate::value::IdGenerator;

    #[test]
    fn same_key_sets_keep_server_value() {
        let mut ids = IdGenerator::new("t");
        let s = DiscreteOperation::object_set("o", "k", ids.number(1.0));
        let c = DiscreteOperation::object_set("o", "k", ids.number(2.0));
        let pair = set_set(&s, &c).unwrap();
        assert_eq!(pair.server, Operation::from(s));
        assert!(pair.client.is_no_op());
    }

    #[test]
    fn different_keys_commute() {
        let mut ids = IdGenerator::new("t");
        let s = DiscreteOperation::object_set("o", "a", ids.null());
        let c = DiscreteOperation::object_remove("o", "b");
        let pair = set_remove(&s, &c).unwrap();
        assert_eq!(pair, OperationPair::new(s, c));
    }

    #[test]
    fn same_key_removes_absorb_each_other() {
        let s = DiscreteOperation::object_remove("o", "k");
        let pair = remove_remove(&s, &s.clone()).unwrap();
        assert!(pair.server.is_no_op() && pair.client.is_no_op());
    }

    #[test]
    fn server_remove_beats_client_set() {
        let mut ids = IdGenerator::new("t");
        let s = DiscreteOperation::object_remove("o", "k");
        let c = DiscreteOperation::object_set("o", "k", ids.boolean(true));
        let pair = remove_set(&s, &c).unwrap();
        assert_eq!(pair.server, Operation::from(s));
        assert!(pair.client.is_no_op());
    }

    #[test]
    fn wrong_kinds_are_rejected() {
        let s = DiscreteOperation::object_remove("o", "k");
        assert!(matches!(
            set_set(&s, &s),
            Err(TransformError::KindMismatch { .. })
        ));
    }
}
