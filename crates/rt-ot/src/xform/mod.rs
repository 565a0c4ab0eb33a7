//! Operational transformation.
//!
//! Given a server operation `s` and a concurrent client operation `c` that
//! were both generated against the same document state, a transform
//! produces `(s', c')` such that applying `s` then `c'` yields the same state
//! as applying `c` then `s'`.
//!
//! Per-kind algorithms live in the submodules and are looked up through the
//! [`TransformRegistry`]. [`Transformer`] is the entry point: it short-cuts
//! no-ops and operations on unrelated values, dispatches discrete pairs to
//! the registry, and folds compound operations member by member.
//!
//! Ties are always resolved in favour of the server operation: concurrent
//! inserts at the same position place the server's content first, and
//! conflicting sets keep the server's value.

pub mod registry;
pub mod reference;

mod array;
mod boolean;
mod number;
mod object;
mod string;

pub use registry::{TransformFn, TransformRegistry};

use thiserror::Error;

use crate::ops::{DiscreteOperation, Operation, OperationKind};

/// The result of transforming two concurrent operations against each other.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationPair {
    /// The server operation, rewritten to apply after the client operation.
    pub server: Operation,
    /// The client operation, rewritten to apply after the server operation.
    pub client: Operation,
}

impl OperationPair {
    pub fn new(server: impl Into<Operation>, client: impl Into<Operation>) -> Self {
        Self {
            server: server.into(),
            client: client.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransformError {
    #[error("no transform registered for ({server}, {client})")]
    NoTransform {
        server: OperationKind,
        client: OperationKind,
    },
    #[error("transform for ({expected_server}, {expected_client}) invoked with ({server}, {client})")]
    KindMismatch {
        expected_server: OperationKind,
        expected_client: OperationKind,
        server: OperationKind,
        client: OperationKind,
    },
}

pub(crate) fn mismatch(
    s: &DiscreteOperation,
    c: &DiscreteOperation,
    expected_server: OperationKind,
    expected_client: OperationKind,
) -> TransformError {
    TransformError::KindMismatch {
        expected_server,
        expected_client,
        server: s.kind(),
        client: c.kind(),
    }
}

/// Drives transforms over discrete and compound operations.
#[derive(Debug, Clone, Default)]
pub struct Transformer {
    registry: TransformRegistry,
}

impl Transformer {
    pub fn new(registry: TransformRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &TransformRegistry {
        &self.registry
    }

    /// Transform `server` against `client`.
    ///
    /// A compound server operation is folded member by member against the
    /// (progressively transformed) client operation, and vice versa, so the
    /// result of each step stays valid against the state the next member
    /// expects.
    pub fn transform(&self, server: &Operation, client: &Operation) -> Result<OperationPair, TransformError> {
        match (server, client) {
            (Operation::Discrete(s), Operation::Discrete(c)) => self.transform_discrete(s, c),
            (Operation::Compound(s), _) => {
                let mut client = client.clone();
                let mut out = Vec::with_capacity(s.ops.len());
                for member in &s.ops {
                    let pair = self.transform(&Operation::Discrete(member.clone()), &client)?;
                    out.push(pair.server);
                    client = pair.client;
                }
                Ok(OperationPair {
                    server: Operation::concat(out),
                    client,
                })
            }
            (Operation::Discrete(_), Operation::Compound(c)) => {
                let mut server = server.clone();
                let mut out = Vec::with_capacity(c.ops.len());
                for member in &c.ops {
                    let pair = self.transform(&server, &Operation::Discrete(member.clone()))?;
                    server = pair.server;
                    out.push(pair.client);
                }
                Ok(OperationPair {
                    server,
                    client: Operation::concat(out),
                })
            }
        }
    }

    /// Transform two discrete operations.
    pub fn transform_discrete(
        &self,
        s: &DiscreteOperation,
        c: &DiscreteOperation,
    ) -> Result<OperationPair, TransformError> {
        if s.is_no_op() || c.is_no_op() || s.id() != c.id() {
            return Ok(OperationPair::new(s.clone(), c.clone()));
        }
        let f = self
            .registry
            .get(s.kind(), c.kind())
            .ok_or(TransformError::NoTransform {
                server: s.kind(),
                client: c.kind(),
            })?;
        f(s, c)
    }
}
