//! Operational transformation engine for realtime data models.
//!
//! The crate is organised leaves first:
//!
//! - [`range`]: the 13-way interval relationship classifier used by every
//!   positional transform.
//! - [`value`]: [`DataValue`], the id-addressed value snapshot that
//!   operations carry, plus id generation.
//! - [`ops`]: the closed set of discrete operations, compound batches and
//!   applied operations (with `inverse`).
//! - [`xform`]: pairwise transform functions, the registry keyed by
//!   operation kind, and the [`Transformer`] that drives compound transforms.
//!
//! Nothing here holds mutable document state; the model tree and the
//! synchronization state machine live in the `rt-model` crate.

pub mod range;
pub mod value;
pub mod ops;
pub mod xform;

pub use ops::{AppliedOperation, CompoundOperation, DiscreteOperation, Operation, OperationKind};
pub use range::{RangeIndexRelationship, RangeRelationship};
pub use value::{DataValue, IdGenerator, ValueData, ValueKind};
pub use xform::{OperationPair, TransformError, TransformRegistry, Transformer};
