//! Collector error types.

use gc_types::{GcRef, Handle, TypeTag};
use thiserror::Error;

/// Errors reported by the collector.
///
/// Heap corruption is never reported through this type; it aborts the
/// process.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GcError {
    /// Allocation failed after a full collection.
    #[error("out of memory: could not allocate {requested} bytes after a full collection")]
    OutOfMemory {
        /// Total object size that was requested, header included
        requested: usize,
    },

    /// Configuration rejected by [`crate::GcConfig::validate`].
    #[error("invalid collector configuration: {0}")]
    InvalidConfig(String),

    /// An old-generation cycle is already running.
    #[error("an old-generation collection cycle is already in progress")]
    CycleInProgress,

    /// A black object references a white one during marking.
    #[error("tri-color invariant violated: black object {holder} references white object {child}")]
    BarrierInvariantViolation {
        /// The black object
        holder: GcRef,
        /// The white object it references
        child: GcRef,
    },

    /// A field access on an address where no live object starts, outside
    /// the object's payload, or misaligned.
    #[error("offset {offset} is not a field of object {object}")]
    InvalidSlot {
        /// Object being accessed
        object: GcRef,
        /// Payload byte offset
        offset: usize,
    },

    /// A reference load or store at a payload word the object visitor does
    /// not report as a reference.
    #[error("offset {offset} of object {object} is not a reference field")]
    NotAReference {
        /// Object being accessed
        object: GcRef,
        /// Payload byte offset
        offset: usize,
    },

    /// A reference store whose value is not an object of this heap.
    #[error("{0} is not an object of this heap")]
    ForeignReference(GcRef),

    /// Allocation with a type tag the object visitor does not know.
    #[error("unknown type tag {0:?}")]
    UnknownType(TypeTag),

    /// A released or never-issued handle.
    #[error("unknown handle {0}")]
    UnknownHandle(Handle),
}

/// Result type for collector operations.
pub type GcResult<T> = Result<T, GcError>;
