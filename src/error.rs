//! Error types for genome operations.

use thiserror::Error;

/// Result type for genome operations.
pub type NeatResult<T> = Result<T, NeatError>;

/// Recoverable failures surfaced by the genome core.
///
/// None of these are fatal; the population layer decides whether to retry,
/// skip the genome, or abort the run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NeatError {
    /// `evaluate` was called with the wrong number of inputs.
    #[error("expected {expected} inputs, got {actual}")]
    InvalidInputShape { expected: usize, actual: usize },

    /// The genome carries no gene with this innovation id.
    #[error("no gene with innovation {0} in this genome")]
    UnknownInnovation(u64),

    /// A structural mutation found nothing it could apply to.
    #[error("mutation cannot be satisfied: {0}")]
    UnsatisfiableMutation(&'static str),

    /// A node id that does not belong to this genome.
    #[error("no node with id {0} in this genome")]
    UnknownNode(u32),

    /// An edge whose endpoints share a layer.
    #[error("cannot connect node {from} to node {to}: edges must cross layers")]
    InvalidConnection { from: u32, to: u32 },

    /// A serialized genome that breaks the node-layout or gene invariants.
    #[error("invalid genome snapshot: {0}")]
    InvalidSnapshot(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
