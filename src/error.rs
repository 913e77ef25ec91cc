//! Error type for pool operations.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type PoolResult<T> = Result<T, PoolError>;

/// Pool operation errors.
#[must_use = "errors should be handled"]
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// A chunk or big block could not be obtained, or the request exceeds
    /// [`MAX_ALLOCATION`](crate::MAX_ALLOCATION).
    #[error("out of memory: could not provide {requested} bytes")]
    NoMemory {
        /// Bytes asked for by the caller.
        requested: usize,
    },

    /// The caller broke a parameter contract.
    #[error("invalid parameter: {reason}")]
    InvalidParameter {
        /// What was wrong.
        reason: &'static str,
    },

    /// The validator found a broken invariant in the mark chain.
    #[error("structural invariant violated at mark depth {depth}: {reason}")]
    StructuralInvalid {
        /// Depth of the offending mark (0 = bottom).
        depth: usize,
        /// Which invariant failed.
        reason: &'static str,
    },

    /// The last allocation cannot grow in place and moving it was not allowed.
    #[error("cannot grow last allocation by {requested} bytes without moving it")]
    WouldMove {
        /// Increment asked for by the caller.
        requested: usize,
    },
}

impl PoolError {
    /// Stable short code for categorization.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::NoMemory { .. } => "POOL:NOMEM",
            Self::InvalidParameter { .. } => "POOL:PARAM",
            Self::StructuralInvalid { .. } => "POOL:STRUCTURE",
            Self::WouldMove { .. } => "POOL:MOVE",
        }
    }

    pub(crate) const fn no_memory(requested: usize) -> Self {
        Self::NoMemory { requested }
    }

    pub(crate) const fn structural(depth: usize, reason: &'static str) -> Self {
        Self::StructuralInvalid { depth, reason }
    }
}
