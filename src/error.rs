//! Error types for yggdrasil-core.

use thiserror::Error;

/// Result type alias using yggdrasil-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Domain errors produced by the validation and memory pipeline.
///
/// These are transport-agnostic; an external HTTP layer is expected to map
/// them onto the boundary error taxonomy (400/401/408/429/500) itself.
#[derive(Error, Debug)]
pub enum Error {
    /// A transition to `VERIFIED` was attempted without a qualifying anchor
    /// source (I3).
    #[error("verification unsupported: {reason}")]
    VerificationUnsupported { reason: String },

    /// A write would place a node's `branch` and `confidence` in
    /// inconsistent partitions (I1), or a branch handler wrote outside the
    /// branch it owns.
    #[error("branch violation: {0}")]
    BranchViolation(String),

    /// A referenced node, checkpoint, or source id does not exist.
    #[error("not found: {kind} {id}")]
    NotFound { kind: &'static str, id: String },

    /// An adapter has no usable configuration (missing API key, etc.) and is
    /// skipped rather than failed.
    #[error("adapter unavailable: {member}")]
    AdapterUnavailable { member: String },

    /// An adapter call exceeded its per-call timeout; counted as a
    /// non-response, not a failure.
    #[error("adapter timeout: {member} after {duration_ms}ms")]
    AdapterTimeout { member: String, duration_ms: u64 },

    /// Council arbitration produced `SPLIT` or `DEADLOCK` with consensus
    /// required; surfaces to the pipeline as a `NO_CONSENSUS` refusal.
    #[error("consensus not reached: {0}")]
    ConsensusNotReached(String),

    /// The request's deadline (`maxTimeMs`) elapsed before the pipeline
    /// could complete; surfaces as a `TIMEOUT` refusal.
    #[error("deadline exceeded after {elapsed_ms}ms (limit {limit_ms}ms)")]
    DeadlineExceeded { elapsed_ms: u64, limit_ms: u64 },

    /// A persistent-store write failed and could not be replayed; fatal,
    /// propagated to the caller.
    #[error("persistence failure: {0}")]
    PersistenceFailure(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error (missing/invalid environment variable).
    #[error("configuration error: {0}")]
    Config(String),

    /// Invariant violation that should be unreachable in correct operation.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a verification-unsupported error.
    pub fn verification_unsupported(reason: impl Into<String>) -> Self {
        Self::VerificationUnsupported {
            reason: reason.into(),
        }
    }

    /// Create a branch-violation error.
    pub fn branch_violation(message: impl Into<String>) -> Self {
        Self::BranchViolation(message.into())
    }

    /// Create a not-found error.
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Create an adapter-unavailable error.
    pub fn adapter_unavailable(member: impl Into<String>) -> Self {
        Self::AdapterUnavailable {
            member: member.into(),
        }
    }

    /// Create an adapter-timeout error.
    pub fn adapter_timeout(member: impl Into<String>, duration_ms: u64) -> Self {
        Self::AdapterTimeout {
            member: member.into(),
            duration_ms,
        }
    }

    /// Create a consensus-not-reached error.
    pub fn consensus_not_reached(message: impl Into<String>) -> Self {
        Self::ConsensusNotReached(message.into())
    }

    /// Create a deadline-exceeded error.
    pub fn deadline_exceeded(elapsed_ms: u64, limit_ms: u64) -> Self {
        Self::DeadlineExceeded {
            elapsed_ms,
            limit_ms,
        }
    }

    /// Create a persistence-failure error.
    pub fn persistence_failure(message: impl Into<String>) -> Self {
        Self::PersistenceFailure(message.into())
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::PersistenceFailure(err.to_string())
    }
}
