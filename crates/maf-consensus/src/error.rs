//! Consensus error types.

use thiserror::Error;

pub type ConsensusResult<T> = Result<T, ConsensusError>;

/// Errors surfaced by the consensus engine.
#[derive(Debug, Error)]
pub enum ConsensusError {
    /// The operation requires leadership and the local node is not the
    /// leader. Callers redirect to the advertised leader.
    #[error("not a leader")]
    NotALeader,

    /// The engine has not finished its init sequence yet.
    #[error("consensus is not initialized")]
    NotInitialized,

    /// A command did not commit within the apply deadline.
    #[error("apply timed out")]
    Timeout,

    /// Wrapped error from the underlying raft implementation.
    #[error("raft error: {0}")]
    Raft(String),

    /// Log, stable or snapshot storage failure.
    #[error("storage error: {0}")]
    Storage(String),

    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),
}
