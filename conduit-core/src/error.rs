//! Error taxonomy. Variants are grouped by *behavioral* category rather
//! than exposing internal type names to callers; each carries enough
//! structure that a caller can decide retry vs. surface vs. abort without
//! string-matching the message.

use std::fmt;

pub type Result<T> = std::result::Result<T, ConduitError>;

#[derive(thiserror::Error, Debug)]
pub enum ConduitError {
    /// Transient network / unavailable peer. Retried with backoff by the
    /// caller; never surfaced directly to a job submitter.
    #[error("transient RPC failure contacting {target}: {source}")]
    Transient {
        target: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Leader mismatch / stale fencing. The caller should re-discover the
    /// current leader and retry.
    #[error("fencing token mismatch: expected {expected}, got {actual}")]
    FencingMismatch { expected: String, actual: String },

    /// Slot request unfulfillable or timed out.
    #[error("allocation {allocation_id} failed: {reason}")]
    AllocationFailed {
        allocation_id: String,
        reason: String,
    },

    /// Exception in operator code, I/O, or the state backend while a task
    /// was running. Routed to the `FailureHandler`.
    #[error("task {execution_attempt_id} failed: {cause}")]
    TaskFailure {
        execution_attempt_id: String,
        cause: String,
    },

    /// A subtask could not complete its local snapshot. Never promoted to
    /// a task failure unless the task itself became irrecoverable.
    #[error("checkpoint {checkpoint_id} declined by {execution_attempt_id}: {cause}")]
    CheckpointDeclined {
        checkpoint_id: u64,
        execution_attempt_id: String,
        cause: String,
    },

    /// Unrecoverable invariant violation. Never retried; escalates to
    /// cluster shutdown via the `FatalErrorHandler`.
    #[error("fatal invariant violation: {0}")]
    Fatal(String),

    /// A request exceeded its configured timeout.
    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Catch-all for invariant/precondition violations not otherwise
    /// categorized.
    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ConduitError {
    pub fn internal(msg: impl fmt::Display) -> Self {
        ConduitError::Internal(msg.to_string())
    }

    pub fn fatal(msg: impl fmt::Display) -> Self {
        ConduitError::Fatal(msg.to_string())
    }

    pub fn transient(target: impl Into<String>, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        ConduitError::Transient {
            target: target.into(),
            source: Box::new(source),
        }
    }

    /// Whether this error category should be retried locally rather than
    /// surfaced to the scheduler/caller.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            ConduitError::Transient { .. } | ConduitError::FencingMismatch { .. } | ConduitError::Timeout(_)
        )
    }

    /// Whether this error is fatal and must never be retried or restarted.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ConduitError::Fatal(_))
    }
}

impl From<ConduitError> for tonic::Status {
    fn from(err: ConduitError) -> Self {
        match err {
            ConduitError::FencingMismatch { .. } => tonic::Status::failed_precondition(err.to_string()),
            ConduitError::Timeout(_) => tonic::Status::deadline_exceeded(err.to_string()),
            ConduitError::AllocationFailed { .. } | ConduitError::TaskFailure { .. } => {
                tonic::Status::aborted(err.to_string())
            }
            ConduitError::CheckpointDeclined { .. } => tonic::Status::aborted(err.to_string()),
            ConduitError::Fatal(_) => tonic::Status::internal(err.to_string()),
            _ => tonic::Status::internal(err.to_string()),
        }
    }
}

/// The single sanctioned path for aborting an endpoint's process on a
/// fatal invariant violation. Production binaries install a handler that
/// logs and exits; tests install one that records the call.
pub trait FatalErrorHandler: Send + Sync {
    fn on_fatal_error(&self, err: &ConduitError);
}

pub struct LoggingFatalErrorHandler;

impl FatalErrorHandler for LoggingFatalErrorHandler {
    fn on_fatal_error(&self, err: &ConduitError) {
        tracing::error!(error = %err, "fatal error, aborting endpoint");
    }
}
