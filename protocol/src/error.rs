//! The closed error taxonomy of `(type, retryable, message, detail?)` from
//! the error handling design: every tool executor folds failures into this
//! enum instead of raising out of band.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PushErr>;

#[derive(Error, Debug, Clone)]
pub enum PushErr {
    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("timed out: {0}")]
    ExecTimeout(String),

    #[error("sandbox unreachable: {0}")]
    SandboxUnreachable(String),

    #[error("stale file: expected version {expected}, current version {current}")]
    StaleFile { expected: String, current: String },

    #[error("edit guard blocked: {0}")]
    EditGuardBlocked(String),

    #[error("edit hash mismatch: {0}")]
    EditHashMismatch(String),

    #[error("auth failure: {0}")]
    AuthFailure(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("write failed: {0}")]
    WriteFailed(String),

    #[error("unknown error: {0}")]
    Unknown(String),
}

impl PushErr {
    /// The stable taxonomy name used in `error_type:` lines surfaced to the
    /// model and in `events.jsonl`.
    pub fn type_name(&self) -> &'static str {
        match self {
            PushErr::FileNotFound(_) => "FILE_NOT_FOUND",
            PushErr::ExecTimeout(_) => "EXEC_TIMEOUT",
            PushErr::SandboxUnreachable(_) => "SANDBOX_UNREACHABLE",
            PushErr::StaleFile { .. } => "STALE_FILE",
            PushErr::EditGuardBlocked(_) => "EDIT_GUARD_BLOCKED",
            PushErr::EditHashMismatch(_) => "EDIT_HASH_MISMATCH",
            PushErr::AuthFailure(_) => "AUTH_FAILURE",
            PushErr::RateLimited(_) => "RATE_LIMITED",
            PushErr::WriteFailed(_) => "WRITE_FAILED",
            PushErr::Unknown(_) => "UNKNOWN",
        }
    }

    /// Whether the RPC layer (or the model, for tool-level errors) may retry
    /// this failure automatically. See §7 of the design: the round-level
    /// timeout and loop-guard are the only circuit breakers, so tool
    /// executors never retry on their own — this flag is informational,
    /// surfaced to the model in the tool result text.
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            PushErr::ExecTimeout(_)
                | PushErr::SandboxUnreachable(_)
                | PushErr::RateLimited(_)
                | PushErr::WriteFailed(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_file_is_not_retryable() {
        let err = PushErr::StaleFile {
            expected: "v1".into(),
            current: "v2".into(),
        };
        assert_eq!(err.type_name(), "STALE_FILE");
        assert!(!err.retryable());
    }

    #[test]
    fn exec_timeout_is_retryable() {
        let err = PushErr::ExecTimeout("round streaming".into());
        assert!(err.retryable());
    }
}
