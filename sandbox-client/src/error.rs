use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum RpcError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("retry limit exceeded after {0} attempts")]
    RetryLimit(u64),

    #[error("sandbox error {code}: {message}")]
    Structured {
        code: String,
        message: String,
        details: Option<String>,
    },
}

impl RpcError {
    /// 4xx-shaped structured errors are not retried; transport errors,
    /// timeouts, and 5xx-coded structured errors are.
    pub fn is_retryable(&self) -> bool {
        match self {
            RpcError::Transport(_) | RpcError::Timeout(_) => true,
            RpcError::RetryLimit(_) => false,
            RpcError::Structured { code, .. } => {
                matches!(code.as_str(), "MODAL_TIMEOUT" | "MODAL_NETWORK_ERROR")
            }
        }
    }
}
