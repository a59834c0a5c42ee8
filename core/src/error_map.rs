//! Maps the sandbox RPC client's transport-level error taxonomy onto the
//! tool layer's closed error taxonomy (§7).

use push_protocol::PushErr;
use push_sandbox_client::error::RpcError;

pub fn rpc_err_to_push_err(err: RpcError) -> PushErr {
    match err {
        RpcError::Transport(msg) => {
            if push_sandbox_client::is_not_found_error(&msg) {
                PushErr::FileNotFound(msg)
            } else {
                PushErr::SandboxUnreachable(msg)
            }
        }
        RpcError::Timeout(d) => PushErr::ExecTimeout(format!("sandbox rpc timed out after {d:?}")),
        RpcError::RetryLimit(attempts) => {
            PushErr::SandboxUnreachable(format!("gave up after {attempts} attempts"))
        }
        RpcError::Structured { code, message, details } => match code.as_str() {
            "MODAL_NOT_CONFIGURED" | "AUTH_FAILURE" | "UNAUTHORIZED" => {
                PushErr::AuthFailure(message)
            }
            "RATE_LIMITED" | "TOO_MANY_REQUESTS" => PushErr::RateLimited(message),
            "FILE_NOT_FOUND" | "ENOENT" => PushErr::FileNotFound(message),
            "MODAL_TIMEOUT" => PushErr::ExecTimeout(message),
            _ => PushErr::Unknown(details.unwrap_or(message)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_not_found_message_maps_to_file_not_found() {
        let err = rpc_err_to_push_err(RpcError::Transport("no such file or directory".to_string()));
        assert!(matches!(err, PushErr::FileNotFound(_)));
    }

    #[test]
    fn transport_other_message_maps_to_sandbox_unreachable() {
        let err = rpc_err_to_push_err(RpcError::Transport("connection reset by peer".to_string()));
        assert!(matches!(err, PushErr::SandboxUnreachable(_)));
    }
}
