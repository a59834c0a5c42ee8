//! Shared plumbing for every tool executor: path normalization, shell
//! escaping, the Edit Guard with scoped auto-expand, and chunked hydration
//! (§4.3.6, §4.3.7, §4.3.9).

use push_ledger::Ledger;
use push_ledger::ReadObservation;
use push_ledger::WriteVerdict;
use push_protocol::PushErr;
use push_protocol::ledger_types::LineRange;
use push_sandbox_client::SandboxClient;
use std::collections::HashMap;

use crate::error_map::rpc_err_to_push_err;
use crate::provider::ModelProvider;

const HYDRATE_WINDOW: u32 = 400;

/// Everything a tool executor needs: the RPC client plus the session's
/// mutable derived state (ledger, version cache), and the collaborators
/// `prepare_commit` needs to invoke the Auditor gate.
pub struct ToolContext<'a> {
    pub sandbox: &'a SandboxClient,
    pub ledger: &'a mut Ledger,
    pub version_cache: &'a mut HashMap<String, String>,
    pub workspace_root: String,
    pub auditor: Option<&'a dyn ModelProvider>,
    pub auditor_model: Option<&'a str>,
}

/// Normalizes a path argument to an absolute path under `/workspace`
/// (§4.3.9): workspace-relative strings are prefixed, absolute paths pass
/// through, consecutive slashes are collapsed.
pub fn normalize_workspace_path(path: &str) -> String {
    let joined = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/workspace/{path}")
    };
    let mut collapsed = String::with_capacity(joined.len());
    let mut prev_slash = false;
    for c in joined.chars() {
        if c == '/' {
            if prev_slash {
                continue;
            }
            prev_slash = true;
        } else {
            prev_slash = false;
        }
        collapsed.push(c);
    }
    collapsed
}

/// Single-quote shell escaping: wraps `value` in single quotes, replacing
/// any embedded single quote with `'\''`.
pub fn shell_escape(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

pub enum GuardOutcome {
    Proceed,
    NewFile,
    Blocked(PushErr),
}

/// §4.3.6 Edit Guard with Scoped Auto-Expand.
pub async fn ensure_write_allowed(ctx: &mut ToolContext<'_>, path: &str) -> GuardOutcome {
    if ctx.ledger.check_write_allowed(path) == WriteVerdict::Allowed {
        return GuardOutcome::Proceed;
    }

    ctx.ledger.record_auto_expand_attempt();
    match ctx.sandbox.read(path.to_string(), None, None).await {
        Ok(resp) => {
            ctx.version_cache.insert(path.to_string(), resp.version.clone());
            if resp.truncated {
                match hydrate_full_content(ctx, path).await {
                    Ok((_content, version)) => {
                        ctx.version_cache.insert(path.to_string(), version);
                        ctx.ledger.record_auto_expand_success();
                        GuardOutcome::Proceed
                    }
                    Err(_) => GuardOutcome::Blocked(PushErr::EditGuardBlocked(format!(
                        "{path} is too large to fully hydrate; read narrower ranges first"
                    ))),
                }
            } else {
                ctx.ledger.record_read(
                    path,
                    ReadObservation { range: None, truncated: false },
                    None,
                );
                if ctx.ledger.check_write_allowed(path) == WriteVerdict::Allowed {
                    ctx.ledger.record_auto_expand_success();
                    GuardOutcome::Proceed
                } else {
                    GuardOutcome::Blocked(PushErr::EditGuardBlocked(format!(
                        "{path} still not fully covered after auto-expand"
                    )))
                }
            }
        }
        Err(rpc_err) => {
            let push_err = rpc_err_to_push_err(rpc_err);
            if matches!(push_err, PushErr::FileNotFound(_)) {
                ctx.ledger.record_creation(path);
                ctx.ledger.record_auto_expand_success();
                GuardOutcome::NewFile
            } else {
                GuardOutcome::Blocked(PushErr::EditGuardBlocked(format!(
                    "auto-expand read of {path} failed: {push_err}"
                )))
            }
        }
    }
}

/// §4.3.7 Chunked Hydration: reads `path` in ~400-line windows starting at
/// line 1 until a window returns fewer than a full window (EOF) or reports
/// truncated despite being a narrow range (payload-limit truncation,
/// unrecoverable).
pub async fn hydrate_full_content(
    ctx: &mut ToolContext<'_>,
    path: &str,
) -> Result<(String, String), PushErr> {
    let mut collected = String::new();
    let mut start = 1u32;
    let mut last_version = String::new();
    loop {
        let end = start + HYDRATE_WINDOW - 1;
        let resp = ctx
            .sandbox
            .read(path.to_string(), Some(start), Some(end))
            .await
            .map_err(rpc_err_to_push_err)?;
        last_version = resp.version.clone();
        let window_lines = resp.content.lines().count() as u32;
        let at_eof = window_lines < HYDRATE_WINDOW;

        if resp.truncated && !at_eof {
            return Err(PushErr::EditGuardBlocked(format!(
                "{path} hit a payload-limit truncation while hydrating at line {start}"
            )));
        }

        collected.push_str(&resp.content);
        if at_eof {
            break;
        }
        start = end + 1;
    }
    Ok((collected, last_version))
}

/// `record_read` observation builder for a whole-file, non-truncated read
/// starting at line 1 (§4.3.1: treated as `fully_read` even from a range
/// request).
pub fn full_read_observation(start: Option<u32>, end: Option<u32>, truncated: bool) -> ReadObservation {
    match (start, end) {
        (Some(s), Some(e)) => ReadObservation { range: Some(LineRange::new(s, e)), truncated },
        _ => ReadObservation { range: None, truncated },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_relative_path_under_workspace() {
        assert_eq!(normalize_workspace_path("src/a.ts"), "/workspace/src/a.ts");
    }

    #[test]
    fn absolute_path_passes_through_collapsing_slashes() {
        assert_eq!(normalize_workspace_path("/workspace//src///a.ts"), "/workspace/src/a.ts");
    }

    #[test]
    fn shell_escape_wraps_and_escapes_single_quotes() {
        assert_eq!(shell_escape("it's"), "'it'\\''s'");
        assert_eq!(shell_escape("plain"), "'plain'");
    }
}
