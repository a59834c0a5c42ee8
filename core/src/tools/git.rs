//! `diff`, `prepare_commit`, `push`, `save_draft`, and `promote_to_github`
//! (§4.3.5 and the CLI-surface tools table).

use push_protocol::PushErr;
use push_protocol::ToolName;
use push_protocol::ToolResult;
use push_protocol::tool::SideEffect;
use serde_json::Value;

use crate::auditor::Verdict;
use crate::auditor::run_auditor;
use crate::error_map::rpc_err_to_push_err;
use crate::tool_layer::ToolContext;
use crate::tool_layer::shell_escape;
use crate::tools::optional_str;
use crate::tools::require_str;

pub async fn diff(ctx: &mut ToolContext<'_>) -> ToolResult {
    match ctx.sandbox.diff().await {
        Ok(resp) => ToolResult::success(
            ToolName::Diff,
            format!(
                "{} files changed, {} insertions(+), {} deletions(-)\n\n{}",
                resp.files_changed, resp.insertions, resp.deletions, resp.diff
            ),
        ),
        Err(e) => ToolResult::failure(ToolName::Diff, &rpc_err_to_push_err(e)),
    }
}

/// §4.3.5: fetches the diff; if empty, returns a diagnostic. Otherwise
/// invokes the Auditor and, on a `safe` verdict, returns a pending review
/// artifact — the tool itself never commits.
pub async fn prepare_commit(ctx: &mut ToolContext<'_>, args: Value) -> ToolResult {
    let message = match require_str(&args, "message") {
        Ok(m) => m.to_string(),
        Err(msg) => return ToolResult::failure(ToolName::PrepareCommit, &PushErr::Unknown(msg)),
    };

    let diff_resp = match ctx.sandbox.diff().await {
        Ok(d) => d,
        Err(e) => return ToolResult::failure(ToolName::PrepareCommit, &rpc_err_to_push_err(e)),
    };

    if diff_resp.diff.trim().is_empty() {
        return ToolResult::success(
            ToolName::PrepareCommit,
            format!("nothing to commit\nporcelain status:\n{}", diff_resp.porcelain_status),
        );
    }

    let report = run_auditor(ctx.auditor, ctx.auditor_model, &diff_resp.diff).await;
    let report_json = serde_json::to_string_pretty(&report).unwrap_or_default();

    if report.verdict == Verdict::Unsafe {
        return ToolResult::success(
            ToolName::PrepareCommit,
            format!("audit verdict: unsafe, commit blocked\n\n{report_json}"),
        );
    }

    let review = serde_json::json!({
        "diff_stats": {
            "files_changed": diff_resp.files_changed,
            "insertions": diff_resp.insertions,
            "deletions": diff_resp.deletions,
        },
        "audit_verdict": report,
        "proposed_message": message,
        "status": "pending",
    });
    ToolResult::success(
        ToolName::PrepareCommit,
        format!("commit review staged, awaiting external approval\n\n{}", serde_json::to_string_pretty(&review).unwrap_or_default()),
    )
}

/// The deferred/approval design (Open Question in §9): the actual commit and
/// push happen out-of-band once the external caller approves the staged
/// review artifact from `prepare_commit`. This helper performs that commit;
/// it is invoked by `push-cli`'s `push approve` subcommand, never by the
/// model directly.
pub async fn commit_approved_review(ctx: &mut ToolContext<'_>, message: &str) -> ToolResult {
    let escaped = shell_escape(message);
    let command = format!("git add -A && git commit -m {escaped}");
    match ctx.sandbox.exec(command, None).await {
        Ok(resp) if resp.exit_code == 0 => {
            ToolResult::success(ToolName::PrepareCommit, format!("committed\n{}", resp.stdout))
        }
        Ok(resp) => ToolResult::failure(
            ToolName::PrepareCommit,
            &PushErr::WriteFailed(format!("git commit exited {}: {}", resp.exit_code, resp.stderr)),
        ),
        Err(e) => ToolResult::failure(ToolName::PrepareCommit, &rpc_err_to_push_err(e)),
    }
}

pub async fn push(ctx: &mut ToolContext<'_>) -> ToolResult {
    match ctx.sandbox.exec("git push".to_string(), None).await {
        Ok(resp) if resp.exit_code == 0 => ToolResult::success(ToolName::Push, resp.stdout),
        Ok(resp) => ToolResult::failure(
            ToolName::Push,
            &PushErr::WriteFailed(format!("git push exited {}: {}", resp.exit_code, resp.stderr)),
        ),
        Err(e) => ToolResult::failure(ToolName::Push, &rpc_err_to_push_err(e)),
    }
}

/// Stage-commit-push without the Auditor (§4.3 table); creates or reuses a
/// `draft/...` branch and surfaces the branch switch as a side effect.
pub async fn save_draft(ctx: &mut ToolContext<'_>, args: Value) -> ToolResult {
    let branch = match require_str(&args, "branch") {
        Ok(b) => b.to_string(),
        Err(msg) => return ToolResult::failure(ToolName::SaveDraft, &PushErr::Unknown(msg)),
    };
    if !branch.starts_with("draft/") {
        return ToolResult::failure(
            ToolName::SaveDraft,
            &PushErr::Unknown(format!("draft branch name must start with draft/, got {branch}")),
        );
    }
    let message = optional_str(&args, "message").unwrap_or("draft checkpoint");

    let command = format!(
        "git checkout -B {} && git add -A && git commit -m {} --allow-empty && git push -u origin {}",
        shell_escape(&branch),
        shell_escape(message),
        shell_escape(&branch),
    );
    match ctx.sandbox.exec(command, None).await {
        Ok(resp) if resp.exit_code == 0 => {
            ToolResult::success(ToolName::SaveDraft, resp.stdout)
                .with_side_effect(SideEffect::BranchSwitch { branch })
        }
        Ok(resp) => ToolResult::failure(
            ToolName::SaveDraft,
            &PushErr::WriteFailed(format!("save_draft exited {}: {}", resp.exit_code, resp.stderr)),
        ),
        Err(e) => ToolResult::failure(ToolName::SaveDraft, &rpc_err_to_push_err(e)),
    }
}

pub async fn promote_to_github(ctx: &mut ToolContext<'_>, args: Value) -> ToolResult {
    let repo_name = match require_str(&args, "repo_name") {
        Ok(r) => r.to_string(),
        Err(msg) => return ToolResult::failure(ToolName::PromoteToGithub, &PushErr::Unknown(msg)),
    };
    let description = optional_str(&args, "description").unwrap_or("");
    let private = args.get("private").and_then(|v| v.as_bool()).unwrap_or(true);

    let visibility = if private { "--private" } else { "--public" };
    let command = format!(
        "gh repo create {} {} --description {} --source=. --remote=origin --push",
        shell_escape(&repo_name),
        visibility,
        shell_escape(description),
    );
    match ctx.sandbox.exec(command, None).await {
        Ok(resp) if resp.exit_code == 0 => ToolResult::success(ToolName::PromoteToGithub, resp.stdout),
        Ok(resp) => ToolResult::failure(
            ToolName::PromoteToGithub,
            &PushErr::WriteFailed(format!("gh repo create exited {}: {}", resp.exit_code, resp.stderr)),
        ),
        Err(e) => ToolResult::failure(ToolName::PromoteToGithub, &rpc_err_to_push_err(e)),
    }
}
