//! The fixed, closed tool registry (§4.3). Each module owns the argument
//! validators and executors for a cluster of related tools; `dispatch`
//! matches on the parsed [`ToolName`] tag.

pub mod download;
pub mod exec;
pub mod fs;
pub mod git;
pub mod symbols;
pub mod write;

use push_protocol::ToolCall;
use push_protocol::ToolName;
use push_protocol::ToolResult;

use crate::tool_layer::ToolContext;

pub async fn dispatch(call: ToolCall, ctx: &mut ToolContext<'_>) -> ToolResult {
    match call.tool {
        ToolName::Exec => exec::exec(ctx, call.args).await,
        ToolName::ReadFile => fs::read_file(ctx, call.args).await,
        ToolName::ListDir => fs::list_dir(ctx, call.args).await,
        ToolName::Search => exec::search(ctx, call.args).await,
        ToolName::WriteFile => write::write_file(ctx, call.args).await,
        ToolName::EditFile => write::edit_file(ctx, call.args).await,
        ToolName::ApplyPatchset => write::apply_patchset(ctx, call.args).await,
        ToolName::Diff => git::diff(ctx).await,
        ToolName::PrepareCommit => git::prepare_commit(ctx, call.args).await,
        ToolName::Push => git::push(ctx).await,
        ToolName::SaveDraft => git::save_draft(ctx, call.args).await,
        ToolName::RunTests => exec::run_tests(ctx, call.args).await,
        ToolName::CheckTypes => exec::check_types(ctx).await,
        ToolName::ReadSymbols => symbols::read_symbols(ctx, call.args).await,
        ToolName::Download => download::download(ctx, call.args).await,
        ToolName::PromoteToGithub => git::promote_to_github(ctx, call.args).await,
    }
}

/// Shared argument-validation helper: extracts a required string field or
/// returns a validation failure `ToolResult`.
pub(crate) fn require_str<'a>(
    args: &'a serde_json::Value,
    field: &str,
) -> Result<&'a str, String> {
    args.get(field)
        .and_then(|v| v.as_str())
        .ok_or_else(|| format!("missing required string argument `{field}`"))
}

pub(crate) fn optional_str<'a>(args: &'a serde_json::Value, field: &str) -> Option<&'a str> {
    args.get(field).and_then(|v| v.as_str())
}

pub(crate) fn optional_u32(args: &serde_json::Value, field: &str) -> Option<u32> {
    args.get(field).and_then(|v| v.as_u64()).map(|v| v as u32)
}
