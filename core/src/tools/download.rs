//! `download` (§4.3 table): fetches the workspace (or a subpath within it)
//! as a base64-encoded archive for the caller to persist outside the
//! sandbox.

use push_protocol::ToolName;
use push_protocol::ToolResult;
use serde_json::Value;

use crate::error_map::rpc_err_to_push_err;
use crate::tool_layer::ToolContext;
use crate::tool_layer::normalize_workspace_path;
use crate::tools::optional_str;

pub async fn download(ctx: &mut ToolContext<'_>, args: Value) -> ToolResult {
    let path = optional_str(&args, "path").map(normalize_workspace_path);
    match ctx.sandbox.download(path).await {
        Ok(resp) => ToolResult::success(
            ToolName::Download,
            format!("bytes: {}\nbase64: {}", resp.bytes, resp.base64),
        ),
        Err(e) => ToolResult::failure(ToolName::Download, &rpc_err_to_push_err(e)),
    }
}
