//! `read_symbols` (§4.3 table): lists structural declarations in a file
//! without requiring a full read, so the model can orient itself in a large
//! file before deciding which line ranges to read.

use push_protocol::ToolName;
use push_protocol::ToolResult;
use serde_json::Value;

use crate::error_map::rpc_err_to_push_err;
use crate::hashline::structural_signatures;
use crate::tool_layer::ToolContext;
use crate::tool_layer::normalize_workspace_path;
use crate::tools::require_str;

pub async fn read_symbols(ctx: &mut ToolContext<'_>, args: Value) -> ToolResult {
    let path = match require_str(&args, "path") {
        Ok(p) => normalize_workspace_path(p),
        Err(msg) => return ToolResult::failure(ToolName::ReadSymbols, &push_protocol::PushErr::Unknown(msg)),
    };

    match ctx.sandbox.read(path.clone(), None, None).await {
        Ok(resp) => {
            ctx.version_cache.insert(path, resp.version);
            let symbols = structural_signatures(&resp.content);
            if symbols.is_empty() {
                ToolResult::success(ToolName::ReadSymbols, "no symbols found")
            } else {
                ToolResult::success(ToolName::ReadSymbols, symbols.join("\n"))
            }
        }
        Err(e) => ToolResult::failure(ToolName::ReadSymbols, &rpc_err_to_push_err(e)),
    }
}
