//! `read_file` and `list_dir` (§4.3.1).

use push_ledger::ReadObservation;
use push_protocol::PushErr;
use push_protocol::ToolName;
use push_protocol::ToolResult;
use push_protocol::ledger_types::LineRange;
use serde_json::Value;

use crate::error_map::rpc_err_to_push_err;
use crate::hashline::line_hash;
use crate::hashline::structural_signatures;
use crate::tool_layer::ToolContext;
use crate::tool_layer::normalize_workspace_path;
use crate::tools::optional_u32;
use crate::tools::require_str;

pub async fn read_file(ctx: &mut ToolContext<'_>, args: Value) -> ToolResult {
    let path = match require_str(&args, "path") {
        Ok(p) => p,
        Err(msg) => return ToolResult::failure(ToolName::ReadFile, &PushErr::Unknown(msg)),
    };
    let start_line = optional_u32(&args, "start_line");
    let end_line = optional_u32(&args, "end_line");
    if let (Some(s), Some(e)) = (start_line, end_line) {
        if s > e {
            return ToolResult::failure(
                ToolName::ReadFile,
                &PushErr::Unknown(format!("start_line {s} must be <= end_line {e}")),
            );
        }
    }

    let full_path = normalize_workspace_path(path);
    let resp = match ctx.sandbox.read(full_path.clone(), start_line, end_line).await {
        Ok(r) => r,
        Err(e) => return ToolResult::failure(ToolName::ReadFile, &rpc_err_to_push_err(e)),
    };

    ctx.version_cache.insert(full_path.clone(), resp.version.clone());
    let obs = ReadObservation {
        range: match (start_line, end_line) {
            (Some(s), Some(e)) => Some(LineRange::new(s, e)),
            _ => None,
        },
        truncated: resp.truncated,
    };
    ctx.ledger.record_read(&full_path, obs, resp.total_lines);

    let start = resp.start_line.or(start_line).unwrap_or(1);
    let mut decorated = String::new();
    for (i, line) in resp.content.lines().enumerate() {
        let number = start + i as u32;
        decorated.push_str(&format!("{:>6}  {}  {}\n", number, line_hash(line), line));
    }

    if resp.truncated {
        let sigs = structural_signatures(&resp.content);
        if !sigs.is_empty() {
            decorated.push_str(&format!(
                "\n-- truncated; structural signatures beyond this point include: {} --\n",
                sigs.join(", ")
            ));
        }
    }

    let mut text = format!(
        "version: {}\ntruncated: {}\n\n{decorated}",
        resp.version, resp.truncated
    );
    if let Some(warning) = ctx.ledger.stale_warning(&full_path) {
        text.push_str(&format!("\n{warning}\n"));
    }
    ToolResult::success(ToolName::ReadFile, text)
}

pub async fn list_dir(ctx: &mut ToolContext<'_>, args: Value) -> ToolResult {
    let path = args.get("path").and_then(|v| v.as_str()).map(normalize_workspace_path);
    match ctx.sandbox.list(path).await {
        Ok(resp) => {
            let mut lines: Vec<String> = resp
                .entries
                .iter()
                .map(|e| format!("{}{}", e.name, if e.is_dir { "/" } else { "" }))
                .collect();
            lines.sort();
            ToolResult::success(ToolName::ListDir, lines.join("\n"))
        }
        Err(e) => ToolResult::failure(ToolName::ListDir, &rpc_err_to_push_err(e)),
    }
}
