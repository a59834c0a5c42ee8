//! `write_file` (§4.3.2), `edit_file` (§4.3.3), and `apply_patchset`
//! (§4.3.4) — the three write surfaces gated by the Edit Guard.

use std::collections::HashMap;
use std::collections::HashSet;

use push_protocol::PushErr;
use push_protocol::ToolName;
use push_protocol::ToolResult;
use serde::Deserialize;
use serde_json::Value;

use crate::error_map::rpc_err_to_push_err;
use crate::hashline::HashlineOp;
use crate::hashline::apply_hashline_ops;
use crate::hashline::bounded_diff;
use crate::tool_layer::GuardOutcome;
use crate::tool_layer::ToolContext;
use crate::tool_layer::ensure_write_allowed;
use crate::tool_layer::hydrate_full_content;
use crate::tool_layer::normalize_workspace_path;
use crate::tools::require_str;

pub async fn write_file(ctx: &mut ToolContext<'_>, args: Value) -> ToolResult {
    let path = match require_str(&args, "path") {
        Ok(p) => p,
        Err(msg) => return ToolResult::failure(ToolName::WriteFile, &PushErr::Unknown(msg)),
    };
    let content = match require_str(&args, "content") {
        Ok(c) => c,
        Err(msg) => return ToolResult::failure(ToolName::WriteFile, &PushErr::Unknown(msg)),
    };
    let caller_version = args.get("expected_version").and_then(|v| v.as_str()).map(str::to_string);

    let full_path = normalize_workspace_path(path);
    match ensure_write_allowed(ctx, &full_path).await {
        GuardOutcome::Blocked(err) => return ToolResult::failure(ToolName::WriteFile, &err),
        GuardOutcome::Proceed | GuardOutcome::NewFile => {}
    }

    let expected_version = caller_version.or_else(|| ctx.version_cache.get(&full_path).cloned());
    match ctx.sandbox.write(full_path.clone(), content.to_string(), expected_version.clone()).await {
        Ok(push_sandbox_client::types::WriteResponse::Ok { new_version, .. }) => {
            ctx.version_cache.insert(full_path.clone(), new_version.clone());
            ctx.ledger.record_creation(&full_path);

            let mut text = format!("Wrote {full_path} (new version: {new_version})");
            if let Ok(diff_resp) = ctx.sandbox.diff().await {
                if diff_resp.porcelain_status.trim().is_empty() {
                    text.push_str("\nnote: git reports no change for this write.");
                } else if !diff_resp.porcelain_status.contains(path) && !full_path.starts_with("/workspace") {
                    text.push_str("\nnote: path is outside the workspace root.");
                }
            }
            ToolResult::success(ToolName::WriteFile, text)
        }
        Ok(push_sandbox_client::types::WriteResponse::Stale { expected_version, current_version, .. }) => {
            ctx.version_cache.insert(full_path, current_version.clone());
            ToolResult::failure(
                ToolName::WriteFile,
                &PushErr::StaleFile { expected: expected_version, current: current_version },
            )
        }
        Err(e) => ToolResult::failure(ToolName::WriteFile, &rpc_err_to_push_err(e)),
    }
}

#[derive(Debug, Deserialize)]
struct EditFileArgs {
    path: String,
    ops: Vec<HashlineOp>,
    #[serde(default)]
    expected_version: Option<String>,
}

pub async fn edit_file(ctx: &mut ToolContext<'_>, args: Value) -> ToolResult {
    let parsed: EditFileArgs = match serde_json::from_value(args) {
        Ok(p) => p,
        Err(e) => return ToolResult::failure(ToolName::EditFile, &PushErr::Unknown(e.to_string())),
    };
    let full_path = normalize_workspace_path(&parsed.path);

    match ensure_write_allowed(ctx, &full_path).await {
        GuardOutcome::Blocked(err) => return ToolResult::failure(ToolName::EditFile, &err),
        GuardOutcome::Proceed | GuardOutcome::NewFile => {}
    }

    let (original, read_version) = match hydrate_full_content(ctx, &full_path).await {
        Ok(pair) => pair,
        Err(err) => return ToolResult::failure(ToolName::EditFile, &err),
    };

    match apply_hashline_ops(&original, &parsed.ops) {
        Ok(new_content) => {
            let expected_version = parsed.expected_version.or(Some(read_version));
            match ctx.sandbox.write(full_path.clone(), new_content.clone(), expected_version).await {
                Ok(push_sandbox_client::types::WriteResponse::Ok { new_version, .. }) => {
                    ctx.version_cache.insert(full_path.clone(), new_version);
                    ctx.ledger.record_creation(&full_path);
                    let diff = bounded_diff(&original, &new_content, 200);
                    ToolResult::success(
                        ToolName::EditFile,
                        format!("{} of {} operations applied\n\n{diff}", parsed.ops.len(), parsed.ops.len()),
                    )
                }
                Ok(push_sandbox_client::types::WriteResponse::Stale { expected_version, current_version, .. }) => {
                    ctx.version_cache.insert(full_path, current_version.clone());
                    ToolResult::failure(
                        ToolName::EditFile,
                        &PushErr::StaleFile { expected: expected_version, current: current_version },
                    )
                }
                Err(e) => ToolResult::failure(ToolName::EditFile, &rpc_err_to_push_err(e)),
            }
        }
        Err(failures) => {
            let detail = failures
                .iter()
                .map(|f| format!("op {}: {}", f.index, f.reason))
                .collect::<Vec<_>>()
                .join("; ");
            ToolResult::failure(ToolName::EditFile, &PushErr::EditHashMismatch(detail))
        }
    }
}

#[derive(Debug, Deserialize)]
struct PatchsetEdit {
    path: String,
    ops: Vec<HashlineOp>,
}

#[derive(Debug, Deserialize)]
struct PatchsetArgs {
    edits: Vec<PatchsetEdit>,
    #[serde(default)]
    dry_run: bool,
}

/// §4.3.4: atomic validation, sequential write. Phase 1 reads every target
/// file concurrently and validates in memory; phase 2 (skipped on dry run)
/// writes sequentially and does not roll back a partial failure.
pub async fn apply_patchset(ctx: &mut ToolContext<'_>, args: Value) -> ToolResult {
    let parsed: PatchsetArgs = match serde_json::from_value(args) {
        Ok(p) => p,
        Err(e) => return ToolResult::failure(ToolName::ApplyPatchset, &PushErr::Unknown(e.to_string())),
    };

    let mut seen = HashSet::new();
    for edit in &parsed.edits {
        if !seen.insert(edit.path.clone()) {
            return ToolResult::failure(
                ToolName::ApplyPatchset,
                &PushErr::Unknown(format!("duplicate path in patchset: {}", edit.path)),
            );
        }
    }

    // Phase 1: read targets concurrently, apply ops in memory.
    let full_paths: Vec<String> = parsed.edits.iter().map(|e| normalize_workspace_path(&e.path)).collect();
    let reads = futures::future::join_all(
        full_paths.iter().map(|p| ctx.sandbox.read(p.clone(), None, None)),
    )
    .await;

    let mut validated: HashMap<String, (String, String)> = HashMap::new(); // path -> (new_content, read_version)
    let mut errors: Vec<String> = Vec::new();

    for ((edit, full_path), read) in parsed.edits.iter().zip(full_paths.iter()).zip(reads.into_iter()) {
        match read {
            Ok(resp) if !resp.truncated => match apply_hashline_ops(&resp.content, &edit.ops) {
                Ok(new_content) => {
                    validated.insert(full_path.clone(), (new_content, resp.version));
                }
                Err(failures) => {
                    let detail = failures
                        .iter()
                        .map(|f| format!("op {}: {}", f.index, f.reason))
                        .collect::<Vec<_>>()
                        .join("; ");
                    errors.push(format!("{full_path}: {detail}"));
                }
            },
            Ok(_truncated) => {
                errors.push(format!("{full_path}: file too large to validate in one read"));
            }
            Err(e) => {
                errors.push(format!("{full_path}: {}", rpc_err_to_push_err(e)));
            }
        }
    }

    if !errors.is_empty() {
        return ToolResult::failure(
            ToolName::ApplyPatchset,
            &PushErr::EditHashMismatch(errors.join(" | ")),
        );
    }

    if parsed.dry_run {
        return ToolResult::success(
            ToolName::ApplyPatchset,
            format!("dry run: {} files validated, nothing written", validated.len()),
        );
    }

    // Phase 2: write sequentially; a mid-phase failure is not rolled back.
    let mut written = Vec::new();
    let mut failed = Vec::new();
    for full_path in &full_paths {
        let Some((new_content, read_version)) = validated.get(full_path).cloned() else {
            continue;
        };
        match ctx.sandbox.write(full_path.clone(), new_content, Some(read_version)).await {
            Ok(push_sandbox_client::types::WriteResponse::Ok { new_version, .. }) => {
                ctx.version_cache.insert(full_path.clone(), new_version);
                ctx.ledger.record_creation(full_path);
                written.push(full_path.clone());
            }
            Ok(push_sandbox_client::types::WriteResponse::Stale { current_version, .. }) => {
                ctx.version_cache.insert(full_path.clone(), current_version.clone());
                failed.push(format!("{full_path}: stale (current {current_version})"));
            }
            Err(e) => failed.push(format!("{full_path}: {}", rpc_err_to_push_err(e))),
        }
    }

    if failed.is_empty() {
        ToolResult::success(ToolName::ApplyPatchset, format!("wrote {} files: {}", written.len(), written.join(", ")))
            .with_side_effect(push_protocol::tool::SideEffect::FilesWritten { paths: written })
    } else {
        ToolResult::success(
            ToolName::ApplyPatchset,
            format!(
                "partial success: wrote [{}], failed [{}]",
                written.join(", "),
                failed.join("; ")
            ),
        )
    }
}
