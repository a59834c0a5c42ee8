use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

/// The closed tool set (§4.3). Dispatch is a match on this tag; validation
/// is per-variant in `push-core::tools`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ToolName {
    Exec,
    ReadFile,
    ListDir,
    Search,
    WriteFile,
    EditFile,
    ApplyPatchset,
    Diff,
    PrepareCommit,
    Push,
    SaveDraft,
    RunTests,
    CheckTypes,
    ReadSymbols,
    Download,
    PromoteToGithub,
}

impl ToolName {
    /// Accepted aliases, e.g. a model writing `"fs_write"` for `write_file`.
    pub fn from_name_or_alias(s: &str) -> Option<Self> {
        use ToolName::*;
        Some(match s {
            "exec" | "run_shell" => Exec,
            "read_file" | "read" => ReadFile,
            "list_dir" | "ls" => ListDir,
            "search" | "grep" => Search,
            "write_file" | "fs_write" => WriteFile,
            "edit_file" | "fs_edit" => EditFile,
            "apply_patchset" | "patchset" => ApplyPatchset,
            "diff" => Diff,
            "prepare_commit" | "commit" => PrepareCommit,
            "push" => Push,
            "save_draft" | "draft" => SaveDraft,
            "run_tests" | "test" => RunTests,
            "check_types" | "typecheck" => CheckTypes,
            "read_symbols" | "symbols" => ReadSymbols,
            "download" => Download,
            "promote_to_github" | "github_promote" => PromoteToGithub,
            _ => return None,
        })
    }
}

/// A discriminated tool invocation parsed out of a completed assistant turn.
/// Constructed only by the Tool Layer's detection + validation pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool: ToolName,
    pub args: Value,
}

impl ToolCall {
    /// A stable signature used by the Agent Loop's loop-guard (tool name +
    /// serialized args).
    pub fn signature(&self) -> String {
        format!("{}:{}", self.tool, self.args)
    }
}

/// A side-effect worth surfacing to the caller beyond the text result, e.g.
/// `save_draft` creating a fresh `draft/...` branch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SideEffect {
    BranchSwitch { branch: String },
    FilesWritten { paths: Vec<String> },
}

/// A structured outcome fed back to the model as a synthetic tool-result
/// message. Tool executors always return one of these — they never raise
/// out of band.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool: ToolName,
    pub ok: bool,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub side_effect: Option<SideEffect>,
}

impl ToolResult {
    pub fn success(tool: ToolName, text: impl Into<String>) -> Self {
        Self {
            tool,
            ok: true,
            text: text.into(),
            error_type: None,
            retryable: None,
            side_effect: None,
        }
    }

    pub fn failure(tool: ToolName, err: &crate::error::PushErr) -> Self {
        Self {
            tool,
            ok: false,
            text: format!(
                "error_type: {}\nretryable: {}\n{err}",
                err.type_name(),
                err.retryable()
            ),
            error_type: Some(err.type_name().to_string()),
            retryable: Some(err.retryable()),
            side_effect: None,
        }
    }

    pub fn with_side_effect(mut self, side_effect: SideEffect) -> Self {
        self.side_effect = Some(side_effect);
        self
    }

    /// Renders the `[TOOL_RESULT] { ... } [/TOOL_RESULT]` synthetic user
    /// message body the Agent Loop appends after dispatch (§4.5.f),
    /// truncated to `max_chars`.
    pub fn to_synthetic_message(&self, max_chars: usize) -> String {
        let mut body = self.text.clone();
        let mut truncated = false;
        if body.chars().count() > max_chars {
            body = body.chars().take(max_chars).collect();
            truncated = true;
        }
        let meta = serde_json::json!({
            "tool": self.tool.to_string(),
            "ok": self.ok,
            "truncated": truncated,
        });
        format!("[TOOL_RESULT] {{\"meta\": {meta}, \"output\": {body:?}}} [/TOOL_RESULT]")
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn aliases_resolve_to_canonical_tool() {
        assert_eq!(ToolName::from_name_or_alias("fs_write"), Some(ToolName::WriteFile));
        assert_eq!(ToolName::from_name_or_alias("nonsense"), None);
    }

    #[test]
    fn signature_is_stable_for_identical_calls() {
        let a = ToolCall { tool: ToolName::Exec, args: serde_json::json!({"command": "ls"}) };
        let b = ToolCall { tool: ToolName::Exec, args: serde_json::json!({"command": "ls"}) };
        assert_eq!(a.signature(), b.signature());
    }
}
