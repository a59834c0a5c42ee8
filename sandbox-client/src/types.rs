use serde::Deserialize;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct CreateRequest {
    pub template: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateResponse {
    pub owner_token: String,
    pub sandbox_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecRequest {
    pub owner_token: String,
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workdir: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecResponse {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReadRequest {
    pub owner_token: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_line: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReadResponse {
    pub content: String,
    pub truncated: bool,
    pub version: String,
    #[serde(default)]
    pub start_line: Option<u32>,
    #[serde(default)]
    pub end_line: Option<u32>,
    #[serde(default)]
    pub total_lines: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WriteRequest {
    pub owner_token: String,
    pub path: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_version: Option<String>,
}

/// The sandbox returns `{ok: false, code: "STALE_FILE", ...}` on a version
/// conflict instead of a transport-level error, so the response is decoded
/// into this tagged shape rather than treated as a hard failure.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum WriteResponse {
    Ok {
        ok: bool,
        bytes_written: u64,
        new_version: String,
    },
    Stale {
        ok: bool,
        code: String,
        expected_version: String,
        current_version: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct ListRequest {
    pub owner_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListEntry {
    pub name: String,
    pub is_dir: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListResponse {
    pub entries: Vec<ListEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiffRequest {
    pub owner_token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiffResponse {
    pub diff: String,
    pub files_changed: u32,
    pub insertions: u32,
    pub deletions: u32,
    pub porcelain_status: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DownloadRequest {
    pub owner_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DownloadResponse {
    pub base64: String,
    pub bytes: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BrowserScreenshotRequest {
    pub owner_token: String,
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrowserScreenshotResponse {
    pub base64_png: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BrowserExtractRequest {
    pub owner_token: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrowserExtractResponse {
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CleanupRequest {
    pub owner_token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CleanupResponse {
    pub ok: bool,
}

/// `{ error, code, details }` structured error payload (§6).
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorPayload {
    pub error: String,
    pub code: String,
    #[serde(default)]
    pub details: Option<String>,
}
