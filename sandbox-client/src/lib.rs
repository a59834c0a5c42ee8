//! Thin request/response client over the remote sandbox HTTP surface (C1).
//! Retries transport errors, timeouts, and 5xx-class structured errors with
//! exponential backoff; never interprets results beyond shape validation.

mod backoff;
pub mod error;
pub mod types;

use std::sync::Mutex;
use std::time::Duration;

use tracing::debug;
use tracing::warn;

use crate::backoff::MAX_RETRIES;
use crate::error::RpcError;
use crate::types::*;

const TIMEOUT_METADATA: Duration = Duration::from_secs(30);
const TIMEOUT_EXEC: Duration = Duration::from_secs(120);
const TIMEOUT_ARCHIVE: Duration = Duration::from_secs(180);
const TIMEOUT_BROWSER: Duration = Duration::from_secs(90);

/// Owner-token lifecycle: `{ set on create, cleared on cleanup }`. Opaque
/// process-local state, never interpreted by this crate.
pub struct SandboxClient {
    http: reqwest::Client,
    base_url: String,
    owner_token: Mutex<Option<String>>,
}

impl SandboxClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            owner_token: Mutex::new(None),
        }
    }

    pub fn owner_token(&self) -> Option<String> {
        #[allow(clippy::unwrap_used)]
        self.owner_token.lock().unwrap().clone()
    }

    fn require_token(&self) -> Result<String, RpcError> {
        self.owner_token().ok_or_else(|| RpcError::Structured {
            code: "NO_OWNER_TOKEN".into(),
            message: "sandbox has not been created yet".into(),
            details: None,
        })
    }

    pub async fn create(&self, req: CreateRequest) -> Result<CreateResponse, RpcError> {
        let resp: CreateResponse = self
            .call("create", &req, TIMEOUT_METADATA)
            .await?;
        #[allow(clippy::unwrap_used)]
        {
            *self.owner_token.lock().unwrap() = Some(resp.owner_token.clone());
        }
        Ok(resp)
    }

    pub async fn exec(&self, command: String, workdir: Option<String>) -> Result<ExecResponse, RpcError> {
        let req = ExecRequest {
            owner_token: self.require_token()?,
            command,
            workdir,
        };
        self.call("exec", &req, TIMEOUT_EXEC).await
    }

    pub async fn read(&self, path: String, start_line: Option<u32>, end_line: Option<u32>) -> Result<ReadResponse, RpcError> {
        let req = ReadRequest {
            owner_token: self.require_token()?,
            path,
            start_line,
            end_line,
        };
        self.call("read", &req, TIMEOUT_METADATA).await
    }

    pub async fn write(&self, path: String, content: String, expected_version: Option<String>) -> Result<WriteResponse, RpcError> {
        let req = WriteRequest {
            owner_token: self.require_token()?,
            path,
            content,
            expected_version,
        };
        self.call("write", &req, TIMEOUT_METADATA).await
    }

    pub async fn list(&self, path: Option<String>) -> Result<ListResponse, RpcError> {
        let req = ListRequest {
            owner_token: self.require_token()?,
            path,
        };
        self.call("list", &req, TIMEOUT_METADATA).await
    }

    pub async fn diff(&self) -> Result<DiffResponse, RpcError> {
        let req = DiffRequest {
            owner_token: self.require_token()?,
        };
        self.call("diff", &req, TIMEOUT_METADATA).await
    }

    /// `search-via-exec`: the caller composes the ripgrep/grep invocation and
    /// this is a thin wrapper over `exec`.
    pub async fn search_via_exec(&self, command: String, workdir: Option<String>) -> Result<ExecResponse, RpcError> {
        self.exec(command, workdir).await
    }

    pub async fn browser_screenshot(&self, url: String) -> Result<BrowserScreenshotResponse, RpcError> {
        let req = BrowserScreenshotRequest {
            owner_token: self.require_token()?,
            url,
        };
        self.call("browser-screenshot", &req, TIMEOUT_BROWSER).await
    }

    pub async fn browser_extract(&self, url: String, selector: Option<String>) -> Result<BrowserExtractResponse, RpcError> {
        let req = BrowserExtractRequest {
            owner_token: self.require_token()?,
            url,
            selector,
        };
        self.call("browser-extract", &req, TIMEOUT_BROWSER).await
    }

    pub async fn download(&self, path: Option<String>) -> Result<DownloadResponse, RpcError> {
        let req = DownloadRequest {
            owner_token: self.require_token()?,
            path,
        };
        self.call("download", &req, TIMEOUT_ARCHIVE).await
    }

    pub async fn cleanup(&self) -> Result<CleanupResponse, RpcError> {
        let req = CleanupRequest {
            owner_token: self.require_token()?,
        };
        let resp: CleanupResponse = self.call("cleanup", &req, TIMEOUT_METADATA).await?;
        #[allow(clippy::unwrap_used)]
        {
            *self.owner_token.lock().unwrap() = None;
        }
        Ok(resp)
    }

    /// Issues `req` against `{base_url}/sandbox/{op}`, retrying transport
    /// errors, timeouts, 5xx, and structured errors carrying a retryable
    /// code (`RpcError::is_retryable`) with exponential backoff (cap
    /// `MAX_RETRIES` attempts beyond the first). Other 4xx/structured
    /// errors are not retried.
    async fn call<Req, Resp>(&self, op: &str, req: &Req, timeout: Duration) -> Result<Resp, RpcError>
    where
        Req: serde::Serialize,
        Resp: serde::de::DeserializeOwned,
    {
        let url = format!("{}/sandbox/{op}", self.base_url);
        let mut attempt = 0u64;
        loop {
            let send = self.http.post(&url).json(req).timeout(timeout).send();
            let result = tokio::time::timeout(timeout, send).await;

            match result {
                Err(_elapsed) => {
                    if attempt >= MAX_RETRIES {
                        return Err(RpcError::RetryLimit(attempt + 1));
                    }
                    attempt += 1;
                    warn!(op, attempt, "sandbox rpc timed out, retrying");
                    tokio::time::sleep(backoff::backoff(attempt - 1)).await;
                    continue;
                }
                Ok(Err(transport_err)) => {
                    if attempt >= MAX_RETRIES {
                        return Err(RpcError::Transport(transport_err.to_string()));
                    }
                    attempt += 1;
                    warn!(op, attempt, error = %transport_err, "sandbox rpc transport error, retrying");
                    tokio::time::sleep(backoff::backoff(attempt - 1)).await;
                    continue;
                }
                Ok(Ok(response)) => {
                    let status = response.status();
                    if status.is_success() {
                        debug!(op, %status, "sandbox rpc ok");
                        let body: Resp = response.json().await.map_err(|e| RpcError::Transport(e.to_string()))?;
                        return Ok(body);
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    let payload: Option<ErrorPayload> = serde_json::from_str(&body_text).ok();
                    let (code, message) = payload
                        .map(|p| (p.code, p.error))
                        .unwrap_or_else(|| (status.as_u16().to_string(), body_text.clone()));
                    let structured = RpcError::Structured { code, message, details: None };

                    if !status.is_server_error() && !structured.is_retryable() {
                        return Err(structured);
                    }

                    if attempt >= MAX_RETRIES {
                        return Err(RpcError::RetryLimit(attempt + 1));
                    }
                    attempt += 1;
                    warn!(op, attempt, %status, "sandbox rpc 5xx or retryable code, retrying");
                    tokio::time::sleep(backoff::backoff(attempt - 1)).await;
                    continue;
                }
            }
        }
    }
}

pub fn is_not_found_error(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("no such file") || lower.contains("enoent") || lower.contains("not found")
}

#[cfg(test)]
mod tests {
    use wiremock::Mock;
    use wiremock::MockServer;
    use wiremock::ResponseTemplate;
    use wiremock::matchers::method;
    use wiremock::matchers::path;

    use super::*;
    use crate::types::CreateRequest;

    async fn created_client(server: &MockServer) -> SandboxClient {
        Mock::given(method("POST"))
            .and(path("/sandbox/create"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "owner_token": "tok-1",
                "sandbox_id": "sb-1",
            })))
            .expect(1)
            .mount(server)
            .await;
        let client = SandboxClient::new(server.uri());
        client.create(CreateRequest { template: None }).await.unwrap();
        client
    }

    #[tokio::test]
    async fn structured_4xx_error_is_not_retried() {
        let server = MockServer::start().await;
        let client = created_client(&server).await;

        Mock::given(method("POST"))
            .and(path("/sandbox/diff"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "no owner token",
                "code": "NO_OWNER_TOKEN",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let err = client.diff().await.unwrap_err();
        match err {
            RpcError::Structured { code, .. } => assert_eq!(code, "NO_OWNER_TOKEN"),
            other => panic!("expected a structured error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn retryable_5xx_eventually_succeeds() {
        let server = MockServer::start().await;
        let client = created_client(&server).await;

        Mock::given(method("POST"))
            .and(path("/sandbox/diff"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .expect(1)
            .named("first attempt fails")
            .with_priority(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/sandbox/diff"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "diff": "",
                "files_changed": 0,
                "insertions": 0,
                "deletions": 0,
                "porcelain_status": "",
            })))
            .expect(1)
            .named("retry succeeds")
            .with_priority(2)
            .mount(&server)
            .await;

        let resp = client.diff().await.unwrap();
        assert_eq!(resp.files_changed, 0);
    }
}
