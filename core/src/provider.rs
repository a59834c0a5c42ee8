//! The model provider interface (§6): "a streaming chat-completion function
//! taking a message list and yielding content tokens." Provider registries,
//! URLs, and API keys are configuration only and out of scope (§1) — this
//! module defines the trait the Agent Loop and Auditor consume, plus one
//! concrete OpenAI-compatible implementation in the teacher's streaming
//! style (`client.rs`'s SSE accumulation over `eventsource_stream`).

use std::pin::Pin;

use futures::Stream;
use futures::StreamExt;
use push_protocol::Role;

pub type TokenStream = Pin<Box<dyn Stream<Item = anyhow::Result<String>> + Send>>;

#[async_trait::async_trait]
pub trait ModelProvider: Send + Sync {
    /// Streams completion tokens for `messages` against `model`.
    async fn stream_completion(&self, model: &str, messages: &[(Role, String)]) -> anyhow::Result<TokenStream>;

    /// Convenience wrapper that accumulates the full stream into one string,
    /// used by the Auditor (§4.4 step 2: "Stream the model response;
    /// accumulate").
    async fn complete(&self, model: &str, messages: &[(Role, String)]) -> anyhow::Result<String> {
        let mut stream = self.stream_completion(model, messages).await?;
        let mut buf = String::new();
        while let Some(chunk) = stream.next().await {
            buf.push_str(&chunk?);
        }
        Ok(buf)
    }
}

/// A generic OpenAI-compatible `/v1/chat/completions` streaming client.
/// Works against Ollama, OpenRouter, Mistral, and similar OpenAI-shaped
/// endpoints by varying `base_url`; which concrete provider a `--provider`
/// flag resolves to is configuration, not part of this crate's scope.
pub struct HttpChatProvider {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpChatProvider {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self { http: reqwest::Client::new(), base_url: base_url.into(), api_key }
    }
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::ToolResult => "user",
    }
}

#[async_trait::async_trait]
impl ModelProvider for HttpChatProvider {
    async fn stream_completion(&self, model: &str, messages: &[(Role, String)]) -> anyhow::Result<TokenStream> {
        let payload = serde_json::json!({
            "model": model,
            "stream": true,
            "messages": messages.iter().map(|(role, content)| {
                serde_json::json!({"role": role_str(*role), "content": content})
            }).collect::<Vec<_>>(),
        });

        let mut req = self.http.post(format!("{}/v1/chat/completions", self.base_url)).json(&payload);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        let resp = req.send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("provider returned {status}: {body}");
        }

        let byte_stream = resp.bytes_stream();
        let events = eventsource_stream::Eventsource::eventsource(byte_stream);
        let tokens = events.filter_map(|event| async move {
            match event {
                Ok(ev) if ev.data == "[DONE]" => None,
                Ok(ev) => {
                    let parsed: serde_json::Value = match serde_json::from_str(&ev.data) {
                        Ok(v) => v,
                        Err(e) => return Some(Err(anyhow::anyhow!("bad SSE payload: {e}"))),
                    };
                    let delta = parsed["choices"][0]["delta"]["content"].as_str().unwrap_or("").to_string();
                    if delta.is_empty() { None } else { Some(Ok(delta)) }
                }
                Err(e) => Some(Err(anyhow::anyhow!("sse error: {e}"))),
            }
        });
        Ok(Box::pin(tokens))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoProvider;
    #[async_trait::async_trait]
    impl ModelProvider for EchoProvider {
        async fn stream_completion(&self, _model: &str, messages: &[(Role, String)]) -> anyhow::Result<TokenStream> {
            let last = messages.last().map(|(_, c)| c.clone()).unwrap_or_default();
            let tokens: Vec<anyhow::Result<String>> = vec![Ok(last)];
            Ok(Box::pin(futures::stream::iter(tokens)))
        }
    }

    #[tokio::test]
    async fn complete_accumulates_stream_into_one_string() {
        let provider = EchoProvider;
        let out = provider.complete("m", &[(Role::User, "hello".to_string())]).await.unwrap();
        assert_eq!(out, "hello");
    }
}
