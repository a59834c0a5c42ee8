//! The Auditor gate (C4, §4.4): a fail-safe secondary model invocation that
//! produces a binary safety verdict on a staged diff.

use serde::Deserialize;
use serde::Serialize;

use crate::provider::ModelProvider;

const MAX_DIFF_CHARS: usize = 20_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Safe,
    Unsafe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Risk {
    pub level: RiskLevel,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditReport {
    pub verdict: Verdict,
    pub summary: String,
    pub risks: Vec<Risk>,
    pub files_reviewed: u32,
}

/// Shape the auditor model is instructed to emit.
#[derive(Debug, Deserialize)]
struct RawAuditResponse {
    verdict: Option<String>,
    summary: Option<String>,
    #[serde(default)]
    risks: Vec<RawRisk>,
}

#[derive(Debug, Deserialize)]
struct RawRisk {
    level: Option<String>,
    description: Option<String>,
}

const SYSTEM_PROMPT: &str = r#"You are a strict safety auditor reviewing a staged code diff before it is committed. Respond with a single JSON object of shape {"verdict": "safe"|"unsafe", "summary": string, "risks": [{"level": "low"|"medium"|"high", "description": string}]}. Do not include any other text."#;

fn truncate_diff(diff: &str) -> String {
    if diff.chars().count() <= MAX_DIFF_CHARS {
        diff.to_string()
    } else {
        let mut truncated: String = diff.chars().take(MAX_DIFF_CHARS).collect();
        truncated.push_str("\n... (diff truncated for audit) ...");
        truncated
    }
}

fn fail_safe(reason: &str, files_reviewed: u32) -> AuditReport {
    AuditReport {
        verdict: Verdict::Unsafe,
        summary: format!("audit could not be completed: {reason}"),
        risks: vec![Risk { level: RiskLevel::High, description: reason.to_string() }],
        files_reviewed,
    }
}

fn strip_markdown_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    if let Some(rest) = trimmed.strip_prefix("```json") {
        rest.trim_end_matches("```").trim()
    } else if let Some(rest) = trimmed.strip_prefix("```") {
        rest.trim_end_matches("```").trim()
    } else {
        trimmed
    }
}

fn parse_raw_level(level: Option<String>) -> RiskLevel {
    match level.as_deref() {
        Some("low") => RiskLevel::Low,
        Some("high") => RiskLevel::High,
        // Unknown risk levels default to medium.
        _ => RiskLevel::Medium,
    }
}

/// P8: verdict is `unsafe` whenever (a) no auditor model is configured,
/// (b) the stream fails, or (c) the parsed payload lacks `verdict: "safe"`.
pub async fn run_auditor(
    provider: Option<&dyn ModelProvider>,
    auditor_model: Option<&str>,
    diff: &str,
) -> AuditReport {
    let files_reviewed = diff.matches("\n+++ ").count().max(diff.matches("diff --git").count()) as u32;

    let (provider, model) = match (provider, auditor_model) {
        (Some(p), Some(m)) => (p, m),
        _ => return fail_safe("no auditor model is configured", files_reviewed),
    };

    let bounded = truncate_diff(diff);
    let messages = vec![
        (push_protocol::Role::System, SYSTEM_PROMPT.to_string()),
        (push_protocol::Role::User, bounded),
    ];

    let raw = match provider.complete(model, &messages).await {
        Ok(text) => text,
        Err(e) => return fail_safe(&format!("auditor stream failed: {e}"), files_reviewed),
    };

    let stripped = strip_markdown_fence(&raw);
    let parsed: RawAuditResponse = match serde_json::from_str(stripped) {
        Ok(p) => p,
        Err(e) => return fail_safe(&format!("auditor response was not valid JSON: {e}"), files_reviewed),
    };

    if parsed.verdict.as_deref() != Some("safe") {
        return fail_safe("auditor did not return verdict: \"safe\"", files_reviewed);
    }

    let risks = parsed
        .risks
        .into_iter()
        .map(|r| Risk {
            level: parse_raw_level(r.level),
            description: r.description.unwrap_or_else(|| "unspecified risk".to_string()),
        })
        .collect();

    AuditReport {
        verdict: Verdict::Safe,
        summary: parsed.summary.unwrap_or_else(|| "no summary provided".to_string()),
        risks,
        files_reviewed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn no_auditor_model_is_fail_safe_unsafe() {
        let report = run_auditor(None, None, "diff --git a b\n+hello").await;
        assert_eq!(report.verdict, Verdict::Unsafe);
        assert_eq!(report.risks[0].level, RiskLevel::High);
    }

    struct FailingProvider;
    #[async_trait::async_trait]
    impl ModelProvider for FailingProvider {
        async fn complete(
            &self,
            _model: &str,
            _messages: &[(push_protocol::Role, String)],
        ) -> anyhow::Result<String> {
            anyhow::bail!("stream disconnected")
        }
    }

    #[tokio::test]
    async fn stream_failure_is_fail_safe_unsafe() {
        let report = run_auditor(Some(&FailingProvider), Some("audit-model"), "diff").await;
        assert_eq!(report.verdict, Verdict::Unsafe);
    }

    struct BadJsonProvider;
    #[async_trait::async_trait]
    impl ModelProvider for BadJsonProvider {
        async fn complete(
            &self,
            _model: &str,
            _messages: &[(push_protocol::Role, String)],
        ) -> anyhow::Result<String> {
            Ok("not json at all".to_string())
        }
    }

    #[tokio::test]
    async fn invalid_json_is_fail_safe_unsafe() {
        let report = run_auditor(Some(&BadJsonProvider), Some("audit-model"), "diff").await;
        assert_eq!(report.verdict, Verdict::Unsafe);
    }

    struct SafeProvider;
    #[async_trait::async_trait]
    impl ModelProvider for SafeProvider {
        async fn complete(
            &self,
            _model: &str,
            _messages: &[(push_protocol::Role, String)],
        ) -> anyhow::Result<String> {
            Ok(r#"```json
{"verdict": "safe", "summary": "looks fine", "risks": [{"level": "weird", "description": "x"}]}
```"#
                .to_string())
        }
    }

    #[tokio::test]
    async fn unknown_risk_level_defaults_to_medium() {
        let report = run_auditor(Some(&SafeProvider), Some("audit-model"), "diff").await;
        assert_eq!(report.verdict, Verdict::Safe);
        assert_eq!(report.risks[0].level, RiskLevel::Medium);
    }
}
