//! The Agent Loop (C5, §4.5): a single-threaded cooperative driver over a
//! [`Session`] that streams model output, detects and dispatches tool
//! calls, enforces round/context/timeout budgets, and persists state after
//! every step. Headless and interactive entry points share this driver.

use std::collections::HashMap;
use std::time::Duration;

use futures::StreamExt;
use push_protocol::EventMsg;
use push_protocol::Message;
use push_protocol::Role;
use push_protocol::ToolCall;
use push_sandbox_client::SandboxClient;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::detect::find_tool_call;
use crate::provider::ModelProvider;
use crate::session::Session;
use crate::tool_layer::ToolContext;
use crate::tools;

const ROUND_TIMEOUT: Duration = Duration::from_secs(180);
const TOOL_RESULT_MAX_CHARS: usize = 24_000;
const CONTEXT_TRIM_WATERMARK_CHARS: usize = 120_000;
const CONTEXT_SAFETY_THRESHOLD_MESSAGES: usize = 14;
const KEEP_RECENT_MESSAGES: usize = 9;
const LOOP_GUARD_REPEATS: u32 = 3;

const SYSTEM_PROMPT: &str = r#"You are a coding agent operating inside a remote sandbox workspace. To act, emit exactly one fenced ```json block per turn of shape {"tool": "<name>", "args": {...}}. Available tools: exec, read_file, list_dir, search, write_file, edit_file, apply_patchset, diff, prepare_commit, push, save_draft, run_tests, check_types, read_symbols, download, promote_to_github. When you are done, respond with plain text and no tool call."#;

/// How a user turn concluded. P9: every input terminates in exactly one of
/// these, and `round` never exceeds `max_rounds`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    Success { text: String },
    MaxRounds,
    LoopDetected,
    Timeout,
    Cancelled,
    /// A fatal, non-timeout provider failure (stream disconnect, malformed
    /// transport response) — distinct from the round-level timeout but
    /// still a terminal outcome for the turn.
    ProviderError { message: String },
}

impl TurnOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TurnOutcome::Success { .. })
    }

    fn outcome_tag(&self) -> &'static str {
        match self {
            TurnOutcome::Success { .. } => "success",
            TurnOutcome::MaxRounds => "max_rounds",
            TurnOutcome::LoopDetected => "loop_detected",
            TurnOutcome::Timeout => "timeout",
            TurnOutcome::Cancelled => "cancelled",
            TurnOutcome::ProviderError { .. } => "error",
        }
    }
}

pub struct AgentLoop<'a> {
    pub sandbox: &'a SandboxClient,
    pub provider: &'a dyn ModelProvider,
    pub model: String,
    pub auditor: Option<&'a dyn ModelProvider>,
    pub auditor_model: Option<String>,
    pub max_rounds: u32,
    pub cancel: CancellationToken,
}

impl<'a> AgentLoop<'a> {
    /// Runs one user turn to completion (§4.5 "Per-user-turn procedure").
    pub async fn run_turn(&self, session: &mut Session, user_text: &str) -> TurnOutcome {
        if session.state.messages.is_empty() {
            session.push_message(Message::new(Role::System, SYSTEM_PROMPT));
        }
        session.push_message(Message::new(Role::User, user_text));
        let _ = session.persist_state().await;
        session.emit(EventMsg::UserMessage { content: user_text.to_string() }).await;

        session.ledger.advance_round();

        let mut last_signature: Option<String> = None;
        let mut repeat_count: u32 = 0;

        for round in 1..=self.max_rounds {
            if self.cancel.is_cancelled() {
                return self.finish_cancelled(session, round).await;
            }

            let messages: Vec<(Role, String)> = session
                .state
                .messages
                .iter()
                .map(|m| (m.role, m.content.clone()))
                .collect();

            let stream_result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return self.finish_cancelled(session, round).await,
                result = tokio::time::timeout(ROUND_TIMEOUT, self.accumulate_stream(&messages)) => result,
            };

            let assistant_text = match stream_result {
                Err(_elapsed) => {
                    warn!(round, "agent loop round timed out");
                    session
                        .emit(EventMsg::Error {
                            error_type: "EXEC_TIMEOUT".to_string(),
                            message: format!("round {round} exceeded {ROUND_TIMEOUT:?}"),
                        })
                        .await;
                    return self.finish(session, round, TurnOutcome::Timeout).await;
                }
                Ok(Err(e)) => {
                    warn!(round, error = %e, "agent loop provider stream failed");
                    session
                        .emit(EventMsg::Error { error_type: "UNKNOWN".to_string(), message: e.to_string() })
                        .await;
                    return self
                        .finish(session, round, TurnOutcome::ProviderError { message: e.to_string() })
                        .await;
                }
                Ok(Ok(text)) => text,
            };

            session.push_message(Message::new(Role::Assistant, assistant_text.clone()));
            let _ = session.persist_state().await;
            session.emit(EventMsg::AssistantDone { content: assistant_text.clone() }).await;

            let Some(call) = find_tool_call(&assistant_text) else {
                return self.finish(session, round, TurnOutcome::Success { text: assistant_text }).await;
            };

            let signature = call.signature();
            if last_signature.as_deref() == Some(signature.as_str()) {
                repeat_count += 1;
            } else {
                last_signature = Some(signature);
                repeat_count = 1;
            }
            if repeat_count >= LOOP_GUARD_REPEATS {
                warn!(round, "agent loop detected a repeated tool call, terminating turn");
                session
                    .emit(EventMsg::Error {
                        error_type: "LOOP_DETECTED".to_string(),
                        message: format!("repeated tool call loop: {signature}"),
                    })
                    .await;
                return self.finish(session, round, TurnOutcome::LoopDetected).await;
            }

            session
                .emit(EventMsg::ToolCall { tool: call.tool.to_string(), args: call.args.clone() })
                .await;

            let dispatch = self.dispatch_with_cancel(session, call);
            let result = match dispatch.await {
                Some(result) => result,
                None => return self.finish_cancelled(session, round).await,
            };

            session
                .emit(EventMsg::ToolResult {
                    tool: result.tool.to_string(),
                    ok: result.ok,
                    preview: result.text.chars().take(200).collect(),
                })
                .await;

            let synthetic = result.to_synthetic_message(TOOL_RESULT_MAX_CHARS);
            session.push_message(Message::synthetic_tool_result(synthetic));
            trim_context(&mut session.state.messages);
            let _ = session.persist_state().await;

            debug!(
                round,
                ledger_checks = session.ledger.metrics().checks,
                ledger_allows = session.ledger.metrics().allows,
                "agent loop round complete"
            );
        }

        self.finish(session, self.max_rounds, TurnOutcome::MaxRounds).await
    }

    async fn accumulate_stream(&self, messages: &[(Role, String)]) -> anyhow::Result<String> {
        let mut stream = self.provider.stream_completion(&self.model, messages).await?;
        let mut buf = String::new();
        while let Some(chunk) = stream.next().await {
            buf.push_str(&chunk?);
        }
        Ok(buf)
    }

    /// Dispatches `call` via the Tool Layer, racing cancellation. Returns
    /// `None` if cancellation won the race.
    async fn dispatch_with_cancel(
        &self,
        session: &mut Session,
        call: ToolCall,
    ) -> Option<push_protocol::ToolResult> {
        let mut ctx = ToolContext {
            sandbox: self.sandbox,
            ledger: &mut session.ledger,
            version_cache: &mut session.version_cache,
            workspace_root: session.state.workspace_root.to_string_lossy().to_string(),
            auditor: self.auditor,
            auditor_model: self.auditor_model.as_deref(),
        };
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            result = tools::dispatch(call, &mut ctx) => Some(result),
        }
    }

    async fn finish(&self, session: &mut Session, round: u32, outcome: TurnOutcome) -> TurnOutcome {
        session
            .emit(EventMsg::RunComplete {
                outcome: outcome.outcome_tag().to_string(),
                rounds: u64::from(round),
            })
            .await;
        let _ = session.persist_state().await;
        info!(round, outcome = outcome.outcome_tag(), "agent loop turn finished");
        outcome
    }

    async fn finish_cancelled(&self, session: &mut Session, round: u32) -> TurnOutcome {
        self.finish(session, round, TurnOutcome::Cancelled).await
    }
}

/// §4.5.g Context trim: drops the oldest messages once the total character
/// count crosses the watermark and the message count exceeds the safety
/// threshold, preserving the system prompt, the first task message, and the
/// most recent [`KEEP_RECENT_MESSAGES`].
fn trim_context(messages: &mut Vec<Message>) {
    let total_chars: usize = messages.iter().map(|m| m.content.len()).sum();
    if total_chars <= CONTEXT_TRIM_WATERMARK_CHARS || messages.len() <= CONTEXT_SAFETY_THRESHOLD_MESSAGES {
        return;
    }

    let system_end = if matches!(messages.first().map(|m| m.role), Some(Role::System)) { 1 } else { 0 };
    let task_end = system_end + 1;
    if messages.len() <= task_end + KEEP_RECENT_MESSAGES {
        return;
    }
    let recent_start = messages.len() - KEEP_RECENT_MESSAGES;
    if recent_start <= task_end {
        return;
    }

    let dropped_tools: Vec<String> = messages[task_end..recent_start]
        .iter()
        .filter_map(|m| extract_tool_name(&m.content))
        .collect();

    let mut summary = "[CONTEXT_TRIM] earlier tool activity was dropped to stay within budget".to_string();
    if !dropped_tools.is_empty() {
        summary.push_str(&format!(": {}", dropped_tools.join(", ")));
    }

    let mut trimmed = Vec::with_capacity(task_end + 1 + KEEP_RECENT_MESSAGES);
    trimmed.extend(messages[..task_end].iter().cloned());
    trimmed.push(Message::synthetic_tool_result(summary));
    trimmed.extend(messages[recent_start..].iter().cloned());
    *messages = trimmed;
}

fn extract_tool_name(content: &str) -> Option<String> {
    let marker = "\"tool\": \"";
    let start = content.find(marker)? + marker.len();
    let end = content[start..].find('"')? + start;
    Some(content[start..end].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trim_context_leaves_short_history_untouched() {
        let mut messages = vec![Message::new(Role::User, "hi")];
        trim_context(&mut messages);
        assert_eq!(messages.len(), 1);
    }

    #[test]
    fn trim_context_drops_middle_and_keeps_bookends() {
        let mut messages = vec![Message::new(Role::System, SYSTEM_PROMPT), Message::new(Role::User, "do the task")];
        for i in 0..40 {
            messages.push(Message::new(Role::Assistant, "a".repeat(4000)));
            messages.push(Message::synthetic_tool_result(format!(
                "[TOOL_RESULT] {{\"meta\": {{\"tool\": \"exec{i}\", \"ok\": true}}, \"output\": \"x\"}} [/TOOL_RESULT]"
            )));
        }
        let before = messages.len();
        trim_context(&mut messages);
        assert!(messages.len() < before);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[1].content, "do the task");
        assert!(messages[2].content.contains("[CONTEXT_TRIM]"));
        assert_eq!(messages.last().unwrap().role, Role::ToolResult);
    }

    #[test]
    fn extract_tool_name_reads_meta_field() {
        let content = "[TOOL_RESULT] {\"meta\": {\"tool\": \"exec\", \"ok\": true}, \"output\": \"\"} [/TOOL_RESULT]";
        assert_eq!(extract_tool_name(content), Some("exec".to_string()));
    }

    struct EchoProvider;
    #[async_trait::async_trait]
    impl ModelProvider for EchoProvider {
        async fn stream_completion(
            &self,
            _model: &str,
            _messages: &[(Role, String)],
        ) -> anyhow::Result<crate::provider::TokenStream> {
            let tokens: Vec<anyhow::Result<String>> = vec![Ok("no tool call here".to_string())];
            Ok(Box::pin(futures::stream::iter(tokens)))
        }
    }

    #[tokio::test]
    async fn turn_without_tool_call_succeeds_on_first_round() {
        let tmp = tempfile::tempdir().unwrap();
        let mut session = Session::new(
            "ollama".to_string(),
            "m".to_string(),
            std::path::PathBuf::from("/workspace"),
            tmp.path(),
        );
        session.start_persistence().await.unwrap();

        let sandbox = SandboxClient::new("http://localhost:1");
        let provider = EchoProvider;
        let agent_loop = AgentLoop {
            sandbox: &sandbox,
            provider: &provider,
            model: "m".to_string(),
            auditor: None,
            auditor_model: None,
            max_rounds: 8,
            cancel: CancellationToken::new(),
        };

        let outcome = agent_loop.run_turn(&mut session, "hello").await;
        assert_eq!(outcome, TurnOutcome::Success { text: "no tool call here".to_string() });
    }

    #[tokio::test]
    async fn cancellation_before_first_round_yields_cancelled_outcome() {
        let tmp = tempfile::tempdir().unwrap();
        let mut session = Session::new(
            "ollama".to_string(),
            "m".to_string(),
            std::path::PathBuf::from("/workspace"),
            tmp.path(),
        );
        session.start_persistence().await.unwrap();

        let sandbox = SandboxClient::new("http://localhost:1");
        let provider = EchoProvider;
        let cancel = CancellationToken::new();
        cancel.cancel();
        let agent_loop = AgentLoop {
            sandbox: &sandbox,
            provider: &provider,
            model: "m".to_string(),
            auditor: None,
            auditor_model: None,
            max_rounds: 8,
            cancel,
        };

        let outcome = agent_loop.run_turn(&mut session, "hello").await;
        assert_eq!(outcome, TurnOutcome::Cancelled);
    }
}
