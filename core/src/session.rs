//! The durable [`Session`] object (§3) and its on-disk persistence:
//! `state.json` (pretty-printed snapshot) plus `events.jsonl` (append-only
//! event log), mirroring `codex-rs`'s `rollout.rs` recorder.

use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;

use chrono::DateTime;
use chrono::Utc;
use push_ledger::Ledger;
use push_protocol::Event;
use push_protocol::EventMsg;
use push_protocol::Message;
use serde::Deserialize;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use uuid::Uuid;

const PUSH_VERSION: &str = env!("CARGO_PKG_VERSION");

/// The on-disk `state.json` shape. Ledger and version cache are derived,
/// ephemeral state (§3) and are deliberately not part of this snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub provider: String,
    pub model: String,
    pub workspace_root: PathBuf,
    pub round: u64,
    pub seq: u64,
    pub messages: Vec<Message>,
    pub push_version: String,
}

/// A durable session: the append-only message list plus the ephemeral
/// ledger/version-cache derived state that the Tool Layer consults.
pub struct Session {
    pub state: SessionState,
    pub ledger: Ledger,
    pub version_cache: HashMap<String, String>,
    dir: PathBuf,
    events: Option<mpsc::Sender<String>>,
}

impl Session {
    pub fn new(provider: String, model: String, workspace_root: PathBuf, session_dir_root: &Path) -> Self {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let state = SessionState {
            id: id.clone(),
            created_at: now,
            updated_at: now,
            provider,
            model,
            workspace_root,
            round: 0,
            seq: 0,
            messages: Vec::new(),
            push_version: PUSH_VERSION.to_string(),
        };
        Session {
            state,
            ledger: Ledger::new(),
            version_cache: HashMap::new(),
            dir: session_dir_root.join(&id),
            events: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.state.id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Opens (or creates) the session directory and starts the background
    /// event-log writer task, the way `RolloutRecorder::new` does.
    pub async fn start_persistence(&mut self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let events_path = self.dir.join("events.jsonl");
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&events_path)
            .await?;

        let (tx, mut rx) = mpsc::channel::<String>(256);
        tokio::spawn(async move {
            while let Some(line) = rx.recv().await {
                if file.write_all(line.as_bytes()).await.is_err() {
                    break;
                }
                if file.write_all(b"\n").await.is_err() {
                    break;
                }
                let _ = file.flush().await;
            }
        });
        self.events = Some(tx);
        self.persist_state().await
    }

    /// Appends one event and bumps the strictly-monotonic sequence counter
    /// (I4, P10).
    pub async fn emit(&mut self, msg: EventMsg) {
        self.state.seq += 1;
        let event = Event {
            ts: Utc::now(),
            seq: self.state.seq,
            msg,
        };
        if let Some(tx) = &self.events {
            if let Ok(line) = serde_json::to_string(&event) {
                let _ = tx.send(line).await;
            }
        }
    }

    pub fn push_message(&mut self, message: Message) {
        self.state.messages.push(message);
        self.state.updated_at = Utc::now();
    }

    /// Writes `state.json` and the sibling `ledger.json` snapshot via
    /// temp-file-then-rename so a crash mid-write never leaves a truncated
    /// snapshot (I5). The ledger is persisted alongside `state.json` so a
    /// `push --session <id>` resume — an agent handoff, not a reset — keeps
    /// the read-before-write gate intact (§4.2).
    pub async fn persist_state(&self) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(&self.state)?;
        let final_path = self.dir.join("state.json");
        let tmp_path = self.dir.join("state.json.tmp");
        tokio::fs::write(&tmp_path, json).await?;
        tokio::fs::rename(&tmp_path, &final_path).await?;

        let ledger_json = serde_json::to_string_pretty(&self.ledger)?;
        let ledger_final = self.dir.join("ledger.json");
        let ledger_tmp = self.dir.join("ledger.json.tmp");
        tokio::fs::write(&ledger_tmp, ledger_json).await?;
        tokio::fs::rename(&ledger_tmp, &ledger_final).await?;
        Ok(())
    }

    pub async fn load(session_dir_root: &Path, id: &str) -> std::io::Result<Self> {
        let dir = session_dir_root.join(id);
        let contents = tokio::fs::read_to_string(dir.join("state.json")).await?;
        let state: SessionState = serde_json::from_str(&contents)?;

        let ledger = match tokio::fs::read_to_string(dir.join("ledger.json")).await {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_default(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ledger::new(),
            Err(e) => return Err(e),
        };

        let mut session = Session {
            state,
            ledger,
            version_cache: HashMap::new(),
            dir,
            events: None,
        };
        session.start_persistence().await?;
        Ok(session)
    }

    /// Lists persisted session ids under `session_dir_root`, newest first
    /// (`push sessions`).
    pub async fn list_all(session_dir_root: &Path) -> std::io::Result<Vec<SessionState>> {
        let mut out = Vec::new();
        let mut entries = match tokio::fs::read_dir(session_dir_root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
            Err(e) => return Err(e),
        };
        while let Some(entry) = entries.next_entry().await? {
            let state_path = entry.path().join("state.json");
            if let Ok(contents) = tokio::fs::read_to_string(&state_path).await {
                if let Ok(state) = serde_json::from_str::<SessionState>(&contents) {
                    out.push(state);
                }
            }
        }
        out.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[tokio::test]
    async fn persist_and_reload_round_trips_state() {
        let tmp = tempfile::tempdir().unwrap();
        let mut session = Session::new(
            "ollama".to_string(),
            "gpt-5-codex".to_string(),
            PathBuf::from("/workspace"),
            tmp.path(),
        );
        session.start_persistence().await.unwrap();
        session.push_message(Message::new(push_protocol::Role::User, "hello"));
        session.persist_state().await.unwrap();

        let reloaded = Session::load(tmp.path(), session.id()).await.unwrap();
        assert_eq!(reloaded.state.messages.len(), 1);
        assert_eq!(reloaded.state.id, session.state.id);
    }

    #[tokio::test]
    async fn event_sequence_is_strictly_monotonic() {
        let tmp = tempfile::tempdir().unwrap();
        let mut session = Session::new(
            "ollama".to_string(),
            "m".to_string(),
            PathBuf::from("/workspace"),
            tmp.path(),
        );
        session.start_persistence().await.unwrap();
        session.emit(EventMsg::SessionStarted { session_id: session.id().to_string() }).await;
        let first = session.state.seq;
        session.emit(EventMsg::UserMessage { content: "hi".into() }).await;
        let second = session.state.seq;
        assert!(second > first);
    }
}
