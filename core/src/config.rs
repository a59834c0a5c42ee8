//! Application configuration, layered file-defaults < environment <
//! CLI flags, the way `codex-rs`'s `config.rs` layers its own `Config`.

use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;

const CONFIG_FILE_NAME: &str = "config.toml";
const DEFAULT_MODEL: &str = "gpt-5-codex";
const DEFAULT_MAX_ROUNDS: u32 = 8;
const HARD_MAX_ROUNDS: u32 = 30;

/// On-disk `config.toml` shape. Every field is optional — absent fields fall
/// back to built-in defaults, then to CLI overrides.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigToml {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub sandbox_base_url: Option<String>,
    pub auditor_model: Option<String>,
    pub max_rounds: Option<u32>,
}

/// CLI-level overrides, mirrored 1:1 onto the `push` flags (§6).
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub cwd: Option<PathBuf>,
    pub max_rounds: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub provider_id: String,
    pub model: String,
    pub workspace_root: PathBuf,
    pub max_rounds: u32,
    pub sandbox_base_url: String,
    pub auditor_model: Option<String>,
    pub session_dir: PathBuf,
}

pub fn push_config_dir() -> PathBuf {
    std::env::var_os("PUSH_CONFIG_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_default().join(".push"))
}

pub fn session_dir() -> PathBuf {
    std::env::var_os("PUSH_SESSION_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("./.push/sessions"))
}

fn load_config_toml(dir: &Path) -> ConfigToml {
    let path = dir.join(CONFIG_FILE_NAME);
    match std::fs::read_to_string(&path) {
        Ok(contents) => toml::from_str(&contents).unwrap_or_default(),
        Err(_) => ConfigToml::default(),
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_u32(name: &str) -> Option<u32> {
    env_string(name).and_then(|s| s.parse().ok())
}

impl Config {
    /// Layers `file defaults < environment < CLI flags` (overrides always
    /// win): `PUSH_PROVIDER`, `PUSH_MODEL`, `PUSH_MAX_ROUNDS`,
    /// `PUSH_SANDBOX_BASE_URL`, `PUSH_AUDITOR_MODEL` sit between `file` and
    /// `overrides` in every `.or()` chain.
    pub fn load(overrides: ConfigOverrides) -> std::io::Result<Self> {
        let file = load_config_toml(&push_config_dir());
        let cwd = overrides
            .cwd
            .clone()
            .map(Ok)
            .unwrap_or_else(std::env::current_dir)?;

        let max_rounds = overrides
            .max_rounds
            .or_else(|| env_u32("PUSH_MAX_ROUNDS"))
            .or(file.max_rounds)
            .unwrap_or(DEFAULT_MAX_ROUNDS)
            .clamp(1, HARD_MAX_ROUNDS);

        Ok(Config {
            provider_id: overrides
                .provider
                .or_else(|| env_string("PUSH_PROVIDER"))
                .or(file.provider)
                .unwrap_or_else(|| "ollama".to_string()),
            model: overrides
                .model
                .or_else(|| env_string("PUSH_MODEL"))
                .or(file.model)
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            workspace_root: cwd,
            max_rounds,
            sandbox_base_url: env_string("PUSH_SANDBOX_BASE_URL")
                .or(file.sandbox_base_url)
                .unwrap_or_else(|| "http://localhost:8080".to_string()),
            auditor_model: env_string("PUSH_AUDITOR_MODEL").or(file.auditor_model),
            session_dir: session_dir(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_rounds_is_clamped_to_hard_ceiling() {
        let cfg = Config::load(ConfigOverrides {
            max_rounds: Some(999),
            cwd: Some(PathBuf::from(".")),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(cfg.max_rounds, HARD_MAX_ROUNDS);
    }

    #[test]
    fn max_rounds_defaults_to_eight() {
        let cfg = Config::load(ConfigOverrides {
            cwd: Some(PathBuf::from(".")),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(cfg.max_rounds, DEFAULT_MAX_ROUNDS);
    }
}
