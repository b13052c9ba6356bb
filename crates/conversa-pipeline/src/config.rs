//! Configuration
//!
//! Resolved in layers — built-in defaults, then an optional TOML file, then
//! `CONVERSA_`-prefixed environment variables — each layer overriding only
//! the keys it sets. The CLI-flag layer on top of this lives in the server
//! binary, which parses flags with `clap` and applies them as a final
//! override before validation.

use crate::gate::FailMode;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfigToml {
    pub budget_ms: u64,
    pub fail_mode: String,
}

impl Default for GateConfigToml {
    fn default() -> Self {
        Self { budget_ms: 400, fail_mode: "open".into() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TurnConfigToml {
    pub stabilise_ms: u64,
    pub hard_deadline_ms: u64,
}

impl Default for TurnConfigToml {
    fn default() -> Self {
        Self { stabilise_ms: 700, hard_deadline_ms: 8_000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfigToml {
    pub forward_partial_during_tts: bool,
}

impl Default for TransportConfigToml {
    fn default() -> Self {
        Self { forward_partial_during_tts: false }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfigToml {
    pub recall_budget_ms: u64,
    pub store_assistant_turns: bool,
}

impl Default for MemoryConfigToml {
    fn default() -> Self {
        Self { recall_budget_ms: 50, store_assistant_turns: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfigToml {
    pub level: String,
    pub format: String,
}

impl Default for LogConfigToml {
    fn default() -> Self {
        Self { level: "info".into(), format: "pretty".into() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RobotConfigToml {
    pub enabled: bool,
    pub address: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObserverConfigToml {
    pub snapshot_ms: u64,
}

impl Default for ObserverConfigToml {
    fn default() -> Self {
        Self { snapshot_ms: 500 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub gate: GateConfigToml,
    pub turn: TurnConfigToml,
    pub transport: TransportConfigToml,
    pub memory: MemoryConfigToml,
    pub log: LogConfigToml,
    pub robot: RobotConfigToml,
    pub observer: ObserverConfigToml,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read { path: String, source: std::io::Error },

    #[error("failed to parse config file {path}: {source}")]
    Parse { path: String, source: toml::de::Error },

    #[error("invalid config value for {field}: {detail}")]
    Invalid { field: &'static str, detail: String },
}

impl Config {
    /// Loads defaults, overlays an optional TOML file, then overlays
    /// `CONVERSA_`-prefixed environment variables, and validates the result.
    pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
        let mut config = Config::default();
        if let Some(path) = path {
            let text = std::fs::read_to_string(path)
                .map_err(|source| ConfigError::Read { path: path.display().to_string(), source })?;
            config = toml::from_str(&text)
                .map_err(|source| ConfigError::Parse { path: path.display().to_string(), source })?;
        }
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("CONVERSA_GATE_BUDGET_MS") {
            if let Ok(v) = v.parse() {
                self.gate.budget_ms = v;
            }
        }
        if let Ok(v) = std::env::var("CONVERSA_GATE_FAIL_MODE") {
            self.gate.fail_mode = v;
        }
        if let Ok(v) = std::env::var("CONVERSA_LOG_LEVEL") {
            self.log.level = v;
        }
        if let Ok(v) = std::env::var("CONVERSA_LOG_FORMAT") {
            self.log.format = v;
        }
        if let Ok(v) = std::env::var("CONVERSA_TRANSPORT_FORWARD_PARTIAL_DURING_TTS") {
            if let Ok(v) = v.parse() {
                self.transport.forward_partial_during_tts = v;
            }
        }
        if let Ok(v) = std::env::var("CONVERSA_MEMORY_STORE_ASSISTANT_TURNS") {
            if let Ok(v) = v.parse() {
                self.memory.store_assistant_turns = v;
            }
        }
        if let Ok(v) = std::env::var("CONVERSA_ROBOT_ENABLED") {
            if let Ok(v) = v.parse() {
                self.robot.enabled = v;
            }
        }
        if let Ok(v) = std::env::var("CONVERSA_ROBOT_ADDRESS") {
            self.robot.address = Some(v);
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.gate.fail_mode != "open" && self.gate.fail_mode != "closed" {
            return Err(ConfigError::Invalid {
                field: "gate.fail_mode",
                detail: format!("expected 'open' or 'closed', got '{}'", self.gate.fail_mode),
            });
        }
        if self.log.format != "pretty" && self.log.format != "json" {
            return Err(ConfigError::Invalid {
                field: "log.format",
                detail: format!("expected 'pretty' or 'json', got '{}'", self.log.format),
            });
        }
        if self.robot.enabled && self.robot.address.is_none() {
            return Err(ConfigError::Invalid {
                field: "robot.address",
                detail: "robot.enabled is true but robot.address is unset".into(),
            });
        }
        Ok(())
    }

    pub fn gate_fail_mode(&self) -> FailMode {
        match self.gate.fail_mode.as_str() {
            "closed" => FailMode::Closed,
            _ => FailMode::Open,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass_validation() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn invalid_fail_mode_is_rejected() {
        let mut config = Config::default();
        config.gate.fail_mode = "maybe".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn robot_enabled_without_address_is_rejected() {
        let mut config = Config::default();
        config.robot.enabled = true;
        assert!(config.validate().is_err());
        config.robot.address = Some("http://127.0.0.1:50051".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn toml_overlay_overrides_only_set_fields() {
        let toml_text = "[gate]\nbudget_ms = 250\n";
        let config: Config = toml::from_str(toml_text).unwrap();
        assert_eq!(config.gate.budget_ms, 250);
        assert_eq!(config.gate.fail_mode, "open");
        assert_eq!(config.turn.stabilise_ms, 700);
    }

    #[test]
    fn env_overlay_applies_on_top_of_defaults() {
        std::env::set_var("CONVERSA_GATE_FAIL_MODE", "closed");
        let mut config = Config::default();
        config.apply_env();
        assert_eq!(config.gate_fail_mode(), FailMode::Closed);
        std::env::remove_var("CONVERSA_GATE_FAIL_MODE");
    }
}
