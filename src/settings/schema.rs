//! Settings schema definitions for the coaching server.
//!
//! All settings structs use `#[serde(default)]` to allow partial configuration files.
//! Missing fields are filled with sensible defaults.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root settings structure.
///
/// Loaded from `~/.repcoach/settings.toml` with environment variable interpolation support.
/// Version field enables future migrations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RepcoachSettings {
    /// Schema version for migrations
    pub version: u32,

    /// HTTP listener
    pub server: ServerSettings,

    /// Session lifetime and streaming
    pub sessions: SessionSettings,

    /// Generation backend and prompt inputs
    pub generation: GenerationSettings,
}

impl Default for RepcoachSettings {
    fn default() -> Self {
        Self {
            version: 1,
            server: ServerSettings::default(),
            sessions: SessionSettings::default(),
            generation: GenerationSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Bind address
    pub host: String,

    /// Listen port
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// Session store and channel timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Idle time after which a session is discarded
    pub idle_timeout_secs: u64,

    /// Interval of the background sweep
    pub sweep_interval_secs: u64,

    /// Interval between `ping` events on a bound stream
    pub heartbeat_secs: u64,

    /// Maximum rejections per session (0 = unlimited)
    pub max_regenerations: u32,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 1800,
            sweep_interval_secs: 300,
            heartbeat_secs: 30,
            max_regenerations: 0,
        }
    }
}

impl SessionSettings {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs.max(1))
    }

    pub fn regeneration_limit(&self) -> Option<u32> {
        (self.max_regenerations > 0).then_some(self.max_regenerations)
    }
}

/// Generation backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    /// Backend: "template" | "openai"
    pub backend: String,

    /// Number of recent history records included in a prompt
    pub history_limit: usize,

    /// Upper bound on one generation call (0 = no timeout)
    pub timeout_secs: u64,

    /// Replaces the default task description in the prompt
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,

    /// OpenAI-compatible backend settings
    pub openai: OpenAiSettings,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            backend: "template".to_string(),
            history_limit: 5,
            timeout_secs: 0,
            task: None,
            openai: OpenAiSettings::default(),
        }
    }
}

impl GenerationSettings {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

/// OpenAI API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiSettings {
    /// OpenAI API key (supports $ENV_VAR syntax)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Model name
    pub model: String,

    /// Custom base URL for OpenAI-compatible APIs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Sampling temperature
    pub temperature: f32,

    /// Maximum tokens in the completion
    pub max_tokens: u32,
}

impl Default for OpenAiSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            base_url: None,
            temperature: 0.3,
            max_tokens: 800,
        }
    }
}
