use crate::global;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub browser: BrowserConfig,
    pub bot: BotConfig,
    pub session: SessionConfig,
    pub watcher: WatcherConfig,
    pub recording: RecordingConfig,
    pub transcription: TranscriptionConfig,
    pub metadata: MetadataConfig,
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// DevTools address of an already-running Chromium instance.
    pub devtools_url: String,
    /// Seconds to wait for page navigation before giving up.
    pub navigation_timeout_seconds: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            devtools_url: "http://127.0.0.1:9222".to_string(),
            navigation_timeout_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Display name submitted on pre-join screens.
    pub display_name: String,
    /// When the browser profile is already signed in, skip the name prompt.
    pub use_authenticated_identity: bool,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            display_name: "Notetaker".to_string(),
            use_authenticated_identity: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Seconds between monitoring ticks once in a session.
    pub monitor_poll_seconds: u64,
    /// Seconds a session may stay participant-less before it is ended.
    pub empty_timeout_seconds: u64,
    /// Hard cap on session length, in seconds.
    pub max_duration_seconds: u64,
    /// Maximum seconds to wait in a host-gated waiting room.
    pub admission_max_wait_seconds: u64,
    /// Seconds between waiting-room checks.
    pub admission_poll_seconds: u64,
    /// Seconds between waiting-room progress log lines.
    pub admission_log_seconds: u64,
    /// When a session emptied out, discard the audio instead of transcribing.
    pub skip_transcription_when_emptied: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            monitor_poll_seconds: 5,
            empty_timeout_seconds: 900,
            max_duration_seconds: 14_400,
            admission_max_wait_seconds: 600,
            admission_poll_seconds: 3,
            admission_log_seconds: 30,
            skip_transcription_when_emptied: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// Seconds between incoming-call checks while idle.
    pub ring_poll_seconds: u64,
    /// Seconds to wait before answering an allowed call.
    pub pre_answer_delay_seconds: u64,
    /// Seconds between in-call monitoring ticks.
    pub call_poll_seconds: u64,
    /// Hard cap on call length, in seconds.
    pub max_call_seconds: u64,
    /// Maximum seconds to wait for the web session to be re-authenticated.
    pub auth_wait_seconds: u64,
    /// Seconds between audio routing refreshes during a call (0 disables).
    pub routing_refresh_seconds: u64,
    /// Shell command run on each routing refresh.
    pub routing_refresh_command: String,
    /// Caller patterns always answered. Empty means everyone not blocked.
    pub allow: Vec<String>,
    /// Caller patterns always declined. Takes precedence over allow.
    pub block: Vec<String>,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            ring_poll_seconds: 2,
            pre_answer_delay_seconds: 3,
            call_poll_seconds: 5,
            max_call_seconds: 7_200,
            auth_wait_seconds: 600,
            routing_refresh_seconds: 30,
            routing_refresh_command: String::new(),
            allow: Vec::new(),
            block: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    /// PulseAudio source to capture (a sink monitor, usually).
    pub pulse_source: String,
    /// Directory for audio files and session artifacts. Empty = data dir.
    pub output_dir: String,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            pulse_source: "default".to_string(),
            output_dir: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionConfig {
    /// Shell command that transcribes the audio file passed as "$1" and
    /// prints the transcript to stdout. Empty disables transcription.
    pub command: String,
    /// Timeout in seconds for the transcription command.
    pub timeout_seconds: u64,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            command: String::new(),
            timeout_seconds: 7_200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    /// Chat-completions endpoint used for summary generation.
    pub api_endpoint: String,
    pub api_key: Option<String>,
    pub model: String,
    /// Timeout in seconds for one metadata request.
    pub timeout_seconds: u64,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            api_endpoint: "https://openrouter.ai/api/v1".to_string(),
            api_key: None,
            model: "anthropic/claude-3-haiku".to_string(),
            timeout_seconds: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self { port: 3929 }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        if !config_path.exists() {
            info!(
                "Config file not found, creating default at {:?}",
                config_path
            );
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let content =
            std::fs::read_to_string(&config_path).context("Failed to read config file")?;

        let config: Self = toml::from_str(&content).context("Failed to parse config file")?;

        info!("Loaded config from {:?}", config_path);
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(&config_path, content).context("Failed to write config file")?;

        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        global::config_file()
    }
}
