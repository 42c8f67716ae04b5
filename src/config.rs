use crate::defaults;
use crate::error::{BanterError, Result};
use crate::stt::chunk::ChunkPolicy;
use crate::stt::protocol::TranscriptKind;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub audio: AudioConfig,
    pub stt: SttConfig,
    pub chat: ChatConfig,
    pub playback: PlaybackConfig,
}

/// Audio format and encoder configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    /// External encoder executable used for non-WAV synthesis clips.
    pub encoder: String,
}

/// Streaming transcription service configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SttConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    /// Which transcript kind the link forwards: "partial" or "final".
    pub transcript: TranscriptKind,
    pub min_chunk_ms: u64,
    pub max_chunk_ms: u64,
    pub usable_min_chunk_ms: u64,
}

/// Conversational backend configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChatConfig {
    pub language: String,
    /// Cooldown before retrying a rate-limited request (e.g. "60s", "2m").
    pub retry_cooldown: String,
}

/// Playback session configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Track queue capacity; 0 means unbounded.
    pub queue_capacity: usize,
    /// Initial idle timeout (e.g. "30s"); absent means wait indefinitely.
    pub idle_timeout: Option<String>,
    /// Idle timeout applied after the queue first runs dry.
    pub recovery_idle_timeout: String,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: defaults::SAMPLE_RATE,
            encoder: defaults::ENCODER_PROGRAM.to_string(),
        }
    }
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            endpoint: "wss://api.assemblyai.com/v2/realtime/ws".to_string(),
            api_key: None,
            transcript: TranscriptKind::Final,
            min_chunk_ms: defaults::MIN_CHUNK_MS,
            max_chunk_ms: defaults::MAX_CHUNK_MS,
            usable_min_chunk_ms: defaults::USABLE_MIN_CHUNK_MS,
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            language: defaults::DEFAULT_LANGUAGE.to_string(),
            retry_cooldown: "60s".to_string(),
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 0,
            idle_timeout: None,
            recovery_idle_timeout: "2m".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Only returns defaults if the file is missing.
    /// Returns errors for invalid TOML.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                if e.downcast_ref::<std::io::Error>()
                    .map(|io_err| io_err.kind() == std::io::ErrorKind::NotFound)
                    .unwrap_or(false)
                {
                    Self::default()
                } else {
                    panic!("Failed to load config from {}: {}", path.display(), e);
                }
            }
        }
    }

    /// Default config file location under the user config directory.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("banter")
            .join("config.toml")
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - BANTER_API_KEY → stt.api_key
    /// - BANTER_ENDPOINT → stt.endpoint
    /// - BANTER_LANGUAGE → chat.language
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(key) = std::env::var("BANTER_API_KEY")
            && !key.is_empty()
        {
            self.stt.api_key = Some(key);
        }

        if let Ok(endpoint) = std::env::var("BANTER_ENDPOINT")
            && !endpoint.is_empty()
        {
            self.stt.endpoint = endpoint;
        }

        if let Ok(language) = std::env::var("BANTER_LANGUAGE")
            && !language.is_empty()
        {
            self.chat.language = language;
        }

        self
    }

    /// Validate cross-field constraints and duration strings.
    pub fn validate(&self) -> Result<()> {
        if self.audio.sample_rate == 0 || self.audio.sample_rate % 1000 != 0 {
            return Err(BanterError::ConfigInvalidValue {
                key: "audio.sample_rate".to_string(),
                message: "must be a positive multiple of 1000 Hz".to_string(),
            });
        }
        if self.stt.min_chunk_ms >= self.stt.usable_min_chunk_ms
            || self.stt.usable_min_chunk_ms >= self.stt.max_chunk_ms
        {
            return Err(BanterError::ConfigInvalidValue {
                key: "stt".to_string(),
                message: format!(
                    "chunk window must satisfy min < usable_min < max, got {} / {} / {}",
                    self.stt.min_chunk_ms, self.stt.usable_min_chunk_ms, self.stt.max_chunk_ms
                ),
            });
        }
        self.retry_cooldown()?;
        self.idle_timeout()?;
        self.recovery_idle_timeout()?;
        Ok(())
    }

    /// Chunk accumulation policy derived from the stt and audio sections.
    pub fn chunk_policy(&self) -> ChunkPolicy {
        ChunkPolicy {
            min_ms: self.stt.min_chunk_ms,
            max_ms: self.stt.max_chunk_ms,
            usable_min_ms: self.stt.usable_min_chunk_ms,
            sample_rate: self.audio.sample_rate,
        }
    }

    /// Parsed rate-limit retry cooldown.
    pub fn retry_cooldown(&self) -> Result<Duration> {
        parse_duration("chat.retry_cooldown", &self.chat.retry_cooldown)
    }

    /// Parsed initial idle timeout, if configured.
    pub fn idle_timeout(&self) -> Result<Option<Duration>> {
        match &self.playback.idle_timeout {
            Some(s) => Ok(Some(parse_duration("playback.idle_timeout", s)?)),
            None => Ok(None),
        }
    }

    /// Parsed post-silence recovery idle timeout.
    pub fn recovery_idle_timeout(&self) -> Result<Duration> {
        parse_duration(
            "playback.recovery_idle_timeout",
            &self.playback.recovery_idle_timeout,
        )
    }
}

fn parse_duration(key: &str, value: &str) -> Result<Duration> {
    humantime::parse_duration(value).map_err(|e| BanterError::ConfigInvalidValue {
        key: key.to_string(),
        message: format!("invalid duration '{}': {}", value, e),
    })
}
