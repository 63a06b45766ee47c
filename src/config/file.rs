//! TOML configuration file loading
//!
//! Supports `~/.config/omni/beacon-voice/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct VoiceConfigFile {
    /// Capture and coordinator timing
    #[serde(default)]
    pub timing: TimingFileConfig,

    /// Speech output chain
    #[serde(default)]
    pub output: OutputFileConfig,

    /// Backend reply service
    #[serde(default)]
    pub backend: BackendFileConfig,

    /// User profile forwarded to the backend
    #[serde(default)]
    pub profile: ProfileFileConfig,

    /// Environment hints for the output pre-classifier
    #[serde(default)]
    pub environment: EnvironmentFileConfig,
}

/// Timing overrides, all in milliseconds
#[derive(Debug, Default, Deserialize)]
pub struct TimingFileConfig {
    pub restart_cooldown_ms: Option<u64>,
    pub silence_debounce_ms: Option<u64>,
    pub restart_stabilization_ms: Option<u64>,
    pub health_interval_ms: Option<u64>,
    pub recovery_interval_ms: Option<u64>,
    pub recovery_stale_ms: Option<u64>,
    pub no_speech_backoff_ms: Option<u64>,
    pub device_backoff_ms: Option<u64>,
    pub unknown_backoff_ms: Option<u64>,
    pub speaking_monitor_ms: Option<u64>,
}

/// Speech output overrides
#[derive(Debug, Default, Deserialize)]
pub struct OutputFileConfig {
    /// Watchdog bound for a single output tier
    pub watchdog_ms: Option<u64>,

    /// Assumed natural speech rate
    pub words_per_minute: Option<u32>,

    /// Shortest tone fallback
    pub min_tone_ms: Option<u64>,

    /// How long text-only replies hold the speaking phase
    pub text_only_ms: Option<u64>,

    /// Tone carrier frequency
    pub tone_frequency_hz: Option<f32>,

    /// Peak tone amplitude (0.0 - 1.0)
    pub tone_amplitude: Option<f32>,
}

/// Backend reply service configuration
#[derive(Debug, Default, Deserialize)]
pub struct BackendFileConfig {
    /// Reply endpoint URL
    pub url: Option<String>,

    /// Request timeout in milliseconds
    pub timeout_ms: Option<u64>,

    /// Number of conversation turns forwarded as history
    pub history_turns: Option<usize>,

    /// Fixed reply spoken when the backend fails
    pub apology: Option<String>,
}

/// User profile configuration
#[derive(Debug, Default, Deserialize)]
pub struct ProfileFileConfig {
    pub name: Option<String>,
    pub locale: Option<String>,
    #[serde(default)]
    pub facts: Vec<String>,
}

/// Environment hints
#[derive(Debug, Default, Deserialize)]
pub struct EnvironmentFileConfig {
    /// User-agent style string describing the host platform
    pub user_agent: Option<String>,
}

/// Load the TOML config file from the standard path
///
/// Returns `VoiceConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> VoiceConfigFile {
    config_file_path().map_or_else(VoiceConfigFile::default, |path| load_config_from(&path))
}

/// Load a TOML config file from an explicit path
///
/// Missing or malformed files fall back to defaults with a log line.
pub fn load_config_from(path: &Path) -> VoiceConfigFile {
    if !path.exists() {
        return VoiceConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                VoiceConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            VoiceConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/omni/beacon-voice/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| {
        d.config_dir()
            .join("omni")
            .join("beacon-voice")
            .join("config.toml")
    })
}
