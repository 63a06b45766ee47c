//! Configuration management for Beacon voice

pub mod file;

use std::time::Duration;

use crate::backend::UserProfile;
use crate::{Error, Result};

use file::VoiceConfigFile;

/// Spoken when the backend fails or times out
pub const DEFAULT_APOLOGY: &str = "Sorry, I'm having trouble answering right now. Please try again in a moment.";

/// Beacon voice configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Capture and coordinator timing
    pub timing: TimingConfig,

    /// Speech output chain
    pub output: OutputConfig,

    /// Backend reply service
    pub backend: BackendConfig,

    /// User profile forwarded with every backend request
    pub profile: UserProfile,

    /// User-agent style description of the host, used as an output hint
    pub user_agent: Option<String>,
}

/// Timing constants for capture supervision and phase transitions
#[derive(Debug, Clone)]
pub struct TimingConfig {
    /// Minimum spacing between two recognition start attempts
    pub restart_cooldown: Duration,

    /// Silence after interim text before it is treated as final
    pub silence_debounce: Duration,

    /// Delay before restarting capture after it ends or after speaking
    pub restart_stabilization: Duration,

    /// Health check period
    pub health_interval: Duration,

    /// Recovery check period
    pub recovery_interval: Duration,

    /// Time without a successful start before a forced reset
    pub recovery_stale: Duration,

    /// Retry delay after a "no speech" error
    pub no_speech_backoff: Duration,

    /// Retry delay after a device error
    pub device_backoff: Duration,

    /// Retry delay after an unclassified error
    pub unknown_backoff: Duration,

    /// Period of the speaking-status reconciliation
    pub speaking_monitor: Duration,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            restart_cooldown: Duration::from_millis(2000),
            silence_debounce: Duration::from_millis(1200),
            restart_stabilization: Duration::from_millis(2500),
            health_interval: Duration::from_secs(5),
            recovery_interval: Duration::from_secs(10),
            recovery_stale: Duration::from_secs(30),
            no_speech_backoff: Duration::ZERO,
            device_backoff: Duration::from_secs(3),
            unknown_backoff: Duration::from_secs(8),
            speaking_monitor: Duration::from_secs(1),
        }
    }
}

/// Speech output chain configuration
#[derive(Debug, Clone)]
pub struct OutputConfig {
    /// Upper bound on waiting for any tier's completion events
    pub watchdog: Duration,

    /// Assumed speech rate for tone duration and speaking estimates
    pub words_per_minute: u32,

    /// Shortest tone fallback
    pub min_tone: Duration,

    /// How long a text-only reply holds the speaking phase
    pub text_only_display: Duration,

    /// Tone carrier frequency in Hz
    pub tone_frequency_hz: f32,

    /// Peak tone amplitude
    pub tone_amplitude: f32,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            watchdog: Duration::from_secs(8),
            words_per_minute: 150,
            min_tone: Duration::from_millis(1500),
            text_only_display: Duration::from_secs(4),
            tone_frequency_hz: 440.0,
            tone_amplitude: 0.2,
        }
    }
}

/// Backend reply service configuration
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Reply endpoint; `None` means replies always fail over to the apology
    pub url: Option<String>,

    /// Caller-side timeout for one reply
    pub timeout: Duration,

    /// Number of conversation turns forwarded as history
    pub history_turns: usize,

    /// Fixed reply spoken when the backend fails
    pub apology: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout: Duration::from_secs(15),
            history_turns: 10,
            apology: DEFAULT_APOLOGY.to_string(),
        }
    }
}

impl Config {
    /// Load configuration (env > toml > default)
    ///
    /// # Errors
    ///
    /// Returns error if the resolved values are inconsistent
    pub fn load() -> Result<Self> {
        Self::from_file_config(file::load_config_file())
    }

    /// Build configuration from a parsed file, applying env overrides
    ///
    /// # Errors
    ///
    /// Returns error if the resolved values are inconsistent
    pub fn from_file_config(fc: VoiceConfigFile) -> Result<Self> {
        let defaults = TimingConfig::default();
        let t = fc.timing;
        let timing = TimingConfig {
            restart_cooldown: env_ms("BEACON_VOICE_RESTART_COOLDOWN_MS")
                .or(t.restart_cooldown_ms)
                .map_or(defaults.restart_cooldown, Duration::from_millis),
            silence_debounce: env_ms("BEACON_VOICE_SILENCE_DEBOUNCE_MS")
                .or(t.silence_debounce_ms)
                .map_or(defaults.silence_debounce, Duration::from_millis),
            restart_stabilization: t
                .restart_stabilization_ms
                .map_or(defaults.restart_stabilization, Duration::from_millis),
            health_interval: t
                .health_interval_ms
                .map_or(defaults.health_interval, Duration::from_millis),
            recovery_interval: t
                .recovery_interval_ms
                .map_or(defaults.recovery_interval, Duration::from_millis),
            recovery_stale: t
                .recovery_stale_ms
                .map_or(defaults.recovery_stale, Duration::from_millis),
            no_speech_backoff: t
                .no_speech_backoff_ms
                .map_or(defaults.no_speech_backoff, Duration::from_millis),
            device_backoff: t
                .device_backoff_ms
                .map_or(defaults.device_backoff, Duration::from_millis),
            unknown_backoff: t
                .unknown_backoff_ms
                .map_or(defaults.unknown_backoff, Duration::from_millis),
            speaking_monitor: t
                .speaking_monitor_ms
                .map_or(defaults.speaking_monitor, Duration::from_millis),
        };

        let defaults = OutputConfig::default();
        let o = fc.output;
        let output = OutputConfig {
            watchdog: env_ms("BEACON_VOICE_WATCHDOG_MS")
                .or(o.watchdog_ms)
                .map_or(defaults.watchdog, Duration::from_millis),
            words_per_minute: o.words_per_minute.unwrap_or(defaults.words_per_minute),
            min_tone: o.min_tone_ms.map_or(defaults.min_tone, Duration::from_millis),
            text_only_display: o
                .text_only_ms
                .map_or(defaults.text_only_display, Duration::from_millis),
            tone_frequency_hz: o.tone_frequency_hz.unwrap_or(defaults.tone_frequency_hz),
            tone_amplitude: o.tone_amplitude.unwrap_or(defaults.tone_amplitude),
        };

        let defaults = BackendConfig::default();
        let b = fc.backend;
        let backend = BackendConfig {
            url: std::env::var("BEACON_VOICE_BACKEND_URL").ok().or(b.url),
            timeout: env_ms("BEACON_VOICE_BACKEND_TIMEOUT_MS")
                .or(b.timeout_ms)
                .map_or(defaults.timeout, Duration::from_millis),
            history_turns: b.history_turns.unwrap_or(defaults.history_turns),
            apology: b.apology.unwrap_or(defaults.apology),
        };

        let profile = UserProfile {
            name: std::env::var("BEACON_VOICE_USER_NAME")
                .ok()
                .or(fc.profile.name),
            locale: fc.profile.locale,
            facts: fc.profile.facts,
        };

        let user_agent = std::env::var("BEACON_VOICE_USER_AGENT")
            .ok()
            .or(fc.environment.user_agent);

        let config = Self {
            timing,
            output,
            backend,
            profile,
            user_agent,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check values the controller depends on
    ///
    /// # Errors
    ///
    /// Returns error describing the first invalid value
    pub fn validate(&self) -> Result<()> {
        if self.output.words_per_minute == 0 {
            return Err(Error::Config("words_per_minute must be positive".to_string()));
        }
        if !(self.output.tone_amplitude > 0.0 && self.output.tone_amplitude <= 1.0) {
            return Err(Error::Config(format!(
                "tone_amplitude must be in (0, 1], got {}",
                self.output.tone_amplitude
            )));
        }
        if self.output.watchdog.is_zero() {
            return Err(Error::Config("watchdog must be non-zero".to_string()));
        }
        for (name, interval) in [
            ("health_interval", self.timing.health_interval),
            ("recovery_interval", self.timing.recovery_interval),
            ("speaking_monitor", self.timing.speaking_monitor),
        ] {
            if interval.is_zero() {
                return Err(Error::Config(format!("{name} must be non-zero")));
            }
        }
        if self.backend.apology.trim().is_empty() {
            return Err(Error::Config("apology text must not be empty".to_string()));
        }
        Ok(())
    }
}

fn env_ms(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}
