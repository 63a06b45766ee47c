//! Tone fallback planning and synthesis
//!
//! When platform speech is unavailable the assistant hums a short
//! speech-shaped tone whose length follows the reply's word count.

use std::f32::consts::PI;
use std::time::Duration;

use crate::config::OutputConfig;

/// Attack and release ramp length
const RAMP_SECS: f32 = 0.02;

/// Syllable-rate amplitude modulation
const CADENCE_HZ: f32 = 4.0;

/// Count whitespace-separated words
#[must_use]
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Estimate how long `text` takes to say at `words_per_minute`
#[must_use]
pub fn estimate_speech_duration(text: &str, words_per_minute: u32) -> Duration {
    if words_per_minute == 0 {
        return Duration::ZERO;
    }
    let words = u64::try_from(word_count(text)).unwrap_or(u64::MAX);
    Duration::from_millis(words.saturating_mul(60_000) / u64::from(words_per_minute))
}

/// A planned tone
#[derive(Debug, Clone, PartialEq)]
pub struct TonePlan {
    /// Total length
    pub duration: Duration,
    /// Carrier frequency
    pub frequency_hz: f32,
    /// Peak amplitude
    pub amplitude: f32,
}

impl TonePlan {
    /// Plan the tone for a reply
    #[must_use]
    pub fn for_text(text: &str, config: &OutputConfig) -> Self {
        let duration = estimate_speech_duration(text, config.words_per_minute).max(config.min_tone);
        Self {
            duration,
            frequency_hz: config.tone_frequency_hz,
            amplitude: config.tone_amplitude,
        }
    }

    /// Render the plan into mono samples
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn samples(&self, sample_rate: u32) -> Vec<f32> {
        let rate = sample_rate as f32;
        let total = (self.duration.as_secs_f32() * rate) as usize;
        let ramp = ((RAMP_SECS * rate) as usize).max(1);

        (0..total)
            .map(|i| {
                let t = i as f32 / rate;
                let edge = i.min(total - i);
                let ramp_gain = (edge as f32 / ramp as f32).min(1.0);
                let cadence = 0.6 + 0.4 * (2.0 * PI * CADENCE_HZ * t).sin().abs();
                self.amplitude * ramp_gain * cadence * (2.0 * PI * self.frequency_hz * t).sin()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_follows_word_count() {
        let config = OutputConfig::default();
        let text = "one two three four five six seven eight nine ten";

        // 10 words at 150 wpm
        assert_eq!(TonePlan::for_text(text, &config).duration, Duration::from_secs(4));
    }

    #[test]
    fn short_replies_hit_the_floor() {
        let config = OutputConfig::default();
        assert_eq!(TonePlan::for_text("hi", &config).duration, Duration::from_millis(1500));
        assert_eq!(TonePlan::for_text("", &config).duration, Duration::from_millis(1500));
    }

    #[test]
    fn samples_are_enveloped_and_bounded() {
        let plan = TonePlan {
            duration: Duration::from_millis(500),
            frequency_hz: 440.0,
            amplitude: 0.2,
        };
        let samples = plan.samples(16_000);

        assert_eq!(samples.len(), 8000);
        assert!(samples.iter().all(|s| s.abs() <= 0.2 + f32::EPSILON));
        assert!(samples[0].abs() < 1e-6);
        assert!(samples.iter().any(|s| s.abs() > 0.05));
    }

    #[test]
    fn zero_rate_estimate() {
        assert_eq!(estimate_speech_duration("hello there", 0), Duration::ZERO);
    }
}
