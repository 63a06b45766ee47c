//! Contracts for the platform services and outside collaborators
//!
//! The controller never touches a platform API directly. Speech recognition,
//! speech synthesis, the audio output context and the display are reached
//! through the narrow traits below; each is owned by exactly one component.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Result;

/// One span of recognized text reported by the recognizer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptSegment {
    /// Recognized text
    pub text: String,

    /// Whether the recognizer considers this segment settled
    pub is_final: bool,
}

impl TranscriptSegment {
    /// Create an interim (unsettled) segment
    #[must_use]
    pub fn interim(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: false,
        }
    }

    /// Create a finalized segment
    #[must_use]
    pub fn finalized(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: true,
        }
    }
}

/// Error classes reported by speech recognition
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureErrorKind {
    /// Nothing was heard before the recognizer gave up
    #[error("no speech detected")]
    NoSpeech,

    /// The session was aborted by a stop request
    #[error("recognition aborted")]
    Aborted,

    /// Microphone or audio device failure
    #[error("audio capture failed")]
    AudioCapture,

    /// Recognition service unreachable
    #[error("network error")]
    Network,

    /// Microphone access denied by the user or platform
    #[error("microphone permission denied")]
    NotAllowed,

    /// Recognition service refused to run
    #[error("recognition service not allowed")]
    ServiceNotAllowed,

    /// Anything the platform reports that is not classified above
    #[error("recognition error: {0}")]
    Other(String),
}

impl CaptureErrorKind {
    /// Map a platform error code (e.g. `"no-speech"`) to a kind
    #[must_use]
    pub fn from_code(code: &str) -> Self {
        match code.trim().to_lowercase().as_str() {
            "no-speech" => Self::NoSpeech,
            "aborted" => Self::Aborted,
            "audio-capture" => Self::AudioCapture,
            "network" => Self::Network,
            "not-allowed" => Self::NotAllowed,
            "service-not-allowed" => Self::ServiceNotAllowed,
            other => Self::Other(other.to_string()),
        }
    }

    /// Whether the error revokes listening for the rest of the session
    #[must_use]
    pub const fn is_permission(&self) -> bool {
        matches!(self, Self::NotAllowed | Self::ServiceNotAllowed)
    }
}

/// Events emitted by a speech recognizer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionEvent {
    /// Recognition is live
    Started,
    /// Partial or final results for the current session
    Results(Vec<TranscriptSegment>),
    /// Recognition stopped, for any reason
    Ended,
    /// Recognition failed
    Error(CaptureErrorKind),
}

/// Continuous speech-to-text provider
///
/// Runs in continuous mode with interim results enabled. Events arrive
/// asynchronously through the runtime's event channel.
pub trait SpeechRecognizer {
    /// Ask the platform to begin recognition
    ///
    /// # Errors
    ///
    /// Returns the kind of a synchronous rejection
    fn start(&mut self) -> std::result::Result<(), CaptureErrorKind>;

    /// Ask the platform to end recognition; `Ended` follows
    fn stop(&mut self);
}

/// Error classes reported by speech synthesis
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SynthesisErrorKind {
    /// Audio output not permitted
    #[error("synthesis not allowed")]
    NotAllowed,

    /// Utterance interrupted by another utterance or a cancel
    #[error("synthesis interrupted")]
    Interrupted,

    /// Utterance canceled before it started
    #[error("synthesis canceled")]
    Canceled,

    /// Audio device is in use elsewhere
    #[error("audio busy")]
    AudioBusy,

    /// Voice or engine failure
    #[error("synthesis failed")]
    SynthesisFailed,

    /// Anything the platform reports that is not classified above
    #[error("synthesis error: {0}")]
    Other(String),
}

/// How the output chain reacts to a synthesis error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthesisErrorClass {
    /// Audio is not permitted; go silent
    Permission,
    /// Clean stop; complete without retry
    Interrupted,
    /// Engine is broken; demote to the next tier
    Failure,
}

impl SynthesisErrorKind {
    /// Map a platform error code (e.g. `"not-allowed"`) to a kind
    #[must_use]
    pub fn from_code(code: &str) -> Self {
        match code.trim().to_lowercase().as_str() {
            "not-allowed" => Self::NotAllowed,
            "interrupted" => Self::Interrupted,
            "canceled" => Self::Canceled,
            "audio-busy" => Self::AudioBusy,
            "synthesis-failed" => Self::SynthesisFailed,
            other => Self::Other(other.to_string()),
        }
    }

    /// Classify for fallback handling
    #[must_use]
    pub const fn class(&self) -> SynthesisErrorClass {
        match self {
            Self::NotAllowed => SynthesisErrorClass::Permission,
            Self::Interrupted | Self::Canceled => SynthesisErrorClass::Interrupted,
            Self::AudioBusy | Self::SynthesisFailed | Self::Other(_) => SynthesisErrorClass::Failure,
        }
    }
}

/// What happened to a synthesized utterance
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SynthesisEventKind {
    /// Audio started
    Start,
    /// Audio finished
    End,
    /// Utterance failed
    Error(SynthesisErrorKind),
}

/// Event emitted by a speech synthesizer for one utterance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisEvent {
    /// Identifier passed to [`SpeechSynthesizer::speak`]
    pub utterance: u64,

    /// What happened
    pub kind: SynthesisEventKind,
}

impl SynthesisEvent {
    /// Create an event for an utterance
    #[must_use]
    pub const fn new(utterance: u64, kind: SynthesisEventKind) -> Self {
        Self { utterance, kind }
    }
}

/// Platform text-to-speech provider
pub trait SpeechSynthesizer {
    /// Queue `text` for speaking; events for it carry `utterance`
    ///
    /// # Errors
    ///
    /// Returns the kind of a synchronous rejection
    fn speak(&mut self, utterance: u64, text: &str) -> std::result::Result<(), SynthesisErrorKind>;

    /// Drop the current and queued utterances
    fn cancel(&mut self);

    /// Whether the platform reports audio being spoken right now
    fn is_speaking(&self) -> bool;
}

/// State of the platform audio output context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextState {
    /// Not constructed yet
    Uncreated,
    /// Constructed but not producing audio
    Suspended,
    /// Producing audio
    Running,
}

/// A live audio output context
pub trait OutputContext {
    /// Current state as reported by the platform
    fn state(&self) -> ContextState;

    /// Try to move a suspended context to running
    ///
    /// # Errors
    ///
    /// Returns error if the platform refuses
    fn resume(&mut self) -> Result<()>;

    /// Sample rate samples passed to [`OutputContext::play`] must use
    fn sample_rate(&self) -> u32;

    /// Queue mono samples for playback
    ///
    /// # Errors
    ///
    /// Returns error if the samples cannot be scheduled
    fn play(&mut self, samples: Vec<f32>) -> Result<()>;

    /// Drop anything queued or playing
    fn stop(&mut self);
}

/// Factory for the platform audio output context
pub trait OutputContextProvider {
    /// Construct a new context
    ///
    /// # Errors
    ///
    /// Returns error if the platform has no usable output
    fn create(&mut self) -> Result<Box<dyn OutputContext>>;
}

/// Display layer for transcripts and replies
pub trait TextDisplay {
    /// Show what the user said
    fn show_transcript(&mut self, text: &str);

    /// Show what the assistant says
    fn show_reply(&mut self, text: &str);
}

/// Opaque request to open a feature once speech has finished
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureToken {
    /// Feature identifier (e.g. `"tic-tac-toe"`)
    pub feature_id: String,

    /// Launch mode understood by the launcher
    pub mode: String,
}

impl FeatureToken {
    /// Create a launch token
    #[must_use]
    pub fn new(feature_id: impl Into<String>, mode: impl Into<String>) -> Self {
        Self {
            feature_id: feature_id.into(),
            mode: mode.into(),
        }
    }
}

/// Opens features (games, reminders view) on request
pub trait FeatureLauncher {
    /// Open the feature described by `token`
    fn launch(&mut self, token: &FeatureToken);
}

/// Reminder persistence
pub trait ReminderStore {
    /// Create a reminder and return its identifier
    ///
    /// # Errors
    ///
    /// Returns error if the reminder cannot be stored
    fn create(&mut self, title: &str, time: Option<&str>) -> Result<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_error_codes() {
        assert_eq!(CaptureErrorKind::from_code("no-speech"), CaptureErrorKind::NoSpeech);
        assert_eq!(CaptureErrorKind::from_code("NOT-ALLOWED"), CaptureErrorKind::NotAllowed);
        assert_eq!(
            CaptureErrorKind::from_code("bad-grammar"),
            CaptureErrorKind::Other("bad-grammar".to_string())
        );
        assert!(CaptureErrorKind::ServiceNotAllowed.is_permission());
        assert!(!CaptureErrorKind::AudioCapture.is_permission());
    }

    #[test]
    fn synthesis_error_classes() {
        assert_eq!(
            SynthesisErrorKind::from_code("not-allowed").class(),
            SynthesisErrorClass::Permission
        );
        assert_eq!(
            SynthesisErrorKind::from_code("interrupted").class(),
            SynthesisErrorClass::Interrupted
        );
        assert_eq!(
            SynthesisErrorKind::from_code("canceled").class(),
            SynthesisErrorClass::Interrupted
        );
        assert_eq!(
            SynthesisErrorKind::from_code("voice-unavailable").class(),
            SynthesisErrorClass::Failure
        );
    }
}
