//! Voice I/O components
//!
//! The audio gate, the supervised capture session, and the speech output
//! chain with its tone fallback. None of these own a timer; each exposes
//! `next_deadline` and `poll` and is driven by the runtime.

mod capture;
mod environment;
mod gate;
mod output;
mod playback;
mod tone;

pub use capture::{CaptureSession, CaptureStatus, SpeechCaptureSession, Utterance};
pub use environment::Reliability;
pub use gate::{AudioGate, GateError, Gesture};
pub use output::{Completion, FallbackTier, OutputOutcome, OutputRequest, SpeechOutputChain};
pub use playback::{CpalOutputContext, CpalOutputProvider};
pub use tone::{TonePlan, estimate_speech_duration, word_count};
