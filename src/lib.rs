//! Beacon Voice - voice interaction controller for conversational assistants
//!
//! This library provides the controller that sits between a device's
//! microphone and speaker and a language-model backend:
//! - Supervised, self-healing speech capture
//! - Reply output through a fallback chain (speech, tone, text)
//! - Phase arbitration so the assistant never listens to itself
//! - Intent detection for games and reminders
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                 Platform adapters                    │
//! │  Recognizer │ Synthesizer │ Output ctx │ Display     │
//! └────────────────────┬────────────────────────────────┘
//!                      │ events
//! ┌────────────────────▼────────────────────────────────┐
//! │               InteractionCoordinator                 │
//! │  AudioGate │ CaptureSession │ OutputChain │ Intents  │
//! └────────────────────┬────────────────────────────────┘
//!                      │ actions
//! ┌────────────────────▼────────────────────────────────┐
//! │      Backend  │  Feature launcher  │  Reminders      │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod backend;
pub mod config;
pub mod console;
pub mod coordinator;
pub mod error;
pub mod intent;
pub mod platform;
pub mod runtime;
pub mod voice;

pub use config::Config;
pub use coordinator::{
    Action, ControllerEvent, ControllerSnapshot, InteractionCoordinator, InteractionPhase,
};
pub use error::{Error, Result};
pub use runtime::{EventChannel, EventSender, Services, VoiceRuntime};
