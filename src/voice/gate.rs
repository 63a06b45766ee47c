//! Audio gate
//!
//! Platforms refuse audio output until the user has interacted with the page or
//! device, and an output context built before that gesture can stay suspended
//! forever. The gate therefore defers *creation* of the context, not just
//! playback, until the first qualifying gesture.

use thiserror::Error;

use crate::platform::{ContextState, OutputContext, OutputContextProvider};

/// User gestures that unlock audio output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gesture {
    /// Pointer click
    Click,
    /// Touch start
    Touch,
    /// Key press
    KeyDown,
}

/// Why an output context could not be handed out
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GateError {
    /// No qualifying gesture has been recorded
    #[error("no user interaction recorded yet")]
    NotInteractedYet,

    /// The platform could not construct a context
    #[error("output context unavailable: {0}")]
    ContextUnavailable(String),
}

/// Tracks audio authorization and owns the output context
pub struct AudioGate {
    provider: Box<dyn OutputContextProvider>,
    context: Option<Box<dyn OutputContext>>,
    context_state: ContextState,
    user_interacted: bool,
}

impl AudioGate {
    /// Create a gate around a context provider; nothing is constructed yet
    #[must_use]
    pub fn new(provider: Box<dyn OutputContextProvider>) -> Self {
        Self {
            provider,
            context: None,
            context_state: ContextState::Uncreated,
            user_interacted: false,
        }
    }

    /// Record a user gesture
    ///
    /// Returns `true` only for the first gesture; later calls are no-ops.
    pub fn record_user_interaction(&mut self, gesture: Gesture) -> bool {
        if self.user_interacted {
            return false;
        }

        self.user_interacted = true;
        tracing::info!(?gesture, "user interaction recorded, audio unlocked");
        true
    }

    /// Whether a qualifying gesture has been seen
    #[must_use]
    pub const fn user_interacted(&self) -> bool {
        self.user_interacted
    }

    /// Whether gesture listeners are still needed
    #[must_use]
    pub const fn awaiting_gesture(&self) -> bool {
        !self.user_interacted
    }

    /// Last observed state of the output context
    #[must_use]
    pub const fn context_state(&self) -> ContextState {
        self.context_state
    }

    /// Hand out the output context, creating and resuming it as needed
    ///
    /// A resume failure is not fatal: the context is still returned and the
    /// next call retries the resume.
    ///
    /// # Errors
    ///
    /// Returns `NotInteractedYet` before the first gesture, and
    /// `ContextUnavailable` if the platform cannot build a context
    pub fn ensure_output_context(&mut self) -> Result<&mut dyn OutputContext, GateError> {
        if !self.user_interacted {
            return Err(GateError::NotInteractedYet);
        }

        if self.context.is_none() {
            let context = self.provider.create().map_err(|e| {
                tracing::warn!(error = %e, "failed to create audio output context");
                GateError::ContextUnavailable(e.to_string())
            })?;
            tracing::debug!(state = ?context.state(), "audio output context created");
            self.context = Some(context);
        }

        let Some(context) = self.context.as_mut() else {
            return Err(GateError::ContextUnavailable("context missing".to_string()));
        };

        if context.state() != ContextState::Running {
            if let Err(e) = context.resume() {
                tracing::debug!(error = %e, "audio context resume failed, will retry on next use");
            }
        }

        self.context_state = context.state();
        Ok(&mut **context)
    }

    /// Stop anything playing on the context, if one exists
    ///
    /// Never creates a context.
    pub fn stop_output(&mut self) {
        if let Some(context) = self.context.as_mut() {
            context.stop();
        }
    }
}
