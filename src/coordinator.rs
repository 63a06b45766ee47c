//! Interaction coordinator
//!
//! The top-level state machine. It serializes the listening, processing and
//! speaking phases, keeps the microphone muted while a reply is pending or
//! being spoken, and suspends everything while external media plays.
//!
//! ```text
//!            ┌──────────── Suspended ◀──── (any phase, media playing)
//!            ▼
//!   Idle ──▶ Listening ──utterance──▶ Processing ──reply──▶ Speaking
//!    ▲                                                         │
//!    └──────────────── output complete (+ stabilization) ◀─────┘
//! ```
//!
//! Side effects that leave the process (backend requests, feature launches,
//! reminder creation) are returned as [`Action`]s for the runtime to run.

use std::time::Instant;

use serde::Serialize;

use crate::backend::{History, HistoryTurn, ReplyRequest, UserProfile};
use crate::config::{BackendConfig, Config, TimingConfig};
use crate::intent::{Intent, ReminderIntent, detect_intent};
use crate::platform::{
    ContextState, FeatureToken, RecognitionEvent, SynthesisEvent, TextDisplay,
};
use crate::voice::{
    AudioGate, CaptureStatus, Completion, FallbackTier, Gesture, OutputOutcome, OutputRequest,
    SpeechCaptureSession, SpeechOutputChain, Utterance,
};

/// Launch mode attached to features opened by voice
pub const VOICE_LAUNCH_MODE: &str = "voice";

/// Phase of the interaction; exactly one is active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionPhase {
    /// Neither listening nor speaking
    Idle,
    /// Capture is wanted and running
    Listening,
    /// Waiting for a reply
    Processing,
    /// Reply is being spoken
    Speaking,
    /// External media is playing; capture and output are held off
    Suspended,
}

impl InteractionPhase {
    /// Whether moving from `self` to `next` is a legal transition
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        use InteractionPhase::{Idle, Listening, Processing, Speaking, Suspended};

        matches!(
            (self, next),
            (Idle, Listening | Speaking | Suspended)
                | (Listening, Processing | Idle | Suspended)
                | (Processing, Speaking | Idle | Suspended)
                | (Speaking, Idle | Listening | Suspended)
                | (Suspended, Idle | Listening)
        )
    }
}

/// Everything the coordinator reacts to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerEvent {
    /// Speech recognizer event
    Recognition(RecognitionEvent),
    /// Speech synthesizer event
    Synthesis(SynthesisEvent),
    /// Backend answer for a request issued through [`Action::RequestReply`]
    Reply {
        request_id: u64,
        result: Result<String, String>,
    },
    /// External media player started or stopped
    MediaPlayback { playing: bool },
    /// User gesture that may unlock audio
    Gesture(Gesture),
    /// A feature opened from a voice intent was closed
    FeatureClosed,
    /// User asked to start listening
    StartListening,
    /// User asked to stop listening
    StopListening,
}

/// Side effect for the runtime to carry out
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Ask the backend for a reply and report back with the same id
    RequestReply {
        request_id: u64,
        request: ReplyRequest,
    },
    /// Open a feature now that speaking has finished
    LaunchFeature(FeatureToken),
    /// Persist a reminder
    CreateReminder(ReminderIntent),
}

/// Serializable view of the controller state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControllerSnapshot {
    /// Current interaction phase
    pub phase: InteractionPhase,
    /// Whether the user wants the assistant to listen
    pub listening_enabled: bool,
    /// Whether capture should be running right now
    pub desired_to_listen: bool,
    /// Capture lifecycle, `None` without a recognizer
    pub capture_status: Option<CaptureStatus>,
    /// Capture rebuild count, `None` without a recognizer
    pub capture_generation: Option<u64>,
    /// Whether the platform refused microphone access
    pub microphone_denied: bool,
    /// Whether a user gesture has unlocked audio
    pub user_interacted: bool,
    /// Audio output context state
    pub context_state: ContextState,
    /// Tier of the reply being output, if any
    pub output_tier: Option<FallbackTier>,
    /// Tiers marked broken for the rest of the session
    pub broken_tiers: Vec<FallbackTier>,
    /// Whether a backend reply is outstanding
    pub awaiting_reply: bool,
    /// Turns kept in conversation history
    pub history_turns: usize,
}

struct PendingReply {
    id: u64,
    deadline: Instant,
    launch: Option<FeatureToken>,
}

/// Top-level voice interaction state machine
pub struct InteractionCoordinator {
    timing: TimingConfig,
    backend: BackendConfig,
    profile: UserProfile,
    phase: InteractionPhase,
    gate: AudioGate,
    capture: Option<SpeechCaptureSession>,
    output: SpeechOutputChain,
    display: Box<dyn TextDisplay>,
    history: History,
    listening_enabled: bool,
    desired_to_listen: bool,
    saved_listening: Option<bool>,
    pending_reply: Option<PendingReply>,
    speaking_request: Option<u64>,
    listen_at: Option<Instant>,
    next_monitor_at: Option<Instant>,
    next_reply_id: u64,
    capture_warned: bool,
}

impl InteractionCoordinator {
    /// Assemble a coordinator
    ///
    /// `capture` is `None` when the platform has no speech recognition; the
    /// coordinator then never enters `Listening`.
    #[must_use]
    pub fn new(
        config: &Config,
        gate: AudioGate,
        capture: Option<SpeechCaptureSession>,
        output: SpeechOutputChain,
        display: Box<dyn TextDisplay>,
    ) -> Self {
        Self {
            timing: config.timing.clone(),
            backend: config.backend.clone(),
            profile: config.profile.clone(),
            phase: InteractionPhase::Idle,
            gate,
            capture,
            output,
            display,
            history: History::new(config.backend.history_turns),
            listening_enabled: false,
            desired_to_listen: false,
            saved_listening: None,
            pending_reply: None,
            speaking_request: None,
            listen_at: None,
            next_monitor_at: None,
            next_reply_id: 1,
            capture_warned: false,
        }
    }

    /// Current phase
    #[must_use]
    pub const fn phase(&self) -> InteractionPhase {
        self.phase
    }

    /// Whether the user wants the assistant to listen
    #[must_use]
    pub const fn listening_enabled(&self) -> bool {
        self.listening_enabled
    }

    /// Whether capture should be running right now
    #[must_use]
    pub const fn desired_to_listen(&self) -> bool {
        self.desired_to_listen
    }

    /// Audio gate
    #[must_use]
    pub const fn gate(&self) -> &AudioGate {
        &self.gate
    }

    /// Speech output chain
    #[must_use]
    pub const fn output(&self) -> &SpeechOutputChain {
        &self.output
    }

    /// Capture session, `None` without a recognizer
    #[must_use]
    pub const fn capture(&self) -> Option<&SpeechCaptureSession> {
        self.capture.as_ref()
    }

    /// React to an event
    pub fn dispatch(&mut self, event: ControllerEvent, now: Instant) -> Vec<Action> {
        let mut actions = Vec::new();
        self.ensure_monitor(now);

        match event {
            ControllerEvent::Recognition(event) => {
                let utterance = self
                    .capture
                    .as_mut()
                    .and_then(|capture| capture.handle_event(event, now));
                if self.microphone_lost(now) {
                    return actions;
                }
                if let Some(utterance) = utterance {
                    self.on_utterance(utterance, now, &mut actions);
                }
            }
            ControllerEvent::Synthesis(event) => {
                if let Some(completion) = self.output.handle_event(&event, &mut self.gate, now) {
                    self.on_output_complete(completion, now, &mut actions);
                }
            }
            ControllerEvent::Reply { request_id, result } => {
                self.on_reply(request_id, result, now, &mut actions);
            }
            ControllerEvent::MediaPlayback { playing: true } => self.suspend(now),
            ControllerEvent::MediaPlayback { playing: false } => self.unsuspend(now),
            ControllerEvent::Gesture(gesture) => {
                if self.gate.record_user_interaction(gesture) {
                    if let Err(e) = self.gate.ensure_output_context() {
                        tracing::warn!(error = %e, "audio output unavailable after gesture");
                    }
                }
            }
            ControllerEvent::FeatureClosed => self.clear_queued_launch(),
            ControllerEvent::StartListening => self.enable_listening(now),
            ControllerEvent::StopListening => self.disable_listening(now),
        }

        actions
    }

    /// Run due timers
    pub fn poll(&mut self, now: Instant) -> Vec<Action> {
        let mut actions = Vec::new();

        let utterance = self.capture.as_mut().and_then(|capture| capture.poll(now));
        if !self.microphone_lost(now) {
            if let Some(utterance) = utterance {
                self.on_utterance(utterance, now, &mut actions);
            }
        }

        if let Some(completion) = self.output.poll(&mut self.gate, now) {
            self.on_output_complete(completion, now, &mut actions);
        }

        if self.pending_reply.as_ref().is_some_and(|p| now >= p.deadline) {
            if let Some(pending) = self.pending_reply.take() {
                tracing::warn!(request = pending.id, "backend reply timed out");
                let apology = self.backend.apology.clone();
                self.speak(apology, pending.launch, now, &mut actions);
            }
        }

        if self.listen_at.is_some_and(|at| now >= at) {
            self.listen_at = None;
            if self.phase == InteractionPhase::Idle && self.listening_enabled {
                self.begin_listening(now);
            }
        }

        if self.next_monitor_at.is_some_and(|at| now >= at) {
            self.next_monitor_at = Some(now + self.timing.speaking_monitor);
            self.monitor_speaking(now, &mut actions);
        }

        actions
    }

    /// Earliest pending timer across the coordinator and its components
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        [
            self.capture.as_ref().and_then(SpeechCaptureSession::next_deadline),
            self.output.next_deadline(),
            self.pending_reply.as_ref().map(|p| p.deadline),
            self.listen_at,
            self.next_monitor_at,
        ]
        .into_iter()
        .flatten()
        .min()
    }

    /// Serializable view of the current state
    #[must_use]
    pub fn snapshot(&self) -> ControllerSnapshot {
        ControllerSnapshot {
            phase: self.phase,
            listening_enabled: self.listening_enabled,
            desired_to_listen: self.desired_to_listen,
            capture_status: self.capture.as_ref().map(SpeechCaptureSession::status),
            capture_generation: self.capture.as_ref().map(|c| c.session().generation),
            microphone_denied: self
                .capture
                .as_ref()
                .is_some_and(SpeechCaptureSession::permission_denied),
            user_interacted: self.gate.user_interacted(),
            context_state: self.gate.context_state(),
            output_tier: self.output.current_tier(),
            broken_tiers: self.output.broken_tiers(),
            awaiting_reply: self.pending_reply.is_some(),
            history_turns: self.history.len(),
        }
    }

    fn transition(&mut self, next: InteractionPhase) -> bool {
        if self.phase == next {
            return true;
        }
        if !self.phase.can_transition_to(next) {
            tracing::debug!(from = ?self.phase, to = ?next, "ignoring illegal phase transition");
            return false;
        }
        tracing::debug!(from = ?self.phase, to = ?next, "phase transition");
        self.phase = next;
        true
    }

    fn ensure_monitor(&mut self, now: Instant) {
        if self.next_monitor_at.is_none() {
            self.next_monitor_at = Some(now + self.timing.speaking_monitor);
        }
    }

    fn set_desired(&mut self, desired: bool, now: Instant) {
        self.desired_to_listen = desired;
        if let Some(capture) = self.capture.as_mut() {
            capture.set_desired(desired, now);
            if !desired {
                capture.stop();
            }
        }
    }

    fn enable_listening(&mut self, now: Instant) {
        if self.phase == InteractionPhase::Suspended {
            self.saved_listening = Some(true);
            return;
        }
        self.listening_enabled = true;
        if self.phase == InteractionPhase::Idle {
            self.begin_listening(now);
        }
    }

    fn disable_listening(&mut self, now: Instant) {
        if self.phase == InteractionPhase::Suspended {
            self.saved_listening = Some(false);
            return;
        }
        self.listening_enabled = false;
        self.listen_at = None;
        self.set_desired(false, now);
        if self.phase == InteractionPhase::Listening {
            self.transition(InteractionPhase::Idle);
        }
    }

    fn begin_listening(&mut self, now: Instant) {
        let Some(capture) = self.capture.as_ref() else {
            if !self.capture_warned {
                tracing::warn!("speech recognition unavailable, listening disabled for this session");
                self.capture_warned = true;
            }
            self.listening_enabled = false;
            return;
        };

        if capture.permission_denied() {
            self.microphone_lost(now);
            return;
        }

        if !self.transition(InteractionPhase::Listening) {
            return;
        }
        self.set_desired(true, now);
        if let Some(capture) = self.capture.as_mut() {
            capture.request_start(now);
        }
        self.microphone_lost(now);
    }

    /// Turn listening off for good once the microphone is denied
    fn microphone_lost(&mut self, now: Instant) -> bool {
        let denied = self
            .capture
            .as_ref()
            .is_some_and(SpeechCaptureSession::permission_denied);
        if !denied {
            return false;
        }

        if !self.capture_warned {
            tracing::warn!("microphone access denied, listening disabled for this session");
            self.capture_warned = true;
        }
        self.listening_enabled = false;
        self.listen_at = None;
        if self.desired_to_listen {
            self.set_desired(false, now);
        }
        if self.phase == InteractionPhase::Listening {
            self.transition(InteractionPhase::Idle);
        }
        true
    }

    fn on_utterance(&mut self, utterance: Utterance, now: Instant, actions: &mut Vec<Action>) {
        if self.phase != InteractionPhase::Listening {
            tracing::debug!(phase = ?self.phase, "dropping utterance outside listening phase");
            return;
        }

        let text = utterance.text.trim().to_string();
        if text.is_empty() {
            return;
        }

        tracing::info!(text = %text, finalized = utterance.finalized, "heard utterance");
        self.display.show_transcript(&text);
        self.set_desired(false, now);
        self.transition(InteractionPhase::Processing);

        match detect_intent(&text) {
            Intent::Reminder(reminder) => {
                tracing::info!(title = %reminder.title, time = ?reminder.time, "reminder intent");
                let confirmation = reminder.confirmation();
                self.history.push(HistoryTurn::user(text));
                self.history.push(HistoryTurn::assistant(confirmation.clone()));
                actions.push(Action::CreateReminder(reminder));
                self.speak(confirmation, None, now, actions);
            }
            Intent::Game(game) => {
                tracing::info!(game = %game, "game intent");
                let launch = FeatureToken::new(game.as_str(), VOICE_LAUNCH_MODE);
                self.request_reply(text, Some(launch), now, actions);
            }
            Intent::None => self.request_reply(text, None, now, actions),
        }
    }

    fn request_reply(
        &mut self,
        message: String,
        launch: Option<FeatureToken>,
        now: Instant,
        actions: &mut Vec<Action>,
    ) {
        let id = self.next_reply_id;
        self.next_reply_id += 1;

        let request = ReplyRequest {
            message: message.clone(),
            history: self.history.snapshot(),
            profile: self.profile.clone(),
        };
        self.history.push(HistoryTurn::user(message));
        self.pending_reply = Some(PendingReply {
            id,
            deadline: now + self.backend.timeout,
            launch,
        });

        actions.push(Action::RequestReply {
            request_id: id,
            request,
        });
    }

    fn on_reply(
        &mut self,
        request_id: u64,
        result: Result<String, String>,
        now: Instant,
        actions: &mut Vec<Action>,
    ) {
        if self.pending_reply.as_ref().is_none_or(|p| p.id != request_id) {
            tracing::debug!(request = request_id, "ignoring reply for abandoned request");
            return;
        }
        let Some(pending) = self.pending_reply.take() else {
            return;
        };

        let text = match result {
            Ok(reply) => {
                self.history.push(HistoryTurn::assistant(reply.clone()));
                reply
            }
            Err(e) => {
                tracing::warn!(request = request_id, error = %e, "backend reply failed");
                self.backend.apology.clone()
            }
        };

        self.speak(text, pending.launch, now, actions);
    }

    fn speak(
        &mut self,
        text: String,
        follow_up: Option<FeatureToken>,
        now: Instant,
        actions: &mut Vec<Action>,
    ) {
        if self.phase == InteractionPhase::Suspended {
            tracing::debug!("output refused while suspended");
            return;
        }
        if !self.transition(InteractionPhase::Speaking) {
            return;
        }

        self.display.show_reply(&text);
        let request = OutputRequest::new(text).with_follow_up(follow_up);
        let (id, completions) = self.output.speak(request, &mut self.gate, now);
        self.speaking_request = Some(id);

        for completion in completions {
            self.on_output_complete(completion, now, actions);
        }
    }

    fn on_output_complete(&mut self, completion: Completion, now: Instant, actions: &mut Vec<Action>) {
        if self.speaking_request != Some(completion.request_id) {
            tracing::trace!(request = completion.request_id, "ignoring completion of replaced output");
            return;
        }
        self.speaking_request = None;

        if completion.success() {
            tracing::debug!("reply spoken");
        } else {
            tracing::info!(tier = ?completion.tier, outcome = ?completion.outcome, "reply output finished");
        }

        if let Some(token) = completion.follow_up {
            tracing::info!(feature = %token.feature_id, "launching feature after reply");
            actions.push(Action::LaunchFeature(token));
        }

        // Missed end event: go straight back to listening
        if completion.outcome == OutputOutcome::Reconciled && self.listening_enabled {
            self.begin_listening(now);
            if self.phase == InteractionPhase::Listening {
                return;
            }
        }

        self.transition(InteractionPhase::Idle);
        if self.listening_enabled {
            self.listen_at = Some(now + self.timing.restart_stabilization);
        }
    }

    fn monitor_speaking(&mut self, now: Instant, actions: &mut Vec<Action>) {
        if let Some(completion) = self.output.reconcile(now) {
            self.on_output_complete(completion, now, actions);
            return;
        }

        if self.phase == InteractionPhase::Speaking && !self.output.is_active() {
            tracing::warn!("speaking phase without active output, resetting");
            self.speaking_request = None;
            self.transition(InteractionPhase::Idle);
            if self.listening_enabled {
                self.begin_listening(now);
            }
        }
    }

    fn suspend(&mut self, now: Instant) {
        if self.phase == InteractionPhase::Suspended {
            return;
        }
        tracing::info!(phase = ?self.phase, "external media playing, suspending");

        self.saved_listening = Some(self.listening_enabled);
        if let Some(pending) = self.pending_reply.take() {
            tracing::debug!(request = pending.id, "abandoning pending reply");
        }
        self.speaking_request = None;
        if let Some(canceled) = self.output.cancel(&mut self.gate) {
            tracing::debug!(request = canceled.request_id, tier = ?canceled.tier, "canceled reply output");
        }
        self.listen_at = None;

        self.set_desired(false, now);
        if let Some(capture) = self.capture.as_mut() {
            capture.set_suspended(true, now);
        }
        self.transition(InteractionPhase::Suspended);
    }

    fn unsuspend(&mut self, now: Instant) {
        if self.phase != InteractionPhase::Suspended {
            return;
        }
        tracing::info!("external media stopped, resuming");

        if let Some(capture) = self.capture.as_mut() {
            capture.set_suspended(false, now);
        }
        self.listening_enabled = self.saved_listening.take().unwrap_or(self.listening_enabled);
        self.transition(InteractionPhase::Idle);

        if self.listening_enabled {
            self.begin_listening(now);
        }
    }

    fn clear_queued_launch(&mut self) {
        let pending = self.pending_reply.as_mut().and_then(|p| p.launch.take());
        let queued = self.output.clear_follow_up();
        if pending.is_some() || queued.is_some() {
            tracing::debug!("feature closed, dropping queued launch");
        }
    }
}
