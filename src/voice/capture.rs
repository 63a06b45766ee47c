//! Supervised speech capture
//!
//! Wraps a continuous recognizer as a restartable session. Platform recognizers
//! end on their own, fail silently, and sometimes wedge; the session keeps
//! them alive with cooldown-guarded restarts, error-specific backoff, and two
//! periodic checks:
//!
//! - health: desired but idle with nothing scheduled, so start again
//! - recovery: no successful start for a long stretch, so rebuild the session
//!
//! Every timer is a stored deadline. Overlapping retries collapse into a single
//! deadline and the cooldown is re-checked when it fires.

use std::time::{Duration, Instant};

use serde::Serialize;

use crate::config::TimingConfig;
use crate::platform::{CaptureErrorKind, RecognitionEvent, SpeechRecognizer, TranscriptSegment};

/// Lifecycle of one recognition attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureStatus {
    /// No platform session
    NotStarted,
    /// Start requested, waiting for `Started`
    Starting,
    /// Recognition live
    Active,
    /// Stop requested, waiting for `Ended`
    Stopping,
}

/// One recognition session's state
///
/// Replaced wholesale on a forced recovery rather than patched in place.
#[derive(Debug, Clone)]
pub struct CaptureSession {
    /// Incremented each time the session is rebuilt
    pub generation: u64,

    /// Current lifecycle status
    pub status: CaptureStatus,

    /// When the last start attempt was made
    pub last_restart_at: Option<Instant>,

    /// Interim text not yet settled
    pub pending_interim: String,

    /// Settled text emitted during this recognition run
    pub finalized_text: String,
}

impl CaptureSession {
    fn new(generation: u64) -> Self {
        Self {
            generation,
            status: CaptureStatus::NotStarted,
            last_restart_at: None,
            pending_interim: String::new(),
            finalized_text: String::new(),
        }
    }
}

/// A span of speech handed to the coordinator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utterance {
    /// Recognized text
    pub text: String,

    /// `false` when interim text was promoted after the silence debounce
    pub finalized: bool,
}

/// Restartable, supervised recognizer session
pub struct SpeechCaptureSession {
    timing: TimingConfig,
    recognizer: Box<dyn SpeechRecognizer>,
    session: CaptureSession,
    desired: bool,
    suspended: bool,
    permission_denied: bool,
    restart_at: Option<Instant>,
    debounce_at: Option<Instant>,
    next_health_at: Option<Instant>,
    next_recovery_at: Option<Instant>,
    stale_since: Option<Instant>,
    stale_ends: u32,
}

impl SpeechCaptureSession {
    /// Create a session around a recognizer; nothing starts until desired
    #[must_use]
    pub fn new(recognizer: Box<dyn SpeechRecognizer>, timing: TimingConfig) -> Self {
        Self {
            timing,
            recognizer,
            session: CaptureSession::new(0),
            desired: false,
            suspended: false,
            permission_denied: false,
            restart_at: None,
            debounce_at: None,
            next_health_at: None,
            next_recovery_at: None,
            stale_since: None,
            stale_ends: 0,
        }
    }

    /// Current session state
    #[must_use]
    pub const fn session(&self) -> &CaptureSession {
        &self.session
    }

    /// Current lifecycle status
    #[must_use]
    pub const fn status(&self) -> CaptureStatus {
        self.session.status
    }

    /// Whether capture is wanted right now
    #[must_use]
    pub const fn desired(&self) -> bool {
        self.desired
    }

    /// Whether external media is holding capture off
    #[must_use]
    pub const fn suspended(&self) -> bool {
        self.suspended
    }

    /// Whether the platform denied microphone access for this session
    #[must_use]
    pub const fn permission_denied(&self) -> bool {
        self.permission_denied
    }

    /// Pending restart, if one is scheduled
    #[must_use]
    pub const fn scheduled_restart(&self) -> Option<Instant> {
        self.restart_at
    }

    /// Set whether the coordinator wants capture active
    ///
    /// Turning desire off drops pending interim text and scheduled restarts
    /// but does not stop a live session; call [`Self::stop`] for that.
    pub fn set_desired(&mut self, desired: bool, now: Instant) {
        if self.desired == desired {
            return;
        }
        self.desired = desired;

        if desired {
            self.stale_since = Some(now);
            self.next_health_at = Some(now + self.timing.health_interval);
            self.next_recovery_at = Some(now + self.timing.recovery_interval);
        } else {
            self.restart_at = None;
            self.debounce_at = None;
            self.session.pending_interim.clear();
            self.next_health_at = None;
            self.next_recovery_at = None;
        }
    }

    /// Hold capture off while external media plays, or release it
    pub fn set_suspended(&mut self, suspended: bool, now: Instant) {
        if self.suspended == suspended {
            return;
        }
        self.suspended = suspended;

        if suspended {
            self.restart_at = None;
            self.debounce_at = None;
            self.session.pending_interim.clear();
            self.stop();
        } else {
            self.stale_since = Some(now);
        }
    }

    /// Attempt a platform start
    ///
    /// No-op unless the session is `NotStarted`, the cooldown since the last
    /// attempt has elapsed, capture is desired, and nothing suspends it.
    /// Returns whether the platform was asked to start.
    pub fn start(&mut self, now: Instant) -> bool {
        if !self.can_start() || self.session.status != CaptureStatus::NotStarted {
            return false;
        }
        if self.cooldown_remaining(now).is_some() {
            tracing::trace!("capture start refused, cooldown active");
            return false;
        }

        self.session.status = CaptureStatus::Starting;
        self.session.last_restart_at = Some(now);
        self.restart_at = None;

        match self.recognizer.start() {
            Ok(()) => {
                tracing::debug!(generation = self.session.generation, "capture starting");
                true
            }
            Err(kind) => {
                tracing::warn!(error = %kind, "recognizer rejected start");
                self.session.status = CaptureStatus::NotStarted;
                self.on_error(&kind, now);
                false
            }
        }
    }

    /// Start now, or schedule a start for when the cooldown expires
    pub fn request_start(&mut self, now: Instant) -> bool {
        if self.start(now) {
            return true;
        }
        if self.can_start() && self.session.status == CaptureStatus::NotStarted {
            if let Some(wait) = self.cooldown_remaining(now) {
                self.schedule_restart(now + wait);
            }
        }
        false
    }

    /// Ask the platform to stop a live session
    ///
    /// No-op unless `Active`. A `Starting` session is stopped as soon as its
    /// `Started` event arrives if capture is no longer wanted by then.
    pub fn stop(&mut self) {
        if self.session.status != CaptureStatus::Active {
            return;
        }
        self.session.status = CaptureStatus::Stopping;
        self.recognizer.stop();
        tracing::debug!("capture stopping");
    }

    /// Feed a recognizer event; returns an utterance when one settles
    pub fn handle_event(&mut self, event: RecognitionEvent, now: Instant) -> Option<Utterance> {
        match event {
            RecognitionEvent::Started => {
                self.on_started(now);
                None
            }
            RecognitionEvent::Results(segments) => self.on_results(&segments, now),
            RecognitionEvent::Ended => {
                self.on_ended(now);
                None
            }
            RecognitionEvent::Error(kind) => {
                tracing::debug!(error = %kind, "recognizer error");
                self.on_error(&kind, now);
                None
            }
        }
    }

    /// Run due timers; returns an utterance promoted by the debounce
    pub fn poll(&mut self, now: Instant) -> Option<Utterance> {
        let utterance = if self.debounce_at.is_some_and(|at| now >= at) {
            self.debounce_at = None;
            let text = std::mem::take(&mut self.session.pending_interim);
            let text = text.trim();
            (!text.is_empty()).then(|| {
                tracing::debug!("silence after interim text, treating as final");
                Utterance {
                    text: text.to_string(),
                    finalized: false,
                }
            })
        } else {
            None
        };

        if self.restart_at.is_some_and(|at| now >= at) {
            self.restart_at = None;
            self.request_start(now);
        }

        if self.next_health_at.is_some_and(|at| now >= at) {
            self.next_health_at = Some(now + self.timing.health_interval);
            self.check_health(now);
        }

        if self.next_recovery_at.is_some_and(|at| now >= at) {
            self.next_recovery_at = Some(now + self.timing.recovery_interval);
            self.check_recovery(now);
        }

        utterance
    }

    /// Earliest pending timer
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        [
            self.restart_at,
            self.debounce_at,
            self.next_health_at,
            self.next_recovery_at,
        ]
        .into_iter()
        .flatten()
        .min()
    }

    fn can_start(&self) -> bool {
        self.desired && !self.suspended && !self.permission_denied
    }

    fn cooldown_remaining(&self, now: Instant) -> Option<Duration> {
        let last = self.session.last_restart_at?;
        let ready_at = last + self.timing.restart_cooldown;
        (now < ready_at).then(|| ready_at - now)
    }

    /// Keep the later of the existing and the new restart deadline
    fn schedule_restart(&mut self, at: Instant) {
        let at = self.restart_at.map_or(at, |current| current.max(at));
        self.restart_at = Some(at);
    }

    fn on_started(&mut self, now: Instant) {
        if !matches!(
            self.session.status,
            CaptureStatus::Starting | CaptureStatus::NotStarted
        ) {
            tracing::trace!(status = ?self.session.status, "ignoring duplicate started event");
            return;
        }

        self.session.status = CaptureStatus::Active;
        self.session.pending_interim.clear();
        self.session.finalized_text.clear();
        self.debounce_at = None;
        self.stale_since = Some(now);
        tracing::debug!(generation = self.session.generation, "capture active");

        if !self.can_start() {
            self.stop();
        }
    }

    fn on_results(&mut self, segments: &[TranscriptSegment], now: Instant) -> Option<Utterance> {
        if self.session.status != CaptureStatus::Active || !self.can_start() {
            tracing::trace!(status = ?self.session.status, "dropping results outside active capture");
            return None;
        }

        let finals = join_segments(segments.iter().filter(|s| s.is_final));
        if !finals.is_empty() {
            if !self.session.finalized_text.is_empty() {
                self.session.finalized_text.push(' ');
            }
            self.session.finalized_text.push_str(&finals);
            self.session.pending_interim.clear();
            self.debounce_at = None;
            return Some(Utterance {
                text: finals,
                finalized: true,
            });
        }

        let interim = join_segments(segments.iter().filter(|s| !s.is_final));
        if !interim.is_empty() {
            self.session.pending_interim = interim;
            self.debounce_at = Some(now + self.timing.silence_debounce);
        }
        None
    }

    fn on_ended(&mut self, now: Instant) {
        // Late end of a session abandoned by a rebuild
        if self.stale_ends > 0
            && matches!(
                self.session.status,
                CaptureStatus::Starting | CaptureStatus::Active
            )
        {
            self.stale_ends -= 1;
            tracing::debug!(
                generation = self.session.generation,
                "ignoring end of replaced capture session"
            );
            return;
        }
        self.stale_ends = 0;

        let previous = self.session.status;
        self.session.status = CaptureStatus::NotStarted;
        tracing::debug!(?previous, "capture ended");

        if self.can_start() {
            self.schedule_restart(now + self.timing.restart_stabilization);
        }
    }

    fn on_error(&mut self, kind: &CaptureErrorKind, now: Instant) {
        if kind.is_permission() {
            if !self.permission_denied {
                tracing::error!(error = %kind, "microphone permission denied, listening disabled");
            }
            self.permission_denied = true;
            self.restart_at = None;
            return;
        }

        let backoff = match kind {
            CaptureErrorKind::Aborted => return,
            CaptureErrorKind::NoSpeech => self.timing.no_speech_backoff,
            CaptureErrorKind::AudioCapture => self.timing.device_backoff,
            _ => self.timing.unknown_backoff,
        };

        if self.can_start() {
            tracing::debug!(error = %kind, backoff_ms = backoff.as_millis(), "scheduling capture retry");
            self.schedule_restart(now + backoff);
        }
    }

    fn check_health(&mut self, now: Instant) {
        if !self.can_start()
            || self.session.status != CaptureStatus::NotStarted
            || self.restart_at.is_some()
        {
            return;
        }

        tracing::info!("capture idle while desired, restarting");
        self.request_start(now);
    }

    fn check_recovery(&mut self, now: Instant) {
        if !self.can_start() || self.session.status == CaptureStatus::Active {
            return;
        }
        let Some(since) = self.stale_since else {
            return;
        };
        if now.duration_since(since) < self.timing.recovery_stale {
            return;
        }

        tracing::warn!(
            generation = self.session.generation,
            stale_secs = now.duration_since(since).as_secs(),
            "capture stuck, rebuilding session"
        );

        if self.session.status != CaptureStatus::NotStarted {
            self.recognizer.stop();
            self.stale_ends += 1;
        }
        self.session = CaptureSession::new(self.session.generation + 1);
        self.restart_at = None;
        self.debounce_at = None;
        self.stale_since = Some(now);
        self.start(now);
    }
}

fn join_segments<'a>(segments: impl Iterator<Item = &'a TranscriptSegment>) -> String {
    segments
        .map(|s| s.text.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
