//! Speech output fallback chain
//!
//! A reply is spoken through the first tier that works:
//!
//! ```text
//! PrimarySynthesis ──fail──▶ ToneFallback ──fail──▶ TextOnly
//! ```
//!
//! A tier that fails hard is marked broken for the rest of the session so
//! later replies skip it. Every request resolves with exactly one
//! [`Completion`], whether through a tier's own end, the watchdog, a
//! reconciliation, or a cancel.

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use serde::Serialize;

use super::environment::Reliability;
use super::gate::{AudioGate, GateError};
use super::tone::{TonePlan, estimate_speech_duration};
use crate::config::OutputConfig;
use crate::platform::{
    FeatureToken, SpeechSynthesizer, SynthesisErrorClass, SynthesisErrorKind, SynthesisEvent,
    SynthesisEventKind,
};

/// Time the platform gets to report speaking after a confirmed start
const SPEAKING_GRACE: Duration = Duration::from_secs(1);

/// One strategy in the output chain, in default preference order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackTier {
    /// Platform speech synthesis
    PrimarySynthesis,
    /// Speech-shaped tone through the audio context
    ToneFallback,
    /// No audio; text stays on screen
    TextOnly,
}

/// A request to speak a reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputRequest {
    /// Text to speak
    pub text: String,

    /// Feature to open once speaking has finished
    pub follow_up: Option<FeatureToken>,
}

impl OutputRequest {
    /// Request without a follow-up
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            follow_up: None,
        }
    }

    /// Attach a follow-up launch
    #[must_use]
    pub fn with_follow_up(mut self, token: Option<FeatureToken>) -> Self {
        self.follow_up = token;
        self
    }
}

/// How a request was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputOutcome {
    /// The tier ran to its natural end
    Finished,
    /// Platform speech reported an interruption
    Interrupted,
    /// No tier event arrived in time
    Watchdog,
    /// The platform stopped speaking without telling us
    Reconciled,
    /// Replaced by a newer request or suspended
    Canceled,
}

/// The single completion of an output request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    /// Request identifier returned by [`SpeechOutputChain::speak`]
    pub request_id: u64,

    /// Tier that was active at completion
    pub tier: FallbackTier,

    /// How it ended
    pub outcome: OutputOutcome,

    /// Follow-up to run now; always `None` for canceled requests
    pub follow_up: Option<FeatureToken>,
}

impl Completion {
    /// Whether primary synthesis spoke the reply to its end
    #[must_use]
    pub fn success(&self) -> bool {
        self.tier == FallbackTier::PrimarySynthesis && self.outcome == OutputOutcome::Finished
    }
}

struct ActiveOutput {
    id: u64,
    request: OutputRequest,
    tier: FallbackTier,
    remaining: Vec<FallbackTier>,
    confirmed_at: Option<Instant>,
    finish_at: Option<Instant>,
    watchdog_at: Option<Instant>,
}

enum TierStart {
    Started,
    Skipped,
    Interrupted,
}

/// Speaks replies through the fallback chain
pub struct SpeechOutputChain {
    config: OutputConfig,
    synthesizer: Option<Box<dyn SpeechSynthesizer>>,
    reliability: Reliability,
    broken: BTreeSet<FallbackTier>,
    active: Option<ActiveOutput>,
    next_id: u64,
}

impl SpeechOutputChain {
    /// Create a chain; `synthesizer` is `None` when the platform has no speech synthesis
    #[must_use]
    pub fn new(
        config: OutputConfig,
        synthesizer: Option<Box<dyn SpeechSynthesizer>>,
        reliability: Reliability,
    ) -> Self {
        if let Reliability::Unreliable(signal) = reliability {
            tracing::info!(signal, "environment flagged for unreliable speech, preferring tone fallback");
        }
        if synthesizer.is_none() {
            tracing::warn!("speech synthesis unavailable, replies fall back to tone or text");
        }

        Self {
            config,
            synthesizer,
            reliability,
            broken: BTreeSet::new(),
            active: None,
            next_id: 1,
        }
    }

    /// Speak a reply, canceling whatever was in flight
    ///
    /// Returns the new request id and any completions produced right away:
    /// the canceled predecessor and, if platform speech refused the text
    /// with an interruption, the new request itself.
    pub fn speak(
        &mut self,
        request: OutputRequest,
        gate: &mut AudioGate,
        now: Instant,
    ) -> (u64, Vec<Completion>) {
        let mut completions: Vec<Completion> = self.cancel(gate).into_iter().collect();

        let id = self.next_id;
        self.next_id += 1;

        let remaining = self.tier_order();
        tracing::debug!(request = id, tiers = ?remaining, "speaking reply");

        self.active = Some(ActiveOutput {
            id,
            request,
            tier: FallbackTier::TextOnly,
            remaining,
            confirmed_at: None,
            finish_at: None,
            watchdog_at: None,
        });

        completions.extend(self.advance(gate, now));
        (id, completions)
    }

    /// Feed a synthesis event
    pub fn handle_event(
        &mut self,
        event: &SynthesisEvent,
        gate: &mut AudioGate,
        now: Instant,
    ) -> Option<Completion> {
        let active = self.active.as_mut()?;
        if active.id != event.utterance || active.tier != FallbackTier::PrimarySynthesis {
            tracing::trace!(utterance = event.utterance, "ignoring stale synthesis event");
            return None;
        }

        match &event.kind {
            SynthesisEventKind::Start => {
                let estimate = estimate_speech_duration(&active.request.text, self.config.words_per_minute);
                active.confirmed_at = Some(now);
                active.watchdog_at = Some(now + estimate + self.config.watchdog);
                None
            }
            SynthesisEventKind::End => self.finish(OutputOutcome::Finished),
            SynthesisEventKind::Error(kind) => self.primary_failed(kind, gate, now),
        }
    }

    /// Run due timers: tone/text completion and the watchdog
    pub fn poll(&mut self, gate: &mut AudioGate, now: Instant) -> Option<Completion> {
        let active = self.active.as_ref()?;

        if active.finish_at.is_some_and(|at| now >= at) {
            return self.finish(OutputOutcome::Finished);
        }

        if active.watchdog_at.is_some_and(|at| now >= at) {
            let tier = active.tier;
            tracing::warn!(?tier, request = active.id, "output watchdog fired, marking tier broken");
            self.mark_broken(tier);
            self.halt_tier(tier, gate);
            return self.finish(OutputOutcome::Watchdog);
        }

        None
    }

    /// Check the platform's speaking status against the active request
    ///
    /// Completes a confirmed primary utterance the platform is no longer
    /// speaking, and silences platform speech nobody asked for.
    pub fn reconcile(&mut self, now: Instant) -> Option<Completion> {
        let platform_speaking = self.synthesizer.as_ref().is_some_and(|s| s.is_speaking());

        let Some(active) = self.active.as_ref() else {
            if platform_speaking {
                tracing::warn!("platform speaking with no active request, canceling");
                if let Some(synthesizer) = self.synthesizer.as_mut() {
                    synthesizer.cancel();
                }
            }
            return None;
        };

        let missed_end = active.tier == FallbackTier::PrimarySynthesis
            && active
                .confirmed_at
                .is_some_and(|at| now >= at + SPEAKING_GRACE)
            && !platform_speaking;

        if missed_end {
            tracing::warn!(request = active.id, "speech ended without an end event");
            return self.finish(OutputOutcome::Reconciled);
        }
        None
    }

    /// Cancel the in-flight request, if any
    pub fn cancel(&mut self, gate: &mut AudioGate) -> Option<Completion> {
        let tier = self.active.as_ref()?.tier;
        self.halt_tier(tier, gate);
        self.finish(OutputOutcome::Canceled)
    }

    /// Drop the follow-up of the in-flight request
    pub fn clear_follow_up(&mut self) -> Option<FeatureToken> {
        self.active.as_mut().and_then(|a| a.request.follow_up.take())
    }

    /// Whether a request is in flight
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Identifier of the in-flight request
    #[must_use]
    pub fn current_request(&self) -> Option<u64> {
        self.active.as_ref().map(|a| a.id)
    }

    /// Tier of the in-flight request
    #[must_use]
    pub fn current_tier(&self) -> Option<FallbackTier> {
        self.active.as_ref().map(|a| a.tier)
    }

    /// Tiers marked broken for this session
    #[must_use]
    pub fn broken_tiers(&self) -> Vec<FallbackTier> {
        self.broken.iter().copied().collect()
    }

    /// Whether `tier` has been marked broken
    #[must_use]
    pub fn is_broken(&self, tier: FallbackTier) -> bool {
        self.broken.contains(&tier)
    }

    /// Earliest pending timer
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        let active = self.active.as_ref()?;
        match (active.finish_at, active.watchdog_at) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn tier_order(&self) -> Vec<FallbackTier> {
        let preferred = if self.reliability.prefers_fallback() {
            [FallbackTier::ToneFallback, FallbackTier::PrimarySynthesis]
        } else {
            [FallbackTier::PrimarySynthesis, FallbackTier::ToneFallback]
        };

        let mut order: Vec<FallbackTier> = preferred
            .into_iter()
            .filter(|tier| !self.broken.contains(tier))
            .filter(|tier| *tier != FallbackTier::PrimarySynthesis || self.synthesizer.is_some())
            .collect();
        order.push(FallbackTier::TextOnly);
        order
    }

    /// Start the next tier in the request's order
    fn advance(&mut self, gate: &mut AudioGate, now: Instant) -> Option<Completion> {
        loop {
            let active = self.active.as_mut()?;
            if active.remaining.is_empty() {
                active.remaining.push(FallbackTier::TextOnly);
            }
            let tier = active.remaining.remove(0);

            match self.start_tier(tier, gate, now) {
                TierStart::Started => return None,
                TierStart::Skipped => {}
                TierStart::Interrupted => return self.finish(OutputOutcome::Interrupted),
            }
        }
    }

    fn start_tier(&mut self, tier: FallbackTier, gate: &mut AudioGate, now: Instant) -> TierStart {
        match tier {
            FallbackTier::PrimarySynthesis => self.start_primary(gate, now),
            FallbackTier::ToneFallback => self.start_tone(gate, now),
            FallbackTier::TextOnly => {
                self.start_text_only(now);
                TierStart::Started
            }
        }
    }

    fn start_primary(&mut self, gate: &mut AudioGate, now: Instant) -> TierStart {
        if self.broken.contains(&FallbackTier::PrimarySynthesis) {
            return TierStart::Skipped;
        }
        if let Err(GateError::NotInteractedYet) = gate.ensure_output_context() {
            tracing::debug!("audio locked until user interaction, skipping speech synthesis");
            return TierStart::Skipped;
        }

        let result = {
            let (Some(synthesizer), Some(active)) =
                (self.synthesizer.as_mut(), self.active.as_mut())
            else {
                return TierStart::Skipped;
            };
            synthesizer.speak(active.id, &active.request.text)
        };

        match result {
            Ok(()) => {
                if let Some(active) = self.active.as_mut() {
                    active.tier = FallbackTier::PrimarySynthesis;
                    active.confirmed_at = None;
                    active.finish_at = None;
                    active.watchdog_at = Some(now + self.config.watchdog);
                }
                TierStart::Started
            }
            Err(kind) => {
                tracing::warn!(error = %kind, "speech synthesis rejected utterance");
                let class = self.classify_primary_error(&kind);
                let Some(active) = self.active.as_mut() else {
                    return TierStart::Skipped;
                };
                match class {
                    SynthesisErrorClass::Interrupted => {
                        active.tier = FallbackTier::PrimarySynthesis;
                        TierStart::Interrupted
                    }
                    SynthesisErrorClass::Permission => {
                        active.remaining = vec![FallbackTier::TextOnly];
                        TierStart::Skipped
                    }
                    SynthesisErrorClass::Failure => TierStart::Skipped,
                }
            }
        }
    }

    fn start_tone(&mut self, gate: &mut AudioGate, now: Instant) -> TierStart {
        if self.broken.contains(&FallbackTier::ToneFallback) {
            return TierStart::Skipped;
        }
        let Some(active) = self.active.as_mut() else {
            return TierStart::Skipped;
        };

        let context = match gate.ensure_output_context() {
            Ok(context) => context,
            Err(e) => {
                tracing::debug!(error = %e, "tone fallback unavailable");
                return TierStart::Skipped;
            }
        };

        let plan = TonePlan::for_text(&active.request.text, &self.config);
        let samples = plan.samples(context.sample_rate());

        match context.play(samples) {
            Ok(()) => {
                tracing::debug!(duration_ms = plan.duration.as_millis(), "playing tone fallback");
                active.tier = FallbackTier::ToneFallback;
                active.confirmed_at = Some(now);
                active.finish_at = Some(now + plan.duration);
                active.watchdog_at = Some(now + plan.duration + self.config.watchdog);
                TierStart::Started
            }
            Err(e) => {
                tracing::warn!(error = %e, "tone playback failed, marking tone fallback broken");
                self.broken.insert(FallbackTier::ToneFallback);
                TierStart::Skipped
            }
        }
    }

    fn start_text_only(&mut self, now: Instant) {
        if let Some(active) = self.active.as_mut() {
            tracing::debug!(request = active.id, "reply shown as text only");
            active.tier = FallbackTier::TextOnly;
            active.confirmed_at = Some(now);
            active.finish_at = Some(now + self.config.text_only_display);
            active.watchdog_at = None;
        }
    }

    fn primary_failed(
        &mut self,
        kind: &SynthesisErrorKind,
        gate: &mut AudioGate,
        now: Instant,
    ) -> Option<Completion> {
        tracing::warn!(error = %kind, "speech synthesis failed");
        match self.classify_primary_error(kind) {
            SynthesisErrorClass::Interrupted => self.finish(OutputOutcome::Interrupted),
            SynthesisErrorClass::Permission => {
                if let Some(active) = self.active.as_mut() {
                    active.remaining = vec![FallbackTier::TextOnly];
                }
                self.advance(gate, now)
            }
            SynthesisErrorClass::Failure => self.advance(gate, now),
        }
    }

    /// Classify a primary error and update the broken set accordingly
    fn classify_primary_error(&mut self, kind: &SynthesisErrorKind) -> SynthesisErrorClass {
        let class = kind.class();
        if class != SynthesisErrorClass::Interrupted {
            self.mark_broken(FallbackTier::PrimarySynthesis);
        }
        class
    }

    fn mark_broken(&mut self, tier: FallbackTier) {
        if tier != FallbackTier::TextOnly && self.broken.insert(tier) {
            tracing::info!(?tier, "output tier marked broken for this session");
        }
    }

    fn halt_tier(&mut self, tier: FallbackTier, gate: &mut AudioGate) {
        match tier {
            FallbackTier::PrimarySynthesis => {
                if let Some(synthesizer) = self.synthesizer.as_mut() {
                    synthesizer.cancel();
                }
            }
            FallbackTier::ToneFallback => gate.stop_output(),
            FallbackTier::TextOnly => {}
        }
    }

    fn finish(&mut self, outcome: OutputOutcome) -> Option<Completion> {
        let active = self.active.take()?;
        let follow_up = if outcome == OutputOutcome::Canceled {
            if active.request.follow_up.is_some() {
                tracing::debug!(request = active.id, "dropping follow-up of canceled reply");
            }
            None
        } else {
            active.request.follow_up
        };

        tracing::debug!(request = active.id, tier = ?active.tier, ?outcome, "output complete");
        Some(Completion {
            request_id: active.id,
            tier: active.tier,
            outcome,
            follow_up,
        })
    }
}
