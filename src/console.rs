//! Terminal adapters for running the controller without a browser
//!
//! Typed lines stand in for recognized speech and printed lines stand in for
//! the display. Speech synthesis is simulated with the same word-rate estimate
//! the output chain uses, so the phases play out with realistic timing.
//!
//! Console commands:
//!
//! - `/media on`, `/media off`: simulate external media playback
//! - `/closed`: report that a launched feature was closed
//! - `/stop`, `/listen`: toggle listening

use std::io::BufRead;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::coordinator::ControllerEvent;
use crate::platform::{
    CaptureErrorKind, FeatureLauncher, FeatureToken, OutputContext, OutputContextProvider,
    RecognitionEvent, ReminderStore, SpeechRecognizer, SpeechSynthesizer, SynthesisErrorKind,
    SynthesisEvent, SynthesisEventKind, TextDisplay, TranscriptSegment,
};
use crate::runtime::EventSender;
use crate::voice::{Gesture, estimate_speech_duration};
use crate::{Error, Result};

/// Recognizer fed by lines typed on stdin
pub struct StdinRecognizer {
    tx: EventSender,
    active: Arc<AtomicBool>,
}

impl StdinRecognizer {
    /// Spawn the stdin reader and return the recognizer
    #[must_use]
    pub fn spawn(tx: EventSender) -> Self {
        let active = Arc::new(AtomicBool::new(false));
        let reader_active = Arc::clone(&active);
        let reader_tx = tx.clone();

        let _handle = std::thread::spawn(move || {
            let stdin = std::io::stdin();
            let mut gestured = false;

            for line in stdin.lock().lines().map_while(std::result::Result::ok) {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                // Typing counts as the unlocking gesture
                if !gestured {
                    gestured = true;
                    let _ = reader_tx.send(ControllerEvent::Gesture(Gesture::KeyDown));
                }

                let event = match line {
                    "/media on" => ControllerEvent::MediaPlayback { playing: true },
                    "/media off" => ControllerEvent::MediaPlayback { playing: false },
                    "/closed" => ControllerEvent::FeatureClosed,
                    "/stop" => ControllerEvent::StopListening,
                    "/listen" => ControllerEvent::StartListening,
                    text if reader_active.load(Ordering::SeqCst) => {
                        ControllerEvent::Recognition(RecognitionEvent::Results(vec![
                            TranscriptSegment::finalized(text),
                        ]))
                    }
                    _ => {
                        println!("(not listening right now)");
                        continue;
                    }
                };

                if reader_tx.send(event).is_err() {
                    break;
                }
            }
            tracing::debug!("stdin closed");
        });

        Self { tx, active }
    }
}

impl SpeechRecognizer for StdinRecognizer {
    fn start(&mut self) -> std::result::Result<(), CaptureErrorKind> {
        self.active.store(true, Ordering::SeqCst);
        self.tx
            .send(ControllerEvent::Recognition(RecognitionEvent::Started))
            .map_err(|_| CaptureErrorKind::Other("event channel closed".to_string()))
    }

    fn stop(&mut self) {
        self.active.store(false, Ordering::SeqCst);
        let _ = self
            .tx
            .send(ControllerEvent::Recognition(RecognitionEvent::Ended));
    }
}

/// Synthesizer that "speaks" for as long as the text would take to say
pub struct ConsoleSynthesizer {
    tx: EventSender,
    words_per_minute: u32,
    current: Arc<AtomicU64>,
}

impl ConsoleSynthesizer {
    #[must_use]
    pub fn new(tx: EventSender, words_per_minute: u32) -> Self {
        Self {
            tx,
            words_per_minute,
            current: Arc::new(AtomicU64::new(0)),
        }
    }

    fn send(&self, utterance: u64, kind: SynthesisEventKind) {
        let _ = self
            .tx
            .send(ControllerEvent::Synthesis(SynthesisEvent::new(utterance, kind)));
    }
}

impl SpeechSynthesizer for ConsoleSynthesizer {
    fn speak(&mut self, utterance: u64, text: &str) -> std::result::Result<(), SynthesisErrorKind> {
        self.cancel();
        self.current.store(utterance, Ordering::SeqCst);
        self.send(utterance, SynthesisEventKind::Start);

        let duration = estimate_speech_duration(text, self.words_per_minute);
        let current = Arc::clone(&self.current);
        let tx = self.tx.clone();

        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            if current
                .compare_exchange(utterance, 0, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                let _ = tx.send(ControllerEvent::Synthesis(SynthesisEvent::new(
                    utterance,
                    SynthesisEventKind::End,
                )));
            }
        });

        Ok(())
    }

    fn cancel(&mut self) {
        let utterance = self.current.swap(0, Ordering::SeqCst);
        if utterance != 0 {
            self.send(
                utterance,
                SynthesisEventKind::Error(SynthesisErrorKind::Interrupted),
            );
        }
    }

    fn is_speaking(&self) -> bool {
        self.current.load(Ordering::SeqCst) != 0
    }
}

/// Provider for runs without audio hardware
#[derive(Debug, Default)]
pub struct NullOutputProvider;

impl OutputContextProvider for NullOutputProvider {
    fn create(&mut self) -> Result<Box<dyn OutputContext>> {
        Err(Error::Audio("audio output disabled".to_string()))
    }
}

/// Prints transcripts and replies
#[derive(Debug, Default)]
pub struct ConsoleDisplay;

impl TextDisplay for ConsoleDisplay {
    fn show_transcript(&mut self, text: &str) {
        println!("you: {text}");
    }

    fn show_reply(&mut self, text: &str) {
        println!("assistant: {text}");
    }
}

/// Launcher that only reports what it would open
#[derive(Debug, Default)]
pub struct LoggingLauncher;

impl FeatureLauncher for LoggingLauncher {
    fn launch(&mut self, token: &FeatureToken) {
        tracing::info!(feature = %token.feature_id, mode = %token.mode, "opening feature");
        println!("[opening {} ({})]", token.feature_id, token.mode);
    }
}

/// A reminder held in memory
#[derive(Debug, Clone)]
pub struct StoredReminder {
    pub id: String,
    pub title: String,
    pub time: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// In-memory reminder store
#[derive(Debug, Default)]
pub struct MemoryReminderStore {
    reminders: Vec<StoredReminder>,
}

impl MemoryReminderStore {
    #[must_use]
    pub fn reminders(&self) -> &[StoredReminder] {
        &self.reminders
    }
}

impl ReminderStore for MemoryReminderStore {
    fn create(&mut self, title: &str, time: Option<&str>) -> Result<String> {
        let title = title.trim();
        if title.is_empty() {
            return Err(Error::Reminder("title must not be empty".to_string()));
        }

        let reminder = StoredReminder {
            id: Uuid::new_v4().to_string(),
            title: title.to_string(),
            time: time.map(ToString::to_string),
            created_at: Utc::now(),
        };
        let id = reminder.id.clone();
        println!(
            "[reminder saved: {}{}]",
            reminder.title,
            reminder
                .time
                .as_deref()
                .map(|t| format!(" at {t}"))
                .unwrap_or_default()
        );
        self.reminders.push(reminder);
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reminder_store_assigns_ids() {
        let mut store = MemoryReminderStore::default();
        let first = store.create("call mom", Some("18:30")).unwrap();
        let second = store.create("stretch", None).unwrap();

        assert_ne!(first, second);
        assert_eq!(store.reminders().len(), 2);
        assert_eq!(store.reminders()[0].time.as_deref(), Some("18:30"));
    }

    #[test]
    fn reminder_store_rejects_empty_title() {
        let mut store = MemoryReminderStore::default();
        assert!(matches!(store.create("  ", None), Err(Error::Reminder(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn console_synthesizer_reports_end() {
        let channel = crate::runtime::EventChannel::new();
        let mut synth = ConsoleSynthesizer::new(channel.sender(), 150);
        let mut rx = channel.into_receiver();

        synth.speak(7, "one two three").unwrap();
        assert!(synth.is_speaking());

        let start = rx.recv().await.unwrap();
        assert_eq!(
            start,
            ControllerEvent::Synthesis(SynthesisEvent::new(7, SynthesisEventKind::Start))
        );

        let end = rx.recv().await.unwrap();
        assert_eq!(
            end,
            ControllerEvent::Synthesis(SynthesisEvent::new(7, SynthesisEventKind::End))
        );
        assert!(!synth.is_speaking());
    }

    #[tokio::test(start_paused = true)]
    async fn console_synthesizer_cancel_interrupts() {
        let channel = crate::runtime::EventChannel::new();
        let mut synth = ConsoleSynthesizer::new(channel.sender(), 150);
        let mut rx = channel.into_receiver();

        synth.speak(3, "a long reply that takes a while").unwrap();
        synth.cancel();

        let _start = rx.recv().await.unwrap();
        let interrupted = rx.recv().await.unwrap();
        assert_eq!(
            interrupted,
            ControllerEvent::Synthesis(SynthesisEvent::new(
                3,
                SynthesisEventKind::Error(SynthesisErrorKind::Interrupted)
            ))
        );
        assert!(!synth.is_speaking());
    }
}
