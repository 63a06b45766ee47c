//! Shared test utilities
//!
//! Recording fakes for every platform contract. Each fake writes into an
//! `Arc<Mutex<_>>` log the test keeps a handle to.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use beacon_voice::backend::{ReplyBackend, ReplyRequest};
use beacon_voice::platform::{
    CaptureErrorKind, ContextState, FeatureLauncher, FeatureToken, OutputContext,
    OutputContextProvider, ReminderStore, SpeechRecognizer, SpeechSynthesizer, SynthesisErrorKind,
    TextDisplay,
};
use beacon_voice::voice::{AudioGate, Gesture, Reliability, SpeechCaptureSession, SpeechOutputChain};
use beacon_voice::{Config, Error, InteractionCoordinator, Result};

/// Shared log handle
pub type Shared<T> = Arc<Mutex<T>>;

pub fn shared<T: Default>() -> Shared<T> {
    Arc::new(Mutex::new(T::default()))
}

#[derive(Debug, Default)]
pub struct RecognizerLog {
    pub starts: usize,
    pub stops: usize,
    pub reject_next: Option<CaptureErrorKind>,
}

pub struct FakeRecognizer(pub Shared<RecognizerLog>);

impl SpeechRecognizer for FakeRecognizer {
    fn start(&mut self) -> std::result::Result<(), CaptureErrorKind> {
        let mut log = self.0.lock().unwrap();
        log.starts += 1;
        log.reject_next.take().map_or(Ok(()), Err)
    }

    fn stop(&mut self) {
        self.0.lock().unwrap().stops += 1;
    }
}

#[derive(Debug, Default)]
pub struct SynthLog {
    pub spoken: Vec<(u64, String)>,
    pub cancels: usize,
    pub speaking: bool,
    pub reject_with: Option<SynthesisErrorKind>,
}

pub struct FakeSynthesizer(pub Shared<SynthLog>);

impl SpeechSynthesizer for FakeSynthesizer {
    fn speak(&mut self, utterance: u64, text: &str) -> std::result::Result<(), SynthesisErrorKind> {
        let mut log = self.0.lock().unwrap();
        if let Some(kind) = log.reject_with.clone() {
            return Err(kind);
        }
        log.spoken.push((utterance, text.to_string()));
        log.speaking = true;
        Ok(())
    }

    fn cancel(&mut self) {
        let mut log = self.0.lock().unwrap();
        log.cancels += 1;
        log.speaking = false;
    }

    fn is_speaking(&self) -> bool {
        self.0.lock().unwrap().speaking
    }
}

#[derive(Debug, Default)]
pub struct AudioLog {
    pub created: usize,
    pub played: Vec<usize>,
    pub stops: usize,
    pub fail_create: bool,
    pub fail_play: bool,
    pub refuse_resume: bool,
}

pub struct FakeProvider(pub Shared<AudioLog>);

impl OutputContextProvider for FakeProvider {
    fn create(&mut self) -> Result<Box<dyn OutputContext>> {
        let mut log = self.0.lock().unwrap();
        if log.fail_create {
            return Err(Error::Audio("no device".to_string()));
        }
        log.created += 1;
        Ok(Box::new(FakeContext {
            log: Arc::clone(&self.0),
            state: ContextState::Suspended,
        }))
    }
}

pub struct FakeContext {
    log: Shared<AudioLog>,
    state: ContextState,
}

impl OutputContext for FakeContext {
    fn state(&self) -> ContextState {
        self.state
    }

    fn resume(&mut self) -> Result<()> {
        if self.log.lock().unwrap().refuse_resume {
            return Err(Error::Audio("resume refused".to_string()));
        }
        self.state = ContextState::Running;
        Ok(())
    }

    fn sample_rate(&self) -> u32 {
        8000
    }

    fn play(&mut self, samples: Vec<f32>) -> Result<()> {
        let mut log = self.log.lock().unwrap();
        if log.fail_play {
            return Err(Error::Audio("device busy".to_string()));
        }
        log.played.push(samples.len());
        Ok(())
    }

    fn stop(&mut self) {
        self.log.lock().unwrap().stops += 1;
    }
}

#[derive(Debug, Default)]
pub struct DisplayLog {
    pub transcripts: Vec<String>,
    pub replies: Vec<String>,
}

pub struct RecordingDisplay(pub Shared<DisplayLog>);

impl TextDisplay for RecordingDisplay {
    fn show_transcript(&mut self, text: &str) {
        self.0.lock().unwrap().transcripts.push(text.to_string());
    }

    fn show_reply(&mut self, text: &str) {
        self.0.lock().unwrap().replies.push(text.to_string());
    }
}

pub struct RecordingLauncher(pub Shared<Vec<FeatureToken>>);

impl FeatureLauncher for RecordingLauncher {
    fn launch(&mut self, token: &FeatureToken) {
        self.0.lock().unwrap().push(token.clone());
    }
}

pub struct RecordingReminders(pub Shared<Vec<(String, Option<String>)>>);

impl ReminderStore for RecordingReminders {
    fn create(&mut self, title: &str, time: Option<&str>) -> Result<String> {
        let mut log = self.0.lock().unwrap();
        log.push((title.to_string(), time.map(ToString::to_string)));
        Ok(format!("reminder-{}", log.len()))
    }
}

/// Backend answering with a fixed reply after a delay
pub struct ScriptedBackend {
    pub reply: std::result::Result<String, String>,
    pub delay: Duration,
}

#[async_trait]
impl ReplyBackend for ScriptedBackend {
    async fn reply(&self, _request: &ReplyRequest) -> Result<String> {
        tokio::time::sleep(self.delay).await;
        self.reply.clone().map_err(Error::Backend)
    }
}

/// Gate over a fake provider, optionally already unlocked
pub fn gate(audio: &Shared<AudioLog>, unlocked: bool) -> AudioGate {
    let mut gate = AudioGate::new(Box::new(FakeProvider(Arc::clone(audio))));
    if unlocked {
        gate.record_user_interaction(Gesture::Click);
    }
    gate
}

/// Output chain over a fake synthesizer
pub fn chain(synth: &Shared<SynthLog>, reliability: Reliability) -> SpeechOutputChain {
    SpeechOutputChain::new(
        Config::default().output,
        Some(Box::new(FakeSynthesizer(Arc::clone(synth)))),
        reliability,
    )
}

/// Capture session over a fake recognizer
pub fn capture(recognizer: &Shared<RecognizerLog>) -> SpeechCaptureSession {
    SpeechCaptureSession::new(
        Box::new(FakeRecognizer(Arc::clone(recognizer))),
        Config::default().timing,
    )
}

/// A coordinator wired to recording fakes
pub struct Rig {
    pub coordinator: InteractionCoordinator,
    pub recognizer: Shared<RecognizerLog>,
    pub synth: Shared<SynthLog>,
    pub audio: Shared<AudioLog>,
    pub display: Shared<DisplayLog>,
}

impl Rig {
    pub fn new() -> Self {
        let recognizer = shared();
        let synth = shared();
        let audio = shared();
        let display = shared();

        let coordinator = InteractionCoordinator::new(
            &Config::default(),
            gate(&audio, true),
            Some(capture(&recognizer)),
            chain(&synth, Reliability::Reliable),
            Box::new(RecordingDisplay(Arc::clone(&display))),
        );

        Self {
            coordinator,
            recognizer,
            synth,
            audio,
            display,
        }
    }

    pub fn starts(&self) -> usize {
        self.recognizer.lock().unwrap().starts
    }

    pub fn stops(&self) -> usize {
        self.recognizer.lock().unwrap().stops
    }

    pub fn spoken(&self) -> Vec<String> {
        self.synth
            .lock()
            .unwrap()
            .spoken
            .iter()
            .map(|(_, text)| text.clone())
            .collect()
    }

    /// Utterance id of the most recent speak call
    pub fn last_utterance(&self) -> u64 {
        self.synth.lock().unwrap().spoken.last().map_or(0, |(id, _)| *id)
    }
}
