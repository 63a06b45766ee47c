//! Runtime tests on tokio's paused clock

use std::sync::Arc;
use std::time::Duration;

use beacon_voice::backend::{ReplyBackend, UnconfiguredBackend};
use beacon_voice::config::DEFAULT_APOLOGY;
use beacon_voice::console::ConsoleSynthesizer;
use beacon_voice::platform::{FeatureToken, RecognitionEvent, TranscriptSegment};
use beacon_voice::voice::{Reliability, SpeechOutputChain};
use beacon_voice::{
    Config, ControllerEvent, EventChannel, InteractionCoordinator, InteractionPhase, Services,
    VoiceRuntime,
};

mod common;

use common::{
    AudioLog, DisplayLog, RecognizerLog, RecordingDisplay, RecordingLauncher, RecordingReminders,
    ScriptedBackend, Shared, SynthLog, capture, chain, gate, shared,
};

struct Harness {
    runtime: VoiceRuntime,
    launched: Shared<Vec<FeatureToken>>,
    reminders: Shared<Vec<(String, Option<String>)>>,
    display: Shared<DisplayLog>,
}

fn harness(
    channel: EventChannel,
    output: SpeechOutputChain,
    backend: Arc<dyn ReplyBackend>,
) -> Harness {
    let config = Config::default();
    let audio = shared::<AudioLog>();
    let recognizer = shared::<RecognizerLog>();
    let display = shared::<DisplayLog>();
    let launched = shared();
    let reminders = shared();

    let coordinator = InteractionCoordinator::new(
        &config,
        gate(&audio, true),
        Some(capture(&recognizer)),
        output,
        Box::new(RecordingDisplay(Arc::clone(&display))),
    );
    let services = Services {
        backend,
        launcher: Box::new(RecordingLauncher(Arc::clone(&launched))),
        reminders: Box::new(RecordingReminders(Arc::clone(&reminders))),
    };

    Harness {
        runtime: VoiceRuntime::new(coordinator, channel, services, config.backend.timeout),
        launched,
        reminders,
        display,
    }
}

/// Start listening and say `text`
fn speak_to(runtime: &VoiceRuntime, text: &str) {
    let tx = runtime.event_sender();
    tx.send(ControllerEvent::StartListening).unwrap();
    tx.send(ControllerEvent::Recognition(RecognitionEvent::Started))
        .unwrap();
    tx.send(ControllerEvent::Recognition(RecognitionEvent::Results(vec![
        TranscriptSegment::finalized(text),
    ])))
    .unwrap();
}

fn spoken(synth: &Shared<SynthLog>) -> Vec<String> {
    synth
        .lock()
        .unwrap()
        .spoken
        .iter()
        .map(|(_, text)| text.clone())
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_backend_reply_is_spoken() {
    let synth = shared::<SynthLog>();
    let backend = Arc::new(ScriptedBackend {
        reply: Ok("It's sunny today.".to_string()),
        delay: Duration::from_secs(2),
    });
    let mut h = harness(
        EventChannel::new(),
        chain(&synth, Reliability::Reliable),
        backend,
    );

    speak_to(&h.runtime, "what's the weather");
    h.runtime
        .run_until(tokio::time::sleep(Duration::from_secs(5)))
        .await
        .unwrap();

    assert_eq!(spoken(&synth), vec!["It's sunny today."]);
    assert_eq!(h.display.lock().unwrap().transcripts, vec!["what's the weather"]);
    let snapshot = h.runtime.coordinator().snapshot();
    assert_eq!(snapshot.phase, InteractionPhase::Speaking);
    assert_eq!(snapshot.history_turns, 2);
}

#[tokio::test(start_paused = true)]
async fn test_slow_backend_gets_apology() {
    let synth = shared::<SynthLog>();
    let backend = Arc::new(ScriptedBackend {
        reply: Ok("Too late".to_string()),
        delay: Duration::from_secs(60),
    });
    let mut h = harness(
        EventChannel::new(),
        chain(&synth, Reliability::Reliable),
        backend,
    );

    speak_to(&h.runtime, "tell me something");
    h.runtime
        .run_until(tokio::time::sleep(Duration::from_secs(20)))
        .await
        .unwrap();

    assert_eq!(spoken(&synth), vec![DEFAULT_APOLOGY]);
    assert!(!h.runtime.coordinator().snapshot().awaiting_reply);
}

#[tokio::test(start_paused = true)]
async fn test_game_launches_after_spoken_reply() {
    let channel = EventChannel::new();
    let synthesizer = ConsoleSynthesizer::new(channel.sender(), 150);
    let output = SpeechOutputChain::new(
        Config::default().output,
        Some(Box::new(synthesizer)),
        Reliability::Reliable,
    );
    let backend = Arc::new(ScriptedBackend {
        reply: Ok("Trivia time!".to_string()),
        delay: Duration::from_millis(100),
    });
    let mut h = harness(channel, output, backend);

    speak_to(&h.runtime, "let's play trivia");
    h.runtime
        .run_until(tokio::time::sleep(Duration::from_secs(10)))
        .await
        .unwrap();

    assert_eq!(
        *h.launched.lock().unwrap(),
        vec![FeatureToken::new("trivia", "voice")]
    );
    assert_eq!(h.display.lock().unwrap().replies, vec!["Trivia time!"]);
    assert_ne!(h.runtime.coordinator().phase(), InteractionPhase::Speaking);
}

#[tokio::test(start_paused = true)]
async fn test_reminder_reaches_store() {
    let synth = shared::<SynthLog>();
    let mut h = harness(
        EventChannel::new(),
        chain(&synth, Reliability::Reliable),
        Arc::new(UnconfiguredBackend),
    );

    speak_to(&h.runtime, "remind me to stretch at 7 pm");
    h.runtime
        .run_until(tokio::time::sleep(Duration::from_secs(1)))
        .await
        .unwrap();

    assert_eq!(
        *h.reminders.lock().unwrap(),
        vec![("stretch".to_string(), Some("19:00".to_string()))]
    );
    assert_eq!(
        spoken(&synth),
        vec!["Okay, I'll remind you to stretch at 19:00."]
    );
}

#[tokio::test(start_paused = true)]
async fn test_runtime_stops_on_shutdown() {
    let synth = shared::<SynthLog>();
    let mut h = harness(
        EventChannel::new(),
        chain(&synth, Reliability::Reliable),
        Arc::new(UnconfiguredBackend),
    );

    h.runtime
        .run_until(tokio::time::sleep(Duration::from_millis(10)))
        .await
        .unwrap();

    assert_eq!(h.runtime.coordinator().phase(), InteractionPhase::Idle);
    assert!(spoken(&synth).is_empty());
}
