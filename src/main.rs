use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use beacon_voice::backend::{HttpBackend, ReplyBackend, UnconfiguredBackend};
use beacon_voice::console::{
    ConsoleDisplay, ConsoleSynthesizer, LoggingLauncher, MemoryReminderStore, NullOutputProvider,
    StdinRecognizer,
};
use beacon_voice::intent::{Intent, detect_intent, extract_time};
use beacon_voice::platform::{OutputContext, OutputContextProvider};
use beacon_voice::voice::{
    AudioGate, CpalOutputContext, CpalOutputProvider, Reliability, SpeechCaptureSession,
    SpeechOutputChain, TonePlan,
};
use beacon_voice::{
    Config, ControllerEvent, EventChannel, InteractionCoordinator, Services, VoiceRuntime,
};

/// Beacon Voice - voice interaction controller
#[derive(Parser)]
#[command(name = "beacon-voice", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the controller on the terminal (default)
    Run {
        /// Reply service endpoint
        #[arg(long, env = "BEACON_VOICE_BACKEND_URL")]
        backend_url: Option<String>,

        /// Skip the audio device; tone fallback is unavailable
        #[arg(long)]
        no_audio: bool,

        /// Start with listening off
        #[arg(long)]
        muted: bool,
    },
    /// Classify a sentence and print the detected intent
    Detect {
        /// Sentence to classify
        text: String,
    },
    /// Play the tone fallback for a sentence
    TestTone {
        /// Sentence whose length sets the tone duration
        #[arg(default_value = "Hello! This is what a reply sounds like without speech.")]
        text: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,beacon_voice=info",
        1 => "info,beacon_voice=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    let command = cli.command.unwrap_or(Command::Run {
        backend_url: None,
        no_audio: false,
        muted: false,
    });

    match command {
        Command::Run {
            backend_url,
            no_audio,
            muted,
        } => run_controller(backend_url, no_audio, muted).await,
        Command::Detect { text } => detect(&text),
        Command::TestTone { text } => test_tone(&text).await,
    }
}

#[allow(clippy::future_not_send)]
async fn run_controller(backend_url: Option<String>, no_audio: bool, muted: bool) -> anyhow::Result<()> {
    let mut config = Config::load()?;
    if backend_url.is_some() {
        config.backend.url = backend_url;
    }
    tracing::debug!(?config, "loaded configuration");

    let channel = EventChannel::new();

    let provider: Box<dyn OutputContextProvider> = if no_audio {
        Box::new(NullOutputProvider)
    } else {
        Box::new(CpalOutputProvider::new())
    };
    let gate = AudioGate::new(provider);

    let recognizer = StdinRecognizer::spawn(channel.sender());
    let capture = SpeechCaptureSession::new(Box::new(recognizer), config.timing.clone());

    let synthesizer = ConsoleSynthesizer::new(channel.sender(), config.output.words_per_minute);
    let reliability = Reliability::from_hint(config.user_agent.as_deref());
    let output = SpeechOutputChain::new(config.output.clone(), Some(Box::new(synthesizer)), reliability);

    let coordinator = InteractionCoordinator::new(
        &config,
        gate,
        Some(capture),
        output,
        Box::new(ConsoleDisplay),
    );

    let backend: Arc<dyn ReplyBackend> = match config.backend.url.as_deref() {
        Some(url) => Arc::new(HttpBackend::new(url)?),
        None => {
            tracing::warn!("no backend URL configured, every reply will be the apology");
            Arc::new(UnconfiguredBackend)
        }
    };

    let services = Services {
        backend,
        launcher: Box::new(LoggingLauncher),
        reminders: Box::new(MemoryReminderStore::default()),
    };

    let mut runtime = VoiceRuntime::new(coordinator, channel, services, config.backend.timeout);
    if !muted {
        runtime
            .event_sender()
            .send(ControllerEvent::StartListening)?;
    }

    println!("Type to talk. Commands: /media on, /media off, /closed, /stop, /listen. Ctrl-C quits.");

    runtime
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    let snapshot = runtime.coordinator().snapshot();
    tracing::debug!(snapshot = %serde_json::to_string(&snapshot)?, "final state");
    Ok(())
}

fn detect(text: &str) -> anyhow::Result<()> {
    let value = match detect_intent(text) {
        Intent::Game(game) => serde_json::json!({ "intent": "game", "game": game }),
        Intent::Reminder(reminder) => serde_json::json!({
            "intent": "reminder",
            "title": reminder.title,
            "time": reminder.time,
            "confirmation": reminder.confirmation(),
        }),
        Intent::None => serde_json::json!({ "intent": "none", "time": extract_time(text) }),
    };

    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

/// Play the tone fallback on the default output device
#[allow(clippy::future_not_send)]
async fn test_tone(text: &str) -> anyhow::Result<()> {
    let config = Config::load()?;
    let plan = TonePlan::for_text(text, &config.output);

    let mut context = CpalOutputContext::open()?;
    context.resume()?;

    println!(
        "Playing {}ms tone at {} Hz ({} Hz output)...",
        plan.duration.as_millis(),
        plan.frequency_hz,
        context.sample_rate()
    );

    context.play(plan.samples(context.sample_rate()))?;
    tokio::time::sleep(plan.duration + Duration::from_millis(200)).await;

    println!("Done!");
    Ok(())
}
