//! Audio output context backed by the default output device

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, Stream, StreamConfig};

use crate::platform::{ContextState, OutputContext, OutputContextProvider};
use crate::{Error, Result};

/// Preferred output rate
const PREFERRED_SAMPLE_RATE: u32 = 24000;

/// Builds [`CpalOutputContext`]s on the default output device
#[derive(Debug, Default)]
pub struct CpalOutputProvider;

impl CpalOutputProvider {
    /// Create a provider; no device is opened until [`OutputContextProvider::create`]
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl OutputContextProvider for CpalOutputProvider {
    fn create(&mut self) -> Result<Box<dyn OutputContext>> {
        Ok(Box::new(CpalOutputContext::open()?))
    }
}

/// An output stream fed from a shared sample queue
///
/// The stream is built paused, matching a platform context that starts
/// suspended until resumed.
pub struct CpalOutputContext {
    stream: Stream,
    config: StreamConfig,
    queue: Arc<Mutex<VecDeque<f32>>>,
    state: ContextState,
}

impl CpalOutputContext {
    /// Open the default output device
    ///
    /// # Errors
    ///
    /// Returns error if no device or usable config is available
    pub fn open() -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

        let supported_config = device
            .supported_output_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(PREFERRED_SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(PREFERRED_SAMPLE_RATE)
            })
            .or_else(|| {
                device.supported_output_configs().ok()?.find(|c| {
                    c.channels() == 2
                        && c.min_sample_rate() <= SampleRate(PREFERRED_SAMPLE_RATE)
                        && c.max_sample_rate() >= SampleRate(PREFERRED_SAMPLE_RATE)
                })
            })
            .map(|c| c.with_sample_rate(SampleRate(PREFERRED_SAMPLE_RATE)))
            .or_else(|| device.default_output_config().ok())
            .ok_or_else(|| Error::Audio("no suitable output config found".to_string()))?;

        let config = supported_config.config();
        let channels = usize::from(config.channels);
        let queue: Arc<Mutex<VecDeque<f32>>> = Arc::new(Mutex::new(VecDeque::new()));
        let feed = Arc::clone(&queue);

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let Ok(mut queue) = feed.lock() else {
                        data.fill(0.0);
                        return;
                    };
                    for frame in data.chunks_mut(channels) {
                        let sample = queue.pop_front().unwrap_or(0.0);
                        frame.fill(sample);
                    }
                },
                |err| {
                    tracing::error!(error = %err, "audio output stream error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        // Streams may auto-start on some hosts
        let _ = stream.pause();

        tracing::debug!(
            device = %device.name().unwrap_or_default(),
            sample_rate = config.sample_rate.0,
            channels = config.channels,
            "audio output context opened"
        );

        Ok(Self {
            stream,
            config,
            queue,
            state: ContextState::Suspended,
        })
    }
}

impl OutputContext for CpalOutputContext {
    fn state(&self) -> ContextState {
        self.state
    }

    fn resume(&mut self) -> Result<()> {
        self.stream
            .play()
            .map_err(|e| Error::Audio(format!("resume failed: {e}")))?;
        self.state = ContextState::Running;
        Ok(())
    }

    fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    fn play(&mut self, samples: Vec<f32>) -> Result<()> {
        if samples.is_empty() {
            return Ok(());
        }
        let mut queue = self
            .queue
            .lock()
            .map_err(|_| Error::Audio("output queue poisoned".to_string()))?;
        queue.extend(samples);
        tracing::trace!(queued = queue.len(), "samples queued");
        Ok(())
    }

    fn stop(&mut self) {
        if let Ok(mut queue) = self.queue.lock() {
            queue.clear();
        }
    }
}
