//! Streams [`SampleRenderer`](crate::SampleRenderer) output to the
//! default output device via [cpal](https://crates.io/crates/cpal).
//! Requires the `cpal` feature.
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BuildStreamError, PauseStreamError, PlayStreamError, Stream};

use crate::{BeeperQueue, SampleRenderer};

#[derive(Debug)]
pub enum AudioHandleError {
    NoOutputDevice,
    Build(BuildStreamError),
    Play(PlayStreamError),
    Pause(PauseStreamError),
}

impl std::fmt::Display for AudioHandleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AudioHandleError::NoOutputDevice => write!(f, "no default audio output device"),
            AudioHandleError::Build(e) => write!(f, "failed to build audio stream: {e}"),
            AudioHandleError::Play(e) => write!(f, "failed to start audio stream: {e}"),
            AudioHandleError::Pause(e) => write!(f, "failed to pause audio stream: {e}"),
        }
    }
}

impl std::error::Error for AudioHandleError {}

/// Owns the live output stream and the queue producer side feeds.
pub struct AudioHandle {
    pub sample_rate: u32,
    pub queue: Arc<BeeperQueue>,
    stream: Stream,
}

impl AudioHandle {
    /// Opens the default output device at its preferred sample rate
    /// and starts pulling samples from a freshly created queue.
    pub fn open() -> Result<Self, AudioHandleError> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(AudioHandleError::NoOutputDevice)?;
        let config = device.default_output_config().map_err(|_| AudioHandleError::NoOutputDevice)?;
        let sample_rate = config.sample_rate().0;
        let channels = config.channels() as usize;

        let queue = Arc::new(BeeperQueue::new(sample_rate));
        let renderer = Arc::new(Mutex::new(SampleRenderer::new(sample_rate)));

        let stream_queue = Arc::clone(&queue);
        let stream_renderer = Arc::clone(&renderer);
        let stream = device
            .build_output_stream(
                &config.into(),
                move |data: &mut [f32], _| {
                    let mut mono = vec![0.0f32; data.len() / channels.max(1)];
                    stream_renderer.lock().unwrap().render(&stream_queue, &mut mono);
                    for (frame, &sample) in data.chunks_mut(channels).zip(mono.iter()) {
                        for out in frame.iter_mut() {
                            *out = sample;
                        }
                    }
                },
                |err| log::error!("audio output stream error: {err}"),
                None,
            )
            .map_err(AudioHandleError::Build)?;

        Ok(AudioHandle { sample_rate, queue, stream })
    }

    pub fn play(&self) -> Result<(), AudioHandleError> {
        self.stream.play().map_err(AudioHandleError::Play)
    }

    pub fn pause(&self) -> Result<(), AudioHandleError> {
        self.stream.pause().map_err(AudioHandleError::Pause)
    }
}
