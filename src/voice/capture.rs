//! Audio capture from microphone

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, Stream, StreamConfig};

use super::segmenter::{UtteranceSegmenter, calculate_energy};
use crate::{Error, Result};

/// Sample rate for audio capture (16kHz for speech)
pub const SAMPLE_RATE: u32 = 16000;

/// Ambient noise calibration window
pub const CALIBRATION: Duration = Duration::from_millis(500);

/// How long to wait for speech to start
pub const WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Longest phrase captured in one utterance
pub const PHRASE_LIMIT: Duration = Duration::from_secs(10);

/// Buffer polling interval while capturing
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Source of single spoken utterances
///
/// Implementations block the calling thread; callers run them on a
/// blocking-capable thread.
pub trait Microphone: Send + Sync {
    /// Calibrate, wait for speech and capture one utterance as WAV bytes
    ///
    /// # Errors
    ///
    /// Returns `Error::Timeout` if no speech starts within the wait timeout,
    /// or `Error::Audio` if the device fails
    fn capture_utterance(&self) -> Result<Vec<u8>>;
}

/// Captures audio from the default input device
pub struct AudioCapture {
    device: Device,
    config: StreamConfig,
    buffer: Arc<Mutex<Vec<f32>>>,
    stream: Option<Stream>,
}

impl AudioCapture {
    /// Create a new audio capture instance
    ///
    /// # Errors
    ///
    /// Returns error if audio device cannot be opened
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_input_device()
            .ok_or_else(|| Error::Audio("no input device available".to_string()))?;

        let supported_config = device
            .supported_input_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(SAMPLE_RATE)
            })
            .ok_or_else(|| Error::Audio("no suitable audio config found".to_string()))?;

        let config = supported_config
            .with_sample_rate(SampleRate(SAMPLE_RATE))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = SAMPLE_RATE,
            channels = config.channels,
            "audio capture initialized"
        );

        Ok(Self {
            device,
            config,
            buffer: Arc::new(Mutex::new(Vec::new())),
            stream: None,
        })
    }

    /// Start capturing audio
    ///
    /// # Errors
    ///
    /// Returns error if capture fails
    pub fn start(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let buffer = Arc::clone(&self.buffer);
        let stream = self
            .device
            .build_input_stream(
                &self.config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    buffer
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .extend_from_slice(data);
                },
                |err| {
                    tracing::error!(error = %err, "audio capture error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;
        self.stream = Some(stream);

        tracing::debug!("audio capture started");
        Ok(())
    }

    /// Stop capturing audio
    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            tracing::debug!("audio capture stopped");
        }
    }

    /// Take the samples captured since the last call
    #[must_use]
    pub fn take_buffer(&self) -> Vec<f32> {
        std::mem::take(&mut *self.buffer.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Copy the captured samples without clearing
    #[must_use]
    pub fn peek_buffer(&self) -> Vec<f32> {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Sample rate the device was opened at
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    /// Clear the audio buffer
    pub fn clear_buffer(&self) {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// Microphone backed by the default cpal input device
///
/// The device is opened per utterance so an unplugged microphone surfaces
/// as a per-iteration error instead of a dead stream.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalMicrophone;

impl CpalMicrophone {
    /// Check that an input device can be opened
    #[must_use]
    pub fn probe() -> bool {
        match AudioCapture::new() {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(error = %e, "microphone unavailable");
                false
            }
        }
    }
}

impl Microphone for CpalMicrophone {
    fn capture_utterance(&self) -> Result<Vec<u8>> {
        let mut capture = AudioCapture::new()?;
        capture.start()?;

        tracing::debug!("adjusting for ambient noise");
        std::thread::sleep(CALIBRATION);
        let ambient = calculate_energy(&capture.take_buffer());
        let mut segmenter = UtteranceSegmenter::calibrated(ambient);

        tracing::debug!(ambient, threshold = segmenter.threshold(), "listening");
        let started = Instant::now();
        let mut speech_started: Option<Instant> = None;

        let samples = loop {
            std::thread::sleep(POLL_INTERVAL);
            let chunk = capture.take_buffer();

            if segmenter.process(&chunk) {
                break segmenter.take_speech_buffer();
            }

            if segmenter.is_speaking() {
                let since = *speech_started.get_or_insert_with(Instant::now);
                if since.elapsed() >= PHRASE_LIMIT {
                    tracing::debug!("phrase limit reached");
                    break segmenter.take_speech_buffer();
                }
            } else if speech_started.is_none() && started.elapsed() >= WAIT_TIMEOUT {
                capture.stop();
                return Err(Error::Timeout(
                    "listening timed out while waiting for phrase to start".to_string(),
                ));
            }
        };

        capture.stop();
        samples_to_wav(&samples, SAMPLE_RATE)
    }
}

/// Convert f32 samples to WAV bytes for STT APIs
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in samples {
            // Convert f32 [-1.0, 1.0] to i16
            #[allow(clippy::cast_possible_truncation)]
            let sample_i16 = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer
                .write_sample(sample_i16)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}
