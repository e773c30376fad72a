//! Energy-based utterance endpointing
//!
//! Splits a live sample stream into one spoken phrase: waits for energy
//! above the calibrated threshold, accumulates, and completes after a run of
//! silence.

use super::capture::SAMPLE_RATE;

/// Energy threshold used when no calibration is available
pub const DEFAULT_ENERGY_THRESHOLD: f32 = 0.03;

/// Lowest threshold a calibration may produce
const MIN_ENERGY_THRESHOLD: f32 = 0.01;

/// Ratio of speech energy to ambient energy
const DYNAMIC_RATIO: f32 = 1.5;

/// Minimum duration of speech to count as a phrase (in samples at 16kHz)
const MIN_SPEECH_SAMPLES: usize = SAMPLE_RATE as usize * 3 / 10;

/// Silence duration that ends a phrase (in samples)
const SILENCE_SAMPLES: usize = SAMPLE_RATE as usize / 2;

/// State of the segmenter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentState {
    /// Waiting for speech
    Waiting,
    /// Speech detected, accumulating
    Speaking,
    /// Phrase ended with silence
    Complete,
}

/// Detects the start and end of one spoken phrase
pub struct UtteranceSegmenter {
    threshold: f32,
    state: SegmentState,
    speech_buffer: Vec<f32>,
    silence_counter: usize,
}

impl Default for UtteranceSegmenter {
    fn default() -> Self {
        Self::new(DEFAULT_ENERGY_THRESHOLD)
    }
}

impl UtteranceSegmenter {
    /// Create a segmenter with a fixed energy threshold
    #[must_use]
    pub const fn new(threshold: f32) -> Self {
        Self {
            threshold,
            state: SegmentState::Waiting,
            speech_buffer: Vec::new(),
            silence_counter: 0,
        }
    }

    /// Create a segmenter whose threshold sits above the measured ambient energy
    #[must_use]
    pub fn calibrated(ambient_energy: f32) -> Self {
        Self::new((ambient_energy * DYNAMIC_RATIO).max(MIN_ENERGY_THRESHOLD))
    }

    /// Feed samples; returns true once the phrase is complete
    pub fn process(&mut self, samples: &[f32]) -> bool {
        if samples.is_empty() {
            return self.state == SegmentState::Complete;
        }

        let energy = calculate_energy(samples);
        let is_speech = energy > self.threshold;

        match self.state {
            SegmentState::Waiting => {
                if is_speech {
                    self.state = SegmentState::Speaking;
                    self.speech_buffer.clear();
                    self.speech_buffer.extend_from_slice(samples);
                    self.silence_counter = 0;
                    tracing::trace!(energy, "speech started");
                }
            }
            SegmentState::Speaking => {
                self.speech_buffer.extend_from_slice(samples);

                if is_speech {
                    self.silence_counter = 0;
                } else {
                    self.silence_counter += samples.len();
                }

                let voiced = self.speech_buffer.len() - self.silence_counter;
                if self.silence_counter > SILENCE_SAMPLES && voiced > MIN_SPEECH_SAMPLES {
                    tracing::debug!(samples = self.speech_buffer.len(), "phrase complete");
                    self.state = SegmentState::Complete;
                    return true;
                }

                // A blip followed by long silence is noise, not a phrase
                if self.silence_counter > SILENCE_SAMPLES * 2 {
                    tracing::trace!("discarding short noise burst");
                    self.reset();
                }
            }
            SegmentState::Complete => return true,
        }

        false
    }

    /// Accumulated phrase samples
    #[must_use]
    pub fn speech_buffer(&self) -> &[f32] {
        &self.speech_buffer
    }

    /// Take the phrase samples and reset
    pub fn take_speech_buffer(&mut self) -> Vec<f32> {
        let samples = std::mem::take(&mut self.speech_buffer);
        self.reset();
        samples
    }

    /// Whether a phrase has started and not yet completed
    #[must_use]
    pub fn is_speaking(&self) -> bool {
        self.state == SegmentState::Speaking
    }

    /// Current state
    #[must_use]
    pub const fn state(&self) -> SegmentState {
        self.state
    }

    /// Active energy threshold
    #[must_use]
    pub const fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Reset to waiting
    pub fn reset(&mut self) {
        self.state = SegmentState::Waiting;
        self.speech_buffer.clear();
        self.silence_counter = 0;
    }
}

/// Calculate RMS energy of audio samples
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn calculate_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_energy_calculation() {
        let silence = vec![0.0f32; 100];
        assert!(calculate_energy(&silence) < 0.001);

        let loud = vec![0.5f32; 100];
        assert!(calculate_energy(&loud) > 0.4);
    }

    #[test]
    fn test_calibration_has_floor() {
        assert!((UtteranceSegmenter::calibrated(0.0).threshold() - MIN_ENERGY_THRESHOLD).abs() < f32::EPSILON);
        assert!((UtteranceSegmenter::calibrated(0.1).threshold() - 0.15).abs() < 1e-6);
    }
}
