//! Voice processing module
//!
//! Handles microphone capture and endpointing, speech recognition, speaker
//! playback and the speech synthesis fallback chain.

mod capture;
pub mod playback;
pub mod providers;
mod segmenter;
mod stt;
pub mod tts;

pub use capture::{
    AudioCapture, CALIBRATION, CpalMicrophone, Microphone, PHRASE_LIMIT, SAMPLE_RATE,
    WAIT_TIMEOUT, samples_to_wav,
};
pub use playback::{
    AudioPlayback, AudioSink, DecodedAudio, PLAYBACK_SAMPLE_RATE, SpeakerSink, decode_mp3,
};
pub use segmenter::{
    DEFAULT_ENERGY_THRESHOLD, SegmentState, UtteranceSegmenter, calculate_energy,
};
pub use stt::{RecognitionError, Recognizer, SpeechToText};
pub use tts::{MAX_SPEECH_CHARS, SpeechBackend, SpeechSynthesizer, truncate_for_speech};
