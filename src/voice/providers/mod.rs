//! Speech synthesis backends

mod elevenlabs;
mod espeak;
mod google;

pub use elevenlabs::ElevenLabsBackend;
pub use espeak::EspeakBackend;
pub use google::{GoogleTranslateBackend, split_chunks};
