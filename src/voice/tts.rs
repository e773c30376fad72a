//! Text-to-speech (TTS) fallback chain
//!
//! Backends are tried in the order they were added. The first success ends
//! the attempt; failures are logged and the next backend is tried.

use async_trait::async_trait;

use crate::Result;
use crate::config::LanguageTable;

/// Longest text handed to any backend, in characters
pub const MAX_SPEECH_CHARS: usize = 500;

const ELLIPSIS: &str = "...";

/// One way of turning text into audible speech
#[async_trait]
pub trait SpeechBackend: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &'static str;

    /// Whether the backend can speak languages other than the default
    fn is_multilingual(&self) -> bool {
        false
    }

    /// Speak `text`, returning once playback has finished
    ///
    /// `language` is already mapped through the language table.
    ///
    /// # Errors
    ///
    /// Returns error if synthesis or playback fails
    async fn speak(&self, text: &str, language: &str) -> Result<()>;
}

/// Ordered chain of speech backends
pub struct SpeechSynthesizer {
    backends: Vec<Box<dyn SpeechBackend>>,
    languages: LanguageTable,
}

impl SpeechSynthesizer {
    /// Create an empty chain
    #[must_use]
    pub fn new(languages: LanguageTable) -> Self {
        Self {
            backends: Vec::new(),
            languages,
        }
    }

    /// Append a backend to the chain
    pub fn add_backend(&mut self, backend: Box<dyn SpeechBackend>) {
        tracing::debug!(backend = backend.name(), "speech backend registered");
        self.backends.push(backend);
    }

    /// Names of the registered backends in priority order
    #[must_use]
    pub fn backend_names(&self) -> Vec<&'static str> {
        self.backends.iter().map(|b| b.name()).collect()
    }

    /// Whether no backend is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    /// Speak `text` through the first backend that succeeds
    ///
    /// Returns false if every backend failed or was skipped.
    pub async fn speak(&self, text: &str, language: Option<&str>) -> bool {
        if self.backends.is_empty() {
            tracing::warn!("no speech backend available");
            return false;
        }

        let text = truncate_for_speech(text);
        let default_code = self.languages.default_tts_code();
        let code = language.map_or(default_code, |l| self.languages.tts_code(l));
        let needs_multilingual = code != default_code;

        for backend in &self.backends {
            if needs_multilingual && !backend.is_multilingual() {
                tracing::debug!(
                    backend = backend.name(),
                    language = code,
                    "skipping monolingual backend"
                );
                continue;
            }

            match backend.speak(&text, code).await {
                Ok(()) => {
                    tracing::debug!(backend = backend.name(), language = code, "speech delivered");
                    return true;
                }
                Err(e) => {
                    tracing::warn!(
                        backend = backend.name(),
                        error = %e,
                        "speech backend failed, trying next"
                    );
                }
            }
        }

        tracing::error!(language = code, "all speech backends failed");
        false
    }
}

/// Cut text to `MAX_SPEECH_CHARS`, ending in `...` when shortened
#[must_use]
pub fn truncate_for_speech(text: &str) -> String {
    if text.chars().count() <= MAX_SPEECH_CHARS {
        return text.to_string();
    }

    let mut truncated: String = text
        .chars()
        .take(MAX_SPEECH_CHARS - ELLIPSIS.len())
        .collect();
    truncated.push_str(ELLIPSIS);
    truncated
}
