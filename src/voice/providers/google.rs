//! Google Translate speech, the multilingual fallback

use std::sync::Arc;

use async_trait::async_trait;

use crate::voice::playback::AudioSink;
use crate::voice::tts::SpeechBackend;
use crate::{Error, Result};

/// Longest text the endpoint accepts per request
const CHUNK_CHARS: usize = 100;

const DEFAULT_BASE_URL: &str = "https://translate.google.com";

/// Fetches MP3 speech from the Translate TTS endpoint and plays it
pub struct GoogleTranslateBackend {
    client: reqwest::Client,
    base_url: String,
    sink: Arc<dyn AudioSink>,
}

impl GoogleTranslateBackend {
    /// Create a backend playing through `sink`
    #[must_use]
    pub fn new(sink: Arc<dyn AudioSink>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            sink,
        }
    }

    /// Point the backend at a different host
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Fetch MP3 audio for `text` in `language`, one request per chunk
    ///
    /// # Errors
    ///
    /// Returns error if any chunk request fails
    pub async fn synthesize(&self, text: &str, language: &str) -> Result<Vec<u8>> {
        let mut audio = Vec::new();

        for chunk in split_chunks(text, CHUNK_CHARS) {
            let response = self
                .client
                .get(format!("{}/translate_tts", self.base_url))
                .query(&[
                    ("ie", "UTF-8"),
                    ("client", "tw-ob"),
                    ("tl", language),
                    ("q", chunk.as_str()),
                ])
                .header("User-Agent", "Mozilla/5.0")
                .send()
                .await?;

            if !response.status().is_success() {
                let status = response.status();
                return Err(Error::Tts(format!("Translate TTS error {status}")));
            }

            audio.extend_from_slice(&response.bytes().await?);
        }

        Ok(audio)
    }
}

#[async_trait]
impl SpeechBackend for GoogleTranslateBackend {
    fn name(&self) -> &'static str {
        "google-translate"
    }

    fn is_multilingual(&self) -> bool {
        true
    }

    async fn speak(&self, text: &str, language: &str) -> Result<()> {
        let audio = self.synthesize(text, language).await?;
        if audio.is_empty() {
            return Err(Error::Tts("Translate TTS returned no audio".to_string()));
        }

        let sink = Arc::clone(&self.sink);
        tokio::task::spawn_blocking(move || sink.play_mp3(&audio))
            .await
            .map_err(|e| Error::Audio(format!("playback task failed: {e}")))?
    }
}

/// Split text on whitespace into chunks of at most `max_chars` characters
///
/// Words longer than `max_chars` are split mid-word.
#[must_use]
pub fn split_chunks(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for word in text.split_whitespace() {
        let word_len = word.chars().count();

        if current_len > 0 && current_len + 1 + word_len > max_chars {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }

        if word_len > max_chars {
            let chars: Vec<char> = word.chars().collect();
            for piece in chars.chunks(max_chars) {
                chunks.push(piece.iter().collect());
            }
            continue;
        }

        if current_len > 0 {
            current.push(' ');
            current_len += 1;
        }
        current.push_str(word);
        current_len += word_len;
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}
