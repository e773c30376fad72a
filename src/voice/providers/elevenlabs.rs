//! `ElevenLabs` premium speech

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::config::ElevenLabsConfig;
use crate::voice::playback::AudioSink;
use crate::voice::tts::SpeechBackend;
use crate::{Error, Result};

const STABILITY: f32 = 0.5;
const SIMILARITY_BOOST: f32 = 0.75;

/// Streams MP3 speech from `ElevenLabs` and plays it
pub struct ElevenLabsBackend {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    voice_id: String,
    model_id: String,
    sink: Arc<dyn AudioSink>,
}

#[derive(Serialize)]
struct SpeechRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

#[derive(Serialize)]
struct VoiceSettings {
    stability: f32,
    similarity_boost: f32,
}

#[derive(Deserialize)]
struct VoicesResponse {
    #[serde(default)]
    voices: Vec<serde_json::Value>,
}

impl ElevenLabsBackend {
    /// Create a backend playing through `sink`
    #[must_use]
    pub fn new(config: ElevenLabsConfig, sink: Arc<dyn AudioSink>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: config.api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            voice_id: config.voice_id,
            model_id: config.model_id,
            sink,
        }
    }

    /// Voice used for synthesis
    #[must_use]
    pub fn voice_id(&self) -> &str {
        &self.voice_id
    }

    /// List voices to confirm the key works, returning how many are available
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the key is rejected
    pub async fn health_check(&self) -> Result<usize> {
        let response = self
            .client
            .get(format!("{}/voices", self.base_url))
            .header("xi-api-key", self.api_key.expose_secret())
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("ElevenLabs voices error {status}: {body}")));
        }

        let voices: VoicesResponse = response.json().await?;
        Ok(voices.voices.len())
    }

    /// Synthesize `text` to MP3 bytes
    ///
    /// # Errors
    ///
    /// Returns error if the API call fails
    pub async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        let request = SpeechRequest {
            text,
            model_id: &self.model_id,
            voice_settings: VoiceSettings {
                stability: STABILITY,
                similarity_boost: SIMILARITY_BOOST,
            },
        };

        let response = self
            .client
            .post(format!(
                "{}/text-to-speech/{}/stream",
                self.base_url, self.voice_id
            ))
            .header("xi-api-key", self.api_key.expose_secret())
            .header("Accept", "audio/mpeg")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("ElevenLabs TTS error {status}: {body}")));
        }

        let mut audio = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            audio.extend_from_slice(&chunk?);
        }
        Ok(audio)
    }
}

#[async_trait]
impl SpeechBackend for ElevenLabsBackend {
    fn name(&self) -> &'static str {
        "elevenlabs"
    }

    async fn speak(&self, text: &str, _language: &str) -> Result<()> {
        let audio = self.synthesize(text).await?;
        tracing::debug!(bytes = audio.len(), "ElevenLabs audio received");

        let sink = Arc::clone(&self.sink);
        tokio::task::spawn_blocking(move || sink.play_mp3(&audio))
            .await
            .map_err(|e| Error::Audio(format!("playback task failed: {e}")))?
    }
}
