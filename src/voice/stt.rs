//! Speech-to-text (STT) processing

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::config::{SttConfig, SttProvider};

/// Why a recognition attempt produced no text
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecognitionError {
    /// Audio reached the service but no words were recognized
    #[error("could not understand audio")]
    Unintelligible,

    /// The recognition service itself failed
    #[error("recognition service error: {0}")]
    Service(String),
}

/// Turns captured WAV audio into text
#[async_trait]
pub trait Recognizer: Send + Sync {
    /// Recognize one utterance
    ///
    /// # Errors
    ///
    /// Returns `RecognitionError::Unintelligible` when the transcript is
    /// empty, or `RecognitionError::Service` on transport or API failure
    async fn recognize(&self, wav: &[u8]) -> Result<String, RecognitionError>;
}

/// Response from OpenAI Whisper transcription API
#[derive(serde::Deserialize)]
struct WhisperResponse {
    text: String,
}

/// Response from Deepgram transcription API
#[derive(serde::Deserialize)]
struct DeepgramResponse {
    results: DeepgramResults,
}

#[derive(serde::Deserialize)]
struct DeepgramResults {
    channels: Vec<DeepgramChannel>,
}

#[derive(serde::Deserialize)]
struct DeepgramChannel {
    alternatives: Vec<DeepgramAlternative>,
}

#[derive(serde::Deserialize)]
struct DeepgramAlternative {
    transcript: String,
}

/// Transcribes speech through Whisper or Deepgram
pub struct SpeechToText {
    client: reqwest::Client,
    api_key: SecretString,
    model: String,
    provider: SttProvider,
    base_url: String,
}

impl SpeechToText {
    /// Create a recognizer from configuration
    #[must_use]
    pub fn new(config: SttConfig) -> Self {
        let base_url = match config.provider {
            SttProvider::Whisper => "https://api.openai.com/v1",
            SttProvider::Deepgram => "https://api.deepgram.com/v1",
        };

        Self {
            client: reqwest::Client::new(),
            api_key: config.api_key,
            model: config.model,
            provider: config.provider,
            base_url: base_url.to_string(),
        }
    }

    /// Point the recognizer at a different API host
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Transcribe using OpenAI Whisper
    async fn transcribe_whisper(&self, audio: &[u8]) -> Result<String, RecognitionError> {
        tracing::debug!(audio_bytes = audio.len(), "starting Whisper transcription");

        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(audio.to_vec())
                    .file_name("audio.wav")
                    .mime_str("audio/wav")
                    .map_err(|e| RecognitionError::Service(e.to_string()))?,
            )
            .text("model", self.model.clone());

        let response = self
            .client
            .post(format!("{}/audio/transcriptions", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Whisper request failed");
                RecognitionError::Service(e.to_string())
            })?;

        let status = response.status();
        tracing::debug!(status = %status, "received response");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Whisper API error");
            return Err(RecognitionError::Service(format!(
                "Whisper API error {status}: {body}"
            )));
        }

        let result: WhisperResponse = response.json().await.map_err(|e| {
            tracing::error!(error = %e, "failed to parse response");
            RecognitionError::Service(e.to_string())
        })?;

        Ok(result.text)
    }

    /// Transcribe using Deepgram
    async fn transcribe_deepgram(&self, audio: &[u8]) -> Result<String, RecognitionError> {
        tracing::debug!(audio_bytes = audio.len(), "starting Deepgram transcription");

        let url = format!(
            "{}/listen?model={}&punctuate=true",
            self.base_url, self.model
        );

        let response = self
            .client
            .post(&url)
            .header(
                "Authorization",
                format!("Token {}", self.api_key.expose_secret()),
            )
            .header("Content-Type", "audio/wav")
            .body(audio.to_vec())
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Deepgram request failed");
                RecognitionError::Service(e.to_string())
            })?;

        let status = response.status();
        tracing::debug!(status = %status, "received response");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Deepgram API error");
            return Err(RecognitionError::Service(format!(
                "Deepgram API error {status}: {body}"
            )));
        }

        let result: DeepgramResponse = response.json().await.map_err(|e| {
            tracing::error!(error = %e, "failed to parse Deepgram response");
            RecognitionError::Service(e.to_string())
        })?;

        Ok(result
            .results
            .channels
            .into_iter()
            .next()
            .and_then(|c| c.alternatives.into_iter().next())
            .map(|a| a.transcript)
            .unwrap_or_default())
    }
}

#[async_trait]
impl Recognizer for SpeechToText {
    async fn recognize(&self, wav: &[u8]) -> Result<String, RecognitionError> {
        let transcript = match self.provider {
            SttProvider::Whisper => self.transcribe_whisper(wav).await?,
            SttProvider::Deepgram => self.transcribe_deepgram(wav).await?,
        };

        let transcript = transcript.trim();
        if transcript.is_empty() {
            return Err(RecognitionError::Unintelligible);
        }

        tracing::info!(transcript = %transcript, "transcription complete");
        Ok(transcript.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recognizer(provider: SttProvider, base_url: &str) -> SpeechToText {
        SpeechToText::new(SttConfig {
            provider,
            api_key: SecretString::from("key".to_string()),
            model: "whisper-1".to_string(),
        })
        .with_base_url(base_url)
    }

    #[tokio::test]
    async fn test_whisper_transcript() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/audio/transcriptions")
            .match_header("authorization", "Bearer key")
            .with_status(200)
            .with_body(r#"{"text":" What is GST? "}"#)
            .create_async()
            .await;

        let text = recognizer(SttProvider::Whisper, &server.url())
            .recognize(b"RIFF")
            .await
            .unwrap();
        assert_eq!(text, "What is GST?");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_empty_transcript_is_unintelligible() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/audio/transcriptions")
            .with_status(200)
            .with_body(r#"{"text":""}"#)
            .create_async()
            .await;

        let err = recognizer(SttProvider::Whisper, &server.url())
            .recognize(b"RIFF")
            .await
            .unwrap_err();
        assert_eq!(err, RecognitionError::Unintelligible);
    }

    #[tokio::test]
    async fn test_api_error_is_service_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", mockito::Matcher::Regex("^/listen".to_string()))
            .with_status(503)
            .create_async()
            .await;

        let err = recognizer(SttProvider::Deepgram, &server.url())
            .recognize(b"RIFF")
            .await
            .unwrap_err();
        assert!(matches!(err, RecognitionError::Service(msg) if msg.contains("503")));
    }
}
