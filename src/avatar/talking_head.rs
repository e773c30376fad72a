//! Remote talking-head generation (D-ID `/talks`)

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::{Gender, PresentationType};
use crate::config::TalkingHeadConfig;
use crate::{Error, Result};

/// Voice used when no premium voice id is configured
pub const DEFAULT_VOICE_ID: &str = "21m00Tcm4TlvDq8ikWAM";

/// A request to animate an avatar speaking `text`
#[derive(Debug, Clone)]
pub struct TalkRequest {
    /// Script text
    pub text: String,
    /// Voice id passed to the speech provider
    pub voice_id: Option<String>,
    /// Avatar gender
    pub gender: Gender,
    /// Avatar framing
    pub presentation: PresentationType,
}

/// Status of a submitted job
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TalkStatus {
    /// Service status string
    pub status: String,
    /// Rendered media, once ready
    #[serde(default)]
    pub result_url: Option<String>,
}

impl TalkStatus {
    /// Whether the animation finished rendering
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self.status.as_str(), "ready" | "done")
    }

    /// Whether the job will never become ready
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self.status.as_str(), "error" | "rejected")
    }
}

/// Remote service that renders talking-head animations
#[async_trait]
pub trait TalkingHeadService: Send + Sync {
    /// Submit a job, returning its id
    ///
    /// # Errors
    ///
    /// Returns error on transport or API failure
    async fn create_talk(&self, request: &TalkRequest) -> Result<String>;

    /// Fetch the current status of a job
    ///
    /// # Errors
    ///
    /// Returns error on transport or API failure
    async fn talk_status(&self, id: &str) -> Result<TalkStatus>;
}

/// Stock D-ID source image for a gender and framing
#[must_use]
pub const fn source_url(gender: Gender, presentation: PresentationType) -> &'static str {
    match (presentation, gender) {
        (PresentationType::Presenter, Gender::Female) => {
            "https://create-images-results.d-id.com/DefaultPresenters/Noelle_f/image.jpeg"
        }
        (PresentationType::Presenter, Gender::Male) => {
            "https://create-images-results.d-id.com/DefaultPresenters/William_m/image.jpeg"
        }
        (PresentationType::TalkingHead, Gender::Female) => {
            "https://create-images-results.d-id.com/DefaultTalkingHeads/anna/image.jpeg"
        }
        (PresentationType::TalkingHead, Gender::Male) => {
            "https://create-images-results.d-id.com/DefaultTalkingHeads/james/image.jpeg"
        }
    }
}

#[derive(Serialize)]
struct CreateTalkBody<'a> {
    script: Script<'a>,
    source_url: &'static str,
    config: TalkConfig,
}

#[derive(Serialize)]
struct Script<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    input: &'a str,
    provider: Provider<'a>,
}

#[derive(Serialize)]
struct Provider<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    voice_id: &'a str,
}

#[derive(Serialize)]
struct TalkConfig {
    stitch: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    presenter_config: Option<PresenterConfig>,
}

#[derive(Serialize)]
struct PresenterConfig {
    crop: Crop,
}

#[derive(Serialize)]
struct Crop {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct CreateTalkResponse {
    id: String,
}

/// D-ID API client
pub struct DidClient {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
}

impl DidClient {
    /// Create a client from configuration
    #[must_use]
    pub fn new(config: TalkingHeadConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: config.api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        }
    }

    fn authorization(&self) -> String {
        format!("Basic {}", self.api_key.expose_secret())
    }
}

#[async_trait]
impl TalkingHeadService for DidClient {
    async fn create_talk(&self, request: &TalkRequest) -> Result<String> {
        let presenter_config = (request.presentation == PresentationType::Presenter)
            .then_some(PresenterConfig {
                crop: Crop { kind: "none" },
            });

        let body = CreateTalkBody {
            script: Script {
                kind: "text",
                input: &request.text,
                provider: Provider {
                    kind: "elevenlabs",
                    voice_id: request.voice_id.as_deref().unwrap_or(DEFAULT_VOICE_ID),
                },
            },
            source_url: source_url(request.gender, request.presentation),
            config: TalkConfig {
                stitch: true,
                presenter_config,
            },
        };

        tracing::debug!(
            gender = %request.gender,
            presentation = %request.presentation,
            source = body.source_url,
            "requesting talking-head animation"
        );

        let response = self
            .client
            .post(format!("{}/talks", self.base_url))
            .header("Authorization", self.authorization())
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Avatar(format!("talk creation failed {status}: {body}")));
        }

        let created: CreateTalkResponse = response
            .json()
            .await
            .map_err(|e| Error::Avatar(format!("invalid talk response: {e}")))?;

        tracing::info!(job_id = %created.id, "talking-head job created");
        Ok(created.id)
    }

    async fn talk_status(&self, id: &str) -> Result<TalkStatus> {
        let response = self
            .client
            .get(format!("{}/talks/{id}", self.base_url))
            .header("Authorization", self.authorization())
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(Error::Avatar(format!("talk status failed {status}")));
        }

        response
            .json()
            .await
            .map_err(|e| Error::Avatar(format!("invalid talk status: {e}")))
    }
}
