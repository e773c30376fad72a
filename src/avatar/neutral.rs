//! Neutral-pose images

use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tempfile::NamedTempFile;

use super::Gender;
use crate::{Error, Result};

const DICEBEAR_URL: &str = "https://api.dicebear.com";

/// An avatar image on disk
///
/// Temporary images are deleted when this value is dropped.
#[derive(Debug)]
pub enum AvatarImage {
    /// Generated image in a temporary file
    Temp(NamedTempFile),
    /// Image supplied by the user
    Local(PathBuf),
}

impl AvatarImage {
    /// Path of the image
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Temp(file) => file.path(),
            Self::Local(path) => path,
        }
    }
}

/// Produces the avatar's idle image
#[async_trait]
pub trait NeutralPoseSource: Send + Sync {
    /// Create or locate the neutral image for `gender`
    ///
    /// # Errors
    ///
    /// Returns error if the image cannot be produced
    async fn neutral_image(&self, gender: Gender) -> Result<AvatarImage>;
}

/// Generated avatars from the `DiceBear` API
pub struct DiceBearSource {
    client: reqwest::Client,
    base_url: String,
}

impl Default for DiceBearSource {
    fn default() -> Self {
        Self::new()
    }
}

impl DiceBearSource {
    /// Create a source using the public API
    #[must_use]
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: DICEBEAR_URL.to_string(),
        }
    }

    /// Point the source at a different host
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Art style used for a gender
    #[must_use]
    pub const fn style(gender: Gender) -> &'static str {
        match gender {
            Gender::Male => "bottts",
            Gender::Female => "lorelei",
        }
    }
}

#[async_trait]
impl NeutralPoseSource for DiceBearSource {
    async fn neutral_image(&self, gender: Gender) -> Result<AvatarImage> {
        let seed = format!("idms-avatar-{gender}");
        let response = self
            .client
            .get(format!("{}/7.x/{}/png", self.base_url, Self::style(gender)))
            .query(&[("seed", seed.as_str()), ("mood", "neutral")])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(Error::Avatar(format!("neutral image request failed {status}")));
        }

        let bytes = response.bytes().await?;
        let mut file = tempfile::Builder::new()
            .prefix("idms-avatar-")
            .suffix(".png")
            .tempfile()?;
        file.write_all(&bytes)?;
        file.flush()?;

        tracing::debug!(path = %file.path().display(), bytes = bytes.len(), "neutral image generated");
        Ok(AvatarImage::Temp(file))
    }
}

/// A fixed image from disk, used for either gender
#[derive(Debug, Clone)]
pub struct LocalImageSource {
    path: PathBuf,
}

impl LocalImageSource {
    /// Use the image at `path`
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl NeutralPoseSource for LocalImageSource {
    async fn neutral_image(&self, _gender: Gender) -> Result<AvatarImage> {
        if !self.path.exists() {
            return Err(Error::Avatar(format!(
                "avatar image not found: {}",
                self.path.display()
            )));
        }
        Ok(AvatarImage::Local(self.path.clone()))
    }
}
