//! Playback of rendered talking-head media

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::{Error, Result};

/// Plays a media URL to completion
#[async_trait]
pub trait MediaPlayer: Send + Sync {
    /// Play `url`, returning when playback ends
    ///
    /// Dropping the returned future stops playback.
    ///
    /// # Errors
    ///
    /// Returns error if the player cannot start or exits with failure
    async fn play(&self, url: &str) -> Result<()>;
}

/// Plays media with `ffplay` or `mpv`
#[derive(Debug, Clone)]
pub struct CommandPlayer {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandPlayer {
    /// Find a supported player on `PATH`
    #[must_use]
    pub fn detect() -> Option<Self> {
        if let Ok(program) = which::which("ffplay") {
            return Some(Self {
                program,
                args: ["-autoexit", "-loglevel", "error", "-window_title", "IDMS Assistant"]
                    .map(String::from)
                    .to_vec(),
            });
        }

        which::which("mpv").ok().map(|program| Self {
            program,
            args: vec!["--really-quiet".to_string()],
        })
    }
}

#[async_trait]
impl MediaPlayer for CommandPlayer {
    async fn play(&self, url: &str) -> Result<()> {
        tracing::debug!(player = %self.program.display(), url, "playing animation");

        let status = Command::new(&self.program)
            .args(&self.args)
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await
            .map_err(|e| Error::Avatar(format!("failed to start player: {e}")))?;

        if !status.success() {
            return Err(Error::Avatar(format!("player exited with {status}")));
        }
        Ok(())
    }
}

/// Stand-in player that holds the talking state for a fixed time
///
/// Used when no media player is installed.
#[derive(Debug, Clone, Copy)]
pub struct FixedDurationPlayer {
    duration: Duration,
}

impl FixedDurationPlayer {
    /// Hold each animation for `duration`
    #[must_use]
    pub const fn new(duration: Duration) -> Self {
        Self { duration }
    }
}

impl Default for FixedDurationPlayer {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[async_trait]
impl MediaPlayer for FixedDurationPlayer {
    async fn play(&self, url: &str) -> Result<()> {
        tracing::info!(url, seconds = self.duration.as_secs(), "avatar animation available");
        tokio::time::sleep(self.duration).await;
        Ok(())
    }
}
