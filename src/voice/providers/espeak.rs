//! Local espeak-ng engine

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::voice::tts::SpeechBackend;
use crate::{Error, Result};

/// Upper bound on one utterance, including playback
const ESPEAK_TIMEOUT: Duration = Duration::from_secs(60);

/// Words per minute
const SPEED: u32 = 150;

/// Speaks through a locally installed espeak-ng (or espeak) binary
#[derive(Debug, Clone)]
pub struct EspeakBackend {
    program: PathBuf,
}

impl EspeakBackend {
    /// Use a specific engine binary
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Find espeak-ng or espeak on `PATH`
    #[must_use]
    pub fn detect() -> Option<Self> {
        ["espeak-ng", "espeak"].iter().find_map(|name| {
            which::which(name).ok().map(|path| {
                tracing::debug!(path = %path.display(), "found local speech engine");
                Self::new(path)
            })
        })
    }

    /// Engine binary path
    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }
}

#[async_trait]
impl SpeechBackend for EspeakBackend {
    fn name(&self) -> &'static str {
        "espeak"
    }

    async fn speak(&self, text: &str, _language: &str) -> Result<()> {
        let mut child = Command::new(&self.program)
            .arg("-s")
            .arg(SPEED.to_string())
            .arg("--stdin")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Tts(format!("failed to spawn {}: {e}", self.program.display())))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Tts("failed to open engine stdin".to_string()))?;
        let text_owned = text.to_string();

        // Closing stdin after the write tells the engine the text is complete
        let write_task = tokio::spawn(async move {
            stdin.write_all(text_owned.as_bytes()).await?;
            stdin.shutdown().await
        });

        let output = tokio::time::timeout(ESPEAK_TIMEOUT, child.wait_with_output())
            .await
            .map_err(|_| {
                Error::Tts(format!(
                    "speech engine timed out after {} seconds",
                    ESPEAK_TIMEOUT.as_secs()
                ))
            })?
            .map_err(|e| Error::Tts(format!("failed to wait for speech engine: {e}")))?;

        match write_task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(Error::Tts(format!("failed to write to engine stdin: {e}"))),
            Err(e) => return Err(Error::Tts(format!("stdin task failed: {e}"))),
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Tts(format!("speech engine failed: {stderr}")));
        }

        Ok(())
    }
}
