//! Image display lifecycle
//!
//! One viewer window at a time: showing a new image replaces the previous
//! viewer, and closing the display kills it and deletes any temporary image.

use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::{Mutex, PoisonError};

use super::neutral::AvatarImage;
use crate::{Error, Result};

/// Viewers tried in order when none is configured
const VIEWERS: &[&str] = &["feh", "eog", "display"];

/// Shows avatar images
pub trait ImageDisplay: Send + Sync {
    /// Show `image`, replacing whatever was shown before
    ///
    /// The display takes ownership of the image and keeps it alive until it
    /// is replaced or the display is closed. Returns the image path.
    ///
    /// # Errors
    ///
    /// Returns error if the viewer cannot be started
    fn show(&self, image: AvatarImage) -> Result<PathBuf>;

    /// Close the viewer and release the current image
    fn close(&self);
}

struct Shown {
    viewer: Option<Child>,
    _image: AvatarImage,
}

/// Displays images with an external viewer program
pub struct ViewerDisplay {
    viewer: Option<PathBuf>,
    current: Mutex<Option<Shown>>,
}

impl ViewerDisplay {
    /// Use `viewer`, or log image paths only when `None`
    #[must_use]
    pub fn new(viewer: Option<PathBuf>) -> Self {
        Self {
            viewer,
            current: Mutex::new(None),
        }
    }

    /// Resolve a configured viewer or find a known one on `PATH`
    #[must_use]
    pub fn detect(configured: Option<&str>) -> Self {
        let viewer = match configured {
            Some(name) => Some(which::which(name).unwrap_or_else(|_| PathBuf::from(name))),
            None => VIEWERS.iter().find_map(|name| which::which(name).ok()),
        };

        match &viewer {
            Some(path) => tracing::debug!(viewer = %path.display(), "image viewer selected"),
            None => tracing::info!("no image viewer found, avatar images will be logged only"),
        }

        Self::new(viewer)
    }

    /// Whether a viewer program is configured
    #[must_use]
    pub const fn has_viewer(&self) -> bool {
        self.viewer.is_some()
    }
}

impl ImageDisplay for ViewerDisplay {
    fn show(&self, image: AvatarImage) -> Result<PathBuf> {
        let path = image.path().to_path_buf();
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(previous) = current.take() {
            close_shown(previous);
        }

        let viewer = match &self.viewer {
            Some(program) => Some(
                Command::new(program)
                    .arg(&path)
                    .stdin(Stdio::null())
                    .stdout(Stdio::null())
                    .stderr(Stdio::null())
                    .spawn()
                    .map_err(|e| {
                        Error::Display(format!("failed to start {}: {e}", program.display()))
                    })?,
            ),
            None => {
                tracing::info!(path = %path.display(), "avatar image ready");
                None
            }
        };

        *current = Some(Shown {
            viewer,
            _image: image,
        });
        Ok(path)
    }

    fn close(&self) {
        let shown = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(shown) = shown {
            close_shown(shown);
            tracing::debug!("image display closed");
        }
    }
}

impl Drop for ViewerDisplay {
    fn drop(&mut self) {
        self.close();
    }
}

fn close_shown(mut shown: Shown) {
    if let Some(mut child) = shown.viewer.take() {
        if let Err(e) = child.kill() {
            tracing::debug!(error = %e, "viewer already exited");
        }
        let _ = child.wait();
    }
}
