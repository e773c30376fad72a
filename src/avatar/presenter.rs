//! Avatar presentation state machine
//!
//! Animated: `Idle -> Requesting -> Polling -> Talking -> Idle`, degrading to
//! `StaticFallback` on any talking-head failure. Static and video:
//! `Idle -> Showing -> Idle`.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;

use super::display::ImageDisplay;
use super::neutral::NeutralPoseSource;
use super::player::MediaPlayer;
use super::talking_head::{TalkRequest, TalkingHeadService};
use super::video::LoopingVideo;
use super::{AvatarMode, AvatarState, Gender, PresentationType};

/// Delay between job status checks
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Status checks before giving up on a job
pub const MAX_POLLS: u32 = 10;

/// What is currently on screen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Visual {
    Nothing,
    Neutral,
    Animation,
    Video,
}

#[derive(Debug)]
struct Session {
    gender: Gender,
    presentation: PresentationType,
    state: AvatarState,
    job_id: Option<String>,
    visual: Visual,
}

/// Running talking animation
///
/// The animation returns the avatar to neutral by itself when playback
/// ends. Holding the handle only allows waiting for or superseding it.
#[derive(Debug)]
pub struct AnimationHandle {
    task: JoinHandle<()>,
}

impl AnimationHandle {
    /// Whether playback and the neutral step have finished
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for playback and the neutral step to finish
    pub async fn wait(self) {
        if let Err(e) = self.task.await {
            tracing::debug!(error = %e, "animation task ended abnormally");
        }
    }

    /// Stop playback early and wait for the task to unwind
    ///
    /// The automatic neutral step does not run; the caller owns it.
    pub async fn cancel(self) {
        self.task.abort();
        let _ = self.task.await;
    }
}

/// Outcome of presenting one answer
#[derive(Debug, Default)]
pub struct Presentation {
    /// How the answer was actually shown
    pub mode: AvatarMode,
    /// Rendered animation, if one played
    pub avatar_url: Option<String>,
    /// Static image shown, if any
    pub avatar_path: Option<PathBuf>,
    /// Running animation, if one started
    pub animation: Option<AnimationHandle>,
}

/// Collaborators of an `AvatarPresenter`
pub struct PresenterParts {
    /// Talking-head service, if configured
    pub talking_head: Option<Arc<dyn TalkingHeadService>>,
    /// Voice id forwarded to the talking-head speech provider
    pub voice_id: Option<String>,
    /// Neutral image source
    pub neutral: Arc<dyn NeutralPoseSource>,
    /// Image display
    pub display: Arc<dyn ImageDisplay>,
    /// Animation player
    pub player: Arc<dyn MediaPlayer>,
    /// Looping video, if a backend is available
    pub video: Option<Arc<LoopingVideo>>,
}

struct Inner {
    parts: PresenterParts,
    is_talking: AtomicBool,
    session: Mutex<Session>,
}

/// Drives the avatar between talking and neutral
#[derive(Clone)]
pub struct AvatarPresenter {
    inner: Arc<Inner>,
}

impl AvatarPresenter {
    /// Create an idle presenter
    #[must_use]
    pub fn new(parts: PresenterParts, gender: Gender, presentation: PresentationType) -> Self {
        Self {
            inner: Arc::new(Inner {
                parts,
                is_talking: AtomicBool::new(false),
                session: Mutex::new(Session {
                    gender,
                    presentation,
                    state: AvatarState::Idle,
                    job_id: None,
                    visual: Visual::Nothing,
                }),
            }),
        }
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> AvatarState {
        self.inner.session().state
    }

    /// Id of the talking-head job of the current turn
    #[must_use]
    pub fn job_id(&self) -> Option<String> {
        self.inner.session().job_id.clone()
    }

    /// Whether the avatar is presenting an answer, from the start of a turn
    /// until its neutral step
    #[must_use]
    pub fn is_talking(&self) -> bool {
        self.inner.is_talking.load(Ordering::Acquire)
    }

    /// Avatar gender
    #[must_use]
    pub fn gender(&self) -> Gender {
        self.inner.session().gender
    }

    /// Change the avatar gender
    pub fn set_gender(&self, gender: Gender) {
        let mut session = self.inner.session();
        if session.gender != gender {
            session.gender = gender;
            // The neutral image on screen shows the old gender
            if session.visual == Visual::Neutral {
                session.visual = Visual::Nothing;
            }
        }
        tracing::info!(%gender, "avatar gender set");
    }

    /// Avatar framing
    #[must_use]
    pub fn presentation(&self) -> PresentationType {
        self.inner.session().presentation
    }

    /// Change the avatar framing
    pub fn set_presentation(&self, presentation: PresentationType) {
        self.inner.session().presentation = presentation;
        tracing::info!(%presentation, "avatar type set");
    }

    /// Whether a talking-head service is configured
    #[must_use]
    pub fn has_talking_head(&self) -> bool {
        self.inner.parts.talking_head.is_some()
    }

    /// Select the looping video; false if the file is missing or video is unsupported
    pub fn set_video_path(&self, path: &Path) -> bool {
        match &self.inner.parts.video {
            Some(video) => video.set_path(path),
            None => {
                tracing::warn!("video playback unavailable (ffmpeg, ffprobe and ffplay required)");
                false
            }
        }
    }

    /// Selected looping video
    #[must_use]
    pub fn video_path(&self) -> Option<PathBuf> {
        self.inner.parts.video.as_ref().and_then(|v| v.path())
    }

    /// Present `text` in `mode`, degrading to a static image on failure
    pub async fn present(&self, text: &str, mode: AvatarMode) -> Presentation {
        match mode {
            AvatarMode::Animated => self.present_animated(text).await,
            AvatarMode::Video => self.present_video().await,
            AvatarMode::Static => self.inner.show_static(AvatarState::Showing).await,
            AvatarMode::None => Presentation {
                mode: AvatarMode::None,
                ..Presentation::default()
            },
        }
    }

    /// Return to the neutral pose
    ///
    /// Returns false when already neutral, in which case nothing happens.
    pub async fn return_to_neutral(&self) -> bool {
        self.inner.return_to_neutral().await
    }

    /// Stop any video and close the image display
    pub async fn close(&self) {
        self.inner.stop_video().await;
        self.inner.parts.display.close();
        self.inner.is_talking.store(false, Ordering::Release);
        let mut session = self.inner.session();
        session.state = AvatarState::Idle;
        session.job_id = None;
        session.visual = Visual::Nothing;
    }

    async fn present_animated(&self, text: &str) -> Presentation {
        let Some(service) = self.inner.parts.talking_head.clone() else {
            tracing::debug!("no talking-head service, showing static avatar");
            return self.inner.show_static(AvatarState::Showing).await;
        };

        self.inner.is_talking.store(true, Ordering::Release);

        let request = {
            let mut session = self.inner.session();
            session.state = AvatarState::Requesting;
            session.job_id = None;
            TalkRequest {
                text: text.to_string(),
                voice_id: self.inner.parts.voice_id.clone(),
                gender: session.gender,
                presentation: session.presentation,
            }
        };

        let job_id = match service.create_talk(&request).await {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!(error = %e, "talking-head request failed, using static avatar");
                return self.inner.show_static(AvatarState::StaticFallback).await;
            }
        };

        {
            let mut session = self.inner.session();
            session.state = AvatarState::Polling;
            session.job_id = Some(job_id.clone());
        }

        for attempt in 1..=MAX_POLLS {
            match service.talk_status(&job_id).await {
                Ok(status) if status.is_ready() => {
                    if let Some(url) = status.result_url {
                        tracing::info!(%job_id, attempt, "avatar animation ready");
                        return self.start_talking(url);
                    }
                    tracing::warn!(%job_id, "job ready without result url");
                    return self.inner.show_static(AvatarState::StaticFallback).await;
                }
                Ok(status) if status.is_failed() => {
                    tracing::warn!(%job_id, status = %status.status, "talking-head job failed");
                    return self.inner.show_static(AvatarState::StaticFallback).await;
                }
                Ok(status) => {
                    tracing::debug!(%job_id, attempt, status = %status.status, "animation not ready");
                }
                Err(e) => {
                    tracing::warn!(%job_id, error = %e, "talking-head status check failed");
                    return self.inner.show_static(AvatarState::StaticFallback).await;
                }
            }

            if attempt < MAX_POLLS {
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        }

        tracing::warn!(%job_id, attempts = MAX_POLLS, "animation not ready, using static avatar");
        self.inner.show_static(AvatarState::StaticFallback).await
    }

    fn start_talking(&self, url: String) -> Presentation {
        {
            let mut session = self.inner.session();
            session.state = AvatarState::Talking;
            session.visual = Visual::Animation;
        }

        let inner = Arc::clone(&self.inner);
        let playback_url = url.clone();
        let task = tokio::spawn(async move {
            if let Err(e) = inner.parts.player.play(&playback_url).await {
                tracing::warn!(error = %e, "animation playback failed");
            }
            inner.return_to_neutral().await;
        });

        Presentation {
            mode: AvatarMode::Animated,
            avatar_url: Some(url),
            avatar_path: None,
            animation: Some(AnimationHandle { task }),
        }
    }

    async fn present_video(&self) -> Presentation {
        let Some(video) = self.inner.parts.video.clone() else {
            tracing::debug!("video playback unavailable, showing static avatar");
            return self.inner.show_static(AvatarState::Showing).await;
        };

        let started = tokio::task::spawn_blocking(move || video.start()).await;
        match started {
            Ok(Ok(())) => {
                self.inner.is_talking.store(true, Ordering::Release);
                let mut session = self.inner.session();
                session.state = AvatarState::Showing;
                session.visual = Visual::Video;
                Presentation {
                    mode: AvatarMode::Video,
                    ..Presentation::default()
                }
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "video unavailable, showing static avatar");
                self.inner.show_static(AvatarState::Showing).await
            }
            Err(e) => {
                tracing::warn!(error = %e, "video start task failed");
                self.inner.show_static(AvatarState::Showing).await
            }
        }
    }
}

impl Inner {
    fn session(&self) -> std::sync::MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Show the neutral image, entering `state`
    async fn show_static(&self, state: AvatarState) -> Presentation {
        self.is_talking.store(true, Ordering::Release);
        let gender = {
            let mut session = self.session();
            session.state = state;
            session.gender
        };

        let avatar_path = self.show_neutral(gender).await;
        Presentation {
            mode: AvatarMode::Static,
            avatar_path,
            ..Presentation::default()
        }
    }

    async fn show_neutral(&self, gender: Gender) -> Option<PathBuf> {
        let image = match self.parts.neutral.neutral_image(gender).await {
            Ok(image) => image,
            Err(e) => {
                tracing::warn!(error = %e, "neutral image unavailable");
                return None;
            }
        };

        match self.parts.display.show(image) {
            Ok(path) => {
                self.session().visual = Visual::Neutral;
                Some(path)
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to display avatar image");
                None
            }
        }
    }

    async fn stop_video(&self) -> bool {
        let Some(video) = self.parts.video.clone() else {
            return false;
        };
        tokio::task::spawn_blocking(move || video.stop())
            .await
            .unwrap_or(false)
    }

    async fn return_to_neutral(&self) -> bool {
        let was_talking = self.is_talking.swap(false, Ordering::AcqRel);
        let stopped_video = self.stop_video().await;

        let (left_state, needs_image, gender) = {
            let mut session = self.session();
            let left_state = session.state != AvatarState::Idle;
            session.state = AvatarState::Idle;
            session.job_id = None;
            let needs_image = (was_talking || stopped_video) && session.visual != Visual::Neutral;
            if needs_image {
                session.visual = Visual::Nothing;
            }
            (left_state, needs_image, session.gender)
        };

        if !(was_talking || stopped_video || left_state) {
            tracing::trace!("avatar already neutral");
            return false;
        }

        if needs_image {
            self.show_neutral(gender).await;
        }

        tracing::debug!("avatar returned to neutral pose");
        true
    }
}
