//! Avatar presentation
//!
//! The presenter drives a talking/neutral visual alongside speech, using an
//! animated talking head, a looping local video or a static neutral image.

mod display;
mod neutral;
mod player;
mod presenter;
mod talking_head;
mod video;

use std::fmt;

use serde::Serialize;

pub use display::{ImageDisplay, ViewerDisplay};
pub use neutral::{AvatarImage, DiceBearSource, LocalImageSource, NeutralPoseSource};
pub use player::{CommandPlayer, FixedDurationPlayer, MediaPlayer};
pub use presenter::{
    AnimationHandle, AvatarPresenter, MAX_POLLS, POLL_INTERVAL, Presentation, PresenterParts,
};
pub use talking_head::{DEFAULT_VOICE_ID, DidClient, TalkRequest, TalkStatus, TalkingHeadService, source_url};
pub use video::{
    FfmpegBackend, FrameSink, FrameSource, JOIN_TIMEOUT, LoopingVideo, VideoBackend,
};

/// Avatar gender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    /// Male avatar
    Male,
    /// Female avatar
    #[default]
    Female,
}

impl Gender {
    /// Lowercase name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Male => "male",
            Self::Female => "female",
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Framing of the animated avatar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum PresentationType {
    /// Head-and-shoulders crop
    #[default]
    TalkingHead,
    /// Uncropped presenter
    Presenter,
}

impl PresentationType {
    /// Kebab-case name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TalkingHead => "talking-head",
            Self::Presenter => "presenter",
        }
    }
}

impl fmt::Display for PresentationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a turn's answer is visualized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AvatarMode {
    /// Generated talking-head animation
    #[default]
    Animated,
    /// Static neutral image
    Static,
    /// Looping local video
    Video,
    /// Nothing shown
    None,
}

impl fmt::Display for AvatarMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Animated => "animated",
            Self::Static => "static",
            Self::Video => "video",
            Self::None => "none",
        })
    }
}

/// Presenter state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvatarState {
    /// Neutral pose, nothing in flight
    Idle,
    /// Talking-head job being submitted
    Requesting,
    /// Waiting for the job to finish rendering
    Polling,
    /// Animation playing
    Talking,
    /// Static image or looping video on screen
    Showing,
    /// Animation failed this turn, static image shown instead
    StaticFallback,
}
