//! Avatar presenter integration tests

mod common;

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use common::{ScriptedTalkingHead, avatar_rig, status};
use idms_assistant::avatar::{
    AvatarPresenter, FrameSink, FrameSource, ImageDisplay, LoopingVideo, MAX_POLLS,
    JOIN_TIMEOUT, MediaPlayer, NeutralPoseSource, POLL_INTERVAL, PresenterParts, VideoBackend,
};
use idms_assistant::{AvatarMode, AvatarState, Gender, PresentationType, Result};

#[tokio::test(start_paused = true)]
async fn test_unready_animation_falls_back_after_max_polls() {
    let service = ScriptedTalkingHead::never_ready();
    let rig = avatar_rig(Some(Arc::clone(&service)), Duration::from_secs(3));

    let started = tokio::time::Instant::now();
    let presentation = rig.presenter.present("What is GST?", AvatarMode::Animated).await;

    assert_eq!(service.polls.load(Ordering::SeqCst), MAX_POLLS as usize);
    assert!(started.elapsed() >= POLL_INTERVAL * (MAX_POLLS - 1));
    assert_eq!(rig.presenter.state(), AvatarState::StaticFallback);
    assert_eq!(presentation.mode, AvatarMode::Static);
    assert!(presentation.avatar_path.is_some());
    assert!(presentation.animation.is_none());
    assert!(rig.player.played.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_ready_animation_plays_then_returns_to_neutral() {
    let service = ScriptedTalkingHead::with_statuses(vec![
        status("created", None),
        status("started", None),
        status("done", Some("https://cdn.example/talk.mp4")),
    ]);
    let rig = avatar_rig(Some(Arc::clone(&service)), Duration::from_secs(3));

    let presentation = rig.presenter.present("What is GST?", AvatarMode::Animated).await;

    assert_eq!(service.polls.load(Ordering::SeqCst), 3);
    assert_eq!(presentation.mode, AvatarMode::Animated);
    assert_eq!(
        presentation.avatar_url.as_deref(),
        Some("https://cdn.example/talk.mp4")
    );
    assert_eq!(rig.presenter.state(), AvatarState::Talking);
    assert!(rig.presenter.is_talking());
    assert_eq!(rig.presenter.job_id().as_deref(), Some("tlk_test"));

    presentation.animation.expect("animation handle").wait().await;

    assert_eq!(rig.presenter.state(), AvatarState::Idle);
    assert!(!rig.presenter.is_talking());
    assert!(rig.presenter.job_id().is_none());
    assert_eq!(rig.display.shown_count(), 1);
    assert_eq!(
        rig.player.played.lock().unwrap().as_slice(),
        &["https://cdn.example/talk.mp4".to_string()]
    );
}

#[tokio::test(start_paused = true)]
async fn test_rejected_request_falls_back_without_polling() {
    let service = ScriptedTalkingHead::rejecting();
    let rig = avatar_rig(Some(Arc::clone(&service)), Duration::from_secs(1));

    let presentation = rig.presenter.present("Hello", AvatarMode::Animated).await;

    assert_eq!(service.polls.load(Ordering::SeqCst), 0);
    assert_eq!(rig.presenter.state(), AvatarState::StaticFallback);
    assert_eq!(presentation.mode, AvatarMode::Static);
}

#[tokio::test(start_paused = true)]
async fn test_failed_job_falls_back_immediately() {
    let service = ScriptedTalkingHead::with_statuses(vec![status("error", None)]);
    let rig = avatar_rig(Some(Arc::clone(&service)), Duration::from_secs(1));

    rig.presenter.present("Hello", AvatarMode::Animated).await;

    assert_eq!(service.polls.load(Ordering::SeqCst), 1);
    assert_eq!(rig.presenter.state(), AvatarState::StaticFallback);
}

#[tokio::test(start_paused = true)]
async fn test_request_carries_avatar_settings() {
    let service = ScriptedTalkingHead::ready("https://cdn.example/a.mp4");
    let rig = avatar_rig(Some(Arc::clone(&service)), Duration::from_millis(10));

    rig.presenter.set_gender(Gender::Male);
    rig.presenter.set_presentation(PresentationType::Presenter);
    let presentation = rig.presenter.present("Invoices", AvatarMode::Animated).await;
    presentation.animation.expect("animation handle").wait().await;

    let requests = service.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].text, "Invoices");
    assert_eq!(requests[0].gender, Gender::Male);
    assert_eq!(requests[0].presentation, PresentationType::Presenter);
    assert_eq!(requests[0].voice_id.as_deref(), Some("voice-1"));
}

#[tokio::test(start_paused = true)]
async fn test_without_talking_head_shows_static() {
    let rig = avatar_rig(None, Duration::from_secs(1));

    let presentation = rig.presenter.present("Hello", AvatarMode::Animated).await;

    assert_eq!(presentation.mode, AvatarMode::Static);
    assert_eq!(rig.presenter.state(), AvatarState::Showing);
    assert_eq!(rig.display.shown_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_return_to_neutral_twice_is_noop() {
    let rig = avatar_rig(None, Duration::from_secs(1));

    rig.presenter.present("Hello", AvatarMode::Static).await;
    assert_eq!(rig.presenter.state(), AvatarState::Showing);
    assert!(rig.presenter.is_talking());

    assert!(rig.presenter.return_to_neutral().await);
    assert_eq!(rig.presenter.state(), AvatarState::Idle);
    assert!(!rig.presenter.is_talking());
    assert!(!rig.presenter.return_to_neutral().await);

    // The static image already is the neutral pose
    assert_eq!(rig.display.shown_count(), 1);
    assert_eq!(rig.neutral.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_none_mode_shows_nothing() {
    let rig = avatar_rig(None, Duration::from_secs(1));

    let presentation = rig.presenter.present("Hello", AvatarMode::None).await;

    assert_eq!(presentation.mode, AvatarMode::None);
    assert_eq!(rig.display.shown_count(), 0);
    assert_eq!(rig.presenter.state(), AvatarState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_close_resets_to_idle() {
    let rig = avatar_rig(None, Duration::from_secs(1));

    rig.presenter.present("Hello", AvatarMode::Static).await;
    rig.presenter.close().await;

    assert_eq!(rig.presenter.state(), AvatarState::Idle);
    assert_eq!(rig.display.closed.load(Ordering::SeqCst), 1);
}

/// Counts frames and releases instead of opening a window
#[derive(Default)]
struct CountingSink {
    frames: AtomicUsize,
    releases: AtomicUsize,
}

impl FrameSink for CountingSink {
    fn show(&self, _frame: &[u8]) -> Result<()> {
        self.frames.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn release(&self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

/// Three tiny frames per pass
struct ShortClip {
    position: usize,
    rewinds: Arc<AtomicUsize>,
}

impl FrameSource for ShortClip {
    fn next_frame(&mut self) -> Result<Option<Vec<u8>>> {
        if self.position == 3 {
            return Ok(None);
        }
        self.position += 1;
        Ok(Some(vec![0u8; 12]))
    }

    fn rewind(&mut self) -> Result<()> {
        self.position = 0;
        self.rewinds.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn frame_interval(&self) -> Duration {
        Duration::from_millis(2)
    }
}

#[derive(Default)]
struct ClipBackend {
    sinks: Mutex<Vec<Arc<CountingSink>>>,
    rewinds: Arc<AtomicUsize>,
}

impl VideoBackend for ClipBackend {
    fn open(&self, _path: &Path) -> Result<(Box<dyn FrameSource>, Arc<dyn FrameSink>)> {
        let sink = Arc::new(CountingSink::default());
        self.sinks.lock().unwrap().push(Arc::clone(&sink));
        Ok((
            Box::new(ShortClip {
                position: 0,
                rewinds: Arc::clone(&self.rewinds),
            }),
            sink,
        ))
    }
}

#[test]
fn test_video_loops_until_stopped() {
    let clip = tempfile::NamedTempFile::new().unwrap();
    let backend = Arc::new(ClipBackend::default());
    let video = LoopingVideo::new(Arc::clone(&backend) as Arc<dyn VideoBackend>);

    assert!(video.start().is_err(), "no video selected yet");
    assert!(!video.set_path(Path::new("/nonexistent/idms.mp4")));
    assert!(video.set_path(clip.path()));

    video.start().unwrap();
    assert!(video.is_playing());
    std::thread::sleep(Duration::from_millis(60));

    assert!(video.stop());
    assert!(!video.is_playing());
    assert!(!video.stop());

    let sinks = backend.sinks.lock().unwrap();
    assert_eq!(sinks.len(), 1);
    assert!(sinks[0].frames.load(Ordering::SeqCst) > 3);
    assert!(sinks[0].releases.load(Ordering::SeqCst) >= 1);
    assert!(backend.rewinds.load(Ordering::SeqCst) >= 1);
}

/// Window that stops accepting frames until it is released
#[derive(Default)]
struct StalledSink {
    released: Mutex<bool>,
    wake: Condvar,
}

impl FrameSink for StalledSink {
    fn show(&self, _frame: &[u8]) -> Result<()> {
        let released = self.released.lock().unwrap();
        let _released = self.wake.wait_while(released, |r| !*r).unwrap();
        Err(idms_assistant::Error::Video("window closed".to_string()))
    }

    fn release(&self) {
        *self.released.lock().unwrap() = true;
        self.wake.notify_all();
    }
}

struct StalledBackend {
    sink: Arc<StalledSink>,
}

impl VideoBackend for StalledBackend {
    fn open(&self, _path: &Path) -> Result<(Box<dyn FrameSource>, Arc<dyn FrameSink>)> {
        Ok((
            Box::new(ShortClip {
                position: 0,
                rewinds: Arc::new(AtomicUsize::new(0)),
            }),
            Arc::clone(&self.sink) as Arc<dyn FrameSink>,
        ))
    }
}

#[test]
fn test_stop_releases_stalled_window_after_timeout() {
    let clip = tempfile::NamedTempFile::new().unwrap();
    let sink = Arc::new(StalledSink::default());
    let video = LoopingVideo::new(Arc::new(StalledBackend {
        sink: Arc::clone(&sink),
    }));
    assert!(video.set_path(clip.path()));

    video.start().unwrap();
    std::thread::sleep(Duration::from_millis(50));

    let started = Instant::now();
    assert!(video.stop());
    let elapsed = started.elapsed();

    assert!(elapsed >= JOIN_TIMEOUT);
    assert!(elapsed < JOIN_TIMEOUT + Duration::from_secs(1));
    assert!(*sink.released.lock().unwrap());
    assert!(!video.is_playing());
}

#[tokio::test]
async fn test_video_mode_plays_and_stops_on_neutral() {
    let clip = tempfile::NamedTempFile::new().unwrap();
    let backend = Arc::new(ClipBackend::default());
    let video = Arc::new(LoopingVideo::new(
        Arc::clone(&backend) as Arc<dyn VideoBackend>
    ));
    let neutral = Arc::new(common::StubNeutral::default());
    let display = Arc::new(common::RecordingDisplay::default());

    let presenter = AvatarPresenter::new(
        PresenterParts {
            talking_head: None,
            voice_id: None,
            neutral: Arc::clone(&neutral) as Arc<dyn NeutralPoseSource>,
            display: Arc::clone(&display) as Arc<dyn ImageDisplay>,
            player: common::TimedPlayer::new(Duration::ZERO) as Arc<dyn MediaPlayer>,
            video: Some(Arc::clone(&video)),
        },
        Gender::Female,
        PresentationType::TalkingHead,
    );

    // No video selected yet: static image instead
    let fallback = presenter.present("Hello", AvatarMode::Video).await;
    assert_eq!(fallback.mode, AvatarMode::Static);
    presenter.return_to_neutral().await;

    assert!(presenter.set_video_path(clip.path()));
    let presentation = presenter.present("Hello", AvatarMode::Video).await;
    assert_eq!(presentation.mode, AvatarMode::Video);
    assert_eq!(presenter.state(), AvatarState::Showing);
    assert!(video.is_playing());
    assert!(presenter.is_talking());

    assert!(presenter.return_to_neutral().await);
    assert!(!video.is_playing());
    assert!(!presenter.is_talking());
    assert_eq!(presenter.state(), AvatarState::Idle);
    assert_eq!(display.shown_count(), 2);
}
