//! Shared test utilities
//!
//! Scripted stand-ins for the remote services and local devices, so turns can
//! run without network or audio hardware.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use idms_assistant::avatar::{
    AvatarImage, AvatarPresenter, ImageDisplay, MediaPlayer, NeutralPoseSource, PresenterParts,
    TalkRequest, TalkStatus, TalkingHeadService,
};
use idms_assistant::voice::{
    Microphone, RecognitionError, Recognizer, SpeechBackend, SpeechSynthesizer,
};
use idms_assistant::{
    ChatClient, Error, Gender, KnowledgeBase, LanguageTable, PresentationType, ResponseEngine,
    Result, ScriptDetector,
};

/// Chat client with a fixed answer or a fixed failure
pub struct ScriptedChat {
    answer: Option<String>,
    pub calls: AtomicUsize,
    pub prompts: Mutex<Vec<(String, String)>>,
}

impl ScriptedChat {
    pub fn answering(answer: &str) -> Arc<Self> {
        Arc::new(Self {
            answer: Some(answer.to_string()),
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            answer: None,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl ChatClient for ScriptedChat {
    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts
            .lock()
            .unwrap()
            .push((system.to_string(), user.to_string()));
        self.answer
            .clone()
            .ok_or_else(|| Error::Chat("service unavailable".to_string()))
    }
}

/// Speech backend recording what it was asked to say
#[derive(Clone)]
pub struct ScriptedBackend {
    name: &'static str,
    multilingual: bool,
    fails: bool,
    pub spoken: Arc<Mutex<Vec<(String, String)>>>,
}

impl ScriptedBackend {
    pub fn working(name: &'static str) -> Self {
        Self {
            name,
            multilingual: false,
            fails: false,
            spoken: Arc::default(),
        }
    }

    pub fn failing(name: &'static str) -> Self {
        Self {
            fails: true,
            ..Self::working(name)
        }
    }

    pub fn multilingual(mut self) -> Self {
        self.multilingual = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.spoken.lock().unwrap().len()
    }

    pub fn texts(&self) -> Vec<String> {
        self.spoken.lock().unwrap().iter().map(|(t, _)| t.clone()).collect()
    }

    pub fn languages(&self) -> Vec<String> {
        self.spoken.lock().unwrap().iter().map(|(_, l)| l.clone()).collect()
    }
}

#[async_trait]
impl SpeechBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        self.name
    }

    fn is_multilingual(&self) -> bool {
        self.multilingual
    }

    async fn speak(&self, text: &str, language: &str) -> Result<()> {
        self.spoken
            .lock()
            .unwrap()
            .push((text.to_string(), language.to_string()));
        if self.fails {
            Err(Error::Tts(format!("{} unavailable", self.name)))
        } else {
            Ok(())
        }
    }
}

/// Build a synthesizer over the default language table
pub fn synthesizer(backends: &[ScriptedBackend]) -> Arc<SpeechSynthesizer> {
    let mut synthesizer = SpeechSynthesizer::new(LanguageTable::default());
    for backend in backends {
        synthesizer.add_backend(Box::new(backend.clone()));
    }
    Arc::new(synthesizer)
}

/// Talking-head service replaying a scripted sequence of statuses
pub struct ScriptedTalkingHead {
    create_fails: bool,
    statuses: Mutex<VecDeque<TalkStatus>>,
    pub requests: Mutex<Vec<TalkRequest>>,
    pub polls: AtomicUsize,
}

impl ScriptedTalkingHead {
    pub fn with_statuses(statuses: Vec<TalkStatus>) -> Arc<Self> {
        Arc::new(Self {
            create_fails: false,
            statuses: Mutex::new(statuses.into()),
            requests: Mutex::new(Vec::new()),
            polls: AtomicUsize::new(0),
        })
    }

    /// Ready on the first status check
    pub fn ready(url: &str) -> Arc<Self> {
        Self::with_statuses(vec![status("done", Some(url))])
    }

    /// Never finishes rendering
    pub fn never_ready() -> Arc<Self> {
        Self::with_statuses(Vec::new())
    }

    pub fn rejecting() -> Arc<Self> {
        Arc::new(Self {
            create_fails: true,
            statuses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            polls: AtomicUsize::new(0),
        })
    }
}

pub fn status(status: &str, url: Option<&str>) -> TalkStatus {
    TalkStatus {
        status: status.to_string(),
        result_url: url.map(String::from),
    }
}

#[async_trait]
impl TalkingHeadService for ScriptedTalkingHead {
    async fn create_talk(&self, request: &TalkRequest) -> Result<String> {
        self.requests.lock().unwrap().push(request.clone());
        if self.create_fails {
            return Err(Error::Avatar("talk creation rejected".to_string()));
        }
        Ok("tlk_test".to_string())
    }

    async fn talk_status(&self, _id: &str) -> Result<TalkStatus> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| status("started", None)))
    }
}

/// Neutral source returning a fixed local path
#[derive(Default)]
pub struct StubNeutral {
    pub calls: AtomicUsize,
}

#[async_trait]
impl NeutralPoseSource for StubNeutral {
    async fn neutral_image(&self, gender: Gender) -> Result<AvatarImage> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(AvatarImage::Local(PathBuf::from(format!(
            "/tmp/idms-neutral-{gender}.png"
        ))))
    }
}

/// Display recording every image shown
#[derive(Default)]
pub struct RecordingDisplay {
    pub shown: Mutex<Vec<PathBuf>>,
    pub closed: AtomicUsize,
}

impl RecordingDisplay {
    pub fn shown_count(&self) -> usize {
        self.shown.lock().unwrap().len()
    }
}

impl ImageDisplay for RecordingDisplay {
    fn show(&self, image: AvatarImage) -> Result<PathBuf> {
        let path = image.path().to_path_buf();
        self.shown.lock().unwrap().push(path.clone());
        Ok(path)
    }

    fn close(&self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Player that "plays" for a fixed duration
pub struct TimedPlayer {
    duration: Duration,
    pub played: Mutex<Vec<String>>,
}

impl TimedPlayer {
    pub fn new(duration: Duration) -> Arc<Self> {
        Arc::new(Self {
            duration,
            played: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl MediaPlayer for TimedPlayer {
    async fn play(&self, url: &str) -> Result<()> {
        self.played.lock().unwrap().push(url.to_string());
        tokio::time::sleep(self.duration).await;
        Ok(())
    }
}

/// Presenter collaborators kept for assertions
pub struct AvatarRig {
    pub presenter: AvatarPresenter,
    pub neutral: Arc<StubNeutral>,
    pub display: Arc<RecordingDisplay>,
    pub player: Arc<TimedPlayer>,
}

/// Build a presenter over scripted parts
pub fn avatar_rig(talking_head: Option<Arc<ScriptedTalkingHead>>, playback: Duration) -> AvatarRig {
    let neutral = Arc::new(StubNeutral::default());
    let display = Arc::new(RecordingDisplay::default());
    let player = TimedPlayer::new(playback);

    let presenter = AvatarPresenter::new(
        PresenterParts {
            talking_head: talking_head.map(|t| t as Arc<dyn TalkingHeadService>),
            voice_id: Some("voice-1".to_string()),
            neutral: Arc::clone(&neutral) as Arc<dyn NeutralPoseSource>,
            display: Arc::clone(&display) as Arc<dyn ImageDisplay>,
            player: Arc::clone(&player) as Arc<dyn MediaPlayer>,
            video: None,
        },
        Gender::Female,
        PresentationType::TalkingHead,
    );

    AvatarRig {
        presenter,
        neutral,
        display,
        player,
    }
}

/// Build an engine over the embedded knowledge base
pub fn engine(
    chat: Arc<ScriptedChat>,
    synthesizer: Arc<SpeechSynthesizer>,
    presenter: AvatarPresenter,
) -> ResponseEngine {
    let knowledge = KnowledgeBase::embedded().expect("embedded knowledge base");
    ResponseEngine::new(
        chat,
        &knowledge,
        Arc::new(ScriptDetector::default()),
        synthesizer,
        presenter,
    )
}

/// Microphone returning a short silent WAV immediately
pub struct InstantMicrophone {
    pub captures: AtomicUsize,
    timeouts: AtomicUsize,
}

impl InstantMicrophone {
    pub fn new() -> Arc<Self> {
        Self::timing_out(0)
    }

    /// Hears nothing for the first `count` captures
    pub fn timing_out(count: usize) -> Arc<Self> {
        Arc::new(Self {
            captures: AtomicUsize::new(0),
            timeouts: AtomicUsize::new(count),
        })
    }
}

impl Microphone for InstantMicrophone {
    fn capture_utterance(&self) -> Result<Vec<u8>> {
        self.captures.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(5));
        let timed_out = self
            .timeouts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if timed_out {
            return Err(Error::Timeout(
                "listening timed out while waiting for phrase to start".to_string(),
            ));
        }
        Ok(b"RIFF-test".to_vec())
    }
}

/// Recognizer replaying scripted results, then reporting silence
pub struct ScriptedRecognizer {
    results: Mutex<VecDeque<std::result::Result<String, RecognitionError>>>,
}

impl ScriptedRecognizer {
    pub fn new(results: Vec<std::result::Result<String, RecognitionError>>) -> Arc<Self> {
        Arc::new(Self {
            results: Mutex::new(results.into()),
        })
    }
}

#[async_trait]
impl Recognizer for ScriptedRecognizer {
    async fn recognize(&self, _wav: &[u8]) -> std::result::Result<String, RecognitionError> {
        let next = self.results.lock().unwrap().pop_front();
        match next {
            Some(result) => result,
            None => {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Err(RecognitionError::Unintelligible)
            }
        }
    }
}
