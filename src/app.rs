//! Assembles the assistant from configuration

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::Result;
use crate::avatar::{
    AvatarMode, AvatarPresenter, CommandPlayer, DiceBearSource, DidClient, FfmpegBackend,
    FixedDurationPlayer, LocalImageSource, LoopingVideo, MediaPlayer, NeutralPoseSource,
    PresenterParts, TalkingHeadService, ViewerDisplay,
};
use crate::chat::CompletionClient;
use crate::config::{Config, ElevenLabsConfig, LanguageTable};
use crate::engine::{ModeFlags, ResponseEngine};
use crate::knowledge::KnowledgeBase;
use crate::language::ScriptDetector;
use crate::listener::SpeechListener;
use crate::repl::Repl;
use crate::voice::providers::{ElevenLabsBackend, EspeakBackend, GoogleTranslateBackend};
use crate::voice::{AudioSink, CpalMicrophone, SpeakerSink, SpeechSynthesizer, SpeechToText};

/// What was found available at startup
#[derive(Debug, Clone, Serialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct Diagnostics {
    /// Knowledge source (`embedded` or a path)
    pub knowledge: String,
    /// Speech backends in preference order
    pub speech_backends: Vec<&'static str>,
    /// Speaker output opened
    pub speaker: bool,
    /// Talking-head service configured
    pub talking_head: bool,
    /// Media player used for animations
    pub animation_player: &'static str,
    /// Image viewer found for static avatars
    pub image_viewer: bool,
    /// Video looping supported
    pub video: bool,
    /// Input device opened
    pub microphone: bool,
    /// Speech input available (microphone plus recognition key)
    pub speech_input: bool,
    /// Multilingual mode at startup
    pub multilingual: bool,
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let yes_no = |v: bool| if v { "yes" } else { "no" };
        writeln!(f, "Knowledge base:     {}", self.knowledge)?;
        if self.speech_backends.is_empty() {
            writeln!(f, "Speech backends:    none")?;
        } else {
            writeln!(f, "Speech backends:    {}", self.speech_backends.join(" -> "))?;
        }
        writeln!(f, "Speaker:            {}", yes_no(self.speaker))?;
        writeln!(f, "Talking head:       {}", yes_no(self.talking_head))?;
        writeln!(f, "Animation player:   {}", self.animation_player)?;
        writeln!(f, "Image viewer:       {}", yes_no(self.image_viewer))?;
        writeln!(f, "Looping video:      {}", yes_no(self.video))?;
        writeln!(f, "Microphone:         {}", yes_no(self.microphone))?;
        writeln!(f, "Speech input:       {}", yes_no(self.speech_input))?;
        write!(f, "Multilingual:       {}", yes_no(self.multilingual))
    }
}

/// Fully wired assistant
pub struct Assistant {
    engine: Arc<ResponseEngine>,
    listener: Option<SpeechListener>,
    stop_words: Vec<String>,
    diagnostics: Diagnostics,
}

impl Assistant {
    /// Build every component, degrading where optional services are missing
    ///
    /// # Errors
    ///
    /// Returns error if the knowledge document cannot be loaded
    #[allow(clippy::too_many_lines)]
    pub async fn build(config: Config) -> Result<Self> {
        let Config {
            chat,
            elevenlabs,
            talking_head,
            stt,
            avatar,
            video_path,
            knowledge_path,
            multilingual,
            languages,
        } = config;

        let (knowledge, knowledge_source) = match &knowledge_path {
            Some(path) => (KnowledgeBase::from_path(path)?, path.display().to_string()),
            None => (KnowledgeBase::embedded()?, "embedded".to_string()),
        };

        let sink: Arc<dyn AudioSink> = Arc::new(SpeakerSink);
        let speaker = SpeakerSink::probe();

        // Talking-head speech should match the ElevenLabs voice when one is used
        let voice_id = elevenlabs.as_ref().map(|c| c.voice_id.clone());

        let synthesizer =
            Arc::new(build_synthesizer(elevenlabs, languages.clone(), Arc::clone(&sink)).await);

        let talking_head: Option<Arc<dyn TalkingHeadService>> = talking_head
            .map(|config| Arc::new(DidClient::new(config)) as Arc<dyn TalkingHeadService>);
        if talking_head.is_none() {
            tracing::info!("no talking-head key, animated avatars disabled");
        }

        let neutral: Arc<dyn NeutralPoseSource> = match avatar.image_path {
            Some(path) => Arc::new(LocalImageSource::new(path)),
            None => Arc::new(DiceBearSource::new()),
        };

        let display = ViewerDisplay::detect(avatar.image_viewer.as_deref());
        let image_viewer = display.has_viewer();

        let (player, animation_player): (Arc<dyn MediaPlayer>, &'static str) =
            match CommandPlayer::detect() {
                Some(player) => (Arc::new(player), "external"),
                None => {
                    tracing::warn!("no media player found, animations will not be shown");
                    (Arc::new(FixedDurationPlayer::default()), "none")
                }
            };

        let video = FfmpegBackend::detect()
            .map(|backend| Arc::new(LoopingVideo::new(Arc::new(backend))));

        let presenter = AvatarPresenter::new(
            PresenterParts {
                talking_head,
                voice_id,
                neutral,
                display: Arc::new(display),
                player,
                video: video.clone(),
            },
            avatar.gender,
            avatar.presentation,
        );

        if let Some(path) = &video_path
            && !presenter.set_video_path(path)
        {
            tracing::warn!(path = %path.display(), "configured video not usable");
        }

        let default_language = languages.default_language.clone();
        let engine = Arc::new(
            ResponseEngine::new(
                Arc::new(CompletionClient::new(chat)),
                &knowledge,
                Arc::new(ScriptDetector::new(default_language.clone())),
                synthesizer,
                presenter,
            )
            .with_default_language(default_language)
            .with_modes(ModeFlags {
                avatar: AvatarMode::Animated,
                multilingual,
            }),
        );

        let stop_words = languages.stop_words();
        let microphone = CpalMicrophone::probe();
        let listener = match stt {
            Some(config) if microphone => Some(SpeechListener::new(
                Arc::new(CpalMicrophone),
                Arc::new(SpeechToText::new(config)),
                Arc::clone(&engine),
                stop_words.clone(),
            )),
            Some(_) => {
                tracing::warn!("no microphone, speech input disabled");
                None
            }
            None => {
                tracing::info!("no speech recognition key, speech input disabled");
                None
            }
        };

        let diagnostics = Diagnostics {
            knowledge: knowledge_source,
            speech_backends: engine.synthesizer().backend_names(),
            speaker,
            talking_head: engine.presenter().has_talking_head(),
            animation_player,
            image_viewer,
            video: video.is_some(),
            microphone,
            speech_input: listener.is_some(),
            multilingual,
        };

        Ok(Self {
            engine,
            listener,
            stop_words,
            diagnostics,
        })
    }

    /// Startup availability report
    #[must_use]
    pub const fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Response engine
    #[must_use]
    pub const fn engine(&self) -> &Arc<ResponseEngine> {
        &self.engine
    }

    /// Hand everything to an interactive REPL
    #[must_use]
    pub fn into_repl(self) -> Repl {
        Repl::new(self.engine, self.listener, self.stop_words)
    }
}

/// Build the speech fallback chain: `ElevenLabs` (if its key works), espeak, Google
pub async fn build_synthesizer(
    elevenlabs: Option<ElevenLabsConfig>,
    languages: LanguageTable,
    sink: Arc<dyn AudioSink>,
) -> SpeechSynthesizer {
    let mut synthesizer = SpeechSynthesizer::new(languages);
    if let Some(config) = elevenlabs {
        let backend = ElevenLabsBackend::new(config, Arc::clone(&sink));
        match backend.health_check().await {
            Ok(voices) => {
                tracing::info!(voices, "ElevenLabs available");
                synthesizer.add_backend(Box::new(backend));
            }
            Err(e) => tracing::warn!(error = %e, "ElevenLabs unavailable, skipping"),
        }
    }
    match EspeakBackend::detect() {
        Some(backend) => {
            tracing::info!(program = %backend.program().display(), "espeak available");
            synthesizer.add_backend(Box::new(backend));
        }
        None => tracing::info!("espeak not installed"),
    }
    synthesizer.add_backend(Box::new(GoogleTranslateBackend::new(sink)));
    synthesizer
}
