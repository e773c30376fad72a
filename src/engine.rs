//! Response pipeline
//!
//! One turn: detect language, ask the chat model, then present and speak the
//! answer concurrently before returning the avatar to neutral.

use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use serde::Serialize;

use crate::avatar::{AnimationHandle, AvatarMode, AvatarPresenter, Presentation};
use crate::chat::{ChatClient, system_prompt};
use crate::knowledge::KnowledgeBase;
use crate::language::LanguageDetector;
use crate::listener::UtteranceHandler;
use crate::voice::SpeechSynthesizer;

/// Answer used whenever the chat model cannot be reached
pub const APOLOGY: &str =
    "I'm sorry, I encountered an error generating a response about the IDMS ERP system.";

/// Per-turn presentation switches, changed from the REPL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ModeFlags {
    /// How answers are visualized
    pub avatar: AvatarMode,
    /// Detect the input language and speak the answer in it
    pub multilingual: bool,
}

/// Result of one request/response cycle
#[derive(Debug, Clone, Serialize)]
pub struct ConversationTurn {
    /// What the user said or typed
    pub input_text: String,
    /// Language the answer was spoken in
    pub detected_language: String,
    /// Full answer text
    pub response_text: String,
    /// How the answer was visualized
    pub avatar_mode: AvatarMode,
    /// Whether any speech backend delivered the answer
    pub speech_succeeded: bool,
    /// Rendered animation, if one played
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    /// Static image shown, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_path: Option<PathBuf>,
}

/// Answers questions and delivers them as speech plus avatar
pub struct ResponseEngine {
    chat: Arc<dyn ChatClient>,
    knowledge: KnowledgeBase,
    system_prompt: String,
    detector: Arc<dyn LanguageDetector>,
    default_language: String,
    synthesizer: Arc<SpeechSynthesizer>,
    presenter: AvatarPresenter,
    modes: RwLock<ModeFlags>,
    turn: tokio::sync::Mutex<Option<AnimationHandle>>,
}

impl ResponseEngine {
    /// Create an engine answering from `knowledge`
    #[must_use]
    pub fn new(
        chat: Arc<dyn ChatClient>,
        knowledge: &KnowledgeBase,
        detector: Arc<dyn LanguageDetector>,
        synthesizer: Arc<SpeechSynthesizer>,
        presenter: AvatarPresenter,
    ) -> Self {
        Self {
            chat,
            knowledge: knowledge.clone(),
            system_prompt: system_prompt(knowledge),
            detector,
            default_language: "en".to_string(),
            synthesizer,
            presenter,
            modes: RwLock::new(ModeFlags::default()),
            turn: tokio::sync::Mutex::new(None),
        }
    }

    /// Language assumed when detection is off or fails
    #[must_use]
    pub fn with_default_language(mut self, language: impl Into<String>) -> Self {
        self.default_language = language.into();
        self
    }

    /// Starting modes
    #[must_use]
    pub fn with_modes(self, modes: ModeFlags) -> Self {
        *self.modes.write().unwrap_or_else(PoisonError::into_inner) = modes;
        self
    }

    /// Current modes
    #[must_use]
    pub fn modes(&self) -> ModeFlags {
        *self.modes.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Change how answers are visualized
    pub fn set_avatar_mode(&self, mode: AvatarMode) {
        self.modes.write().unwrap_or_else(PoisonError::into_inner).avatar = mode;
        tracing::info!(%mode, "avatar mode set");
    }

    /// Turn language detection on or off
    pub fn set_multilingual(&self, enabled: bool) {
        self.modes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .multilingual = enabled;
    }

    /// Knowledge the answers are grounded in
    #[must_use]
    pub const fn knowledge(&self) -> &KnowledgeBase {
        &self.knowledge
    }

    /// Avatar presenter
    #[must_use]
    pub const fn presenter(&self) -> &AvatarPresenter {
        &self.presenter
    }

    /// Speech synthesizer
    #[must_use]
    pub const fn synthesizer(&self) -> &Arc<SpeechSynthesizer> {
        &self.synthesizer
    }

    /// Run one turn with the current modes
    pub async fn process(&self, input_text: &str) -> ConversationTurn {
        let modes = self.modes();
        self.process_with(input_text, modes).await
    }

    /// Run one turn with explicit modes
    ///
    /// Never fails: chat errors become the apology and speech failures are
    /// reported in `speech_succeeded`.
    pub async fn process_with(&self, input_text: &str, modes: ModeFlags) -> ConversationTurn {
        let mut turn = self.turn.lock().await;

        if let Some(previous) = turn.take()
            && !previous.is_finished()
        {
            tracing::debug!("superseding previous animation");
            previous.cancel().await;
            self.presenter.return_to_neutral().await;
        }

        let detected_language = if modes.multilingual {
            match self.detector.detect(input_text) {
                Ok(language) => language,
                Err(e) => {
                    tracing::debug!(error = %e, "language detection failed, using default");
                    self.default_language.clone()
                }
            }
        } else {
            self.default_language.clone()
        };

        tracing::info!(
            input_len = input_text.len(),
            language = %detected_language,
            avatar = %modes.avatar,
            "processing turn"
        );

        let response_text = match self.chat.complete(&self.system_prompt, input_text).await {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => {
                tracing::warn!("chat model returned an empty answer");
                APOLOGY.to_string()
            }
            Err(e) => {
                tracing::warn!(error = %e, "chat completion failed");
                APOLOGY.to_string()
            }
        };

        let speech_language = modes.multilingual.then_some(detected_language.as_str());
        let (presentation, speech_succeeded) = tokio::join!(
            self.presenter.present(&response_text, modes.avatar),
            self.synthesizer.speak(&response_text, speech_language),
        );

        if !speech_succeeded {
            tracing::warn!("speech synthesis failed, check audio settings");
        }

        let Presentation {
            mode,
            avatar_url,
            avatar_path,
            animation,
        } = presentation;

        match animation {
            Some(handle) => *turn = Some(handle),
            None => {
                self.presenter.return_to_neutral().await;
            }
        }

        ConversationTurn {
            input_text: input_text.to_string(),
            detected_language,
            response_text,
            avatar_mode: mode,
            speech_succeeded,
            avatar_url,
            avatar_path,
        }
    }

    /// Wait for a running animation to finish and return to neutral
    pub async fn settle(&self) {
        let handle = self.turn.lock().await.take();
        if let Some(handle) = handle {
            handle.wait().await;
        }
    }
}

#[async_trait]
impl UtteranceHandler for ResponseEngine {
    async fn handle(&self, text: String) {
        self.process(&text).await;
    }
}
