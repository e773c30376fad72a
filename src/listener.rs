//! Background speech listening loop

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;

use crate::engine::ResponseEngine;
use crate::voice::{Microphone, RecognitionError, Recognizer};

/// Spoken when listening starts
pub const LISTENING_PROMPT: &str = "I'm listening. Please speak your question.";

/// Spoken when a stop word ends listening
pub const STOPPED_ANNOUNCEMENT: &str = "Speech recognition stopped.";

/// Spoken when the recognition service fails
pub const SERVICE_ERROR_ANNOUNCEMENT: &str =
    "There was an error with the speech recognition service.";

/// Pause after an unexpected error before listening again
pub const ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Shared on/off flag of the listening loop
#[derive(Debug, Clone, Default)]
pub struct ListeningSession {
    active: Arc<AtomicBool>,
}

impl ListeningSession {
    /// Whether the loop should keep running
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Ask the loop to stop at its next iteration boundary
    pub fn request_stop(&self) {
        self.active.store(false, Ordering::Release);
    }

    /// Mark active; false if it already was
    fn activate(&self) -> bool {
        !self.active.swap(true, Ordering::AcqRel)
    }
}

/// Receives recognized utterances
#[async_trait]
pub trait UtteranceHandler: Send + Sync {
    /// Handle one utterance; the loop waits for this to return
    async fn handle(&self, text: String);
}

#[derive(Clone)]
struct LoopContext {
    microphone: Arc<dyn Microphone>,
    recognizer: Arc<dyn Recognizer>,
    engine: Arc<ResponseEngine>,
    stop_words: Arc<[String]>,
    session: ListeningSession,
}

/// Captures speech, recognizes it and hands it on, until stopped
pub struct SpeechListener {
    context: LoopContext,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SpeechListener {
    /// Create a stopped listener
    ///
    /// Utterances matching `stop_words` (case-insensitive) end the loop.
    #[must_use]
    pub fn new(
        microphone: Arc<dyn Microphone>,
        recognizer: Arc<dyn Recognizer>,
        engine: Arc<ResponseEngine>,
        stop_words: Vec<String>,
    ) -> Self {
        let stop_words: Vec<String> = stop_words.iter().map(|w| normalize(w)).collect();
        Self {
            context: LoopContext {
                microphone,
                recognizer,
                engine,
                stop_words: stop_words.into(),
                session: ListeningSession::default(),
            },
            task: Mutex::new(None),
        }
    }

    /// Session flag shared with the loop
    #[must_use]
    pub fn session(&self) -> ListeningSession {
        self.context.session.clone()
    }

    /// Whether the loop is running
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.context.session.is_active()
    }

    /// Announce and start the loop
    ///
    /// Utterances go to `callback`, or straight to the engine without one.
    /// Returns false if already listening.
    pub async fn start(&self, callback: Option<Arc<dyn UtteranceHandler>>) -> bool {
        if self.is_active() {
            tracing::debug!("already listening");
            return false;
        }

        // A stopped loop may still be finishing its last turn
        self.join().await;

        if !self.context.session.activate() {
            tracing::debug!("already listening");
            return false;
        }

        tracing::info!("starting speech recognition");
        self.context
            .engine
            .synthesizer()
            .speak(LISTENING_PROMPT, None)
            .await;

        let context = self.context.clone();
        let handle = tokio::spawn(listen_loop(context, callback));
        *self.task.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        true
    }

    /// Stop at the next iteration boundary; an in-flight turn completes
    pub fn stop(&self) {
        self.context.session.request_stop();
        tracing::info!("stopping speech recognition");
    }

    /// Wait for the loop to exit
    pub async fn join(&self) {
        let handle = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            tracing::warn!(error = %e, "listening loop ended abnormally");
        }
    }
}

/// Whether `text` is one of `stop_words` (already normalized)
#[must_use]
pub fn is_stop_word(text: &str, stop_words: &[String]) -> bool {
    let text = normalize(text);
    stop_words.iter().any(|w| *w == text)
}

/// Lowercase and strip surrounding whitespace and punctuation
fn normalize(text: &str) -> String {
    text.trim()
        .trim_matches(|c: char| c.is_ascii_punctuation() || c == '।' || c.is_whitespace())
        .to_lowercase()
}

async fn listen_loop(context: LoopContext, callback: Option<Arc<dyn UtteranceHandler>>) {
    let LoopContext {
        microphone,
        recognizer,
        engine,
        stop_words,
        session,
    } = context;

    while session.is_active() {
        let mic = Arc::clone(&microphone);
        let wav = match tokio::task::spawn_blocking(move || mic.capture_utterance()).await {
            Ok(Ok(wav)) => wav,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "speech capture failed");
                tokio::time::sleep(ERROR_BACKOFF).await;
                continue;
            }
            Err(e) => {
                tracing::warn!(error = %e, "capture task failed");
                tokio::time::sleep(ERROR_BACKOFF).await;
                continue;
            }
        };

        match recognizer.recognize(&wav).await {
            Ok(text) => {
                if !session.is_active() {
                    break;
                }

                tracing::info!(text = %text, "recognized speech");

                if is_stop_word(&text, &stop_words) {
                    engine.synthesizer().speak(STOPPED_ANNOUNCEMENT, None).await;
                    session.request_stop();
                    break;
                }

                match &callback {
                    Some(handler) => handler.handle(text).await,
                    None => {
                        engine.process(&text).await;
                    }
                }
            }
            Err(RecognitionError::Unintelligible) => {
                tracing::info!("could not understand audio");
            }
            Err(RecognitionError::Service(e)) => {
                tracing::error!(error = %e, "speech recognition service error");
                engine.synthesizer().speak(SERVICE_ERROR_ANNOUNCEMENT, None).await;
                session.request_stop();
                break;
            }
        }
    }

    tracing::debug!("listening loop exited");
}
