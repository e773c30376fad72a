//! IDMS Assistant - voice and avatar help desk for the IDMS ERP system
//!
//! This library provides the pieces of the assistant:
//! - Knowledge base and chat completion
//! - Voice processing (capture, STT, multi-backend TTS)
//! - Avatar presentation (talking head, looping video, static image)
//! - The response engine and the speech listening loop
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    Front ends                        │
//! │        REPL (typed)   │   Speech listener            │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                 Response engine                      │
//! │   Language  │  Chat  │  Speech  │  Avatar presenter  │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                Remote services                       │
//! │   Groq  │  ElevenLabs  │  D-ID  │  Whisper/Deepgram  │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod app;
pub mod avatar;
pub mod chat;
pub mod config;
pub mod engine;
pub mod error;
pub mod knowledge;
pub mod language;
pub mod listener;
pub mod repl;
pub mod voice;

pub use app::{Assistant, Diagnostics};
pub use avatar::{AvatarMode, AvatarPresenter, AvatarState, Gender, PresentationType};
pub use chat::{ChatClient, CompletionClient};
pub use config::{Config, LanguageTable, StartupArgs};
pub use engine::{APOLOGY, ConversationTurn, ModeFlags, ResponseEngine};
pub use error::{Error, Result};
pub use knowledge::KnowledgeBase;
pub use language::{LanguageDetector, ScriptDetector};
pub use listener::{ListeningSession, SpeechListener, UtteranceHandler};
pub use repl::{Repl, ReplCommand};
