//! Configuration management for the IDMS assistant
//!
//! Secrets and media paths arrive as startup parameters (CLI flags with
//! environment fallbacks). The supported-language table and localized stop
//! words come from an optional `assistant.toml`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::avatar::{Gender, PresentationType};
use crate::{Error, Result};

/// Name of the optional language/stop-word configuration file
pub const LANGUAGE_FILE: &str = "assistant.toml";

/// Startup parameters shared by the REPL and the diagnostic subcommands
#[derive(Debug, Clone, clap::Args)]
pub struct StartupArgs {
    /// Groq API key for chat completions
    #[arg(long, env = "GROQ_API_KEY", hide_env_values = true)]
    pub groq_api_key: Option<String>,

    /// Chat completion base URL (OpenAI-compatible)
    #[arg(long, env = "IDMS_CHAT_URL", default_value = "https://api.groq.com/openai/v1")]
    pub chat_url: String,

    /// Chat model identifier
    #[arg(long, env = "IDMS_CHAT_MODEL", default_value = "llama3-8b-8192")]
    pub chat_model: String,

    /// ElevenLabs API key (premium speech)
    #[arg(long, env = "ELEVENLABS_API_KEY", hide_env_values = true)]
    pub elevenlabs_api_key: Option<String>,

    /// ElevenLabs voice id
    #[arg(long, env = "ELEVENLABS_VOICE_ID", default_value = "21m00Tcm4TlvDq8ikWAM")]
    pub elevenlabs_voice_id: String,

    /// D-ID API key (animated talking head)
    #[arg(long, env = "DID_API_KEY", hide_env_values = true)]
    pub did_api_key: Option<String>,

    /// `OpenAI` API key (Whisper speech recognition)
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    /// Deepgram API key (alternative speech recognition)
    #[arg(long, env = "DEEPGRAM_API_KEY", hide_env_values = true)]
    pub deepgram_api_key: Option<String>,

    /// Knowledge document overriding the embedded IDMS knowledge base
    #[arg(long, env = "IDMS_KNOWLEDGE_PATH")]
    pub knowledge_path: Option<PathBuf>,

    /// Local avatar image used as the neutral pose instead of a generated one
    #[arg(long, env = "IDMS_AVATAR_IMAGE")]
    pub avatar_image: Option<PathBuf>,

    /// Local video looped while the assistant speaks
    #[arg(long, env = "IDMS_VIDEO_PATH")]
    pub video_path: Option<PathBuf>,

    /// Avatar gender at startup
    #[arg(long, default_value = "female")]
    pub gender: Gender,

    /// Avatar presentation type at startup
    #[arg(long, default_value = "talking-head")]
    pub presentation: PresentationType,

    /// Detect the input language and answer in it
    #[arg(long, env = "IDMS_MULTILINGUAL")]
    pub multilingual: bool,

    /// Image viewer used for static avatar frames (auto-detected if omitted)
    #[arg(long, env = "IDMS_IMAGE_VIEWER")]
    pub image_viewer: Option<String>,

    /// Path to the language table (defaults to `assistant.toml` lookup)
    #[arg(long, env = "IDMS_LANGUAGE_FILE")]
    pub language_file: Option<PathBuf>,
}

/// Assistant configuration
#[derive(Debug)]
pub struct Config {
    /// Chat completion configuration
    pub chat: ChatConfig,

    /// Premium speech configuration, if a key was supplied
    pub elevenlabs: Option<ElevenLabsConfig>,

    /// Talking-head configuration, if a key was supplied
    pub talking_head: Option<TalkingHeadConfig>,

    /// Speech recognition configuration, if a key was supplied
    pub stt: Option<SttConfig>,

    /// Avatar configuration
    pub avatar: AvatarConfig,

    /// Looping video path
    pub video_path: Option<PathBuf>,

    /// Knowledge document override
    pub knowledge_path: Option<PathBuf>,

    /// Start in multilingual mode
    pub multilingual: bool,

    /// Supported languages and stop words
    pub languages: LanguageTable,
}

/// Chat completion configuration
#[derive(Debug)]
pub struct ChatConfig {
    /// Bearer token
    pub api_key: SecretString,
    /// Base URL without trailing `/chat/completions`
    pub base_url: String,
    /// Model identifier
    pub model: String,
    /// Sampling temperature (kept low for factual answers)
    pub temperature: f32,
    /// Response token cap
    pub max_tokens: u32,
}

/// `ElevenLabs` speech configuration
#[derive(Debug)]
pub struct ElevenLabsConfig {
    /// API key sent as `xi-api-key`
    pub api_key: SecretString,
    /// Base URL
    pub base_url: String,
    /// Voice id (also passed to the talking-head provider)
    pub voice_id: String,
    /// Synthesis model
    pub model_id: String,
}

impl ElevenLabsConfig {
    /// Premium speech settings, if a key was supplied
    #[must_use]
    pub fn from_args(args: &StartupArgs) -> Option<Self> {
        non_empty(args.elevenlabs_api_key.clone()).map(|key| Self {
            api_key: SecretString::from(key),
            base_url: "https://api.elevenlabs.io/v1".to_string(),
            voice_id: args.elevenlabs_voice_id.clone(),
            model_id: "eleven_monolingual_v1".to_string(),
        })
    }
}

/// Talking-head (D-ID) configuration
#[derive(Debug)]
pub struct TalkingHeadConfig {
    /// API key
    pub api_key: SecretString,
    /// Base URL
    pub base_url: String,
}

/// Speech-to-text provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SttProvider {
    /// `OpenAI` Whisper
    Whisper,
    /// Deepgram
    Deepgram,
}

/// Speech recognition configuration
#[derive(Debug)]
pub struct SttConfig {
    /// Provider
    pub provider: SttProvider,
    /// API key
    pub api_key: SecretString,
    /// Model identifier
    pub model: String,
}

/// Avatar configuration
#[derive(Debug, Clone)]
pub struct AvatarConfig {
    /// Gender at startup
    pub gender: Gender,
    /// Presentation type at startup
    pub presentation: PresentationType,
    /// Local neutral-pose image
    pub image_path: Option<PathBuf>,
    /// Image viewer program
    pub image_viewer: Option<String>,
}

/// One supported language
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageEntry {
    /// Code sent to the multilingual synthesis backend
    pub tts_code: String,

    /// Stop words recognized in this language
    #[serde(default)]
    pub stop_words: Vec<String>,
}

/// Supported-language table
///
/// Detected codes missing from `languages` are spoken in `default_language`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LanguageTable {
    /// Default language code
    pub default_language: String,

    /// Entries keyed by detected language code
    pub languages: BTreeMap<String, LanguageEntry>,
}

impl Default for LanguageTable {
    fn default() -> Self {
        let mut languages = BTreeMap::new();
        languages.insert(
            "en".to_string(),
            LanguageEntry {
                tts_code: "en".to_string(),
                stop_words: ["stop listening", "stop", "exit", "quit"]
                    .map(String::from)
                    .to_vec(),
            },
        );
        languages.insert(
            "hi".to_string(),
            LanguageEntry {
                tts_code: "hi".to_string(),
                stop_words: ["रुको", "बंद करो"].map(String::from).to_vec(),
            },
        );

        Self {
            default_language: "en".to_string(),
            languages,
        }
    }
}

impl LanguageTable {
    /// Parse a table from TOML
    ///
    /// # Errors
    ///
    /// Returns error if the TOML is malformed or the default language has no entry
    pub fn from_toml(content: &str) -> Result<Self> {
        let table: Self = toml::from_str(content)?;
        if !table.languages.contains_key(&table.default_language) {
            return Err(Error::Config(format!(
                "default language '{}' has no entry",
                table.default_language
            )));
        }
        Ok(table)
    }

    /// Synthesis code of the default language
    #[must_use]
    pub fn default_tts_code(&self) -> &str {
        self.languages
            .get(&self.default_language)
            .map_or(self.default_language.as_str(), |e| e.tts_code.as_str())
    }

    /// Map a detected language to a synthesis code, falling back to the default
    #[must_use]
    pub fn tts_code(&self, language: &str) -> &str {
        self.languages
            .get(language)
            .map_or_else(|| self.default_tts_code(), |e| e.tts_code.as_str())
    }

    /// Every stop word across all languages, lowercased
    #[must_use]
    pub fn stop_words(&self) -> Vec<String> {
        let mut words: Vec<String> = self
            .languages
            .values()
            .flat_map(|e| e.stop_words.iter().map(|w| w.trim().to_lowercase()))
            .filter(|w| !w.is_empty())
            .collect();
        words.sort();
        words.dedup();
        words
    }

    /// Load from an explicit path, or search the working and config directories
    ///
    /// Unreadable or malformed files are logged and replaced by the defaults.
    #[must_use]
    pub fn load(explicit: Option<&Path>) -> Self {
        let candidates: Vec<PathBuf> = match explicit {
            Some(path) => vec![path.to_path_buf()],
            None => [
                Some(PathBuf::from(LANGUAGE_FILE)),
                directories::ProjectDirs::from("com", "idms", "idms-assistant")
                    .map(|d| d.config_dir().join(LANGUAGE_FILE)),
            ]
            .into_iter()
            .flatten()
            .collect(),
        };

        for path in candidates {
            if !path.exists() {
                continue;
            }
            match std::fs::read_to_string(&path) {
                Ok(content) => match Self::from_toml(&content) {
                    Ok(table) => {
                        tracing::info!(path = %path.display(), "loaded language table");
                        return table;
                    }
                    Err(e) => {
                        tracing::warn!(
                            path = %path.display(),
                            error = %e,
                            "failed to parse language table, using defaults"
                        );
                    }
                },
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "failed to read language table"
                    );
                }
            }
        }

        Self::default()
    }
}

impl Config {
    /// Build configuration from startup parameters
    ///
    /// # Errors
    ///
    /// Returns error if the chat API key is missing
    pub fn from_args(args: StartupArgs) -> Result<Self> {
        let elevenlabs = ElevenLabsConfig::from_args(&args);

        let groq_key = args
            .groq_api_key
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                Error::Config("GROQ_API_KEY (or --groq-api-key) is required".to_string())
            })?;

        let chat = ChatConfig {
            api_key: SecretString::from(groq_key),
            base_url: args.chat_url,
            model: args.chat_model,
            temperature: 0.3,
            max_tokens: 800,
        };

        let talking_head = non_empty(args.did_api_key).map(|key| TalkingHeadConfig {
            api_key: SecretString::from(key),
            base_url: "https://api.d-id.com".to_string(),
        });

        // Whisper preferred when both recognition keys are present
        let stt = non_empty(args.openai_api_key)
            .map(|key| SttConfig {
                provider: SttProvider::Whisper,
                api_key: SecretString::from(key),
                model: "whisper-1".to_string(),
            })
            .or_else(|| {
                non_empty(args.deepgram_api_key).map(|key| SttConfig {
                    provider: SttProvider::Deepgram,
                    api_key: SecretString::from(key),
                    model: "nova-2".to_string(),
                })
            });

        let languages = LanguageTable::load(args.language_file.as_deref());

        Ok(Self {
            chat,
            elevenlabs,
            talking_head,
            stt,
            avatar: AvatarConfig {
                gender: args.gender,
                presentation: args.presentation,
                image_path: args.avatar_image,
                image_viewer: args.image_viewer,
            },
            video_path: args.video_path,
            knowledge_path: args.knowledge_path,
            multilingual: args.multilingual,
            languages,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
