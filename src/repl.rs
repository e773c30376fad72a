//! Interactive command loop

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

use crate::Result;
use crate::avatar::{AvatarMode, Gender, PresentationType};
use crate::engine::{ConversationTurn, ResponseEngine};
use crate::knowledge::KnowledgeBase;
use crate::listener::{ListeningSession, SpeechListener, UtteranceHandler, is_stop_word};

/// Sentence spoken by `test audio`
pub const TEST_AUDIO_TEXT: &str = "This is an audio test for the IDMS ERP Assistant with talking avatar integration. If you can hear this message, your audio is working correctly.";

const LISTEN_POLL: Duration = Duration::from_millis(200);

const SET_VIDEO: &str = "set video ";

const FAQ: &str = "faq ";

/// One line of REPL input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    /// Leave the assistant
    Exit,
    /// Speak the test sentence
    TestAudio,
    /// Start speech recognition
    Listen,
    /// Stop speech recognition
    StopListening,
    /// Change how answers are visualized
    SetAvatar(AvatarMode),
    /// Change avatar gender
    SetGender(Gender),
    /// Change avatar framing
    SetPresentation(PresentationType),
    /// Select the looping video, prompting when no path is given
    SetVideo(Option<PathBuf>),
    /// Canonical GST answer, or the list of FAQ questions
    Faq(Option<String>),
    /// Question for the assistant
    Query(String),
    /// Blank line
    Empty,
}

impl ReplCommand {
    /// Parse one input line; commands are case-insensitive
    #[must_use]
    pub fn parse(line: &str) -> Self {
        let trimmed = line.trim();
        let lower = trimmed.to_lowercase();

        match lower.as_str() {
            "" => Self::Empty,
            "exit" => Self::Exit,
            "test audio" => Self::TestAudio,
            "listen" => Self::Listen,
            "stop listening" => Self::StopListening,
            "static" | "novideo" => Self::SetAvatar(AvatarMode::Static),
            "animated" => Self::SetAvatar(AvatarMode::Animated),
            "video" => Self::SetAvatar(AvatarMode::Video),
            "male" => Self::SetGender(Gender::Male),
            "female" => Self::SetGender(Gender::Female),
            "talking-head" => Self::SetPresentation(PresentationType::TalkingHead),
            "presenter" => Self::SetPresentation(PresentationType::Presenter),
            "set video" => Self::SetVideo(None),
            "faq" => Self::Faq(None),
            // Keep the original casing of the argument
            _ => {
                if let Some(path) = strip_command(trimmed, SET_VIDEO) {
                    Self::SetVideo(Some(PathBuf::from(path)))
                } else if let Some(question) = strip_command(trimmed, FAQ) {
                    Self::Faq(Some(question.to_string()))
                } else {
                    Self::Query(trimmed.to_string())
                }
            }
        }
    }
}

fn strip_command<'a>(line: &'a str, command: &str) -> Option<&'a str> {
    let prefix = line.get(..command.len())?;
    prefix
        .eq_ignore_ascii_case(command)
        .then(|| line[command.len()..].trim())
}

/// Bulleted list of the FAQ questions
#[must_use]
pub fn faq_list(knowledge: &KnowledgeBase) -> String {
    knowledge
        .faqs()
        .iter()
        .map(|f| format!("- {}", f.question))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Prints turns produced from recognized speech
struct SpokenTurnPrinter {
    engine: Arc<ResponseEngine>,
}

#[async_trait]
impl UtteranceHandler for SpokenTurnPrinter {
    async fn handle(&self, text: String) {
        println!("You said: {text}");
        let turn = self.engine.process(&text).await;
        print_turn(&turn);
    }
}

/// Line-oriented front end over the engine and listener
pub struct Repl {
    engine: Arc<ResponseEngine>,
    listener: Option<SpeechListener>,
    stop_words: Vec<String>,
}

impl Repl {
    /// Create a REPL; without a listener, `listen` reports that speech input is unavailable
    #[must_use]
    pub fn new(
        engine: Arc<ResponseEngine>,
        listener: Option<SpeechListener>,
        stop_words: Vec<String>,
    ) -> Self {
        Self {
            engine,
            listener,
            stop_words,
        }
    }

    /// Read and dispatch lines until `exit` or end of input
    ///
    /// # Errors
    ///
    /// Returns error if stdin cannot be read
    pub async fn run(&self) -> Result<()> {
        print_banner();
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        loop {
            prompt("You: ");
            let Some(line) = lines.next_line().await? else {
                break;
            };

            match ReplCommand::parse(&line) {
                ReplCommand::Exit => break,
                ReplCommand::Empty => {}
                ReplCommand::TestAudio => {
                    println!("Running audio test...");
                    if !self.engine.synthesizer().speak(TEST_AUDIO_TEXT, None).await {
                        println!("Audio test failed. Check your audio settings.");
                    }
                }
                ReplCommand::Listen => self.listen(&mut lines).await?,
                ReplCommand::StopListening => {
                    if let Some(listener) = &self.listener {
                        listener.stop();
                    }
                    println!("Speech recognition stopped.");
                }
                ReplCommand::SetAvatar(mode) => self.set_avatar(mode),
                ReplCommand::SetGender(gender) => {
                    self.engine.presenter().set_gender(gender);
                    println!("Avatar gender set to: {gender}");
                }
                ReplCommand::SetPresentation(presentation) => {
                    self.engine.presenter().set_presentation(presentation);
                    println!("Avatar type set to: {presentation}");
                }
                ReplCommand::SetVideo(path) => {
                    let path = match path {
                        Some(path) => Some(path),
                        None => {
                            prompt("Video path: ");
                            lines
                                .next_line()
                                .await?
                                .map(|l| PathBuf::from(l.trim()))
                                .filter(|p| !p.as_os_str().is_empty())
                        }
                    };
                    match path {
                        Some(path) if self.engine.presenter().set_video_path(&path) => {
                            println!("Video set to: {}", path.display());
                        }
                        Some(path) => println!("Video not available: {}", path.display()),
                        None => println!("No video path given."),
                    }
                }
                ReplCommand::Faq(None) => println!("{}", faq_list(self.engine.knowledge())),
                ReplCommand::Faq(Some(question)) => {
                    match self.engine.knowledge().faq(&question) {
                        Some(answer) => {
                            println!("IDMS Bot: {answer}");
                            self.engine.synthesizer().speak(answer, None).await;
                        }
                        None => println!("No FAQ entry for \"{question}\". Ask it as a question instead."),
                    }
                }
                ReplCommand::Query(text) => {
                    let turn = self.engine.process(&text).await;
                    print_turn(&turn);
                }
            }
        }

        self.shutdown().await;
        Ok(())
    }

    fn set_avatar(&self, mode: AvatarMode) {
        let presenter = self.engine.presenter();
        match mode {
            AvatarMode::Animated if !presenter.has_talking_head() => {
                println!("Talking-head service not configured; static avatars will be shown.");
            }
            AvatarMode::Video if presenter.video_path().is_none() => {
                println!("No video selected; use 'set video <path>' first.");
            }
            _ => {}
        }
        self.engine.set_avatar_mode(mode);
        println!("Avatar mode: {mode}");
    }

    async fn listen(&self, lines: &mut Lines<BufReader<Stdin>>) -> Result<()> {
        let Some(listener) = &self.listener else {
            println!("Speech input unavailable (no microphone or recognition key).");
            return Ok(());
        };

        println!("Starting speech recognition mode...");
        let printer: Arc<dyn UtteranceHandler> = Arc::new(SpokenTurnPrinter {
            engine: Arc::clone(&self.engine),
        });
        listener.start(Some(printer)).await;
        println!("Speech recognition mode active. Type 'stop listening' to exit this mode.");

        let session = listener.session();
        while session.is_active() {
            tokio::select! {
                line = lines.next_line() => {
                    match line? {
                        Some(cmd) if is_stop_word(&cmd, &self.stop_words) => {
                            listener.stop();
                            println!("Speech recognition stopped.");
                        }
                        Some(_) => {
                            println!("Listening... type 'stop listening' to type questions again.");
                        }
                        None => listener.stop(),
                    }
                }
                () = wait_inactive(&session) => {}
            }
        }

        Ok(())
    }

    async fn shutdown(&self) {
        if let Some(listener) = &self.listener {
            listener.stop();
            listener.join().await;
        }
        self.engine.settle().await;
        self.engine.presenter().close().await;
        println!("Goodbye!");
    }
}

async fn wait_inactive(session: &ListeningSession) {
    while session.is_active() {
        tokio::time::sleep(LISTEN_POLL).await;
    }
}

fn prompt(text: &str) {
    print!("{text}");
    let _ = std::io::stdout().flush();
}

fn print_turn(turn: &ConversationTurn) {
    println!("IDMS Bot: {}", turn.response_text);
    if let Some(url) = &turn.avatar_url {
        println!("(avatar animation: {url})");
    }
    if !turn.speech_succeeded {
        println!("WARNING: Speech synthesis failed. Check your audio settings.");
    }
}

fn print_banner() {
    println!("IDMS ERP Assistant is ready! Type 'exit' to quit.");
    println!("Type 'test audio' to run an audio test.");
    println!("Type 'listen' to start speech recognition mode.");
    println!("Type 'stop listening' to exit speech recognition mode.");
    println!("Type 'male' or 'female' to set avatar gender.");
    println!("Type 'talking-head' or 'presenter' to set avatar type.");
    println!("Type 'static' to use static avatars or 'animated' to use animated avatars.");
    println!("Type 'faq' to list GST FAQs or 'faq <question>' for the canonical answer.");
    println!("Type 'video' to loop a local video, 'novideo' to stop, 'set video <path>' to choose one.");
    println!("Ask any questions about the IDMS ERP system, its modules, or GST integration.");
}
