use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use idms_assistant::app::build_synthesizer;
use idms_assistant::config::ElevenLabsConfig;
use idms_assistant::voice::{
    AudioCapture, AudioPlayback, PLAYBACK_SAMPLE_RATE, SpeakerSink, calculate_energy,
};
use idms_assistant::{Assistant, Config, LanguageTable, StartupArgs};

/// IDMS ERP Assistant - ask about IDMS by voice or keyboard
#[derive(Parser)]
#[command(name = "idms-assistant", version, about)]
struct Cli {
    #[command(flatten)]
    args: StartupArgs,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
#[allow(clippy::enum_variant_names)]
enum Command {
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
    /// Test TTS output through the fallback chain
    TestTts {
        /// Text to speak
        #[arg(default_value = "Hello! This is a test of the IDMS assistant voice.")]
        text: String,
    },
    /// Report which services and local tools are available
    Diagnostics,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn,idms_assistant=info",
        1 => "info,idms_assistant=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Some(cmd) = cli.command {
        return match cmd {
            Command::TestMic { duration } => test_mic(duration).await,
            Command::TestSpeaker => test_speaker().await,
            Command::TestTts { text } => test_tts(&cli.args, &text).await,
            Command::Diagnostics => {
                let assistant = Assistant::build(Config::from_args(cli.args)?).await?;
                println!("{}", assistant.diagnostics());
                Ok(())
            }
        };
    }

    tracing::info!("starting IDMS assistant");

    let config = Config::from_args(cli.args)?;
    tracing::debug!(?config, "loaded configuration");

    let assistant = Assistant::build(config).await?;
    tracing::info!(diagnostics = ?assistant.diagnostics(), "assistant ready");

    assistant.into_repl().run().await?;
    Ok(())
}

/// Show a live input level meter
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let mut capture = AudioCapture::new()?;
    capture.start()?;

    let sample_rate = capture.sample_rate();
    println!("Sample rate: {sample_rate} Hz");
    println!("---");

    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let samples = capture.peek_buffer();
        let energy = calculate_energy(&samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!(
            "[{:2}s] RMS: {:.4} | Peak: {:.4} | [{}]",
            i + 1,
            energy,
            peak,
            meter
        );

        capture.clear_buffer();
    }

    capture.stop();

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: pactl info | grep 'Default Source'");
    println!("  3. Run: arecord -l (to list devices)");

    Ok(())
}

/// Play a 440Hz tone for 2 seconds
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let frequency = 440.0_f32;
    let duration_secs = 2.0_f32;
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    let num_samples = (PLAYBACK_SAMPLE_RATE as f32 * duration_secs) as usize;

    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..num_samples)
        .map(|i| {
            let t = i as f32 / PLAYBACK_SAMPLE_RATE as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3
        })
        .collect();

    println!(
        "Playing {} samples at {} Hz...",
        samples.len(),
        PLAYBACK_SAMPLE_RATE
    );

    tokio::task::spawn_blocking(move || AudioPlayback::new()?.play(samples)).await??;

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Run: pactl list sinks short");

    Ok(())
}

/// Speak `text` through the same backend chain the assistant uses
async fn test_tts(args: &StartupArgs, text: &str) -> anyhow::Result<()> {
    let languages = LanguageTable::load(args.language_file.as_deref());
    let synthesizer = build_synthesizer(
        ElevenLabsConfig::from_args(args),
        languages,
        Arc::new(SpeakerSink),
    )
    .await;

    println!("Backends: {}", synthesizer.backend_names().join(" -> "));
    println!("Speaking: {text}");

    if synthesizer.speak(text, None).await {
        println!("Done!");
        Ok(())
    } else {
        anyhow::bail!("every speech backend failed")
    }
}
