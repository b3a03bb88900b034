use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use murmur::daemon::drain_playback;
use murmur::voice::{
    AudioCapture, CAPTURE_SAMPLE_RATE, DeviceOutput, PcmSampleBuffer, PlaybackScheduler,
    SYNTHESIS_SAMPLE_RATE, signal_level, write_wav,
};
use murmur::{Config, Daemon};

/// Murmur - talk to an AI assistant and hear it answer
#[derive(Parser)]
#[command(name = "murmur", version, about)]
struct Cli {
    /// Assistant to talk to (by name, from the config file)
    #[arg(short, long, env = "MURMUR_ASSISTANT")]
    assistant: Option<String>,

    /// Who is talking to the assistant (by name, from the config file)
    #[arg(short, long, env = "MURMUR_PRINCIPAL")]
    principal: Option<String>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
        /// Save the captured audio as a WAV file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Test speaker output through the playback scheduler
    TestSpeaker,
    /// Speak text through the synthesis service
    Say {
        /// Text to speak
        #[arg(default_value = "Ahoj! Tohle je zkouška hlasu.")]
        text: String,
    },
    /// List configured assistants and principals
    Assistants,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info,murmur=info",
        1 => "info,murmur=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    let load_config = || Config::load(cli.assistant.as_deref(), cli.principal.as_deref());

    match cli.command {
        Some(Command::TestMic { duration, output }) => test_mic(duration, output.as_deref()).await,
        Some(Command::TestSpeaker) => test_speaker().await,
        Some(Command::Say { text }) => {
            Daemon::new(load_config()?).say(&text).await?;
            Ok(())
        }
        Some(Command::Assistants) => {
            list_assistants(&load_config()?);
            Ok(())
        }
        None => {
            let config = load_config()?;
            tracing::debug!(?config, "loaded configuration");
            tracing::info!(assistant = %config.assistant.name, "murmur ready - start speaking");

            Daemon::new(config).run().await?;
            Ok(())
        }
    }
}

/// Test microphone input
#[allow(clippy::future_not_send)]
async fn test_mic(duration: u64, output: Option<&std::path::Path>) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let mut capture = AudioCapture::open()?;
    capture.start()?;

    println!("Sample rate: {CAPTURE_SAMPLE_RATE} Hz");
    println!("---");

    let mut recording = Vec::new();
    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let samples = capture.take_samples();
        let (rms, peak) = signal_level(&samples);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (rms * 100.0).min(50.0) as usize;
        let meter: String = "#".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!("[{:2}s] RMS: {rms:.4} | Peak: {peak:.4} | [{meter}]", i + 1);

        if output.is_some() {
            recording.extend(samples);
        }
    }

    capture.stop();

    if let Some(path) = output {
        write_wav(path, &recording, CAPTURE_SAMPLE_RATE)?;
        println!("\nSaved {} samples to {}", recording.len(), path.display());
    }

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: pactl info | grep 'Default Source'");
    println!("  3. Run: arecord -l (to list devices)");

    Ok(())
}

/// Test speaker output with a tone split into back-to-back buffers
#[allow(clippy::future_not_send)]
async fn test_speaker() -> anyhow::Result<()> {
    const BUFFERS: u64 = 20;
    const BUFFER_SAMPLES: usize = SYNTHESIS_SAMPLE_RATE as usize / 10;

    println!("Testing speaker output...");
    println!("You should hear an unbroken 440Hz tone for 2 seconds\n");

    let mut scheduler = PlaybackScheduler::new(DeviceOutput::open()?)?;

    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    for sequence in 0..BUFFERS {
        let offset = sequence as usize * BUFFER_SAMPLES;
        let samples = (offset..offset + BUFFER_SAMPLES)
            .map(|i| {
                let t = i as f32 / SYNTHESIS_SAMPLE_RATE as f32;
                (2.0 * std::f32::consts::PI * 440.0 * t).sin() * 0.3
            })
            .collect();

        if let Some(unit) = scheduler.schedule(PcmSampleBuffer { sequence, samples }) {
            tracing::debug!(sequence, start = unit.start, "tone buffer scheduled");
        }
    }

    println!(
        "Scheduled {} buffers, {:.2}s of audio",
        scheduler.scheduled_count(),
        scheduler.pending_duration()
    );
    drain_playback(&scheduler).await;

    println!("\n---");
    println!("If the tone had clicks or gaps, playback scheduling is broken.");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Run: pactl list sinks short");

    Ok(())
}

/// List configured assistants and principals
fn list_assistants(config: &Config) {
    println!("Assistants:");
    for assistant in &config.assistants {
        let marker = if assistant.name == config.assistant.name { "*" } else { " " };
        println!(" {marker} {} ({})", assistant.name, assistant.backend);
    }

    println!("\nPrincipals:");
    if config.principals.is_empty() {
        println!("   (none)");
    }
    for principal in &config.principals {
        let active = config.principal.as_ref().is_some_and(|p| p.name == principal.name);
        let marker = if active { "*" } else { " " };
        println!(" {marker} {}", principal.name);
    }
}
