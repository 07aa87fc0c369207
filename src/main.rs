use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use live_call::media::PlaybackChunk;
use live_call::voice::{AudioInput, CpalInput, CpalOutput, PlaybackScheduler};
use live_call::{
    CallEnd, CallSession, Config, GeminiLiveTransport, Notice, SessionState, SystemDevices,
};

/// Live Call - talk to a remote agent over a real-time audio/video session
#[derive(Parser)]
#[command(name = "live-call", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Audio only; don't share video frames
    #[arg(long, env = "LIVE_CALL_NO_VIDEO")]
    no_video: bool,

    /// Image to share as the video stream
    #[arg(long, value_name = "PATH")]
    image: Option<PathBuf>,

    /// System instruction for the agent
    #[arg(long)]
    system_instruction: Option<String>,

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
    /// Test speaker output through the playback scheduler
    TestSpeaker,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "warn,live_call=info",
        1 => "info,live_call=debug",
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
    let mut config = Config::load()?;

    if let Some(cmd) = cli.command {
        return match cmd {
            Command::TestMic { duration } => test_mic(&config, duration).await,
            Command::TestSpeaker => test_speaker(&config).await,
        };
    }

    if cli.no_video {
        config.video.enabled = false;
    }
    if let Some(image) = cli.image {
        config.video.image_path = Some(image);
    }
    if let Some(instruction) = cli.system_instruction {
        config.live.system_instruction = Some(instruction);
    }

    if config.live.api_key.is_none() {
        anyhow::bail!("no API key configured; set GEMINI_API_KEY or live.api_key");
    }

    tracing::debug!(?config, "loaded configuration");
    call(config).await
}

/// Run one call until Ctrl+C or the remote side hangs up
#[allow(clippy::future_not_send)]
async fn call(config: Config) -> anyhow::Result<()> {
    let (notice_tx, mut notice_rx) = mpsc::unbounded_channel();
    let devices = Box::new(SystemDevices::new(config.clone()));
    let session = CallSession::new(config, devices, Arc::new(GeminiLiveTransport), notice_tx);

    let mut state = session.state();
    tokio::spawn(async move {
        while state.changed().await.is_ok() {
            let current = *state.borrow_and_update();
            match current {
                SessionState::Connecting => println!("Connecting..."),
                SessionState::Open => println!("Connected. Start talking! (Ctrl+C to hang up)\n"),
                SessionState::Idle | SessionState::Error | SessionState::Closed => {}
            }
        }
    });

    tokio::spawn(async move {
        while let Some(notice) = notice_rx.recv().await {
            match notice {
                Notice::Turn(turn) if turn.text.is_empty() => {}
                Notice::Turn(turn) => println!("{}: {}", turn.speaker, turn.text),
                Notice::Failure(message) => eprintln!("Call failed: {message}"),
            }
        }
    });

    let stop = CancellationToken::new();
    let ctrl_c = stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("received shutdown signal");
            ctrl_c.cancel();
        }
    });

    let summary = session.run(stop).await?;

    println!("\n---");
    match &summary.end {
        CallEnd::UserStopped => println!("Call ended."),
        CallEnd::RemoteClosed { reason, .. } => println!("Call closed by remote: {reason}"),
        CallEnd::Failed(message) => println!("Call failed: {message}"),
    }
    println!(
        "Turns: {} | Dropped audio frames: {}",
        summary.turns.len() / 2,
        summary.dropped_audio_frames
    );

    if matches!(summary.end, CallEnd::Failed(_)) {
        anyhow::bail!("call {} failed", summary.call_id);
    }
    Ok(())
}

/// Test microphone input with a level meter
async fn test_mic(config: &Config, duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let mut input = CpalInput::new(config.audio.input_sample_rate)?;
    let buffer = Arc::new(Mutex::new(Vec::<f32>::new()));
    let writer = Arc::clone(&buffer);
    input.open(Box::new(move |samples| {
        if let Ok(mut buf) = writer.lock() {
            buf.extend_from_slice(samples);
        }
    }))?;

    println!("Sample rate: {} Hz", input.sample_rate());
    println!("---");

    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        // Drain each second
        let samples = buffer
            .lock()
            .map(|mut buf| std::mem::take(&mut *buf))
            .unwrap_or_default();
        let energy = calculate_rms(&samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        // Visual meter
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
    }

    input.close();

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: pactl info | grep 'Default Source'");
    println!("  3. Try: pavucontrol (to check levels)");

    Ok(())
}

/// Calculate RMS energy
#[allow(clippy::cast_precision_loss)]
fn calculate_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// Test speaker output with a sine wave split into back-to-back chunks
#[allow(clippy::future_not_send)]
async fn test_speaker(config: &Config) -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let sample_rate = config.audio.output_sample_rate;
    let output = CpalOutput::new(sample_rate)?;
    let mut scheduler = PlaybackScheduler::new(Box::new(output));

    let frequency = 440.0_f32;
    let chunk_len = (sample_rate / 10) as usize;

    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..sample_rate as usize * 2)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3 // 30% volume
        })
        .collect();

    println!(
        "Scheduling {} samples at {} Hz in {} chunks...",
        samples.len(),
        sample_rate,
        samples.len().div_ceil(chunk_len)
    );

    let mut end = 0.0;
    for chunk in samples.chunks(chunk_len) {
        let chunk = PlaybackChunk::new(chunk.to_vec(), 1, sample_rate);
        end = scheduler.schedule(&chunk)? + chunk.duration_secs;
    }

    let remaining = (end - scheduler.current_time()).max(0.0) + 0.2;
    tokio::time::sleep(Duration::from_secs_f64(remaining)).await;
    scheduler.close();

    println!("\n---");
    println!("If you heard a steady tone, your speakers are working!");
    println!("Clicks between chunks mean playback is not gapless.");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Try: pavucontrol (to check output levels)");

    Ok(())
}
