use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use calmwave_stream::audio::{self, CaptureConfig, NullSink, ToneCapture};
use calmwave_stream::{events, ClientEvent, Config, SessionConfig, StreamingClient};

#[derive(Parser)]
#[command(name = "calmwave-stream", about = "Real-time audio streaming client")]
struct Cli {
    /// Path to the configuration file (without extension)
    #[arg(long, default_value = "config/calmwave-stream")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Connect and stream a test tone, then save the processed result
    Stream {
        /// WebSocket endpoint (overrides the config file)
        #[arg(long)]
        url: Option<String>,

        /// How long to record before stopping
        #[arg(long, default_value_t = 15)]
        seconds: u64,

        /// Where to write the final artifact (defaults to a timestamped
        /// file in the configured recordings directory)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Play processed chunks live as they arrive
        #[arg(long)]
        live: bool,
    },
    /// Send a ping and wait for the pong
    Ping {
        /// WebSocket endpoint (overrides the config file)
        #[arg(long)]
        url: Option<String>,
    },
    /// Generate a test tone and verify the WAV container round trip
    CheckWav,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;

    match cli.command {
        Command::Stream {
            url,
            seconds,
            output,
            live,
        } => stream(cfg, url, seconds, output, live).await,
        Command::Ping { url } => ping(cfg, url).await,
        Command::CheckWav => check_wav(&cfg),
    }
}

fn session_config(cfg: &Config, url: Option<String>) -> SessionConfig {
    SessionConfig {
        server_url: url.unwrap_or_else(|| cfg.server.url.clone()),
        sample_rate: cfg.audio.sample_rate,
        channels: cfg.audio.channels,
        chunk_duration: Duration::from_secs_f64(cfg.audio.chunk_duration_secs),
    }
}

/// Log status events as they arrive so progress is visible on the console.
fn spawn_event_logger(mut rx: events::EventReceiver) {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                ClientEvent::StateChanged(state) => info!("State: {}", state),
                ClientEvent::SessionStarted { session_id } => {
                    info!("Session acknowledged: {}", session_id)
                }
                ClientEvent::ChunkSent {
                    sequence,
                    bytes,
                    is_final,
                } => info!("Chunk {} sent ({} bytes, final={})", sequence, bytes, is_final),
                ClientEvent::ChunkProcessed { index, bytes } => {
                    info!("Chunk {} processed ({} bytes)", index, bytes)
                }
                ClientEvent::ServerError { message } => warn!("Server error: {}", message),
                ClientEvent::Pong => info!("Pong"),
                ClientEvent::LivePlayback { active } => info!("Live playback active: {}", active),
                ClientEvent::Disconnected { reason } => warn!("Disconnected: {}", reason),
                ClientEvent::Log { message } => info!("{}", message),
            }
        }
    });
}

async fn stream(
    cfg: Config,
    url: Option<String>,
    seconds: u64,
    output: Option<PathBuf>,
    live: bool,
) -> Result<()> {
    let session_config = session_config(&cfg, url);
    let capture_config = CaptureConfig {
        sample_rate: session_config.sample_rate,
        channels: session_config.channels,
        batch_duration_ms: 100,
    };

    let (events_tx, events_rx) = events::channel();
    spawn_event_logger(events_rx);

    let client = Arc::new(StreamingClient::new(session_config, events_tx));
    client.connect().await?;

    client
        .start_recording(Box::new(ToneCapture::new(capture_config, 440.0)))
        .await?;

    if live {
        client.start_live_playback(Arc::new(NullSink)).await;
    }

    info!("Recording for {}s...", seconds);
    tokio::time::sleep(Duration::from_secs(seconds)).await;

    client.stop_recording().await?;

    // Give the server a moment to return the trailing chunks.
    tokio::time::sleep(Duration::from_secs(2)).await;

    let output = match output {
        Some(path) => path,
        None => {
            let dir = PathBuf::from(&cfg.output.recordings_path);
            std::fs::create_dir_all(&dir)?;
            dir.join(audio::suggested_filename())
        }
    };

    match client.save_final(Some(output)).await {
        Ok(path) => info!("Final audio saved to {}", path.display()),
        Err(e) => warn!("No final audio saved: {:#}", e),
    }

    client.stop_live_playback().await;
    client.disconnect().await?;

    let stats = client.stats().await;
    info!(
        "Done: {} chunks sent, {} processed",
        stats.chunks_sent, stats.chunks_processed
    );

    Ok(())
}

async fn ping(cfg: Config, url: Option<String>) -> Result<()> {
    let (events_tx, mut events_rx) = events::channel();

    let client = Arc::new(StreamingClient::new(session_config(&cfg, url), events_tx));
    client.connect().await?;
    client.ping().await?;

    let deadline = tokio::time::sleep(Duration::from_secs(5));
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            event = events_rx.recv() => match event {
                Some(ClientEvent::Pong) => {
                    info!("Pong received");
                    break;
                }
                Some(_) => continue,
                None => bail!("Event channel closed before pong"),
            },
            _ = &mut deadline => bail!("No pong within 5s"),
        }
    }

    client.disconnect().await?;
    Ok(())
}

/// Container self-test: one second of a 440Hz tone, encoded, structurally
/// validated, and decoded back.
fn check_wav(cfg: &Config) -> Result<()> {
    let sample_rate = cfg.audio.sample_rate;
    info!("Testing WAV container generation at {}Hz...", sample_rate);

    let tone = audio::sine_samples(440.0, 1.0, sample_rate);
    let bytes = audio::encode_f32(&tone, sample_rate, 1)?;

    let has_riff = bytes.starts_with(b"RIFF");
    let has_wave = bytes.len() >= 12 && &bytes[8..12] == b"WAVE";
    let has_fmt = bytes.windows(4).take(100).any(|w| w == b"fmt ");
    let has_data = bytes.windows(4).any(|w| w == b"data");

    info!("Size: {} bytes", bytes.len());
    info!("RIFF header: {}", if has_riff { "ok" } else { "MISSING" });
    info!("WAVE format: {}", if has_wave { "ok" } else { "MISSING" });
    info!("fmt chunk: {}", if has_fmt { "ok" } else { "MISSING" });
    info!("data chunk: {}", if has_data { "ok" } else { "MISSING" });

    if !(has_riff && has_wave && has_fmt && has_data) {
        bail!("Generated WAV container is structurally invalid");
    }

    let decoded = audio::decode(&bytes)?;
    if decoded.samples.len() != tone.len() {
        bail!(
            "Round trip lost samples: {} in, {} out",
            tone.len(),
            decoded.samples.len()
        );
    }
    if decoded.sample_rate != sample_rate {
        bail!(
            "Round trip changed sample rate: {} in, {} out",
            sample_rate,
            decoded.sample_rate
        );
    }

    info!(
        "WAV round trip ok: {} samples, {:.1}s",
        decoded.samples.len(),
        decoded.duration_seconds()
    );

    Ok(())
}
