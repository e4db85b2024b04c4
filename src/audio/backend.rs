use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::info;

/// Configuration for audio capture
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels (1 = mono, 2 = stereo)
    pub channels: u16,
    /// Size of each delivered batch in milliseconds (affects latency)
    pub batch_duration_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000, // 16kHz, matches the remote processor
            channels: 1,        // Mono
            batch_duration_ms: 100,
        }
    }
}

/// Audio capture backend trait
///
/// Platform backends (microphone, system audio) live behind this trait; the
/// pipeline only sees batches of float samples in [-1.0, 1.0]. Batch sizes
/// are whatever the device callback delivers and carry no chunk alignment.
#[async_trait::async_trait]
pub trait CaptureBackend: Send + Sync {
    /// Start capturing audio
    ///
    /// Returns a channel receiver that will receive sample batches
    async fn start(&mut self) -> Result<mpsc::Receiver<Vec<f32>>>;

    /// Stop capturing audio
    async fn stop(&mut self) -> Result<()>;

    /// Check if backend is currently capturing
    fn is_capturing(&self) -> bool;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

/// Audio playback sink trait
///
/// `play` renders one finite buffer and resolves only once the device has
/// finished with it, which is what lets the live playback loop sequence
/// chunks back to back without overlap.
#[async_trait::async_trait]
pub trait PlaybackSink: Send + Sync {
    /// Render a buffer of samples, returning after rendering completes
    async fn play(&self, samples: &[i16], sample_rate: u32) -> Result<()>;

    /// Get sink name for logging
    fn name(&self) -> &str;
}

/// Generate `duration_secs` of a sine tone as float samples in [-1.0, 1.0].
pub fn sine_samples(frequency_hz: f32, duration_secs: f32, sample_rate: u32) -> Vec<f32> {
    let total = (sample_rate as f32 * duration_secs) as usize;
    (0..total)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            (2.0 * std::f32::consts::PI * frequency_hz * t).sin() * 0.5
        })
        .collect()
}

/// Capture backend that synthesizes a sine tone at real-time pace.
///
/// Stands in for a microphone when exercising the full pipeline without
/// audio hardware.
pub struct ToneCapture {
    config: CaptureConfig,
    frequency_hz: f32,
    running: Arc<AtomicBool>,
}

impl ToneCapture {
    pub fn new(config: CaptureConfig, frequency_hz: f32) -> Self {
        Self {
            config,
            frequency_hz,
            running: Arc::new(AtomicBool::new(false)),
        }
    }
}

#[async_trait::async_trait]
impl CaptureBackend for ToneCapture {
    async fn start(&mut self) -> Result<mpsc::Receiver<Vec<f32>>> {
        let (tx, rx) = mpsc::channel(32);

        let running = Arc::clone(&self.running);
        running.store(true, Ordering::SeqCst);

        let sample_rate = self.config.sample_rate;
        let batch_ms = self.config.batch_duration_ms.max(1);
        let batch_samples = (sample_rate as u64 * batch_ms / 1000) as usize;
        let frequency = self.frequency_hz;

        info!(
            "Tone capture started: {}Hz tone, {}Hz sample rate, {}ms batches",
            frequency, sample_rate, batch_ms
        );

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(batch_ms));
            let mut position: u64 = 0;

            while running.load(Ordering::SeqCst) {
                interval.tick().await;

                let batch: Vec<f32> = (0..batch_samples)
                    .map(|i| {
                        let t = (position + i as u64) as f32 / sample_rate as f32;
                        (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.5
                    })
                    .collect();
                position += batch_samples as u64;

                if tx.send(batch).await.is_err() {
                    break;
                }
            }
        });

        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "tone-capture"
    }
}

/// Playback sink that renders to nowhere, pacing itself in real time.
///
/// Sleeps for the duration of each buffer so the playback loop observes the
/// same completion timing a real output device would report.
pub struct NullSink;

#[async_trait::async_trait]
impl PlaybackSink for NullSink {
    async fn play(&self, samples: &[i16], sample_rate: u32) -> Result<()> {
        if sample_rate == 0 {
            anyhow::bail!("Cannot play audio with a zero sample rate");
        }
        let millis = samples.len() as u64 * 1000 / sample_rate as u64;
        tokio::time::sleep(Duration::from_millis(millis)).await;
        Ok(())
    }

    fn name(&self) -> &str {
        "null-sink"
    }
}
