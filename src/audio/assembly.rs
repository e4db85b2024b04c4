use anyhow::{bail, Context, Result};
use std::path::Path;
use tracing::info;

use super::wav;

/// Append-only log of every processed chunk returned by the remote end.
///
/// Chunks are stored as the WAV containers they arrived in, in arrival
/// order, for the lifetime of a session; the log is cleared only when a new
/// session starts. Live playback draining its own queue never touches this.
pub struct FinalAssembly {
    chunks: Vec<Vec<u8>>,
}

impl FinalAssembly {
    pub fn new() -> Self {
        Self { chunks: Vec::new() }
    }

    /// Record one processed chunk container.
    pub fn append(&mut self, chunk: Vec<u8>) {
        self.chunks.push(chunk);
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Drop all logged chunks (new session starting).
    pub fn clear(&mut self) {
        self.chunks.clear();
    }

    /// Concatenate every logged chunk into one mono 16-bit WAV container.
    pub fn assemble(&self, sample_rate: u32) -> Result<Vec<u8>> {
        if self.chunks.is_empty() {
            bail!("No processed audio to assemble");
        }

        let mut samples: Vec<i16> = Vec::new();
        for (i, chunk) in self.chunks.iter().enumerate() {
            let decoded = wav::decode(chunk)
                .with_context(|| format!("Failed to decode processed chunk {}", i + 1))?;
            samples.extend_from_slice(&decoded.samples);
        }

        info!(
            "Assembled {} chunks into {} samples ({:.1}s at {}Hz)",
            self.chunks.len(),
            samples.len(),
            samples.len() as f64 / sample_rate as f64,
            sample_rate
        );

        wav::encode_i16(&samples, sample_rate, 1)
    }

    /// Assemble and write the final artifact to `path`.
    pub fn save(&self, path: impl AsRef<Path>, sample_rate: u32) -> Result<()> {
        let path = path.as_ref();
        let bytes = self.assemble(sample_rate)?;

        std::fs::write(path, &bytes)
            .with_context(|| format!("Failed to write final audio to {}", path.display()))?;

        info!("Final audio saved: {} ({} bytes)", path.display(), bytes.len());
        Ok(())
    }
}

impl Default for FinalAssembly {
    fn default() -> Self {
        Self::new()
    }
}

/// Timestamped default filename for the saved artifact.
pub fn suggested_filename() -> String {
    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    format!("processed_audio_{}.wav", timestamp)
}
