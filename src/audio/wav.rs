use anyhow::{bail, Context, Result};
use std::io::Cursor;

use super::segmenter::RawChunk;

/// Smallest byte size of a valid WAV container (RIFF header + fmt + data).
pub const MIN_WAV_LEN: usize = 44;

/// Bit depth used for every container produced by this crate.
pub const BITS_PER_SAMPLE: u16 = 16;

/// Decoded contents of a WAV container
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    /// Raw samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
}

impl DecodedAudio {
    pub fn duration_seconds(&self) -> f64 {
        self.samples.len() as f64 / (self.sample_rate as f64 * self.channels as f64)
    }
}

/// Encode i16 PCM samples into a complete, self-describing WAV container.
pub fn encode_i16(samples: &[i16], sample_rate: u32, channels: u16) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: BITS_PER_SAMPLE,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .context("Failed to create WAV writer")?;
        for &sample in samples {
            writer
                .write_sample(sample)
                .context("Failed to write sample to WAV buffer")?;
        }
        writer.finalize().context("Failed to finalize WAV buffer")?;
    }

    let bytes = cursor.into_inner();
    if bytes.len() < MIN_WAV_LEN {
        bail!(
            "Encoded WAV is too small to be valid: {} bytes (minimum {})",
            bytes.len(),
            MIN_WAV_LEN
        );
    }

    Ok(bytes)
}

/// Encode f32 samples in [-1.0, 1.0] into a WAV container.
///
/// Values outside the range are clamped before scaling so extremes cannot
/// wrap around in i16 space.
pub fn encode_f32(samples: &[f32], sample_rate: u32, channels: u16) -> Result<Vec<u8>> {
    let converted = f32_to_i16(samples);
    encode_i16(&converted, sample_rate, channels)
}

/// Convert float samples in [-1.0, 1.0] to i16 PCM (clamp, scale, round).
pub fn f32_to_i16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| (s.clamp(-1.0, 1.0) * 32767.0).round() as i16)
        .collect()
}

/// A containerized chunk plus the session metadata the wire format needs.
///
/// Immutable once built; ownership moves to the transport for exactly one
/// outbound send.
#[derive(Debug, Clone)]
pub struct EncodedChunk {
    /// Complete WAV container bytes
    pub data: Vec<u8>,
    pub sequence: u64,
    pub is_final: bool,
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
}

/// Containerize one raw chunk, consuming it.
pub fn encode_chunk(chunk: RawChunk, sample_rate: u32, channels: u16) -> Result<EncodedChunk> {
    let data = encode_i16(&chunk.samples, sample_rate, channels)?;
    Ok(EncodedChunk {
        data,
        sequence: chunk.sequence,
        is_final: chunk.is_final,
        sample_rate,
        channels,
        bits_per_sample: BITS_PER_SAMPLE,
    })
}

/// Decode a WAV container back into its i16 samples.
///
/// Fails on a missing RIFF preamble or a sample width other than 16-bit;
/// a truncated sample stream fails as a whole rather than partially decoding.
pub fn decode(bytes: &[u8]) -> Result<DecodedAudio> {
    let reader = hound::WavReader::new(Cursor::new(bytes))
        .context("Not a valid WAV container")?;

    let spec = reader.spec();
    if spec.bits_per_sample != BITS_PER_SAMPLE || spec.sample_format != hound::SampleFormat::Int {
        bail!(
            "Unsupported WAV sample format: {}-bit {:?} (expected {}-bit Int)",
            spec.bits_per_sample,
            spec.sample_format,
            BITS_PER_SAMPLE
        );
    }

    let samples: Vec<i16> = reader
        .into_samples::<i16>()
        .collect::<Result<Vec<_>, _>>()
        .context("Failed to read WAV samples")?;

    Ok(DecodedAudio {
        samples,
        sample_rate: spec.sample_rate,
        channels: spec.channels,
    })
}
