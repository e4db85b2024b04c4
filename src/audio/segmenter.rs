use tracing::debug;

/// One fixed-duration slice of captured audio
#[derive(Debug, Clone)]
pub struct RawChunk {
    /// Raw samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Sequence number, strictly increasing from 1 within a session
    pub sequence: u64,
    /// Marks the last (possibly short) chunk of a session
    pub is_final: bool,
}

/// Splits a continuous sample stream into exact fixed-size chunks.
///
/// Capture callbacks deliver batches of arbitrary size; the segmenter keeps a
/// carry buffer so every non-terminal chunk holds exactly `chunk_size`
/// samples. Nothing is dropped and nothing is duplicated: the leftover tail
/// is emitted by `finalize` as one short terminal chunk.
pub struct ChunkSegmenter {
    chunk_size: usize,
    carry: Vec<i16>,
    next_sequence: u64,
}

impl ChunkSegmenter {
    /// Create a segmenter for a session with the given target chunk size.
    ///
    /// `chunk_size` must be non-zero; it is fixed for the segmenter lifetime.
    pub fn new(chunk_size: usize) -> Self {
        assert!(chunk_size > 0, "chunk size must be non-zero");
        Self {
            chunk_size,
            carry: Vec::with_capacity(chunk_size),
            next_sequence: 1,
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Number of buffered samples not yet emitted as a chunk
    pub fn pending_samples(&self) -> usize {
        self.carry.len()
    }

    /// Append a batch of samples and emit every chunk that became complete.
    pub fn feed(&mut self, samples: &[i16]) -> Vec<RawChunk> {
        self.carry.extend_from_slice(samples);

        let mut chunks = Vec::new();
        while self.carry.len() >= self.chunk_size {
            let rest = self.carry.split_off(self.chunk_size);
            let full = std::mem::replace(&mut self.carry, rest);

            chunks.push(RawChunk {
                samples: full,
                sequence: self.take_sequence(),
                is_final: false,
            });
        }

        if !chunks.is_empty() {
            debug!(
                "Segmenter emitted {} chunk(s), {} samples carried over",
                chunks.len(),
                self.carry.len()
            );
        }

        chunks
    }

    /// Flush the carry buffer as the terminal chunk of the session.
    ///
    /// Returns `None` when no samples remain; a zero-length terminal chunk is
    /// suppressed rather than emitted. The sequence counter keeps running so
    /// it only resets when a new session builds a fresh segmenter.
    pub fn finalize(&mut self) -> Option<RawChunk> {
        if self.carry.is_empty() {
            return None;
        }

        let samples = std::mem::take(&mut self.carry);
        debug!("Segmenter finalized with {} trailing samples", samples.len());

        Some(RawChunk {
            samples,
            sequence: self.take_sequence(),
            is_final: true,
        })
    }

    fn take_sequence(&mut self) -> u64 {
        let seq = self.next_sequence;
        self.next_sequence += 1;
        seq
    }
}
