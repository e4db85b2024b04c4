pub mod assembly;
pub mod backend;
pub mod playback;
pub mod segmenter;
pub mod wav;

pub use assembly::{suggested_filename, FinalAssembly};
pub use backend::{sine_samples, CaptureBackend, CaptureConfig, NullSink, PlaybackSink, ToneCapture};
pub use playback::{LivePlayer, PlaybackQueue};
pub use segmenter::{ChunkSegmenter, RawChunk};
pub use wav::{decode, encode_chunk, encode_f32, encode_i16, f32_to_i16, DecodedAudio, EncodedChunk};
