pub mod audio;
pub mod config;
pub mod events;
pub mod session;
pub mod ws;

pub use audio::{
    CaptureBackend, CaptureConfig, ChunkSegmenter, DecodedAudio, EncodedChunk, FinalAssembly,
    LivePlayer, NullSink, PlaybackQueue, PlaybackSink, RawChunk, ToneCapture,
};
pub use config::Config;
pub use events::{ClientEvent, EventReceiver, EventSender};
pub use session::{SessionConfig, SessionState, SessionStats, StreamingClient};
pub use ws::{InboundMessage, OutboundMessage, TransportEvent, WsClient};
