//! Streaming session management
//!
//! This module provides the `StreamingClient` abstraction that manages:
//! - The session state machine gating every user intent
//! - Audio capture, segmentation, and chunk transmission
//! - Dispatch of processed chunks into the live queue and assembly log
//! - Session statistics and status events

mod config;
mod session;
mod state;
mod stats;

pub use config::SessionConfig;
pub use session::StreamingClient;
pub use state::{SessionState, StateMachine};
pub use stats::SessionStats;
