pub mod client;
pub mod messages;

pub use client::{TransportEvent, WsClient};
pub use messages::{InboundMessage, OutboundMessage};
