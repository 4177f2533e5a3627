//! Server-push channel and its event envelope.

mod channel;
mod events;

pub use channel::{
    close_sink, ChannelError, ChannelStream, EventSink, SseChannel, DEFAULT_HEARTBEAT_SECS,
};
pub use events::StreamEvent;
