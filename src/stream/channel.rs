//! Push channel bound to a session.
//!
//! The workflow only ever sees the [`EventSink`] trait. The production sink is
//! [`SseChannel`], an unbounded mpsc sender whose receiver is turned into the
//! SSE response body by [`ChannelStream`].
//!
//! # Lifecycle
//!
//! ```text
//! open() -> (SseChannel, receiver)
//!    |            |
//!    |            +--> ChannelStream (response body, runs on_close when dropped)
//!    +--> bound to session, heartbeat task started
//!
//! close() -> sender dropped, heartbeat stopped, receiver drains and ends
//! ```

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::Stream;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::events::StreamEvent;

/// Heartbeat interval for bound channels - 30 seconds (default)
pub const DEFAULT_HEARTBEAT_SECS: u64 = 30;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("channel already closed")]
    AlreadyClosed,

    #[error("transport error: {0}")]
    Transport(String),
}

/// Push-only sink bound to at most one session.
pub trait EventSink: Send + Sync {
    /// Unique channel identifier, used to tell bindings apart.
    fn id(&self) -> &str;

    /// Push one event. Returns `false` if the remote side is gone; writes after
    /// close are dropped silently.
    fn send(&self, event: StreamEvent) -> bool;

    /// Close the transport.
    fn close(&self) -> Result<(), ChannelError>;

    fn is_closed(&self) -> bool;
}

/// Close a sink, treating "already closed" as success.
///
/// Returns `true` if this call performed the close. Transport errors are
/// logged, never propagated: the remote side is already unreachable.
pub fn close_sink(sink: &dyn EventSink) -> bool {
    if sink.is_closed() {
        return false;
    }
    match sink.close() {
        Ok(()) => true,
        Err(ChannelError::AlreadyClosed) => false,
        Err(e) => {
            tracing::warn!("Error closing channel {}: {}", sink.id(), e);
            true
        }
    }
}

/// SSE-backed channel.
pub struct SseChannel {
    id: String,
    session_id: String,
    tx: Mutex<Option<mpsc::UnboundedSender<StreamEvent>>>,
    closed: AtomicBool,
    cancel: CancellationToken,
}

impl SseChannel {
    /// Open a channel for `session_id`, returning the sink and its receiving end.
    pub fn open(
        session_id: impl Into<String>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<StreamEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let channel = Arc::new(Self {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            tx: Mutex::new(Some(tx)),
            closed: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        });
        (channel, rx)
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Emit `ping` every `interval` until the channel closes.
    pub fn spawn_heartbeat(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let channel = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if !channel.send(StreamEvent::Ping) {
                            break;
                        }
                    }
                    _ = channel.cancel.cancelled() => break,
                }
            }
            tracing::debug!("Heartbeat stopped for channel {}", channel.id);
        })
    }
}

impl EventSink for SseChannel {
    fn id(&self) -> &str {
        &self.id
    }

    fn send(&self, event: StreamEvent) -> bool {
        if self.closed.load(Ordering::SeqCst) {
            tracing::debug!(
                "Dropping {} event for closed channel {}",
                event.kind(),
                self.id
            );
            return false;
        }

        let guard = self.tx.lock();
        let Some(tx) = guard.as_ref() else {
            return false;
        };
        if tx.send(event).is_err() {
            // Receiver dropped: the client went away
            drop(guard);
            self.closed.store(true, Ordering::SeqCst);
            self.cancel.cancel();
            return false;
        }
        true
    }

    fn close(&self) -> Result<(), ChannelError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(ChannelError::AlreadyClosed);
        }
        self.tx.lock().take();
        self.cancel.cancel();
        tracing::debug!(
            "Closed channel {} for session {}",
            self.id,
            self.session_id
        );
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Receiving half of a channel, used as the SSE response body.
///
/// Dropping it (the transport closed) runs the `on_close` hook exactly once.
pub struct ChannelStream {
    inner: UnboundedReceiverStream<StreamEvent>,
    on_close: Option<Box<dyn FnOnce() + Send>>,
}

impl ChannelStream {
    pub fn new(
        rx: mpsc::UnboundedReceiver<StreamEvent>,
        on_close: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            inner: UnboundedReceiverStream::new(rx),
            on_close: Some(Box::new(on_close)),
        }
    }
}

impl Stream for ChannelStream {
    type Item = StreamEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

impl Drop for ChannelStream {
    fn drop(&mut self) {
        if let Some(on_close) = self.on_close.take() {
            on_close();
        }
    }
}
