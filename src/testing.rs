//! Test doubles shared by the unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::artifact::Artifact;
use crate::generator::{ChunkSink, CompletionClient, CompletionRequest};
use crate::journal::{ArtifactCommitter, HistoryRecord, HistorySource};
use crate::session::OwnerId;
use crate::stream::{ChannelError, EventSink, StreamEvent};

/// Sink that records everything pushed to it.
pub struct RecordingSink {
    id: String,
    events: Mutex<Vec<StreamEvent>>,
    closed: AtomicBool,
    close_calls: AtomicUsize,
    fail_close: bool,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Self::build(false)
    }

    /// A sink whose `close` reports a transport error.
    pub fn failing_close() -> Arc<Self> {
        Self::build(true)
    }

    fn build(fail_close: bool) -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4().to_string(),
            events: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            close_calls: AtomicUsize::new(0),
            fail_close,
        })
    }

    pub fn events(&self) -> Vec<StreamEvent> {
        self.events.lock().clone()
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(StreamEvent::kind).collect()
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }
}

impl EventSink for RecordingSink {
    fn id(&self) -> &str {
        &self.id
    }

    fn send(&self, event: StreamEvent) -> bool {
        if self.closed.load(Ordering::SeqCst) {
            return false;
        }
        self.events.lock().push(event);
        true
    }

    fn close(&self) -> Result<(), ChannelError> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(ChannelError::AlreadyClosed);
        }
        if self.fail_close {
            return Err(ChannelError::Transport("socket reset".to_string()));
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Completion client that replays scripted responses in order.
pub struct ScriptedClient {
    responses: Mutex<VecDeque<anyhow::Result<String>>>,
    prompts: Mutex<Vec<String>>,
    delay: Option<Duration>,
}

impl ScriptedClient {
    pub fn new(responses: Vec<anyhow::Result<String>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            prompts: Mutex::new(Vec::new()),
            delay: None,
        })
    }

    pub fn replying(responses: &[&str]) -> Arc<Self> {
        Self::new(responses.iter().map(|r| Ok(r.to_string())).collect())
    }

    pub fn with_delay(responses: &[&str], delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.iter().map(|r| Ok(r.to_string())).collect()),
            prompts: Mutex::new(Vec::new()),
            delay: Some(delay),
        })
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl CompletionClient for ScriptedClient {
    async fn complete(
        &self,
        request: &CompletionRequest,
        chunks: &ChunkSink,
    ) -> anyhow::Result<String> {
        self.prompts.lock().push(request.prompt.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self
            .responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(anyhow::anyhow!("script exhausted")));
        if let Ok(text) = &next {
            chunks.send(text);
        }
        next
    }

    fn backend_name(&self) -> &'static str {
        "scripted"
    }
}

/// History source returning a fixed set of records.
pub struct StaticHistory {
    records: Vec<HistoryRecord>,
    fail: bool,
}

impl StaticHistory {
    pub fn empty() -> Arc<Self> {
        Arc::new(Self {
            records: Vec::new(),
            fail: false,
        })
    }

    pub fn with(records: Vec<HistoryRecord>) -> Arc<Self> {
        Arc::new(Self {
            records,
            fail: false,
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            records: Vec::new(),
            fail: true,
        })
    }
}

#[async_trait]
impl HistorySource for StaticHistory {
    async fn recent(&self, _owner_id: OwnerId, limit: usize) -> anyhow::Result<Vec<HistoryRecord>> {
        if self.fail {
            anyhow::bail!("history store unavailable");
        }
        Ok(self.records.iter().take(limit).cloned().collect())
    }
}

/// Committer that records every call and hands out sequential ids.
pub struct RecordingCommitter {
    calls: Mutex<Vec<(OwnerId, Artifact)>>,
    next_id: AtomicI64,
    failures_left: AtomicUsize,
    delay: Option<Duration>,
}

impl RecordingCommitter {
    pub fn new() -> Arc<Self> {
        Self::build(0, None)
    }

    /// Fail the first `n` commits.
    pub fn failing(n: usize) -> Arc<Self> {
        Self::build(n, None)
    }

    pub fn slow(delay: Duration) -> Arc<Self> {
        Self::build(0, Some(delay))
    }

    fn build(failures: usize, delay: Option<Duration>) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            next_id: AtomicI64::new(100),
            failures_left: AtomicUsize::new(failures),
            delay,
        })
    }

    pub fn calls(&self) -> Vec<(OwnerId, Artifact)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl ArtifactCommitter for RecordingCommitter {
    async fn commit(&self, owner_id: OwnerId, artifact: &Artifact) -> anyhow::Result<i64> {
        self.calls.lock().push((owner_id, artifact.clone()));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let remaining = self.failures_left.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_left.store(remaining - 1, Ordering::SeqCst);
            anyhow::bail!("database unavailable");
        }
        Ok(self.next_id.fetch_add(1, Ordering::SeqCst))
    }
}
