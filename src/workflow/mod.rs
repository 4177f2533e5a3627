//! The propose / respond / commit state machine.
//!
//! ```text
//!            bind                    artifact ready
//!   Idle ------------> Generating ------------------> Presented
//!    ^                     |                            |   |
//!    +---- failure --------+        reject (count += 1) |   | accept
//!                          ^----------------------------+   v
//!                                                       Committing --ok--> Committed
//!                                                           |
//!                                   commit failure ---------+--> Presented
//! ```
//!
//! Handlers never block on generation: `bind` and `respond(reject)` move the
//! session into `Generating` under the entry lock and spawn the step. Every
//! step re-reads the session after each await instead of trusting a snapshot
//! taken before it, and pushes events through the store so they reach
//! whichever channel is bound at that moment.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use uuid::Uuid;

use crate::artifact::Artifact;
use crate::error::{CoachError, Result};
use crate::generator::{ChunkSink, ContentGenerator, GenerationContext, REJECTION_PREFIX};
use crate::journal::{ArtifactCommitter, HistorySource};
use crate::session::{
    ConversationTurn, OwnerId, ResponseKind, Session, SessionStore, WorkflowState,
};
use crate::settings::RepcoachSettings;
use crate::stream::{ChannelStream, EventSink, SseChannel, StreamEvent, DEFAULT_HEARTBEAT_SECS};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkflowConfig {
    /// Records fetched from the history source per generation
    pub history_limit: usize,
    /// Rejections allowed per session; `None` is unlimited
    pub max_regenerations: Option<u32>,
    /// Upper bound on one generation call; `None` waits indefinitely
    pub generation_timeout: Option<Duration>,
    /// Interval between `ping` events
    pub heartbeat: Duration,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            history_limit: 5,
            max_regenerations: None,
            generation_timeout: None,
            heartbeat: Duration::from_secs(DEFAULT_HEARTBEAT_SECS),
        }
    }
}

impl WorkflowConfig {
    pub fn from_settings(settings: &RepcoachSettings) -> Self {
        Self {
            history_limit: settings.generation.history_limit,
            max_regenerations: settings.sessions.regeneration_limit(),
            generation_timeout: settings.generation.timeout(),
            heartbeat: settings.sessions.heartbeat(),
        }
    }
}

/// Result of a successful respond call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RespondOutcome {
    /// A new generation step was started
    Regenerating { regeneration_count: u32 },
    /// The artifact was persisted under `id`
    Committed { id: i64 },
}

/// What a fresh binding needs to catch up on.
enum CatchUp {
    Generate,
    Artifact(Artifact, u32),
    Saved(i64),
    Nothing,
}

/// Ties the session store, the generator and the external collaborators
/// together. Cheap to clone; all state lives behind `Arc`s.
#[derive(Clone)]
pub struct GenerationWorkflow {
    store: Arc<SessionStore>,
    generator: Arc<ContentGenerator>,
    history: Arc<dyn HistorySource>,
    committer: Arc<dyn ArtifactCommitter>,
    config: WorkflowConfig,
}

impl GenerationWorkflow {
    pub fn new(
        store: Arc<SessionStore>,
        generator: Arc<ContentGenerator>,
        history: Arc<dyn HistorySource>,
        committer: Arc<dyn ArtifactCommitter>,
        config: WorkflowConfig,
    ) -> Self {
        Self {
            store,
            generator,
            history,
            committer,
            config,
        }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn config(&self) -> WorkflowConfig {
        self.config
    }

    /// Check that `id` exists and belongs to `owner_id`, without touching it.
    pub fn authorize(&self, id: &str, owner_id: OwnerId) -> Result<Session> {
        let session = self
            .store
            .peek(id)
            .ok_or_else(|| CoachError::NotFound(id.to_string()))?;
        if session.owner_id != owner_id {
            tracing::warn!(
                "Owner {} denied access to session {} (owned by {})",
                owner_id,
                id,
                session.owner_id
            );
            return Err(CoachError::Forbidden(id.to_string()));
        }
        Ok(session)
    }

    /// Create a session for `owner_id`, optionally seeded with a goal.
    pub fn start(&self, owner_id: OwnerId, goal: Option<&str>) -> Result<Session> {
        let seed = goal
            .map(str::trim)
            .filter(|goal| !goal.is_empty())
            .map(|goal| vec![ConversationTurn::user(goal)])
            .unwrap_or_default();
        self.store.create(Uuid::new_v4().to_string(), owner_id, seed)
    }

    /// Owner-checked snapshot; counts as activity.
    pub fn snapshot(&self, id: &str, owner_id: OwnerId) -> Result<Session> {
        self.authorize(id, owner_id)?;
        self.store.get(id)
    }

    /// Owner-checked deletion. Closes any bound channel.
    pub fn delete(&self, id: &str, owner_id: OwnerId) -> Result<()> {
        self.authorize(id, owner_id)?;
        self.store.delete(id);
        Ok(())
    }

    /// Open an SSE channel for the session and bind it.
    ///
    /// Dropping the returned stream unbinds the channel; the session and any
    /// in-flight step are unaffected.
    pub fn bind(&self, id: &str, owner_id: OwnerId) -> Result<ChannelStream> {
        self.authorize(id, owner_id)?;

        let (channel, rx) = SseChannel::open(id);
        self.attach(id, channel.clone())?;
        channel.spawn_heartbeat(self.config.heartbeat);

        let store = Arc::downgrade(&self.store);
        let session_id = id.to_string();
        let channel_id = channel.id().to_string();
        Ok(ChannelStream::new(rx, move || {
            if let Some(store) = store.upgrade() {
                store.unbind_channel(&session_id, &channel_id);
            }
        }))
    }

    /// Bind `sink` to the session and bring it up to date with the session's
    /// state. An idle session starts its first generation here.
    pub(crate) fn attach(&self, id: &str, sink: Arc<dyn EventSink>) -> Result<()> {
        self.store.bind_channel(id, sink.clone())?;
        sink.send(StreamEvent::Connected {
            session_id: id.to_string(),
        });

        let catch_up = self
            .store
            .mutate(id, |session| match session.state {
                WorkflowState::Idle => {
                    session.state = WorkflowState::Generating;
                    CatchUp::Generate
                }
                WorkflowState::Presented => match &session.current_artifact {
                    Some(artifact) => {
                        CatchUp::Artifact(artifact.clone(), session.regeneration_count)
                    }
                    None => CatchUp::Nothing,
                },
                WorkflowState::Committed => match session.committed_id {
                    Some(committed) => CatchUp::Saved(committed),
                    None => CatchUp::Nothing,
                },
                WorkflowState::Generating | WorkflowState::Committing => CatchUp::Nothing,
            })
            .ok_or_else(|| CoachError::NotFound(id.to_string()))?;

        match catch_up {
            CatchUp::Generate => self.spawn_generation(id),
            CatchUp::Artifact(artifact, regeneration_count) => {
                sink.send(StreamEvent::Artifact {
                    artifact,
                    regeneration_count,
                });
            }
            CatchUp::Saved(committed) => {
                sink.send(StreamEvent::Saved { id: committed });
                self.store.close_channel(id);
            }
            CatchUp::Nothing => {}
        }
        Ok(())
    }

    /// Apply the client's answer to the presented artifact.
    pub async fn respond(
        &self,
        id: &str,
        owner_id: OwnerId,
        response: ResponseKind,
    ) -> Result<RespondOutcome> {
        self.authorize(id, owner_id)?;
        let limit = self.config.max_regenerations;

        let claimed = self
            .store
            .mutate(id, |session| claim_response(session, response, limit))
            .ok_or_else(|| CoachError::NotFound(id.to_string()))??;

        match claimed {
            Claimed::Regenerate(regeneration_count) => {
                tracing::info!(
                    "Session {} rejected, regenerating (count {})",
                    id,
                    regeneration_count
                );
                self.spawn_generation(id);
                Ok(RespondOutcome::Regenerating { regeneration_count })
            }
            Claimed::Commit(artifact) => self.commit(id, owner_id, artifact).await,
        }
    }

    async fn commit(&self, id: &str, owner_id: OwnerId, artifact: Artifact) -> Result<RespondOutcome> {
        let result = self.committer.commit(owner_id, &artifact).await;

        match result {
            Ok(committed) => {
                let found = self.store.mutate(id, |session| {
                    session.committed_id = Some(committed);
                    session.state = WorkflowState::Committed;
                    session.pending_response = None;
                });
                if found.is_none() {
                    tracing::warn!("Session {} vanished while committing as {}", id, committed);
                }
                tracing::info!("Committed session {} as {}", id, committed);
                self.store.push(id, StreamEvent::Saved { id: committed });
                self.store.close_channel(id);
                Ok(RespondOutcome::Committed { id: committed })
            }
            Err(e) => {
                let err = CoachError::Commit(format!("{:#}", e));
                tracing::warn!("Commit failed for session {}: {}", id, err);
                self.store.mutate(id, |session| {
                    session.state = WorkflowState::Presented;
                    session.pending_response = None;
                });
                self.store.push(id, StreamEvent::error(err.to_string(), err.code()));
                Err(err)
            }
        }
    }

    fn spawn_generation(&self, id: &str) {
        let workflow = self.clone();
        let id = id.to_string();
        tokio::spawn(async move { workflow.run_generation(&id).await });
    }

    /// One generation step. The session must already be in `Generating`.
    async fn run_generation(&self, id: &str) {
        let Some((owner_id, attempt)) = self.store.mutate(id, |session| {
            session.pending_response = None;
            (session.owner_id, session.regeneration_count)
        }) else {
            tracing::debug!("Session {} gone before generation started", id);
            return;
        };

        tracing::info!("Generating artifact for session {} (attempt {})", id, attempt);
        self.store.push(id, StreamEvent::Generating { attempt });

        match self.produce(id, owner_id).await {
            Ok(artifact) => {
                let presented = self.store.mutate(id, |session| {
                    session
                        .history
                        .push(ConversationTurn::assistant(artifact.summary()));
                    session.current_artifact = Some(artifact.clone());
                    session.state = WorkflowState::Presented;
                    session.regeneration_count
                });
                let Some(regeneration_count) = presented else {
                    tracing::debug!("Session {} deleted during generation", id);
                    return;
                };
                self.store.push(
                    id,
                    StreamEvent::Artifact {
                        artifact,
                        regeneration_count,
                    },
                );
                self.store.push(id, StreamEvent::Complete);
            }
            Err(err) => {
                tracing::warn!("Generation failed for session {}: {}", id, err);
                self.store.mutate(id, |session| {
                    session.state = if session.current_artifact.is_some() {
                        WorkflowState::Presented
                    } else {
                        WorkflowState::Idle
                    };
                });
                self.store.push(id, StreamEvent::error(err.to_string(), err.code()));
            }
        }
    }

    /// Fetch context and generate, mapping every failure to `Generation`.
    async fn produce(&self, id: &str, owner_id: OwnerId) -> Result<Artifact> {
        let records = self
            .history
            .recent(owner_id, self.config.history_limit)
            .await
            .map_err(|e| CoachError::Generation(format!("failed to load history: {:#}", e)))?;

        let conversation = self
            .store
            .peek(id)
            .map(|session| session.history)
            .ok_or_else(|| CoachError::NotFound(id.to_string()))?;
        let context = GenerationContext::new(records, conversation);

        let store = self.store.clone();
        let session_id = id.to_string();
        let chunks = ChunkSink::new(move |chunk| {
            store.push(
                &session_id,
                StreamEvent::Content {
                    chunk: chunk.to_string(),
                },
            );
        });

        let generation = self.generator.generate(&context, &chunks);
        let outcome = match self.config.generation_timeout {
            Some(limit) => tokio::time::timeout(limit, generation)
                .await
                .map_err(|_| CoachError::Generation(format!("timed out after {:?}", limit)))?,
            None => generation.await,
        };
        outcome.map_err(|e| CoachError::Generation(e.to_string()))
    }
}

enum Claimed {
    Regenerate(u32),
    Commit(Artifact),
}

/// Validate a response against the live session and claim it.
///
/// Runs under the entry lock, so two concurrent responds can never both
/// claim the same session.
fn claim_response(
    session: &mut Session,
    response: ResponseKind,
    limit: Option<u32>,
) -> Result<Claimed> {
    if let Some(committed) = session.committed_id {
        return Err(CoachError::Terminal(committed));
    }
    match session.state {
        WorkflowState::Generating => {
            return Err(CoachError::Conflict("generation in progress".to_string()))
        }
        WorkflowState::Committing => {
            return Err(CoachError::Conflict("commit in progress".to_string()))
        }
        _ => {}
    }
    if session.pending_response.is_some() {
        return Err(CoachError::Conflict("a response is already pending".to_string()));
    }

    match response {
        ResponseKind::Reject => {
            if let Some(max) = limit {
                if session.regeneration_count >= max {
                    return Err(CoachError::RegenerationLimit(max));
                }
            }
            let rejected = session
                .current_artifact
                .as_ref()
                .map(|artifact| format!("{} the proposal: {}", REJECTION_PREFIX, artifact.summary()))
                .unwrap_or_else(|| format!("{}; please try again", REJECTION_PREFIX));
            session.history.push(ConversationTurn::user(rejected));
            session.regeneration_count += 1;
            session.pending_response = Some(ResponseKind::Reject);
            session.state = WorkflowState::Generating;
            Ok(Claimed::Regenerate(session.regeneration_count))
        }
        ResponseKind::Accept => {
            let artifact = session
                .current_artifact
                .clone()
                .ok_or(CoachError::NoArtifact)?;
            session.pending_response = Some(ResponseKind::Accept);
            session.state = WorkflowState::Committing;
            Ok(Claimed::Commit(artifact))
        }
    }
}
