//! Session state for one in-progress generation workflow.

use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::artifact::Artifact;
use crate::error::CoachError;
use crate::stream::EventSink;

/// Identifier of the principal owning a session.
pub type OwnerId = i64;

/// Where a session is in the propose / respond / commit cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    /// Created, nothing generated yet (or the first generation failed).
    #[default]
    Idle,
    /// A generation step is in flight.
    Generating,
    /// An artifact is on the table, waiting for accept or reject.
    Presented,
    /// Accepted; the persistence call is in flight.
    Committing,
    /// Persisted. Terminal.
    Committed,
}

/// The client's answer to a presented artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseKind {
    Accept,
    Reject,
}

impl FromStr for ResponseKind {
    type Err = CoachError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "accept" => Ok(ResponseKind::Accept),
            "reject" => Ok(ResponseKind::Reject),
            other => Err(CoachError::Validation(format!(
                "response must be 'accept' or 'reject', got '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    User,
    Assistant,
}

/// One entry of the advisory conversation log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: TurnRole,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            content: content.into(),
        }
    }
}

/// Server-side record of one generation workflow.
///
/// Snapshots handed out by the store are clones; the bound channel is shared
/// through an `Arc`, everything else is plain data.
#[derive(Clone)]
pub struct Session {
    pub id: String,
    pub owner_id: OwnerId,
    pub history: Vec<ConversationTurn>,
    pub current_artifact: Option<Artifact>,
    pub pending_response: Option<ResponseKind>,
    pub regeneration_count: u32,
    pub committed_id: Option<i64>,
    pub state: WorkflowState,
    pub created_at: DateTime<Utc>,
    pub last_activity: Instant,
    pub channel: Option<Arc<dyn EventSink>>,
}

impl Session {
    pub fn new(id: impl Into<String>, owner_id: OwnerId, seed: Vec<ConversationTurn>) -> Self {
        Self {
            id: id.into(),
            owner_id,
            history: seed,
            current_artifact: None,
            pending_response: None,
            regeneration_count: 0,
            committed_id: None,
            state: WorkflowState::Idle,
            created_at: Utc::now(),
            last_activity: Instant::now(),
            channel: None,
        }
    }

    /// A committed session accepts no further generation or commit.
    pub fn is_terminal(&self) -> bool {
        self.committed_id.is_some()
    }

    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_activity.elapsed()
    }

    pub fn is_idle(&self, timeout: Duration) -> bool {
        self.idle_for() > timeout
    }

    pub fn has_channel(&self) -> bool {
        self.channel.is_some()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("owner_id", &self.owner_id)
            .field("state", &self.state)
            .field("regeneration_count", &self.regeneration_count)
            .field("committed_id", &self.committed_id)
            .field("channel", &self.channel.as_ref().map(|c| c.id().to_string()))
            .finish_non_exhaustive()
    }
}

/// Field-level update merged into a session by [`SessionStore::update`].
///
/// `None` leaves a field untouched. `pending_response` is doubly optional so
/// that it can be cleared explicitly.
///
/// [`SessionStore::update`]: super::SessionStore::update
#[derive(Debug, Clone, Default)]
pub struct SessionPatch {
    pub current_artifact: Option<Artifact>,
    pub pending_response: Option<Option<ResponseKind>>,
    pub regeneration_count: Option<u32>,
    pub committed_id: Option<i64>,
    pub state: Option<WorkflowState>,
    pub append_turn: Option<ConversationTurn>,
}

impl SessionPatch {
    pub fn artifact(mut self, artifact: Artifact) -> Self {
        self.current_artifact = Some(artifact);
        self
    }

    pub fn pending(mut self, pending: Option<ResponseKind>) -> Self {
        self.pending_response = Some(pending);
        self
    }

    pub fn regeneration_count(mut self, count: u32) -> Self {
        self.regeneration_count = Some(count);
        self
    }

    pub fn committed(mut self, id: i64) -> Self {
        self.committed_id = Some(id);
        self
    }

    pub fn state(mut self, state: WorkflowState) -> Self {
        self.state = Some(state);
        self
    }

    pub fn turn(mut self, turn: ConversationTurn) -> Self {
        self.append_turn = Some(turn);
        self
    }

    pub(crate) fn apply(self, session: &mut Session) {
        if let Some(artifact) = self.current_artifact {
            session.current_artifact = Some(artifact);
        }
        if let Some(pending) = self.pending_response {
            session.pending_response = pending;
        }
        if let Some(count) = self.regeneration_count {
            session.regeneration_count = count;
        }
        if let Some(id) = self.committed_id {
            session.committed_id = Some(id);
        }
        if let Some(state) = self.state {
            session.state = state;
        }
        if let Some(turn) = self.append_turn {
            session.history.push(turn);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::ArtifactItem;

    #[test]
    fn new_session_starts_idle_and_empty() {
        let session = Session::new("s-1", 1, vec![]);
        assert_eq!(session.state, WorkflowState::Idle);
        assert_eq!(session.regeneration_count, 0);
        assert!(session.current_artifact.is_none());
        assert!(session.committed_id.is_none());
        assert!(!session.is_terminal());
        assert!(!session.has_channel());
    }

    #[test]
    fn response_kind_parses_case_insensitively() {
        assert_eq!("accept".parse::<ResponseKind>().unwrap(), ResponseKind::Accept);
        assert_eq!(" Reject ".parse::<ResponseKind>().unwrap(), ResponseKind::Reject);
        let err = "maybe".parse::<ResponseKind>().unwrap_err();
        assert!(matches!(err, CoachError::Validation(_)));
    }

    #[test]
    fn patch_replaces_artifact_wholesale() {
        let mut session = Session::new("s-1", 1, vec![]);
        session.current_artifact = Some(Artifact::new(vec![
            ArtifactItem::new("Squat", 100.0, Some(5.0)),
            ArtifactItem::new("Bench", 80.0, Some(5.0)),
        ]));

        let replacement = Artifact::new(vec![ArtifactItem::new("Row", 60.0, None)]);
        SessionPatch::default()
            .artifact(replacement.clone())
            .apply(&mut session);

        assert_eq!(session.current_artifact, Some(replacement));
    }

    #[test]
    fn patch_can_clear_pending_response() {
        let mut session = Session::new("s-1", 1, vec![]);
        session.pending_response = Some(ResponseKind::Reject);

        SessionPatch::default().apply(&mut session);
        assert_eq!(session.pending_response, Some(ResponseKind::Reject));

        SessionPatch::default().pending(None).apply(&mut session);
        assert_eq!(session.pending_response, None);
    }
}
