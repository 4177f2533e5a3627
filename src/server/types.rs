//! Request/Response types for the HTTP server.
//!
//! These types define the wire format for all HTTP API endpoints.

use serde::{Deserialize, Serialize};

use crate::artifact::Artifact;
use crate::session::{Session, WorkflowState};
use crate::workflow::RespondOutcome;

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthResponse {
    /// Server status (always "ok" when healthy)
    pub status: String,
    /// Server version from Cargo.toml
    pub version: String,
    /// Sessions currently held in memory
    pub sessions: usize,
}

impl HealthResponse {
    /// Create a healthy response with the current package version
    pub fn healthy(sessions: usize) -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            sessions,
        }
    }
}

/// Request to start a session. The body is optional.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CreateSessionRequest {
    /// Free-text goal recorded as the first conversation turn
    #[serde(default)]
    pub goal: Option<String>,
}

/// Response after creating a session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreateSessionResponse {
    /// Server-generated session ID (UUID v4)
    pub session_id: String,
    /// Creation timestamp in RFC 3339 format
    pub created_at: String,
}

/// Snapshot of a session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionInfo {
    pub id: String,
    pub state: WorkflowState,
    pub regeneration_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_artifact: Option<Artifact>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub committed_id: Option<i64>,
    /// Whether a stream is currently bound
    pub streaming: bool,
    /// Creation timestamp in RFC 3339 format
    pub created_at: String,
}

impl From<&Session> for SessionInfo {
    fn from(session: &Session) -> Self {
        Self {
            id: session.id.clone(),
            state: session.state,
            regeneration_count: session.regeneration_count,
            current_artifact: session.current_artifact.clone(),
            committed_id: session.committed_id,
            streaming: session.has_channel(),
            created_at: session.created_at.to_rfc3339(),
        }
    }
}

/// Answer to the presented artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RespondRequest {
    /// "accept" or "reject"
    pub response: String,
}

/// Result of a respond call
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RespondResponse {
    pub session_id: String,
    #[serde(flatten)]
    pub outcome: RespondOutcome,
}

/// Error response body
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorResponse {
    /// Error message
    pub error: String,
    /// Error code for programmatic handling
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ErrorResponse {
    /// Create an error response with just a message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            code: None,
        }
    }

    /// Create an error response with a message and code
    pub fn with_code(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            code: Some(code.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::ArtifactItem;

    mod health_response_tests {
        use super::*;

        #[test]
        fn healthy_includes_version() {
            let resp = HealthResponse::healthy(3);
            assert_eq!(resp.status, "ok");
            assert_eq!(resp.version, env!("CARGO_PKG_VERSION"));
            assert_eq!(resp.sessions, 3);
        }
    }

    mod request_tests {
        use super::*;

        #[test]
        fn create_request_goal_is_optional() {
            let req: CreateSessionRequest = serde_json::from_str("{}").unwrap();
            assert!(req.goal.is_none());

            let req: CreateSessionRequest =
                serde_json::from_str(r#"{"goal":"Heavy squats"}"#).unwrap();
            assert_eq!(req.goal.as_deref(), Some("Heavy squats"));
        }

        #[test]
        fn respond_request_requires_response() {
            assert!(serde_json::from_str::<RespondRequest>("{}").is_err());
            let req: RespondRequest = serde_json::from_str(r#"{"response":"accept"}"#).unwrap();
            assert_eq!(req.response, "accept");
        }
    }

    mod response_tests {
        use super::*;

        #[test]
        fn session_info_reflects_session() {
            let mut session = Session::new("s-1", 4, vec![]);
            session.state = WorkflowState::Presented;
            session.regeneration_count = 2;
            session.current_artifact =
                Some(Artifact::new(vec![ArtifactItem::new("Row", 60.0, Some(10.0))]));

            let info = SessionInfo::from(&session);
            assert_eq!(info.id, "s-1");
            assert_eq!(info.state, WorkflowState::Presented);
            assert_eq!(info.regeneration_count, 2);
            assert!(!info.streaming);

            let json = serde_json::to_value(&info).unwrap();
            assert_eq!(json["state"], "presented");
            assert!(json.get("committed_id").is_none());
        }

        #[test]
        fn respond_response_flattens_outcome() {
            let resp = RespondResponse {
                session_id: "s-1".to_string(),
                outcome: RespondOutcome::Committed { id: 12 },
            };
            let json = serde_json::to_value(&resp).unwrap();
            assert_eq!(
                json,
                serde_json::json!({"session_id": "s-1", "status": "committed", "id": 12})
            );
        }

        #[test]
        fn error_response_omits_missing_code() {
            let json = serde_json::to_string(&ErrorResponse::new("Oops")).unwrap();
            assert_eq!(json, r#"{"error":"Oops"}"#);

            let resp = ErrorResponse::with_code("Not found", "SESSION_NOT_FOUND");
            assert_eq!(resp.code.as_deref(), Some("SESSION_NOT_FOUND"));
        }
    }
}
