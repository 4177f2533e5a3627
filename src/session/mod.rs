//! Session state and the in-memory session table.
//!
//! ```text
//! +------------------------------------------+
//! |  SessionStore (DashMap)                  |
//! |    +-- Session 1: state, artifact, chan  |
//! |    +-- Session 2: state, artifact, chan  |
//! |    +-- ... (idle sessions swept)         |
//! +------------------------------------------+
//! ```

mod model;
mod store;

pub use model::{
    ConversationTurn, OwnerId, ResponseKind, Session, SessionPatch, TurnRole, WorkflowState,
};
pub use store::{
    SessionStore, StoreConfig, DEFAULT_SESSION_TTL_SECS, DEFAULT_SWEEP_INTERVAL_SECS,
};
