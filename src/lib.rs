//! Ephemeral session engine for AI-assisted workout plan generation.
//!
//! A client starts a session, binds a server-push stream to it and receives a
//! generated plan. It then accepts the plan, which commits it to the journal,
//! or rejects it, which regenerates with the rejection in context.
//!
//! ```text
//! server (axum) --> workflow --> session::SessionStore
//!                      |     --> generator::ContentGenerator --> CompletionClient
//!                      |     --> journal::{HistorySource, ArtifactCommitter}
//!                      +-------> stream::EventSink (SSE)
//! ```

pub mod artifact;
#[cfg(feature = "cli")]
pub mod cli;
pub mod error;
pub mod generator;
pub mod journal;
pub mod server;
pub mod session;
pub mod settings;
pub mod stream;
pub mod workflow;

#[cfg(test)]
mod testing;

pub use error::{CoachError, Result};
