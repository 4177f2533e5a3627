//! External collaborators of the workflow: the history it reads context from
//! and the persistence layer accepted artifacts are committed to.
//!
//! The workflow only depends on the two traits. [`MemoryJournal`] is an
//! in-process implementation of both, used by the server binary and tests.

mod memory;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::artifact::{Artifact, ArtifactItem};
use crate::session::OwnerId;

pub use memory::{JournalEntry, LineItem, MemoryJournal};

/// One past aggregate used as generation context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: i64,
    pub date: NaiveDate,
    pub items: Vec<ArtifactItem>,
}

/// Source of recent historical records for an owner.
#[async_trait]
pub trait HistorySource: Send + Sync {
    /// Up to `limit` records, most recent first.
    async fn recent(&self, owner_id: OwnerId, limit: usize) -> anyhow::Result<Vec<HistoryRecord>>;
}

/// Durable storage for accepted artifacts.
///
/// Implementations create one aggregate record plus one line per artifact
/// item, resolving each item name to a catalog entry scoped to the owner, and
/// return the new aggregate's identifier.
#[async_trait]
pub trait ArtifactCommitter: Send + Sync {
    async fn commit(&self, owner_id: OwnerId, artifact: &Artifact) -> anyhow::Result<i64>;
}
