use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::{ArtifactCommitter, HistoryRecord, HistorySource};
use crate::artifact::{Artifact, ArtifactItem};
use crate::session::OwnerId;

/// A committed line with its personal-best flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub catalog_id: i64,
    pub name: String,
    pub primary: f64,
    pub secondary: Option<f64>,
    pub primary_best: bool,
    pub secondary_best: bool,
}

/// A committed aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: i64,
    pub owner_id: OwnerId,
    pub date: NaiveDate,
    pub lines: Vec<LineItem>,
}

impl JournalEntry {
    fn line_for(&self, catalog_id: i64) -> Option<&LineItem> {
        self.lines.iter().find(|line| line.catalog_id == catalog_id)
    }

    fn to_record(&self) -> HistoryRecord {
        HistoryRecord {
            id: self.id,
            date: self.date,
            items: self
                .lines
                .iter()
                .map(|line| ArtifactItem::new(line.name.clone(), line.primary, line.secondary))
                .collect(),
        }
    }
}

#[derive(Default)]
struct JournalState {
    next_id: i64,
    /// (owner, lowercased name) -> catalog id
    catalog: HashMap<(OwnerId, String), i64>,
    entries: Vec<JournalEntry>,
}

impl JournalState {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn resolve_catalog(&mut self, owner_id: OwnerId, name: &str) -> i64 {
        let key = (owner_id, name.trim().to_lowercase());
        if let Some(id) = self.catalog.get(&key) {
            return *id;
        }
        let id = self.allocate_id();
        self.catalog.insert(key, id);
        id
    }

    /// Line for `catalog_id` in the most recent entry strictly before `date`
    /// that contains it.
    fn previous_line(&self, owner_id: OwnerId, date: NaiveDate, catalog_id: i64) -> Option<&LineItem> {
        self.entries
            .iter()
            .filter(|entry| entry.owner_id == owner_id && entry.date < date)
            .filter_map(|entry| entry.line_for(catalog_id).map(|line| (entry, line)))
            .max_by_key(|(entry, _)| (entry.date, entry.id))
            .map(|(_, line)| line)
    }
}

/// In-memory workout journal.
pub struct MemoryJournal {
    state: RwLock<JournalState>,
}

impl MemoryJournal {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(JournalState::default()),
        }
    }

    /// Record an artifact as an aggregate dated `date`, returning its id.
    pub fn record(&self, owner_id: OwnerId, date: NaiveDate, artifact: &Artifact) -> i64 {
        let mut state = self.state.write();

        let mut lines = Vec::with_capacity(artifact.items.len());
        for item in &artifact.items {
            let catalog_id = state.resolve_catalog(owner_id, &item.name);
            let (primary_best, secondary_best) =
                match state.previous_line(owner_id, date, catalog_id) {
                    Some(prior) => (
                        item.primary > prior.primary,
                        matches!(
                            (item.secondary, prior.secondary),
                            (Some(now), Some(before)) if now > before
                        ),
                    ),
                    None => (false, false),
                };
            lines.push(LineItem {
                catalog_id,
                name: item.name.clone(),
                primary: item.primary,
                secondary: item.secondary,
                primary_best,
                secondary_best,
            });
        }

        let id = state.allocate_id();
        state.entries.push(JournalEntry {
            id,
            owner_id,
            date,
            lines,
        });
        id
    }

    pub fn entry(&self, id: i64) -> Option<JournalEntry> {
        self.state
            .read()
            .entries
            .iter()
            .find(|entry| entry.id == id)
            .cloned()
    }

    pub fn entry_count(&self, owner_id: OwnerId) -> usize {
        self.state
            .read()
            .entries
            .iter()
            .filter(|entry| entry.owner_id == owner_id)
            .count()
    }
}

impl Default for MemoryJournal {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HistorySource for MemoryJournal {
    async fn recent(&self, owner_id: OwnerId, limit: usize) -> anyhow::Result<Vec<HistoryRecord>> {
        let state = self.state.read();
        let mut entries: Vec<&JournalEntry> = state
            .entries
            .iter()
            .filter(|entry| entry.owner_id == owner_id)
            .collect();
        entries.sort_by(|a, b| (b.date, b.id).cmp(&(a.date, a.id)));
        Ok(entries
            .into_iter()
            .take(limit)
            .map(JournalEntry::to_record)
            .collect())
    }
}

#[async_trait]
impl ArtifactCommitter for MemoryJournal {
    async fn commit(&self, owner_id: OwnerId, artifact: &Artifact) -> anyhow::Result<i64> {
        if artifact.is_empty() {
            anyhow::bail!("cannot commit an artifact without items");
        }
        let id = self.record(owner_id, Utc::now().date_naive(), artifact);
        tracing::info!("Committed entry {} for owner {}", id, owner_id);
        Ok(id)
    }
}
