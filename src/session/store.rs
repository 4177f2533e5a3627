//! Keyed, in-memory session table with sliding idle expiry.
//!
//! # Expiry
//!
//! Two independent mechanisms remove abandoned sessions:
//!
//! - A one-shot timer scheduled at creation. When it fires it deletes the
//!   session only if it has been idle for longer than the timeout at that
//!   instant; a session touched in the meantime survives untouched.
//! - A periodic sweep started by [`SessionStore::start`] that removes every
//!   session idle for longer than the timeout. This is the guarantee of
//!   eventual cleanup.
//!
//! # Thread Safety
//!
//! - Sessions live in a `DashMap`; every mutation runs under the entry's
//!   shard lock, so a read-modify-write through [`SessionStore::mutate`] is
//!   atomic with respect to other handlers.
//! - Channels are never closed while a shard lock is held.
//! - `stop()` cancels the sweep loop and all pending expiry timers.

use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::model::{ConversationTurn, OwnerId, Session, SessionPatch};
use crate::error::{CoachError, Result};
use crate::stream::{close_sink, EventSink, StreamEvent};

/// Session TTL for idle cleanup - 30 minutes (default)
pub const DEFAULT_SESSION_TTL_SECS: u64 = 30 * 60;

/// Interval between idle sweeps - 5 minutes (default)
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 5 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreConfig {
    /// Idle time after which a session is eligible for removal
    pub idle_timeout: Duration,
    /// How often the periodic sweep runs
    pub sweep_interval: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(DEFAULT_SESSION_TTL_SECS),
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
        }
    }
}

pub struct SessionStore {
    sessions: DashMap<String, Session>,
    config: StoreConfig,
    shutdown: CancellationToken,
}

impl SessionStore {
    pub fn new(config: StoreConfig) -> Arc<Self> {
        Arc::new(Self {
            sessions: DashMap::new(),
            config,
            shutdown: CancellationToken::new(),
        })
    }

    pub fn config(&self) -> StoreConfig {
        self.config
    }

    /// Start the periodic idle sweep.
    ///
    /// The loop holds only a weak reference, so dropping the last `Arc` also
    /// ends it. Call [`stop`](Self::stop) for deterministic teardown.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let store = Arc::downgrade(self);
        let shutdown = self.shutdown.clone();
        let interval = self.config.sweep_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let Some(store) = store.upgrade() else { break };
                        let swept = store.sweep();
                        if swept > 0 {
                            tracing::info!("Swept {} idle sessions", swept);
                        }
                    }
                    _ = shutdown.cancelled() => break,
                }
            }
            tracing::debug!("Session sweep task shutting down");
        })
    }

    /// Stop the sweep loop and every pending expiry timer.
    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Insert a new session. The caller supplies a fresh random id.
    pub fn create(
        self: &Arc<Self>,
        id: impl Into<String>,
        owner_id: OwnerId,
        seed: Vec<ConversationTurn>,
    ) -> Result<Session> {
        let id = id.into();
        let session = match self.sessions.entry(id.clone()) {
            Entry::Occupied(_) => return Err(CoachError::AlreadyExists(id)),
            Entry::Vacant(slot) => slot.insert(Session::new(id.clone(), owner_id, seed)).clone(),
        };

        self.schedule_expiry(id);
        tracing::info!("Created session {} for owner {}", session.id, owner_id);
        Ok(session)
    }

    /// Fetch a snapshot and refresh its activity timestamp.
    pub fn get(&self, id: &str) -> Result<Session> {
        let mut entry = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| CoachError::NotFound(id.to_string()))?;
        entry.touch();
        Ok(entry.clone())
    }

    /// Fetch a snapshot without counting it as activity.
    pub fn peek(&self, id: &str) -> Option<Session> {
        self.sessions.get(id).map(|entry| entry.clone())
    }

    /// Merge `patch` into the session. Unknown ids are ignored so that late
    /// callbacks racing a deletion are harmless.
    pub fn update(&self, id: &str, patch: SessionPatch) {
        if self.mutate(id, |session| patch.apply(session)).is_none() {
            tracing::debug!("Ignoring update for unknown session {}", id);
        }
    }

    /// Run `f` against the live session under its entry lock and refresh
    /// activity. Returns `None` if the session does not exist.
    ///
    /// `f` must not call back into the store.
    pub fn mutate<R>(&self, id: &str, f: impl FnOnce(&mut Session) -> R) -> Option<R> {
        let mut entry = self.sessions.get_mut(id)?;
        let result = f(entry.value_mut());
        entry.touch();
        Some(result)
    }

    /// Remove a session, closing its bound channel if any.
    pub fn delete(&self, id: &str) -> bool {
        match self.sessions.remove(id) {
            Some((_, session)) => {
                Self::release_channel(&session);
                tracing::info!("Deleted session {}", id);
                true
            }
            None => false,
        }
    }

    /// Bind `sink` to the session, closing any channel bound before it.
    pub fn bind_channel(&self, id: &str, sink: Arc<dyn EventSink>) -> Result<()> {
        let previous = self
            .mutate(id, |session| session.channel.replace(sink))
            .ok_or_else(|| CoachError::NotFound(id.to_string()))?;

        if let Some(previous) = previous {
            tracing::debug!("Replacing channel {} on session {}", previous.id(), id);
            close_sink(previous.as_ref());
        }
        Ok(())
    }

    /// Clear the session's channel reference if it is still `channel_id`.
    ///
    /// The session itself is kept. Returns `true` if a channel was unbound.
    pub fn unbind_channel(&self, id: &str, channel_id: &str) -> bool {
        let removed = self.sessions.get_mut(id).and_then(|mut session| {
            let bound_here = session
                .channel
                .as_ref()
                .is_some_and(|channel| channel.id() == channel_id);
            if bound_here {
                session.channel.take()
            } else {
                None
            }
        });

        match removed {
            Some(channel) => {
                close_sink(channel.as_ref());
                tracing::debug!("Unbound channel {} from session {}", channel_id, id);
                true
            }
            None => false,
        }
    }

    /// Unbind and close whatever channel is bound to the session.
    pub fn close_channel(&self, id: &str) -> bool {
        let removed = self
            .sessions
            .get_mut(id)
            .and_then(|mut session| session.channel.take());
        match removed {
            Some(channel) => {
                close_sink(channel.as_ref());
                true
            }
            None => false,
        }
    }

    /// Push an event to the session's current channel, if one is bound.
    ///
    /// The channel is looked up at call time, never cached by the caller.
    pub fn push(&self, id: &str, event: StreamEvent) -> bool {
        let channel = self
            .sessions
            .get(id)
            .and_then(|session| session.channel.clone());
        match channel {
            Some(channel) => channel.send(event),
            None => {
                tracing::debug!("No channel bound to session {}, dropping {}", id, event.kind());
                false
            }
        }
    }

    /// Remove every session idle for longer than the timeout.
    pub fn sweep(&self) -> usize {
        let timeout = self.config.idle_timeout;
        let idle: Vec<String> = self
            .sessions
            .iter()
            .filter(|entry| entry.value().is_idle(timeout))
            .map(|entry| entry.key().clone())
            .collect();

        let mut removed = 0;
        for id in idle {
            if self.remove_if_idle(&id) {
                tracing::info!("Cleaned up idle session: {}", id);
                removed += 1;
            }
        }
        removed
    }

    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    /// Re-check idleness under the entry lock before removing.
    fn remove_if_idle(&self, id: &str) -> bool {
        let timeout = self.config.idle_timeout;
        match self.sessions.remove_if(id, |_, session| session.is_idle(timeout)) {
            Some((_, session)) => {
                Self::release_channel(&session);
                true
            }
            None => false,
        }
    }

    fn release_channel(session: &Session) {
        if let Some(channel) = &session.channel {
            close_sink(channel.as_ref());
        }
    }

    fn schedule_expiry(self: &Arc<Self>, id: String) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::debug!("No runtime available, session {} relies on the sweep", id);
            return;
        };

        let store: Weak<Self> = Arc::downgrade(self);
        let shutdown = self.shutdown.clone();
        let timeout = self.config.idle_timeout;

        runtime.spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(timeout) => {}
                _ = shutdown.cancelled() => return,
            }
            if let Some(store) = store.upgrade() {
                if store.remove_if_idle(&id) {
                    tracing::info!("Expired abandoned session: {}", id);
                }
            }
        });
    }

    #[cfg(test)]
    pub(crate) fn ids(&self) -> Vec<String> {
        self.sessions.iter().map(|entry| entry.key().clone()).collect()
    }
}

impl Drop for SessionStore {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
