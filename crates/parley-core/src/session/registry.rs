//! Registry of open streaming sessions.
//!
//! The registry is the only state shared between connection tasks. It is a
//! sharded `DashMap`, so `register`, `lookup`, and `remove` are each atomic
//! with respect to one another: a lookup never observes a half-registered
//! session, and a remove racing a lookup either wins or loses cleanly.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parley_types::error::SessionError;
use parley_types::session::{SessionId, SessionSnapshot};
use tracing::{debug, warn};

use super::transport::SessionTransport;

/// How many fresh ids `register` draws before giving up on a collision streak.
pub const MAX_ID_ATTEMPTS: u32 = 3;

/// Mapping from session id to its live transport.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<DashMap<SessionId, Arc<SessionTransport>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a transport under a freshly generated id.
    ///
    /// `make` builds the transport for the chosen id and runs while the id's
    /// slot is reserved, so it must not touch the registry.
    pub fn register<F>(&self, make: F) -> Result<Arc<SessionTransport>, SessionError>
    where
        F: FnMut(SessionId) -> Arc<SessionTransport>,
    {
        self.register_from(std::iter::repeat_with(SessionId::generate), make)
    }

    /// Register using ids drawn from `ids`. A colliding id is rejected and
    /// the next one is tried, up to [`MAX_ID_ATTEMPTS`].
    pub fn register_from<I, F>(&self, ids: I, mut make: F) -> Result<Arc<SessionTransport>, SessionError>
    where
        I: IntoIterator<Item = SessionId>,
        F: FnMut(SessionId) -> Arc<SessionTransport>,
    {
        for id in ids.into_iter().take(MAX_ID_ATTEMPTS as usize) {
            match self.sessions.entry(id.clone()) {
                Entry::Vacant(slot) => {
                    let transport = make(id);
                    slot.insert(Arc::clone(&transport));
                    debug!(session_id = %transport.id(), "registered session");
                    return Ok(transport);
                }
                Entry::Occupied(_) => {
                    warn!(session_id = %id, "session id collision; drawing a new id");
                }
            }
        }
        Err(SessionError::IdSpaceExhausted(MAX_ID_ATTEMPTS))
    }

    /// Insert an already-built transport under its own id.
    pub fn insert(&self, transport: Arc<SessionTransport>) -> Result<(), SessionError> {
        match self.sessions.entry(transport.id().clone()) {
            Entry::Vacant(slot) => {
                slot.insert(transport);
                Ok(())
            }
            Entry::Occupied(slot) => Err(SessionError::IdCollision(slot.key().clone())),
        }
    }

    pub fn lookup(&self, id: &str) -> Option<Arc<SessionTransport>> {
        self.sessions.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Remove a session. Removing an absent id is a no-op.
    ///
    /// Returns `true` if an entry was removed.
    pub fn remove(&self, id: &str) -> bool {
        let removed = self.sessions.remove(id).is_some();
        if removed {
            debug!(session_id = %id, "removed session");
        }
        removed
    }

    /// Remove `transport`'s entry only if the registry still maps its id to it.
    pub(crate) fn remove_transport(&self, transport: &SessionTransport) -> bool {
        self.sessions
            .remove_if(transport.id().as_str(), |_, current| {
                std::ptr::eq(Arc::as_ptr(current), transport)
            })
            .is_some()
    }

    pub(crate) fn holds(&self, transport: &SessionTransport) -> bool {
        self.sessions
            .get(transport.id().as_str())
            .is_some_and(|current| std::ptr::eq(Arc::as_ptr(current.value()), transport))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Point-in-time view of every registered session, ordered by creation.
    pub fn snapshot(&self) -> Vec<SessionSnapshot> {
        let mut sessions: Vec<SessionSnapshot> = self
            .sessions
            .iter()
            .map(|entry| entry.value().snapshot())
            .collect();
        sessions.sort_by_key(|s| s.created_at);
        sessions
    }

    /// Close every registered session (process shutdown).
    pub fn close_all(&self, reason: &str) -> usize {
        // Collect first: closing removes entries, which must not happen while
        // iterating a shard.
        let transports: Vec<Arc<SessionTransport>> = self
            .sessions
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        transports
            .iter()
            .filter(|transport| transport.close(reason))
            .count()
    }
}
