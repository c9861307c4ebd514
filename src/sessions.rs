use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use tracing::{debug, info};

use crate::{
    error::Result,
    lease::LeaseTimer,
    models::parse_duration_ns,
    store::{self, KvStore},
};

/// A lease on exactly one key.
#[derive(Debug)]
pub struct Session {
    pub owned_key: String,
    /// Bumped on every renew; an expiry only applies to the generation it was started for.
    pub(crate) generation: u64,
    pub(crate) lease: LeaseTimer,
}

impl KvStore {
    pub(crate) fn register_session(
        &self,
        state: &mut store::State,
        session_id: String,
        key: &str,
        ttl: Duration,
    ) {
        let lease = self.start_lease(session_id.clone(), 0, ttl);
        state.sessions.insert(
            session_id,
            Session {
                owned_key: key.to_string(),
                generation: 0,
                lease,
            },
        );
    }

    /// Restarts the lease of `session_id`. Unknown sessions are ignored.
    pub fn renew_session(&self, session_id: &str, ttl: Duration) {
        let mut state = self.state.write();

        let Some(session) = state.sessions.get_mut(session_id) else {
            debug!("Renew ignored for unknown session {}", session_id);
            return;
        };
        session.lease.cancel();
        session.generation += 1;
        session.lease = self.start_lease(session_id.to_string(), session.generation, ttl);

        debug!("Session renewed: {} for {:?}", session_id, ttl);
    }

    /// Ends `session_id` now, deleting the key it still owns. Unknown sessions are ignored.
    pub fn destroy_session(&self, session_id: &str) {
        let mut state = self.state.write();

        if let Some(key) = teardown(&mut state, session_id) {
            self.metrics.record_store_operation("destroy");
            info!("Session destroyed: {} (key {})", session_id, key);
        }
    }

    #[cfg(test)]
    pub(crate) fn session_key(&self, session_id: &str) -> Option<String> {
        self.state
            .read()
            .sessions
            .get(session_id)
            .map(|session| session.owned_key.clone())
    }

    #[cfg(test)]
    pub(crate) fn lease_remaining(&self, session_id: &str) -> Option<Duration> {
        self.state
            .read()
            .sessions
            .get(session_id)
            .map(|session| session.lease.remaining())
    }

    fn start_lease(&self, session_id: String, generation: u64, ttl: Duration) -> LeaseTimer {
        let state = Arc::downgrade(&self.state);
        let metrics = self.metrics.clone();

        LeaseTimer::start(ttl, move || {
            let Some(state) = state.upgrade() else {
                return;
            };
            let mut state = state.write();

            let current = state
                .sessions
                .get(&session_id)
                .is_some_and(|session| session.generation == generation);
            if !current {
                return;
            }
            if let Some(key) = teardown(&mut state, &session_id) {
                metrics.record_store_operation("expiration");
                debug!("Session expired: {} (key {})", session_id, key);
            }
        })
    }
}

/// Removes the session and, if it still owns its key, the key entry too.
/// Returns the session's key when the session existed.
fn teardown(state: &mut store::State, session_id: &str) -> Option<String> {
    let session = state.sessions.remove(session_id)?;
    session.lease.cancel();

    let owns_entry = state
        .entries
        .get(&session.owned_key)
        .is_some_and(|entry| entry.owner.as_deref() == Some(session_id));
    if owns_entry {
        state.entries.remove(&session.owned_key);
    }

    Some(session.owned_key.clone())
}

// ── Route handlers ──────────────────────────────────────────────────────

pub async fn renew_session(
    Path((session_id, duration)): Path<(String, String)>,
    State(state): State<crate::AppState>,
) -> Result<()> {
    let ttl = parse_duration_ns(&duration)?;
    state.store.renew_session(&session_id, ttl);
    Ok(())
}

pub async fn destroy_session(
    Path(session_id): Path<String>,
    State(state): State<crate::AppState>,
) -> Result<()> {
    state.store.destroy_session(&session_id);
    Ok(())
}
