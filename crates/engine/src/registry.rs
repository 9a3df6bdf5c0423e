//! Session registry
//!
//! Thread-safe map from call id to session handle, with a capacity
//! ceiling and a background sweep that evicts ended and idle sessions.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::watch;

use dialagent_core::CallId;

use crate::session::{HangupReason, SessionEvent, SessionHandle};
use crate::EngineError;

/// Registry of live call sessions.
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<CallId, SessionHandle>>>,
    max_sessions: usize,
    idle_timeout: Duration,
    shutdown_tx: watch::Sender<bool>,
}

impl SessionRegistry {
    pub fn new(max_sessions: usize, idle_timeout: Duration) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            max_sessions,
            idle_timeout,
            shutdown_tx,
        }
    }

    /// Register a session under its call id.
    pub fn insert(&self, call_id: CallId, handle: SessionHandle) -> Result<(), EngineError> {
        let mut sessions = self.sessions.write();
        if sessions.len() >= self.max_sessions {
            return Err(EngineError::Capacity {
                limit: self.max_sessions,
            });
        }
        sessions.insert(call_id, handle);
        Ok(())
    }

    /// Look up the session for a call.
    pub fn get(&self, call_id: &CallId) -> Result<SessionHandle, EngineError> {
        self.sessions
            .read()
            .get(call_id)
            .cloned()
            .ok_or_else(|| EngineError::UnknownCall(call_id.clone()))
    }

    /// Drop a session. Returns the handle if it was present.
    pub fn remove(&self, call_id: &CallId) -> Option<SessionHandle> {
        self.sessions.write().remove(call_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Start the background sweep evicting ended and idle sessions.
    pub fn start_cleanup_task(&self, interval: Duration) {
        let sessions = self.sessions.clone();
        let idle_timeout = self.idle_timeout;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let evicted = sweep(&sessions, idle_timeout).await;
                        if evicted > 0 {
                            tracing::info!(evicted, "evicted stale sessions");
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
        });
    }

    /// Stop the cleanup task.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

async fn sweep(
    sessions: &RwLock<HashMap<CallId, SessionHandle>>,
    idle_timeout: Duration,
) -> usize {
    let stale: Vec<(CallId, SessionHandle)> = sessions
        .read()
        .iter()
        .filter(|(_, handle)| handle.is_ended() || handle.last_activity().elapsed() > idle_timeout)
        .map(|(id, handle)| (id.clone(), handle.clone()))
        .collect();

    if stale.is_empty() {
        return 0;
    }

    let mut evicted = 0;
    for (id, handle) in stale {
        // Still-live sessions get an explicit hangup so the actor task
        // and the provider leg are released, not just forgotten.
        if !handle.is_ended() {
            let _ = handle
                .dispatch(SessionEvent::Hangup {
                    reason: HangupReason::Expired,
                })
                .await;
        }
        if sessions.write().remove(&id).is_some() {
            tracing::debug!(call_id = %id, "session evicted");
            evicted += 1;
        }
    }
    evicted
}
