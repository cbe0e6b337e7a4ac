//! Pluggable session storage
//!
//! The orchestrator only ever talks to the [`SessionStore`] trait. Two
//! implementations ship here:
//!
//! - [`InMemorySessionStore`] - a map behind an async lock, for tests and
//!   single-process deployments; `cleanup` sweeps by `updated_at`.
//! - [`KeyValueSessionStore`] - an adapter over any [`KeyValueBackend`]
//!   (a remote key-value service stays a collaborator, only its interface
//!   is defined here). Entries carry a TTL, so `cleanup` is a no-op - the
//!   backend expires them.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::RwLock;

use super::types::UserSession;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),
    #[error("failed to serialize session: {0}")]
    Serialize(String),
}

/// Storage contract for sessions
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, session_id: &str) -> Result<Option<UserSession>, StoreError>;

    async fn set(&self, session: &UserSession) -> Result<(), StoreError>;

    /// Returns whether the session existed
    async fn delete(&self, session_id: &str) -> Result<bool, StoreError>;

    async fn exists(&self, session_id: &str) -> Result<bool, StoreError>;

    /// Remove sessions idle since before the cutoff, returning how many
    /// were removed. Stores whose backend expires entries on its own keep
    /// the default no-op.
    async fn cleanup(&self, _older_than: DateTime<Utc>) -> Result<usize, StoreError> {
        Ok(0)
    }

    /// Live session count, when the backend can answer cheaply
    async fn count(&self) -> Result<Option<usize>, StoreError> {
        Ok(None)
    }
}

// ============================================================================
// In-memory store
// ============================================================================

/// Map-backed store for tests and local deployments
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, UserSession>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, session_id: &str) -> Result<Option<UserSession>, StoreError> {
        Ok(self.sessions.read().await.get(session_id).cloned())
    }

    async fn set(&self, session: &UserSession) -> Result<(), StoreError> {
        self.sessions
            .write()
            .await
            .insert(session.session_id.clone(), session.clone());
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> Result<bool, StoreError> {
        Ok(self.sessions.write().await.remove(session_id).is_some())
    }

    async fn exists(&self, session_id: &str) -> Result<bool, StoreError> {
        Ok(self.sessions.read().await.contains_key(session_id))
    }

    async fn cleanup(&self, older_than: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| s.updated_at >= older_than);
        Ok(before - sessions.len())
    }

    async fn count(&self) -> Result<Option<usize>, StoreError> {
        Ok(Some(self.sessions.read().await.len()))
    }
}

// ============================================================================
// Key-value adapter
// ============================================================================

/// Minimal contract a remote key-value service must satisfy
#[async_trait]
pub trait KeyValueBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// `ttl` is per-entry; the backend owns expiry
    async fn set(&self, key: &str, value: String, ttl: Option<Duration>)
        -> Result<(), StoreError>;

    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    async fn exists(&self, key: &str) -> Result<bool, StoreError>;
}

/// Sessions in an external key-value service under `{prefix}{sessionId}`
pub struct KeyValueSessionStore<B> {
    backend: B,
    prefix: String,
    ttl: Option<Duration>,
}

impl<B: KeyValueBackend> KeyValueSessionStore<B> {
    pub fn new(backend: B, prefix: impl Into<String>, ttl: Option<Duration>) -> Self {
        Self {
            backend,
            prefix: prefix.into(),
            ttl,
        }
    }

    fn key(&self, session_id: &str) -> String {
        format!("{}{}", self.prefix, session_id)
    }
}

#[async_trait]
impl<B: KeyValueBackend> SessionStore for KeyValueSessionStore<B> {
    async fn get(&self, session_id: &str) -> Result<Option<UserSession>, StoreError> {
        match self.backend.get(&self.key(session_id)).await? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| StoreError::Serialize(e.to_string())),
            None => Ok(None),
        }
    }

    async fn set(&self, session: &UserSession) -> Result<(), StoreError> {
        let raw = serde_json::to_string(session)
            .map_err(|e| StoreError::Serialize(e.to_string()))?;
        self.backend
            .set(&self.key(&session.session_id), raw, self.ttl)
            .await
    }

    async fn delete(&self, session_id: &str) -> Result<bool, StoreError> {
        self.backend.delete(&self.key(session_id)).await
    }

    async fn exists(&self, session_id: &str) -> Result<bool, StoreError> {
        self.backend.exists(&self.key(session_id)).await
    }

    // cleanup stays the default no-op: TTL handles expiry.
}
