//! Session lifecycle on top of a [`SessionStore`]

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;

use super::store::SessionStore;
use super::types::{ConversationEntry, UserSession};
use super::OrchestratorError;

/// Default idle timeout before cleanup: 30 minutes
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Generate a session id of the form `session_{epochMillis}_{9 alnum chars}`
pub fn generate_session_id() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..9)
        .map(|_| {
            const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
            ALPHABET[rng.gen_range(0..ALPHABET.len())] as char
        })
        .collect();
    format!("session_{}_{}", Utc::now().timestamp_millis(), suffix)
}

/// Owns session lifecycle; the store owns the data
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    session_timeout: Duration,
}

impl SessionManager {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self {
            store,
            session_timeout: DEFAULT_SESSION_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = timeout;
        self
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Allocate a session, defaulting the id when the caller has none
    pub async fn create_session(
        &self,
        user_id: &str,
        user_name: &str,
        session_id: Option<String>,
    ) -> Result<UserSession, OrchestratorError> {
        let id = session_id.unwrap_or_else(generate_session_id);
        let session = UserSession::new(id, user_id, user_name);
        self.store.set(&session).await?;
        tracing::debug!(session = %session.session_id, user = %user_id, "Session created");
        Ok(session)
    }

    pub async fn get_session(
        &self,
        session_id: &str,
    ) -> Result<Option<UserSession>, OrchestratorError> {
        Ok(self.store.get(session_id).await?)
    }

    /// Load if present, else create (honoring a caller-provided id)
    pub async fn get_or_create_session(
        &self,
        session_id: Option<String>,
        user_id: &str,
        user_name: &str,
    ) -> Result<UserSession, OrchestratorError> {
        if let Some(id) = &session_id {
            if let Some(session) = self.store.get(id).await? {
                return Ok(session);
            }
        }
        self.create_session(user_id, user_name, session_id).await
    }

    /// Stamp `updated_at` and write through
    pub async fn update_session(
        &self,
        session: &mut UserSession,
    ) -> Result<(), OrchestratorError> {
        session.updated_at = Utc::now();
        self.store.set(session).await?;
        Ok(())
    }

    /// Remove; reports whether the session existed
    pub async fn delete_session(&self, session_id: &str) -> Result<bool, OrchestratorError> {
        Ok(self.store.delete(session_id).await?)
    }

    /// Append to conversation history and write through
    pub async fn add_message(
        &self,
        session_id: &str,
        entry: ConversationEntry,
    ) -> Result<UserSession, OrchestratorError> {
        let mut session = self
            .store
            .get(session_id)
            .await?
            .ok_or_else(|| OrchestratorError::SessionNotFound(session_id.to_string()))?;
        session.conversation_history.push(entry);
        self.update_session(&mut session).await?;
        Ok(session)
    }

    /// Sweep sessions idle longer than the configured timeout
    pub async fn cleanup(&self) -> Result<usize, OrchestratorError> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(self.session_timeout)
                .unwrap_or_else(|_| chrono::Duration::minutes(30));
        let removed = self.store.cleanup(cutoff).await?;
        if removed > 0 {
            tracing::info!(count = removed, "Cleaned up expired sessions");
        }
        Ok(removed)
    }
}
