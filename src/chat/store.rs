//! In-memory session store keyed by opaque session id.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::chat::error::ChatError;
use crate::chat::session::Session;
use crate::llm::ModelClient;

/// Shared handle to one session; the mutex serializes turns per session.
pub type SessionHandle = Arc<Mutex<Session>>;

/// Limits applied to the in-memory session map.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Maximum number of live sessions kept in memory.
    pub max_sessions: usize,
    /// Idle time after which a session may be evicted.
    #[serde(with = "duration_serde")]
    pub idle_ttl: Duration,
    /// Interval between background eviction sweeps.
    #[serde(with = "duration_serde")]
    pub sweep_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_sessions: 1000,
            idle_ttl: Duration::from_secs(3600),
            sweep_interval: Duration::from_secs(300),
        }
    }
}

impl SessionConfig {
    /// Create a config with default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of live sessions.
    #[must_use]
    pub const fn with_max_sessions(mut self, max_sessions: usize) -> Self {
        self.max_sessions = max_sessions;
        self
    }

    /// Set the idle time after which sessions are evicted.
    #[must_use]
    pub const fn with_idle_ttl(mut self, idle_ttl: Duration) -> Self {
        self.idle_ttl = idle_ttl;
        self
    }

    /// Set the interval between background sweeps.
    #[must_use]
    pub const fn with_sweep_interval(mut self, sweep_interval: Duration) -> Self {
        self.sweep_interval = sweep_interval;
        self
    }
}

/// Thread-safe map of session id to conversation state.
///
/// Sessions are created through the model collaborator and reaped by the
/// idle/LRU eviction policy; there is no persistence across restarts.
pub struct SessionStore {
    sessions: DashMap<String, SessionHandle>,
    config: SessionConfig,
}

impl SessionStore {
    /// Create an empty store with the given limits.
    #[must_use]
    pub fn new(config: SessionConfig) -> Self {
        Self {
            sessions: DashMap::new(),
            config,
        }
    }

    /// The limits this store was created with.
    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Return the session for `session_id`, creating it if unknown.
    ///
    /// Creation obtains an empty conversation from the model collaborator;
    /// its failure is the only error path and is propagated, not retried.
    pub async fn get_or_create(
        &self,
        session_id: &str,
        model: &dyn ModelClient,
    ) -> Result<SessionHandle, ChatError> {
        if let Some(existing) = self.sessions.get(session_id) {
            return Ok(Arc::clone(existing.value()));
        }

        let conversation = model
            .start_conversation()
            .await
            .map_err(ChatError::ModelInit)?;

        self.enforce_max_sessions();

        let handle: SessionHandle = Arc::new(Mutex::new(Session::new(conversation)));
        match self.sessions.entry(session_id.to_string()) {
            // Raced with a concurrent create for the same id: keep the winner.
            Entry::Occupied(entry) => Ok(Arc::clone(entry.get())),
            Entry::Vacant(entry) => {
                tracing::info!(session_id = %session_id, "Started new chat session");
                entry.insert(Arc::clone(&handle));
                Ok(handle)
            }
        }
    }

    /// Whether a session with this id is currently live.
    #[must_use]
    pub fn exists(&self, session_id: &str) -> bool {
        self.sessions.contains_key(session_id)
    }

    /// Number of live sessions.
    #[must_use]
    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    /// Remove sessions idle longer than the configured TTL.
    ///
    /// Sessions with a turn in flight hold their lock and are skipped.
    pub fn evict_idle(&self) -> usize {
        let ttl = self.config.idle_ttl;
        let expired: Vec<String> = self
            .sessions
            .iter()
            .filter_map(|entry| {
                entry
                    .value()
                    .try_lock()
                    .ok()
                    .and_then(|session| (session.idle_for() >= ttl).then(|| entry.key().clone()))
            })
            .collect();

        for key in &expired {
            if let Some((_, handle)) = self.sessions.remove(key) {
                if let Ok(session) = handle.try_lock() {
                    let age = Utc::now().signed_duration_since(session.created_at());
                    tracing::info!(
                        session_id = %key,
                        age_minutes = age.num_minutes(),
                        "Evicted idle chat session"
                    );
                }
            }
        }
        expired.len()
    }

    /// Drop least-recently-used sessions when the map is at capacity.
    fn enforce_max_sessions(&self) {
        let max = self.config.max_sessions;
        if self.sessions.len() < max {
            return;
        }

        let mut candidates: Vec<(String, Duration)> = self
            .sessions
            .iter()
            .filter_map(|entry| {
                entry
                    .value()
                    .try_lock()
                    .ok()
                    .map(|session| (entry.key().clone(), session.idle_for()))
            })
            .collect();
        // Most idle first.
        candidates.sort_by(|a, b| b.1.cmp(&a.1));

        let excess = self.sessions.len() + 1 - max;
        for (key, _) in candidates.into_iter().take(excess) {
            self.sessions.remove(&key);
            tracing::info!(session_id = %key, "Evicted least-recently-used chat session");
        }
    }
}

/// Serde module for Duration serialization.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::llm::{Conversation, LlmError, ModelReply, TurnPayload};

    struct NullModel;

    #[async_trait]
    impl ModelClient for NullModel {
        async fn start_conversation(&self) -> Result<Conversation, LlmError> {
            Ok(Conversation::new())
        }

        async fn send(
            &self,
            _conversation: &mut Conversation,
            _payload: TurnPayload,
        ) -> Result<ModelReply, LlmError> {
            Ok(ModelReply::Answered {
                text: String::new(),
            })
        }
    }

    struct FailingModel;

    #[async_trait]
    impl ModelClient for FailingModel {
        async fn start_conversation(&self) -> Result<Conversation, LlmError> {
            Err(LlmError::Api {
                status: 500,
                detail: "boom".to_string(),
            })
        }

        async fn send(
            &self,
            _conversation: &mut Conversation,
            _payload: TurnPayload,
        ) -> Result<ModelReply, LlmError> {
            Err(LlmError::RateLimited)
        }
    }

    #[test]
    fn test_config_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.max_sessions, 1000);
        assert_eq!(config.idle_ttl, Duration::from_secs(3600));
        assert_eq!(config.sweep_interval, Duration::from_secs(300));
    }

    #[test]
    fn test_config_builder() {
        let config = SessionConfig::new()
            .with_max_sessions(5)
            .with_idle_ttl(Duration::from_secs(60))
            .with_sweep_interval(Duration::from_secs(10));
        assert_eq!(config.max_sessions, 5);
        assert_eq!(config.idle_ttl, Duration::from_secs(60));
        assert_eq!(config.sweep_interval, Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_get_or_create_reuses_existing_session() {
        let store = SessionStore::new(SessionConfig::default());
        let first = store.get_or_create("s-1", &NullModel).await.unwrap();
        {
            let mut session = first.lock().await;
            session.set_last_answer("উত্তর".to_string());
        }

        let second = store.get_or_create("s-1", &NullModel).await.unwrap();
        assert_eq!(second.lock().await.last_answer(), Some("উত্তর"));
        assert_eq!(store.count(), 1);
    }

    #[tokio::test]
    async fn test_exists_tracks_creation() {
        let store = SessionStore::new(SessionConfig::default());
        assert!(!store.exists("s-1"));
        let _handle = store.get_or_create("s-1", &NullModel).await.unwrap();
        assert!(store.exists("s-1"));
    }

    #[tokio::test]
    async fn test_model_init_failure_propagates() {
        let store = SessionStore::new(SessionConfig::default());
        let result = store.get_or_create("s-1", &FailingModel).await;
        assert!(matches!(result, Err(ChatError::ModelInit(_))));
        assert!(!store.exists("s-1"));
    }

    #[tokio::test]
    async fn test_evict_idle_removes_expired_sessions() {
        let config = SessionConfig::new().with_idle_ttl(Duration::ZERO);
        let store = SessionStore::new(config);
        let _handle = store.get_or_create("stale", &NullModel).await.unwrap();

        assert_eq!(store.evict_idle(), 1);
        assert!(!store.exists("stale"));
    }

    #[tokio::test]
    async fn test_evict_idle_keeps_fresh_sessions() {
        let config = SessionConfig::new().with_idle_ttl(Duration::from_secs(3600));
        let store = SessionStore::new(config);
        let _handle = store.get_or_create("fresh", &NullModel).await.unwrap();

        assert_eq!(store.evict_idle(), 0);
        assert!(store.exists("fresh"));
    }

    #[tokio::test]
    async fn test_max_sessions_evicts_least_recently_used() {
        let config = SessionConfig::new().with_max_sessions(2);
        let store = SessionStore::new(config);

        let _oldest = store.get_or_create("oldest", &NullModel).await.unwrap();
        let newer = store.get_or_create("newer", &NullModel).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        newer.lock().await.touch();

        let _third = store.get_or_create("third", &NullModel).await.unwrap();
        assert!(store.count() <= 2);
        assert!(store.exists("third"));
        assert!(!store.exists("oldest"));
    }
}
