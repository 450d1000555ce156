//! Conversational core for the chemistry assistant.
//!
//! This module owns everything between the HTTP boundary and the model
//! provider:
//! - Session store keyed by opaque session id
//! - Turn composition for ask / regenerate / simplify
//! - Idle/LRU session eviction with a background sweeper

pub mod error;
pub mod session;
pub mod store;
pub mod sweeper;
pub mod turn;

pub use error::ChatError;
pub use session::{Session, StoredQuestion};
pub use store::{SessionConfig, SessionHandle, SessionStore};
pub use sweeper::{SessionSweeper, SweepStats};
pub use turn::{TurnAction, TurnInput, TurnOutcome};

use std::sync::Arc;

use crate::llm::{ModelClient, ModelReply};

/// Coordinates the session store and the model collaborator.
///
/// One turn is: resolve (or create) the session, compose the payload for the
/// requested action, send it, and write back last-question/last-answer state.
pub struct ChatService {
    store: Arc<SessionStore>,
    model: Arc<dyn ModelClient>,
}

impl ChatService {
    /// Create a service with its own session store.
    #[must_use]
    pub fn new(model: Arc<dyn ModelClient>, config: SessionConfig) -> Self {
        Self {
            store: Arc::new(SessionStore::new(config)),
            model,
        }
    }

    /// Shared handle to the session store (used by the eviction sweeper).
    #[must_use]
    pub fn store(&self) -> Arc<SessionStore> {
        Arc::clone(&self.store)
    }

    /// Whether a session with this id is currently live.
    #[must_use]
    pub fn session_exists(&self, session_id: &str) -> bool {
        self.store.exists(session_id)
    }

    /// Run one conversational turn for `session_id`.
    ///
    /// Context-validation failures (`EmptyInput`, `NoPriorQuestion`,
    /// `NoPriorAnswer`) and conversation-initialization failures are errors;
    /// a failed or declined model call is a normal [`TurnOutcome`] that the
    /// boundary renders as answer text.
    pub async fn run_turn(
        &self,
        session_id: &str,
        action: TurnAction,
        input: TurnInput,
    ) -> Result<TurnOutcome, ChatError> {
        let handle = self
            .store
            .get_or_create(session_id, self.model.as_ref())
            .await?;
        let mut session = handle.lock().await;
        session.touch();

        let composed = turn::compose(&session, action, input)?;
        tracing::info!(
            session_id = %session_id,
            action = ?action,
            "Sending message to model"
        );

        match self
            .model
            .send(session.conversation_mut(), composed.payload)
            .await
        {
            Ok(ModelReply::Answered { text }) => {
                if let Some(question) = composed.asked {
                    session.set_last_question(question);
                }
                session.set_last_answer(text.clone());
                Ok(TurnOutcome::Answered(text))
            }
            Ok(ModelReply::Blocked { reason }) => {
                tracing::warn!(
                    session_id = %session_id,
                    reason = %reason,
                    "Model declined to answer"
                );
                Ok(TurnOutcome::Blocked(reason))
            }
            Err(err) => {
                tracing::error!(
                    session_id = %session_id,
                    error = %err,
                    "Model call failed"
                );
                Ok(TurnOutcome::Failed(err.to_string()))
            }
        }
    }
}
