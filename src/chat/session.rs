//! Per-session conversation state.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use crate::llm::{Conversation, ImageAttachment};

/// The most recent new question asked in a session.
#[derive(Clone, Debug)]
pub struct StoredQuestion {
    /// Question text, if any was supplied.
    pub text: Option<String>,
    /// Uploaded image, if any was supplied.
    pub image: Option<ImageAttachment>,
}

/// One student's ongoing conversation.
///
/// `last_question` is written only by successful ask turns; regenerate and
/// simplify read it but overwrite `last_answer` alone.
pub struct Session {
    conversation: Conversation,
    last_question: Option<StoredQuestion>,
    last_answer: Option<String>,
    created_at: DateTime<Utc>,
    last_used: Instant,
}

impl Session {
    /// Wrap a freshly started conversation with empty question/answer state.
    #[must_use]
    pub fn new(conversation: Conversation) -> Self {
        Self {
            conversation,
            last_question: None,
            last_answer: None,
            created_at: Utc::now(),
            last_used: Instant::now(),
        }
    }

    /// Mutable access to the conversation handle, for sending a turn.
    pub fn conversation_mut(&mut self) -> &mut Conversation {
        &mut self.conversation
    }

    /// The conversation handle.
    #[must_use]
    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// The most recent successful ask question, if any.
    #[must_use]
    pub fn last_question(&self) -> Option<&StoredQuestion> {
        self.last_question.as_ref()
    }

    /// The most recent answered text, if any.
    #[must_use]
    pub fn last_answer(&self) -> Option<&str> {
        self.last_answer.as_deref()
    }

    pub(crate) fn set_last_question(&mut self, question: StoredQuestion) {
        self.last_question = Some(question);
    }

    pub(crate) fn set_last_answer(&mut self, answer: String) {
        self.last_answer = Some(answer);
    }

    /// Mark the session as used now.
    pub fn touch(&mut self) {
        self.last_used = Instant::now();
    }

    /// How long the session has gone without a turn.
    #[must_use]
    pub fn idle_for(&self) -> Duration {
        self.last_used.elapsed()
    }

    /// When the session was created.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}
