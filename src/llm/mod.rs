//! Model-provider components for the chemistry assistant.
//!
//! The turn composer talks to the hosted model exclusively through the
//! [`ModelClient`] trait; [`gemini`] holds the only real implementation.

pub mod gemini;

pub use gemini::{GeminiClient, GeminiConfig};

use async_trait::async_trait;
use thiserror::Error;

/// Role of a conversation message.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Role {
    /// Message authored by the student.
    User,
    /// Message authored by the model.
    Model,
}

/// An inline image attached to a question.
#[derive(Clone, Eq, PartialEq)]
pub struct ImageAttachment {
    /// Content type of the image (e.g. `image/png`).
    pub mime_type: String,
    /// Raw image bytes; base64-encoded only at request-build time.
    pub data: Vec<u8>,
}

impl std::fmt::Debug for ImageAttachment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageAttachment")
            .field("mime_type", &self.mime_type)
            .field("data_len", &self.data.len())
            .finish()
    }
}

/// One message of a conversation.
#[derive(Clone, Debug)]
pub struct Message {
    /// Who authored the message.
    pub role: Role,
    /// Text content; may be empty for image-only questions.
    pub text: String,
    /// Inline image, if the message carried one.
    pub image: Option<ImageAttachment>,
}

/// Locally owned multi-turn history, replayed to the provider on every call.
///
/// The provider API is stateless; this is the conversation handle a session
/// owns exclusively.
#[derive(Debug, Default)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    /// Create an empty conversation.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            messages: Vec::new(),
        }
    }

    /// Append a message to the history.
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// The full message history, oldest first.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Number of messages in the history.
    #[must_use]
    pub fn message_count(&self) -> usize {
        self.messages.len()
    }
}

/// Message payload for one turn, as produced by the turn composer.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TurnPayload {
    /// Instruction or question text; may be empty for image-only asks.
    pub text: String,
    /// Inline image accompanying the text.
    pub image: Option<ImageAttachment>,
}

/// Reply variants of the model collaborator.
///
/// A declined answer is a normal reply, not an error.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ModelReply {
    /// The model produced answer text.
    Answered {
        /// Concatenated text of the reply.
        text: String,
    },
    /// The provider declined to answer.
    Blocked {
        /// Provider-reported block reason (e.g. `SAFETY`).
        reason: String,
    },
}

/// Errors produced by the model provider client.
#[derive(Debug, Error)]
pub enum LlmError {
    /// HTTP transport or body-decoding failure.
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with a non-success status.
    #[error("gemini api returned status {status}: {detail}")]
    Api {
        /// HTTP status code returned by the provider.
        status: u16,
        /// Response body text, if any.
        detail: String,
    },

    /// The provider rejected the request for quota reasons.
    #[error("rate limited by the gemini api")]
    RateLimited,
}

/// Call contract of the external model collaborator.
///
/// `send` is the only suspending point of a turn: it may take seconds,
/// produces no partial results, and supports no cancellation.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Obtain an empty conversation handle for a new session.
    async fn start_conversation(&self) -> Result<Conversation, LlmError>;

    /// Send one turn payload and record the exchange in the conversation.
    async fn send(
        &self,
        conversation: &mut Conversation,
        payload: TurnPayload,
    ) -> Result<ModelReply, LlmError>;
}
