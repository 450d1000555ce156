//! Error types for the conversational core.

use thiserror::Error;

use crate::llm::LlmError;

/// Errors surfaced by the session store and turn composer.
///
/// Model-call failures are deliberately absent: a failed or declined model
/// call is a normal turn outcome, not an error (see `TurnOutcome`).
#[derive(Debug, Error)]
pub enum ChatError {
    /// A new question carried neither text nor an image.
    #[error("প্রশ্ন খালি হতে পারে না (Question cannot be empty).")]
    EmptyInput,

    /// Regenerate was requested before any question was asked.
    #[error(
        "পুনরায় তৈরি করার জন্য কোনও পূর্ববর্তী প্রশ্ন পাওয়া যায়নি। (No previous question found to regenerate.)"
    )]
    NoPriorQuestion,

    /// Simplify was requested before any answer was produced.
    #[error(
        "সহজ করার জন্য কোনও পূর্ববর্তী উত্তর পাওয়া যায়নি। (No previous answer found to simplify.)"
    )]
    NoPriorAnswer,

    /// The model collaborator could not initialize a conversation.
    #[error("Could not initialize chat session: {0}")]
    ModelInit(#[source] LlmError),
}
