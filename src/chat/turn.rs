//! Turn composition: how an action plus stored context becomes a payload.

use serde::{Deserialize, Serialize};

use crate::chat::error::ChatError;
use crate::chat::session::{Session, StoredQuestion};
use crate::llm::TurnPayload;

/// Longest slice of the prior answer embedded in a simplify payload.
const ANSWER_PREVIEW_MAX_CHARS: usize = 1000;

/// Standard phrase used when the stored question has no text to embed.
const REGENERATE_FALLBACK: &str = "পূর্ববর্তী উত্তরটি আবার তৈরি করুন।";

/// Intent of a turn.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnAction {
    /// A new question.
    Ask,
    /// Re-answer the stored question.
    Regenerate,
    /// Restate the stored answer more simply.
    Simplify,
}

impl TurnAction {
    /// Parse the wire form used by form fields (`ask`, `regenerate`, `simplify`).
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ask" => Some(Self::Ask),
            "regenerate" => Some(Self::Regenerate),
            "simplify" => Some(Self::Simplify),
            _ => None,
        }
    }
}

/// New input supplied with a turn; follow-up actions ignore it.
#[derive(Clone, Debug, Default)]
pub struct TurnInput {
    /// Question text, if any.
    pub text: Option<String>,
    /// Uploaded image, if any.
    pub image: Option<crate::llm::ImageAttachment>,
}

/// Result of a completed turn.
///
/// `Blocked` and `Failed` are rendered to the student as apologetic answer
/// text; internally they stay distinct so callers and tests can tell a real
/// answer from a downgrade.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TurnOutcome {
    /// The model answered; the text was stored as the session's last answer.
    Answered(String),
    /// The provider declined to answer; nothing was stored.
    Blocked(String),
    /// The model call failed; nothing was stored.
    Failed(String),
}

impl TurnOutcome {
    /// The user-facing answer string for this outcome.
    #[must_use]
    pub fn user_text(&self) -> String {
        match self {
            Self::Answered(text) => text.clone(),
            Self::Blocked(reason) => format!(
                "দুঃখিত, আমি এই মুহূর্তে উত্তর দিতে পারছি না ({reason})। আপনি কি অন্যভাবে জিজ্ঞাসা করতে পারেন?"
            ),
            Self::Failed(detail) => {
                format!("দুঃখিত, আপনার অনুরোধটি প্রক্রিয়া করার সময় একটি ত্রুটি ঘটেছে: {detail}")
            }
        }
    }
}

/// A composed turn: the payload to send, plus the question to record if an
/// ask turn succeeds.
pub(crate) struct ComposedTurn {
    pub(crate) payload: TurnPayload,
    pub(crate) asked: Option<StoredQuestion>,
}

/// Build the exact payload for `action` from stored context and new input.
pub(crate) fn compose(
    session: &Session,
    action: TurnAction,
    input: TurnInput,
) -> Result<ComposedTurn, ChatError> {
    match action {
        TurnAction::Ask => {
            let text = input
                .text
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty());
            if text.is_none() && input.image.is_none() {
                return Err(ChatError::EmptyInput);
            }
            let payload = TurnPayload {
                text: text.clone().unwrap_or_default(),
                image: input.image.clone(),
            };
            Ok(ComposedTurn {
                payload,
                asked: Some(StoredQuestion {
                    text,
                    image: input.image,
                }),
            })
        }
        TurnAction::Regenerate => {
            let question = session.last_question().ok_or(ChatError::NoPriorQuestion)?;
            Ok(ComposedTurn {
                payload: TurnPayload {
                    text: regenerate_prompt(question.text.as_deref()),
                    image: question.image.clone(),
                },
                asked: None,
            })
        }
        TurnAction::Simplify => {
            let answer = session.last_answer().ok_or(ChatError::NoPriorAnswer)?;
            Ok(ComposedTurn {
                payload: TurnPayload {
                    text: simplify_prompt(answer),
                    image: None,
                },
                asked: None,
            })
        }
    }
}

/// Explicit Bengali instruction to re-answer the stored question.
fn regenerate_prompt(question: Option<&str>) -> String {
    question.map_or_else(
        || REGENERATE_FALLBACK.to_string(),
        |text| format!("পূর্ববর্তী প্রশ্নের ({text}) উত্তরটি পুনরায় তৈরি করুন।"),
    )
}

/// Explicit Bengali instruction to simplify the stored answer, grounded on a
/// bounded preview of its literal text.
fn simplify_prompt(answer: &str) -> String {
    format!(
        "আমার আগের প্রশ্নের উত্তরটি ({}) আরও সহজ করে বুঝিয়ে দিন।",
        answer_preview(answer)
    )
}

fn answer_preview(answer: &str) -> String {
    if answer.chars().count() <= ANSWER_PREVIEW_MAX_CHARS {
        return answer.to_string();
    }
    let mut preview: String = answer.chars().take(ANSWER_PREVIEW_MAX_CHARS).collect();
    preview.push('…');
    preview
}
