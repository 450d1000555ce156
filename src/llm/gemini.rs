//! Google Gemini client for the chemistry assistant.
//!
//! Stateless REST calls to `generateContent`: the conversation history is
//! replayed on every request together with the fixed system instruction,
//! generation config, and safety settings supplied once per session.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use serde::Serialize;
use tracing::debug;

use super::{
    Conversation, ImageAttachment, LlmError, Message, ModelClient, ModelReply, Role, TurnPayload,
};

/// Gemini REST endpoint base.
const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Default model used by the assistant.
const DEFAULT_MODEL: &str = "gemini-2.5-flash-preview-04-17";

/// Sampling temperature, lowered for factual chemistry answers.
const DEFAULT_TEMPERATURE: f64 = 0.6;
/// Nucleus sampling cutoff.
const DEFAULT_TOP_P: f64 = 0.95;
/// Top-k sampling cutoff.
const DEFAULT_TOP_K: u32 = 64;
/// Token budget sized for detailed worked solutions.
const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 65_536;

/// Connection timeout for the provider endpoint.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Full-request timeout; generation can take a while on long answers.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Safety categories moderated by the provider on every request.
const SAFETY_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];
/// Block threshold applied to every safety category.
const SAFETY_THRESHOLD: &str = "BLOCK_MEDIUM_AND_ABOVE";

/// Block reason reported when the provider gives none.
const UNKNOWN_BLOCK_REASON: &str = "UNKNOWN_REASON";

/// System instruction fixing the tutor persona, language, and formatting rules.
const SYSTEM_PROMPT: &str = r#"
**Your Role:**
You are a Chemistry expert for Class 11 and 12 students (Indian syllabus like WBCHSE, CBSE, ISC). Your main job is to help them understand and solve Chemistry problems by providing direct, clear answers.

**Language:**
You MUST reply ONLY in simple, everyday Kolkata Bengali (সহজ কথ্য কলকাতা বাংলা). All explanations and examples should be in this language.

**How to Answer (Core Instructions):**
1.  **Get the Question:** A student will ask a chemistry question.
2.  **Think and Understand:** Carefully understand the question. Break it down step-by-step in your mind to figure out the main concepts and how to answer fully and correctly.
3.  **Give Only the Answer:**
    * Provide *only the direct answer* to the question. No extra talk, no greetings, no goodbyes.
    * Explain the chemistry concepts behind the question.
    * If it's a math-type problem, show the steps to solve it.
    * Use very simple Bengali that Class 11/12 students can easily understand.
    * Be detailed and complete in your answer.
    * Use examples if they help explain.
    * Make your answers easy to read. Use bullet points, make important Bengali words bold, and use line breaks.

4.  **Handling "Regenerate" or "Simplify":**
    * If the student asks to **"আবার বলো" (Say again/Regenerate)** or something similar about the last answer, give a *different explanation or solution* for the *same original question*. Try a new angle or different examples, but keep the answer detailed and correct. Assume they are referring to the last question you answered.
    * If the student asks to **"আরও সোজা করে বলো" (Explain more simply/Simplify)** or something similar about the last answer, make your *previous explanation/solution simpler*. Break it into easier steps or use more basic words. Don't leave out important info, just make it clearer. Assume they are referring to the last answer you provided.

**Your Tone:**
* **Helpful (সাহায্য করার মানসিকতা):** Help students learn.
* **Patient and Clear (ধৈর্য ধরে সহজ করে বোঝানো):** Explain tricky things calmly.
* **Correct (সঠিক তথ্য):** Make sure your chemistry facts are right.
* **Serious (গুরুত্বপূর্ণ):** Keep it focused on studies.

**What You Know (Scope):**
All Chemistry topics for Class 11 and 12, including:
* Physical Chemistry (ভৌত রসায়ন): e.g., Atomic Structure (পরমাণুর গঠন), Chemical Bonding (রাসায়নিক বন্ধন), Thermodynamics (তাপগতিবিদ্যা), Solutions (দ্রবণ), Electrochemistry (তড়িৎরসায়ন), Chemical Kinetics (রাসায়নিক গতিবিদ্যা).
* Inorganic Chemistry (অজৈব রসায়ন): e.g., p-block elements (পি-ব্লক মৌল), d-block elements (ডি-ব্লক মৌল), Coordination Compounds (জটিল যৌগ).
* Organic Chemistry (জৈব রসায়ন): e.g., Hydrocarbons (হাইড্রোকার্বন), Alcohols (অ্যালকোহল), Aldehydes (অ্যালডিহাইড), Biomolecules (জৈব অণু).
    *(This is just a sample, cover all standard topics for these classes.)*

**Important Rules (Limitations):**
* Only answer questions about Class 11/12 Chemistry.
* Don't chat about other things.
* If a question isn't clear or is missing info, ask the student to explain more (in simple Kolkata Bengali). For example, say: "প্রশ্নটা ঠিক বুঝতে পারলাম না, আর একটু খুলে বলবে?" (Didn't quite get the question, can you explain a bit more?) or "এইটা উত্তর দেওয়ার জন্য আরও কিছু তথ্য লাগবে।" (Need a bit more info to answer this.)
* **CRITICAL: Do NOT add any extra text before or after the main answer. No introductions, no greetings, no summaries, no "hope this helps," no "I am an AI," and absolutely no disclaimers. Just the answer itself, directly addressing the question.**
"#;

/// Gemini client configuration.
#[derive(Clone)]
pub struct GeminiConfig {
    /// API key sent in the `x-goog-api-key` header.
    pub api_key: String,
    /// Model name addressed by the `generateContent` URL.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f64,
    /// Nucleus sampling cutoff.
    pub top_p: f64,
    /// Top-k sampling cutoff.
    pub top_k: u32,
    /// Maximum number of output tokens per reply.
    pub max_output_tokens: u32,
    /// System instruction supplied with every request.
    pub system_prompt: String,
}

impl std::fmt::Debug for GeminiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiConfig")
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("top_p", &self.top_p)
            .field("top_k", &self.top_k)
            .field("max_output_tokens", &self.max_output_tokens)
            .finish()
    }
}

impl GeminiConfig {
    /// Create a configuration with the tutor defaults.
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            top_p: DEFAULT_TOP_P,
            top_k: DEFAULT_TOP_K,
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
            system_prompt: SYSTEM_PROMPT.to_string(),
        }
    }

    /// Override the model name.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Override the sampling temperature.
    #[must_use]
    pub const fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    /// Override the output token budget.
    #[must_use]
    pub const fn with_max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.max_output_tokens = max_output_tokens;
        self
    }

    /// Override the system instruction.
    #[must_use]
    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    system_instruction: Content,
    generation_config: GenerationConfig,
    safety_settings: Vec<SafetySetting>,
}

#[derive(Debug, Serialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

impl Part {
    fn text(text: String) -> Self {
        Self {
            text: Some(text),
            inline_data: None,
        }
    }

    fn inline_image(image: &ImageAttachment) -> Self {
        Self {
            text: None,
            inline_data: Some(InlineData {
                mime_type: image.mime_type.clone(),
                data: base64::engine::general_purpose::STANDARD.encode(&image.data),
            }),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f64,
    top_p: f64,
    top_k: u32,
    max_output_tokens: u32,
    response_mime_type: &'static str,
}

#[derive(Debug, Serialize)]
struct SafetySetting {
    category: &'static str,
    threshold: &'static str,
}

/// Async Gemini API client.
pub struct GeminiClient {
    config: GeminiConfig,
    http: reqwest::Client,
}

impl GeminiClient {
    /// Create a client for the configured model.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: GeminiConfig) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { config, http })
    }

    /// The configured model name.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn api_url(&self) -> String {
        format!("{GEMINI_API_BASE}/{}:generateContent", self.config.model)
    }

    fn build_request_body(
        &self,
        conversation: &Conversation,
        payload: &TurnPayload,
    ) -> GenerateRequest {
        let mut contents: Vec<Content> = conversation
            .messages()
            .iter()
            .map(Self::message_content)
            .collect();
        contents.push(Content {
            role: Some("user"),
            parts: Self::parts_for(&payload.text, payload.image.as_ref()),
        });

        GenerateRequest {
            contents,
            system_instruction: Content {
                role: None,
                parts: vec![Part::text(self.config.system_prompt.clone())],
            },
            generation_config: GenerationConfig {
                temperature: self.config.temperature,
                top_p: self.config.top_p,
                top_k: self.config.top_k,
                max_output_tokens: self.config.max_output_tokens,
                response_mime_type: "text/plain",
            },
            safety_settings: SAFETY_CATEGORIES
                .iter()
                .map(|category| SafetySetting {
                    category,
                    threshold: SAFETY_THRESHOLD,
                })
                .collect(),
        }
    }

    fn message_content(message: &Message) -> Content {
        let role = match message.role {
            Role::User => "user",
            Role::Model => "model",
        };
        Content {
            role: Some(role),
            parts: Self::parts_for(&message.text, message.image.as_ref()),
        }
    }

    fn parts_for(text: &str, image: Option<&ImageAttachment>) -> Vec<Part> {
        let mut parts = Vec::new();
        if !text.is_empty() {
            parts.push(Part::text(text.to_string()));
        }
        if let Some(attachment) = image {
            parts.push(Part::inline_image(attachment));
        }
        // The API rejects content with no parts.
        if parts.is_empty() {
            parts.push(Part::text(String::new()));
        }
        parts
    }

    /// Map a raw `generateContent` response to a reply variant.
    ///
    /// A response with no candidate text is treated as declined, with the
    /// prompt-feedback block reason when the provider reports one.
    fn parse_reply(json: &serde_json::Value) -> ModelReply {
        let text: String = json["candidates"]
            .as_array()
            .and_then(|candidates| candidates.first())
            .and_then(|first| first["content"]["parts"].as_array())
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|part| part["text"].as_str())
                    .collect()
            })
            .unwrap_or_default();

        if text.is_empty() {
            let reason = json["promptFeedback"]["blockReason"]
                .as_str()
                .unwrap_or(UNKNOWN_BLOCK_REASON)
                .to_string();
            return ModelReply::Blocked { reason };
        }
        ModelReply::Answered { text }
    }
}

#[async_trait]
impl ModelClient for GeminiClient {
    async fn start_conversation(&self) -> Result<Conversation, LlmError> {
        debug!(model = %self.config.model, "Starting new Gemini conversation");
        Ok(Conversation::new())
    }

    async fn send(
        &self,
        conversation: &mut Conversation,
        payload: TurnPayload,
    ) -> Result<ModelReply, LlmError> {
        let body = self.build_request_body(conversation, &payload);
        let url = self.api_url();

        debug!(
            model = %self.config.model,
            history_len = conversation.message_count(),
            "Gemini generateContent request"
        );

        let response = self
            .http
            .post(&url)
            .header("content-type", "application/json")
            .header("x-goog-api-key", &self.config.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(LlmError::RateLimited);
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                detail,
            });
        }

        let json: serde_json::Value = response.json().await?;
        let reply = Self::parse_reply(&json);

        conversation.push(Message {
            role: Role::User,
            text: payload.text,
            image: payload.image,
        });
        if let ModelReply::Answered { text } = &reply {
            conversation.push(Message {
                role: Role::Model,
                text: text.clone(),
                image: None,
            });
        }

        Ok(reply)
    }
}
