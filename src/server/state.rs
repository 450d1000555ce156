//! Application state shared across all request handlers.

use std::sync::Arc;

use crate::chat::{ChatService, SessionConfig};
use crate::llm::{GeminiClient, GeminiConfig};

/// Environment variable holding the Gemini API key.
const API_KEY_ENV: &str = "GOOGLE_API_KEY";
/// Environment variable overriding the model name.
const MODEL_ENV: &str = "RASAYAN_MODEL";

/// Shared application state.
pub struct AppState {
    /// Conversational core: session store plus model collaborator.
    pub chat: ChatService,
}

impl AppState {
    /// Create the state from the environment.
    ///
    /// # Errors
    /// Returns an error if the API key is missing or the Gemini client
    /// cannot be created.
    pub fn new() -> Result<Arc<Self>, Box<dyn std::error::Error + Send + Sync>> {
        let api_key = std::env::var(API_KEY_ENV)
            .map_err(|_| format!("{API_KEY_ENV} not found in environment variables"))?;

        let mut config = GeminiConfig::new(api_key);
        if let Ok(model) = std::env::var(MODEL_ENV) {
            config = config.with_model(model);
        }

        let client = GeminiClient::new(config)
            .map_err(|e| format!("Failed to create Gemini client: {e}"))?;
        tracing::info!(model = %client.model(), "Gemini client ready");

        Ok(Arc::new(Self {
            chat: ChatService::new(Arc::new(client), SessionConfig::default()),
        }))
    }

    /// Build state around an existing service (tests, embedding).
    #[must_use]
    pub fn with_service(chat: ChatService) -> Arc<Self> {
        Arc::new(Self { chat })
    }
}
