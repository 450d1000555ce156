//! HTTP route handlers for the chemistry assistant API.

use std::sync::Arc;

use axum::extract::multipart::Field;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::Html;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::services::ServeDir;
use uuid::Uuid;

use crate::chat::{ChatError, TurnAction, TurnInput};
use crate::llm::ImageAttachment;

use super::state::AppState;

/// Path of the HTML front-end served at `/`.
const INDEX_HTML_PATH: &str = "static/index.html";

/// Image content types accepted by the multimodal endpoint.
const ALLOWED_IMAGE_TYPES: [&str; 5] = [
    "image/png",
    "image/jpeg",
    "image/webp",
    "image/heic",
    "image/heif",
];

/// 400 body when a follow-up arrives without a usable session.
const SESSION_REQUIRED_MSG: &str =
    "পুনরায় তৈরি বা সহজ করার জন্য একটি সক্রিয় সেশন প্রয়োজন (Session ID is required for regenerate/simplify).";

/// Create the API router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(serve_index))
        .route("/ask", post(ask_question))
        .route("/ask_bengali_chem", post(ask_bengali_chem))
        .route("/health", get(health_check))
        .route("/health_bengali_chem", get(health_check))
        .nest_service("/static", ServeDir::new("static"))
        .with_state(state)
}

/// Liveness probe with a constant body.
async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "message": "রসায়ন সহায়িকা চলছে!",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Serve the HTML interface.
async fn serve_index() -> Result<Html<String>, (StatusCode, String)> {
    match tokio::fs::read_to_string(INDEX_HTML_PATH).await {
        Ok(content) => Ok(Html(content)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::error!("{INDEX_HTML_PATH} not found");
            Err((
                StatusCode::NOT_FOUND,
                "Frontend interface not found.".to_string(),
            ))
        }
        Err(err) => {
            tracing::error!("Error reading {INDEX_HTML_PATH}: {err}");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                "Server configuration error.".to_string(),
            ))
        }
    }
}

/// Question request for the text-only endpoint.
#[derive(Debug, Deserialize)]
pub struct QuestionRequest {
    /// Existing session id, if the client has one.
    pub session_id: Option<String>,
    /// The question text.
    pub question: String,
    /// Turn intent; defaults to a new question.
    pub action: Option<TurnAction>,
}

/// Answer payload returned by both ask endpoints.
#[derive(Debug, Serialize)]
pub struct AnswerResponse {
    /// Session id the answer belongs to.
    pub session_id: String,
    /// Model answer, or the user-facing apology/diagnostic text.
    pub answer: String,
}

/// Handle a text-only question, regeneration, or simplification.
///
/// This variant requires a live session for follow-up actions; an unknown or
/// missing session id on regenerate/simplify is a client error.
async fn ask_question(
    State(state): State<Arc<AppState>>,
    Json(request): Json<QuestionRequest>,
) -> Result<Json<AnswerResponse>, (StatusCode, String)> {
    let action = request.action.unwrap_or(TurnAction::Ask);
    let question = request.question.trim().to_string();

    if question.is_empty() && action == TurnAction::Ask {
        return Err((StatusCode::BAD_REQUEST, ChatError::EmptyInput.to_string()));
    }

    let session_id = match request.session_id {
        Some(id) => {
            if action != TurnAction::Ask && !state.chat.session_exists(&id) {
                return Err((StatusCode::BAD_REQUEST, SESSION_REQUIRED_MSG.to_string()));
            }
            id
        }
        None => {
            if action != TurnAction::Ask {
                return Err((StatusCode::BAD_REQUEST, SESSION_REQUIRED_MSG.to_string()));
            }
            Uuid::new_v4().to_string()
        }
    };

    let input = TurnInput {
        text: (!question.is_empty()).then_some(question),
        image: None,
    };
    let outcome = state
        .chat
        .run_turn(&session_id, action, input)
        .await
        .map_err(into_http_error)?;

    Ok(Json(AnswerResponse {
        session_id,
        answer: outcome.user_text(),
    }))
}

/// Handle the multimodal form endpoint (text and/or image).
///
/// Unknown session ids are transparently re-created here; a follow-up on a
/// fresh session then fails on its missing context, not on the id.
async fn ask_bengali_chem(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<AnswerResponse>, (StatusCode, String)> {
    let mut session_id: Option<String> = None;
    let mut question_text: Option<String> = None;
    let mut action = TurnAction::Ask;
    let mut image: Option<ImageAttachment> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| (StatusCode::BAD_REQUEST, format!("Invalid form data: {err}")))?
    {
        match field.name() {
            Some("session_id") => session_id = Some(text_field(field).await?),
            Some("question_text") => question_text = Some(text_field(field).await?),
            Some("action") => {
                let raw = text_field(field).await?;
                action = TurnAction::parse(&raw).ok_or_else(|| {
                    (StatusCode::BAD_REQUEST, format!("Unknown action: {raw}"))
                })?;
            }
            Some("image_file") => image = image_field(field).await?,
            _ => {}
        }
    }

    let question = question_text
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());
    if action == TurnAction::Ask && question.is_none() && image.is_none() {
        return Err((StatusCode::BAD_REQUEST, ChatError::EmptyInput.to_string()));
    }

    let session_id = session_id
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let outcome = state
        .chat
        .run_turn(&session_id, action, TurnInput { text: question, image })
        .await
        .map_err(into_http_error)?;

    Ok(Json(AnswerResponse {
        session_id,
        answer: outcome.user_text(),
    }))
}

/// Read a UTF-8 text field from the form.
async fn text_field(field: Field<'_>) -> Result<String, (StatusCode, String)> {
    field
        .text()
        .await
        .map_err(|err| (StatusCode::BAD_REQUEST, format!("Invalid form field: {err}")))
}

/// Read and validate an uploaded image; the allow-list is checked before any
/// model call.
async fn image_field(field: Field<'_>) -> Result<Option<ImageAttachment>, (StatusCode, String)> {
    let mime_type = field.content_type().unwrap_or("").to_string();
    if !ALLOWED_IMAGE_TYPES.contains(&mime_type.as_str()) {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("অনুমোদিত নয় এমন ছবির ধরন (Unsupported image type): {mime_type}"),
        ));
    }

    let data = field
        .bytes()
        .await
        .map_err(|err| (StatusCode::BAD_REQUEST, format!("Invalid image upload: {err}")))?
        .to_vec();
    if data.is_empty() {
        return Ok(None);
    }
    Ok(Some(ImageAttachment { mime_type, data }))
}

/// Map chat errors to the HTTP status codes of the reference behavior.
fn into_http_error(err: ChatError) -> (StatusCode, String) {
    let status = match err {
        ChatError::EmptyInput => StatusCode::BAD_REQUEST,
        ChatError::NoPriorQuestion | ChatError::NoPriorAnswer => StatusCode::NOT_FOUND,
        ChatError::ModelInit(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use crate::chat::{ChatService, SessionConfig};
    use crate::llm::{
        Conversation, LlmError, Message, ModelClient, ModelReply, Role, TurnPayload,
    };

    /// Model stub returning one canned answer and counting calls.
    struct CannedModel {
        answer: &'static str,
        calls: AtomicUsize,
    }

    impl CannedModel {
        fn new(answer: &'static str) -> Arc<Self> {
            Arc::new(Self {
                answer,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ModelClient for CannedModel {
        async fn start_conversation(&self) -> Result<Conversation, LlmError> {
            Ok(Conversation::new())
        }

        async fn send(
            &self,
            conversation: &mut Conversation,
            payload: TurnPayload,
        ) -> Result<ModelReply, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            conversation.push(Message {
                role: Role::User,
                text: payload.text,
                image: payload.image,
            });
            conversation.push(Message {
                role: Role::Model,
                text: self.answer.to_string(),
                image: None,
            });
            Ok(ModelReply::Answered {
                text: self.answer.to_string(),
            })
        }
    }

    fn test_router(model: Arc<CannedModel>) -> Router {
        let chat = ChatService::new(model, SessionConfig::default());
        create_router(AppState::with_service(chat))
    }

    fn json_request(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn response_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoints_answer_ok() {
        for uri in ["/health", "/health_bengali_chem"] {
            let response = test_router(CannedModel::new("উত্তর"))
                .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            let body = response_json(response).await;
            assert_eq!(body["status"].as_str(), Some("ok"));
        }
    }

    #[tokio::test]
    async fn test_ask_creates_session_and_answers() {
        let model = CannedModel::new("জলের সংকেত H₂O।");
        let response = test_router(Arc::clone(&model))
            .oneshot(json_request(
                "/ask",
                serde_json::json!({ "question": "জলের সংকেত কী?" }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = response_json(response).await;
        assert_eq!(body["answer"].as_str(), Some("জলের সংকেত H₂O।"));
        assert!(!body["session_id"].as_str().unwrap_or_default().is_empty());
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_ask_rejects_empty_question() {
        let model = CannedModel::new("উত্তর");
        let response = test_router(Arc::clone(&model))
            .oneshot(json_request(
                "/ask",
                serde_json::json!({ "question": "   " }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_ask_requires_session_for_follow_ups() {
        let model = CannedModel::new("উত্তর");
        // No session id at all.
        let response = test_router(Arc::clone(&model))
            .oneshot(json_request(
                "/ask",
                serde_json::json!({ "question": "আবার", "action": "regenerate" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        // Unknown session id: the text-only variant refuses it too.
        let response = test_router(Arc::clone(&model))
            .oneshot(json_request(
                "/ask",
                serde_json::json!({
                    "session_id": "unknown",
                    "question": "আবার",
                    "action": "simplify"
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_ask_regenerate_flow_keeps_session() {
        let model = CannedModel::new("উত্তর");
        let router = test_router(Arc::clone(&model));

        let response = router
            .clone()
            .oneshot(json_request(
                "/ask",
                serde_json::json!({ "question": "mole কী?" }),
            ))
            .await
            .unwrap();
        let body = response_json(response).await;
        let session_id = body["session_id"].as_str().unwrap_or_default().to_string();

        let response = router
            .oneshot(json_request(
                "/ask",
                serde_json::json!({
                    "session_id": session_id,
                    "question": "আবার বলো",
                    "action": "regenerate"
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response_json(response).await;
        assert_eq!(body["session_id"].as_str(), Some(session_id.as_str()));
        assert_eq!(model.calls.load(Ordering::SeqCst), 2);
    }

    fn multipart_request(boundary: &str, body: String) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/ask_bengali_chem")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn test_multimodal_rejects_disallowed_image_type() {
        let model = CannedModel::new("উত্তর");
        let boundary = "XBOUNDARYX";
        let body = format!(
            "--{boundary}\r\n\
             Content-Disposition: form-data; name=\"image_file\"; filename=\"diagram.bmp\"\r\n\
             Content-Type: image/bmp\r\n\r\n\
             BMDATA\r\n\
             --{boundary}--\r\n"
        );

        let response = test_router(Arc::clone(&model))
            .oneshot(multipart_request(boundary, body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        // Rejected before any model call.
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_multimodal_regenerate_on_fresh_session_is_not_found() {
        let model = CannedModel::new("উত্তর");
        let boundary = "XBOUNDARYX";
        let body = format!(
            "--{boundary}\r\n\
             Content-Disposition: form-data; name=\"session_id\"\r\n\r\n\
             brand-new-session\r\n\
             --{boundary}\r\n\
             Content-Disposition: form-data; name=\"action\"\r\n\r\n\
             regenerate\r\n\
             --{boundary}--\r\n"
        );

        let response = test_router(Arc::clone(&model))
            .oneshot(multipart_request(boundary, body))
            .await
            .unwrap();

        // The multimodal variant re-creates the session, then fails on the
        // missing prior question.
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_multimodal_ask_with_image_answers() {
        let model = CannedModel::new("ছবির উত্তর");
        let boundary = "XBOUNDARYX";
        let body = format!(
            "--{boundary}\r\n\
             Content-Disposition: form-data; name=\"question_text\"\r\n\r\n\
             এই বিক্রিয়াটা ব্যাখ্যা করো\r\n\
             --{boundary}\r\n\
             Content-Disposition: form-data; name=\"image_file\"; filename=\"rxn.png\"\r\n\
             Content-Type: image/png\r\n\r\n\
             PNGDATA\r\n\
             --{boundary}--\r\n"
        );

        let response = test_router(Arc::clone(&model))
            .oneshot(multipart_request(boundary, body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = response_json(response).await;
        assert_eq!(body["answer"].as_str(), Some("ছবির উত্তর"));
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_multimodal_ask_requires_some_input() {
        let model = CannedModel::new("উত্তর");
        let boundary = "XBOUNDARYX";
        let body = format!(
            "--{boundary}\r\n\
             Content-Disposition: form-data; name=\"action\"\r\n\r\n\
             ask\r\n\
             --{boundary}--\r\n"
        );

        let response = test_router(Arc::clone(&model))
            .oneshot(multipart_request(boundary, body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }
}
