use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    extract::rejection::JsonRejection,
    http::{ HeaderValue, StatusCode },
    response::{ IntoResponse, Response },
    routing::{ get, post },
};
use log::{ error, info, warn };
use serde::{ Deserialize, Serialize };
use tower_http::cors::{ Any, CorsLayer };

use crate::agent::{ self, EMPTY_REPLY_FALLBACK, ReplySource, RunPolicy };
use crate::error::RelayError;
use crate::llm::{ AssistantBackend, AssistantInfo };
use crate::models::chat::ChatMessage;

#[derive(Clone)]
pub struct AppState {
    backend: Option<Arc<dyn AssistantBackend>>,
    policy: RunPolicy,
}

impl AppState {
    pub fn new(backend: Option<Arc<dyn AssistantBackend>>, policy: RunPolicy) -> Self {
        Self { backend, policy }
    }

    /// The credential check happens here, before any upstream I/O.
    fn backend(&self) -> Result<&dyn AssistantBackend, RelayError> {
        self.backend
            .as_deref()
            .ok_or(RelayError::Configuration("OPENAI_API_KEY"))
    }
}

#[derive(Deserialize)]
pub struct AssistantRequest {
    #[serde(default)]
    pub assistant_id: String,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

#[derive(Deserialize)]
pub struct AgentRequest {
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

#[derive(Serialize)]
pub struct ReplyResponse {
    pub reply: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<&'static str>,
}

#[derive(Serialize)]
pub struct AssistantsResponse {
    pub assistants: Vec<AssistantInfo>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<&'static str>,
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            source: self.stage().map(|stage| stage.as_str()),
            error: self.to_string(),
        };
        (self.status_code(), Json(body)).into_response()
    }
}

fn cors_layer(allowed_origin: &str) -> CorsLayer {
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if allowed_origin == "*" {
        return cors.allow_origin(Any);
    }
    match allowed_origin.parse::<HeaderValue>() {
        Ok(origin) => cors.allow_origin(origin),
        Err(_) => {
            warn!("Invalid ALLOWED_ORIGIN {:?}, allowing any origin", allowed_origin);
            cors.allow_origin(Any)
        }
    }
}

pub fn router(state: AppState, allowed_origin: &str) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/assistant", post(assistant_handler))
        .route("/assistants", get(assistants_handler))
        .route("/agent", post(agent_handler))
        .layer(cors_layer(allowed_origin))
        .with_state(state)
}

async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse { status: "ok" })
}

fn bad_request(rejection: JsonRejection) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorBody {
            error: rejection.body_text(),
            source: None,
        }),
    )
        .into_response()
}

async fn assistant_handler(
    State(state): State<AppState>,
    payload: Result<Json<AssistantRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match payload {
        Ok(json) => json,
        Err(rejection) => return bad_request(rejection),
    };
    info!(
        "Assistant relay request: assistant={}, messages={}",
        req.assistant_id,
        req.messages.len()
    );

    let backend = match state.backend() {
        Ok(backend) => backend,
        Err(err) => {
            error!("{}", err);
            return err.into_response();
        }
    };

    match agent::run_assistant(backend, &req.assistant_id, &req.messages, &state.policy).await {
        Ok(reply) => Json(ReplyResponse {
            reply: reply.text,
            source: match reply.source {
                ReplySource::Assistant => None,
                ReplySource::Completion => Some(reply.source.as_str()),
            },
        })
        .into_response(),
        // A well-formed completion without extractable text is a soft
        // failure: answer with the fallback string instead of a 5xx.
        Err(RelayError::NoReply) => {
            warn!("Run completed without an assistant reply");
            Json(ReplyResponse {
                reply: EMPTY_REPLY_FALLBACK.to_string(),
                source: None,
            })
            .into_response()
        }
        Err(err) => {
            error!("Assistant relay failed: {}", err);
            err.into_response()
        }
    }
}

async fn assistants_handler(State(state): State<AppState>) -> Response {
    let backend = match state.backend() {
        Ok(backend) => backend,
        Err(err) => return err.into_response(),
    };
    match backend.list_assistants().await {
        Ok(assistants) => Json(AssistantsResponse { assistants }).into_response(),
        Err(err) => {
            error!("Assistant listing failed: {}", err);
            err.into_response()
        }
    }
}

async fn agent_handler(
    State(state): State<AppState>,
    payload: Result<Json<AgentRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match payload {
        Ok(json) => json,
        Err(rejection) => return bad_request(rejection),
    };
    if req.messages.is_empty() {
        return RelayError::InvalidRequest("messages must be a non-empty array".into())
            .into_response();
    }

    let backend = match state.backend() {
        Ok(backend) => backend,
        Err(err) => {
            error!("{}", err);
            return err.into_response();
        }
    };

    match backend.respond(&req.messages).await {
        Ok(text) => Json(ReplyResponse {
            reply: if text.is_empty() {
                EMPTY_REPLY_FALLBACK.to_string()
            } else {
                text
            },
            source: None,
        })
        .into_response(),
        Err(err) => {
            error!("Completion relay failed: {}", err);
            err.into_response()
        }
    }
}
