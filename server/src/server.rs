use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::body::Body;
use axum::extract::DefaultBodyLimit;
use axum::extract::Multipart;
use axum::extract::Query;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::http::header;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::post;
use relay_protocol::ChatBody;
use relay_protocol::Message;
use relay_provider::CompletionRequest;
use serde::Deserialize;
use serde_json::json;

use crate::identity::caller_identity;
use crate::relay;
use crate::search;
use crate::search::SearchError;
use crate::state::AppState;
use crate::upload;
use crate::upload::UploadError;

/// Uploads stream through memory in chunks but axum still caps the request
/// body; vector-store files can be large, so raise the cap well above the
/// 2 MB default.
const UPLOAD_BODY_LIMIT: usize = 512 * 1024 * 1024;

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/token", post(issue_token))
        .route("/api/chat", post(chat))
        .route(
            "/api/upload",
            post(upload_files).layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT)),
        )
        .route("/api/google", post(google_answer))
        .route("/api/health-check", post(health_check))
        .with_state(state)
}

/// Provisions a fresh assistant/vector-store pair and returns it sealed in a
/// capability token bound to the caller's identity.
async fn issue_token(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let Some(issuer) = &state.issuer else {
        // Misconfiguration, not a client error. No provisioning happened.
        tracing::error!("token requested but no auth secret is configured");
        return json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "server configuration error",
        );
    };

    let identity = caller_identity(&headers);
    match issuer.issue(&identity).await {
        Ok(token) => Json(json!({ "capabilityToken": token })).into_response(),
        Err(error) => {
            tracing::error!("token issuance failed: {error}");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, &error.to_string())
        }
    }
}

/// Relays one streaming chat completion. The response body is the live
/// upstream token stream; nothing is buffered server-side.
async fn chat(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<ChatBody>,
) -> Response {
    let identity = caller_identity(&headers);
    match relay::open(&state, identity, &body).await {
        Ok(stream) => (
            [
                (header::CONTENT_TYPE, "text/event-stream"),
                (header::CACHE_CONTROL, "no-cache, no-transform"),
                (header::CONNECTION, "keep-alive"),
            ],
            Body::from_stream(stream),
        )
            .into_response(),
        // Provider error text is trusted upstream output and passes through.
        Err(error) => {
            tracing::error!("failed to open upstream stream: {error}");
            (StatusCode::INTERNAL_SERVER_ERROR, error.to_string()).into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadParams {
    /// Raw vector-store handle, for callers that manage their own stores.
    #[serde(default)]
    vector_store_id: Option<String>,
    /// Capability token minted by `/api/token`. Takes precedence over a raw
    /// handle when both are present.
    #[serde(default)]
    token: Option<String>,
}

/// Accepts multipart file uploads and binds them to a vector store resolved
/// from either a capability token or an explicit store id.
async fn upload_files(
    State(state): State<Arc<AppState>>,
    Query(params): Query<UploadParams>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Response {
    let vector_store_id = match params.token.as_deref().filter(|t| !t.is_empty()) {
        Some(token) => {
            let Some(verifier) = &state.verifier else {
                tracing::error!("token presented but no auth secret is configured");
                return json_error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "server configuration error",
                );
            };
            match verifier.verify(token, &caller_identity(&headers)) {
                Ok(handles) => Some(handles.vector_store_id),
                // One opaque message for every rejection; the reason is
                // logged, never returned.
                Err(error) => {
                    tracing::warn!("capability token rejected: {error}");
                    return json_error(StatusCode::UNAUTHORIZED, "invalid capability token");
                }
            }
        }
        None => params.vector_store_id.filter(|v| !v.is_empty()),
    };

    match upload::receive_and_bind(&state.provider, vector_store_id.as_deref(), multipart).await {
        Ok(file_ids) => Json(file_ids).into_response(),
        Err(error @ UploadError::Form(_)) => {
            tracing::warn!("upload rejected: {error}");
            json_error(StatusCode::BAD_REQUEST, &error.to_string())
        }
        Err(error) => {
            tracing::error!("upload failed: {error}");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, &error.to_string())
        }
    }
}

/// Answers the latest user message with web search context. Non-streaming.
async fn google_answer(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<ChatBody>,
) -> Response {
    let identity = caller_identity(&headers);
    match search::answer(&state, identity, &body).await {
        Ok(message) => Json(message).into_response(),
        Err(error @ SearchError::EmptyQuery) => {
            tracing::warn!("search request rejected: {error}");
            json_error(StatusCode::BAD_REQUEST, &error.to_string())
        }
        Err(error) => {
            tracing::error!("search-augmented answer failed: {error}");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, &error.to_string())
        }
    }
}

/// Round-trips a minimal completion through the provider so deployments can
/// probe the whole credential/connectivity path.
async fn health_check(State(state): State<Arc<AppState>>) -> Response {
    let request = CompletionRequest {
        model: state.config.default_model.clone(),
        system_prompt: state.config.default_system_prompt.clone(),
        temperature: Some(state.config.default_temperature),
        messages: vec![Message::user("test")],
        user: String::new(),
        assistant_id: None,
        vector_store_id: None,
    };
    match state.provider.complete(&request).await {
        Ok(_) => Json(json!({ "status": "ok" })).into_response(),
        Err(error) => {
            tracing::error!("health check failed: {error}");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, &error.to_string())
        }
    }
}

fn json_error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}
