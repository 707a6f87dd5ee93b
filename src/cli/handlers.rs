// HTTP Handlers Module
// Chat completions plus the registry management and observability endpoints.

use super::state::AppState;
use crate::{
    errors::{ConfigError, PlanError},
    openai::{ChatCompletionRequest, ErrorResponse, Model, ModelsResponse},
    planner::{plan_response, ResolvedRequest},
    registry::{ModelProfile, Registration, RegistrySnapshot},
    scheduler::{StreamOutcome, StreamSummary},
    stream::{assemble_completion, ChatStreamBuilder},
    tokens::estimate_tokens,
};
use axum::{
    body::Body,
    extract::{rejection::JsonRejection, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use futures::StreamExt;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

const PREVIEW_CHARS: usize = 50;

/// GET /
pub async fn root() -> impl IntoResponse {
    Json(serde_json::json!({
        "message": "Stream Mocker is running",
        "service": "stream-mocker",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Health check endpoint
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "stream-mocker"
    }))
}

/// POST /v1/chat/completions
pub async fn chat_completions(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ChatCompletionRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let request_start = Instant::now();

    let Json(request) = payload.map_err(|rejection| {
        tracing::warn!(error = %rejection.body_text(), "Malformed chat completion request");
        state.stats.record_error(StatusCode::BAD_REQUEST.as_u16());
        AppError::BadRequest(rejection.body_text())
    })?;

    tracing::info!(
        model = %request.model,
        stream = request.stream,
        messages = request.messages.len(),
        response_length = request.response_length.as_deref().unwrap_or("default"),
        "Chat completion request"
    );

    state
        .stats
        .record_request_start(&request.model, request.stream);

    // Pin one registry version for the whole response
    let snapshot = state.registry.snapshot();
    let plan = match ResolvedRequest::from_chat_request(&request)
        .and_then(|resolved| plan_response(&resolved, &snapshot))
    {
        Ok(plan) => plan,
        Err(error) => {
            tracing::warn!(model = %request.model, %error, "Chat completion rejected");
            state.stats.record_request_failed(error.status_code());
            return Err(error.into());
        }
    };

    let model = plan.model.clone();
    let prompt_tokens = plan.prompt_tokens;

    if request.stream {
        let on_complete = {
            let stats = state.stats.clone();
            let model = model.clone();
            move |summary: &StreamSummary| {
                if summary.outcome == StreamOutcome::Truncated {
                    tracing::info!(
                        model = %model,
                        completion_tokens = summary.completion_tokens,
                        planned_tokens = summary.planned_tokens,
                        "Stream truncated at time limit"
                    );
                }
                tracing::debug!(
                    model = %model,
                    outcome = %summary.outcome,
                    elapsed_ms = summary.elapsed.as_millis() as u64,
                    "Stream finished"
                );
                stats.record_response_end(
                    request_start.elapsed(),
                    prompt_tokens,
                    summary.completion_tokens,
                    summary.outcome,
                );
            }
        };
        let on_cancel = {
            let stats = state.stats.clone();
            let model = model.clone();
            move |emitted: usize| {
                tracing::debug!(model = %model, emitted, "Client disconnected mid-stream");
                stats.record_cancelled(request_start.elapsed(), prompt_tokens, emitted);
            }
        };

        let stream = ChatStreamBuilder::new(model, plan.into_stream(state.clock.clone()))
            .prompt_tokens(prompt_tokens)
            .on_complete(on_complete)
            .on_cancel(on_cancel)
            .build();

        let body = Body::from_stream(stream.into_sse_stream().map(Ok::<_, std::io::Error>));

        Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "text/event-stream")
            .header(header::CACHE_CONTROL, "no-cache")
            .header(header::CONNECTION, "keep-alive")
            .body(body)
            .map_err(|e| AppError::Internal(e.to_string()))
    } else {
        let completion = plan.complete();
        if completion.outcome == StreamOutcome::Truncated {
            tracing::info!(
                model = %model,
                completion_tokens = completion.completion_tokens,
                planned_tokens = plan.tokens.len(),
                "Completion truncated at time limit"
            );
        }

        state.stats.record_response_end(
            request_start.elapsed(),
            prompt_tokens,
            completion.completion_tokens,
            completion.outcome,
        );

        Ok(Json(assemble_completion(model, completion, prompt_tokens)).into_response())
    }
}

/// GET /stats
pub async fn get_stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.stats.snapshot())
}

/// GET /v1/models
pub async fn list_models(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.registry.snapshot();
    let models: Vec<Model> = snapshot
        .models()
        .map(|profile| Model::new(&profile.id, &profile.description))
        .collect();

    Json(ModelsResponse::new(models))
}

/// GET /v1/models/{model_id}
pub async fn get_model(
    State(state): State<Arc<AppState>>,
    Path(model_id): Path<String>,
) -> Result<Json<Model>, AppError> {
    let snapshot = state.registry.snapshot();
    match snapshot.model(&model_id) {
        Some(profile) => Ok(Json(Model::new(&profile.id, &profile.description))),
        None if snapshot.accepts(&model_id) => Ok(Json(Model::new(
            &model_id,
            snapshot.default_description(),
        ))),
        None => Err(PlanError::ModelNotFound(model_id).into()),
    }
}

/// A model profile together with the rate it resolves to
#[derive(Debug, Serialize)]
struct ProfileView<'a> {
    #[serde(flatten)]
    profile: &'a ModelProfile,
    resolved_tokens_per_second: f64,
}

#[derive(Debug, Serialize)]
struct DefaultView<'a> {
    tokens_per_second: f64,
    description: &'a str,
}

fn profile_view<'a>(snapshot: &RegistrySnapshot, profile: &'a ModelProfile) -> ProfileView<'a> {
    ProfileView {
        profile,
        resolved_tokens_per_second: snapshot.resolve_rate(&profile.id),
    }
}

fn default_view(snapshot: &RegistrySnapshot) -> DefaultView<'_> {
    DefaultView {
        tokens_per_second: snapshot.default_rate(),
        description: snapshot.default_description(),
    }
}

/// GET /config
pub async fn get_config(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.registry.snapshot();
    let models: BTreeMap<&str, ProfileView<'_>> = snapshot
        .models()
        .map(|profile| (profile.id.as_str(), profile_view(&snapshot, profile)))
        .collect();

    Json(serde_json::json!({
        "version": snapshot.version(),
        "default": default_view(&snapshot),
        "time_limit": snapshot.time_limits(),
        "default_response_mode": snapshot.default_length().to_string(),
        "auto_response_length": snapshot.auto_bands().bands(),
        "models": models,
    }))
}

/// GET /config/{model}; `default` returns the default profile
pub async fn get_model_config(
    State(state): State<Arc<AppState>>,
    Path(model): Path<String>,
) -> Result<Response, AppError> {
    let snapshot = state.registry.snapshot();
    if let Some(profile) = snapshot.model(&model) {
        return Ok(Json(profile_view(&snapshot, profile)).into_response());
    }
    if model == "default" {
        return Ok(Json(default_view(&snapshot)).into_response());
    }
    Err(PlanError::ModelNotFound(model).into())
}

/// POST /config
pub async fn update_config(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Registration>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(registration) =
        payload.map_err(|rejection| AppError::BadRequest(rejection.body_text()))?;

    let message = state.registry.register(&registration).map_err(|error| {
        tracing::warn!(%error, "Registration rejected");
        AppError::from(error)
    })?;

    Ok(Json(serde_json::json!({
        "message": message,
        "version": state.registry.version(),
    }))
    .into_response())
}

/// POST /config/reload
pub async fn reload_config(State(state): State<Arc<AppState>>) -> Result<Response, AppError> {
    let version = state.reload().map_err(|error| {
        tracing::warn!(%error, "Configuration reload failed");
        AppError::from(error)
    })?;

    Ok(Json(serde_json::json!({
        "message": "Configuration reloaded successfully",
        "version": version,
    }))
    .into_response())
}

#[derive(Debug, Serialize)]
struct ResponsePreview {
    token_estimate: usize,
    preview: String,
}

/// GET /responses
pub async fn list_responses(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.registry.snapshot();
    let previews: BTreeMap<&'static str, ResponsePreview> = snapshot
        .responses()
        .iter()
        .map(|(tag, body)| {
            let preview = ResponsePreview {
                token_estimate: estimate_tokens(body.text()),
                preview: preview(body.text()),
            };
            (tag.as_str(), preview)
        })
        .collect();

    Json(previews)
}

fn preview(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

/// Application error type
#[derive(Debug)]
pub enum AppError {
    Plan(PlanError),
    Config(ConfigError),
    BadRequest(String),
    Internal(String),
}

impl From<PlanError> for AppError {
    fn from(error: PlanError) -> Self {
        AppError::Plan(error)
    }
}

impl From<ConfigError> for AppError {
    fn from(error: ConfigError) -> Self {
        AppError::Config(error)
    }
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        let code = match self {
            AppError::Plan(error) => error.status_code(),
            AppError::Config(error) => error.status_code(),
            AppError::BadRequest(_) => 400,
            AppError::Internal(_) => 500,
        };
        StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_response = match self {
            AppError::Plan(error) => error.to_error_response(),
            AppError::Config(error) => error.to_error_response(),
            AppError::BadRequest(msg) => ErrorResponse::invalid_request(msg),
            AppError::Internal(msg) => ErrorResponse::new(msg, "server_error"),
        };

        let mut response = Json(error_response).into_response();
        *response.status_mut() = status;
        response
    }
}
