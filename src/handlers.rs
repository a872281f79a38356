use std::sync::Arc;

use actix_web::{web, HttpResponse, ResponseError};
use serde::Deserialize;
use serde_json::Value;

use crate::config::Config;
use crate::error::ApiError;
use crate::recovery;
use crate::roadmap::{roadmap_turns, ROADMAP_PARAMS};
use crate::upstream::{
    complete_within, completion_text, CompletionClient, CompletionRequest, GenerationParams,
};

pub const ANALYZE_PARAMS: GenerationParams = GenerationParams {
    temperature: 0.3,
    max_tokens: 400,
};

pub const HEALTH_TEXT: &str = "EduMate Backend is running!";

/// Shared, read-only state handed to every handler.
pub struct AppState {
    pub config: Config,
    pub client: Arc<dyn CompletionClient>,
}

// ─── Request Types ──────────────────────────────────────────────────────────

// Fields are left as raw JSON so a wrong type maps to the endpoint's own
// validation message instead of a deserialization error.
#[derive(Deserialize)]
struct AnalyzeRequest {
    #[serde(default)]
    messages: Value,
}

#[derive(Deserialize)]
struct RoadmapRequest {
    #[serde(default)]
    goal: Value,
}

// ─── Routes ─────────────────────────────────────────────────────────────────

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/analyze", web::post().to(analyze))
            .service(
                web::resource("/roadmap")
                    .app_data(json_config(ApiError::GoalRequired))
                    .route(web::post().to(roadmap)),
            ),
    )
    .route("/", web::get().to(health));
}

/// JSON extractor settings: 1 MiB limit, and a body that cannot be read is
/// answered with `rejection` in the same `{ "error": ... }` shape as every
/// other failure. `/api/roadmap` overrides the app-wide config so an unreadable
/// body reports the missing goal.
pub fn json_config(rejection: ApiError) -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(1_048_576)
        .error_handler(move |err, req| {
            tracing::warn!(error = %err, path = req.path(), "rejected request body");
            actix_web::error::InternalError::from_response(err, rejection.error_response()).into()
        })
}

async fn health() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/plain; charset=utf-8")
        .body(HEALTH_TEXT)
}

// ─── Analyze Endpoint ───────────────────────────────────────────────────────

async fn analyze(
    state: web::Data<AppState>,
    body: web::Json<AnalyzeRequest>,
) -> Result<HttpResponse, ApiError> {
    let Value::Array(messages) = body.into_inner().messages else {
        return Err(ApiError::InvalidBody);
    };

    tracing::info!(messages = messages.len(), "relaying conversation upstream");

    let request = CompletionRequest::new(state.config.model.as_str(), messages, ANALYZE_PARAMS);
    let response = complete_within(&*state.client, &request, state.config.upstream_timeout)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "analyze: upstream call failed");
            ApiError::RelayFailed
        })?;

    Ok(HttpResponse::Ok().json(response))
}

// ─── Roadmap Endpoint ───────────────────────────────────────────────────────

async fn roadmap(
    state: web::Data<AppState>,
    body: web::Json<RoadmapRequest>,
) -> Result<HttpResponse, ApiError> {
    let goal = body
        .goal
        .as_str()
        .map(str::trim)
        .filter(|g| !g.is_empty())
        .ok_or(ApiError::GoalRequired)?;

    tracing::info!(goal, "generating roadmap");

    let request = CompletionRequest::from_turns(
        state.config.model.as_str(),
        &roadmap_turns(goal),
        ROADMAP_PARAMS,
    )
    .map_err(|e| {
        tracing::error!(error = %e, "roadmap: could not build request");
        ApiError::RoadmapFailed
    })?;

    let response = complete_within(&*state.client, &request, state.config.upstream_timeout)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "roadmap: upstream call failed");
            ApiError::RoadmapFailed
        })?;

    let Some(raw) = completion_text(&response) else {
        tracing::error!(response = %response, "roadmap: no content received from upstream");
        return Err(ApiError::RoadmapFailed);
    };

    let weeks = recovery::recover_roadmap(raw).map_err(|e| {
        tracing::error!(error = %e, raw, "roadmap: model output could not be recovered");
        ApiError::InvalidModelOutput
    })?;

    tracing::info!(weeks = weeks.len(), "roadmap generated");
    Ok(HttpResponse::Ok().json(weeks))
}
