use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};

/// Errors a handler may return to the caller. Messages are fixed strings;
/// underlying causes are logged where they occur and never rendered.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid request body")]
    InvalidBody,

    #[error("Goal is required.")]
    GoalRequired,

    #[error("Failed to fetch from OpenRouter")]
    RelayFailed,

    #[error("Failed to generate roadmap")]
    RoadmapFailed,

    #[error("Invalid JSON format returned from AI.")]
    InvalidModelOutput,
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidBody | Self::GoalRequired => StatusCode::BAD_REQUEST,
            Self::RelayFailed | Self::RoadmapFailed | Self::InvalidModelOutput => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(serde_json::json!({
            "error": self.to_string()
        }))
    }
}
