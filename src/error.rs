use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Unable to determine remote address: {0}")]
    Resolution(String),

    #[error("Render error: {0}")]
    Render(String),
}

impl From<std::fmt::Error> for AppError {
    fn from(e: std::fmt::Error) -> Self {
        Self::Render(e.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        Self::Render(e.to_string())
    }
}

/// Plain-text error body. The raw message is returned to the caller; there is
/// nothing sensitive in an address lookup failure.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            Self::Resolution(e) => tracing::error!("Resolution error: {e}"),
            Self::Render(e) => tracing::error!("Render error: {e}"),
        }

        (
            StatusCode::INTERNAL_SERVER_ERROR,
            [(header::CONTENT_TYPE, "text/plain")],
            self.to_string(),
        )
            .into_response()
    }
}
