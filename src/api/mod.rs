use crate::core::errors::ChatError;
use crate::core::receipts::ViewerRole;
use async_trait::async_trait;
use axum::Json;
use axum::extract::FromRequestParts;
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

pub mod sessions;

pub const X_VIEWER_ROLE: &str = "X-Viewer-Role";

/// Role of the caller, as told by the host page.
#[derive(Debug)]
pub struct ExtractViewer(pub ViewerRole);

#[async_trait]
impl<S> FromRequestParts<S> for ExtractViewer
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Self, (StatusCode, &'static str)> {
        if let Some(role) = parts.headers.get(X_VIEWER_ROLE) {
            let role = role
                .to_str()
                .map_err(|_| (StatusCode::BAD_REQUEST, "invalid viewer role"))?;
            match role.trim().to_ascii_lowercase().as_str() {
                "visitor" => Ok(ExtractViewer(ViewerRole::Visitor)),
                "admin" => Ok(ExtractViewer(ViewerRole::Admin)),
                _ => Err((StatusCode::BAD_REQUEST, "invalid viewer role")),
            }
        } else {
            Err((StatusCode::BAD_REQUEST, "`X-Viewer-Role` header is missing"))
        }
    }
}

#[derive(Serialize, Debug)]
pub struct ErrorBody {
    pub error: String,
}

impl ChatError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ChatError::Validation(_) => StatusCode::BAD_REQUEST,
            ChatError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            ChatError::SessionClosed(_) => StatusCode::CONFLICT,
            ChatError::Transport(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        (
            self.status_code(),
            Json(ErrorBody {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}
