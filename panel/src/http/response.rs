use crate::error::PanelError;
use crate::services::LifecycleOutcome;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

impl PanelError {
    pub fn status(&self) -> StatusCode {
        match self {
            PanelError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            PanelError::NotFound { .. } => StatusCode::NOT_FOUND,
            PanelError::DaemonUnreachable(_) | PanelError::PartialApplication { .. } => {
                StatusCode::BAD_GATEWAY
            }
            PanelError::Database(_) | PanelError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable token used by the redirect adapter.
    pub fn code(&self) -> &'static str {
        match self {
            PanelError::Validation(_) => "validation",
            PanelError::NotFound { .. } => "not_found",
            PanelError::DaemonUnreachable(_) => "daemon_unreachable",
            PanelError::PartialApplication { .. } => "partial_application",
            PanelError::Database(_) | PanelError::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for PanelError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            PanelError::Validation(errors) => json!({ "errors": errors }),
            PanelError::PartialApplication { server_id, .. } => json!({
                "error": self.to_string(),
                "partial": true,
                "server_id": server_id,
            }),
            PanelError::Database(_) | PanelError::Internal(_) => {
                tracing::error!(error = %self, "request failed");
                json!({ "error": "internal server error" })
            }
            _ => json!({ "error": self.to_string() }),
        };

        (status, Json(body)).into_response()
    }
}

/// 202 for work the daemon finishes later, 204 otherwise. Outcomes carrying
/// warnings are returned as a body so the caller can see them.
pub fn outcome_response(outcome: LifecycleOutcome) -> Response {
    let status = if outcome.action.is_accepted() {
        StatusCode::ACCEPTED
    } else {
        StatusCode::NO_CONTENT
    };

    if outcome.warnings.is_empty() {
        status.into_response()
    } else {
        (StatusCode::OK, Json(outcome)).into_response()
    }
}
