use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;

/// Sentinel prefix for upstream rate/quota exhaustion. Callers match on it.
pub const QUOTA_SENTINEL: &str = "QUOTA_LIMIT";
/// Sentinel prefix for rejected upstream credentials.
pub const AUTH_SENTINEL: &str = "AUTH_ERROR";

/// Failures of an analysis round trip.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisError {
    /// Empty or missing input value. No network call was made.
    Validation(String),
    /// Missing upstream credential or other configuration problem.
    Config(String),
    /// The upstream provider rejected the credential.
    Auth(String),
    /// The upstream provider is rate limiting or out of quota.
    Quota(String),
    /// The model text was not parseable JSON.
    MalformedResponse {
        /// Message describing what was wrong.
        message: String,
        /// The text received, kept for diagnostics.
        raw: String,
    },
    /// The model JSON did not match the result schema.
    SchemaViolation {
        /// One entry per missing or invalid field.
        issues: Vec<String>,
        /// The text received, kept for diagnostics.
        raw: String,
    },
    /// The upstream provider could not be reached (timeouts included).
    Transport(String),
    /// Any other non-success answer from the upstream provider.
    Upstream {
        /// HTTP status (or error code) reported upstream.
        status: u16,
        /// Provider message, if one could be extracted.
        message: String,
    },
    /// The caller abandoned the scan before it completed.
    Cancelled,
    /// Internal server error.
    Internal(String),
}

impl AnalysisError {
    /// HTTP status used when this error reaches the HTTP boundary.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AnalysisError::Validation(_) | AnalysisError::Config(_) => StatusCode::BAD_REQUEST,
            AnalysisError::Auth(_) => StatusCode::UNAUTHORIZED,
            AnalysisError::Quota(_) => StatusCode::TOO_MANY_REQUESTS,
            AnalysisError::MalformedResponse { .. }
            | AnalysisError::SchemaViolation { .. }
            | AnalysisError::Transport(_)
            | AnalysisError::Upstream { .. } => StatusCode::BAD_GATEWAY,
            AnalysisError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            AnalysisError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Raw model text attached to parse and schema failures.
    pub fn raw(&self) -> Option<&str> {
        match self {
            AnalysisError::MalformedResponse { raw, .. }
            | AnalysisError::SchemaViolation { raw, .. } => Some(raw),
            _ => None,
        }
    }

    /// True for errors that should start the client-side cooldown.
    pub fn is_quota(&self) -> bool {
        matches!(self, AnalysisError::Quota(_))
    }
}

impl fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisError::Validation(msg) => write!(f, "{}", msg),
            AnalysisError::Config(msg) => write!(f, "{}", msg),
            AnalysisError::Auth(msg) => write!(f, "{}: {}", AUTH_SENTINEL, msg),
            AnalysisError::Quota(msg) => write!(f, "{}: {}", QUOTA_SENTINEL, msg),
            AnalysisError::MalformedResponse { message, .. } => write!(f, "{}", message),
            AnalysisError::SchemaViolation { issues, .. } => write!(
                f,
                "Model response failed schema validation: {}",
                issues.join("; ")
            ),
            AnalysisError::Transport(msg) => {
                write!(f, "Failed to reach the analysis model: {}", msg)
            }
            AnalysisError::Upstream { status, message } => {
                write!(f, "Upstream model error ({}): {}", status, message)
            }
            AnalysisError::Cancelled => write!(f, "Analysis was cancelled"),
            AnalysisError::Internal(_) => write!(f, "Internal server error"),
        }
    }
}

impl std::error::Error for AnalysisError {}

impl IntoResponse for AnalysisError {
    /// Maps each variant to its status code and a `{error, raw?}` JSON body.
    fn into_response(self) -> Response {
        let status = self.status_code();
        match &self {
            AnalysisError::Validation(msg) => tracing::info!("Rejected input: {}", msg),
            AnalysisError::Config(msg) => tracing::error!("Configuration error: {}", msg),
            AnalysisError::Auth(msg) => tracing::warn!("Upstream auth failure: {}", msg),
            AnalysisError::Quota(msg) => tracing::warn!("Upstream quota exhausted: {}", msg),
            AnalysisError::MalformedResponse { message, raw } => {
                tracing::error!("JSON parse error: {}", message);
                tracing::debug!("Raw model output: {}", raw);
            }
            AnalysisError::SchemaViolation { issues, .. } => {
                tracing::error!("Schema violation: {:?}", issues)
            }
            AnalysisError::Transport(msg) => tracing::error!("Transport error: {}", msg),
            AnalysisError::Upstream { status, message } => {
                tracing::error!("Upstream error {}: {}", status, message)
            }
            AnalysisError::Cancelled => tracing::info!("Analysis cancelled"),
            AnalysisError::Internal(msg) => tracing::error!("Internal error: {}", msg),
        }

        let body = match self.raw() {
            Some(raw) => json!({ "error": self.to_string(), "raw": raw }),
            None => json!({ "error": self.to_string() }),
        };

        (status, Json(body)).into_response()
    }
}

impl From<reqwest::Error> for AnalysisError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AnalysisError::Transport(format!("request timed out: {}", err))
        } else {
            AnalysisError::Transport(err.to_string())
        }
    }
}
