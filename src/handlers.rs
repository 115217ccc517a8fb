use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;

use crate::analysis::AnalysisService;
use crate::config::Config;
use crate::errors::AnalysisError;
use crate::models::{
    AnalysisResult, AnalyzeRequest, CriticalPoint, ErrorBody, FilePayload, Severity, Verdict,
};

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// Normalize, invoke, validate pipeline.
    pub analysis: AnalysisService,
}

#[derive(OpenApi)]
#[openapi(
    paths(analyze, health),
    components(schemas(
        AnalyzeRequest,
        FilePayload,
        AnalysisResult,
        CriticalPoint,
        Verdict,
        Severity,
        ErrorBody
    )),
    tags((name = "analysis", description = "Terms of service risk analysis"))
)]
pub struct ApiDoc;

/// Health check endpoint.
///
/// # Returns
///
/// * `(StatusCode, Json<serde_json::Value>)` - HTTP 200 OK with health status JSON.
#[utoipa::path(
    get,
    path = "/health",
    tag = "analysis",
    responses((status = 200, description = "Service is running"))
)]
pub async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

/// POST /api/analyze
///
/// Normalizes the submitted document, asks the model for a risk assessment
/// and returns it once it passes schema validation.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `payload` - `{input: {type, value}}`; a body that does not deserialize is a validation error.
///
/// # Returns
///
/// * `Result<Json<AnalysisResult>, AnalysisError>` - The assessment or a `{error, raw?}` body.
#[utoipa::path(
    post,
    path = "/api/analyze",
    tag = "analysis",
    request_body = AnalyzeRequest,
    responses(
        (status = 200, description = "Risk assessment", body = AnalysisResult),
        (status = 400, description = "Empty input or missing upstream credential", body = ErrorBody),
        (status = 401, description = "AUTH_ERROR: upstream rejected the credential", body = ErrorBody),
        (status = 429, description = "QUOTA_LIMIT: upstream rate or quota limit", body = ErrorBody),
        (status = 502, description = "Model output invalid or upstream unreachable", body = ErrorBody)
    )
)]
pub async fn analyze(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Result<Json<AnalysisResult>, AnalysisError> {
    let Json(request) = payload.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            AnalysisError::Validation("Uploaded document is too large".to_string())
        } else {
            AnalysisError::Validation(format!("Invalid request body: {}", rejection.body_text()))
        }
    })?;

    tracing::info!("POST /api/analyze - input type: {}", request.input.kind());

    let result = state.analysis.analyze(&request.input).await?;
    Ok(Json(result))
}

/// Bare `OPTIONS` requests that are not CORS preflights still get a 200.
async fn preflight() -> StatusCode {
    StatusCode::OK
}

async fn serve_openapi_spec() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Serves the Swagger UI HTML page, configured to load `/api-docs/openapi.json`.
async fn serve_swagger_ui() -> impl IntoResponse {
    let html = r#"
<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>ToS Guardian API - Swagger UI</title>
    <link rel="stylesheet" type="text/css" href="https://unpkg.com/swagger-ui-dist@5/swagger-ui.css">
    <style>
        body { margin: 0; padding: 0; }
    </style>
</head>
<body>
    <div id="swagger-ui"></div>
    <script src="https://unpkg.com/swagger-ui-dist@5/swagger-ui-bundle.js"></script>
    <script>
        window.onload = function() {
            window.ui = SwaggerUIBundle({
                url: "/api-docs/openapi.json",
                dom_id: '#swagger-ui',
                deepLinking: true
            });
        };
    </script>
</body>
</html>
"#;
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
        html,
    )
}

/// Rewrites the limiter's plain-text 429 into the `{error}` body with the
/// `QUOTA_LIMIT` sentinel, so clients start their cooldown. Quota errors
/// produced by the handler already carry a JSON body and pass through.
async fn quota_envelope(request: Request, next: Next) -> Response {
    let response = next.run(request).await;
    if response.status() != StatusCode::TOO_MANY_REQUESTS {
        return response;
    }
    let is_json = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/json"));
    if is_json {
        return response;
    }

    let retry_after = response.headers().get(header::RETRY_AFTER).cloned();
    let message = match retry_after.as_ref().and_then(|v| v.to_str().ok()) {
        Some(secs) => format!("Too many requests from this client, retry in {}s", secs),
        None => "Too many requests from this client".to_string(),
    };

    let mut rewritten = AnalysisError::Quota(message).into_response();
    if let Some(value) = retry_after {
        rewritten.headers_mut().insert(header::RETRY_AFTER, value);
    }
    rewritten
}

fn cors_layer(config: &Config) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    if config.allowed_origins.is_empty() {
        return base.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    base.allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
}

/// Builds the HTTP application.
///
/// `rate_limited` puts the per-IP limiter in front of the analyze route. It
/// needs the peer address, so the app must then be served with connect info.
pub fn router(state: Arc<AppState>, rate_limited: bool) -> anyhow::Result<Router> {
    let config = state.config.clone();

    let mut analyze_routes =
        Router::new().route("/api/analyze", post(analyze).options(preflight));

    if rate_limited {
        let governor_conf = Arc::new(
            GovernorConfigBuilder::default()
                .per_second(config.rate_limit_replenish_secs)
                .burst_size(config.rate_limit_burst)
                .key_extractor(SmartIpKeyExtractor)
                .finish()
                .ok_or_else(|| anyhow::anyhow!("Invalid rate limit configuration"))?,
        );
        analyze_routes = analyze_routes.layer(
            ServiceBuilder::new()
                .layer(middleware::from_fn(quota_envelope))
                .layer(GovernorLayer {
                    config: governor_conf,
                }),
        );
    }

    let app = Router::new()
        .route("/health", get(health))
        .route("/docs", get(serve_swagger_ui))
        .route("/api-docs/openapi.json", get(serve_openapi_spec))
        .merge(analyze_routes)
        .with_state(state)
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&config));

    Ok(app)
}
