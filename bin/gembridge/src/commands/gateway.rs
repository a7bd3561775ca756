use axum::{
    extract::{rejection::JsonRejection, Path, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use gembridge_browser::{ChromeLauncher, Launcher};
use gembridge_core::types::{
    ChatCompletionRequest, ChatCompletionResponse, ErrorResponse, ModelList, ModelObject,
};
use gembridge_core::{ChatError, ChatErrorKind, Config, Paths};
use gembridge_pipeline::{ChatService, SessionHandle};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub(crate) const API_TOKEN_ENV: &str = "GEMBRIDGE_API_TOKEN";

// ---------------------------------------------------------------------------
// Shared state passed to HTTP handlers
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct GatewayState {
    service: Arc<ChatService>,
    /// Advertised by the models endpoint
    models: Arc<Vec<String>>,
    api_token: Option<String>,
    started_at: Instant,
}

impl GatewayState {
    fn new(service: Arc<ChatService>, config: &Config, api_token: Option<String>) -> Self {
        Self {
            service,
            models: Arc::new(config.models.clone()),
            api_token,
            started_at: Instant::now(),
        }
    }

    fn default_model(&self) -> &str {
        self.models.first().map(String::as_str).unwrap_or("gemini")
    }
}

fn secure_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff: u8 = 0;
    for (&x, &y) in a.as_bytes().iter().zip(b.as_bytes().iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

// ---------------------------------------------------------------------------
// Bearer token authentication middleware
// ---------------------------------------------------------------------------

async fn auth_middleware(State(state): State<GatewayState>, req: Request, next: Next) -> Response {
    let token = match &state.api_token {
        Some(t) if !t.is_empty() => t,
        _ => return next.run(req).await,
    };

    let authorized = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(|presented| secure_eq(presented.trim(), token))
        .unwrap_or(false);

    if authorized {
        next.run(req).await
    } else {
        api_error(
            StatusCode::UNAUTHORIZED,
            "Invalid or missing Bearer token",
            "invalid_request_error",
            "invalid_api_key",
        )
    }
}

// ---------------------------------------------------------------------------
// Error envelopes
// ---------------------------------------------------------------------------

fn api_error(status: StatusCode, message: impl Into<String>, error_type: &str, code: &str) -> Response {
    (status, Json(ErrorResponse::new(message, error_type, code))).into_response()
}

fn status_for(kind: ChatErrorKind) -> StatusCode {
    match kind {
        ChatErrorKind::NotReady => StatusCode::SERVICE_UNAVAILABLE,
        ChatErrorKind::Busy => StatusCode::TOO_MANY_REQUESTS,
        ChatErrorKind::UnresolvedCategory => StatusCode::BAD_REQUEST,
        ChatErrorKind::GenerationNeverStarted | ChatErrorKind::GenerationTimedOut => {
            StatusCode::GATEWAY_TIMEOUT
        }
        _ => StatusCode::BAD_GATEWAY,
    }
}

fn error_type_for(status: StatusCode) -> &'static str {
    match status {
        StatusCode::BAD_REQUEST => "invalid_request_error",
        StatusCode::TOO_MANY_REQUESTS => "rate_limit_error",
        StatusCode::SERVICE_UNAVAILABLE => "service_unavailable",
        StatusCode::GATEWAY_TIMEOUT => "timeout_error",
        _ => "upstream_error",
    }
}

fn chat_error_response(err: &ChatError) -> Response {
    let status = status_for(err.kind);
    api_error(status, err.to_string(), error_type_for(status), err.kind.code())
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    session: String,
    version: String,
    uptime_secs: u64,
}

async fn handle_health(State(state): State<GatewayState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        session: state.service.session().state().label().to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}

async fn handle_models(State(state): State<GatewayState>) -> Json<ModelList> {
    Json(ModelList {
        object: "list".to_string(),
        data: state.models.iter().map(|id| ModelObject::new(id)).collect(),
    })
}

async fn handle_model(State(state): State<GatewayState>, Path(id): Path<String>) -> Response {
    match state.service.resolve_model(&id) {
        Ok(_) => Json(ModelObject::new(&id)).into_response(),
        Err(_) => api_error(
            StatusCode::NOT_FOUND,
            format!("The model '{}' does not exist", id),
            "invalid_request_error",
            "model_not_found",
        ),
    }
}

async fn handle_chat_completions(
    State(state): State<GatewayState>,
    body: Result<Json<ChatCompletionRequest>, JsonRejection>,
) -> Response {
    let req = match body {
        Ok(Json(req)) => req,
        Err(rejection) => {
            return api_error(
                StatusCode::BAD_REQUEST,
                rejection.body_text(),
                "invalid_request_error",
                "invalid_json",
            )
        }
    };

    if req.stream {
        warn!("Streaming was requested; answering with a single completion");
    }

    let prompt = req.user_prompt();
    if prompt.trim().is_empty() {
        return api_error(
            StatusCode::BAD_REQUEST,
            "messages must contain at least one user message with text",
            "invalid_request_error",
            "empty_prompt",
        );
    }

    let model = req
        .model
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty());

    match state.service.run_chat(&prompt, model).await {
        Ok(content) => {
            let response = ChatCompletionResponse::single(
                format!("chatcmpl-{}", uuid::Uuid::new_v4().simple()),
                chrono::Utc::now().timestamp(),
                model.unwrap_or(state.default_model()).to_string(),
                content,
            );
            Json(response).into_response()
        }
        Err(e) => {
            warn!(kind = e.kind.code(), stage = %e.stage, "Chat completion failed: {}", e.message);
            chat_error_response(&e)
        }
    }
}

async fn handle_images_generate() -> Response {
    api_error(
        StatusCode::NOT_IMPLEMENTED,
        "Image generation is not implemented",
        "invalid_request_error",
        "not_implemented",
    )
}

async fn handle_embeddings() -> Response {
    api_error(
        StatusCode::NOT_IMPLEMENTED,
        "Embeddings are not implemented",
        "invalid_request_error",
        "not_implemented",
    )
}

fn openai_routes() -> Router<GatewayState> {
    Router::new()
        .route("/models", get(handle_models))
        .route("/models/:id", get(handle_model))
        .route("/chat/completions", post(handle_chat_completions))
        .route("/images/generate", post(handle_images_generate))
        .route("/embeddings", post(handle_embeddings))
}

fn build_router(state: GatewayState) -> Router {
    Router::new()
        .nest("/v1beta/openai", openai_routes())
        .nest("/v1", openai_routes())
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        // Health stays public, outside the auth layer
        .route("/health", get(handle_health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn resolve_api_token(config: &Config) -> Option<String> {
    std::env::var(API_TOKEN_ENV)
        .ok()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .or_else(|| config.api_token())
}

pub async fn run(cli_host: Option<String>, cli_port: Option<u16>) -> anyhow::Result<()> {
    let paths = Paths::new();
    let config = Config::load_or_default(&paths)?;
    paths.ensure_dirs()?;

    let host = cli_host.unwrap_or_else(|| config.gateway.host.clone());
    let port = cli_port.unwrap_or(config.gateway.port);

    // The browser comes up in the background; requests wait on readiness.
    let session = Arc::new(SessionHandle::new());
    let launcher: Arc<dyn Launcher> = Arc::new(ChromeLauncher::new(&config.browser, &paths));
    let startup = session.spawn_startup(launcher);

    let service = Arc::new(ChatService::new(&config, &paths, Arc::clone(&session)));
    let api_token = resolve_api_token(&config);
    if api_token.is_none() {
        warn!("No API token configured; the gateway accepts unauthenticated requests");
    }
    let app = build_router(GatewayState::new(service, &config, api_token));

    let bind_addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "Gateway listening");

    println!();
    println!("gembridge gateway");
    println!("  API:     http://{}/v1beta/openai  (also /v1)", bind_addr);
    println!("  Health:  http://{}/health", bind_addr);
    println!("  Profile: {}", config.browser.profile_dir(&paths).display());
    println!();

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;

    startup.abort();
    if let Some(page) = session.page() {
        if let Err(e) = page.close().await {
            warn!("Failed to close the browser: {}", e);
        }
    }
    Ok(())
}
