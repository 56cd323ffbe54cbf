use axum::extract::{Query, State};
use axum::response::Response;
use axum::Json;
use orchestrator::{JobPlan, JobRequest, SessionController};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info};
use utoipa::{IntoParams, ToSchema};

use crate::error::AppError;
use crate::routes::sse::{event_stream, SESSION_CHANNEL_CAPACITY};
use crate::state::AppState;

const DEFAULT_CHAIN: &str = "solana";
const DEFAULT_PATTERN: &str = "test";

/// `count` arrives as a string in query strings and usually as a number in
/// JSON bodies.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum CountParam {
    Number(u64),
    Text(String),
}

#[derive(Debug, Default, Deserialize, ToSchema, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct GenerateParams {
    /// Target chain; informational only
    pub chain: Option<String>,
    /// Pattern the address must start (or end) with (default `test`)
    pub pattern: Option<String>,
    /// `prefix`, `suffix` or `both`; anything else means `prefix`
    pub position: Option<String>,
    /// Second pattern, used when `position` is `both`
    pub suffix: Option<String>,
    /// Matches to find per phase (default 1)
    #[serde(default)]
    #[schema(value_type = Option<u32>)]
    #[param(value_type = Option<u32>)]
    pub count: Option<CountParam>,
}

impl GenerateParams {
    fn into_request(self, dual: bool, max_count: u32) -> Result<JobRequest, AppError> {
        let pattern = match self.pattern {
            None => DEFAULT_PATTERN.to_string(),
            Some(pattern) if pattern.trim().is_empty() => {
                return Err(AppError::BadRequest("pattern must not be blank".to_string()));
            }
            Some(pattern) => pattern,
        };

        // Dual searches always look for one match per position.
        let count = if dual {
            None
        } else {
            parse_count(self.count, max_count)?
        };

        Ok(JobRequest {
            chain: self.chain.unwrap_or_else(|| DEFAULT_CHAIN.to_string()),
            pattern,
            position: self.position,
            suffix: self.suffix,
            count,
            dual,
        })
    }
}

fn parse_count(count: Option<CountParam>, max_count: u32) -> Result<Option<u32>, AppError> {
    let value = match count {
        None => return Ok(None),
        Some(CountParam::Text(text)) if text.trim().is_empty() => return Ok(None),
        Some(CountParam::Text(text)) => text
            .trim()
            .parse::<u64>()
            .map_err(|_| AppError::BadRequest(format!("count must be a number, got {:?}", text)))?,
        Some(CountParam::Number(n)) => n,
    };

    if value == 0 || value > u64::from(max_count) {
        return Err(AppError::BadRequest(format!(
            "count must be between 1 and {}",
            max_count
        )));
    }

    Ok(Some(value as u32))
}

#[utoipa::path(
    get,
    path = "/generate",
    params(GenerateParams),
    responses(
        (status = 200, description = "SSE stream of search events", content_type = "text/event-stream"),
        (status = 400, description = "Invalid search parameters"),
        (status = 503, description = "Session limit reached"),
    ),
    tag = "generate"
)]
pub async fn generate(
    State(state): State<AppState>,
    Query(params): Query<GenerateParams>,
) -> Result<Response, AppError> {
    start_session(&state, params, false)
}

#[utoipa::path(
    post,
    path = "/generate",
    request_body = GenerateParams,
    responses(
        (status = 200, description = "SSE stream of search events", content_type = "text/event-stream"),
        (status = 400, description = "Invalid search parameters"),
        (status = 503, description = "Session limit reached"),
    ),
    tag = "generate"
)]
pub async fn generate_json(
    State(state): State<AppState>,
    body: Option<Json<GenerateParams>>,
) -> Result<Response, AppError> {
    let params = body.map(|Json(params)| params).unwrap_or_default();
    start_session(&state, params, false)
}

/// Legacy endpoint: searches `pattern` as a prefix and then as a suffix.
#[utoipa::path(
    get,
    path = "/generate-both",
    params(GenerateParams),
    responses(
        (status = 200, description = "SSE stream of search events", content_type = "text/event-stream"),
        (status = 400, description = "Invalid search parameters"),
        (status = 503, description = "Session limit reached"),
    ),
    tag = "generate"
)]
pub async fn generate_both(
    State(state): State<AppState>,
    Query(params): Query<GenerateParams>,
) -> Result<Response, AppError> {
    start_session(&state, params, true)
}

#[utoipa::path(
    post,
    path = "/generate-both",
    request_body = GenerateParams,
    responses(
        (status = 200, description = "SSE stream of search events", content_type = "text/event-stream"),
        (status = 400, description = "Invalid search parameters"),
        (status = 503, description = "Session limit reached"),
    ),
    tag = "generate"
)]
pub async fn generate_both_json(
    State(state): State<AppState>,
    body: Option<Json<GenerateParams>>,
) -> Result<Response, AppError> {
    let params = body.map(|Json(params)| params).unwrap_or_default();
    start_session(&state, params, true)
}

/// Validate the request, spawn its session and hand back the event stream.
fn start_session(state: &AppState, params: GenerateParams, dual: bool) -> Result<Response, AppError> {
    let request = params.into_request(dual, state.config.max_count)?;
    let plan = JobPlan::resolve(&request, state.worker_binary())?;
    let permit = state.acquire_session()?;

    let (tx, rx) = mpsc::channel(SESSION_CHANNEL_CAPACITY);
    let controller = SessionController::new(plan, tx);

    info!(
        session_id = %controller.session_id(),
        chain = %request.chain,
        pattern = %request.pattern,
        suffix = ?request.suffix,
        position = ?request.position,
        count = ?request.count,
        dual,
        "Starting search session"
    );

    tokio::spawn(async move {
        let _permit = permit;
        let report = controller.run().await;
        debug!(
            session_id = %report.session_id,
            outcome = %report.outcome,
            "Session slot released"
        );
    });

    Ok(event_stream(rx))
}
