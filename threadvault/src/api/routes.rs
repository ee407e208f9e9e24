use super::server::AppState;
use crate::backend::health::EndpointStatus;
use crate::backend::EndpointState;
use crate::content_type::ContentType;
use crate::error::{Error, ValidationError};
use crate::query::RawParams;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

const SEARCH_CACHE_CONTROL: &str = "public, max-age=2, s-maxage=2";
const COMMENT_IDS_CACHE_CONTROL: &str = "public, max-age=5, s-maxage=5";

type QueryPairs = Result<Query<Vec<(String, String)>>, QueryRejection>;

/// Undecodable query strings get the JSON validation envelope, not axum's text body
fn query_rejected(rejection: QueryRejection) -> Error {
    Error::Validation(ValidationError::new("query", rejection.body_text()))
}

/// GET /search/:content_type
pub async fn search(
    State(state): State<AppState>,
    Path(content_type): Path<String>,
    pairs: QueryPairs,
) -> Result<Response, Error> {
    let content_type: ContentType = content_type.parse()?;
    run_search(&state, content_type, pairs).await
}

/// Legacy comment search aliases
pub async fn search_comments(
    State(state): State<AppState>,
    pairs: QueryPairs,
) -> Result<Response, Error> {
    run_search(&state, ContentType::Comment, pairs).await
}

/// Legacy submission search aliases
pub async fn search_submissions(
    State(state): State<AppState>,
    pairs: QueryPairs,
) -> Result<Response, Error> {
    run_search(&state, ContentType::Submission, pairs).await
}

async fn run_search(
    state: &AppState,
    content_type: ContentType,
    pairs: QueryPairs,
) -> Result<Response, Error> {
    let Query(pairs) = pairs.map_err(query_rejected)?;
    let raw: RawParams = pairs.into_iter().collect();
    let result = state.gateway.search(content_type, &raw).await?;
    Ok((
        [(header::CACHE_CONTROL, SEARCH_CACHE_CONTROL)],
        Json(result),
    )
        .into_response())
}

/// GET /analyze/user/:username
pub async fn analyze_user(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<Response, Error> {
    let summary = state.gateway.analyze_user(&username).await?;
    Ok(Json(summary).into_response())
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CommentIdsResponse {
    pub data: Vec<String>,
}

/// GET /submission/comment_ids/:id
pub async fn comment_ids(
    State(state): State<AppState>,
    Path(submission_id): Path<String>,
) -> Result<Response, Error> {
    let data = state.gateway.comment_ids(&submission_id).await?;
    Ok((
        [(header::CACHE_CONTROL, COMMENT_IDS_CACHE_CONTROL)],
        Json(CommentIdsResponse { data }),
    )
        .into_response())
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub endpoints: Vec<EndpointStatus>,
    pub relational: bool,
}

/// GET /health
///
/// 503 only when every search endpoint is unavailable.
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let endpoints = state.gateway.endpoint_health();
    let unavailable = endpoints
        .iter()
        .filter(|e| e.state == EndpointState::Unavailable)
        .count();

    let (status, code) = if unavailable == endpoints.len() {
        ("unavailable", StatusCode::SERVICE_UNAVAILABLE)
    } else if endpoints.iter().all(|e| e.state == EndpointState::Healthy) {
        ("ok", StatusCode::OK)
    } else {
        ("degraded", StatusCode::OK)
    };

    (
        code,
        Json(HealthResponse {
            status: status.to_string(),
            relational: state.gateway.executor().has_relational(),
            endpoints,
        }),
    )
}

/// GET /metrics
pub async fn metrics(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(render) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            render(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
