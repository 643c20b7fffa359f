//! HTTP transport for the assignment service
//!
//! | Method | Path                            | Success                         |
//! |--------|---------------------------------|---------------------------------|
//! | POST   | `/experiments`                  | 303, `Location`, `{"id": ..}`   |
//! | GET    | `/experiments/{id}`             | 200, experiment JSON            |
//! | POST   | `/experiments/{id}`             | 202, `{"group": n}`             |
//! | GET    | `/experiments/{id}/assignments` | 200, audit records JSON         |
//! | GET    | `/health`                       | 200, `OK`                       |
//!
//! Unknown or malformed experiment ids answer 404.

use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Form, Path, State};
use axum::http::{header, HeaderMap, HeaderName, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::experiment::{ExperimentId, GroupCount, Owner};
use crate::kv::KvStore;
use crate::{AssignmentService, Error};

/// Errors surfaced by HTTP handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Path segment is not a valid experiment id
    #[error("Experiment not found: {0}")]
    UnknownExperiment(String),

    /// Error from the assignment service
    #[error(transparent)]
    Service(#[from] Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            Self::UnknownExperiment(_) | Self::Service(Error::NotFound(_)) => {
                (StatusCode::NOT_FOUND, "NOT_FOUND")
            }
            Self::Service(Error::InvalidArgument(_)) => {
                (StatusCode::BAD_REQUEST, "INVALID_ARGUMENT")
            }
            Self::Service(Error::StoreUnavailable(_)) => {
                tracing::error!(error = %self, "store unavailable");
                (StatusCode::SERVICE_UNAVAILABLE, "STORE_UNAVAILABLE")
            }
            Self::Service(_) => {
                tracing::error!(error = %self, "internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": self.to_string(),
            }
        }));

        (status, body).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

/// Shared handler state.
pub struct AppState<S> {
    service: Arc<AssignmentService<S>>,
    identity_header: HeaderName,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            identity_header: self.identity_header.clone(),
        }
    }
}

/// Build the router.
///
/// `identity_header` names the request header whose value becomes the
/// experiment owner on creation.
pub fn router<S>(service: Arc<AssignmentService<S>>, identity_header: HeaderName) -> Router
where
    S: KvStore + 'static,
{
    let state = AppState {
        service,
        identity_header,
    };

    Router::new()
        .route("/health", get(health_check))
        .route("/experiments", post(create_experiment::<S>))
        .route(
            "/experiments/:id",
            get(show_experiment::<S>).post(assign_next_group::<S>),
        )
        .route("/experiments/:id/assignments", get(list_assignments::<S>))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}

fn parse_id(raw: &str) -> ApiResult<ExperimentId> {
    ExperimentId::from_str(raw).map_err(|_| ApiError::UnknownExperiment(raw.to_string()))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

#[derive(Debug, Deserialize)]
struct CreateExperimentForm {
    #[serde(default)]
    title: String,
    #[serde(default)]
    group_count: String,
}

async fn create_experiment<S: KvStore + 'static>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    Form(form): Form<CreateExperimentForm>,
) -> ApiResult<Response> {
    let group_count = GroupCount::from_str(&form.group_count)?;
    let owner = header_str(&headers, &state.identity_header)
        .filter(|identity| !identity.is_empty())
        .map(Owner::new);

    let id = state
        .service
        .create_experiment(owner, &form.title, i64::from(group_count.get()))
        .await?;

    Ok((
        StatusCode::SEE_OTHER,
        [(header::LOCATION, format!("/experiments/{id}"))],
        Json(json!({ "id": id })),
    )
        .into_response())
}

async fn show_experiment<S: KvStore + 'static>(
    State(state): State<AppState<S>>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let experiment = state.service.experiment(parse_id(&id)?).await?;
    Ok(Json(experiment).into_response())
}

async fn assign_next_group<S: KvStore + 'static>(
    State(state): State<AppState<S>>,
    Path(id): Path<String>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let id = parse_id(&id)?;
    let remote_addr = connect_info
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_default();
    let user_agent = header_str(&headers, &header::USER_AGENT).unwrap_or_default();

    let group = state
        .service
        .assign_next_group(id, &remote_addr, user_agent)
        .await?;

    Ok((StatusCode::ACCEPTED, Json(json!({ "group": group }))).into_response())
}

async fn list_assignments<S: KvStore + 'static>(
    State(state): State<AppState<S>>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let records = state.service.assignments(parse_id(&id)?).await?;
    Ok(Json(records).into_response())
}
