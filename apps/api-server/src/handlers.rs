//! HTTP handlers and the state they share.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use domain::{LivenessProbe, User, UserRepository};
use metrics_exporter_prometheus::PrometheusHandle;
use tracing::{error, info, warn};

use crate::metrics;
use crate::request_log::RequestLogData;

/// Shared handler state, built once by `main` and cloned per request.
#[derive(Clone)]
pub struct AppState {
    /// Store behind `POST /user`.
    pub users: Arc<dyn UserRepository>,
    /// Probe run by `GET /healthcheck` (the MySQL pool in production).
    pub probe: Arc<dyn LivenessProbe>,
    pub metrics: PrometheusHandle,
}

/// `GET /healthcheck`: always 200 `WORKING`.
///
/// The database probe only feeds the logs and the failure counter; its result
/// is not reflected in the response.
pub async fn healthcheck(State(state): State<AppState>, log: RequestLogData) -> impl IntoResponse {
    info!(request_id = %log.id, origin_ip = %log.origin_ip, "verify healthcheck");

    match state.probe.probe().await {
        Ok(()) => info!(request_id = %log.id, "mysql probe ok"),
        Err(e) => {
            metrics::inc_probe_failures();
            error!(request_id = %log.id, err = %e, "mysql probe failed");
        }
    }

    (StatusCode::OK, "WORKING")
}

/// `POST /user`: 201 on insert, 400 on an unparsable body, 500 on store failure.
///
/// The raw body is parsed here instead of through `Json<User>` so that every
/// binding failure (syntax, missing field, content type) maps to 400.
pub async fn create_user(
    State(state): State<AppState>,
    log: RequestLogData,
    body: Bytes,
) -> Response {
    let user: User = match serde_json::from_slice(&body) {
        Ok(u) => u,
        Err(e) => {
            warn!(request_id = %log.id, origin_ip = %log.origin_ip, err = %e, "bind payload to user");
            return (
                StatusCode::BAD_REQUEST,
                Json(http_common::json_error_with_message(
                    "invalid_body",
                    &e.to_string(),
                )),
            )
                .into_response();
        }
    };

    match state.users.insert(&user).await {
        Ok(()) => {
            metrics::inc_users_created();
            info!(request_id = %log.id, origin_ip = %log.origin_ip, "create user ok");
            (StatusCode::CREATED, Json(user)).into_response()
        }
        Err(e) => {
            metrics::inc_user_insert_failures();
            error!(request_id = %log.id, origin_ip = %log.origin_ip, err = %e, "create user error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(http_common::json_err("internal")),
            )
                .into_response()
        }
    }
}

/// `GET /metrics`: Prometheus text exposition.
pub async fn render_metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}
