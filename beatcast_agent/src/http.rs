//! Pull query: the current snapshot as JSON.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use tracing::warn;

use crate::state::AppState;

const ANY_ORIGIN: [(header::HeaderName, &str); 1] = [(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")];

pub async fn metricbeat_handler(State(state): State<AppState>) -> Response {
    match state.cache.current().await {
        Ok(snapshot) => (ANY_ORIGIN, Json([snapshot.as_ref()])).into_response(),
        Err(e) => {
            warn!("pull query failed: {e}");
            (
                StatusCode::BAD_GATEWAY,
                ANY_ORIGIN,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}
