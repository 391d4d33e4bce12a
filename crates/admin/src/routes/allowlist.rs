use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::state::SharedState;

/// GET /api/allowlist
///
/// Lists the client keys that bypass detection.
pub async fn list_allowlist(State(state): State<SharedState>) -> Json<Value> {
    let entries = state.engine.whitelisted_clients();
    Json(json!({
        "count": entries.len(),
        "entries": entries,
    }))
}

/// Request body for allowlisting a client.
#[derive(Debug, Deserialize)]
pub struct AllowlistRequest {
    pub client_key: String,
}

/// POST /api/allowlist
///
/// Allowlists a client key. Adding a key twice is not an error.
pub async fn add_to_allowlist(
    State(state): State<SharedState>,
    Json(body): Json<AllowlistRequest>,
) -> impl IntoResponse {
    let client_key = body.client_key.trim();
    if client_key.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "status": "error",
                "message": "client_key must not be empty"
            })),
        );
    }

    if state.engine.whitelist(client_key) {
        (
            StatusCode::CREATED,
            Json(json!({"status": "added", "client_key": client_key})),
        )
    } else {
        (
            StatusCode::OK,
            Json(json!({"status": "exists", "client_key": client_key})),
        )
    }
}

/// DELETE /api/allowlist/{client_key}
pub async fn remove_from_allowlist(
    State(state): State<SharedState>,
    Path(client_key): Path<String>,
) -> impl IntoResponse {
    if state.engine.unwhitelist(&client_key) {
        (
            StatusCode::OK,
            Json(json!({"status": "removed", "client_key": client_key})),
        )
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(json!({
                "status": "error",
                "message": format!("'{}' is not allowlisted", client_key)
            })),
        )
    }
}
