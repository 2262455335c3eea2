use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use serde::{Deserialize, Serialize};
use stash_core::StashError;

use crate::AppState;
use crate::error::{ApiError, ApiResult};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    pub namespace: String,
    pub username: String,
    /// Token lifetime in seconds.
    pub expires_in: u64,
}

/// Exchange account credentials for an identity token.
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<Json<LoginResponse>> {
    let Json(request) = payload?;
    if request.username.trim().is_empty() || request.password.is_empty() {
        return Err(ApiError::bad_request("username and password are required"));
    }

    let namespace = state
        .identities
        .authenticate(&request.username, &request.password)
        .await
        .ok_or(StashError::Unauthenticated)?;
    // An account whose root is gone cannot do anything with a token.
    state.tree.namespaces().resolve_root(&namespace)?;

    let tokens = state.tree.tokens();
    let token = tokens.issue(&namespace)?;
    tracing::info!(username = %request.username, "issued identity token");

    Ok(Json(LoginResponse {
        token,
        namespace,
        username: request.username,
        expires_in: tokens.ttl().as_secs(),
    }))
}
