use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{HeaderMap, header};
use stash_core::StashError;
use stash_fs::NamespaceRoot;

use crate::AppState;
use crate::error::ApiError;

/// The namespace bound to the request's bearer token.
#[derive(Debug, Clone)]
pub struct AuthenticatedNamespace(pub NamespaceRoot);

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedNamespace {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers).ok_or(StashError::Unauthenticated)?;
        Ok(Self(state.tree.open(token)?))
    }
}

/// Extracts `<token>` from `Authorization: Bearer <token>`.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}
