//! Bearer-token principal resolution.
//!
//! Stands in for the session machinery of a full deployment: every request to
//! a protected route carries `Authorization: Bearer <access_token>`, which is
//! resolved to a stored [`Identity`](directorio_store::Identity) and inserted
//! into the request extensions for handlers to consume.

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;

use directorio_store::StoreError;

use crate::api::AppState;
use crate::error::ServerError;

/// Middleware guarding every route that requires an authenticated identity.
pub async fn require_identity(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ServerError> {
    let token = bearer_token(request.headers())
        .ok_or(ServerError::Unauthorized)?
        .to_string();

    let identity = {
        let db = state.db()?;
        db.identity_by_token(&token).map_err(|e| match e {
            StoreError::NotFound => ServerError::Unauthorized,
            other => ServerError::Store(other),
        })?
    };

    tracing::debug!(username = %identity.username, "authenticated request");
    request.extensions_mut().insert(identity);

    Ok(next.run(request).await)
}

/// Extract the token from an `Authorization` header, with or without the
/// `Bearer ` prefix.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let auth = headers.get("authorization")?.to_str().ok()?;
    let token = auth.strip_prefix("Bearer ").unwrap_or(auth).trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}
