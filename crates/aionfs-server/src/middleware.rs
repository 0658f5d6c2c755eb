//! Authentication middleware for `aionfsd`.
//!
//! Reads `Authorization: Bearer <token>`, resolves it to a principal and
//! inserts the resulting [`Caller`] into the request extensions. Without a
//! resolver every request proceeds as [`Caller::Anonymous`].

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::warn;

use aionfs_core::auth::Caller;

use crate::error::AppError;
use crate::state::AppState;

/// Middleware that resolves the bearer token into a [`Caller`].
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Response {
    let Some(resolver) = state.resolver.as_ref() else {
        req.extensions_mut().insert(Caller::Anonymous);
        return next.run(req).await;
    };

    let token = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_token)
        .map(str::to_owned);

    let Some(token) = token else {
        return AppError::Unauthorized("missing bearer token".to_owned()).into_response();
    };

    match resolver.resolve(&token) {
        Some(principal) => {
            req.extensions_mut().insert(Caller::Principal(principal));
            next.run(req).await
        }
        None => {
            warn!(path = %req.uri().path(), "rejected request with unknown bearer token");
            AppError::Unauthorized("invalid token".to_owned()).into_response()
        }
    }
}

/// Extract the token from a `Bearer` authorization header value.
fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bearer_header() {
        assert_eq!(bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(bearer_token("bearer  abc "), Some("abc"));
        assert_eq!(bearer_token("Bearer "), None);
        assert_eq!(bearer_token("Basic abc"), None);
        assert_eq!(bearer_token("abc"), None);
    }
}
