//! HTTP routes for `aionfsd`.
//!
//! `/healthz` is public. Everything under `/v1` goes through the auth
//! middleware, which puts a [`Caller`](aionfs_core::auth::Caller) into the
//! request extensions for the handlers. Trailing slashes are trimmed before
//! routing, so `/v1/volumes/` and `/v1/volumes` are the same route.

pub mod checkpoints;
pub mod health;
pub mod volumes;

use std::sync::Arc;

use axum::body::Bytes;
use axum::http::HeaderValue;
use axum::http::header::{CACHE_CONTROL, X_CONTENT_TYPE_OPTIONS};
use axum::{Router, middleware as axum_mw};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tower::{Layer, ServiceBuilder};
use tower_http::normalize_path::{NormalizePath, NormalizePathLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::error::AppError;
use crate::middleware::auth_middleware;
use crate::state::AppState;

/// The application service: the router behind trailing-slash normalisation.
pub type App = NormalizePath<Router>;

/// Build the complete application service.
pub fn app(state: Arc<AppState>) -> App {
    let v1 = Router::new()
        .nest("/v1/volumes", volumes::router())
        .nest("/v1/checkpoints", checkpoints::router())
        .route_layer(axum_mw::from_fn_with_state(
            Arc::clone(&state),
            auth_middleware,
        ));

    let router = Router::new()
        .merge(health::router())
        .merge(v1)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(SetResponseHeaderLayer::overriding(
                    X_CONTENT_TYPE_OPTIONS,
                    HeaderValue::from_static("nosniff"),
                ))
                .layer(SetResponseHeaderLayer::overriding(
                    CACHE_CONTROL,
                    HeaderValue::from_static("no-store"),
                )),
        )
        .with_state(state);

    NormalizePathLayer::trim_trailing_slash().layer(router)
}

/// Body requirement of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Body {
    Required,
    /// An empty body decodes as `T::default()`.
    Optional,
}

/// Decode a JSON object request body. `null` decodes as `T::default()`.
pub(crate) fn decode<T>(bytes: &Bytes, body: Body) -> Result<T, AppError>
where
    T: DeserializeOwned + Default,
{
    if body == Body::Optional && bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    let value: Value = serde_json::from_slice(bytes).map_err(invalid_body)?;
    match value {
        Value::Null => Ok(T::default()),
        Value::Object(_) => serde_json::from_value(value).map_err(invalid_body),
        _ => Err(AppError::InvalidPayload(
            "unable to decode request body: expected a JSON object".to_owned(),
        )),
    }
}

fn invalid_body(e: serde_json::Error) -> AppError {
    AppError::InvalidPayload(format!("unable to decode request body: {e}"))
}
