//! Authentication gate applied to every route.
//!
//! Two channels are checked in order:
//! 1. the `auth` query parameter, only for image-byte paths;
//! 2. the `Authorization: Basic` header, for every path.
//!
//! A missing or undecodable query token falls through to the header check.
//! Nothing is remembered between requests.

use axum::extract::{Query, Request, State};
use axum::http::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use tracing::{trace, warn};

use super::handlers::ErrorBody;
use super::{AppState, IMAGE_ROUTE_PREFIX};
use crate::auth::basic_header_token;

/// Challenge sent with every rejection so interactive clients prompt.
const CHALLENGE: &str = "Basic realm=\"gallerist\", charset=\"UTF-8\"";

#[derive(Debug, Deserialize)]
struct AuthQuery {
    auth: Option<String>,
}

pub async fn require_credentials(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let path = req.uri().path();

    if path.starts_with(IMAGE_ROUTE_PREFIX) {
        if let Some(token) = query_token(req.uri()) {
            if state.secret.verify_token(&token) {
                trace!(path, "Authenticated via query parameter");
                return next.run(req).await;
            }
            trace!(path, "Query token rejected, checking header");
        }
    }

    if let Some(token) = header_token(req.headers()) {
        if state.secret.verify_token(token) {
            trace!(path, "Authenticated via header");
            return next.run(req).await;
        }
    }

    warn!(path, "Rejected request without valid credentials");
    unauthorized()
}

fn query_token(uri: &Uri) -> Option<String> {
    Query::<AuthQuery>::try_from_uri(uri)
        .ok()
        .and_then(|Query(q)| q.auth)
        .filter(|token| !token.is_empty())
}

fn header_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(basic_header_token)
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(WWW_AUTHENTICATE, CHALLENGE)],
        Json(ErrorBody::new("Unauthorized: Authentication required")),
    )
        .into_response()
}
