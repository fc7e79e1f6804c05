use axum::{
    extract::{Query, Request, State},
    http::{HeaderMap, StatusCode, header},
    middleware::Next,
    response::Response,
};
use serde::Deserialize;
use tracing::debug;

use crate::AppState;

/// Header carrying the anonymous access key.
pub const API_KEY_HEADER: &str = "apikey";

#[derive(Debug, Deserialize)]
pub struct KeyQuery {
    pub apikey: Option<String>,
}

/// Reject requests that do not present the anonymous access key.
///
/// The key is read from the `apikey` header, an `Authorization: Bearer`
/// header, or the `apikey` query parameter (browsers cannot set headers on a
/// WebSocket upgrade).
pub async fn require_api_key(
    State(state): State<AppState>,
    Query(query): Query<KeyQuery>,
    req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let presented = key_from_headers(req.headers())
        .map(str::to_owned)
        .or(query.apikey)
        .ok_or(StatusCode::UNAUTHORIZED)?;

    if presented != state.anon_key {
        debug!("Rejected request to {} with a wrong access key", req.uri().path());
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(next.run(req).await)
}

fn key_from_headers(headers: &HeaderMap) -> Option<&str> {
    if let Some(key) = headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok()) {
        return Some(key);
    }

    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn apikey_header_wins_over_bearer() {
        let mut headers = HeaderMap::new();
        headers.insert(API_KEY_HEADER, HeaderValue::from_static("anon"));
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer other"));
        assert_eq!(key_from_headers(&headers), Some("anon"));
    }

    #[test]
    fn bearer_token_is_accepted() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer anon"));
        assert_eq!(key_from_headers(&headers), Some("anon"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic anon"));
        assert_eq!(key_from_headers(&headers), None);
    }
}
