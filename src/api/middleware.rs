//! Middleware Components
//!
//! CORS, request tracking and caller identity.

use crate::types::Identity;
use axum::{
    extract::Request,
    http::{header::HeaderValue, HeaderMap, HeaderName, Method},
    middleware::Next,
    response::Response,
};
use tower_http::cors::{Any, CorsLayer, ExposeHeaders};
use uuid::Uuid;

/// Request ID header key
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Identity headers set by the casino gateway in front of this service
pub const USER_ID_HEADER: &str = "x-user-id";
pub const EXPERIENCE_ID_HEADER: &str = "x-experience-id";
pub const CASINO_ID_HEADER: &str = "x-casino-id";

/// Create CORS middleware with configurable origins
pub fn create_cors_layer(allowed_origins: Vec<String>) -> CorsLayer {
    if allowed_origins.is_empty() || allowed_origins.iter().any(|o| o == "*") {
        // Development mode: allow all origins
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
            .expose_headers(ExposeHeaders::list([HeaderName::from_static(REQUEST_ID_HEADER)]))
    } else {
        CorsLayer::new()
            .allow_origin(
                allowed_origins
                    .into_iter()
                    .filter_map(|o| o.parse().ok())
                    .collect::<Vec<HeaderValue>>(),
            )
            .allow_methods([Method::GET, Method::POST])
            .allow_headers(Any)
            .expose_headers(ExposeHeaders::list([HeaderName::from_static(REQUEST_ID_HEADER)]))
    }
}

/// Middleware to add request ID to all requests
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    // Reuse a client-supplied ID when it is a valid header value
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    request.extensions_mut().insert(RequestId(request_id.clone()));

    let mut response = next.run(request).await;

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    response
}

/// Request ID wrapper for extracting in handlers
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// Caller identity from the gateway headers; `None` unless all three are present and non-empty
pub fn identity_from_headers(headers: &HeaderMap) -> Option<Identity> {
    let read = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    Some(Identity::new(
        read(USER_ID_HEADER)?,
        read(EXPERIENCE_ID_HEADER)?,
        read(CASINO_ID_HEADER)?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_requires_all_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(USER_ID_HEADER, HeaderValue::from_static("u1"));
        headers.insert(EXPERIENCE_ID_HEADER, HeaderValue::from_static("e1"));
        assert!(identity_from_headers(&headers).is_none());

        headers.insert(CASINO_ID_HEADER, HeaderValue::from_static("c1"));
        assert_eq!(
            identity_from_headers(&headers),
            Some(Identity::new("u1", "e1", "c1"))
        );

        headers.insert(USER_ID_HEADER, HeaderValue::from_static("  "));
        assert!(identity_from_headers(&headers).is_none());
    }
}
