use axum::http::{header, HeaderName, Method};
use tower_http::cors::{Any, CorsLayer};

/// Browser clients call `/settle` and the check-in routes from any origin,
/// sending the hosted-client headers along with the bearer token.
pub fn create_cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static("x-client-info"),
            HeaderName::from_static("apikey"),
        ])
        .max_age(std::time::Duration::from_secs(60 * 60)) // 1 hour
}
