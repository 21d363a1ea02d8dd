use axum::{
    extract::Request,
    http::{header, Method},
    middleware::Next,
    response::Response,
};

use crate::error::AppError;

/// Refuse an OPTIONS request that is not a CORS preflight
///
/// Must sit outside the CORS layer, which answers every OPTIONS itself.
pub async fn reject_bare_options(request: Request, next: Next) -> Result<Response, AppError> {
    if request.method() == Method::OPTIONS
        && !request
            .headers()
            .contains_key(header::ACCESS_CONTROL_REQUEST_METHOD)
    {
        return Err(AppError::MethodNotAllowed(request.method().to_string()));
    }

    Ok(next.run(request).await)
}
