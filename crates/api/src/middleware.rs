use axum::{
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use pharma_core::PharmacyId;

use crate::context::PharmacyContext;

/// Header carrying the pharmacy branch every request is scoped to.
pub const PHARMACY_HEADER: &str = "x-pharmacy-id";

/// Resolve the pharmacy context for a request.
///
/// Every domain route is pharmacy-scoped; a missing header is treated as an
/// unauthenticated request, a malformed one as a bad request.
pub async fn pharmacy_middleware(
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let pharmacy_id = extract_pharmacy_id(req.headers())?;

    req.extensions_mut()
        .insert(PharmacyContext::new(pharmacy_id));

    Ok(next.run(req).await)
}

fn extract_pharmacy_id(headers: &HeaderMap) -> Result<PharmacyId, StatusCode> {
    let header = headers
        .get(PHARMACY_HEADER)
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let header = header.to_str().map_err(|_| StatusCode::BAD_REQUEST)?;

    header.trim().parse().map_err(|_| StatusCode::BAD_REQUEST)
}
