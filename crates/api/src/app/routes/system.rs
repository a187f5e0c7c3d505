use std::sync::Arc;

use axum::{
    Json,
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, sse::Event as SseEvent},
};

use crate::app::services::{self, AppServices};

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn whoami(
    Extension(pharmacy): Extension<crate::context::PharmacyContext>,
) -> impl IntoResponse {
    Json(serde_json::json!({
        "pharmacy_id": pharmacy.pharmacy_id().to_string(),
    }))
}

pub async fn stream(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(pharmacy): Extension<crate::context::PharmacyContext>,
) -> axum::response::Sse<impl tokio_stream::Stream<Item = Result<SseEvent, std::convert::Infallible>>>
{
    services::pharmacy_sse_stream(services, pharmacy.pharmacy_id())
}
