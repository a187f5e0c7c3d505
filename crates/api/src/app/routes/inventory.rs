use std::sync::Arc;

use axum::{
    Json, Router,
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use chrono::Utc;

use crate::app::services::AppServices;
use crate::app::dto;
use crate::context::PharmacyContext;

pub fn router() -> Router {
    Router::new()
        .route("/stock", get(list_stock))
        .route("/stock/low", get(low_stock))
        .route("/stock/expiring", get(expiring_stock))
}

pub async fn list_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(pharmacy): Extension<PharmacyContext>,
) -> axum::response::Response {
    let rows = services.stock_list(pharmacy.pharmacy_id());
    let items = rows.iter().map(dto::stock_to_json).collect::<Vec<_>>();
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "items": items,
            "total_stock": services.stock_total(pharmacy.pharmacy_id()),
        })),
    )
        .into_response()
}

pub async fn low_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(pharmacy): Extension<PharmacyContext>,
) -> axum::response::Response {
    let rows = services.stock_low(pharmacy.pharmacy_id());
    let items = rows.iter().map(dto::stock_to_json).collect::<Vec<_>>();
    (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
}

pub async fn expiring_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(pharmacy): Extension<PharmacyContext>,
) -> axum::response::Response {
    let today = Utc::now().date_naive();
    let rows = services.stock_expiring(pharmacy.pharmacy_id(), today);
    let items = rows.iter().map(dto::stock_to_json).collect::<Vec<_>>();
    (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
}
