use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;

use pharma_catalog::MedicineId;
use pharma_core::AggregateId;
use pharma_sales::{RecordSale, Sale, SaleCommand, SaleId, SaleLineInput, VoidSale};

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::PharmacyContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(record_sale))
        .route("/stats", get(sales_stats))
        .route("/:id/void", post(void_sale))
}

pub async fn record_sale(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(pharmacy): Extension<PharmacyContext>,
    Json(body): Json<dto::RecordSaleRequest>,
) -> axum::response::Response {
    let mut lines = Vec::with_capacity(body.lines.len());
    for line in body.lines {
        let medicine_agg: AggregateId = match line.medicine_id.parse() {
            Ok(v) => v,
            Err(_) => {
                return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid medicine id");
            }
        };
        let medicine_id = MedicineId::new(medicine_agg);

        let Some(medicine) = services.medicines_get(pharmacy.pharmacy_id(), &medicine_id) else {
            return errors::json_error(StatusCode::NOT_FOUND, "not_found", "medicine not found");
        };

        lines.push(SaleLineInput {
            medicine_id,
            medicine_name: medicine.name,
            unit: medicine.unit,
            quantity: line.quantity,
            unit_price: line.unit_price.unwrap_or(medicine.pricing.sale_price),
            cost: medicine.pricing.cost,
        });
    }

    let sale_agg = AggregateId::new();
    let sale_id = SaleId::new(sale_agg);

    let cmd = SaleCommand::RecordSale(RecordSale {
        pharmacy_id: pharmacy.pharmacy_id(),
        sale_id,
        lines,
        occurred_at: Utc::now(),
    });

    let committed = match services.dispatch::<Sale>(
        pharmacy.pharmacy_id(),
        sale_agg,
        "sales.sale",
        cmd,
        |_p, aggregate_id| Sale::empty(SaleId::new(aggregate_id)),
    ) {
        Ok(c) => c,
        Err(e) => return errors::dispatch_error_to_response(e),
    };

    (
        StatusCode::CREATED,
        Json(serde_json::json!({
            "id": sale_agg.to_string(),
            "events_committed": committed.len(),
        })),
    )
        .into_response()
}

pub async fn void_sale(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(pharmacy): Extension<PharmacyContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::VoidRequest>,
) -> axum::response::Response {
    let agg: AggregateId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid sale id"),
    };

    let cmd = SaleCommand::VoidSale(VoidSale {
        pharmacy_id: pharmacy.pharmacy_id(),
        sale_id: SaleId::new(agg),
        reason: body.reason,
        occurred_at: Utc::now(),
    });

    let committed = match services.dispatch::<Sale>(
        pharmacy.pharmacy_id(),
        agg,
        "sales.sale",
        cmd,
        |_p, aggregate_id| Sale::empty(SaleId::new(aggregate_id)),
    ) {
        Ok(c) => c,
        Err(e) => return errors::dispatch_error_to_response(e),
    };
    (
        StatusCode::OK,
        Json(serde_json::json!({"id": agg.to_string(), "events_committed": committed.len()})),
    )
        .into_response()
}

/// The sales overview cards: today's totals, best seller, stock alerts.
pub async fn sales_stats(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(pharmacy): Extension<PharmacyContext>,
) -> axum::response::Response {
    let pharmacy_id = pharmacy.pharmacy_id();
    let today = Utc::now().date_naive();

    let day = services.sales_daily(pharmacy_id, today);
    let best = services.sales_best_seller(pharmacy_id);

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "best_selling_medicine": best.map(|b| serde_json::json!({
                "name": b.medicine_name,
                "sales": b.sold,
                "unit": b.unit,
            })),
            "low_stock_items": services.stock_low(pharmacy_id).len(),
            "expiring_items": services.stock_expiring(pharmacy_id, today).len(),
            "total_stock": services.stock_total(pharmacy_id),
            "today_sales": day.sales_total,
            "today_profit": day.profit_total,
            "today_invoices": day.sale_count,
        })),
    )
        .into_response()
}
