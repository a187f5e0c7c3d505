use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;

use pharma_core::AggregateId;
use pharma_parties::{
    AdjustDebit, RegisterSupplier, Supplier, SupplierCommand, SupplierContact, SupplierId,
    UpdateSupplier,
};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", post(register_supplier).get(list_suppliers))
        .route("/:id", get(get_supplier).put(update_supplier))
        .route("/:id/debit", post(adjust_debit))
        .route("/:id/debit-log", get(debit_log))
}

pub async fn register_supplier(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(pharmacy): Extension<crate::context::PharmacyContext>,
    Json(body): Json<dto::RegisterSupplierRequest>,
) -> axum::response::Response {
    let supplier_agg = AggregateId::new();
    let supplier_id = SupplierId::new(supplier_agg);

    let cmd = SupplierCommand::RegisterSupplier(RegisterSupplier {
        pharmacy_id: pharmacy.pharmacy_id(),
        supplier_id,
        short: body.short,
        name: body.name,
        kind: body.kind,
        contact: SupplierContact {
            mobile_phone: body.mobile_phone,
            landline_phone: body.landline_phone,
        },
        payment_period_months: body.payment_period_months,
        settlement_date: body.settlement_date,
        checks_due_date: body.checks_due_date,
        occurred_at: Utc::now(),
    });

    let committed = match services.dispatch::<Supplier>(
        pharmacy.pharmacy_id(),
        supplier_agg,
        "parties.supplier",
        cmd,
        |_p, aggregate_id| Supplier::empty(SupplierId::new(aggregate_id)),
    ) {
        Ok(c) => c,
        Err(e) => return errors::dispatch_error_to_response(e),
    };

    (
        StatusCode::CREATED,
        Json(serde_json::json!({
            "id": supplier_agg.to_string(),
            "events_committed": committed.len(),
        })),
    )
        .into_response()
}

pub async fn update_supplier(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(pharmacy): Extension<crate::context::PharmacyContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::UpdateSupplierRequest>,
) -> axum::response::Response {
    let agg: AggregateId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid supplier id"),
    };
    let supplier_id = SupplierId::new(agg);

    // Phone edits merge into the existing contact pair.
    let contact = match (&body.mobile_phone, &body.landline_phone) {
        (None, None) => None,
        (mobile, landline) => {
            let Some(current) = services.suppliers_get(pharmacy.pharmacy_id(), &supplier_id) else {
                return errors::json_error(StatusCode::NOT_FOUND, "not_found", "supplier not found");
            };
            Some(SupplierContact {
                mobile_phone: mobile.clone().unwrap_or(current.contact.mobile_phone),
                landline_phone: landline.clone().or(current.contact.landline_phone),
            })
        }
    };

    let cmd = SupplierCommand::UpdateSupplier(UpdateSupplier {
        pharmacy_id: pharmacy.pharmacy_id(),
        supplier_id,
        name: body.name,
        contact,
        payment_period_months: body.payment_period_months,
        settlement_date: body.settlement_date,
        checks_due_date: body.checks_due_date,
        occurred_at: Utc::now(),
    });

    let committed = match services.dispatch::<Supplier>(
        pharmacy.pharmacy_id(),
        agg,
        "parties.supplier",
        cmd,
        |_p, aggregate_id| Supplier::empty(SupplierId::new(aggregate_id)),
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

pub async fn adjust_debit(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(pharmacy): Extension<crate::context::PharmacyContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::AdjustDebitRequest>,
) -> axum::response::Response {
    let agg: AggregateId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid supplier id"),
    };

    let cmd = SupplierCommand::AdjustDebit(AdjustDebit {
        pharmacy_id: pharmacy.pharmacy_id(),
        supplier_id: SupplierId::new(agg),
        delta: body.delta,
        reason: body.reason,
        occurred_at: Utc::now(),
    });

    let committed = match services.dispatch::<Supplier>(
        pharmacy.pharmacy_id(),
        agg,
        "parties.supplier",
        cmd,
        |_p, aggregate_id| Supplier::empty(SupplierId::new(aggregate_id)),
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

pub async fn debit_log(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(pharmacy): Extension<crate::context::PharmacyContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let agg: AggregateId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid supplier id"),
    };

    match services.supplier_debit_log(pharmacy.pharmacy_id(), SupplierId::new(agg)) {
        Ok(log) => (
            StatusCode::OK,
            Json(serde_json::json!({ "items": dto::debit_log_to_json(log) })),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn get_supplier(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(pharmacy): Extension<crate::context::PharmacyContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let agg: AggregateId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid supplier id"),
    };
    let supplier_id = SupplierId::new(agg);
    match services.suppliers_get(pharmacy.pharmacy_id(), &supplier_id) {
        Some(rm) => {
            let today = Utc::now().date_naive();
            (StatusCode::OK, Json(dto::supplier_to_json(rm, today))).into_response()
        }
        None => errors::json_error(StatusCode::NOT_FOUND, "not_found", "supplier not found"),
    }
}

pub async fn list_suppliers(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(pharmacy): Extension<crate::context::PharmacyContext>,
) -> axum::response::Response {
    let today = Utc::now().date_naive();
    let items = services
        .suppliers_list(pharmacy.pharmacy_id())
        .into_iter()
        .map(|rm| dto::supplier_to_json(rm, today))
        .collect::<Vec<_>>();
    (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
}
