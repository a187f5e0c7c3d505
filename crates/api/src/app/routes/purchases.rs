use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
};
use chrono::{Months, Utc};
use serde::Deserialize;

use pharma_catalog::MedicineId;
use pharma_core::AggregateId;
use pharma_parties::SupplierId;
use pharma_purchasing::{
    AddItem, Adjustments, ItemInput, LineItem, MarkPaid, OpenInvoice, PurchaseInvoice,
    PurchaseInvoiceCommand, PurchaseInvoiceId, RemoveItem, SaveInvoice, SetAdjustments, UpdateItem,
    VoidInvoice, compute_totals,
};

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::PharmacyContext;

pub fn router() -> Router {
    Router::new().nest("/invoices", invoices_router())
}

fn invoices_router() -> Router {
    Router::new()
        .route("/", post(create_invoice).get(list_invoices))
        .route("/preview", post(preview_totals))
        .route("/:id", get(get_invoice))
        .route("/:id/items", post(add_item))
        .route("/:id/items/:line_no", put(update_item).delete(remove_item))
        .route("/:id/adjustments", post(set_adjustments))
        .route("/:id/save", post(save_invoice))
        .route("/:id/pay", post(mark_paid))
        .route("/:id/void", post(void_invoice))
}

fn make_invoice(
    _p: pharma_core::PharmacyId,
    aggregate_id: AggregateId,
) -> PurchaseInvoice {
    PurchaseInvoice::empty(PurchaseInvoiceId::new(aggregate_id))
}

/// Resolve an item request against the catalog: snapshot name/code, default
/// the package size and expirable flag from the medicine record, and refuse
/// discontinued medicines.
fn resolve_item(
    services: &AppServices,
    pharmacy: &PharmacyContext,
    req: dto::PurchaseItemRequest,
) -> Result<ItemInput, axum::response::Response> {
    let medicine_agg: AggregateId = req.medicine_id.parse().map_err(|_| {
        errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid medicine id")
    })?;
    let medicine_id = MedicineId::new(medicine_agg);

    let medicine = services
        .medicines_get(pharmacy.pharmacy_id(), &medicine_id)
        .ok_or_else(|| {
            errors::json_error(StatusCode::NOT_FOUND, "not_found", "medicine not found")
        })?;

    if medicine.status != pharma_catalog::MedicineStatus::Active {
        return Err(errors::json_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "invariant_violation",
            format!("medicine '{}' is discontinued", medicine.code),
        ));
    }

    Ok(ItemInput {
        medicine_id,
        medicine_name: medicine.name,
        medicine_code: medicine.code,
        quantity: req.quantity,
        units_per_package: req.units_per_package.unwrap_or(medicine.units_per_package),
        sale_price: req.sale_price,
        cost: req.cost,
        tax_rate: req.tax_rate,
        main_discount: req.main_discount,
        extra_discount: req.extra_discount,
        bonus: req.bonus,
        expirable: req.expirable.unwrap_or(medicine.expirable),
        expiry_date: req.expiry_date,
    })
}

/// The add-purchase form submit: open a draft, add every item, apply
/// adjustments, save. One request, several commands on the same stream.
pub async fn create_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(pharmacy): Extension<PharmacyContext>,
    Json(body): Json<dto::CreatePurchaseInvoiceRequest>,
) -> axum::response::Response {
    let supplier_agg: AggregateId = match body.supplier_id.parse() {
        Ok(v) => v,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid supplier id"),
    };
    let supplier_id = SupplierId::new(supplier_agg);

    let Some(supplier) = services.suppliers_get(pharmacy.pharmacy_id(), &supplier_id) else {
        return errors::json_error(StatusCode::NOT_FOUND, "not_found", "supplier not found");
    };

    let invoice_date = body.invoice_date.unwrap_or_else(|| Utc::now().date_naive());
    let due_date = if supplier.payment_period_months > 0 {
        invoice_date.checked_add_months(Months::new(supplier.payment_period_months))
    } else {
        None
    };

    let invoice_agg = AggregateId::new();
    let invoice_id = PurchaseInvoiceId::new(invoice_agg);
    let invoice_number = format!("INV-{}", Utc::now().timestamp_millis());

    let mut committed_total = 0usize;

    // 1) Open the draft
    let cmd = PurchaseInvoiceCommand::OpenInvoice(OpenInvoice {
        pharmacy_id: pharmacy.pharmacy_id(),
        invoice_id,
        invoice_number: invoice_number.clone(),
        invoice_date,
        supplier_id,
        supplier_name: supplier.name.clone(),
        notes: body.notes,
        due_date,
        occurred_at: Utc::now(),
    });
    match services.dispatch::<PurchaseInvoice>(
        pharmacy.pharmacy_id(),
        invoice_agg,
        "purchasing.invoice",
        cmd,
        make_invoice,
    ) {
        Ok(c) => committed_total += c.len(),
        Err(e) => return errors::dispatch_error_to_response(e),
    }

    // 2) Add items
    for item_req in body.items {
        let item = match resolve_item(&services, &pharmacy, item_req) {
            Ok(i) => i,
            Err(resp) => return resp,
        };
        let cmd = PurchaseInvoiceCommand::AddItem(AddItem {
            pharmacy_id: pharmacy.pharmacy_id(),
            invoice_id,
            item,
            occurred_at: Utc::now(),
        });
        match services.dispatch::<PurchaseInvoice>(
            pharmacy.pharmacy_id(),
            invoice_agg,
            "purchasing.invoice",
            cmd,
            make_invoice,
        ) {
            Ok(c) => committed_total += c.len(),
            Err(e) => return errors::dispatch_error_to_response(e),
        }
    }

    // 3) Invoice-level adjustments
    if let Some(adjustments) = body.adjustments {
        let cmd = PurchaseInvoiceCommand::SetAdjustments(SetAdjustments {
            pharmacy_id: pharmacy.pharmacy_id(),
            invoice_id,
            adjustments,
            occurred_at: Utc::now(),
        });
        match services.dispatch::<PurchaseInvoice>(
            pharmacy.pharmacy_id(),
            invoice_agg,
            "purchasing.invoice",
            cmd,
            make_invoice,
        ) {
            Ok(c) => committed_total += c.len(),
            Err(e) => return errors::dispatch_error_to_response(e),
        }
    }

    // 4) Freeze
    let cmd = PurchaseInvoiceCommand::SaveInvoice(SaveInvoice {
        pharmacy_id: pharmacy.pharmacy_id(),
        invoice_id,
        occurred_at: Utc::now(),
    });
    match services.dispatch::<PurchaseInvoice>(
        pharmacy.pharmacy_id(),
        invoice_agg,
        "purchasing.invoice",
        cmd,
        make_invoice,
    ) {
        Ok(c) => committed_total += c.len(),
        Err(e) => return errors::dispatch_error_to_response(e),
    }

    (
        StatusCode::CREATED,
        Json(serde_json::json!({
            "id": invoice_agg.to_string(),
            "invoice_number": invoice_number,
            "events_committed": committed_total,
        })),
    )
        .into_response()
}

pub async fn add_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(pharmacy): Extension<PharmacyContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::PurchaseItemRequest>,
) -> axum::response::Response {
    let agg: AggregateId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid invoice id"),
    };
    let invoice_id = PurchaseInvoiceId::new(agg);

    let item = match resolve_item(&services, &pharmacy, body) {
        Ok(i) => i,
        Err(resp) => return resp,
    };

    let cmd = PurchaseInvoiceCommand::AddItem(AddItem {
        pharmacy_id: pharmacy.pharmacy_id(),
        invoice_id,
        item,
        occurred_at: Utc::now(),
    });
    let committed = match services.dispatch::<PurchaseInvoice>(
        pharmacy.pharmacy_id(),
        agg,
        "purchasing.invoice",
        cmd,
        make_invoice,
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

pub async fn update_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(pharmacy): Extension<PharmacyContext>,
    Path((id, line_no)): Path<(String, u32)>,
    Json(body): Json<dto::PurchaseItemRequest>,
) -> axum::response::Response {
    let agg: AggregateId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid invoice id"),
    };
    let invoice_id = PurchaseInvoiceId::new(agg);

    let item = match resolve_item(&services, &pharmacy, body) {
        Ok(i) => i,
        Err(resp) => return resp,
    };

    let cmd = PurchaseInvoiceCommand::UpdateItem(UpdateItem {
        pharmacy_id: pharmacy.pharmacy_id(),
        invoice_id,
        line_no,
        item,
        occurred_at: Utc::now(),
    });
    let committed = match services.dispatch::<PurchaseInvoice>(
        pharmacy.pharmacy_id(),
        agg,
        "purchasing.invoice",
        cmd,
        make_invoice,
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

pub async fn remove_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(pharmacy): Extension<PharmacyContext>,
    Path((id, line_no)): Path<(String, u32)>,
) -> axum::response::Response {
    let agg: AggregateId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid invoice id"),
    };

    let cmd = PurchaseInvoiceCommand::RemoveItem(RemoveItem {
        pharmacy_id: pharmacy.pharmacy_id(),
        invoice_id: PurchaseInvoiceId::new(agg),
        line_no,
        occurred_at: Utc::now(),
    });
    let committed = match services.dispatch::<PurchaseInvoice>(
        pharmacy.pharmacy_id(),
        agg,
        "purchasing.invoice",
        cmd,
        make_invoice,
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

pub async fn set_adjustments(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(pharmacy): Extension<PharmacyContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::SetAdjustmentsRequest>,
) -> axum::response::Response {
    let agg: AggregateId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid invoice id"),
    };

    let cmd = PurchaseInvoiceCommand::SetAdjustments(SetAdjustments {
        pharmacy_id: pharmacy.pharmacy_id(),
        invoice_id: PurchaseInvoiceId::new(agg),
        adjustments: Adjustments {
            extra_costs: body.extra_costs,
            extra_discount: body.extra_discount,
        },
        occurred_at: Utc::now(),
    });
    let committed = match services.dispatch::<PurchaseInvoice>(
        pharmacy.pharmacy_id(),
        agg,
        "purchasing.invoice",
        cmd,
        make_invoice,
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

pub async fn save_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(pharmacy): Extension<PharmacyContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let agg: AggregateId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid invoice id"),
    };

    let cmd = PurchaseInvoiceCommand::SaveInvoice(SaveInvoice {
        pharmacy_id: pharmacy.pharmacy_id(),
        invoice_id: PurchaseInvoiceId::new(agg),
        occurred_at: Utc::now(),
    });
    let committed = match services.dispatch::<PurchaseInvoice>(
        pharmacy.pharmacy_id(),
        agg,
        "purchasing.invoice",
        cmd,
        make_invoice,
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

pub async fn mark_paid(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(pharmacy): Extension<PharmacyContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let agg: AggregateId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid invoice id"),
    };

    let cmd = PurchaseInvoiceCommand::MarkPaid(MarkPaid {
        pharmacy_id: pharmacy.pharmacy_id(),
        invoice_id: PurchaseInvoiceId::new(agg),
        occurred_at: Utc::now(),
    });
    let committed = match services.dispatch::<PurchaseInvoice>(
        pharmacy.pharmacy_id(),
        agg,
        "purchasing.invoice",
        cmd,
        make_invoice,
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

pub async fn void_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(pharmacy): Extension<PharmacyContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::VoidRequest>,
) -> axum::response::Response {
    let agg: AggregateId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid invoice id"),
    };

    let cmd = PurchaseInvoiceCommand::VoidInvoice(VoidInvoice {
        pharmacy_id: pharmacy.pharmacy_id(),
        invoice_id: PurchaseInvoiceId::new(agg),
        reason: body.reason,
        occurred_at: Utc::now(),
    });
    let committed = match services.dispatch::<PurchaseInvoice>(
        pharmacy.pharmacy_id(),
        agg,
        "purchasing.invoice",
        cmd,
        make_invoice,
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

/// Run the pricing engine on form state without persisting anything — the
/// recompute-per-keystroke path of the entry form.
pub async fn preview_totals(
    Json(body): Json<dto::PreviewTotalsRequest>,
) -> axum::response::Response {
    let items: Vec<LineItem> = body
        .items
        .iter()
        .enumerate()
        .map(|(idx, item)| LineItem {
            line_no: (idx + 1) as u32,
            medicine_id: MedicineId::new(AggregateId::new()),
            medicine_name: String::new(),
            medicine_code: String::new(),
            quantity: item.quantity,
            units_per_package: 1,
            sale_price: item.sale_price,
            cost: item.cost,
            tax_rate: item.tax_rate,
            main_discount: 0.0,
            extra_discount: 0.0,
            bonus: 0,
            expirable: false,
            expiry_date: None,
        })
        .collect();

    let totals = compute_totals(&items, &body.adjustments.unwrap_or_default());
    (StatusCode::OK, Json(dto::preview_totals_to_json(&totals))).into_response()
}

#[derive(Debug, Deserialize)]
pub struct ListInvoicesParams {
    pub supplier_id: Option<String>,
}

pub async fn list_invoices(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(pharmacy): Extension<PharmacyContext>,
    Query(params): Query<ListInvoicesParams>,
) -> axum::response::Response {
    let rows = match params.supplier_id {
        Some(supplier_id) => {
            let agg: AggregateId = match supplier_id.parse() {
                Ok(v) => v,
                Err(_) => {
                    return errors::json_error(
                        StatusCode::BAD_REQUEST,
                        "invalid_id",
                        "invalid supplier id",
                    );
                }
            };
            services.purchases_list_for_supplier(pharmacy.pharmacy_id(), SupplierId::new(agg))
        }
        None => services.purchases_list_saved(pharmacy.pharmacy_id()),
    };

    let today = Utc::now().date_naive();
    let items = rows
        .iter()
        .enumerate()
        .map(|(idx, rm)| dto::purchase_row_to_json(idx + 1, rm, today))
        .collect::<Vec<_>>();
    (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
}

pub async fn get_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(pharmacy): Extension<PharmacyContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let agg: AggregateId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid invoice id"),
    };
    let invoice_id = PurchaseInvoiceId::new(agg);
    match services.purchases_get(pharmacy.pharmacy_id(), &invoice_id) {
        Some(rm) => {
            let today = Utc::now().date_naive();
            (StatusCode::OK, Json(dto::purchase_invoice_to_json(&rm, today))).into_response()
        }
        None => errors::json_error(StatusCode::NOT_FOUND, "not_found", "invoice not found"),
    }
}
