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
    AdjustBalance, Customer, CustomerCommand, CustomerId, RegisterCustomer, UpdateCustomer,
};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", post(register_customer).get(list_customers))
        .route("/:id", get(get_customer).put(update_customer))
        .route("/:id/balance", post(adjust_balance))
}

pub async fn register_customer(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(pharmacy): Extension<crate::context::PharmacyContext>,
    Json(body): Json<dto::RegisterCustomerRequest>,
) -> axum::response::Response {
    let customer_agg = AggregateId::new();
    let customer_id = CustomerId::new(customer_agg);

    let cmd = CustomerCommand::RegisterCustomer(RegisterCustomer {
        pharmacy_id: pharmacy.pharmacy_id(),
        customer_id,
        name: body.name,
        kind: body.kind,
        phone: body.phone,
        address: body.address,
        terms: body.terms,
        loyalty: body.loyalty,
        occurred_at: Utc::now(),
    });

    let committed = match services.dispatch::<Customer>(
        pharmacy.pharmacy_id(),
        customer_agg,
        "parties.customer",
        cmd,
        |_p, aggregate_id| Customer::empty(CustomerId::new(aggregate_id)),
    ) {
        Ok(c) => c,
        Err(e) => return errors::dispatch_error_to_response(e),
    };

    (
        StatusCode::CREATED,
        Json(serde_json::json!({
            "id": customer_agg.to_string(),
            "events_committed": committed.len(),
        })),
    )
        .into_response()
}

pub async fn update_customer(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(pharmacy): Extension<crate::context::PharmacyContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::UpdateCustomerRequest>,
) -> axum::response::Response {
    let agg: AggregateId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid customer id"),
    };

    let cmd = CustomerCommand::UpdateCustomer(UpdateCustomer {
        pharmacy_id: pharmacy.pharmacy_id(),
        customer_id: CustomerId::new(agg),
        name: body.name,
        phone: body.phone,
        address: body.address,
        terms: body.terms,
        occurred_at: Utc::now(),
    });

    let committed = match services.dispatch::<Customer>(
        pharmacy.pharmacy_id(),
        agg,
        "parties.customer",
        cmd,
        |_p, aggregate_id| Customer::empty(CustomerId::new(aggregate_id)),
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

pub async fn adjust_balance(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(pharmacy): Extension<crate::context::PharmacyContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::AdjustBalanceRequest>,
) -> axum::response::Response {
    let agg: AggregateId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid customer id"),
    };

    let cmd = CustomerCommand::AdjustBalance(AdjustBalance {
        pharmacy_id: pharmacy.pharmacy_id(),
        customer_id: CustomerId::new(agg),
        delta: body.delta,
        reason: body.reason,
        occurred_at: Utc::now(),
    });

    let committed = match services.dispatch::<Customer>(
        pharmacy.pharmacy_id(),
        agg,
        "parties.customer",
        cmd,
        |_p, aggregate_id| Customer::empty(CustomerId::new(aggregate_id)),
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

pub async fn get_customer(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(pharmacy): Extension<crate::context::PharmacyContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let agg: AggregateId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid customer id"),
    };
    let customer_id = CustomerId::new(agg);
    match services.customers_get(pharmacy.pharmacy_id(), &customer_id) {
        Some(rm) => (StatusCode::OK, Json(dto::customer_to_json(rm))).into_response(),
        None => errors::json_error(StatusCode::NOT_FOUND, "not_found", "customer not found"),
    }
}

pub async fn list_customers(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(pharmacy): Extension<crate::context::PharmacyContext>,
) -> axum::response::Response {
    let items = services
        .customers_list(pharmacy.pharmacy_id())
        .into_iter()
        .map(dto::customer_to_json)
        .collect::<Vec<_>>();
    (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
}
