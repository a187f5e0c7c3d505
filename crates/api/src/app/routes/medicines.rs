use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;

use pharma_catalog::{
    DiscontinueMedicine, Medicine, MedicineCommand, MedicineId, RegisterMedicine, UpdateMedicine,
};
use pharma_core::AggregateId;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_medicine).get(list_medicines))
        .route("/:id", get(get_medicine).put(update_medicine))
        .route("/:id/discontinue", post(discontinue_medicine))
}

pub async fn create_medicine(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(pharmacy): Extension<crate::context::PharmacyContext>,
    Json(body): Json<dto::CreateMedicineRequest>,
) -> axum::response::Response {
    let pharmacy_id = pharmacy.pharmacy_id();

    // Code uniqueness is a read-model concern; the aggregate cannot see
    // sibling medicines.
    if services
        .medicines_find_by_code(pharmacy_id, body.code.trim())
        .is_some()
    {
        return errors::json_error(
            StatusCode::CONFLICT,
            "conflict",
            format!("medicine code '{}' already exists", body.code.trim()),
        );
    }

    let medicine_agg = AggregateId::new();
    let medicine_id = MedicineId::new(medicine_agg);

    let cmd = MedicineCommand::RegisterMedicine(RegisterMedicine {
        pharmacy_id,
        medicine_id,
        code: body.code,
        name: body.name,
        unit: body.unit,
        units_per_package: body.units_per_package,
        expirable: body.expirable,
        pricing: body.pricing,
        occurred_at: Utc::now(),
    });

    let committed = match services.dispatch::<Medicine>(
        pharmacy_id,
        medicine_agg,
        "catalog.medicine",
        cmd,
        |_p, aggregate_id| Medicine::empty(MedicineId::new(aggregate_id)),
    ) {
        Ok(c) => c,
        Err(e) => return errors::dispatch_error_to_response(e),
    };

    (
        StatusCode::CREATED,
        Json(serde_json::json!({
            "id": medicine_agg.to_string(),
            "events_committed": committed.len(),
        })),
    )
        .into_response()
}

pub async fn update_medicine(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(pharmacy): Extension<crate::context::PharmacyContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::UpdateMedicineRequest>,
) -> axum::response::Response {
    let agg: AggregateId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid medicine id"),
    };

    let cmd = MedicineCommand::UpdateMedicine(UpdateMedicine {
        pharmacy_id: pharmacy.pharmacy_id(),
        medicine_id: MedicineId::new(agg),
        name: body.name,
        pricing: body.pricing,
        occurred_at: Utc::now(),
    });

    let committed = match services.dispatch::<Medicine>(
        pharmacy.pharmacy_id(),
        agg,
        "catalog.medicine",
        cmd,
        |_p, aggregate_id| Medicine::empty(MedicineId::new(aggregate_id)),
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

pub async fn discontinue_medicine(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(pharmacy): Extension<crate::context::PharmacyContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::DiscontinueMedicineRequest>,
) -> axum::response::Response {
    let agg: AggregateId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid medicine id"),
    };

    let cmd = MedicineCommand::DiscontinueMedicine(DiscontinueMedicine {
        pharmacy_id: pharmacy.pharmacy_id(),
        medicine_id: MedicineId::new(agg),
        reason: body.reason,
        occurred_at: Utc::now(),
    });

    let committed = match services.dispatch::<Medicine>(
        pharmacy.pharmacy_id(),
        agg,
        "catalog.medicine",
        cmd,
        |_p, aggregate_id| Medicine::empty(MedicineId::new(aggregate_id)),
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

pub async fn get_medicine(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(pharmacy): Extension<crate::context::PharmacyContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let agg: AggregateId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid medicine id"),
    };
    let medicine_id = MedicineId::new(agg);
    match services.medicines_get(pharmacy.pharmacy_id(), &medicine_id) {
        Some(rm) => (StatusCode::OK, Json(dto::medicine_to_json(rm))).into_response(),
        None => errors::json_error(StatusCode::NOT_FOUND, "not_found", "medicine not found"),
    }
}

pub async fn list_medicines(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(pharmacy): Extension<crate::context::PharmacyContext>,
) -> axum::response::Response {
    let items = services
        .medicines_list(pharmacy.pharmacy_id())
        .into_iter()
        .map(dto::medicine_to_json)
        .collect::<Vec<_>>();
    (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
}
