use axum::{Router, routing::get};

pub mod customers;
pub mod inventory;
pub mod medicines;
pub mod purchases;
pub mod sales;
pub mod suppliers;
pub mod system;

/// Router for all pharmacy-scoped endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .route("/stream", get(system::stream))
        .nest("/medicines", medicines::router())
        .nest("/customers", customers::router())
        .nest("/suppliers", suppliers::router())
        .nest("/purchases", purchases::router())
        .nest("/sales", sales::router())
        .nest("/inventory", inventory::router())
}
