//! Projections: disposable read models built from the event streams.
//!
//! Each projection is an idempotent event consumer guarded by per-stream
//! sequence cursors; read models can be cleared and rebuilt from the store
//! at any time.

mod cursors;

pub mod catalog;
pub mod customers;
pub mod purchases;
pub mod sales_stats;
pub mod stock;
pub mod suppliers;
