use std::{convert::Infallible, sync::Arc, time::Duration};

use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use chrono::NaiveDate;
use tokio::sync::broadcast;
use tokio_stream::{StreamExt, wrappers::BroadcastStream};

use pharma_catalog::MedicineId;
use pharma_core::{AggregateId, DomainError, PharmacyId};
use pharma_events::{EventBus, EventEnvelope, InMemoryEventBus};
use pharma_infra::{
    command_dispatcher::{CommandDispatcher, DispatchError},
    event_store::{EventStore, InMemoryEventStore, StoredEvent},
    projections::{
        catalog::{CatalogProjection, MedicineReadModel},
        customers::{CustomersProjection, CustomerReadModel},
        purchases::{PurchaseInvoiceReadModel, PurchasesProjection},
        sales_stats::{DailySalesReadModel, MedicineSalesReadModel, SalesStatsProjection},
        stock::{StockProjection, StockReadModel},
        suppliers::{SupplierReadModel, SuppliersProjection},
    },
    read_model::InMemoryPharmacyStore,
};
use pharma_parties::{CustomerId, SupplierDebitAdjusted, SupplierEvent, SupplierId};
use pharma_purchasing::PurchaseInvoiceId;

/// Medicines with this many packages or fewer count as low stock.
pub const LOW_STOCK_THRESHOLD: i64 = 10;

/// Batches expiring within this horizon count as expiring soon.
pub const EXPIRY_WINDOW_DAYS: u64 = 90;

/// Realtime message broadcasted via SSE.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RealtimeMessage {
    pub pharmacy_id: PharmacyId,
    pub topic: String,
    pub payload: serde_json::Value,
}

type Dispatcher = CommandDispatcher<
    Arc<InMemoryEventStore>,
    Arc<InMemoryEventBus<EventEnvelope<serde_json::Value>>>,
>;

/// In-memory infra wiring: store + bus + dispatcher + projections.
///
/// Projections are updated by a background subscriber draining the bus, so
/// reads after a command are eventually consistent (the same trade the
/// production deployment makes, just with shorter lag).
pub struct AppServices {
    dispatcher: Arc<Dispatcher>,
    event_store: Arc<InMemoryEventStore>,
    catalog_projection:
        Arc<CatalogProjection<Arc<InMemoryPharmacyStore<MedicineId, MedicineReadModel>>>>,
    customers_projection:
        Arc<CustomersProjection<Arc<InMemoryPharmacyStore<CustomerId, CustomerReadModel>>>>,
    suppliers_projection:
        Arc<SuppliersProjection<Arc<InMemoryPharmacyStore<SupplierId, SupplierReadModel>>>>,
    purchases_projection: Arc<
        PurchasesProjection<Arc<InMemoryPharmacyStore<PurchaseInvoiceId, PurchaseInvoiceReadModel>>>,
    >,
    stock_projection: Arc<StockProjection<Arc<InMemoryPharmacyStore<MedicineId, StockReadModel>>>>,
    sales_stats_projection: Arc<
        SalesStatsProjection<
            Arc<InMemoryPharmacyStore<NaiveDate, DailySalesReadModel>>,
            Arc<InMemoryPharmacyStore<MedicineId, MedicineSalesReadModel>>,
        >,
    >,
    realtime_tx: broadcast::Sender<RealtimeMessage>,
}

pub fn build_services() -> AppServices {
    let store = Arc::new(InMemoryEventStore::new());
    let bus: Arc<InMemoryEventBus<EventEnvelope<serde_json::Value>>> =
        Arc::new(InMemoryEventBus::new());

    let catalog_projection = Arc::new(CatalogProjection::new(Arc::new(
        InMemoryPharmacyStore::new(),
    )));
    let customers_projection = Arc::new(CustomersProjection::new(Arc::new(
        InMemoryPharmacyStore::new(),
    )));
    let suppliers_projection = Arc::new(SuppliersProjection::new(Arc::new(
        InMemoryPharmacyStore::new(),
    )));
    let purchases_projection = Arc::new(PurchasesProjection::new(Arc::new(
        InMemoryPharmacyStore::new(),
    )));
    let stock_projection = Arc::new(StockProjection::new(Arc::new(InMemoryPharmacyStore::new())));
    let sales_stats_projection = Arc::new(SalesStatsProjection::new(
        Arc::new(InMemoryPharmacyStore::new()),
        Arc::new(InMemoryPharmacyStore::new()),
    ));

    // Realtime channel (SSE): lossy broadcast, pharmacy-filtered in handlers.
    let (realtime_tx, _realtime_rx) = broadcast::channel::<RealtimeMessage>(256);

    // Background subscriber: bus -> projections
    {
        let sub = bus.subscribe();
        let catalog_projection = catalog_projection.clone();
        let customers_projection = customers_projection.clone();
        let suppliers_projection = suppliers_projection.clone();
        let purchases_projection = purchases_projection.clone();
        let stock_projection = stock_projection.clone();
        let sales_stats_projection = sales_stats_projection.clone();
        let realtime_tx = realtime_tx.clone();
        tokio::task::spawn_blocking(move || {
            loop {
                match sub.recv() {
                    Ok(env) => {
                        let at = env.aggregate_type();

                        // Apply to the relevant projection(s) only.
                        let apply_ok = match at {
                            "catalog.medicine" => {
                                catalog_projection.apply_envelope(&env).map_err(|e| e.to_string())
                            }
                            "parties.customer" => customers_projection
                                .apply_envelope(&env)
                                .map_err(|e| e.to_string()),
                            "parties.supplier" => suppliers_projection
                                .apply_envelope(&env)
                                .map_err(|e| e.to_string()),
                            "purchasing.invoice" => {
                                if let Err(e) = purchases_projection.apply_envelope(&env) {
                                    Err(e.to_string())
                                } else if let Err(e) = stock_projection.apply_envelope(&env) {
                                    Err(e.to_string())
                                } else {
                                    Ok(())
                                }
                            }
                            "sales.sale" => {
                                if let Err(e) = sales_stats_projection.apply_envelope(&env) {
                                    Err(e.to_string())
                                } else if let Err(e) = stock_projection.apply_envelope(&env) {
                                    Err(e.to_string())
                                } else {
                                    Ok(())
                                }
                            }
                            _ => Ok(()),
                        };

                        if let Err(e) = apply_ok {
                            tracing::warn!("projection apply failed: {e}");
                            continue;
                        }

                        // Broadcast projection update (lossy; no backpressure on core).
                        let _ = realtime_tx.send(RealtimeMessage {
                            pharmacy_id: env.pharmacy_id(),
                            topic: format!("{at}.projection_updated"),
                            payload: serde_json::json!({
                                "kind": "projection_update",
                                "aggregate_type": at,
                                "aggregate_id": env.aggregate_id().to_string(),
                                "sequence_number": env.sequence_number(),
                            }),
                        });
                    }
                    Err(_) => break,
                }
            }
        });
    }

    let dispatcher: Arc<Dispatcher> = Arc::new(CommandDispatcher::new(store.clone(), bus));
    AppServices {
        dispatcher,
        event_store: store,
        catalog_projection,
        customers_projection,
        suppliers_projection,
        purchases_projection,
        stock_projection,
        sales_stats_projection,
        realtime_tx,
    }
}

impl AppServices {
    pub fn realtime_tx(&self) -> &broadcast::Sender<RealtimeMessage> {
        &self.realtime_tx
    }

    pub fn dispatch<A>(
        &self,
        pharmacy_id: PharmacyId,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        command: A::Command,
        make_aggregate: impl FnOnce(PharmacyId, AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: pharma_core::Aggregate<Error = DomainError>,
        A::Event: pharma_events::Event + serde::Serialize + serde::de::DeserializeOwned,
    {
        self.dispatcher.dispatch::<A>(
            pharmacy_id,
            aggregate_id,
            aggregate_type,
            command,
            make_aggregate,
        )
    }

    pub fn medicines_get(
        &self,
        pharmacy_id: PharmacyId,
        medicine_id: &MedicineId,
    ) -> Option<MedicineReadModel> {
        self.catalog_projection.get(pharmacy_id, medicine_id)
    }

    pub fn medicines_list(&self, pharmacy_id: PharmacyId) -> Vec<MedicineReadModel> {
        self.catalog_projection.list(pharmacy_id)
    }

    pub fn medicines_find_by_code(
        &self,
        pharmacy_id: PharmacyId,
        code: &str,
    ) -> Option<MedicineReadModel> {
        self.catalog_projection.find_by_code(pharmacy_id, code)
    }

    pub fn customers_get(
        &self,
        pharmacy_id: PharmacyId,
        customer_id: &CustomerId,
    ) -> Option<CustomerReadModel> {
        self.customers_projection.get(pharmacy_id, customer_id)
    }

    pub fn customers_list(&self, pharmacy_id: PharmacyId) -> Vec<CustomerReadModel> {
        self.customers_projection.list(pharmacy_id)
    }

    pub fn suppliers_get(
        &self,
        pharmacy_id: PharmacyId,
        supplier_id: &SupplierId,
    ) -> Option<SupplierReadModel> {
        self.suppliers_projection.get(pharmacy_id, supplier_id)
    }

    pub fn suppliers_list(&self, pharmacy_id: PharmacyId) -> Vec<SupplierReadModel> {
        self.suppliers_projection.list(pharmacy_id)
    }

    /// The supplier's debit change log is its event stream, filtered down to
    /// the adjustment events.
    pub fn supplier_debit_log(
        &self,
        pharmacy_id: PharmacyId,
        supplier_id: SupplierId,
    ) -> Result<Vec<SupplierDebitAdjusted>, DispatchError> {
        let stream = self
            .event_store
            .load_stream(pharmacy_id, supplier_id.0)
            .map_err(DispatchError::from)?;

        let mut log = Vec::new();
        for stored in stream {
            let ev: SupplierEvent = serde_json::from_value(stored.payload)
                .map_err(|e| DispatchError::Deserialize(e.to_string()))?;
            if let SupplierEvent::SupplierDebitAdjusted(e) = ev {
                log.push(e);
            }
        }
        Ok(log)
    }

    pub fn purchases_get(
        &self,
        pharmacy_id: PharmacyId,
        invoice_id: &PurchaseInvoiceId,
    ) -> Option<PurchaseInvoiceReadModel> {
        self.purchases_projection.get(pharmacy_id, invoice_id)
    }

    pub fn purchases_list_saved(&self, pharmacy_id: PharmacyId) -> Vec<PurchaseInvoiceReadModel> {
        self.purchases_projection.list_saved(pharmacy_id)
    }

    pub fn purchases_list_for_supplier(
        &self,
        pharmacy_id: PharmacyId,
        supplier_id: SupplierId,
    ) -> Vec<PurchaseInvoiceReadModel> {
        self.purchases_projection
            .list_for_supplier(pharmacy_id, supplier_id)
    }

    pub fn stock_list(&self, pharmacy_id: PharmacyId) -> Vec<StockReadModel> {
        self.stock_projection.list(pharmacy_id)
    }

    pub fn stock_total(&self, pharmacy_id: PharmacyId) -> i64 {
        self.stock_projection.total_stock(pharmacy_id)
    }

    pub fn stock_low(&self, pharmacy_id: PharmacyId) -> Vec<StockReadModel> {
        self.stock_projection.low_stock(pharmacy_id, LOW_STOCK_THRESHOLD)
    }

    pub fn stock_expiring(&self, pharmacy_id: PharmacyId, today: NaiveDate) -> Vec<StockReadModel> {
        self.stock_projection
            .expiring_within(pharmacy_id, today, EXPIRY_WINDOW_DAYS)
    }

    pub fn sales_daily(&self, pharmacy_id: PharmacyId, date: NaiveDate) -> DailySalesReadModel {
        self.sales_stats_projection.daily(pharmacy_id, date)
    }

    pub fn sales_best_seller(&self, pharmacy_id: PharmacyId) -> Option<MedicineSalesReadModel> {
        self.sales_stats_projection.best_seller(pharmacy_id)
    }
}

/// Build an SSE stream for a pharmacy (used by `/stream`).
pub fn pharmacy_sse_stream(
    services: Arc<AppServices>,
    pharmacy_id: PharmacyId,
) -> Sse<impl tokio_stream::Stream<Item = Result<SseEvent, Infallible>>> {
    let rx = services.realtime_tx().subscribe();
    let stream = BroadcastStream::new(rx).filter_map(move |msg| match msg {
        Ok(m) if m.pharmacy_id == pharmacy_id => {
            let data = serde_json::to_string(&m.payload).unwrap_or_else(|_| "{}".to_string());
            Some(Ok(SseEvent::default().event(m.topic).data(data)))
        }
        _ => None,
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}
