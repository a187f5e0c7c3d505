use pharma_core::PharmacyId;
use reqwest::StatusCode;
use serde_json::json;

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Build app (same router as prod), but bind to an ephemeral port.
        let app = pharma_api::app::build_app().await;
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

const PHARMACY_HEADER: &str = "x-pharmacy-id";

async fn get_json_eventually(
    client: &reqwest::Client,
    url: &str,
    pharmacy_id: PharmacyId,
) -> serde_json::Value {
    // The API is intentionally eventual-consistent (command path vs projection
    // update). Poll briefly until the projection catches up.
    for _ in 0..50 {
        let res = client
            .get(url)
            .header(PHARMACY_HEADER, pharmacy_id.to_string())
            .send()
            .await
            .unwrap();

        if res.status() == StatusCode::OK {
            return res.json().await.unwrap();
        }

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    panic!("resource did not become visible in projection within timeout");
}

async fn post_json(
    client: &reqwest::Client,
    url: &str,
    pharmacy_id: PharmacyId,
    body: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    // Retry on 404: POSTs that depend on read models (e.g. supplier lookup)
    // may race the projection subscriber.
    for _ in 0..50 {
        let res = client
            .post(url)
            .header(PHARMACY_HEADER, pharmacy_id.to_string())
            .json(&body)
            .send()
            .await
            .unwrap();

        let status = res.status();
        if status != StatusCode::NOT_FOUND {
            return (status, res.json().await.unwrap_or(json!({})));
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("dependent read model did not become visible within timeout");
}

#[tokio::test]
async fn pharmacy_header_required_for_protected_endpoints() {
    let srv = TestServer::spawn().await;

    let client = reqwest::Client::new();
    let res = client
        .get(format!("{}/whoami", srv.base_url))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn whoami_echoes_the_pharmacy_context() {
    let srv = TestServer::spawn().await;
    let pharmacy_id = PharmacyId::new();

    let client = reqwest::Client::new();
    let res = client
        .get(format!("{}/whoami", srv.base_url))
        .header(PHARMACY_HEADER, pharmacy_id.to_string())
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["pharmacy_id"].as_str().unwrap(), pharmacy_id.to_string());
}

#[tokio::test]
async fn purchase_invoice_lifecycle_create_query_pay() {
    let srv = TestServer::spawn().await;
    let pharmacy_id = PharmacyId::new();
    let client = reqwest::Client::new();

    // Register a supplier.
    let (status, body) = post_json(
        &client,
        &format!("{}/suppliers", srv.base_url),
        pharmacy_id,
        json!({
            "short": "ACD",
            "name": "United Drug House",
            "kind": "warehouse",
            "mobile_phone": "+201112223334",
            "payment_period_months": 2,
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let supplier_id = body["id"].as_str().unwrap().to_string();

    // Register a medicine.
    let (status, body) = post_json(
        &client,
        &format!("{}/medicines", srv.base_url),
        pharmacy_id,
        json!({
            "code": "MED001",
            "name": "Panadol Extra",
            "unit": "box",
            "units_per_package": 24,
            "expirable": true,
            "pricing": {"sale_price": 45.5, "cost": 35.2},
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let medicine_id = body["id"].as_str().unwrap().to_string();

    // Submit the add-purchase form: one item plus invoice-level adjustments.
    let (status, body) = post_json(
        &client,
        &format!("{}/purchases/invoices", srv.base_url),
        pharmacy_id,
        json!({
            "supplier_id": supplier_id,
            "invoice_date": "2026-02-01",
            "notes": "Monthly essentials order",
            "items": [{
                "medicine_id": medicine_id,
                "quantity": 100,
                "sale_price": 45.5,
                "cost": 35.2,
                "tax_rate": 14.0,
                "main_discount": 5.0,
                "extra_discount": 2.0,
                "bonus": 5,
                "expiry_date": "2028-12-31",
            }],
            "adjustments": {"extra_costs": 200.0, "extra_discount": 100.0},
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let invoice_id = body["id"].as_str().unwrap().to_string();
    // open + item + adjustments + save
    assert_eq!(body["events_committed"], 4);

    // Detail view carries the engine's totals.
    let detail = get_json_eventually(
        &client,
        &format!("{}/purchases/invoices/{}", srv.base_url, invoice_id),
        pharmacy_id,
    )
    .await;
    assert_eq!(detail["status"], "saved");
    assert_eq!(detail["totals"]["items_value"], 4550.0);
    assert!((detail["totals"]["tax_total"].as_f64().unwrap() - 492.8).abs() < 1e-9);
    assert!((detail["totals"]["total"].as_f64().unwrap() - 5142.8).abs() < 1e-9);
    assert_eq!(detail["items"][0]["medicine_name"], "Panadol Extra");
    assert_eq!(detail["items"][0]["medicine_code"], "MED001");
    assert_eq!(detail["settlement"], "PENDING");

    // Table row shows the supplier snapshot and a serial.
    let list = get_json_eventually(
        &client,
        &format!("{}/purchases/invoices", srv.base_url),
        pharmacy_id,
    )
    .await;
    assert_eq!(list["items"].as_array().unwrap().len(), 1);
    assert_eq!(list["items"][0]["serial_number"], 1);
    assert_eq!(list["items"][0]["supplier_name"], "United Drug House");

    // Filtering by supplier returns the same row.
    let filtered = get_json_eventually(
        &client,
        &format!(
            "{}/purchases/invoices?supplier_id={}",
            srv.base_url, supplier_id
        ),
        pharmacy_id,
    )
    .await;
    assert_eq!(filtered["items"].as_array().unwrap().len(), 1);

    // Saved invoices are frozen.
    let (status, _body) = post_json(
        &client,
        &format!("{}/purchases/invoices/{}/items", srv.base_url, invoice_id),
        pharmacy_id,
        json!({
            "medicine_id": medicine_id,
            "quantity": 1,
            "sale_price": 10.0,
            "cost": 5.0,
        }),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    // Mark the invoice paid and watch the table flip.
    let (status, _body) = post_json(
        &client,
        &format!("{}/purchases/invoices/{}/pay", srv.base_url, invoice_id),
        pharmacy_id,
        json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    for _ in 0..50 {
        let detail = get_json_eventually(
            &client,
            &format!("{}/purchases/invoices/{}", srv.base_url, invoice_id),
            pharmacy_id,
        )
        .await;
        if detail["settlement"] == "PAID" {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("invoice did not become PAID within timeout");
}

#[tokio::test]
async fn totals_preview_runs_the_pricing_engine_without_persisting() {
    let srv = TestServer::spawn().await;
    let pharmacy_id = PharmacyId::new();
    let client = reqwest::Client::new();

    let (status, body) = post_json(
        &client,
        &format!("{}/purchases/invoices/preview", srv.base_url),
        pharmacy_id,
        json!({
            "items": [{"quantity": 100, "sale_price": 45.5, "cost": 35.2, "tax_rate": 14.0}],
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["items_value"], 4550.0);
    assert!((body["tax_total"].as_f64().unwrap() - 492.8).abs() < 1e-9);
    assert!((body["base_total"].as_f64().unwrap() - 5042.8).abs() < 1e-9);
    assert!((body["profit_percentage"].as_f64().unwrap() - 22.637362637362635).abs() < 1e-9);

    // Empty forms preview to all-zero totals.
    let (status, body) = post_json(
        &client,
        &format!("{}/purchases/invoices/preview", srv.base_url),
        pharmacy_id,
        json!({"items": []}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 0.0);
    assert_eq!(body["profit_percentage"], 0.0);
}

#[tokio::test]
async fn sales_stats_reflect_recorded_sales_and_stock() {
    let srv = TestServer::spawn().await;
    let pharmacy_id = PharmacyId::new();
    let client = reqwest::Client::new();

    let (status, body) = post_json(
        &client,
        &format!("{}/medicines", srv.base_url),
        pharmacy_id,
        json!({
            "code": "MED002",
            "name": "Augmentin 625mg",
            "unit": "box",
            "units_per_package": 14,
            "expirable": true,
            "pricing": {"sale_price": 85.0, "cost": 72.5},
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let medicine_id = body["id"].as_str().unwrap().to_string();

    let (status, _body) = post_json(
        &client,
        &format!("{}/sales", srv.base_url),
        pharmacy_id,
        json!({
            "lines": [{"medicine_id": medicine_id, "quantity": 3}],
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    for _ in 0..50 {
        let stats = get_json_eventually(
            &client,
            &format!("{}/sales/stats", srv.base_url),
            pharmacy_id,
        )
        .await;
        if stats["today_invoices"] == 1 {
            assert_eq!(stats["best_selling_medicine"]["name"], "Augmentin 625mg");
            assert_eq!(stats["best_selling_medicine"]["sales"], 3);
            assert_eq!(stats["best_selling_medicine"]["unit"], "box");
            assert!((stats["today_sales"].as_f64().unwrap() - 255.0).abs() < 1e-9);
            assert!(
                (stats["today_profit"].as_f64().unwrap() - 3.0 * (85.0 - 72.5)).abs() < 1e-9
            );
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("sales stats did not update within timeout");
}
