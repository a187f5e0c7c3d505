use chrono::NaiveDate;
use serde::Deserialize;

use pharma_infra::projections::{
    catalog::MedicineReadModel,
    customers::CustomerReadModel,
    purchases::PurchaseInvoiceReadModel,
    stock::StockReadModel,
    suppliers::SupplierReadModel,
};
use pharma_parties::{CustomerKind, CustomerTerms, Loyalty, SupplierDebitAdjusted, SupplierKind};
use pharma_purchasing::{Adjustments, InvoiceTotals, LineItem};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct CreateMedicineRequest {
    pub code: String,
    pub name: String,
    pub unit: String,
    pub units_per_package: u32,
    #[serde(default)]
    pub expirable: bool,
    pub pricing: Option<pharma_catalog::MedicinePricing>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateMedicineRequest {
    pub name: Option<String>,
    pub pricing: Option<pharma_catalog::MedicinePricing>,
}

#[derive(Debug, Deserialize)]
pub struct DiscontinueMedicineRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterCustomerRequest {
    pub name: String,
    pub kind: CustomerKind,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub terms: Option<CustomerTerms>,
    pub loyalty: Option<Loyalty>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCustomerRequest {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub terms: Option<CustomerTerms>,
}

#[derive(Debug, Deserialize)]
pub struct AdjustBalanceRequest {
    pub delta: f64,
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterSupplierRequest {
    pub short: String,
    pub name: String,
    pub kind: SupplierKind,
    pub mobile_phone: String,
    pub landline_phone: Option<String>,
    #[serde(default)]
    pub payment_period_months: u32,
    pub settlement_date: Option<NaiveDate>,
    pub checks_due_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateSupplierRequest {
    pub name: Option<String>,
    pub mobile_phone: Option<String>,
    pub landline_phone: Option<String>,
    pub payment_period_months: Option<u32>,
    pub settlement_date: Option<NaiveDate>,
    pub checks_due_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct AdjustDebitRequest {
    pub delta: f64,
    pub reason: String,
}

fn default_tax_rate() -> f64 {
    14.0
}

/// One item row of the add-purchase form. The medicine name/code snapshots
/// are resolved server-side from the catalog.
#[derive(Debug, Deserialize)]
pub struct PurchaseItemRequest {
    pub medicine_id: String,
    pub quantity: u32,
    pub units_per_package: Option<u32>,
    pub sale_price: f64,
    pub cost: f64,
    #[serde(default = "default_tax_rate")]
    pub tax_rate: f64,
    #[serde(default)]
    pub main_discount: f64,
    #[serde(default)]
    pub extra_discount: f64,
    #[serde(default)]
    pub bonus: u32,
    pub expirable: Option<bool>,
    pub expiry_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct CreatePurchaseInvoiceRequest {
    pub supplier_id: String,
    pub invoice_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub items: Vec<PurchaseItemRequest>,
    pub adjustments: Option<Adjustments>,
}

#[derive(Debug, Deserialize)]
pub struct SetAdjustmentsRequest {
    #[serde(default)]
    pub extra_costs: f64,
    #[serde(default)]
    pub extra_discount: f64,
}

#[derive(Debug, Deserialize)]
pub struct VoidRequest {
    pub reason: Option<String>,
}

/// Totals preview for the open form: only the numeric fields matter.
#[derive(Debug, Deserialize)]
pub struct PreviewItemRequest {
    pub quantity: u32,
    pub sale_price: f64,
    pub cost: f64,
    #[serde(default = "default_tax_rate")]
    pub tax_rate: f64,
}

#[derive(Debug, Deserialize)]
pub struct PreviewTotalsRequest {
    pub items: Vec<PreviewItemRequest>,
    pub adjustments: Option<Adjustments>,
}

#[derive(Debug, Deserialize)]
pub struct SaleLineRequest {
    pub medicine_id: String,
    pub quantity: u32,
    /// Defaults to the catalog sale price when omitted.
    pub unit_price: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct RecordSaleRequest {
    pub lines: Vec<SaleLineRequest>,
}

// -------------------------
// JSON mapping helpers
// -------------------------

pub fn medicine_to_json(rm: MedicineReadModel) -> serde_json::Value {
    serde_json::json!({
        "id": rm.medicine_id.0.to_string(),
        "code": rm.code,
        "name": rm.name,
        "unit": rm.unit,
        "units_per_package": rm.units_per_package,
        "expirable": rm.expirable,
        "sale_price": rm.pricing.sale_price,
        "cost": rm.pricing.cost,
        "status": rm.status,
    })
}

pub fn customer_to_json(rm: CustomerReadModel) -> serde_json::Value {
    serde_json::json!({
        "id": rm.customer_id.0.to_string(),
        "name": rm.name,
        "kind": rm.kind,
        "phone": rm.phone,
        "address": rm.address,
        "cash_only": rm.terms.cash_only,
        "balance": rm.balance,
        "credit_limit": rm.terms.credit_limit,
        "local_discount": rm.terms.local_discount,
        "import_discount": rm.terms.import_discount,
        "loyalty": rm.loyalty.map(|l| serde_json::json!({
            "points_per_currency": l.points_per_currency,
            "total_points": l.total_points,
            "pending_points": l.pending_points,
        })),
        "last_transaction_at": rm.last_transaction_at.map(|t| t.to_rfc3339()),
    })
}

pub fn supplier_to_json(rm: SupplierReadModel, today: NaiveDate) -> serde_json::Value {
    serde_json::json!({
        "id": rm.supplier_id.0.to_string(),
        "short": rm.short,
        "name": rm.name,
        "kind": rm.kind,
        "debit": rm.debit,
        "debit_status": rm.debit_status(today),
        "payment_period_months": rm.payment_period_months,
        "mobile_phone": rm.contact.mobile_phone,
        "landline_phone": rm.contact.landline_phone,
        "settlement_date": rm.settlement_date,
        "checks_due_date": rm.checks_due_date,
        "created_at": rm.created_at.to_rfc3339(),
        "updated_at": rm.updated_at.to_rfc3339(),
    })
}

pub fn debit_log_to_json(log: Vec<SupplierDebitAdjusted>) -> Vec<serde_json::Value> {
    log.into_iter()
        .map(|e| {
            serde_json::json!({
                "old_debit": e.old_debit,
                "new_debit": e.new_debit,
                "change": e.delta,
                "reason": e.reason,
                "created_at": e.occurred_at.to_rfc3339(),
            })
        })
        .collect()
}

fn totals_to_json(totals: &InvoiceTotals) -> serde_json::Value {
    serde_json::json!({
        "items_value": totals.items_value,
        "tax_total": totals.tax_total,
        "base_total": totals.base_total,
        "total": totals.total,
        "profit_percentage": totals.profit_percentage,
        "extra_costs": totals.extra_costs,
        "extra_discount": totals.extra_discount,
    })
}

fn line_item_to_json(item: &LineItem) -> serde_json::Value {
    serde_json::json!({
        "line_no": item.line_no,
        "medicine_id": item.medicine_id.0.to_string(),
        "medicine_name": item.medicine_name,
        "medicine_code": item.medicine_code,
        "quantity": item.quantity,
        "units_per_package": item.units_per_package,
        "sale_price": item.sale_price,
        "cost": item.cost,
        "tax_rate": item.tax_rate,
        "main_discount": item.main_discount,
        "extra_discount": item.extra_discount,
        "bonus": item.bonus,
        "expirable": item.expirable,
        "expiry_date": item.expiry_date,
    })
}

/// Table row for the purchases list (serial is the position in the sorted
/// listing, as in the dashboard table).
pub fn purchase_row_to_json(
    serial: usize,
    rm: &PurchaseInvoiceReadModel,
    today: NaiveDate,
) -> serde_json::Value {
    serde_json::json!({
        "id": rm.invoice_id.0.to_string(),
        "serial_number": serial,
        "invoice_number": rm.invoice_number,
        "invoice_date": rm.invoice_date,
        "supplier_id": rm.supplier_id.map(|s| s.0.to_string()),
        "supplier_name": rm.supplier_name,
        "total": rm.totals.total,
        "status": rm.settlement_display(today),
    })
}

/// Full invoice detail (header, items, totals).
pub fn purchase_invoice_to_json(rm: &PurchaseInvoiceReadModel, today: NaiveDate) -> serde_json::Value {
    serde_json::json!({
        "id": rm.invoice_id.0.to_string(),
        "invoice_number": rm.invoice_number,
        "invoice_date": rm.invoice_date,
        "supplier_id": rm.supplier_id.map(|s| s.0.to_string()),
        "supplier_name": rm.supplier_name,
        "notes": rm.notes,
        "status": rm.status,
        "settlement": rm.settlement_display(today),
        "due_date": rm.due_date,
        "items": rm.items.iter().map(line_item_to_json).collect::<Vec<_>>(),
        "adjustments": {
            "extra_costs": rm.adjustments.extra_costs,
            "extra_discount": rm.adjustments.extra_discount,
        },
        "totals": totals_to_json(&rm.totals),
    })
}

pub fn preview_totals_to_json(totals: &InvoiceTotals) -> serde_json::Value {
    totals_to_json(totals)
}

pub fn stock_to_json(rm: &StockReadModel) -> serde_json::Value {
    serde_json::json!({
        "medicine_id": rm.medicine_id.0.to_string(),
        "medicine_name": rm.medicine_name,
        "on_hand": rm.on_hand,
        "batches": rm.batches.iter().map(|b| serde_json::json!({
            "expiry_date": b.expiry_date,
            "quantity": b.quantity,
        })).collect::<Vec<_>>(),
    })
}
