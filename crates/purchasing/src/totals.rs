//! Invoice pricing engine.
//!
//! A pure function over a slice of line items and invoice-level adjustments.
//! No IO, no state, no validation: callers (the invoice aggregate, the form
//! preview endpoint) constrain field ranges before invoking, and the engine
//! is total over finite inputs.
//!
//! Accumulation is a single left-to-right pass in item order, so the same
//! items always produce bit-identical floating-point results.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use pharma_catalog::MedicineId;
use pharma_core::ValueObject;

/// One purchased product row within an invoice.
///
/// `medicine_name` and `medicine_code` are snapshots taken when the line was
/// entered — deliberately denormalized so historical invoices stay stable
/// even if the catalog record later changes. `medicine_id` remains the real
/// link back to the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    /// Unique within the invoice; assigned by the aggregate, never reused.
    pub line_no: u32,
    pub medicine_id: MedicineId,
    pub medicine_name: String,
    pub medicine_code: String,
    /// Packages purchased.
    pub quantity: u32,
    pub units_per_package: u32,
    /// Resale price per package.
    pub sale_price: f64,
    /// Acquisition cost per package.
    pub cost: f64,
    /// Percentage, 0-100.
    pub tax_rate: f64,
    /// Percentage, 0-100. Additive with `extra_discount`, not compounding.
    pub main_discount: f64,
    /// Percentage, 0-100.
    pub extra_discount: f64,
    /// Free extra packages granted by the supplier; display only, excluded
    /// from monetary totals.
    pub bonus: u32,
    pub expirable: bool,
    /// Present iff `expirable` is true.
    pub expiry_date: Option<NaiveDate>,
}

/// Invoice-level adjustments applied after the per-item sums.
///
/// Missing fields default to zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Adjustments {
    #[serde(default)]
    pub extra_costs: f64,
    #[serde(default)]
    pub extra_discount: f64,
}

impl Default for Adjustments {
    fn default() -> Self {
        Self {
            extra_costs: 0.0,
            extra_discount: 0.0,
        }
    }
}

/// Aggregate totals derived from an invoice's line items.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InvoiceTotals {
    /// Σ sale_price × quantity.
    pub items_value: f64,
    /// Σ cost × quantity × tax_rate / 100.
    ///
    /// Tax is computed on cost, not sale price: the tax due reflects
    /// acquisition tax, not sale markup.
    pub tax_total: f64,
    /// items_value + tax_total.
    pub base_total: f64,
    /// base_total + extra_costs − extra_discount. Not clamped at zero.
    pub total: f64,
    /// (items_value − Σ cost × quantity) / items_value × 100; 0 when
    /// items_value is 0.
    pub profit_percentage: f64,
    pub extra_costs: f64,
    pub extra_discount: f64,
}

impl InvoiceTotals {
    pub fn zero() -> Self {
        Self {
            items_value: 0.0,
            tax_total: 0.0,
            base_total: 0.0,
            total: 0.0,
            profit_percentage: 0.0,
            extra_costs: 0.0,
            extra_discount: 0.0,
        }
    }
}

impl ValueObject for InvoiceTotals {}

/// Derive totals from line items and adjustments.
///
/// Fully re-derived on every call — no incremental or memoized state. Empty
/// `items` yields all-zero totals (no division by zero on the profit ratio).
pub fn compute_totals(items: &[LineItem], adjustments: &Adjustments) -> InvoiceTotals {
    let mut items_value = 0.0;
    let mut total_cost = 0.0;
    let mut tax_total = 0.0;

    for item in items {
        let quantity = f64::from(item.quantity);
        items_value += item.sale_price * quantity;
        total_cost += item.cost * quantity;
        tax_total += item.cost * quantity * item.tax_rate / 100.0;
    }

    let base_total = items_value + tax_total;
    let total = base_total + adjustments.extra_costs - adjustments.extra_discount;

    let profit_percentage = if items_value > 0.0 {
        (items_value - total_cost) / items_value * 100.0
    } else {
        0.0
    };

    InvoiceTotals {
        items_value,
        tax_total,
        base_total,
        total,
        profit_percentage,
        extra_costs: adjustments.extra_costs,
        extra_discount: adjustments.extra_discount,
    }
}
