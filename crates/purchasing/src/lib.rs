//! Purchasing: supplier invoices, their line items and the pricing engine
//! that derives invoice totals.

pub mod invoice;
pub mod totals;

pub use invoice::{
    AddItem, AdjustmentsSet, InvoiceOpened, InvoicePaid, InvoiceSaved, InvoiceStatus,
    InvoiceVoided, ItemAdded, ItemInput, ItemRemoved, ItemUpdated, MarkPaid, OpenInvoice,
    PurchaseInvoice, PurchaseInvoiceCommand, PurchaseInvoiceEvent, PurchaseInvoiceId, RemoveItem,
    SaveInvoice, SetAdjustments, Settlement, UpdateItem, VoidInvoice,
};
pub use totals::{Adjustments, InvoiceTotals, LineItem, compute_totals};
