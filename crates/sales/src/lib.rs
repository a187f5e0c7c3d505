//! Sales: counter sales recorded against the catalog, feeding the sales
//! overview (daily totals, profit, best sellers) and stock depletion.

pub mod sale;

pub use sale::{
    RecordSale, Sale, SaleCommand, SaleEvent, SaleId, SaleLine, SaleLineInput, SaleRecorded,
    SaleVoided, VoidSale,
};
