//! CSV-file backend for the Shutter submission ledger.
//!
//! The ledger is a single newline-terminated CSV file with a fixed header
//! row. Rows are only ever appended; nothing is rewritten in place.

mod encode;
mod store;

pub mod error;

pub use encode::{HEADER, TIMESTAMP_FORMAT};
pub use error::{Error, Result};
pub use store::CsvLedger;
