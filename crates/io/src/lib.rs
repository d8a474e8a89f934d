//! Excel IO for cruce.
//!
//! Reading goes through calamine into header-keyed rows. Writing patches the
//! original package so formulas, styles and every untouched cell survive.

pub mod error;
pub mod header;
mod package;
pub mod patch;
pub mod reader;
pub mod snapshot;
pub mod styles;
pub mod writer;

pub use error::XlsxError;
pub use header::normalize_header;
pub use reader::{read_rows, SheetRows};
pub use snapshot::{load_snapshot, CellContent, SheetSnapshot};
pub use writer::{update_values_preserving_formulas, WriteOptions, WriteSummary};
