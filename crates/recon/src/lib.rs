//! `cruce-recon`: invoice ↔ operative base reconciliation engine.
//!
//! Pure engine crate: receives pre-loaded rows or records, returns a report and
//! the mutated base dataset. No CLI or IO dependencies, no state between runs.

pub mod config;
pub mod discrepancy;
pub mod engine;
pub mod error;
pub mod index;
pub mod load;
pub mod matcher;
pub mod model;
pub mod stats;
pub mod unfactured;
pub mod update;

pub use config::{ColumnMapping, ReconConfig};
pub use engine::{reconcile, reconcile_rows};
pub use error::ReconError;
pub use model::{BaseRecord, FieldValue, InvoiceRecord, ReconOutcome, ReconReport, SourceRow};
