use std::time::Instant;

use crate::config::ReconConfig;
use crate::error::ReconError;
use crate::index::KeyIndex;
use crate::load::{load_base_records, load_invoice_records};
use crate::matcher::match_invoices;
use crate::model::{BaseRecord, InvoiceRecord, ReconOutcome, ReconReport, ReportMeta, SourceRow};
use crate::stats::compute_stats;
use crate::unfactured::scan_unfactured;

/// Run one reconciliation. Takes ownership of the base rows and hands them back mutated.
pub fn reconcile(
    config: &ReconConfig,
    invoices: &[InvoiceRecord],
    mut base: Vec<BaseRecord>,
) -> ReconOutcome {
    let started = Instant::now();

    let index = KeyIndex::build(&base);
    log::info!(
        "indexed {} base rows: {} unique keys, {} duplicated",
        base.len(),
        index.unique_keys(),
        index.duplicate_keys()
    );

    let threshold = config.discrepancy_threshold_pct;
    let results = match_invoices(invoices, &index, &mut base, threshold);
    let unfactured = scan_unfactured(&base);
    let stats = compute_stats(invoices.len(), &results, &unfactured);

    log::info!(
        "reconciled {} invoices: {} matched, {} not found, {} duplicated, {} discrepancies, {} unfactured ({:?})",
        stats.processed,
        stats.matched,
        stats.not_found,
        stats.duplicates,
        stats.discrepancies,
        stats.unfactured,
        started.elapsed()
    );

    let report = ReconReport {
        meta: ReportMeta {
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            generated_at: chrono::Utc::now().to_rfc3339(),
            threshold_pct: threshold,
        },
        stats,
        matched: results.matched,
        not_found: results.not_found,
        duplicates: results.duplicates,
        unfactured,
        discrepancies: results.discrepancies,
    };

    ReconOutcome { report, base }
}

/// Convert raw sheet rows with the configured column mapping, then reconcile.
pub fn reconcile_rows(
    config: &ReconConfig,
    invoice_rows: &[SourceRow],
    base_rows: &[SourceRow],
) -> Result<ReconOutcome, ReconError> {
    let invoices = load_invoice_records(invoice_rows, &config.columns)?;
    let base = load_base_records(base_rows, &config.columns)?;
    Ok(reconcile(config, &invoices, base))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FieldValue;

    #[test]
    fn empty_inputs() {
        let outcome = reconcile(&ReconConfig::default(), &[], Vec::new());
        assert_eq!(outcome.report.stats.processed, 0);
        assert!(outcome.base.is_empty());
        assert_eq!(outcome.report.meta.threshold_pct, 10.0);
    }

    #[test]
    fn threshold_comes_from_config() {
        let config = ReconConfig {
            discrepancy_threshold_pct: 95.0,
            ..Default::default()
        };
        let invoice = InvoiceRecord::new(1).with_slot(1, 1, "F", 100.0);
        let outcome = reconcile(&config, &[invoice], vec![BaseRecord::new(1, 1000.0)]);
        assert!(outcome.report.discrepancies.is_empty());
        assert_eq!(outcome.base[0].difference, FieldValue::Number(900.0));
    }

    #[test]
    fn rows_are_converted_with_mapping() {
        let config = ReconConfig::default();
        let mut inv = SourceRow::new();
        inv.insert("EXPEDIENTE".into(), FieldValue::Number(12.0));
        inv.insert("Folio 1".into(), FieldValue::Number(3.0));
        inv.insert("Monto 1".into(), FieldValue::Number(40.0));
        let mut base = SourceRow::new();
        base.insert("EXPEDIENTE".into(), FieldValue::Number(12.0));
        base.insert("TOTAL".into(), FieldValue::Number(40.0));

        let outcome = reconcile_rows(&config, &[inv], &[base]).unwrap();
        assert_eq!(outcome.report.stats.matched, 1);
        let rows = outcome.base_rows(&config.columns);
        assert_eq!(rows[0]["COBRADO // FACTURADO"], FieldValue::Number(40.0));
        assert_eq!(rows[0]["DIFERENCIAS"], FieldValue::Number(0.0));
    }
}
