use crate::matcher::MatchResults;
use crate::model::{ReconStats, UnfacturedRecord};

/// Tally one run. `processed` is the invoice count, everything else comes from the lists.
pub fn compute_stats(
    invoice_count: usize,
    results: &MatchResults,
    unfactured: &[UnfacturedRecord],
) -> ReconStats {
    ReconStats {
        processed: invoice_count,
        matched: results.matched.len(),
        not_found: results.not_found.len(),
        duplicates: results.duplicates.len(),
        unfactured: unfactured.len(),
        discrepancies: results.discrepancies.len(),
        total_amount: results.matched.iter().map(|m| m.invoiced_total).sum(),
        unfactured_amount: unfactured.iter().map(|u| u.recorded_total).sum(),
    }
}
