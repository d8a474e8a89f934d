use crate::model::{BaseRecord, BusinessKey, DiscrepancyRecord, InvoiceRecord};
use crate::update::invoiced_total;

/// Absolute percentage deviation of `invoiced` from `recorded`, also for negative
/// totals. `None` for a zero baseline.
pub fn percentage_difference(invoiced: f64, recorded: f64) -> Option<f64> {
    if recorded == 0.0 {
        return None;
    }
    Some(((invoiced - recorded) / recorded * 100.0).abs())
}

/// Flag the match when the deviation is strictly above `threshold_pct`.
pub fn detect(
    key: BusinessKey,
    record: &BaseRecord,
    invoice: &InvoiceRecord,
    threshold_pct: f64,
) -> Option<DiscrepancyRecord> {
    let invoiced = invoiced_total(invoice);
    let percentage = percentage_difference(invoiced, record.total)?;
    if percentage <= threshold_pct {
        return None;
    }
    Some(DiscrepancyRecord {
        key,
        invoiced_total: invoiced,
        recorded_total: record.total,
        difference: (invoiced - record.total).abs(),
        percentage,
    })
}
