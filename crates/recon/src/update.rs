//! Propagates invoice slots into base rows and recomputes derived totals.

use crate::model::{BaseRecord, FieldValue, InvoiceRecord};

/// Sum of every numeric, finite amount slot. Missing or non-numeric slots add 0.
pub fn invoiced_total(invoice: &InvoiceRecord) -> f64 {
    invoice
        .slots
        .iter()
        .filter_map(|slot| slot.amount)
        .filter(|amount| amount.is_finite())
        .sum()
}

/// Overwrite each slot whose invoice folio is present, then refresh the invoiced
/// total and the difference against the recorded total.
pub fn apply_invoice(record: &mut BaseRecord, invoice: &InvoiceRecord) {
    for (target, slot) in record.slots.iter_mut().zip(invoice.slots.iter()) {
        let Some(folio) = slot.folio else {
            continue;
        };
        target.folio = FieldValue::Number(folio as f64);
        target.invoice_number = slot.invoice_number.clone();
        target.amount = FieldValue::Number(slot.amount.filter(|a| a.is_finite()).unwrap_or(0.0));
    }

    let total = invoiced_total(invoice);
    record.invoiced_total = FieldValue::Number(total);
    record.difference = FieldValue::Number(record.total - total);
}
