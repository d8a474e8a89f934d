use crate::discrepancy::detect;
use crate::index::KeyIndex;
use crate::model::{
    BaseRecord, DiscrepancyRecord, DuplicateEntry, InvoiceRecord, MatchEntry, MatchOutcome,
    NotFoundEntry,
};
use crate::update::{apply_invoice, invoiced_total};

/// Classified output of one matching pass.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct MatchResults {
    pub matched: Vec<MatchEntry>,
    pub not_found: Vec<NotFoundEntry>,
    pub duplicates: Vec<DuplicateEntry>,
    pub discrepancies: Vec<DiscrepancyRecord>,
}

/// Classify every invoice against the index and update matched base rows in place.
///
/// Duplicate keys update every listed position with the same payload; the
/// discrepancy check runs once, against the first position.
pub fn match_invoices(
    invoices: &[InvoiceRecord],
    index: &KeyIndex,
    base: &mut [BaseRecord],
    threshold_pct: f64,
) -> MatchResults {
    let mut out = MatchResults::default();

    for invoice in invoices {
        let key = invoice.key;
        let positions: Vec<usize> = match index.lookup(key) {
            MatchOutcome::NotFound => {
                let first = &invoice.slots[0];
                out.not_found.push(NotFoundEntry {
                    key,
                    folio: first.folio,
                    invoice_number: first.invoice_number.as_text(),
                    amount: first.amount,
                    vehicle: invoice.vehicle.clone(),
                    row: invoice.row,
                });
                continue;
            }
            MatchOutcome::Unique(pos) => vec![pos],
            MatchOutcome::Duplicate(all) => all.to_vec(),
        };

        for &pos in &positions {
            apply_invoice(&mut base[pos], invoice);
        }

        let representative = positions[0];
        if let Some(d) = detect(key, &base[representative], invoice, threshold_pct) {
            out.discrepancies.push(d);
        }

        let occurrences = positions.len();
        let duplicated = occurrences > 1;
        if duplicated {
            log::debug!("key {key} appears {occurrences} times in base, updating all");
            out.duplicates.push(DuplicateEntry {
                key,
                occurrences,
                positions: positions.clone(),
            });
        }
        out.matched.push(MatchEntry {
            key,
            duplicated,
            occurrences,
            positions,
            invoiced_total: invoiced_total(invoice),
        });
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FieldValue;

    fn base(keys_totals: &[(u64, f64)]) -> Vec<BaseRecord> {
        keys_totals.iter().map(|&(k, t)| BaseRecord::new(k, t)).collect()
    }

    #[test]
    fn not_found_carries_first_slot() {
        let mut records = base(&[(1, 100.0)]);
        let index = KeyIndex::build(&records);
        let mut invoice = InvoiceRecord::new(2).with_slot(1, 44, "F-44", 80.0);
        invoice.vehicle = Some("Aveo".into());

        let out = match_invoices(&[invoice], &index, &mut records, 10.0);
        assert!(out.matched.is_empty());
        assert_eq!(out.not_found.len(), 1);
        let nf = &out.not_found[0];
        assert_eq!(nf.key, 2);
        assert_eq!(nf.folio, Some(44));
        assert_eq!(nf.invoice_number.as_deref(), Some("F-44"));
        assert_eq!(nf.amount, Some(80.0));
        assert_eq!(nf.vehicle.as_deref(), Some("Aveo"));
        assert_eq!(records[0].invoiced_total, FieldValue::Empty, "no mutation on miss");
    }

    #[test]
    fn unique_match() {
        let mut records = base(&[(1, 100.0), (2, 200.0)]);
        let index = KeyIndex::build(&records);
        let invoice = InvoiceRecord::new(2).with_slot(1, 7, "F-7", 200.0);

        let out = match_invoices(&[invoice], &index, &mut records, 10.0);
        assert_eq!(out.matched.len(), 1);
        assert!(!out.matched[0].duplicated);
        assert_eq!(out.matched[0].occurrences, 1);
        assert_eq!(out.matched[0].positions, vec![1]);
        assert!(out.duplicates.is_empty());
        assert!(out.discrepancies.is_empty());
        assert_eq!(records[1].difference, FieldValue::Number(0.0));
        assert_eq!(records[0].slots[0].folio, FieldValue::Empty);
    }

    #[test]
    fn duplicate_updates_all_and_checks_first_only() {
        // first occurrence matches exactly, second would be a 90% deviation
        let mut records = base(&[(5, 100.0), (9, 1.0), (5, 1000.0)]);
        let index = KeyIndex::build(&records);
        let invoice = InvoiceRecord::new(5).with_slot(1, 70, "F-70", 100.0);

        let out = match_invoices(&[invoice], &index, &mut records, 10.0);
        assert_eq!(out.duplicates.len(), 1);
        assert_eq!(out.duplicates[0].occurrences, 2);
        assert_eq!(out.duplicates[0].positions, vec![0, 2]);
        assert!(out.matched[0].duplicated);
        assert!(out.discrepancies.is_empty());
        assert_eq!(records[0].slots, records[2].slots);
        assert_eq!(records[0].invoiced_total, records[2].invoiced_total);
        assert_eq!(records[2].difference, FieldValue::Number(900.0));
    }

    #[test]
    fn discrepancy_reported_for_match() {
        let mut records = base(&[(3, 1000.0)]);
        let index = KeyIndex::build(&records);
        let invoice = InvoiceRecord::new(3).with_slot(1, 1, "F", 100.0);
        let out = match_invoices(&[invoice], &index, &mut records, 10.0);
        assert_eq!(out.discrepancies.len(), 1);
        assert_eq!(out.discrepancies[0].percentage, 90.0);
    }

    #[test]
    fn repeated_invoice_key_matches_each_time() {
        let mut records = base(&[(8, 300.0)]);
        let index = KeyIndex::build(&records);
        let invoices = vec![
            InvoiceRecord::new(8).with_slot(1, 1, "A", 100.0),
            InvoiceRecord::new(8).with_slot(2, 2, "B", 300.0),
        ];
        let out = match_invoices(&invoices, &index, &mut records, 10.0);
        assert_eq!(out.matched.len(), 2);
        // later invoice wins on the derived totals
        assert_eq!(records[0].invoiced_total, FieldValue::Number(300.0));
        assert_eq!(records[0].slots[0].folio, FieldValue::Number(1.0));
        assert_eq!(records[0].slots[1].folio, FieldValue::Number(2.0));
    }
}
