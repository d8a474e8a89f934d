use crate::model::{BaseRecord, UnfacturedRecord};

/// Base rows with a key whose first folio slot is empty or zero.
pub fn scan_unfactured(base: &[BaseRecord]) -> Vec<UnfacturedRecord> {
    base.iter()
        .filter(|r| r.is_unfactured())
        .filter_map(|r| {
            Some(UnfacturedRecord {
                key: r.key?,
                recorded_total: r.total,
                reference_date: r.reference_date,
            })
        })
        .collect()
}
