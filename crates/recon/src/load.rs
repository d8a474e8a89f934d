//! Row → record conversion for both datasets.

use chrono::{NaiveDate, NaiveDateTime};

use crate::config::ColumnMapping;
use crate::error::{Dataset, ReconError};
use crate::model::{
    BaseRecord, BaseSlot, FieldValue, InvoiceRecord, InvoiceSlot, SourceRow, SLOT_COUNT,
};

/// First data row in the sheet (row 1 holds headers).
const FIRST_DATA_ROW: usize = 2;

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%Y/%m/%d"];

/// Convert invoice rows. Blank rows are skipped; a row with data must carry a valid key.
/// A folio that is not a positive integer leaves its slot absent.
pub fn load_invoice_records(
    rows: &[SourceRow],
    columns: &ColumnMapping,
) -> Result<Vec<InvoiceRecord>, ReconError> {
    require_column(rows, &columns.key, Dataset::Invoices)?;

    let mut records = Vec::with_capacity(rows.len());
    for (i, row) in rows.iter().enumerate() {
        if row.values().all(FieldValue::is_empty) {
            continue;
        }
        let sheet_row = i + FIRST_DATA_ROW;

        let key_cell = cell(row, &columns.key);
        let key = key_cell.as_positive_int().ok_or_else(|| ReconError::InvalidKey {
            dataset: Dataset::Invoices,
            row: sheet_row,
            value: key_cell.as_text().unwrap_or_default(),
        })?;

        let mut slots: [InvoiceSlot; SLOT_COUNT] = Default::default();
        for (idx, slot) in slots.iter_mut().enumerate() {
            let folio_col = columns.folio(idx + 1);
            let folio_cell = cell(row, &folio_col);
            slot.folio = folio_cell.as_positive_int();
            if slot.folio.is_none() && !folio_cell.is_empty() {
                log::warn!(
                    "invoices row {sheet_row}: '{folio_col}' value '{}' is not a positive integer, slot not applied",
                    folio_cell.as_text().unwrap_or_default()
                );
            }
            slot.invoice_number = identifier(cell(row, &columns.invoice_number(idx + 1)));
            slot.amount = cell(row, &columns.amount(idx + 1)).as_number();
        }

        records.push(InvoiceRecord {
            key,
            slots,
            vehicle: cell(row, &columns.vehicle).as_text(),
            row: sheet_row,
        });
    }

    log::debug!("loaded {} invoice records from {} rows", records.len(), rows.len());
    Ok(records)
}

/// Convert base rows one-to-one, so position `i` stays sheet row `i + 2`.
///
/// Rows whose key cell is blank or unreadable are kept keyless.
pub fn load_base_records(
    rows: &[SourceRow],
    columns: &ColumnMapping,
) -> Result<Vec<BaseRecord>, ReconError> {
    require_column(rows, &columns.key, Dataset::Base)?;

    let mut keyless = 0usize;
    let records: Vec<BaseRecord> = rows
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let record = base_record(row, columns);
            if record.key.is_none() && !record.key_cell.is_empty() {
                log::warn!(
                    "base row {}: key '{}' is not a positive integer, row will not be matched",
                    i + FIRST_DATA_ROW,
                    record.key_cell.as_text().unwrap_or_default()
                );
            }
            if record.key.is_none() {
                keyless += 1;
            }
            record
        })
        .collect();

    log::debug!("loaded {} base records ({keyless} without key)", records.len());
    Ok(records)
}

fn base_record(row: &SourceRow, columns: &ColumnMapping) -> BaseRecord {
    let mut fields = row.clone();
    let mut take = |name: &str| fields.remove(name).unwrap_or_default();

    let key_cell = take(&columns.key);
    let total_cell = take(&columns.total);

    let mut slots: [BaseSlot; SLOT_COUNT] = Default::default();
    for (idx, slot) in slots.iter_mut().enumerate() {
        slot.folio = take(&columns.folio(idx + 1));
        slot.invoice_number = take(&columns.invoice_number(idx + 1));
        slot.amount = take(&columns.amount(idx + 1));
    }

    let invoiced_total = take(&columns.invoiced_total);
    let difference = take(&columns.difference);
    let date_cell = take(&columns.date);

    BaseRecord {
        key: key_cell.as_positive_int(),
        total: total_cell.as_number().unwrap_or(0.0),
        total_cell,
        slots,
        invoiced_total,
        difference,
        reference_date: parse_date(&date_cell),
        date_cell,
        fields,
        key_cell,
    }
}

fn cell<'a>(row: &'a SourceRow, name: &str) -> &'a FieldValue {
    static EMPTY: FieldValue = FieldValue::Empty;
    row.get(name).unwrap_or(&EMPTY)
}

/// Trimmed text or the raw value, so numbers keep their cell type.
fn identifier(value: &FieldValue) -> FieldValue {
    match value {
        FieldValue::Text(s) if s.trim().is_empty() => FieldValue::Empty,
        FieldValue::Text(s) => FieldValue::Text(s.trim().to_string()),
        other => other.clone(),
    }
}

fn require_column(rows: &[SourceRow], column: &str, dataset: Dataset) -> Result<(), ReconError> {
    match rows.first() {
        Some(row) if !row.contains_key(column) => Err(ReconError::MissingColumn {
            dataset,
            column: column.to_string(),
        }),
        _ => Ok(()),
    }
}

fn parse_date(value: &FieldValue) -> Option<NaiveDateTime> {
    match value {
        FieldValue::DateTime(dt) => Some(*dt),
        FieldValue::Text(s) => {
            let s = s.trim();
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        }
        _ => None,
    }
}
