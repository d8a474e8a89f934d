use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::config::ColumnMapping;

/// Number of repeating (folio, invoice number, amount) slots per record.
pub const SLOT_COUNT: usize = 5;

/// Case number shared by both datasets.
pub type BusinessKey = u64;

// ---------------------------------------------------------------------------
// Cell values
// ---------------------------------------------------------------------------

/// A single cell value as read from a sheet.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum FieldValue {
    #[default]
    Empty,
    Number(f64),
    Text(String),
    Bool(bool),
    DateTime(NaiveDateTime),
}

impl FieldValue {
    /// Empty cells and whitespace-only text.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Finite numeric reading of the cell. Text is accepted when it parses cleanly.
    pub fn as_number(&self) -> Option<f64> {
        let n = match self {
            Self::Number(n) => *n,
            Self::Text(s) => s.trim().parse::<f64>().ok()?,
            _ => return None,
        };
        n.is_finite().then_some(n)
    }

    /// Text form for identifiers like invoice numbers. Integral numbers lose the `.0`.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Self::Empty => None,
            Self::Text(s) => {
                let t = s.trim();
                (!t.is_empty()).then(|| t.to_string())
            }
            Self::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => Some(format!("{}", *n as i64)),
            Self::Number(n) => Some(n.to_string()),
            Self::Bool(b) => Some(if *b { "TRUE" } else { "FALSE" }.to_string()),
            Self::DateTime(dt) => Some(dt.to_string()),
        }
    }

    /// Positive integer reading used for keys and folios.
    pub fn as_positive_int(&self) -> Option<u64> {
        let n = self.as_number()?;
        (n > 0.0 && n.fract() == 0.0 && n <= u64::MAX as f64).then_some(n as u64)
    }
}

/// One sheet row keyed by normalized header.
pub type SourceRow = BTreeMap<String, FieldValue>;

// ---------------------------------------------------------------------------
// Invoice dataset
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InvoiceSlot {
    pub folio: Option<u64>,
    /// Kept as read so numeric invoice numbers stay numbers in the base.
    pub invoice_number: FieldValue,
    /// `None` when the cell is empty or not numeric.
    pub amount: Option<f64>,
}

impl InvoiceSlot {
    pub fn is_present(&self) -> bool {
        self.folio.is_some()
    }
}

/// Immutable invoice row.
#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceRecord {
    pub key: BusinessKey,
    pub slots: [InvoiceSlot; SLOT_COUNT],
    pub vehicle: Option<String>,
    /// 1-based sheet row, for diagnostics.
    pub row: usize,
}

impl InvoiceRecord {
    pub fn new(key: BusinessKey) -> Self {
        Self {
            key,
            slots: Default::default(),
            vehicle: None,
            row: 0,
        }
    }

    /// Builder used by tests and callers that assemble records by hand. `slot` is
    /// 1-based; slots outside `1..=SLOT_COUNT` are ignored.
    pub fn with_slot(mut self, slot: usize, folio: u64, invoice_number: &str, amount: f64) -> Self {
        match slot.checked_sub(1).and_then(|i| self.slots.get_mut(i)) {
            Some(target) => {
                *target = InvoiceSlot {
                    folio: Some(folio),
                    invoice_number: FieldValue::Text(invoice_number.to_string()),
                    amount: Some(amount),
                };
            }
            None => log::warn!("invoice {}: slot {slot} out of range 1..={SLOT_COUNT}", self.key),
        }
        self
    }
}

// ---------------------------------------------------------------------------
// Base dataset
// ---------------------------------------------------------------------------

/// Mirrored slot on a base row. Values stay raw so untouched cells round-trip exactly.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BaseSlot {
    pub folio: FieldValue,
    pub invoice_number: FieldValue,
    pub amount: FieldValue,
}

/// Mutable operative row. Position `i` in the dataset is sheet row `i + 2`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BaseRecord {
    /// `None` for blank or keyless rows; those are carried but never indexed.
    pub key: Option<BusinessKey>,
    /// Recorded total as read. The original cell stays in `total_cell`.
    pub total: f64,
    pub total_cell: FieldValue,
    pub slots: [BaseSlot; SLOT_COUNT],
    pub invoiced_total: FieldValue,
    pub difference: FieldValue,
    pub reference_date: Option<NaiveDateTime>,
    pub date_cell: FieldValue,
    /// Every other column, passed through untouched.
    pub fields: SourceRow,
    /// Raw key cell.
    pub key_cell: FieldValue,
}

impl BaseRecord {
    pub fn new(key: BusinessKey, total: f64) -> Self {
        Self {
            key: Some(key),
            total,
            total_cell: FieldValue::Number(total),
            key_cell: FieldValue::Number(key as f64),
            ..Default::default()
        }
    }

    /// First folio slot empty or zero.
    pub fn is_unfactured(&self) -> bool {
        let folio = &self.slots[0].folio;
        folio.is_empty() || folio.as_number() == Some(0.0)
    }

    /// Rebuilds the full sheet row: pass-through fields plus every engine-owned column.
    pub fn to_row(&self, columns: &ColumnMapping) -> SourceRow {
        let mut row = self.fields.clone();
        let mut put = |name: String, value: &FieldValue| {
            row.insert(name, value.clone());
        };
        put(columns.key.clone(), &self.key_cell);
        put(columns.total.clone(), &self.total_cell);
        for (i, slot) in self.slots.iter().enumerate() {
            put(columns.folio(i + 1), &slot.folio);
            put(columns.invoice_number(i + 1), &slot.invoice_number);
            put(columns.amount(i + 1), &slot.amount);
        }
        put(columns.invoiced_total.clone(), &self.invoiced_total);
        put(columns.difference.clone(), &self.difference);
        put(columns.date.clone(), &self.date_cell);
        row
    }
}

// ---------------------------------------------------------------------------
// Matching
// ---------------------------------------------------------------------------

/// Lookup result for one invoice key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome<'a> {
    NotFound,
    Unique(usize),
    Duplicate(&'a [usize]),
}

/// A "found" entry, duplicated or not.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchEntry {
    pub key: BusinessKey,
    pub duplicated: bool,
    pub occurrences: usize,
    pub positions: Vec<usize>,
    /// The matched invoice's own invoiced total.
    pub invoiced_total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotFoundEntry {
    pub key: BusinessKey,
    pub folio: Option<u64>,
    pub invoice_number: Option<String>,
    pub amount: Option<f64>,
    pub vehicle: Option<String>,
    pub row: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateEntry {
    pub key: BusinessKey,
    pub occurrences: usize,
    pub positions: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscrepancyRecord {
    pub key: BusinessKey,
    pub invoiced_total: f64,
    pub recorded_total: f64,
    pub difference: f64,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnfacturedRecord {
    pub key: BusinessKey,
    pub recorded_total: f64,
    pub reference_date: Option<NaiveDateTime>,
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconStats {
    pub processed: usize,
    pub matched: usize,
    pub not_found: usize,
    pub duplicates: usize,
    pub unfactured: usize,
    pub discrepancies: usize,
    pub total_amount: f64,
    pub unfactured_amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportMeta {
    pub engine_version: String,
    pub generated_at: String,
    pub threshold_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconReport {
    pub meta: ReportMeta,
    pub stats: ReconStats,
    pub matched: Vec<MatchEntry>,
    pub not_found: Vec<NotFoundEntry>,
    pub duplicates: Vec<DuplicateEntry>,
    pub unfactured: Vec<UnfacturedRecord>,
    pub discrepancies: Vec<DiscrepancyRecord>,
}

impl ReconReport {
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Everything one run produces: the report and the mutated base dataset.
#[derive(Debug, Clone)]
pub struct ReconOutcome {
    pub report: ReconReport,
    pub base: Vec<BaseRecord>,
}

impl ReconOutcome {
    /// Base rows in sheet order, ready for the writer.
    pub fn base_rows(&self, columns: &ColumnMapping) -> Vec<SourceRow> {
        self.base.iter().map(|r| r.to_row(columns)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_value_numbers() {
        assert_eq!(FieldValue::Number(12.5).as_number(), Some(12.5));
        assert_eq!(FieldValue::Text(" 300 ".into()).as_number(), Some(300.0));
        assert_eq!(FieldValue::Text("n/a".into()).as_number(), None);
        assert_eq!(FieldValue::Number(f64::NAN).as_number(), None);
        assert_eq!(FieldValue::Empty.as_number(), None);
    }

    #[test]
    fn field_value_positive_int() {
        assert_eq!(FieldValue::Number(100000001.0).as_positive_int(), Some(100000001));
        assert_eq!(FieldValue::Text("42".into()).as_positive_int(), Some(42));
        assert_eq!(FieldValue::Number(0.0).as_positive_int(), None);
        assert_eq!(FieldValue::Number(1.5).as_positive_int(), None);
        assert_eq!(FieldValue::Number(-3.0).as_positive_int(), None);
    }

    #[test]
    fn field_value_text() {
        assert_eq!(FieldValue::Number(12345.0).as_text().as_deref(), Some("12345"));
        assert_eq!(FieldValue::Text("  A-1 ".into()).as_text().as_deref(), Some("A-1"));
        assert_eq!(FieldValue::Text("   ".into()).as_text(), None);
        assert!(FieldValue::Text(" ".into()).is_empty());
    }

    #[test]
    fn with_slot_ignores_out_of_range() {
        let invoice = InvoiceRecord::new(3)
            .with_slot(0, 1, "A", 10.0)
            .with_slot(SLOT_COUNT + 1, 2, "B", 20.0)
            .with_slot(SLOT_COUNT, 3, "C", 30.0);
        assert!(invoice.slots[..SLOT_COUNT - 1].iter().all(|s| !s.is_present()));
        assert_eq!(invoice.slots[SLOT_COUNT - 1].folio, Some(3));
        assert_eq!(invoice.slots[SLOT_COUNT - 1].invoice_number, FieldValue::Text("C".into()));
    }

    #[test]
    fn unfactured_detection() {
        let mut record = BaseRecord::new(7, 100.0);
        assert!(record.is_unfactured());
        record.slots[0].folio = FieldValue::Number(0.0);
        assert!(record.is_unfactured());
        record.slots[0].folio = FieldValue::Number(55.0);
        assert!(!record.is_unfactured());
    }

    #[test]
    fn to_row_keeps_passthrough_fields() {
        let columns = ColumnMapping::default();
        let mut record = BaseRecord::new(9, 250.0);
        record.fields.insert("Aseguradora".into(), FieldValue::Text("GNP".into()));
        record.slots[1].amount = FieldValue::Number(20.0);

        let row = record.to_row(&columns);
        assert_eq!(row["Aseguradora"], FieldValue::Text("GNP".into()));
        assert_eq!(row["EXPEDIENTE"], FieldValue::Number(9.0));
        assert_eq!(row["TOTAL"], FieldValue::Number(250.0));
        assert_eq!(row["Monto 2"], FieldValue::Number(20.0));
        assert_eq!(row["Folio 1"], FieldValue::Empty);
        assert_eq!(row.len(), 1 + columns.base_owned().len());
    }
}
