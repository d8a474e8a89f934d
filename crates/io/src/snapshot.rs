//! Tagged cell snapshot of one sheet, loaded through calamine.
//!
//! Every non-empty cell is either a literal or a formula with its cached result,
//! so callers can branch on the tag without a calculation engine.

use std::collections::HashMap;
use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use cruce_recon::FieldValue;

use crate::error::XlsxError;
use crate::header::normalize_header;

#[derive(Debug, Clone, PartialEq)]
pub enum CellContent {
    Literal(FieldValue),
    Formula { expression: String, cached: FieldValue },
}

impl CellContent {
    /// Literal value, or the cached result of a formula.
    pub fn value(&self) -> &FieldValue {
        match self {
            Self::Literal(v) => v,
            Self::Formula { cached, .. } => cached,
        }
    }

    pub fn is_formula(&self) -> bool {
        matches!(self, Self::Formula { .. })
    }
}

/// All cells of one sheet, keyed by 0-based (row, col) in absolute sheet coordinates.
#[derive(Debug, Clone, Default)]
pub struct SheetSnapshot {
    pub sheet: String,
    cells: HashMap<(u32, u32), CellContent>,
    /// Highest 0-based row holding any cell.
    last_row: Option<u32>,
}

impl SheetSnapshot {
    pub fn cell(&self, row: u32, col: u32) -> Option<&CellContent> {
        self.cells.get(&(row, col))
    }

    pub fn value(&self, row: u32, col: u32) -> &FieldValue {
        static EMPTY: FieldValue = FieldValue::Empty;
        self.cell(row, col).map(CellContent::value).unwrap_or(&EMPTY)
    }

    /// Normalized header (row 1) → 0-based column. First occurrence wins.
    pub fn header_columns(&self) -> HashMap<String, u32> {
        let mut map = HashMap::new();
        for (name, col) in self.headers() {
            map.entry(name).or_insert(col);
        }
        map
    }

    /// Non-empty normalized headers in column order.
    pub fn headers(&self) -> Vec<(String, u32)> {
        let mut headers: Vec<(String, u32)> = self
            .cells
            .iter()
            .filter(|((row, _), _)| *row == 0)
            .filter_map(|((_, col), content)| {
                let name = normalize_header(&content.value().as_text()?);
                (!name.is_empty()).then_some((name, *col))
            })
            .collect();
        headers.sort_by_key(|(_, col)| *col);
        headers
    }

    /// Rows below the header, up to the last row holding any cell.
    pub fn data_row_count(&self) -> usize {
        self.last_row.map(|r| r as usize).unwrap_or(0)
    }

    pub fn formula_count(&self) -> usize {
        self.cells.values().filter(|c| c.is_formula()).count()
    }

    fn insert(&mut self, row: u32, col: u32, content: CellContent) {
        self.last_row = Some(self.last_row.map_or(row, |r| r.max(row)));
        self.cells.insert((row, col), content);
    }
}

/// Load one sheet of `path` with values and formulas.
pub fn load_snapshot(path: &Path, sheet: &str) -> Result<SheetSnapshot, XlsxError> {
    let mut workbook = open_workbook_auto(path).map_err(|e| XlsxError::Open {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let available = workbook.sheet_names().to_vec();
    if !available.iter().any(|name| name == sheet) {
        return Err(XlsxError::SheetNotFound {
            path: path.to_path_buf(),
            sheet: sheet.to_string(),
            available,
        });
    }

    let range = workbook.worksheet_range(sheet).map_err(|e| XlsxError::Open {
        path: path.to_path_buf(),
        message: format!("failed to read sheet '{sheet}': {e}"),
    })?;

    let mut snapshot = SheetSnapshot {
        sheet: sheet.to_string(),
        ..Default::default()
    };

    let (start_row, start_col) = range.start().unwrap_or((0, 0));
    for (row, col, data) in range.cells() {
        let value = data_to_field(data);
        if value == FieldValue::Empty {
            continue;
        }
        snapshot.insert(
            start_row + row as u32,
            start_col + col as u32,
            CellContent::Literal(value),
        );
    }

    // Formula range may start at a different offset than the data range
    if let Ok(formulas) = workbook.worksheet_formula(sheet) {
        let (f_row, f_col) = formulas.start().unwrap_or((0, 0));
        for (row, col, expression) in formulas.cells() {
            if expression.is_empty() {
                continue;
            }
            let (r, c) = (f_row + row as u32, f_col + col as u32);
            let cached = snapshot.value(r, c).clone();
            snapshot.insert(
                r,
                c,
                CellContent::Formula {
                    expression: expression.clone(),
                    cached,
                },
            );
        }
    }

    log::debug!(
        "loaded sheet '{sheet}' from {}: {} cells, {} formulas",
        path.display(),
        snapshot.cells.len(),
        snapshot.formula_count()
    );
    Ok(snapshot)
}

fn data_to_field(data: &Data) -> FieldValue {
    match data {
        Data::Empty => FieldValue::Empty,
        Data::String(s) if s.is_empty() => FieldValue::Empty,
        Data::String(s) => FieldValue::Text(s.clone()),
        Data::Float(n) => FieldValue::Number(*n),
        Data::Int(n) => FieldValue::Number(*n as f64),
        Data::Bool(b) => FieldValue::Bool(*b),
        Data::Error(e) => FieldValue::Text(e.to_string()),
        // 1900 date system assumed; calamine does not expose the 1904 flag
        Data::DateTime(dt) => serial_to_datetime(dt.as_f64())
            .map(FieldValue::DateTime)
            .unwrap_or(FieldValue::Number(dt.as_f64())),
        Data::DateTimeIso(s) => NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
            .ok()
            .or_else(|| {
                NaiveDate::parse_from_str(s, "%Y-%m-%d")
                    .ok()
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
            })
            .map(FieldValue::DateTime)
            .unwrap_or_else(|| FieldValue::Text(s.clone())),
        Data::DurationIso(s) => FieldValue::Text(s.clone()),
    }
}

fn excel_epoch() -> Option<NaiveDateTime> {
    NaiveDate::from_ymd_opt(1899, 12, 30).and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Excel serial (1900 system) → timestamp, rounded to the second.
pub(crate) fn serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial < 0.0 {
        return None;
    }
    let seconds = (serial * 86_400.0).round() as i64;
    excel_epoch()?.checked_add_signed(Duration::try_seconds(seconds)?)
}

pub(crate) fn datetime_to_serial(dt: &NaiveDateTime) -> Option<f64> {
    let delta = *dt - excel_epoch()?;
    Some(delta.num_seconds() as f64 / 86_400.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serial_conversion() {
        let dt = serial_to_datetime(45366.5).unwrap();
        assert_eq!(dt.to_string(), "2024-03-15 12:00:00");
        assert_eq!(datetime_to_serial(&dt), Some(45366.5));
        assert!(serial_to_datetime(f64::NAN).is_none());
    }

    #[test]
    fn data_mapping() {
        assert_eq!(data_to_field(&Data::Int(3)), FieldValue::Number(3.0));
        assert_eq!(data_to_field(&Data::Empty), FieldValue::Empty);
        assert_eq!(
            data_to_field(&Data::DateTimeIso("2024-01-02".into())),
            FieldValue::DateTime(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap().and_hms_opt(0, 0, 0).unwrap())
        );
    }

    #[test]
    fn content_tags() {
        let f = CellContent::Formula {
            expression: "B2-C2".into(),
            cached: FieldValue::Number(4.0),
        };
        assert!(f.is_formula());
        assert_eq!(f.value(), &FieldValue::Number(4.0));
        assert!(!CellContent::Literal(FieldValue::Empty).is_formula());
    }
}
