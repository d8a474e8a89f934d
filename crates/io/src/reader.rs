use std::path::Path;

use cruce_recon::SourceRow;

use crate::error::XlsxError;
use crate::snapshot::{load_snapshot, SheetSnapshot};

/// Sheet contents as rows keyed by normalized header.
#[derive(Debug, Clone, Default)]
pub struct SheetRows {
    pub headers: Vec<String>,
    /// `rows[i]` is sheet row `i + 2`. Blank rows are kept as all-empty rows.
    pub rows: Vec<SourceRow>,
}

/// Read `sheet` from `path`. Every row carries every header, formula cells
/// contribute their cached result.
pub fn read_rows(path: &Path, sheet: &str, max_rows: usize) -> Result<SheetRows, XlsxError> {
    let snapshot = load_snapshot(path, sheet)?;
    let rows = snapshot.data_row_count();
    if rows > max_rows {
        return Err(XlsxError::RowLimit {
            path: path.to_path_buf(),
            rows,
            max: max_rows,
        });
    }
    let sheet_rows = rows_from_snapshot(&snapshot);
    log::info!(
        "read {} rows x {} columns from '{}' [{sheet}]",
        sheet_rows.rows.len(),
        sheet_rows.headers.len(),
        path.display()
    );
    Ok(sheet_rows)
}

pub fn rows_from_snapshot(snapshot: &SheetSnapshot) -> SheetRows {
    let mut columns = snapshot.headers();
    // duplicate headers: keep the leftmost column
    let mut seen = std::collections::HashSet::new();
    columns.retain(|(name, _)| seen.insert(name.clone()));

    let rows = (1..=snapshot.data_row_count() as u32)
        .map(|row| {
            columns
                .iter()
                .map(|(name, col)| (name.clone(), snapshot.value(row, *col).clone()))
                .collect()
        })
        .collect();

    SheetRows {
        headers: columns.into_iter().map(|(name, _)| name).collect(),
        rows,
    }
}
