//! Format-preserving xlsx writer.
//!
//! The output package is the original package with the target worksheet patched in
//! place, styles.xml extended when tone styles are needed and `fullCalcOnLoad` set
//! when literals changed. Every other entry is raw-copied.

use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

use cruce_recon::{FieldValue, SourceRow};
use tempfile::NamedTempFile;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::XlsxError;
use crate::package::{read_part, resolve_sheet_part, STYLES_PART, WORKBOOK_PART, WORKBOOK_RELS_PART};
use crate::patch::{ensure_full_calc_on_load, patch_worksheet, CellEdit, PatchStats, SheetEdits, ToneEdit};
use crate::snapshot::{load_snapshot, CellContent, SheetSnapshot};
use crate::styles::StyleSheet;

#[derive(Debug, Clone, Copy)]
pub struct WriteOptions<'a> {
    pub sheet: &'a str,
    /// Column whose numeric value selects the adverse/favorable style.
    pub difference_column: Option<&'a str>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteSummary {
    pub rows: usize,
    pub cells_written: usize,
    pub formulas_preserved: usize,
    pub cells_styled: usize,
}

impl WriteSummary {
    pub fn summary(&self) -> String {
        format!(
            "{} rows, {} cells written, {} formulas preserved, {} cells styled",
            self.rows, self.cells_written, self.formulas_preserved, self.cells_styled
        )
    }
}

/// Write `rows` over the data rows of `options.sheet` in a copy of `original`.
///
/// `rows[i]` targets sheet row `i + 2`. Formula cells are never overwritten and
/// unchanged values leave their XML untouched. `output` must differ from `original`;
/// it is only replaced once the new package is complete.
pub fn update_values_preserving_formulas(
    original: &Path,
    rows: &[SourceRow],
    output: &Path,
    options: &WriteOptions<'_>,
) -> Result<WriteSummary, XlsxError> {
    let start = Instant::now();
    if same_file(original, output) {
        return Err(XlsxError::SamePath(output.to_path_buf()));
    }

    let snapshot = load_snapshot(original, options.sheet)?;
    let (edits, formulas_skipped) = plan_edits(&snapshot, rows, options.difference_column);

    let file = File::open(original).map_err(|e| XlsxError::Open {
        path: original.to_path_buf(),
        message: e.to_string(),
    })?;
    let mut archive = ZipArchive::new(file)?;

    let workbook_xml = read_part(&mut archive, WORKBOOK_PART)?
        .ok_or_else(|| XlsxError::Package(format!("missing {WORKBOOK_PART}")))?;
    let rels_xml = read_part(&mut archive, WORKBOOK_RELS_PART)?
        .ok_or_else(|| XlsxError::Package(format!("missing {WORKBOOK_RELS_PART}")))?;
    let sheet_part = resolve_sheet_part(&workbook_xml, &rels_xml, options.sheet)?.ok_or_else(|| {
        XlsxError::SheetNotFound {
            path: original.to_path_buf(),
            sheet: options.sheet.to_string(),
            available: Vec::new(),
        }
    })?;
    let sheet_xml = read_part(&mut archive, &sheet_part)?
        .ok_or_else(|| XlsxError::Package(format!("missing worksheet part {sheet_part}")))?;

    let styles_xml = read_part(&mut archive, STYLES_PART)?;
    let mut styles = match &styles_xml {
        Some(xml) => StyleSheet::parse(xml)?,
        None => None,
    };
    let wants_tone = edits
        .values()
        .flat_map(|r| r.values())
        .any(|e| matches!(e.tone, ToneEdit::Set(_)));
    if styles.is_none() && wants_tone {
        log::warn!("{STYLES_PART} has no font/cellXfs tables, difference styling skipped");
    }

    let mut replacements: HashMap<String, Vec<u8>> = HashMap::new();
    let mut stats = PatchStats::default();
    if !edits.is_empty() {
        let (patched_sheet, patch_stats) = patch_worksheet(&sheet_xml, &edits, styles.as_mut())?;
        if patch_stats.changed() {
            replacements.insert(sheet_part.clone(), patched_sheet);
        }
        stats = patch_stats;
    }
    if stats.written > 0 {
        replacements.insert(WORKBOOK_PART.to_string(), ensure_full_calc_on_load(&workbook_xml)?);
    }
    if let (Some(styles), Some(xml)) = (&styles, &styles_xml) {
        if styles.added() > 0 {
            replacements.insert(STYLES_PART.to_string(), styles.render(xml)?);
        }
    }

    write_package(&mut archive, &replacements, output)?;

    let summary = WriteSummary {
        rows: rows.len(),
        cells_written: stats.written,
        formulas_preserved: formulas_skipped + stats.formulas_preserved,
        cells_styled: stats.styled,
    };
    log::info!(
        "wrote '{}' [{}]: {} in {:.2?}",
        output.display(),
        options.sheet,
        summary.summary(),
        start.elapsed()
    );
    Ok(summary)
}

/// Diff `rows` against the snapshot. Returns the edits and the number of row
/// values that landed on formula cells.
pub(crate) fn plan_edits(
    snapshot: &SheetSnapshot,
    rows: &[SourceRow],
    difference_column: Option<&str>,
) -> (SheetEdits, usize) {
    let columns = snapshot.header_columns();
    let difference_col = difference_column.and_then(|name| columns.get(name).copied());
    let mut edits = SheetEdits::new();
    let mut formulas = 0usize;
    let mut unmapped = std::collections::BTreeSet::new();

    for (i, row) in rows.iter().enumerate() {
        let sheet_row = i as u32 + 1;
        for (name, value) in row {
            let Some(&col) = columns.get(name) else {
                unmapped.insert(name.as_str());
                continue;
            };
            let current = snapshot.cell(sheet_row, col);
            let mut edit = CellEdit::default();

            match current {
                Some(CellContent::Formula { cached, .. }) => {
                    formulas += 1;
                    if Some(col) == difference_col {
                        let n = value.as_number().or_else(|| cached.as_number());
                        edit.tone = ToneEdit::for_difference(n);
                    }
                }
                _ => {
                    let old = current.map(CellContent::value).unwrap_or(&FieldValue::Empty);
                    if old != value {
                        edit.value = Some(value.clone());
                    }
                    if Some(col) == difference_col {
                        edit.tone = ToneEdit::for_difference(value.as_number());
                    }
                    // nothing to untone in a cell that is not there
                    if current.is_none() && edit.value.is_none() && edit.tone == ToneEdit::Clear {
                        edit.tone = ToneEdit::Keep;
                    }
                }
            }

            if edit != CellEdit::default() {
                edits.entry(sheet_row + 1).or_default().insert(col, edit);
            }
        }
    }

    if !unmapped.is_empty() {
        log::debug!(
            "columns absent from sheet '{}' left unwritten: {}",
            snapshot.sheet,
            unmapped.into_iter().collect::<Vec<_>>().join(", ")
        );
    }
    (edits, formulas)
}

/// Rebuild the package at `output` through a temp file in the same directory.
fn write_package(
    archive: &mut ZipArchive<File>,
    replacements: &HashMap<String, Vec<u8>>,
    output: &Path,
) -> Result<(), XlsxError> {
    let write_err = |e: &dyn std::fmt::Display| XlsxError::Write {
        path: output.to_path_buf(),
        message: e.to_string(),
    };
    let parent = match output.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(parent).map_err(|e| write_err(&e))?;
    {
        let mut zip = ZipWriter::new(tmp.as_file_mut());
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        for i in 0..archive.len() {
            let file = archive.by_index(i)?;
            let name = file.name().to_string();
            match replacements.get(&name) {
                Some(bytes) => {
                    drop(file);
                    zip.start_file(name, options).map_err(|e| write_err(&e))?;
                    zip.write_all(bytes).map_err(|e| write_err(&e))?;
                }
                None => zip.raw_copy_file(file).map_err(|e| write_err(&e))?,
            }
        }
        zip.finish().map_err(|e| write_err(&e))?;
    }

    tmp.as_file_mut().flush().map_err(|e| write_err(&e))?;
    tmp.as_file().sync_all().map_err(|e| write_err(&e))?;
    tmp.persist(output).map_err(|e| write_err(&e.error))?;
    Ok(())
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (resolve(a), resolve(b)) {
        (Some(a), Some(b)) => a == b,
        _ => a == b,
    }
}

/// Canonical path, canonicalizing only the parent when the file does not exist yet.
fn resolve(path: &Path) -> Option<PathBuf> {
    if let Ok(p) = path.canonicalize() {
        return Some(p);
    }
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    Some(parent.canonicalize().ok()?.join(path.file_name()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_file_detection() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("base.xlsx");
        std::fs::write(&a, b"x").unwrap();
        let dotted = dir.path().join(".").join("base.xlsx");
        assert!(same_file(&a, &dotted));
        assert!(!same_file(&a, &dir.path().join("out.xlsx")));
    }

    #[test]
    fn summary_line() {
        let s = WriteSummary {
            rows: 3,
            cells_written: 4,
            formulas_preserved: 1,
            cells_styled: 2,
        };
        assert_eq!(s.summary(), "3 rows, 4 cells written, 1 formulas preserved, 2 cells styled");
    }
}
