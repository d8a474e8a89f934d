// Reader/writer tests against workbooks generated with rust_xlsxwriter.
//
// Run with: cargo test -p cruce-io --test roundtrip

use std::io::Read;
use std::path::Path;

use cruce_io::styles::{StyleSheet, Tone};
use cruce_io::{
    load_snapshot, read_rows, update_values_preserving_formulas, CellContent, WriteOptions,
    XlsxError,
};
use cruce_recon::FieldValue;
use rust_xlsxwriter::Workbook;

const HEADERS: [&str; 8] = [
    "EXPEDIENTE",
    " Folio  1",
    "Factura 1",
    "Monto 1",
    "TOTAL",
    "COBRADO // FACTURADO",
    "DIFERENCIAS",
    "Notas",
];

/// Two data rows; D2's neighbour G2 holds `=E2-F2`.
fn write_base(path: &Path) {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name("Hoja1").unwrap();
    for (col, header) in HEADERS.iter().enumerate() {
        sheet.write_string(0, col as u16, *header).unwrap();
    }
    sheet.write_number(1, 0, 100000001.0).unwrap();
    sheet.write_number(1, 4, 500.0).unwrap();
    sheet.write_formula(1, 6, "=E2-F2").unwrap();
    sheet.write_string(1, 7, "keep me").unwrap();
    sheet.write_number(2, 0, 100000002.0).unwrap();
    sheet.write_number(2, 4, 1000.0).unwrap();
    sheet.write_string(2, 7, "and me").unwrap();
    workbook.add_worksheet().set_name("Otra").unwrap();
    workbook.save(path).unwrap();
}

fn read_entry(path: &Path, name: &str) -> Vec<u8> {
    let file = std::fs::File::open(path).unwrap();
    let mut archive = zip::ZipArchive::new(file).unwrap();
    let mut entry = archive.by_name(name).unwrap();
    let mut out = Vec::new();
    entry.read_to_end(&mut out).unwrap();
    out
}

/// Style index of `cell_ref` in a worksheet part; 0 when the cell has no `s`.
fn cell_style(sheet_xml: &str, cell_ref: &str) -> u32 {
    let start = sheet_xml
        .find(&format!(r#"<c r="{cell_ref}""#))
        .unwrap_or_else(|| panic!("{cell_ref} missing"));
    let tag = &sheet_xml[start..start + sheet_xml[start..].find('>').unwrap()];
    match tag.find(r#" s=""#) {
        Some(pos) => {
            let rest = &tag[pos + 4..];
            rest[..rest.find('"').unwrap()].parse().unwrap()
        }
        None => 0,
    }
}

fn difference_tone(path: &Path) -> Option<Tone> {
    let sheet = String::from_utf8(read_entry(path, "xl/worksheets/sheet1.xml")).unwrap();
    let styles = StyleSheet::parse(&read_entry(path, "xl/styles.xml")).unwrap().unwrap();
    styles.xf_tone(cell_style(&sheet, "G3")).unwrap()
}

fn options() -> WriteOptions<'static> {
    WriteOptions {
        sheet: "Hoja1",
        difference_column: Some("DIFERENCIAS"),
    }
}

#[test]
fn reads_rows_with_normalized_headers() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("base.xlsx");
    write_base(&base);

    let sheet = read_rows(&base, "Hoja1", 100).unwrap();
    assert_eq!(sheet.headers[1], "Folio 1");
    assert_eq!(sheet.rows.len(), 2);
    assert_eq!(sheet.rows[0]["EXPEDIENTE"], FieldValue::Number(100000001.0));
    assert_eq!(sheet.rows[0]["Folio 1"], FieldValue::Empty);
    assert_eq!(sheet.rows[1]["Notas"], FieldValue::Text("and me".into()));
    assert!(sheet.rows.iter().all(|row| row.len() == HEADERS.len()));
}

#[test]
fn writes_literals_and_keeps_formulas() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("base.xlsx");
    let out = dir.path().join("BASE_ACTUALIZADA.xlsx");
    write_base(&base);
    let before = std::fs::read(&base).unwrap();

    let mut rows = read_rows(&base, "Hoja1", 100).unwrap().rows;
    rows[0].insert("Folio 1".into(), FieldValue::Number(77.0));
    rows[0].insert("Factura 1".into(), FieldValue::Text("A-77".into()));
    rows[0].insert("Monto 1".into(), FieldValue::Number(500.0));
    rows[0].insert("COBRADO // FACTURADO".into(), FieldValue::Number(500.0));
    rows[0].insert("DIFERENCIAS".into(), FieldValue::Number(0.0));
    rows[1].insert("DIFERENCIAS".into(), FieldValue::Number(900.0));
    rows[1].insert("Columna fantasma".into(), FieldValue::Number(1.0));

    let summary = update_values_preserving_formulas(&base, &rows, &out, &options()).unwrap();
    assert_eq!(summary.rows, 2);
    assert_eq!(summary.cells_written, 5);
    assert_eq!(summary.formulas_preserved, 1);
    assert_eq!(summary.cells_styled, 1);

    // input untouched
    assert_eq!(std::fs::read(&base).unwrap(), before);

    let snapshot = load_snapshot(&out, "Hoja1").unwrap();
    assert_eq!(snapshot.value(1, 1), &FieldValue::Number(77.0));
    assert_eq!(snapshot.value(1, 2), &FieldValue::Text("A-77".into()));
    assert_eq!(snapshot.value(1, 3), &FieldValue::Number(500.0));
    assert_eq!(snapshot.value(1, 7), &FieldValue::Text("keep me".into()));
    assert_eq!(snapshot.value(2, 6), &FieldValue::Number(900.0));
    assert_eq!(snapshot.value(2, 7), &FieldValue::Text("and me".into()));
    match snapshot.cell(1, 6) {
        Some(CellContent::Formula { expression, .. }) => assert_eq!(expression, "E2-F2"),
        other => panic!("formula lost: {other:?}"),
    }
    assert!(snapshot.cell(1, 8).is_none());

    let styles = String::from_utf8(read_entry(&out, "xl/styles.xml")).unwrap();
    assert!(styles.contains(r#"<color rgb="FFC00000"/>"#));
    let workbook = String::from_utf8(read_entry(&out, "xl/workbook.xml")).unwrap();
    assert!(workbook.contains(r#"fullCalcOnLoad="1""#));

    // untouched parts are copied byte for byte
    assert_eq!(
        read_entry(&out, "xl/sharedStrings.xml"),
        read_entry(&base, "xl/sharedStrings.xml")
    );
    assert_eq!(
        read_entry(&out, "xl/worksheets/sheet2.xml"),
        read_entry(&base, "xl/worksheets/sheet2.xml")
    );
}

#[test]
fn favorable_difference_is_green() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("base.xlsx");
    let out = dir.path().join("out.xlsx");
    write_base(&base);

    let mut rows = read_rows(&base, "Hoja1", 100).unwrap().rows;
    rows[1].insert("DIFERENCIAS".into(), FieldValue::Number(-250.0));
    let summary = update_values_preserving_formulas(&base, &rows, &out, &options()).unwrap();
    assert_eq!(summary.cells_styled, 1);

    let styles = String::from_utf8(read_entry(&out, "xl/styles.xml")).unwrap();
    assert!(styles.contains(r#"<color rgb="FF00B050"/>"#));
    assert!(!styles.contains("FFC00000"));
}

#[test]
fn rerun_on_previous_output_refreshes_tones() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("base.xlsx");
    let first = dir.path().join("first.xlsx");
    let second = dir.path().join("second.xlsx");
    let third = dir.path().join("third.xlsx");
    write_base(&base);

    let mut rows = read_rows(&base, "Hoja1", 100).unwrap().rows;
    rows[1].insert("DIFERENCIAS".into(), FieldValue::Number(900.0));
    update_values_preserving_formulas(&base, &rows, &first, &options()).unwrap();
    assert_eq!(difference_tone(&first), Some(Tone::Adverse));

    // the difference settles to zero: the red font must go
    let mut rows = read_rows(&first, "Hoja1", 100).unwrap().rows;
    rows[1].insert("DIFERENCIAS".into(), FieldValue::Number(0.0));
    let summary = update_values_preserving_formulas(&first, &rows, &second, &options()).unwrap();
    assert_eq!(summary.cells_written, 1);
    assert_eq!(summary.cells_styled, 0);
    assert_eq!(difference_tone(&second), None);
    let snapshot = load_snapshot(&second, "Hoja1").unwrap();
    assert_eq!(snapshot.value(2, 6), &FieldValue::Number(0.0));

    // and a flip to favorable replaces red with green
    let mut rows = read_rows(&first, "Hoja1", 100).unwrap().rows;
    rows[1].insert("DIFERENCIAS".into(), FieldValue::Number(-250.0));
    update_values_preserving_formulas(&first, &rows, &third, &options()).unwrap();
    assert_eq!(difference_tone(&third), Some(Tone::Favorable));
}

#[test]
fn unchanged_rows_write_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("base.xlsx");
    let out = dir.path().join("out.xlsx");
    write_base(&base);

    let rows = read_rows(&base, "Hoja1", 100).unwrap().rows;
    let summary = update_values_preserving_formulas(&base, &rows, &out, &options()).unwrap();
    assert_eq!(summary.cells_written, 0);
    assert_eq!(summary.cells_styled, 0);
    assert_eq!(
        read_entry(&out, "xl/worksheets/sheet1.xml"),
        read_entry(&base, "xl/worksheets/sheet1.xml")
    );
    assert_eq!(read_entry(&out, "xl/styles.xml"), read_entry(&base, "xl/styles.xml"));
}

#[test]
fn missing_sheet_names_the_sheet() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("base.xlsx");
    write_base(&base);

    match read_rows(&base, "Hoja9", 100) {
        Err(XlsxError::SheetNotFound { sheet, available, .. }) => {
            assert_eq!(sheet, "Hoja9");
            assert_eq!(available, vec!["Hoja1".to_string(), "Otra".to_string()]);
        }
        other => panic!("expected SheetNotFound, got {other:?}"),
    }

    let out = dir.path().join("out.xlsx");
    let opts = WriteOptions {
        sheet: "Hoja9",
        difference_column: None,
    };
    let err = update_values_preserving_formulas(&base, &[], &out, &opts).unwrap_err();
    assert!(err.to_string().contains("Hoja9"));
    assert!(!out.exists());
}

#[test]
fn unreadable_input_names_the_path() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.xlsx");
    let err = read_rows(&missing, "Hoja1", 100).unwrap_err();
    assert!(matches!(err, XlsxError::Open { .. }));
    assert!(err.to_string().contains("nope.xlsx"));
}

#[test]
fn row_limit_enforced() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("base.xlsx");
    write_base(&base);

    match read_rows(&base, "Hoja1", 1) {
        Err(XlsxError::RowLimit { rows, max, .. }) => {
            assert_eq!(rows, 2);
            assert_eq!(max, 1);
        }
        other => panic!("expected RowLimit, got {other:?}"),
    }
}

#[test]
fn refuses_to_overwrite_input() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("base.xlsx");
    write_base(&base);
    let before = std::fs::read(&base).unwrap();

    let rows = read_rows(&base, "Hoja1", 100).unwrap().rows;
    let err = update_values_preserving_formulas(&base, &rows, &base, &options()).unwrap_err();
    assert!(matches!(err, XlsxError::SamePath(_)));
    assert_eq!(std::fs::read(&base).unwrap(), before);
}

#[test]
fn failed_write_leaves_no_output() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("base.xlsx");
    write_base(&base);

    let out = dir.path().join("missing-dir").join("out.xlsx");
    let rows = read_rows(&base, "Hoja1", 100).unwrap().rows;
    let err = update_values_preserving_formulas(&base, &rows, &out, &options()).unwrap_err();
    assert!(matches!(err, XlsxError::Write { .. }));
    assert!(!out.exists());
}
