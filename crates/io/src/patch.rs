//! Streaming worksheet patcher.
//!
//! Rewrites only the `<c>` elements named by a [`SheetEdits`] plan and copies every
//! other event through untouched. Cells holding an `<f>` child are never
//! overwritten: their formula, cached value and children survive, only their
//! style may change.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use cruce_recon::FieldValue;
use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};

use crate::error::XlsxError;
use crate::package::{attr_value, cell_ref, escape_text, local_name, parse_cell_ref};
use crate::snapshot::datetime_to_serial;
use crate::styles::{with_attr, StyleSheet, Tone};

/// Font tone requested for a cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ToneEdit {
    #[default]
    Keep,
    /// Drop a tone left by an earlier run.
    Clear,
    Set(Tone),
}

impl ToneEdit {
    /// Tone for a difference cell; neutral or non-numeric values clear it.
    pub fn for_difference(value: Option<f64>) -> Self {
        match value.and_then(Tone::for_difference) {
            Some(tone) => ToneEdit::Set(tone),
            None => ToneEdit::Clear,
        }
    }
}

/// One planned change. `value: None` keeps the current content.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CellEdit {
    pub value: Option<FieldValue>,
    pub tone: ToneEdit,
}

/// 1-based sheet row → 0-based column → edit.
pub type SheetEdits = BTreeMap<u32, BTreeMap<u32, CellEdit>>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PatchStats {
    /// Cells whose value was (re)written.
    pub written: usize,
    /// Value edits dropped because the cell holds a formula.
    pub formulas_preserved: usize,
    /// Cells that received a tone style.
    pub styled: usize,
    /// Cells whose earlier tone style was removed.
    pub untoned: usize,
}

impl PatchStats {
    /// Whether the patched part differs from the original.
    pub fn changed(&self) -> bool {
        self.written + self.styled + self.untoned > 0
    }
}

struct Patcher<'s> {
    styles: Option<&'s mut StyleSheet>,
    stats: PatchStats,
}

/// Apply `edits` to a worksheet part.
pub fn patch_worksheet(
    original: &[u8],
    edits: &SheetEdits,
    styles: Option<&mut StyleSheet>,
) -> Result<(Vec<u8>, PatchStats), XlsxError> {
    let mut patcher = Patcher {
        styles,
        stats: PatchStats::default(),
    };
    let rows: Vec<u32> = edits.keys().copied().collect();
    let mut next_row = 0usize;

    let mut reader = Reader::from_reader(original);
    reader.config_mut().trim_text(false);
    let mut writer = Writer::new(Vec::with_capacity(original.len() + edits.len() * 96));
    let mut buf = Vec::new();
    let mut saw_sheet_data = false;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if local_name(e.name().as_ref()) == b"sheetData" => {
                saw_sheet_data = true;
                writer.write_event(Event::Start(e.into_owned()))?;
                patcher.sheet_data(&mut reader, &mut writer, edits, &rows, &mut next_row)?;
            }
            Event::Empty(e) if local_name(e.name().as_ref()) == b"sheetData" => {
                saw_sheet_data = true;
                if edits.is_empty() {
                    writer.write_event(Event::Empty(e.into_owned()))?;
                } else {
                    writer.write_event(Event::Start(e.into_owned()))?;
                    for row in &rows[next_row..] {
                        patcher.new_row(&mut writer, *row, &edits[row])?;
                    }
                    next_row = rows.len();
                    writer.write_event(Event::End(BytesEnd::new("sheetData")))?;
                }
            }
            Event::End(e) if local_name(e.name().as_ref()) == b"worksheet" => {
                if !saw_sheet_data && !edits.is_empty() {
                    writer.write_event(Event::Start(BytesStart::new("sheetData")))?;
                    for row in &rows[next_row..] {
                        patcher.new_row(&mut writer, *row, &edits[row])?;
                    }
                    next_row = rows.len();
                    writer.write_event(Event::End(BytesEnd::new("sheetData")))?;
                }
                writer.write_event(Event::End(e.into_owned()))?;
            }
            Event::Eof => break,
            ev => writer.write_event(ev.into_owned())?,
        }
        buf.clear();
    }

    Ok((writer.into_inner(), patcher.stats))
}

impl Patcher<'_> {
    fn sheet_data(
        &mut self,
        reader: &mut Reader<&[u8]>,
        writer: &mut Writer<Vec<u8>>,
        edits: &SheetEdits,
        rows: &[u32],
        next_row: &mut usize,
    ) -> Result<(), XlsxError> {
        let mut buf = Vec::new();
        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) if local_name(e.name().as_ref()) == b"row" => {
                    let row_start = e.into_owned();
                    let Some(row_num) = row_number(&row_start) else {
                        writer.write_event(Event::Start(row_start))?;
                        buf.clear();
                        continue;
                    };
                    self.flush_rows_before(writer, edits, rows, next_row, row_num)?;
                    writer.write_event(Event::Start(row_start))?;
                    if let Some(cells) = edits.get(&row_num) {
                        *next_row += 1;
                        self.row(reader, writer, row_num, cells)?;
                    }
                }
                Event::Empty(e) if local_name(e.name().as_ref()) == b"row" => {
                    let row_empty = e.into_owned();
                    let Some(row_num) = row_number(&row_empty) else {
                        writer.write_event(Event::Empty(row_empty))?;
                        buf.clear();
                        continue;
                    };
                    self.flush_rows_before(writer, edits, rows, next_row, row_num)?;
                    match edits.get(&row_num) {
                        Some(cells) => {
                            *next_row += 1;
                            writer.write_event(Event::Start(row_empty.clone()))?;
                            for (col, edit) in cells {
                                self.write_new_cell(writer, row_num, *col, edit)?;
                            }
                            writer.write_event(Event::End(BytesEnd::new("row")))?;
                        }
                        None => writer.write_event(Event::Empty(row_empty))?,
                    }
                }
                Event::End(e) if local_name(e.name().as_ref()) == b"sheetData" => {
                    for row in &rows[*next_row..] {
                        self.new_row(writer, *row, &edits[row])?;
                    }
                    *next_row = rows.len();
                    writer.write_event(Event::End(e.into_owned()))?;
                    return Ok(());
                }
                Event::Eof => return Err(XlsxError::Xml("unexpected EOF inside sheetData".into())),
                ev => writer.write_event(ev.into_owned())?,
            }
            buf.clear();
        }
    }

    /// Emit planned rows that sort before `row_num` and are absent from the sheet.
    fn flush_rows_before(
        &mut self,
        writer: &mut Writer<Vec<u8>>,
        edits: &SheetEdits,
        rows: &[u32],
        next_row: &mut usize,
        row_num: u32,
    ) -> Result<(), XlsxError> {
        while *next_row < rows.len() && rows[*next_row] < row_num {
            let row = rows[*next_row];
            self.new_row(writer, row, &edits[&row])?;
            *next_row += 1;
        }
        Ok(())
    }

    fn row(
        &mut self,
        reader: &mut Reader<&[u8]>,
        writer: &mut Writer<Vec<u8>>,
        row_num: u32,
        cells: &BTreeMap<u32, CellEdit>,
    ) -> Result<(), XlsxError> {
        let planned: Vec<(u32, &CellEdit)> = cells.iter().map(|(c, e)| (*c, e)).collect();
        let mut next = 0usize;
        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) if local_name(e.name().as_ref()) == b"c" => {
                    let cell_start = e.into_owned();
                    let inner = collect_cell_body(reader)?;
                    let Some(col) = cell_column(&cell_start, row_num) else {
                        write_cell_events(writer, cell_start, inner)?;
                        buf.clear();
                        continue;
                    };
                    while next < planned.len() && planned[next].0 < col {
                        self.write_new_cell(writer, row_num, planned[next].0, planned[next].1)?;
                        next += 1;
                    }
                    if next < planned.len() && planned[next].0 == col {
                        let edit = planned[next].1;
                        next += 1;
                        self.rewrite_cell(writer, row_num, col, cell_start, inner, edit)?;
                    } else {
                        write_cell_events(writer, cell_start, inner)?;
                    }
                }
                Event::Empty(e) if local_name(e.name().as_ref()) == b"c" => {
                    let cell_empty = e.into_owned();
                    let Some(col) = cell_column(&cell_empty, row_num) else {
                        writer.write_event(Event::Empty(cell_empty))?;
                        buf.clear();
                        continue;
                    };
                    while next < planned.len() && planned[next].0 < col {
                        self.write_new_cell(writer, row_num, planned[next].0, planned[next].1)?;
                        next += 1;
                    }
                    if next < planned.len() && planned[next].0 == col {
                        let edit = planned[next].1;
                        next += 1;
                        let existing = style_index(&cell_empty);
                        match &edit.value {
                            Some(value) => {
                                let style = self.resolve_style(existing, edit.tone)?;
                                self.write_value_cell(writer, row_num, col, value, style);
                            }
                            None => {
                                let start = self.restyle(cell_empty, existing, edit.tone)?;
                                writer.write_event(Event::Empty(start))?;
                            }
                        }
                    } else {
                        writer.write_event(Event::Empty(cell_empty))?;
                    }
                }
                Event::End(e) if local_name(e.name().as_ref()) == b"row" => {
                    for (col, edit) in &planned[next..] {
                        self.write_new_cell(writer, row_num, *col, edit)?;
                    }
                    writer.write_event(Event::End(e.into_owned()))?;
                    return Ok(());
                }
                Event::Eof => return Err(XlsxError::Xml("unexpected EOF inside row".into())),
                ev => writer.write_event(ev.into_owned())?,
            }
            buf.clear();
        }
    }

    fn rewrite_cell(
        &mut self,
        writer: &mut Writer<Vec<u8>>,
        row_num: u32,
        col: u32,
        start: BytesStart<'static>,
        inner: Vec<Event<'static>>,
        edit: &CellEdit,
    ) -> Result<(), XlsxError> {
        let existing = style_index(&start);
        let has_formula = inner.iter().any(|ev| match ev {
            Event::Start(e) | Event::Empty(e) => local_name(e.name().as_ref()) == b"f",
            _ => false,
        });

        match &edit.value {
            Some(value) if !has_formula => {
                let style = self.resolve_style(existing, edit.tone)?;
                self.write_value_cell(writer, row_num, col, value, style);
                Ok(())
            }
            value => {
                if value.is_some() {
                    log::debug!("keeping formula in {}", cell_ref(row_num - 1, col));
                    self.stats.formulas_preserved += 1;
                }
                let start = self.restyle(start, existing, edit.tone)?;
                write_cell_events(writer, start, inner)
            }
        }
    }

    fn new_row(
        &mut self,
        writer: &mut Writer<Vec<u8>>,
        row_num: u32,
        cells: &BTreeMap<u32, CellEdit>,
    ) -> Result<(), XlsxError> {
        let mut row = BytesStart::new("row");
        row.push_attribute(("r", row_num.to_string().as_str()));
        writer.write_event(Event::Start(row))?;
        for (col, edit) in cells {
            self.write_new_cell(writer, row_num, *col, edit)?;
        }
        writer.write_event(Event::End(BytesEnd::new("row")))?;
        Ok(())
    }

    fn write_new_cell(
        &mut self,
        writer: &mut Writer<Vec<u8>>,
        row_num: u32,
        col: u32,
        edit: &CellEdit,
    ) -> Result<(), XlsxError> {
        let style = self.resolve_style(None, edit.tone)?;
        let value = edit.value.as_ref().unwrap_or(&FieldValue::Empty);
        self.write_value_cell(writer, row_num, col, value, style);
        Ok(())
    }

    /// Style index for a cell currently styled `existing` after applying `tone`.
    fn resolve_style(&mut self, existing: Option<u32>, tone: ToneEdit) -> Result<Option<u32>, XlsxError> {
        let Some(styles) = self.styles.as_deref_mut() else {
            return Ok(existing);
        };
        match (tone, existing) {
            (ToneEdit::Keep, _) | (ToneEdit::Clear, None) => Ok(existing),
            (ToneEdit::Set(tone), _) => {
                self.stats.styled += 1;
                Ok(Some(styles.tone_xf(existing.unwrap_or(0), tone)?))
            }
            (ToneEdit::Clear, Some(s)) => {
                let plain = styles.untoned_xf(s)?;
                if plain != s {
                    self.stats.untoned += 1;
                }
                Ok(Some(plain))
            }
        }
    }

    fn restyle(
        &mut self,
        start: BytesStart<'static>,
        existing: Option<u32>,
        tone: ToneEdit,
    ) -> Result<BytesStart<'static>, XlsxError> {
        if tone == ToneEdit::Keep {
            return Ok(start);
        }
        Ok(match self.resolve_style(existing, tone)? {
            Some(s) if Some(s) != existing => with_attr(&start, b"s", &s.to_string()),
            _ => start,
        })
    }

    fn write_value_cell(
        &mut self,
        writer: &mut Writer<Vec<u8>>,
        row_num: u32,
        col: u32,
        value: &FieldValue,
        style: Option<u32>,
    ) {
        let mut cell = String::with_capacity(48);
        cell.push_str(r#"<c r=""#);
        cell.push_str(&cell_ref(row_num - 1, col));
        cell.push('"');
        if let Some(s) = style.filter(|s| *s != 0) {
            cell.push_str(&format!(r#" s="{s}""#));
        }

        let (ty, body) = value_xml(value);
        if let Some(t) = ty {
            cell.push_str(&format!(r#" t="{t}""#));
        }
        if body.is_empty() {
            cell.push_str("/>");
        } else {
            cell.push('>');
            cell.push_str(&body);
            cell.push_str("</c>");
        }

        writer.get_mut().extend_from_slice(cell.as_bytes());
        self.stats.written += 1;
    }
}

fn value_xml(value: &FieldValue) -> (Option<&'static str>, String) {
    match value {
        FieldValue::Empty => (None, String::new()),
        FieldValue::Number(n) if n.is_finite() => (None, format!("<v>{n}</v>")),
        FieldValue::Number(_) => (None, String::new()),
        FieldValue::Bool(b) => (Some("b"), format!("<v>{}</v>", if *b { 1 } else { 0 })),
        FieldValue::DateTime(dt) => match serial(dt) {
            Some(serial) => (None, format!("<v>{serial}</v>")),
            None => inline_string(&dt.to_string()),
        },
        FieldValue::Text(s) => inline_string(s),
    }
}

fn serial(dt: &NaiveDateTime) -> Option<f64> {
    datetime_to_serial(dt).filter(|s| *s >= 0.0)
}

fn inline_string(s: &str) -> (Option<&'static str>, String) {
    let space = if s.starts_with(char::is_whitespace) || s.ends_with(char::is_whitespace) {
        r#" xml:space="preserve""#
    } else {
        ""
    };
    (Some("inlineStr"), format!("<is><t{space}>{}</t></is>", escape_text(s)))
}

/// Owned events between `<c>` and its `</c>`, end tag included.
fn collect_cell_body(reader: &mut Reader<&[u8]>) -> Result<Vec<Event<'static>>, XlsxError> {
    let mut events = Vec::new();
    let mut buf = Vec::new();
    let mut depth = 1usize;
    loop {
        let ev = reader.read_event_into(&mut buf)?;
        match &ev {
            Event::Start(_) => depth += 1,
            Event::End(_) => depth -= 1,
            Event::Eof => return Err(XlsxError::Xml("unexpected EOF inside cell".into())),
            _ => {}
        }
        events.push(ev.into_owned());
        if depth == 0 {
            return Ok(events);
        }
        buf.clear();
    }
}

fn write_cell_events(
    writer: &mut Writer<Vec<u8>>,
    start: BytesStart<'static>,
    inner: Vec<Event<'static>>,
) -> Result<(), XlsxError> {
    writer.write_event(Event::Start(start))?;
    for ev in inner {
        writer.write_event(ev)?;
    }
    Ok(())
}

fn row_number(row: &BytesStart<'_>) -> Option<u32> {
    attr_value(row, b"r")?.parse().ok()
}

/// 0-based column of a cell in `row_num`; `None` when the reference is missing or
/// points at another row.
fn cell_column(cell: &BytesStart<'_>, row_num: u32) -> Option<u32> {
    let (row, col) = parse_cell_ref(&attr_value(cell, b"r")?)?;
    (row + 1 == row_num).then_some(col)
}

fn style_index(cell: &BytesStart<'_>) -> Option<u32> {
    attr_value(cell, b"s")?.parse().ok()
}

// ---------------------------------------------------------------------------
// workbook.xml
// ---------------------------------------------------------------------------

/// Elements that follow `calcPr` in CT_Workbook order.
const AFTER_CALC_PR: &[&[u8]] = &[
    b"oleSize",
    b"customWorkbookViews",
    b"pivotCaches",
    b"smartTagPr",
    b"smartTagTypes",
    b"webPublishing",
    b"fileRecoveryPr",
    b"webPublishObjects",
    b"extLst",
];

/// Ask spreadsheet applications to recalculate every formula on open.
pub fn ensure_full_calc_on_load(workbook_xml: &[u8]) -> Result<Vec<u8>, XlsxError> {
    let mut reader = Reader::from_reader(workbook_xml);
    reader.config_mut().trim_text(false);
    let mut writer = Writer::new(Vec::with_capacity(workbook_xml.len() + 32));
    let mut buf = Vec::new();
    let mut saw_calc_pr = false;
    let mut depth = 0usize;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if local_name(e.name().as_ref()) == b"calcPr" => {
                saw_calc_pr = true;
                depth += 1;
                writer.write_event(Event::Start(with_attr(&e, b"fullCalcOnLoad", "1")))?;
            }
            Event::Empty(e) if local_name(e.name().as_ref()) == b"calcPr" => {
                saw_calc_pr = true;
                writer.write_event(Event::Empty(with_attr(&e, b"fullCalcOnLoad", "1")))?;
            }
            Event::Start(e) if depth == 1 && !saw_calc_pr && follows_calc_pr(&e) => {
                saw_calc_pr = true;
                depth += 1;
                writer.get_mut().extend_from_slice(br#"<calcPr fullCalcOnLoad="1"/>"#);
                writer.write_event(Event::Start(e.into_owned()))?;
            }
            Event::Empty(e) if depth == 1 && !saw_calc_pr && follows_calc_pr(&e) => {
                saw_calc_pr = true;
                writer.get_mut().extend_from_slice(br#"<calcPr fullCalcOnLoad="1"/>"#);
                writer.write_event(Event::Empty(e.into_owned()))?;
            }
            Event::Start(e) => {
                depth += 1;
                writer.write_event(Event::Start(e.into_owned()))?;
            }
            Event::End(e) => {
                if depth == 1 && !saw_calc_pr && local_name(e.name().as_ref()) == b"workbook" {
                    saw_calc_pr = true;
                    writer.get_mut().extend_from_slice(br#"<calcPr fullCalcOnLoad="1"/>"#);
                }
                depth = depth.saturating_sub(1);
                writer.write_event(Event::End(e.into_owned()))?;
            }
            Event::Eof => break,
            ev => writer.write_event(ev.into_owned())?,
        }
        buf.clear();
    }

    Ok(writer.into_inner())
}

fn follows_calc_pr(e: &BytesStart<'_>) -> bool {
    let qname = e.name();
    AFTER_CALC_PR.contains(&local_name(qname.as_ref()))
}
