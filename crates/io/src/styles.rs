//! Adverse/favorable font styles appended to styles.xml.
//!
//! A toned style is a clone of the cell's current `cellXfs` entry pointing at a
//! clone of its font with bold and a color added, so number formats, fills and
//! borders stay as they were.

use std::collections::HashMap;

use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};

use crate::error::XlsxError;
use crate::package::{attr_value, local_name};

/// Differences within this band are neutral.
pub const TONE_TOLERANCE: f64 = 0.01;

const DEFAULT_FONT: &str = "<font/>";
const DEFAULT_XF: &str = r#"<xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/>"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Tone {
    /// Recorded total above what was invoiced.
    Adverse,
    /// Invoiced above the recorded total.
    Favorable,
}

impl Tone {
    pub fn for_difference(value: f64) -> Option<Tone> {
        if value > TONE_TOLERANCE {
            Some(Tone::Adverse)
        } else if value < -TONE_TOLERANCE {
            Some(Tone::Favorable)
        } else {
            None
        }
    }

    fn rgb(self) -> &'static str {
        match self {
            Tone::Adverse => "FFC00000",
            Tone::Favorable => "FF00B050",
        }
    }

    fn from_rgb(rgb: &str) -> Option<Tone> {
        [Tone::Adverse, Tone::Favorable]
            .into_iter()
            .find(|t| t.rgb().eq_ignore_ascii_case(rgb))
    }
}

/// Parsed `fonts` and `cellXfs` tables plus the toned styles allocated so far.
#[derive(Debug, Default)]
pub struct StyleSheet {
    fonts: Vec<String>,
    xfs: Vec<String>,
    allocated: HashMap<(u32, Tone), u32>,
    untoned: HashMap<u32, u32>,
    font_clones: HashMap<(u32, Tone), u32>,
    new_fonts: Vec<String>,
    new_xfs: Vec<String>,
}

impl StyleSheet {
    /// `None` when the stylesheet lacks a fonts or cellXfs table.
    pub fn parse(xml: &[u8]) -> Result<Option<Self>, XlsxError> {
        let mut reader = Reader::from_reader(xml);
        reader.config_mut().trim_text(false);
        let mut buf = Vec::new();
        let mut sheet = StyleSheet::default();
        let (mut saw_fonts, mut saw_xfs) = (false, false);
        let mut section: Option<&'static [u8]> = None;

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) => {
                    let name = local_name(e.name().as_ref()).to_vec();
                    match (section, name.as_slice()) {
                        (None, b"fonts") => {
                            saw_fonts = true;
                            section = Some(&b"fonts"[..]);
                        }
                        (None, b"cellXfs") => {
                            saw_xfs = true;
                            section = Some(&b"cellXfs"[..]);
                        }
                        (Some(b"fonts"), b"font") => {
                            let raw = capture_element(&mut reader, e.into_owned())?;
                            sheet.fonts.push(raw);
                        }
                        (Some(b"cellXfs"), b"xf") => {
                            let raw = capture_element(&mut reader, e.into_owned())?;
                            sheet.xfs.push(raw);
                        }
                        _ => {}
                    }
                }
                Event::Empty(e) => {
                    let name = local_name(e.name().as_ref()).to_vec();
                    match (section, name.as_slice()) {
                        (Some(b"fonts"), b"font") => sheet.fonts.push(render_event(Event::Empty(e))?),
                        (Some(b"cellXfs"), b"xf") => sheet.xfs.push(render_event(Event::Empty(e))?),
                        (None, b"fonts") => saw_fonts = true,
                        (None, b"cellXfs") => saw_xfs = true,
                        _ => {}
                    }
                }
                Event::End(e) => {
                    let qname = e.name();
                    let name = local_name(qname.as_ref());
                    if section.is_some_and(|s| s == name) {
                        section = None;
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        Ok((saw_fonts && saw_xfs).then_some(sheet))
    }

    pub fn xf_count(&self) -> usize {
        self.xfs.len() + self.new_xfs.len()
    }

    pub fn added(&self) -> usize {
        self.new_xfs.len()
    }

    /// Index of a `cellXfs` entry that renders like `base` with the tone's font.
    ///
    /// A `base` already carrying `tone` is returned as is; one carrying the other
    /// tone is untoned first.
    pub fn tone_xf(&mut self, base: u32, tone: Tone) -> Result<u32, XlsxError> {
        if let Some(idx) = self.allocated.get(&(base, tone)) {
            return Ok(*idx);
        }
        if self.xf_tone(base)? == Some(tone) {
            return Ok(base);
        }
        let plain = self.untoned_xf(base)?;

        let base_xml = self
            .xf_xml(plain)
            .or_else(|| self.xfs.first().map(String::as_str))
            .unwrap_or(DEFAULT_XF)
            .to_string();
        let font_id = xf_font_id(&base_xml)?;

        let new_font_id = match self.font_clones.get(&(font_id, tone)) {
            Some(id) => *id,
            None => {
                let toned = recolor_font(self.font_xml(font_id).unwrap_or(DEFAULT_FONT), Some(tone))?;
                let id = self.push_font(toned);
                self.font_clones.insert((font_id, tone), id);
                id
            }
        };

        let xf = retarget_xf(&base_xml, new_font_id)?;
        let idx = self.push_xf(xf);
        self.allocated.insert((base, tone), idx);
        Ok(idx)
    }

    /// Tone carried by `cellXfs[idx]`: a bold font in one of the tone colors.
    pub fn xf_tone(&self, idx: u32) -> Result<Option<Tone>, XlsxError> {
        let Some(xf) = self.xf_xml(idx) else {
            return Ok(None);
        };
        match self.font_xml(xf_font_id(xf)?) {
            Some(font) => font_tone(font),
            None => Ok(None),
        }
    }

    /// Index of an untoned `cellXfs` entry for `idx`.
    ///
    /// Prefers the entry `idx` was cloned from. Otherwise appends a copy of `idx`
    /// whose font drops the bold and color children.
    pub fn untoned_xf(&mut self, idx: u32) -> Result<u32, XlsxError> {
        let Some(tone) = self.xf_tone(idx)? else {
            return Ok(idx);
        };
        if let Some(plain) = self.untoned.get(&idx) {
            return Ok(*plain);
        }

        let toned_xf = self.xf_xml(idx).unwrap_or(DEFAULT_XF).to_string();
        let toned_font_id = xf_font_id(&toned_xf)?;
        let toned_font = self.font_xml(toned_font_id).unwrap_or(DEFAULT_FONT).to_string();

        let plain = match self.origin_of(idx, &toned_xf, toned_font_id, &toned_font, tone)? {
            Some(origin) => origin,
            None => {
                let font_id = self.push_font(recolor_font(&toned_font, None)?);
                let xf = retarget_xf(&toned_xf, font_id)?;
                self.push_xf(xf)
            }
        };
        self.untoned.insert(idx, plain);
        Ok(plain)
    }

    /// Existing entry that `tone_xf` would have turned into `toned_xf`.
    fn origin_of(
        &self,
        idx: u32,
        toned_xf: &str,
        toned_font_id: u32,
        toned_font: &str,
        tone: Tone,
    ) -> Result<Option<u32>, XlsxError> {
        for (i, xf) in self.xfs.iter().enumerate() {
            let i = i as u32;
            if i == idx || retarget_xf(xf, toned_font_id)? != toned_xf {
                continue;
            }
            let font = self.font_xml(xf_font_id(xf)?).unwrap_or(DEFAULT_FONT);
            if font_tone(font)?.is_none() && recolor_font(font, Some(tone))? == toned_font {
                return Ok(Some(i));
            }
        }
        Ok(None)
    }

    fn xf_xml(&self, idx: u32) -> Option<&str> {
        let idx = idx as usize;
        self.xfs
            .get(idx)
            .or_else(|| self.new_xfs.get(idx.checked_sub(self.xfs.len())?))
            .map(String::as_str)
    }

    fn font_xml(&self, id: u32) -> Option<&str> {
        let id = id as usize;
        self.fonts
            .get(id)
            .or_else(|| self.new_fonts.get(id.checked_sub(self.fonts.len())?))
            .map(String::as_str)
    }

    fn push_font(&mut self, xml: String) -> u32 {
        self.new_fonts.push(xml);
        (self.fonts.len() + self.new_fonts.len() - 1) as u32
    }

    fn push_xf(&mut self, xml: String) -> u32 {
        self.new_xfs.push(xml);
        (self.xf_count() - 1) as u32
    }

    /// Rewrite `original` with the allocated fonts and formats appended.
    pub fn render(&self, original: &[u8]) -> Result<Vec<u8>, XlsxError> {
        let mut reader = Reader::from_reader(original);
        reader.config_mut().trim_text(false);
        let mut writer = Writer::new(Vec::with_capacity(original.len() + 256 * self.new_xfs.len()));
        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) if local_name(e.name().as_ref()) == b"fonts" => {
                    let count = self.fonts.len() + self.new_fonts.len();
                    writer.write_event(Event::Start(with_attr(&e, b"count", &count.to_string())))?;
                }
                Event::Start(e) if local_name(e.name().as_ref()) == b"cellXfs" => {
                    let count = self.xf_count();
                    writer.write_event(Event::Start(with_attr(&e, b"count", &count.to_string())))?;
                }
                Event::Empty(e) if local_name(e.name().as_ref()) == b"fonts" => {
                    let count = self.new_fonts.len();
                    writer.write_event(Event::Start(with_attr(&e, b"count", &count.to_string())))?;
                    push_raw(&mut writer, &self.new_fonts);
                    writer.write_event(Event::End(BytesEnd::new(tag_name(&e))))?;
                }
                Event::Empty(e) if local_name(e.name().as_ref()) == b"cellXfs" => {
                    let count = self.new_xfs.len();
                    writer.write_event(Event::Start(with_attr(&e, b"count", &count.to_string())))?;
                    push_raw(&mut writer, &self.new_xfs);
                    writer.write_event(Event::End(BytesEnd::new(tag_name(&e))))?;
                }
                Event::End(e) if local_name(e.name().as_ref()) == b"fonts" => {
                    push_raw(&mut writer, &self.new_fonts);
                    writer.write_event(Event::End(e.into_owned()))?;
                }
                Event::End(e) if local_name(e.name().as_ref()) == b"cellXfs" => {
                    push_raw(&mut writer, &self.new_xfs);
                    writer.write_event(Event::End(e.into_owned()))?;
                }
                Event::Eof => break,
                ev => writer.write_event(ev.into_owned())?,
            }
            buf.clear();
        }

        Ok(writer.into_inner())
    }
}

// ---------------------------------------------------------------------------
// Element surgery
// ---------------------------------------------------------------------------

/// Serialize `start` and everything up to its matching end tag.
fn capture_element(reader: &mut Reader<&[u8]>, start: BytesStart<'static>) -> Result<String, XlsxError> {
    let mut writer = Writer::new(Vec::new());
    writer.write_event(Event::Start(start))?;
    let mut buf = Vec::new();
    let mut depth = 1usize;
    loop {
        let ev = reader.read_event_into(&mut buf)?;
        match &ev {
            Event::Start(_) => depth += 1,
            Event::End(_) => depth -= 1,
            Event::Eof => return Err(XlsxError::Xml("unexpected EOF inside styles element".into())),
            _ => {}
        }
        writer.write_event(ev.into_owned())?;
        if depth == 0 {
            break;
        }
        buf.clear();
    }
    Ok(String::from_utf8_lossy(&writer.into_inner()).into_owned())
}

fn render_event(ev: Event<'_>) -> Result<String, XlsxError> {
    let mut writer = Writer::new(Vec::new());
    writer.write_event(ev)?;
    Ok(String::from_utf8_lossy(&writer.into_inner()).into_owned())
}

fn first_start(xml: &[u8]) -> Result<Option<BytesStart<'static>>, XlsxError> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) => return Ok(Some(e.into_owned())),
            Event::Eof => return Ok(None),
            _ => {}
        }
        buf.clear();
    }
}

fn xf_font_id(xf_xml: &str) -> Result<u32, XlsxError> {
    Ok(first_start(xf_xml.as_bytes())?
        .and_then(|e| attr_value(&e, b"fontId"))
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(0))
}

/// Tone of a font: bold plus one of the tone colors.
fn font_tone(font_xml: &str) -> Result<Option<Tone>, XlsxError> {
    let mut reader = Reader::from_reader(font_xml.as_bytes());
    let mut buf = Vec::new();
    let (mut bold, mut tone) = (false, None);
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) => {
                let qname = e.name();
                match local_name(qname.as_ref()) {
                    b"b" => bold = !matches!(attr_value(&e, b"val").as_deref(), Some("0" | "false")),
                    b"color" => tone = attr_value(&e, b"rgb").as_deref().and_then(Tone::from_rgb),
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(tone.filter(|_| bold))
}

/// Copy of `font_xml` without its `b`/`color` children, plus bold and the tone
/// color when `tone` is set.
fn recolor_font(font_xml: &str, tone: Option<Tone>) -> Result<String, XlsxError> {
    let mut reader = Reader::from_reader(font_xml.as_bytes());
    reader.config_mut().trim_text(false);
    let mut writer = Writer::new(Vec::new());
    let mut buf = Vec::new();
    let mut depth = 0usize;
    let mut skip_depth: Option<usize> = None;

    let tone_children = |writer: &mut Writer<Vec<u8>>| -> Result<(), XlsxError> {
        let Some(tone) = tone else {
            return Ok(());
        };
        writer.write_event(Event::Empty(BytesStart::new("b")))?;
        let mut color = BytesStart::new("color");
        color.push_attribute(("rgb", tone.rgb()));
        writer.write_event(Event::Empty(color))?;
        Ok(())
    };

    loop {
        let ev = reader.read_event_into(&mut buf)?;
        match ev {
            Event::Eof => break,
            Event::Empty(e) if depth == 0 && tone.is_none() => {
                writer.write_event(Event::Empty(e.into_owned()))?;
            }
            Event::Empty(e) if depth == 0 => {
                // <font/> has no children to keep
                writer.write_event(Event::Start(e.clone()))?;
                tone_children(&mut writer)?;
                writer.write_event(Event::End(BytesEnd::new(tag_name(&e))))?;
            }
            Event::Start(e) if depth == 0 => {
                depth = 1;
                writer.write_event(Event::Start(e.into_owned()))?;
                tone_children(&mut writer)?;
            }
            Event::Start(e) => {
                depth += 1;
                let qname = e.name();
                let name = local_name(qname.as_ref());
                if skip_depth.is_none() && depth == 2 && (name == b"b" || name == b"color") {
                    skip_depth = Some(depth);
                }
                if skip_depth.is_none() {
                    writer.write_event(Event::Start(e.into_owned()))?;
                }
            }
            Event::Empty(e) => {
                let qname = e.name();
                let name = local_name(qname.as_ref());
                let dropped = depth == 1 && (name == b"b" || name == b"color");
                if skip_depth.is_none() && !dropped {
                    writer.write_event(Event::Empty(e.into_owned()))?;
                }
            }
            Event::End(e) => {
                if skip_depth == Some(depth) {
                    skip_depth = None;
                } else if skip_depth.is_none() {
                    writer.write_event(Event::End(e.into_owned()))?;
                }
                depth = depth.saturating_sub(1);
            }
            ev => {
                if skip_depth.is_none() {
                    writer.write_event(ev.into_owned())?;
                }
            }
        }
        buf.clear();
    }

    Ok(String::from_utf8_lossy(&writer.into_inner()).into_owned())
}

/// Copy of `xf_xml` pointing at `font_id` with `applyFont="1"`.
fn retarget_xf(xf_xml: &str, font_id: u32) -> Result<String, XlsxError> {
    let mut reader = Reader::from_reader(xf_xml.as_bytes());
    reader.config_mut().trim_text(false);
    let mut writer = Writer::new(Vec::new());
    let mut buf = Vec::new();
    let mut root_done = false;
    let font = font_id.to_string();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Eof => break,
            Event::Start(e) if !root_done => {
                root_done = true;
                let e = with_attr(&with_attr(&e, b"fontId", &font), b"applyFont", "1");
                writer.write_event(Event::Start(e))?;
            }
            Event::Empty(e) if !root_done => {
                root_done = true;
                let e = with_attr(&with_attr(&e, b"fontId", &font), b"applyFont", "1");
                writer.write_event(Event::Empty(e))?;
            }
            ev => writer.write_event(ev.into_owned())?,
        }
        buf.clear();
    }

    Ok(String::from_utf8_lossy(&writer.into_inner()).into_owned())
}

/// Copy of `e` with `key` set to `value` (replaced in place or appended).
pub(crate) fn with_attr(e: &BytesStart<'_>, key: &[u8], value: &str) -> BytesStart<'static> {
    let mut out = BytesStart::new(tag_name(e));
    let mut replaced = false;
    for attr in e.attributes().flatten() {
        if attr.key.as_ref() == key {
            out.push_attribute((key, value.as_bytes()));
            replaced = true;
        } else {
            out.push_attribute((attr.key.as_ref(), attr.value.as_ref()));
        }
    }
    if !replaced {
        out.push_attribute((key, value.as_bytes()));
    }
    out
}

fn tag_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.name().as_ref()).into_owned()
}

fn push_raw(writer: &mut Writer<Vec<u8>>, parts: &[String]) {
    for part in parts {
        writer.get_mut().extend_from_slice(part.as_bytes());
    }
}
