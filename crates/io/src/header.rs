/// Zero-width space, non-joiner, joiner and BOM. Excel exports sprinkle these into headers.
const INVISIBLE: &[char] = &['\u{200B}', '\u{200C}', '\u{200D}', '\u{FEFF}'];

/// Trim, collapse inner whitespace runs to one space and drop invisible marks.
pub fn normalize_header(raw: &str) -> String {
    let visible: String = raw.chars().filter(|c| !INVISIBLE.contains(c)).collect();
    visible.split_whitespace().collect::<Vec<_>>().join(" ")
}
