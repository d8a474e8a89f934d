use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
pub enum XlsxError {
    /// Workbook missing, unreadable or not a spreadsheet.
    Open { path: PathBuf, message: String },
    /// Requested sheet does not exist.
    SheetNotFound { path: PathBuf, sheet: String, available: Vec<String> },
    /// Data rows exceed the configured maximum.
    RowLimit { path: PathBuf, rows: usize, max: usize },
    /// Output would overwrite the input workbook.
    SamePath(PathBuf),
    /// Broken or unexpected zip package structure.
    Package(String),
    /// Malformed XML inside a package part.
    Xml(String),
    /// Output could not be created or committed.
    Write { path: PathBuf, message: String },
    Io(String),
}

impl fmt::Display for XlsxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open { path, message } => {
                write!(f, "cannot open '{}': {message}", path.display())
            }
            Self::SheetNotFound { path, sheet, available } => {
                write!(
                    f,
                    "sheet '{sheet}' not found in '{}' (available: {})",
                    path.display(),
                    available.join(", ")
                )
            }
            Self::RowLimit { path, rows, max } => {
                write!(f, "'{}' has {rows} data rows, limit is {max}", path.display())
            }
            Self::SamePath(path) => {
                write!(f, "output path '{}' is the input workbook", path.display())
            }
            Self::Package(msg) => write!(f, "xlsx package error: {msg}"),
            Self::Xml(msg) => write!(f, "xlsx XML error: {msg}"),
            Self::Write { path, message } => {
                write!(f, "cannot write '{}': {message}", path.display())
            }
            Self::Io(msg) => write!(f, "IO error: {msg}"),
        }
    }
}

impl std::error::Error for XlsxError {}

impl From<quick_xml::Error> for XlsxError {
    fn from(err: quick_xml::Error) -> Self {
        Self::Xml(err.to_string())
    }
}

impl From<zip::result::ZipError> for XlsxError {
    fn from(err: zip::result::ZipError) -> Self {
        Self::Package(err.to_string())
    }
}

impl From<std::io::Error> for XlsxError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
