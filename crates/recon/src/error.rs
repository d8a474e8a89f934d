use std::fmt;

#[derive(Debug)]
pub enum ReconError {
    /// TOML parse / deserialization error.
    ConfigParse(String),
    /// Config validation error (bad threshold, empty column name, etc.).
    ConfigValidation(String),
    /// Missing required column in a loaded dataset.
    MissingColumn { dataset: Dataset, column: String },
    /// Business key cell is not a positive integer.
    InvalidKey { dataset: Dataset, row: usize, value: String },
    /// IO error (config file read, etc.).
    Io(String),
}

/// Which input a row-level error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dataset {
    Invoices,
    Base,
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invoices => write!(f, "invoices"),
            Self::Base => write!(f, "base"),
        }
    }
}

impl fmt::Display for ReconError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigParse(msg) => write!(f, "config parse error: {msg}"),
            Self::ConfigValidation(msg) => write!(f, "config validation error: {msg}"),
            Self::MissingColumn { dataset, column } => {
                write!(f, "{dataset}: missing column '{column}'")
            }
            Self::InvalidKey { dataset, row, value } => {
                write!(f, "{dataset}, row {row}: key '{value}' is not a positive integer")
            }
            Self::Io(msg) => write!(f, "IO error: {msg}"),
        }
    }
}

impl std::error::Error for ReconError {}
