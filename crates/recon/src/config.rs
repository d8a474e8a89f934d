use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ReconError;
use crate::model::SLOT_COUNT;

pub const DEFAULT_SHEET_NAME: &str = "Hoja1";
pub const DEFAULT_THRESHOLD_PCT: f64 = 10.0;
pub const DEFAULT_MAX_ROWS: usize = 10_000;
pub const DEFAULT_WARN_ROWS: usize = 5_000;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReconConfig {
    /// Sheet read from both workbooks and patched in the output.
    pub sheet_name: String,
    /// Percentage deviation above which a match is flagged. Equality never flags.
    pub discrepancy_threshold_pct: f64,
    /// Hard cap on data rows per dataset.
    pub max_rows: usize,
    /// Datasets above this size are logged as large.
    pub warn_rows: usize,
    pub columns: ColumnMapping,
}

impl Default for ReconConfig {
    fn default() -> Self {
        Self {
            sheet_name: DEFAULT_SHEET_NAME.to_string(),
            discrepancy_threshold_pct: DEFAULT_THRESHOLD_PCT,
            max_rows: DEFAULT_MAX_ROWS,
            warn_rows: DEFAULT_WARN_ROWS,
            columns: ColumnMapping::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Column mapping
// ---------------------------------------------------------------------------

/// Normalized header names. Slot columns are `"{prefix} {n}"` for n in 1..=5.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ColumnMapping {
    pub key: String,
    pub folio_prefix: String,
    pub invoice_prefix: String,
    pub amount_prefix: String,
    pub vehicle: String,
    pub total: String,
    pub invoiced_total: String,
    pub difference: String,
    pub date: String,
}

impl Default for ColumnMapping {
    fn default() -> Self {
        Self {
            key: "EXPEDIENTE".into(),
            folio_prefix: "Folio".into(),
            invoice_prefix: "Factura".into(),
            amount_prefix: "Monto".into(),
            vehicle: "Vehículo".into(),
            total: "TOTAL".into(),
            invoiced_total: "COBRADO // FACTURADO".into(),
            difference: "DIFERENCIAS".into(),
            date: "FECHA".into(),
        }
    }
}

impl ColumnMapping {
    /// `slot` is 1-based.
    pub fn folio(&self, slot: usize) -> String {
        format!("{} {slot}", self.folio_prefix)
    }

    pub fn invoice_number(&self, slot: usize) -> String {
        format!("{} {slot}", self.invoice_prefix)
    }

    pub fn amount(&self, slot: usize) -> String {
        format!("{} {slot}", self.amount_prefix)
    }

    /// Columns the engine owns on a base row (slots plus derived fields).
    pub fn base_owned(&self) -> Vec<String> {
        let mut cols = vec![self.key.clone(), self.total.clone()];
        for slot in 1..=SLOT_COUNT {
            cols.push(self.folio(slot));
            cols.push(self.invoice_number(slot));
            cols.push(self.amount(slot));
        }
        cols.push(self.invoiced_total.clone());
        cols.push(self.difference.clone());
        cols.push(self.date.clone());
        cols
    }
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl ReconConfig {
    pub fn from_toml(input: &str) -> Result<Self, ReconError> {
        let config: ReconConfig =
            toml::from_str(input).map_err(|e| ReconError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ReconError> {
        let input = std::fs::read_to_string(path)
            .map_err(|e| ReconError::Io(format!("{}: {e}", path.display())))?;
        Self::from_toml(&input)
    }

    pub fn to_toml(&self) -> Result<String, ReconError> {
        toml::to_string_pretty(self).map_err(|e| ReconError::ConfigParse(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ReconError> {
        let t = self.discrepancy_threshold_pct;
        if !t.is_finite() || t < 0.0 {
            return Err(ReconError::ConfigValidation(format!(
                "discrepancy_threshold_pct must be a non-negative number, got {t}"
            )));
        }

        if self.max_rows == 0 {
            return Err(ReconError::ConfigValidation(
                "max_rows must be greater than 0".into(),
            ));
        }

        if self.warn_rows > self.max_rows {
            return Err(ReconError::ConfigValidation(format!(
                "warn_rows ({}) cannot exceed max_rows ({})",
                self.warn_rows, self.max_rows
            )));
        }

        if self.sheet_name.trim().is_empty() {
            return Err(ReconError::ConfigValidation("sheet_name is empty".into()));
        }

        let c = &self.columns;
        let named = [
            ("key", &c.key),
            ("folio_prefix", &c.folio_prefix),
            ("invoice_prefix", &c.invoice_prefix),
            ("amount_prefix", &c.amount_prefix),
            ("vehicle", &c.vehicle),
            ("total", &c.total),
            ("invoiced_total", &c.invoiced_total),
            ("difference", &c.difference),
            ("date", &c.date),
        ];
        for (field, value) in named {
            if value.trim().is_empty() {
                return Err(ReconError::ConfigValidation(format!(
                    "columns.{field} is empty"
                )));
            }
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let config = ReconConfig::from_toml("").unwrap();
        assert_eq!(config, ReconConfig::default());
        assert_eq!(config.sheet_name, "Hoja1");
        assert_eq!(config.discrepancy_threshold_pct, 10.0);
        assert_eq!(config.max_rows, 10_000);
    }

    #[test]
    fn partial_columns_keep_other_defaults() {
        let input = r#"
sheet_name = "Base"
discrepancy_threshold_pct = 5

[columns]
key = "CASO"
"#;
        let config = ReconConfig::from_toml(input).unwrap();
        assert_eq!(config.sheet_name, "Base");
        assert_eq!(config.discrepancy_threshold_pct, 5.0);
        assert_eq!(config.columns.key, "CASO");
        assert_eq!(config.columns.total, "TOTAL");
    }

    #[test]
    fn slot_column_names() {
        let cols = ColumnMapping::default();
        assert_eq!(cols.folio(1), "Folio 1");
        assert_eq!(cols.invoice_number(3), "Factura 3");
        assert_eq!(cols.amount(5), "Monto 5");
        assert_eq!(cols.base_owned().len(), 2 + 15 + 3);
    }

    #[test]
    fn rejects_negative_threshold() {
        let err = ReconConfig::from_toml("discrepancy_threshold_pct = -1.0").unwrap_err();
        assert!(matches!(err, ReconError::ConfigValidation(_)));
    }

    #[test]
    fn rejects_zero_max_rows() {
        let err = ReconConfig::from_toml("max_rows = 0").unwrap_err();
        assert!(err.to_string().contains("max_rows"));
    }

    #[test]
    fn rejects_warn_above_max() {
        let err = ReconConfig::from_toml("max_rows = 100\nwarn_rows = 200").unwrap_err();
        assert!(err.to_string().contains("warn_rows"));
    }

    #[test]
    fn rejects_empty_column_name() {
        let input = "[columns]\ndifference = \"  \"\n";
        let err = ReconConfig::from_toml(input).unwrap_err();
        assert!(err.to_string().contains("columns.difference"));
    }

    #[test]
    fn rejects_unknown_key() {
        let err = ReconConfig::from_toml("treshold = 3").unwrap_err();
        assert!(matches!(err, ReconError::ConfigParse(_)), "typo should fail deserialization");
    }

    #[test]
    fn toml_round_trip() {
        let mut config = ReconConfig::default();
        config.discrepancy_threshold_pct = 12.5;
        config.columns.vehicle = "Unidad".into();
        let text = config.to_toml().unwrap();
        assert_eq!(ReconConfig::from_toml(&text).unwrap(), config);
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "sheet_name = \"Marzo\"\n").unwrap();
        let config = ReconConfig::load(&path).unwrap();
        assert_eq!(config.sheet_name, "Marzo");

        let missing = ReconConfig::load(&dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(missing, ReconError::Io(_)));
    }
}
