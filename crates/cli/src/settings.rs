//! Effective configuration: built-in defaults, then a TOML file, then flags.

use std::path::{Path, PathBuf};

use cruce_recon::ReconConfig;

use crate::exit_codes::EXIT_CONFIG;
use crate::CliError;

/// Values given on the command line or through `CRUCE_*` variables.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub sheet: Option<String>,
    pub threshold: Option<f64>,
    pub max_rows: Option<usize>,
}

/// `<config_dir>/cruce/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("cruce").join("config.toml"))
}

/// Load the effective config. An explicit path must exist; the default path is
/// only read when present. Returns the file that was used, if any.
pub fn resolve(
    explicit: Option<&Path>,
    overrides: &Overrides,
) -> Result<(ReconConfig, Option<PathBuf>), CliError> {
    let source = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => default_config_path().filter(|p| p.is_file()),
    };

    let mut config = match &source {
        Some(path) => {
            log::debug!("loading config from {}", path.display());
            ReconConfig::load(path).map_err(|e| {
                CliError::new(EXIT_CONFIG, format!("config: {e}"))
                    .with_hint(format!("check {}", path.display()))
            })?
        }
        None => ReconConfig::default(),
    };

    apply(&mut config, overrides);
    config
        .validate()
        .map_err(|e| CliError::new(EXIT_CONFIG, format!("config: {e}")))?;
    Ok((config, source))
}

fn apply(config: &mut ReconConfig, overrides: &Overrides) {
    if let Some(sheet) = &overrides.sheet {
        config.sheet_name = sheet.clone();
    }
    if let Some(threshold) = overrides.threshold {
        config.discrepancy_threshold_pct = threshold;
    }
    if let Some(max_rows) = overrides.max_rows {
        config.max_rows = max_rows;
        // a lowered cap drags the warning level with it
        config.warn_rows = config.warn_rows.min(max_rows);
    }
}
