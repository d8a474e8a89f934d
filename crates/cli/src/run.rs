//! `cruce run`: load both workbooks, reconcile, write the updated base and the report.

use std::path::{Path, PathBuf};

use cruce_io::{read_rows, update_values_preserving_formulas, SheetRows, WriteOptions, XlsxError};
use cruce_recon::{ReconConfig, ReconError, ReconReport};

use crate::exit_codes::{EXIT_FINDINGS, EXIT_LOAD, EXIT_SHEET_NOT_FOUND, EXIT_USAGE, EXIT_WRITE};
use crate::settings::{self, Overrides};
use crate::CliError;

/// File name used when `--output` is not given, placed next to the base workbook.
pub const DEFAULT_OUTPUT_NAME: &str = "BASE_ACTUALIZADA.xlsx";

pub struct RunArgs {
    pub invoices: PathBuf,
    pub base: PathBuf,
    pub output: Option<PathBuf>,
    pub report: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub invoice_sheet: Option<String>,
    pub overrides: Overrides,
    pub strict: bool,
    pub quiet: bool,
}

pub fn cmd_run(args: RunArgs) -> Result<(), CliError> {
    let (config, source) = settings::resolve(args.config.as_deref(), &args.overrides)?;
    if let Some(path) = &source {
        log::info!("using config {}", path.display());
    }
    let output = args.output.clone().unwrap_or_else(|| default_output(&args.base));

    // load
    let invoice_sheet = args.invoice_sheet.as_deref().unwrap_or(&config.sheet_name);
    let invoices = load(&args.invoices, invoice_sheet, &config)?;
    let base = load(&args.base, &config.sheet_name, &config)?;

    // index + match
    let outcome = cruce_recon::reconcile_rows(&config, &invoices.rows, &base.rows)
        .map_err(recon_error)?;

    // write
    let rows = outcome.base_rows(&config.columns);
    let options = WriteOptions {
        sheet: &config.sheet_name,
        difference_column: Some(&config.columns.difference),
    };
    let written = update_values_preserving_formulas(&args.base, &rows, &output, &options)
        .map_err(|e| xlsx_error("write", e))?;

    if let Some(path) = &args.report {
        write_report(&outcome.report, path)?;
    }

    if !args.quiet {
        print_summary(&outcome.report);
        eprintln!("wrote {}: {}", output.display(), written.summary());
    }

    let stats = &outcome.report.stats;
    if args.strict && (stats.not_found > 0 || stats.discrepancies > 0) {
        return Err(CliError::new(
            EXIT_FINDINGS,
            format!(
                "{} invoices not found, {} discrepancies",
                stats.not_found, stats.discrepancies
            ),
        ));
    }
    Ok(())
}

pub fn default_output(base: &Path) -> PathBuf {
    match base.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.join(DEFAULT_OUTPUT_NAME),
        _ => PathBuf::from(DEFAULT_OUTPUT_NAME),
    }
}

fn load(path: &Path, sheet: &str, config: &ReconConfig) -> Result<SheetRows, CliError> {
    let rows = read_rows(path, sheet, config.max_rows).map_err(|e| xlsx_error("load", e))?;
    if rows.rows.len() > config.warn_rows {
        log::warn!(
            "{} has {} data rows (warn_rows = {})",
            path.display(),
            rows.rows.len(),
            config.warn_rows
        );
    }
    Ok(rows)
}

fn write_report(report: &ReconReport, path: &Path) -> Result<(), CliError> {
    let json = report
        .to_json_pretty()
        .map_err(|e| CliError::new(EXIT_WRITE, format!("write: JSON serialization error: {e}")))?;
    if path.as_os_str() == "-" {
        println!("{json}");
        return Ok(());
    }
    std::fs::write(path, format!("{json}\n")).map_err(|e| {
        CliError::new(EXIT_WRITE, format!("write: cannot write report {}: {e}", path.display()))
    })?;
    log::info!("report written to {}", path.display());
    Ok(())
}

fn print_summary(report: &ReconReport) {
    let s = &report.stats;
    eprintln!(
        "cruce: {} invoices, {} matched ({} duplicated keys), {} not found, {} discrepancies",
        s.processed, s.matched, s.duplicates, s.not_found, s.discrepancies
    );
    eprintln!(
        "invoiced total {:.2}; {} unfactured rows totalling {:.2}",
        s.total_amount, s.unfactured, s.unfactured_amount
    );
}

fn xlsx_error(stage: &str, err: XlsxError) -> CliError {
    let code = match (&err, stage) {
        (XlsxError::SheetNotFound { .. }, _) => EXIT_SHEET_NOT_FOUND,
        (XlsxError::SamePath(_), _) => EXIT_USAGE,
        (_, "write") => EXIT_WRITE,
        _ => EXIT_LOAD,
    };
    let hint = match &err {
        XlsxError::SamePath(_) => Some("pass a different --output path".to_string()),
        XlsxError::RowLimit { .. } => Some("raise the limit with --max-rows".to_string()),
        _ => None,
    };
    let mut cli_err = CliError::new(code, format!("{stage}: {err}"));
    cli_err.hint = hint;
    cli_err
}

fn recon_error(err: ReconError) -> CliError {
    let hint = match &err {
        ReconError::MissingColumn { .. } => Some("column names are set in the [columns] config table"),
        _ => None,
    };
    let mut cli_err = CliError::new(EXIT_LOAD, format!("load: {err}"));
    cli_err.hint = hint.map(str::to_string);
    cli_err
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_output_sits_next_to_base() {
        assert_eq!(
            default_output(Path::new("/data/in/base.xlsx")),
            PathBuf::from("/data/in/BASE_ACTUALIZADA.xlsx")
        );
        assert_eq!(default_output(Path::new("base.xlsx")), PathBuf::from(DEFAULT_OUTPUT_NAME));
    }

    #[test]
    fn error_codes_by_stage() {
        let missing = XlsxError::SheetNotFound {
            path: "b.xlsx".into(),
            sheet: "Hoja1".into(),
            available: vec!["Sheet1".into()],
        };
        assert_eq!(xlsx_error("load", missing).code, EXIT_SHEET_NOT_FOUND);
        assert_eq!(xlsx_error("write", XlsxError::SamePath("b.xlsx".into())).code, EXIT_USAGE);
        assert_eq!(xlsx_error("write", XlsxError::Xml("bad".into())).code, EXIT_WRITE);
        let err = xlsx_error("load", XlsxError::Io("gone".into()));
        assert_eq!(err.code, EXIT_LOAD);
        assert!(err.message.starts_with("load: "));
    }
}
