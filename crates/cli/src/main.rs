// cruce CLI - reconcile an invoice workbook against the operative base workbook

mod exit_codes;
mod run;
mod settings;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use exit_codes::{EXIT_CONFIG, EXIT_SUCCESS};
use run::{cmd_run, RunArgs};
use settings::Overrides;

#[derive(Parser)]
#[command(name = "cruce")]
#[command(about = "Reconcile invoices against the operative base workbook")]
#[command(long_version = long_version())]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Match invoices to base rows, write the updated base and report findings
    #[command(after_help = "\
Examples:
  cruce run --invoices facturas.xlsx --base base.xlsx
  cruce run --invoices facturas.xlsx --base base.xlsx --report -
  cruce run --invoices facturas.xlsx --base base.xlsx --output out.xlsx --report report.json --strict
  CRUCE_THRESHOLD=5 cruce run --invoices facturas.xlsx --base base.xlsx")]
    Run {
        /// Invoice workbook
        #[arg(long)]
        invoices: PathBuf,

        /// Operative base workbook (never modified)
        #[arg(long)]
        base: PathBuf,

        /// Updated base workbook [default: BASE_ACTUALIZADA.xlsx next to --base]
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,

        /// Write the JSON report to this file ("-" for stdout)
        #[arg(long)]
        report: Option<PathBuf>,

        /// Config file [default: <config dir>/cruce/config.toml when present]
        #[arg(long, env = "CRUCE_CONFIG")]
        config: Option<PathBuf>,

        /// Sheet name in both workbooks
        #[arg(long, env = "CRUCE_SHEET")]
        sheet: Option<String>,

        /// Sheet name in the invoice workbook, when it differs from --sheet
        #[arg(long)]
        invoice_sheet: Option<String>,

        /// Discrepancy threshold in percent (strictly greater flags)
        #[arg(long, env = "CRUCE_THRESHOLD")]
        threshold: Option<f64>,

        /// Maximum data rows per workbook
        #[arg(long, env = "CRUCE_MAX_ROWS")]
        max_rows: Option<usize>,

        /// Exit 1 when any invoice is not found or any discrepancy is flagged
        #[arg(long)]
        strict: bool,

        /// Only log warnings and errors, skip the summary
        #[arg(long, short = 'q')]
        quiet: bool,
    },

    /// Print the effective configuration as TOML
    Config {
        /// Config file [default: <config dir>/cruce/config.toml when present]
        #[arg(long, env = "CRUCE_CONFIG")]
        config: Option<PathBuf>,
    },
}

fn long_version() -> &'static str {
    concat!(
        env!("CARGO_PKG_VERSION"),
        " (", env!("GIT_COMMIT_HASH"), ")",
        "\ntarget:  ", env!("TARGET"),
    )
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            invoices,
            base,
            output,
            report,
            config,
            sheet,
            invoice_sheet,
            threshold,
            max_rows,
            strict,
            quiet,
        } => {
            init_logging(quiet);
            cmd_run(RunArgs {
                invoices,
                base,
                output,
                report,
                config,
                invoice_sheet,
                overrides: Overrides {
                    sheet,
                    threshold,
                    max_rows,
                },
                strict,
                quiet,
            })
        }
        Commands::Config { config } => {
            init_logging(true);
            cmd_config(config)
        }
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

/// stderr logging; `RUST_LOG` wins over the default level.
fn init_logging(quiet: bool) {
    let default = if quiet { "warn" } else { "info" };
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .try_init();
}

fn cmd_config(config: Option<PathBuf>) -> Result<(), CliError> {
    let (config, source) = settings::resolve(config.as_deref(), &Overrides::default())?;
    let toml = config
        .to_toml()
        .map_err(|e| CliError::new(EXIT_CONFIG, format!("config: {e}")))?;
    match source {
        Some(path) => println!("# {}\n{toml}", path.display()),
        None => println!("# built-in defaults\n{toml}"),
    }
    Ok(())
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn new(code: u8, msg: impl Into<String>) -> Self {
        Self { code, message: msg.into(), hint: None }
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}
