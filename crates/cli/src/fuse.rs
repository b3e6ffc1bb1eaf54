//! `vgrid fuse`: config-driven fusion of linked records.

use std::path::{Path, PathBuf};

use clap::Subcommand;
use log::info;
use visigrid_fuse::{output_names, ErrorKind, FuseConfig, FuseError, FuseReport};

use crate::exit_codes::{fuse_exit_code, EXIT_FUSE_INVALID_CONFIG, EXIT_FUSE_RUNTIME};
use crate::CliError;

#[derive(Subcommand)]
pub enum FuseCommands {
    /// Fuse linked records from a TOML config file
    #[command(after_help = "\
Examples:
  vgrid fuse run people.fuse.toml
  vgrid fuse run people.fuse.toml --json
  vgrid fuse run people.fuse.toml --csv > fused.csv
  vgrid fuse run people.fuse.toml --output report.json")]
    Run {
        /// Path to the .fuse.toml config file
        config: PathBuf,

        /// Output the JSON report to stdout instead of a human summary
        #[arg(long, conflicts_with = "csv")]
        json: bool,

        /// Output the fused table as CSV to stdout
        #[arg(long)]
        csv: bool,

        /// Write the JSON report to file
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Validate a fuse config without running
    #[command(after_help = "\
Examples:
  vgrid fuse validate people.fuse.toml")]
    Validate {
        /// Path to the .fuse.toml config file
        config: PathBuf,
    },
}

pub fn cmd_fuse(cmd: FuseCommands) -> Result<(), CliError> {
    match cmd {
        FuseCommands::Run { config, json, csv, output } => cmd_fuse_run(config, json, csv, output),
        FuseCommands::Validate { config } => cmd_fuse_validate(config),
    }
}

fn fuse_err(code: u8, msg: impl Into<String>) -> CliError {
    CliError { code, message: msg.into(), hint: None }
}

impl From<FuseError> for CliError {
    fn from(err: FuseError) -> Self {
        let hint = match err.kind() {
            ErrorKind::Lookup => Some("check column and id names in the config against the CSV headers"),
            ErrorKind::Configuration | ErrorKind::Strategy | ErrorKind::Io => None,
        };
        CliError {
            code: fuse_exit_code(&err),
            message: err.to_string(),
            hint: hint.map(String::from),
        }
    }
}

fn load_config(config_path: &Path) -> Result<FuseConfig, CliError> {
    let config_str = std::fs::read_to_string(config_path)
        .map_err(|e| fuse_err(EXIT_FUSE_RUNTIME, format!("cannot read config: {e}")))?;
    FuseConfig::from_toml(&config_str)
        .map_err(|e| fuse_err(EXIT_FUSE_INVALID_CONFIG, e.to_string()))
}

fn read_input(base_dir: &Path, file: &str) -> Result<String, CliError> {
    let path = base_dir.join(file);
    std::fs::read_to_string(&path)
        .map_err(|e| fuse_err(EXIT_FUSE_RUNTIME, format!("cannot read {}: {e}", path.display())))
}

fn write_output(path: &Path, contents: &str) -> Result<(), CliError> {
    std::fs::write(path, contents)
        .map_err(|e| fuse_err(EXIT_FUSE_RUNTIME, format!("cannot write {}: {e}", path.display())))?;
    eprintln!("wrote {}", path.display());
    Ok(())
}

fn cmd_fuse_run(
    config_path: PathBuf,
    json_output: bool,
    csv_output: bool,
    output_file: Option<PathBuf>,
) -> Result<(), CliError> {
    let config = load_config(&config_path)?;

    // Resolve file paths relative to config file's directory
    let base_dir = config_path.parent().unwrap_or_else(|| Path::new("."));

    let input = visigrid_fuse::load_input(
        &config,
        &read_input(base_dir, &config.sources.a.file)?,
        &read_input(base_dir, &config.sources.b.file)?,
        &read_input(base_dir, &config.links.file)?,
    )?;
    info!(
        "loaded {} + {} record(s), {} pair(s)",
        input.table_a.len(),
        input.table_b.len(),
        input.vectors.index.len()
    );

    let report = visigrid_fuse::run(&config, &input)?;

    let json_str = report_json(&report)?;
    let csv_str = report.table.to_csv()?;

    if let Some(ref path) = output_file {
        write_output(path, &json_str)?;
    }
    if let Some(ref file) = config.output.json {
        write_output(&base_dir.join(file), &json_str)?;
    }
    if let Some(ref file) = config.output.csv {
        write_output(&base_dir.join(file), &csv_str)?;
    }

    if json_output {
        println!("{json_str}");
    } else if csv_output {
        print!("{csv_str}");
    }

    // Human summary to stderr
    let m = &report.meta;
    eprintln!(
        "fuse '{}': {} row(s), {} column(s), {} broadcast(s)",
        m.config_name,
        m.rows,
        m.columns,
        report.table.broadcasts.len(),
    );

    Ok(())
}

fn report_json(report: &FuseReport) -> Result<String, CliError> {
    serde_json::to_string_pretty(report)
        .map_err(|e| fuse_err(EXIT_FUSE_RUNTIME, format!("JSON serialization error: {e}")))
}

fn cmd_fuse_validate(config_path: PathBuf) -> Result<(), CliError> {
    let config = load_config(&config_path)?;
    let jobs = config.jobs()?;
    let names = output_names(&jobs, &config.options.suffix_a, &config.options.suffix_b)?;
    eprintln!(
        "valid: fuse '{}' with {} resolve rule(s): {}",
        config.name,
        jobs.len(),
        names.join(", "),
    );
    Ok(())
}
