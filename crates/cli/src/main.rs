// VisiGrid fuse CLI - resolve conflicting values across linked records

mod exit_codes;
mod fuse;

use std::io::Write;
use std::process::ExitCode;

use clap::{ArgAction, Parser, Subcommand};
use log::LevelFilter;

use exit_codes::{EXIT_SUCCESS, EXIT_USAGE};

#[derive(Parser)]
#[command(name = "vgrid")]
#[command(about = "Fuse linked records from two tables into one (headless)")]
#[command(version)]
#[command(subcommand_required = false)]
struct Cli {
    /// Log engine progress to stderr (-v info, -vv debug)
    #[arg(long, short = 'v', global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Only log errors (suppresses broadcast warnings)
    #[arg(long, short = 'q', global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve data conflicts between linked records of two tables
    Fuse {
        #[command(subcommand)]
        command: fuse::FuseCommands,
    },
}

// ============================================================================
// Logging
// ============================================================================

fn log_level(verbose: u8, quiet: bool) -> LevelFilter {
    match (quiet, verbose) {
        (true, _) => LevelFilter::Error,
        (false, 0) => LevelFilter::Warn,
        (false, 1) => LevelFilter::Info,
        (false, _) => LevelFilter::Debug,
    }
}

/// `level: message` lines on stderr. `VGRID_LOG` overrides the flags.
fn init_logging(verbose: u8, quiet: bool) {
    let _ = env_logger::Builder::new()
        .filter_level(log_level(verbose, quiet))
        .parse_env("VGRID_LOG")
        .format(|buf, record| {
            writeln!(buf, "{}: {}", record.level().as_str().to_lowercase(), record.args())
        })
        .try_init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let result = match cli.command {
        None => {
            // No subcommand = show help
            eprintln!("Usage: vgrid <command> [options]");
            eprintln!("       vgrid --help for more information");
            Err(CliError { code: EXIT_USAGE, message: String::new(), hint: None })
        }
        Some(Commands::Fuse { command }) => fuse::cmd_fuse(command),
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

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}
