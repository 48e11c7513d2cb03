//! masterlink CLI - Diagnostic front end for a home-automation master.
//!
//! ## Features
//!
//! - List serial ports
//! - Query master status and module counts
//! - Execute basic actions
//! - Interactive maintenance (CLI) session
//! - Watch output-change events and passthrough traffic
//! - Interactive port selection and shell completions
//! - Environment variable and config file support

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use env_logger::Env;
use log::debug;
use masterlink::{MasterCommunicator, SerialConfig, Transport};
use std::env;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

mod commands;
mod config;
mod serial;

use config::Config;

/// Baud rate used when neither flags, environment nor config name one.
const DEFAULT_BAUD: u32 = 115200;

/// Set by the Ctrl-C handler.
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Whether Ctrl-C was pressed since startup.
pub(crate) fn was_interrupted() -> bool {
    INTERRUPTED.load(Ordering::Relaxed)
}

/// masterlink - Talk to a home-automation master over its serial link.
///
/// Environment variables:
///   MASTERLINK_PORT   - Default serial port
///   MASTERLINK_BAUD   - Default baud rate (default: 115200)
#[derive(Parser)]
#[command(name = "masterlink")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub(crate) struct Cli {
    /// Serial port of the master.
    #[arg(short, long, global = true, env = "MASTERLINK_PORT")]
    port: Option<String>,

    /// Baud rate [default: 115200].
    #[arg(short, long, global = true, env = "MASTERLINK_BAUD")]
    baud: Option<u32>,

    /// Command timeout in milliseconds.
    #[arg(long, global = true, value_name = "MS")]
    timeout: Option<u64>,

    /// Path to a configuration file.
    #[arg(long = "config", global = true, value_name = "PATH")]
    config_path: Option<PathBuf>,

    /// Verbose output level (-v, -vv for increasing detail).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Bring a master left in CLI mode back to API mode before starting.
    #[arg(long, global = true)]
    init_master: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// List available serial ports.
    ListPorts {
        /// Output port list as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Show the master's clock and operating mode.
    Status {
        /// Output status as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Execute a basic action (e.g. `action 161 5` turns light 5 on).
    Action {
        /// Action type.
        action_type: u8,
        /// Action number (output, floor, ...).
        number: u8,
    },

    /// Show the number of input and output modules.
    Modules {
        /// Output counts as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Open an interactive maintenance session on the master.
    Maintenance,

    /// Print output-change events until Ctrl-C.
    Watch {
        /// Also print raw passthrough traffic.
        #[arg(long)]
        passthrough: bool,

        /// Print events and statistics as JSON lines to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completions.
    Completions {
        /// Shell type (detected from $SHELL if omitted).
        #[arg(value_enum)]
        shell: Option<Shell>,
    },
}

fn main() -> Result<()> {
    // --- NO_COLOR and TTY detection ---
    let stderr_is_tty = console::Term::stderr().is_term();
    if env::var("NO_COLOR").is_ok() || !stderr_is_tty {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_target(cli.verbose >= 2)
        .format_timestamp(if cli.verbose >= 2 {
            Some(env_logger::TimestampPrecision::Millis)
        } else {
            None
        })
        .init();

    debug!(
        "masterlink v{} (verbose level: {})",
        env!("CARGO_PKG_VERSION"),
        cli.verbose
    );

    if let Err(e) = ctrlc::set_handler(|| INTERRUPTED.store(true, Ordering::Relaxed)) {
        debug!("Could not install Ctrl-C handler: {e}");
    }

    // Load configuration
    let config = if let Some(ref path) = cli.config_path {
        Config::load_from_path(path)
    } else {
        Config::load()
    };

    match &cli.command {
        Commands::ListPorts { json } => {
            commands::ports::cmd_list_ports(*json)?;
        },
        Commands::Status { json } => {
            let communicator = connect(&cli, &config)?;
            commands::status::cmd_status(&communicator, *json)?;
        },
        Commands::Action {
            action_type,
            number,
        } => {
            let communicator = connect(&cli, &config)?;
            commands::action::cmd_action(&cli, &communicator, *action_type, *number)?;
        },
        Commands::Modules { json } => {
            let communicator = connect(&cli, &config)?;
            commands::modules::cmd_modules(&communicator, *json)?;
        },
        Commands::Maintenance => {
            let communicator = connect(&cli, &config)?;
            commands::maintenance::cmd_maintenance(&cli, &communicator)?;
        },
        Commands::Watch { passthrough, json } => {
            let communicator = connect(&cli, &config)?;
            commands::watch::cmd_watch(&cli, &communicator, *passthrough, *json)?;
        },
        Commands::Completions { shell } => {
            commands::completions::cmd_completions(*shell)?;
        },
    }

    Ok(())
}

/// Open the port and start a communicator on it.
fn connect(cli: &Cli, config: &Config) -> Result<MasterCommunicator> {
    let port = serial::resolve_port(cli.port.clone().or_else(|| config.connection.port.clone()))?;
    let baud = cli.baud.or(config.connection.baud).unwrap_or(DEFAULT_BAUD);

    let mut link = config.communicator();
    if let Some(ms) = cli.timeout {
        link = link.with_default_timeout(Duration::from_millis(ms));
    }
    if cli.init_master {
        link = link.with_init_master(true);
    }

    debug!("Opening {port} at {baud} baud");
    let transport = Transport::open(&SerialConfig::new(&port, baud))
        .with_context(|| format!("Failed to open serial port {port}"))?;
    let communicator = MasterCommunicator::new(transport, link);
    communicator
        .start()
        .with_context(|| format!("Failed to start communicator on {port}"))?;
    Ok(communicator)
}
