use std::io;
use std::process;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use library_catalog::cli::{self, Cli, Command};
use library_catalog::config::Config;
use library_catalog::logging::init_logging_or_warn;
use library_catalog::{open_database, run_app, App};

/// Load configuration, open the catalog, then either run one subcommand or
/// hand over to the terminal UI.
fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.db)?;
    init_logging_or_warn(&config, &mut io::stderr());
    info!(
        data_dir = %config.data_dir.display(),
        database = %config.database_path.display(),
        "starting library catalog"
    );

    let mut conn = open_database(&config.database_path, config.busy_timeout)?;

    match cli.command {
        None | Some(Command::Tui) => {
            let mut app = App::new(conn).context("failed to load the catalog")?;
            run_app(&mut app)
        }
        Some(command) => {
            let stdout = io::stdout();
            let mut out = stdout.lock();
            cli::execute(&mut conn, command, &mut out)
        }
    }
}

fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        error!(error = ?err, "command failed");
        eprintln!("error: {err:#}");
        process::exit(cli::exit_code(&err));
    }
}
