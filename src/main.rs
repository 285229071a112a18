use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;

use pbs_server_core::domain::server::migrate::MigrationOutcome;
use pbs_server_core::{logger, open_server};

/// Moves node data from the legacy nodes files, or from an older datastore layout,
/// into the current datastore.
#[derive(Debug, Parser)]
#[command(name = "pbs_migrate", version)]
struct Args {
    /// Server configuration (JSON).
    #[arg(long)]
    config: PathBuf,

    /// Datastore image to migrate into, overriding the configured one.
    #[arg(long)]
    store: Option<PathBuf>,

    /// Directory for the migration log. Defaults to the current directory.
    #[arg(long, default_value = ".")]
    log_dir: PathBuf,
}

fn run(args: Args) -> anyhow::Result<MigrationOutcome> {
    let mut server = open_server(&args.config, args.store).with_context(|| format!("cannot open server from '{}'", args.config.display()))?;
    let outcome = server.svr_migrate_data().context("migration failed, nothing was committed")?;
    Ok(outcome)
}

fn main() -> ExitCode {
    let args = Args::parse();
    logger::init(&args.log_dir);

    match run(args) {
        Ok(outcome) => {
            log::info!("Migration finished: {:?}", outcome);
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("{:#}", e);
            eprintln!("pbs_migrate: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
