use std::{path::PathBuf, process};

use clap::Parser;
use log::error;

use rigup::{
    cli::{
        args::{CliArgs, Command},
        logging::init_logger,
    },
    config::RigupConfig,
    Rigup,
};

const LOG_FILE_NAME: &str = "rigup.log";

fn main() {
    let cli_args = CliArgs::parse();

    let (rigup, log_file) = match configure(&cli_args) {
        Ok(configured) => configured,
        Err(e) => {
            init_logger(None);
            error!("{e:#}");
            process::exit(1);
        }
    };
    init_logger(Some(&log_file));

    if let Err(e) = run(&rigup, cli_args.cmd.unwrap_or(Command::Run)) {
        error!("{e:#}");
        process::exit(1);
    }
}

/// CLI flags take precedence over `RIGUP_*` environment configuration.
fn configure(cli_args: &CliArgs) -> anyhow::Result<(Rigup, PathBuf)> {
    let config = RigupConfig::load()?;

    let mut builder = Rigup::builder()
        .network_timeout(config.network_timeout)
        .command_timeout(config.command_timeout)
        .privilege_command(config.privilege_command);
    if let Some(root) = cli_args.root.as_ref().or(config.root_dir.as_ref()) {
        builder = builder.root(root);
    }
    if let Some(manifest) = &cli_args.manifest {
        builder = builder.manifest(manifest);
    }
    if let Some(home) = &cli_args.home {
        builder = builder.home(home);
    }
    let rigup = builder.try_build()?;

    let log_file = config
        .log_file
        .unwrap_or_else(|| rigup.root().join(LOG_FILE_NAME));
    Ok((rigup, log_file))
}

fn run(rigup: &Rigup, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Run => rigup.run(),
        Command::Packages => rigup.packages(),
        Command::Services => rigup.services(),
        Command::Sources => rigup.sources(),
        Command::Patches => rigup.patches(),
        Command::Startup => rigup.startup(),
        Command::Init => rigup.init(),
        Command::ClearCache => rigup.clear_cache(),
    }
}
