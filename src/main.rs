mod cli;
mod commands;
mod config;
mod deployment;
mod eventlog;
mod manifest;
mod paths;
mod stemcell;
mod ui;

#[cfg(test)]
mod testutil;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use std::io;
use std::process::ExitCode;

/// Global context for the application
pub struct Context {
    pub quiet: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let ctx = Context { quiet: cli.quiet };

    match run(&ctx, cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            ui::error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

fn run(ctx: &Context, command: Command) -> Result<()> {
    match command {
        Command::Deployment { manifest } => commands::deployment::run(ctx, manifest.as_deref()),
        Command::Deploy {
            cpi_release,
            stemcell,
        } => commands::deploy::run(ctx, &cpi_release, &stemcell),
        Command::Delete { cpi_release } => commands::delete::run(ctx, &cpi_release),
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "microdeploy", &mut io::stdout());
            Ok(())
        }
    }
}
