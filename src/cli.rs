use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "microdeploy")]
#[command(version)]
#[command(about = "Deploy and tear down a single VM through a CPI release", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Set or show the deployment manifest other commands act on
    Deployment {
        /// Path to the deployment manifest (omit to show the current one)
        manifest: Option<PathBuf>,
    },

    /// Create or update the deployment's VM
    Deploy {
        /// CPI release tarball
        cpi_release: PathBuf,

        /// Stemcell tarball
        stemcell: PathBuf,
    },

    /// Delete the deployment's VM, disks and stemcells
    Delete {
        /// CPI release tarball
        cpi_release: PathBuf,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_deploy() {
        let cli = Cli::parse_from(["microdeploy", "-vv", "deploy", "cpi.tgz", "stemcell.tgz"]);
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Command::Deploy {
                cpi_release,
                stemcell,
            } => {
                assert_eq!(cpi_release, PathBuf::from("cpi.tgz"));
                assert_eq!(stemcell, PathBuf::from("stemcell.tgz"));
            }
            _ => panic!("expected deploy"),
        }
    }

    #[test]
    fn test_parse_deployment_without_manifest() {
        let cli = Cli::parse_from(["microdeploy", "deployment", "-q"]);
        assert!(cli.quiet);
        assert!(matches!(cli.command, Command::Deployment { manifest: None }));
    }
}
