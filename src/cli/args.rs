//! Command-line argument definitions

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Harvest, validate and serve public proxy endpoints
#[derive(Debug, Parser)]
#[command(name = "proxy_harvester", version, about)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Arguments shared by every subcommand
#[derive(Debug, Args)]
pub struct GlobalArgs {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Enable very verbose (trace) logging
    #[arg(long, global = true)]
    pub very_verbose: bool,

    /// Path to the configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the harvesting and validation pipeline
    Run(RunArgs),
    /// Print the effective configuration as TOML
    Config(ConfigArgs),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Exit once every source has completed instead of running forever
    #[arg(long)]
    pub once: bool,

    /// Override the checker's parallel probe slots
    #[arg(long)]
    pub parallelism: Option<usize>,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    /// Write the effective configuration to the default location
    #[arg(long)]
    pub init: bool,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Log level derived from the verbosity flags
    pub fn log_level(&self) -> &'static str {
        if self.global.very_verbose {
            "trace"
        } else if self.global.verbose {
            "debug"
        } else {
            "info"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_command() {
        let cli = Cli::try_parse_from(["proxy_harvester", "run", "--once"]).unwrap();
        match cli.command {
            Commands::Run(args) => assert!(args.once),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_log_level_flags() {
        let cli = Cli::try_parse_from(["proxy_harvester", "run"]).unwrap();
        assert_eq!(cli.log_level(), "info");

        let cli = Cli::try_parse_from(["proxy_harvester", "-v", "run"]).unwrap();
        assert_eq!(cli.log_level(), "debug");

        let cli = Cli::try_parse_from(["proxy_harvester", "--very-verbose", "run"]).unwrap();
        assert_eq!(cli.log_level(), "trace");
    }

    #[test]
    fn test_parallelism_override() {
        let cli =
            Cli::try_parse_from(["proxy_harvester", "run", "--parallelism", "16"]).unwrap();
        match cli.command {
            Commands::Run(args) => assert_eq!(args.parallelism, Some(16)),
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
