//! Command-line interface
//!
//! Argument parsing and subcommand handlers for the `proxy_harvester`
//! binary.

pub mod args;
pub mod commands;

pub use args::{Cli, Commands};
pub use commands::{handle_config, handle_run};
