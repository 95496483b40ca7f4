//! Command-line interface.
//!
//! The CLI is a thin layer over the library: it loads the project
//! configuration, hands it to the stacks [`Manager`](crate::stack::Manager),
//! and renders the result. All commands accept `-C/--chdir` to select the
//! project root and `-v` to raise log verbosity (`RUST_LOG` overrides).

mod list;
mod trigger;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// Terraform stack orchestration: discover stacks, evaluate configuration,
/// detect changes against a git base ref.
#[derive(Parser)]
#[command(name = "terrastack", version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Project root directory (defaults to the current directory).
    #[arg(short = 'C', long, global = true, value_name = "DIR")]
    chdir: Option<PathBuf>,

    /// Increase log verbosity (-v: debug, -vv: trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// List stacks, optionally only the ones changed against the base ref.
    List(list::ListCommand),

    /// Create a change trigger for a stack.
    Trigger(trigger::TriggerCommand),
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        init_tracing(self.verbose);

        let root_dir = match self.chdir {
            Some(dir) => dir,
            None => std::env::current_dir().context("resolving current directory")?,
        };

        match self.command {
            Commands::List(cmd) => cmd.execute(&root_dir).await,
            Commands::Trigger(cmd) => cmd.execute(&root_dir).await,
        }
    }
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("terrastack={default_level}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
