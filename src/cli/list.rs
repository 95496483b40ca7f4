//! The `list` command.

use std::path::Path;

use anyhow::Result;
use clap::{Args, ValueEnum};
use colored::Colorize;

use crate::config::Root;
use crate::stack::{Manager, Report};

#[derive(Args)]
pub struct ListCommand {
    /// List only stacks that changed relative to the base ref.
    #[arg(long)]
    changed: bool,

    /// Git reference changes are computed against.
    #[arg(long, value_name = "REF", default_value = "origin/main")]
    git_base_ref: String,

    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

impl ListCommand {
    pub async fn execute(self, root_dir: &Path) -> Result<()> {
        let root = Root::load(root_dir)?;
        let manager = Manager::new(root, self.git_base_ref);

        let report = if self.changed {
            manager.list_changed().await?
        } else {
            manager.list().await?
        };

        match self.format {
            OutputFormat::Text => print_text(&report, self.changed),
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        }
        Ok(())
    }
}

fn print_text(report: &Report, with_reasons: bool) {
    for entry in &report.stacks {
        if with_reasons && !entry.reason.is_empty() {
            println!("{}  {}", entry.stack.dir, entry.reason.dimmed());
        } else {
            println!("{}", entry.stack.dir);
        }
    }

    for file in &report.checks.untracked_files {
        eprintln!("{} untracked file: {file}", "warning:".yellow().bold());
    }
    for file in &report.checks.uncommitted_files {
        eprintln!("{} uncommitted file: {file}", "warning:".yellow().bold());
    }
}
