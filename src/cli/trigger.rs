//! The `trigger` command.

use std::path::Path;

use anyhow::Result;
use clap::Args;
use colored::Colorize;

use crate::config::Root;
use crate::project::ProjectPath;
use crate::stack::trigger;

#[derive(Args)]
pub struct TriggerCommand {
    /// Project path of the stack to trigger (e.g. /stacks/network).
    stack: String,

    /// Reason recorded inside the trigger file.
    #[arg(long, default_value = "Created by the trigger command")]
    reason: String,
}

impl TriggerCommand {
    pub async fn execute(self, root_dir: &Path) -> Result<()> {
        let root = Root::load(root_dir)?;
        let stack_dir = ProjectPath::new(self.stack);

        let path = trigger::create(&root, &stack_dir, &self.reason).await?;
        println!(
            "{} trigger for stack {} at {}",
            "created".green().bold(),
            stack_dir,
            path.display()
        );
        Ok(())
    }
}
