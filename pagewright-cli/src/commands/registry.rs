//! Inspect the task registry

use clap::Args;
use pagewright_core::{Config, JsonFileRegistry, TaskRegistry};

/// Arguments for the registry command
#[derive(Args, Debug)]
pub struct RegistryArgs {
    /// Only show this task
    #[arg(long)]
    pub task: Option<String>,

    /// Print the raw JSON document
    #[arg(long)]
    pub json: bool,
}

impl RegistryArgs {
    /// Execute the registry command
    pub fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let path = &config.storage.registry_path;
        let registry = JsonFileRegistry::open(path)?;

        let entries: Vec<_> = registry
            .entries()
            .into_iter()
            .filter(|(task, _)| self.task.as_deref().map_or(true, |t| t == task))
            .collect();

        if self.json {
            let doc: serde_json::Map<String, serde_json::Value> = entries
                .into_iter()
                .map(|(task, entry)| Ok((task, serde_json::to_value(entry)?)))
                .collect::<serde_json::Result<_>>()?;
            println!("{}", serde_json::to_string_pretty(&doc)?);
            return Ok(());
        }

        println!("Task registry: {}", path.display());
        println!();

        if entries.is_empty() {
            println!("No tasks registered.");
            return Ok(());
        }

        for (task, entry) in entries {
            let rounds: Vec<String> = entry.rounds.iter().map(|r| r.to_string()).collect();
            println!("  {}", task);
            println!("    repository: {}", entry.repo_name);
            println!("    rounds: {}", rounds.join(", "));
        }

        Ok(())
    }
}
