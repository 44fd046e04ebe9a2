//! CLI commands for agentmesh using clap.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::{get_settings_path, load_settings_or_default, save_settings, Settings};
use crate::pipeline::{DemoReport, Pipeline, SAMPLE_CODE};
use crate::protocol::{Message, MessageValidator};

/// agentmesh - in-process multi-agent messaging runtime.
#[derive(Parser)]
#[command(name = "agentmesh")]
#[command(version)]
#[command(about = "Run cooperating agents over a shared, versioned context", long_about = None)]
pub struct Commands {
    /// Settings file (defaults to ~/.agentmesh/settings.json)
    #[arg(long, global = true, env = "AGENTMESH_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the analysis -> optimization -> verification demo
    Demo {
        /// Source file to analyze (defaults to a built-in sample)
        #[arg(long)]
        code: Option<PathBuf>,

        /// How long to wait for the pipeline to finish
        #[arg(long, default_value_t = 3000)]
        wait_ms: u64,
    },

    /// Check a message file against the protocol rules
    Validate {
        /// JSON file holding one message
        file: PathBuf,
    },

    /// Manage settings
    #[command(subcommand)]
    Settings(SettingsCommand),
}

#[derive(Subcommand)]
pub enum SettingsCommand {
    /// Print effective settings as JSON
    Show,

    /// Write a default settings file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

impl Commands {
    /// Effective settings for this invocation.
    pub fn settings(&self) -> Settings {
        load_settings_or_default(self.config.as_deref())
    }

    /// Run the command.
    pub async fn run(&self, settings: Settings) -> Result<()> {
        match &self.command {
            Command::Demo { code, wait_ms } => {
                cmd_demo(&settings, code.as_deref(), Duration::from_millis(*wait_ms)).await
            }
            Command::Validate { file } => cmd_validate(file),
            Command::Settings(SettingsCommand::Show) => cmd_settings_show(&settings),
            Command::Settings(SettingsCommand::Init { force }) => {
                cmd_settings_init(self.config.as_deref(), *force)
            }
        }
    }
}

// Command implementations

async fn cmd_demo(settings: &Settings, code_path: Option<&Path>, wait: Duration) -> Result<()> {
    let code = match code_path {
        Some(path) => std::fs::read_to_string(path)?,
        None => SAMPLE_CODE.to_string(),
    };

    let pipeline = Pipeline::build(settings).await?;
    if let Some(path) = code_path {
        pipeline
            .context
            .set("source_file", serde_json::json!(path.display().to_string()))?;
    }

    println!("Agents:");
    for info in pipeline.registry.list_agents().await {
        println!("  - {} ({})", info.id, info.agent_type);
        println!("    Capabilities: {}", info.capabilities.join(", "));
    }
    println!();
    println!("Code:");
    println!("{}", code.trim_end());
    println!();

    let report = pipeline.run(&code, wait).await?;
    print_report(&report);

    if !report.completed {
        anyhow::bail!("pipeline did not finish within {:?}", wait);
    }
    Ok(())
}

fn print_report(report: &DemoReport) {
    if let Some(analysis) = &report.analysis_results {
        println!("Analysis:");
        println!("  Complexity: {}", analysis["complexity"]);
        println!("  Patterns: {}", analysis["patterns"]);
        println!();
    }

    if let Some(suggestions) = report.optimization_suggestions.as_array() {
        if !suggestions.is_empty() {
            println!("Optimization Suggestions:");
            for (i, suggestion) in suggestions.iter().enumerate() {
                println!(
                    "  {}. {}",
                    i + 1,
                    suggestion["transformations"][0]["description"]
                );
                println!("     Rationale: {}", suggestion["rationale"]);
            }
            println!();
        }
    }

    if let Some(verification) = &report.verification_status {
        println!("Verification:");
        println!("  Status: {}", verification["status"]);
        println!("  Tests Passed: {}", verification["tests_passed"]);
        println!();
    }

    println!("Registry:");
    println!("  Total Agents: {}", report.statistics.total_agents);
    println!("  Total Messages: {}", report.statistics.total_messages);
    for (route, count) in &report.statistics.message_routes {
        println!("  {}: {} messages", route, count);
    }
    println!();

    println!("Context Versions: {}", report.history.len());
    for version in report.history.iter().rev().take(5).rev() {
        println!("  Version {}: {}", version.version_id, version.timestamp);
    }
}

fn cmd_validate(file: &Path) -> Result<()> {
    let content = std::fs::read_to_string(file)?;
    let message = Message::from_json(&content)?;

    match MessageValidator::validate(&message) {
        Ok(()) => {
            println!("✓ {} is a valid {} message", message.id, message.kind);
            Ok(())
        }
        Err(e) => anyhow::bail!("invalid message: {}", e),
    }
}

fn cmd_settings_show(settings: &Settings) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(settings)?);
    Ok(())
}

fn cmd_settings_init(path: Option<&Path>, force: bool) -> Result<()> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => get_settings_path()?,
    };

    if path.exists() && !force {
        anyhow::bail!(
            "Settings already exist at {} (use --force to overwrite)",
            path.display()
        );
    }

    save_settings(&path, &Settings::default())?;
    println!("✓ Wrote default settings to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_demo_args() {
        let args = Commands::try_parse_from(["agentmesh", "demo", "--wait-ms", "500"]).unwrap();
        match args.command {
            Command::Demo { code, wait_ms } => {
                assert!(code.is_none());
                assert_eq!(wait_ms, 500);
            }
            _ => panic!("expected demo"),
        }
    }

    #[test]
    fn test_settings_init_refuses_overwrite() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.json");

        cmd_settings_init(Some(&path), false).unwrap();
        assert!(path.exists());
        assert!(cmd_settings_init(Some(&path), false).is_err());
        cmd_settings_init(Some(&path), true).unwrap();
    }

    #[test]
    fn test_validate_command() {
        let temp_dir = TempDir::new().unwrap();
        let good = temp_dir.path().join("good.json");
        let message = Message::request("a", "b", crate::protocol::Payload::new());
        std::fs::write(&good, message.to_json().unwrap()).unwrap();
        cmd_validate(&good).unwrap();

        let bad = temp_dir.path().join("bad.json");
        let response = Message::new(
            "a",
            "b",
            crate::protocol::MessageKind::Response,
            crate::protocol::Payload::new(),
        );
        std::fs::write(&bad, response.to_json().unwrap()).unwrap();
        assert!(cmd_validate(&bad).is_err());
    }
}
