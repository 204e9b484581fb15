//! Config Commands

use anyhow::{bail, Result};
use clap::Subcommand;
use std::path::Path;

use stagehand_core::StagehandConfig;

use crate::output::{print_success, OutputFormat};

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,

    /// Write a configuration file with default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

pub fn execute(cmd: ConfigCommands, path: &Path, format: OutputFormat) -> Result<()> {
    match cmd {
        ConfigCommands::Show => {
            let config = StagehandConfig::load(path)?;
            let rendered = match format {
                OutputFormat::Json => serde_json::to_string_pretty(&config)?,
                _ => toml::to_string_pretty(&config)?,
            };
            println!("{}", rendered.trim_end());
        }
        ConfigCommands::Init { force } => {
            if path.exists() && !force {
                bail!("{} already exists (use --force to overwrite)", path.display());
            }
            StagehandConfig::default().save(path)?;
            print_success(&format!("Wrote {}", path.display()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_init_refuses_to_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stagehand.toml");

        execute(ConfigCommands::Init { force: false }, &path, OutputFormat::Plain).unwrap();
        assert_eq!(StagehandConfig::load(&path).unwrap(), StagehandConfig::default());

        assert!(
            execute(ConfigCommands::Init { force: false }, &path, OutputFormat::Plain).is_err()
        );
        assert!(execute(ConfigCommands::Init { force: true }, &path, OutputFormat::Plain).is_ok());
    }
}
