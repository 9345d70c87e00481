//! Configuration view and validation commands (`stylesweep config`).

use anyhow::{Context, Result};

use stylesweep::config::{ENV_TOKEN, StyleSweepToml};

use super::super::{Cli, ConfigCommands};
use super::load_config;

pub fn cmd_config(cli: &Cli, command: Option<ConfigCommands>) -> Result<()> {
    match command {
        None | Some(ConfigCommands::Show) => {
            let config = load_config(cli)?;
            println!();
            println!("Stylesweep Configuration");
            println!("========================");
            println!();
            if config.config_path.exists() {
                println!("Config file: {}", config.config_path.display());
            } else {
                println!(
                    "No config file at {} (using defaults)",
                    config.config_path.display()
                );
            }
            println!();

            let rendered = toml::to_string_pretty(&config.toml)
                .context("Failed to render configuration")?;
            println!("Effective values (with env overrides):");
            println!();
            print!("{}", rendered);
            println!();
            println!("  cache dir = \"{}\"", config.cache_dir().display());
            println!(
                "  {} = {}",
                ENV_TOKEN,
                if config.has_token() { "<set>" } else { "<not set>" }
            );
            println!();
        }
        Some(ConfigCommands::Validate) => {
            let config = load_config(cli)?;
            println!();
            println!("Validating configuration...");
            println!();

            let warnings = config.validate();
            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            let path = cli
                .config
                .clone()
                .unwrap_or_else(|| stylesweep::config::CONFIG_FILE.into());
            if path.exists() {
                println!("{} already exists", path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }

            StyleSweepToml::default().save(&path)?;

            println!("Created {}", path.display());
            println!();
            println!("Next steps:");
            println!("  - set [github] owner (or STYLESWEEP_OWNER)");
            println!("  - export {} with a token that can push and open pull requests", ENV_TOKEN);
            println!("  - tune [run], [repos] and [artifacts] as needed");
            println!();
        }
    }

    Ok(())
}
