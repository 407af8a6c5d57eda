use crate::output::print_json;
use anyhow::Context;
use clap::Subcommand;
use filerelay_core::config::{Config, WarnLevel};
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Print the effective configuration after all layers apply (password redacted)
    Show,

    /// Validate the effective configuration
    Validate,

    /// Write the effective configuration to a YAML file
    Init {
        /// Destination (default: ./filerelay.yaml)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

pub fn run(config: &Config, subcmd: ConfigSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ConfigSubcommand::Show => show(config, json),
        ConfigSubcommand::Validate => validate(config, json),
        ConfigSubcommand::Init { output, force } => init(config, output, force),
    }
}

fn show(config: &Config, json: bool) -> anyhow::Result<()> {
    let redacted = config.redacted();
    if json {
        return print_json(&redacted);
    }
    print!("{}", serde_yaml::to_string(&redacted)?);
    Ok(())
}

fn validate(config: &Config, json: bool) -> anyhow::Result<()> {
    let warnings = config.validate();

    if json {
        print_json(&serde_json::json!({ "warnings": warnings }))?;
    } else if warnings.is_empty() {
        println!("Config is valid. No warnings.");
    } else {
        for w in &warnings {
            let prefix = match w.level {
                WarnLevel::Warning => "warning",
                WarnLevel::Error => "error",
            };
            println!("[{prefix}] {}", w.message);
        }
    }

    if warnings.iter().any(|w| w.level == WarnLevel::Error) {
        anyhow::bail!("config validation found errors");
    }
    Ok(())
}

fn init(config: &Config, output: Option<PathBuf>, force: bool) -> anyhow::Result<()> {
    let path = output.unwrap_or_else(|| PathBuf::from(filerelay_core::paths::CONFIG_FILE));
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }
    config
        .save(&path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    println!("Wrote {}", path.display());
    Ok(())
}
