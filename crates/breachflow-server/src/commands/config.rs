//! `breachflow config`: print the resolved configuration.

use anyhow::{Result, bail};
use breachflow_config::BreachflowConfig;

pub fn show(config: &BreachflowConfig, format: &str) -> Result<()> {
    match format {
        "toml" => print!("{}", config.to_toml()?),
        "json" => println!("{}", serde_json::to_string_pretty(config)?),
        other => bail!("unknown format {other:?} (expected toml or json)"),
    }
    Ok(())
}
