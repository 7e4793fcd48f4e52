//! `tessera config get|set|list`

use anyhow::{Context, Result};
use clap::Subcommand;
use tabled::{settings::Style, Table, Tabled};

use tessera_core::settings;

use super::print_json;

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print one value (empty output when unset).
    Get { key: String },

    /// Set a value; an empty value clears optional keys.
    Set { key: String, value: String },

    /// Show every key.
    List {
        /// Emit machine-readable JSON.
        #[arg(long)]
        json: bool,
    },
}

#[derive(Tabled)]
struct ConfigRow {
    #[tabled(rename = "key")]
    key: &'static str,
    #[tabled(rename = "value")]
    value: String,
}

pub fn run(command: ConfigCommand) -> Result<()> {
    let mut current = settings::load().context("failed to load settings")?;
    match command {
        ConfigCommand::Get { key } => {
            let value = current.get(&key)?;
            println!("{}", value.unwrap_or_default());
        }
        ConfigCommand::Set { key, value } => {
            current.set(&key, &value)?;
            settings::save(&current).context("failed to save settings")?;
            println!("✓ {key} updated");
        }
        ConfigCommand::List { json } => {
            let entries: Vec<(&'static str, Option<String>)> = current
                .entries()
                .into_iter()
                .map(|(key, value)| (key, value.map(|v| mask(key, v))))
                .collect();
            if json {
                let map: serde_json::Map<String, serde_json::Value> = entries
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v.map_or(serde_json::Value::Null, Into::into)))
                    .collect();
                return print_json(&map);
            }
            let rows: Vec<ConfigRow> = entries
                .into_iter()
                .map(|(key, value)| ConfigRow {
                    key,
                    value: value.unwrap_or_else(|| "(unset)".to_string()),
                })
                .collect();
            let mut table = Table::new(rows);
            table.with(Style::rounded());
            println!("{table}");
        }
    }
    Ok(())
}

/// Hide secrets in listings; `config get` still prints them.
fn mask(key: &str, value: String) -> String {
    if key == "api.key" && !value.is_empty() {
        "********".to_string()
    } else {
        value
    }
}
