use super::CommandOutput;
use crate::config::{Config, ConfigManager, SETTING_KEYS};
use crate::error::Result;
use clap::Args;
use colored::Colorize;
use serde_json::{Map, Value, json};

#[derive(Args, Debug, Default)]
pub struct ConfigGetArgs {
    /// Setting to read
    #[arg(short, long)]
    pub key: String,
}

#[derive(Args, Debug, Default)]
pub struct ConfigSetArgs {
    /// Setting to change
    #[arg(short, long)]
    pub key: String,

    /// New value
    #[arg(long)]
    pub value: String,
}

#[derive(Args, Debug, Default)]
pub struct ConfigResetArgs {
    /// Setting to reset; all settings when omitted
    #[arg(short, long)]
    pub key: Option<String>,
}

pub async fn get(config: &ConfigManager, args: &ConfigGetArgs) -> Result<CommandOutput> {
    let value = config.load_config()?.get_setting(&args.key)?;
    Ok(Some(json!(value)))
}

pub async fn set(config: &ConfigManager, args: &ConfigSetArgs) -> Result<CommandOutput> {
    let mut settings = config.load_config()?;
    settings.set_setting(&args.key, &args.value)?;
    config.save_config(&settings)?;

    eprintln!("{} {} set to {}", "✓".green(), args.key.bold(), args.value);
    Ok(None)
}

pub async fn list(config: &ConfigManager) -> Result<CommandOutput> {
    let settings = config.load_config()?;
    let mut listed = Map::new();
    for key in SETTING_KEYS {
        listed.insert(key.to_string(), json!(settings.get_setting(key)?));
    }
    Ok(Some(Value::Object(listed)))
}

pub async fn reset(config: &ConfigManager, args: &ConfigResetArgs) -> Result<CommandOutput> {
    let mut settings = config.load_config()?;
    let defaults = Config::default();

    match &args.key {
        Some(key) => {
            // validates the key
            let default_value = defaults.get_setting(key)?;
            settings.set_setting(key, &default_value)?;
        }
        None => {
            settings = Config {
                current_connection: settings.current_connection,
                ..defaults
            };
        }
    }

    config.save_config(&settings)?;
    Ok(None)
}
