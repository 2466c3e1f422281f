use clap::{Args, Subcommand};
use serde::Serialize;
use serde_json::Value;

use courier::defaults::{self, CourierConfig, Defaults};

use super::CmdResult;

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommand,
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Display configuration (file merged over built-in defaults)
    Show {
        /// Show only built-in defaults (ignore courier.json)
        #[arg(long)]
        builtin: bool,
        /// Apply COURIER_* environment overrides
        #[arg(long, conflicts_with = "builtin")]
        resolved: bool,
    },
    /// Set an existing configuration value at a JSON pointer path
    Set {
        /// JSON pointer path (e.g., /defaults/cache/maxCachedArtifacts)
        pointer: String,
        /// Value to set (JSON)
        value: String,
    },
    /// Reset configuration to built-in defaults (deletes courier.json)
    Reset,
    /// Show the path to courier.json
    Path,
}

#[derive(Debug, Serialize)]
pub struct ConfigOutput {
    command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    config: Option<CourierConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    defaults: Option<Defaults>,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    exists: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    deleted: Option<bool>,
}

impl ConfigOutput {
    fn new(command: &str) -> Self {
        Self {
            command: command.to_string(),
            config: None,
            defaults: None,
            path: None,
            exists: None,
            deleted: None,
        }
    }
}

pub fn run(args: ConfigArgs, _global: &crate::commands::GlobalArgs) -> CmdResult<ConfigOutput> {
    match args.command {
        ConfigCommand::Show { builtin, resolved } => show(builtin, resolved),
        ConfigCommand::Set { pointer, value } => set(&pointer, &value),
        ConfigCommand::Reset => reset(),
        ConfigCommand::Path => path(),
    }
}

fn show(builtin: bool, resolved: bool) -> CmdResult<ConfigOutput> {
    let mut output = ConfigOutput::new("config.show");
    if builtin {
        output.defaults = Some(defaults::builtin_defaults());
    } else if resolved {
        output.defaults = Some(defaults::resolve_defaults()?);
    } else {
        output.config = Some(defaults::load_config());
    }
    Ok((output, 0))
}

fn set(pointer: &str, value_str: &str) -> CmdResult<ConfigOutput> {
    if !pointer.starts_with('/') {
        return Err(courier::Error::validation_invalid_argument(
            "pointer",
            "JSON pointer must start with '/'",
            None,
            None,
        ));
    }

    let value: Value = serde_json::from_str(value_str).map_err(|e| {
        courier::Error::validation_invalid_json(
            e,
            Some("parse value".to_string()),
            Some(value_str.chars().take(200).collect::<String>()),
        )
    })?;

    let config = defaults::load_config();
    let mut config_json = serde_json::to_value(&config).map_err(|e| {
        courier::Error::internal_unexpected(format!("Failed to serialize config: {}", e))
    })?;

    let slot = config_json.pointer_mut(pointer).ok_or_else(|| {
        courier::Error::config_invalid_value(pointer, None, "No such configuration key")
    })?;
    *slot = value;

    let config: CourierConfig = serde_json::from_value(config_json).map_err(|e| {
        courier::Error::validation_invalid_json(e, Some("deserialize config".to_string()), None)
    })?;
    defaults::save_config(&config)?;

    let mut output = ConfigOutput::new("config.set");
    output.config = Some(config);
    Ok((output, 0))
}

fn reset() -> CmdResult<ConfigOutput> {
    let deleted = defaults::reset_config()?;
    let mut output = ConfigOutput::new("config.reset");
    output.path = Some(defaults::config_path()?);
    output.deleted = Some(deleted);
    Ok((output, 0))
}

fn path() -> CmdResult<ConfigOutput> {
    let mut output = ConfigOutput::new("config.path");
    output.path = Some(defaults::config_path()?);
    output.exists = Some(defaults::config_exists());
    Ok((output, 0))
}
