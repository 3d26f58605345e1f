//! CLI argument definitions using clap derive

use crate::cache::{CacheNamespace, Payload};
use crate::user::UserField;
use clap::{ArgAction, Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;

/// Skycache - Versioned Shared Lookup Cache
///
/// Inspect and maintain the shared location, station and zone cache.
#[derive(Parser, Debug)]
#[command(name = "skycache")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "SKYCACHE_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show a cached entry
    Get(KeyArgs),

    /// Store an entry in the shared cache
    Put(PutArgs),

    /// Remove an entry from the shared cache
    Remove(KeyArgs),

    /// Delete expired entries
    Purge,

    /// Read or write per-user preferences
    User(UserArgs),

    /// Show or initialize configuration
    Config(ConfigArgs),
}

/// Namespace and identifier of a cache entry
#[derive(Parser, Debug)]
pub struct KeyArgs {
    /// Namespace: location, station or zone
    pub namespace: CacheNamespace,

    /// Identifier, e.g. "boulder, colorado" or "KBOU"
    pub id: String,
}

/// Arguments for the put command
#[derive(Parser, Debug)]
pub struct PutArgs {
    #[command(flatten)]
    pub key: KeyArgs,

    /// Payload as a JSON object
    #[arg(value_parser = parse_payload)]
    pub payload: Payload,

    /// Time to live in seconds (0 = never expire; default: from config)
    #[arg(long)]
    pub ttl: Option<i64>,
}

/// Arguments for the user command
#[derive(Parser, Debug)]
pub struct UserArgs {
    /// Subcommand for user
    #[command(subcommand)]
    pub action: UserAction,
}

/// User subcommands
#[derive(Subcommand, Debug)]
pub enum UserAction {
    /// Show a preference field
    Get {
        /// User identifier
        user: String,
        /// Field: location, rate, pitch or metrics
        field: UserField,
    },

    /// Set a preference field
    Set {
        /// User identifier
        user: String,
        /// Field: location, rate, pitch or metrics
        field: UserField,
        /// Value as JSON; bare text is stored as a string
        #[arg(value_parser = parse_value)]
        value: Value,
    },
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Initialize default configuration
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },
}

/// Parse a JSON object payload
fn parse_payload(s: &str) -> Result<Payload, String> {
    match serde_json::from_str::<Value>(s) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err("payload must be a JSON object".to_string()),
        Err(e) => Err(format!("invalid JSON: {e}")),
    }
}

/// Parse JSON, falling back to a plain string
fn parse_value(s: &str) -> Result<Value, String> {
    Ok(serde_json::from_str(s).unwrap_or_else(|_| Value::String(s.to_string())))
}
