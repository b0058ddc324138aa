use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::models::SchemaKind;

/// How entry orders are routed to the venue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryMode {
    Market,
    Limit,
}

/// Controller configuration
///
/// Defaults mirror the original deployment: 2 s poll, 12 contracts,
/// 5.0 pt target / 10.0 pt stop for the fixed-bracket schema.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Signal file written by the external generator
    #[serde(default = "default_signals_file")]
    pub signals_file: String,
    /// Append-only trade log owned by this controller
    #[serde(default = "default_trades_log_file")]
    pub trades_log_file: String,
    /// Live price file from the platform feed, drives the paper venue
    #[serde(default = "default_live_feed_file")]
    pub live_feed_file: String,
    /// Seconds between signal file checks (1-60)
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Active signal schema; the parser rejects anything else
    #[serde(default = "default_schema")]
    pub schema: SchemaKind,
    /// Contracts per entry when the signal carries no quantity plan
    #[serde(default = "default_contract_quantity")]
    pub contract_quantity: u32,
    /// Fixed-bracket target distance in points (basic schema only)
    #[serde(default = "default_profit_target_points")]
    pub profit_target_points: f64,
    /// Fixed-bracket stop distance in points (basic schema only)
    #[serde(default = "default_stop_loss_points")]
    pub stop_loss_points: f64,
    #[serde(default = "default_entry_order")]
    pub entry_order: EntryMode,
    /// Include the entry price in the dedup identity
    ///
    /// Off by default to match the source behavior, where two signals at the
    /// same timestamp and direction collide regardless of price.
    #[serde(default)]
    pub dedup_include_price: bool,
}

fn default_signals_file() -> String {
    "data/trade_signals.csv".to_string()
}

fn default_trades_log_file() -> String {
    "data/trades_taken.csv".to_string()
}

fn default_live_feed_file() -> String {
    "data/LiveFeed.csv".to_string()
}

fn default_poll_interval_secs() -> u64 {
    2
}

fn default_schema() -> SchemaKind {
    SchemaKind::SingleTarget
}

fn default_contract_quantity() -> u32 {
    12
}

fn default_profit_target_points() -> f64 {
    5.0
}

fn default_stop_loss_points() -> f64 {
    10.0
}

fn default_entry_order() -> EntryMode {
    EntryMode::Market
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            signals_file: default_signals_file(),
            trades_log_file: default_trades_log_file(),
            live_feed_file: default_live_feed_file(),
            poll_interval_secs: default_poll_interval_secs(),
            schema: default_schema(),
            contract_quantity: default_contract_quantity(),
            profit_target_points: default_profit_target_points(),
            stop_loss_points: default_stop_loss_points(),
            entry_order: default_entry_order(),
            dedup_include_price: false,
        }
    }
}

impl AppConfig {
    /// Load from an optional TOML file plus `FVGBOT_`-prefixed environment
    /// variables
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let file_source = match path {
            Some(p) => File::with_name(p),
            None => File::with_name("Fvgbot").required(false),
        };

        let config: AppConfig = Config::builder()
            .add_source(file_source)
            .add_source(Environment::with_prefix("FVGBOT"))
            .build()?
            .try_deserialize()?;

        config.validate().map_err(ConfigError::Message)?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), String> {
        if !(1..=60).contains(&self.poll_interval_secs) {
            return Err(format!(
                "poll_interval_secs must be 1-60, got {}",
                self.poll_interval_secs
            ));
        }
        if self.contract_quantity == 0 {
            return Err("contract_quantity must be at least 1".to_string());
        }
        if self.profit_target_points <= 0.0 || self.stop_loss_points <= 0.0 {
            return Err("bracket point distances must be positive".to_string());
        }
        Ok(())
    }
}
