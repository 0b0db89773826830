//! Dispatcher configuration.
//!
//! Loaded from an optional TOML file (`--config` / `WAITLIST_CONFIG`). Every
//! field has a default, so an absent file or an empty `[dispatch]` section is
//! valid.
//!
//! ```toml
//! [dispatch]
//! poll_interval_secs = 30
//! claim_limit = 100
//! reconcile = true
//! ```

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub dispatch: DispatchConfig,
}

/// The `[dispatch]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DispatchConfig {
    /// Seconds between dispatch ticks in `run` mode.
    pub poll_interval_secs: u64,
    /// Recipients a sender claims per round.
    pub claim_limit: i64,
    /// Rewrite blast counters from the ledger on every tick.
    pub reconcile: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        DispatchConfig {
            poll_interval_secs: 30,
            claim_limit: 100,
            reconcile: true,
        }
    }
}

impl DispatchConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// Parse and validate a TOML config string.
pub fn parse_toml(source: &str) -> Result<Config> {
    let config: Config = toml::from_str(source).context("invalid config TOML")?;
    validate(&config)?;
    Ok(config)
}

/// Load the config file at `path`, or defaults when no path is given.
pub fn load(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => {
            let source = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            parse_toml(&source).with_context(|| format!("loading config {}", path.display()))
        }
        None => Ok(Config::default()),
    }
}

pub fn validate(config: &Config) -> Result<()> {
    let d = &config.dispatch;
    if d.poll_interval_secs == 0 {
        anyhow::bail!("dispatch.poll_interval_secs must be positive");
    }
    if d.claim_limit <= 0 {
        anyhow::bail!("dispatch.claim_limit must be positive, got {}", d.claim_limit);
    }
    Ok(())
}
