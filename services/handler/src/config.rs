//! Handler configuration.
//!
//! Two files in the working directory drive the handler: `config.json`
//! (bus endpoint, shared token, timings) and `templates.json` (the
//! template catalogue). Timing values of zero fall back to the defaults.

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::warn;

use crate::template::Template;

/// Main config file name, relative to the working directory.
pub const CONFIG_FILE: &str = "config.json";

/// Template catalogue file name, relative to the working directory.
pub const TEMPLATES_FILE: &str = "templates.json";

/// The main config file.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// The bus endpoint.
    pub redis: BusConfig,

    /// Lifecycle timings, in seconds.
    #[serde(default)]
    pub timings: Timings,

    /// Advertised external IP. Leave empty to discover it, or when the
    /// routing proxy runs on this node.
    #[serde(default, rename = "external")]
    pub external_ip: String,

    /// Shared channel token.
    pub token: String,
}

/// Bus endpoint credentials.
#[derive(Debug, Clone, Deserialize)]
pub struct BusConfig {
    /// Host, including port.
    #[serde(default)]
    pub host: String,

    /// Auth string; empty for an unauthenticated endpoint.
    #[serde(default)]
    pub auth: String,
}

/// Lifecycle timings. Zero means "use the default".
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct Timings {
    /// Seconds to wait for an identify before reaping.
    #[serde(default)]
    pub identify: u64,

    /// Seconds between announcing a delete and tearing down.
    #[serde(default)]
    pub destroy: u64,

    /// Seconds between droplet status reports.
    #[serde(default)]
    pub notify: u64,
}

impl Timings {
    pub fn identify_timeout(&self) -> Duration {
        Duration::from_secs(non_zero_or(self.identify, 120))
    }

    pub fn destroy_delay(&self) -> Duration {
        Duration::from_secs(non_zero_or(self.destroy, 15))
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(non_zero_or(self.notify, 60))
    }
}

fn non_zero_or(value: u64, default: u64) -> u64 {
    if value > 0 {
        value
    } else {
        default
    }
}

impl Config {
    /// Load and validate the main config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("could not read {}; does it exist?", path.display()))?;
        let config: Config = serde_json::from_str(&contents)
            .with_context(|| format!("{} is not a valid config object", path.display()))?;
        if config.token.is_empty() {
            bail!("config token must not be empty");
        }
        Ok(config)
    }
}

/// Load the template catalogue, skipping invalid entries.
pub fn load_templates(path: impl AsRef<Path>) -> Result<Vec<Template>> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("could not read {}; does it exist?", path.display()))?;
    let templates: Vec<Template> = serde_json::from_str(&contents)
        .with_context(|| format!("{} is not a valid template array", path.display()))?;

    let mut valid = Vec::with_capacity(templates.len());
    for template in templates {
        if template.is_valid() {
            valid.push(template);
        } else {
            warn!(name = %template.name, "Skipping invalid template");
        }
    }
    Ok(valid)
}
