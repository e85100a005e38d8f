use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use health_core::config::HealthConfig;
use health_core::system::BootCause;
use serde::Deserialize;

const DEFAULT_QUEUE_DEPTH: usize = 16;

/// Emulator settings loaded from a TOML file.
///
/// ```toml
/// boot = "ota"
/// epoch = 1700000000
///
/// [health]
/// watchdog_minutes = 5
/// ```
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct EmulatorConfig {
    /// Boot cause reported to the health service.
    pub boot: BootCause,
    /// Event queue depth between the console and the dispatcher.
    pub queue_depth: usize,
    /// Starts a virtual clock at this Unix time. Without it the host clock
    /// drives timers and `advance` adds an offset on top.
    pub epoch: Option<u64>,
    pub firmware_version: String,
    pub health: HealthConfig,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            boot: BootCause::PowerOn,
            queue_depth: DEFAULT_QUEUE_DEPTH,
            epoch: None,
            firmware_version: env!("CARGO_PKG_VERSION").to_string(),
            health: HealthConfig::DEFAULT,
        }
    }
}

impl EmulatorConfig {
    pub fn parse(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).context("invalid emulator configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("failed to load {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.queue_depth > 0, "queue_depth must be at least 1");
        self.health
            .validate()
            .context("invalid [health] section")?;
        Ok(())
    }
}
