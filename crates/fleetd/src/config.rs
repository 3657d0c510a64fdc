//! fleetd.toml configuration.
//!
//! Every field has a default, so an empty or missing file gives a working
//! daemon. Durations use the group-config syntax ("250ms", "5s", "60m").

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};

use fleetscale_state::parse_duration;

/// Value of `reschedule_after` that turns periodic re-evaluation off.
pub const RESCHEDULE_OFF: &str = "off";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FleetConfig {
    /// Time between monitor reconciliations.
    pub monitor_interval: String,
    /// How long an action may run before its group is disabled.
    pub action_timeout: String,
    /// Delay before a finished group is checked again, or "off".
    pub reschedule_after: String,
    /// Directory holding one load file per group.
    pub stats_dir: PathBuf,
    /// Registry key of the file load backend.
    pub metric_type: String,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            monitor_interval: "5s".to_string(),
            action_timeout: "60m".to_string(),
            reschedule_after: "10s".to_string(),
            stats_dir: PathBuf::from(fleetscale_metrics::file_load::DEFAULT_STATS_DIR),
            metric_type: "load".to_string(),
        }
    }
}

impl FleetConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: FleetConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.monitor_interval()?;
        self.action_timeout()?;
        self.reschedule_after()?;
        if self.metric_type.trim().is_empty() {
            bail!("metric_type must not be empty");
        }
        Ok(())
    }

    pub fn monitor_interval(&self) -> anyhow::Result<Duration> {
        positive("monitor_interval", &self.monitor_interval)
    }

    pub fn action_timeout(&self) -> anyhow::Result<Duration> {
        positive("action_timeout", &self.action_timeout)
    }

    /// `None` when re-evaluation is off.
    pub fn reschedule_after(&self) -> anyhow::Result<Option<Duration>> {
        if self.reschedule_after.trim() == RESCHEDULE_OFF {
            return Ok(None);
        }
        positive("reschedule_after", &self.reschedule_after).map(Some)
    }
}

fn positive(field: &str, raw: &str) -> anyhow::Result<Duration> {
    match parse_duration(raw) {
        Some(d) if !d.is_zero() => Ok(d),
        Some(_) => bail!("{field} must be greater than zero"),
        None => bail!("{field}: invalid duration {raw:?}"),
    }
}
