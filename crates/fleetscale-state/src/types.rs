//! Domain types for the fleetscale state store.
//!
//! These types represent the persisted state of autoscale groups and the
//! history of scaling events. All types are serializable to/from JSON for
//! storage in redb tables.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{StateError, StateResult};

/// Unique identifier for an autoscale group.
pub type GroupId = String;

/// Warm-up applied when a policy does not configure one.
pub const DEFAULT_WARM_UP: Duration = Duration::from_secs(10);

static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\w[A-Za-z0-9\-]*$").expect("group name pattern"));

// ── Group ──────────────────────────────────────────────────────────

/// An independently-scaled collection of compute resources.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    /// Prefix used by resource backends when naming new instances.
    pub base_name: String,
    /// Name of the provisioning template (owned by the API layer).
    pub template_name: String,
    /// Key of the metrics backend in the registry (e.g. "load").
    pub metric_type: String,
    pub policy: PolicyConfig,
    pub metric: MetricConfig,
    /// Unix timestamp (seconds) when this group was created.
    pub created_at: u64,
    /// Unix timestamp (seconds) when this group was last updated.
    pub updated_at: u64,
}

impl Group {
    /// Short name of the policy variant ("value" or "rule_based").
    pub fn policy_type(&self) -> &'static str {
        match self.policy {
            PolicyConfig::Value { .. } => "value",
            PolicyConfig::RuleBased { .. } => "rule_based",
        }
    }

    /// Check the group before it is written to the store.
    pub fn validate(&self) -> StateResult<()> {
        if self.id.trim().is_empty() {
            return Err(StateError::Invalid("group: empty id".to_string()));
        }
        // ':' separates the id from the timestamp in status keys.
        if self.id.contains(':') {
            return Err(StateError::Invalid(format!("group id {:?}", self.id)));
        }
        if !NAME_RE.is_match(&self.name) {
            return Err(StateError::Invalid(format!("group name {:?}", self.name)));
        }
        if !self.base_name.is_empty() && !NAME_RE.is_match(&self.base_name) {
            return Err(StateError::Invalid(format!(
                "group base name {:?}",
                self.base_name
            )));
        }
        if self.metric_type.is_empty() {
            return Err(StateError::Invalid("group: empty metric type".to_string()));
        }
        self.policy.validate()
    }
}

/// Scaling policy configuration stored with a group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PolicyConfig {
    /// Threshold policy: step up or down when the metric crosses a value.
    Value {
        scale_up_value: f64,
        scale_up_by: u32,
        scale_down_value: f64,
        scale_down_by: u32,
        /// Warm-up after a topology change (e.g., "10s").
        warm_up_duration: String,
    },
    /// Interval rule table: first matching (count, metric) rule gives the step.
    RuleBased {
        rules: Vec<RuleConfig>,
        warm_up_duration: String,
    },
}

impl Default for PolicyConfig {
    fn default() -> Self {
        PolicyConfig::Value {
            scale_up_value: 0.8,
            scale_up_by: 2,
            scale_down_value: 0.2,
            scale_down_by: 1,
            warm_up_duration: "10s".to_string(),
        }
    }
}

impl PolicyConfig {
    /// The configured warm-up period, falling back to [`DEFAULT_WARM_UP`].
    pub fn warm_up(&self) -> Duration {
        let raw = match self {
            PolicyConfig::Value {
                warm_up_duration, ..
            }
            | PolicyConfig::RuleBased {
                warm_up_duration, ..
            } => warm_up_duration,
        };
        parse_duration(raw).unwrap_or(DEFAULT_WARM_UP)
    }

    fn validate(&self) -> StateResult<()> {
        let warm_up = match self {
            PolicyConfig::Value {
                scale_up_value,
                scale_down_value,
                warm_up_duration,
                ..
            } => {
                if scale_down_value >= scale_up_value {
                    return Err(StateError::Invalid(
                        "policy: scale_down_value must be less than scale_up_value".to_string(),
                    ));
                }
                warm_up_duration
            }
            PolicyConfig::RuleBased {
                warm_up_duration, ..
            } => warm_up_duration,
        };
        if parse_duration(warm_up).is_none() {
            return Err(StateError::Invalid(format!(
                "policy: warm-up duration {warm_up:?}"
            )));
        }
        Ok(())
    }
}

/// One row of a rule-based policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuleConfig {
    pub count_lower: i64,
    pub count_upper: i64,
    /// Signed change applied to the resource count when the rule matches.
    pub step: i64,
    pub metric_lower: f64,
    pub metric_upper: f64,
}

/// Per-group metric source configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MetricConfig {
    /// Load values read from `<stats_dir>/<group name>`.
    FileLoad { stats_dir: Option<String> },
    /// Average node load queried from Prometheus.
    PrometheusLoad { query: Option<String> },
}

impl Default for MetricConfig {
    fn default() -> Self {
        MetricConfig::FileLoad { stats_dir: None }
    }
}

// ── Status ────────────────────────────────────────────────────────

/// A recorded scaling event for a group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroupStatus {
    pub group_id: GroupId,
    /// Signed change in resource count.
    pub delta: i64,
    /// Resource count after the change.
    pub total: u32,
    /// Unix timestamp in milliseconds.
    pub created_at: u64,
}

impl GroupStatus {
    /// Build the composite key for the group status table. `seq` separates
    /// statuses of one group recorded in the same millisecond.
    pub fn table_key(&self, seq: u32) -> String {
        format!("{}:{:020}:{:010}", self.group_id, self.created_at, seq)
    }
}

/// Parse a duration string like "250ms", "30s", "5m", "1h" or bare seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.trim().parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.trim().parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        scaled_secs(mins, 60)
    } else if let Some(hours) = s.strip_suffix('h') {
        scaled_secs(hours, 3600)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}

fn scaled_secs(value: &str, unit: u64) -> Option<Duration> {
    let value = value.trim().parse::<u64>().ok()?;
    value.checked_mul(unit).map(Duration::from_secs)
}
