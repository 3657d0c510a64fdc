//! Group definitions written by operators.
//!
//! ```toml
//! id = "web"
//! name = "web"
//! metric_type = "load"
//!
//! [policy]
//! type = "value"
//! scale_up_value = 0.8
//! scale_up_by = 2
//! scale_down_value = 0.2
//! scale_down_by = 1
//! warm_up_duration = "30s"
//! ```

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Context;
use serde::Deserialize;

use fleetscale_state::{Group, MetricConfig, PolicyConfig, StateStore};

#[derive(Debug, Clone, Deserialize)]
pub struct GroupFile {
    pub id: String,
    pub name: String,
    /// Defaults to `name`.
    pub base_name: Option<String>,
    #[serde(default)]
    pub template_name: String,
    #[serde(default = "default_metric_type")]
    pub metric_type: String,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub metric: MetricConfig,
}

fn default_metric_type() -> String {
    "load".to_string()
}

impl GroupFile {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading group file {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing group file {}", path.display()))
    }

    /// Convert to a stored group, keeping the creation time of an existing one.
    pub fn into_group(self, existing: Option<&Group>) -> Group {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        Group {
            base_name: self.base_name.unwrap_or_else(|| self.name.clone()),
            id: self.id,
            name: self.name,
            template_name: self.template_name,
            metric_type: self.metric_type,
            policy: self.policy,
            metric: self.metric,
            created_at: existing.map(|g| g.created_at).unwrap_or(now),
            updated_at: now,
        }
    }

    /// Validate and store the group. Returns the stored record.
    pub fn apply(self, store: &StateStore) -> anyhow::Result<Group> {
        let existing = store.get_group(&self.id)?;
        let group = self.into_group(existing.as_ref());
        store.put_group(&group)?;
        Ok(group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_file_gets_defaults() {
        let file: GroupFile = toml::from_str("id = \"g1\"\nname = \"web\"\n").unwrap();
        let group = file.into_group(None);

        assert_eq!(group.base_name, "web");
        assert_eq!(group.metric_type, "load");
        assert_eq!(group.policy, PolicyConfig::default());
        assert_eq!(group.metric, MetricConfig::FileLoad { stats_dir: None });
        assert_eq!(group.created_at, group.updated_at);
    }

    #[test]
    fn rule_based_policy() {
        let file: GroupFile = toml::from_str(
            r#"
id = "g1"
name = "web"

[policy]
type = "rule_based"
warm_up_duration = "5s"

[[policy.rules]]
count_lower = 0
count_upper = 5
step = 1
metric_lower = 0.7
metric_upper = 1.0
"#,
        )
        .unwrap();

        let group = file.into_group(None);
        assert_eq!(group.policy_type(), "rule_based");
    }

    #[test]
    fn apply_keeps_created_at() {
        let store = StateStore::open_in_memory().unwrap();
        let mut first = toml::from_str::<GroupFile>("id = \"g1\"\nname = \"web\"\n")
            .unwrap()
            .into_group(None);
        first.created_at = 42;
        store.put_group(&first).unwrap();

        let file: GroupFile = toml::from_str("id = \"g1\"\nname = \"web-2\"\n").unwrap();
        let stored = file.apply(&store).unwrap();

        assert_eq!(stored.created_at, 42);
        assert_eq!(store.get_group("g1").unwrap().unwrap().name, "web-2");
    }

    #[test]
    fn apply_rejects_invalid_name() {
        let store = StateStore::open_in_memory().unwrap();
        let file: GroupFile = toml::from_str("id = \"g1\"\nname = \"-web\"\n").unwrap();
        assert!(file.apply(&store).is_err());
    }
}
