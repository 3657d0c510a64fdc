//! Scaling policies.
//!
//! A policy maps the current resource count and metric value to a new
//! count. When the count is about to change it fires the group's
//! [`MetricNotifier`] exactly once. Calls on one policy instance are
//! serialized.

use std::cmp::Ordering;
use std::sync::Mutex;
use std::time::Duration;

use tracing::{debug, warn};

use fleetscale_metrics::MetricNotifier;
use fleetscale_state::PolicyConfig;

use crate::error::PolicyError;
use crate::scale_rule::ScaleRuleSet;

/// Decides how many resources a group should have.
pub trait Policy: Send + Sync {
    /// New resource count for `value` at `current` resources. Never negative.
    fn scale(&self, notifier: &dyn MetricNotifier, current: u32, value: f64) -> u32;

    /// How long to let new resources settle after a topology change.
    fn warm_up(&self) -> Duration;
}

fn notify(notifier: &dyn MetricNotifier, current: u32, new_count: u32) {
    if new_count == current {
        return;
    }
    if let Err(e) = notifier.metric_notify() {
        warn!(current, new_count, error = %e, "metric notify failed");
    }
}

// ── Value policy ────────────────────────────────────────────────

/// Threshold policy: scale down at or below one value, up at or above another.
#[derive(Debug)]
pub struct ValuePolicy {
    scale_up_value: f64,
    scale_up_by: u32,
    scale_down_value: f64,
    scale_down_by: u32,
    warm_up: Duration,
    lock: Mutex<()>,
}

impl ValuePolicy {
    /// Fails unless `scale_down_value < scale_up_value`.
    pub fn new(
        scale_up_value: f64,
        scale_up_by: u32,
        scale_down_value: f64,
        scale_down_by: u32,
    ) -> Result<Self, PolicyError> {
        if scale_down_value.partial_cmp(&scale_up_value) != Some(Ordering::Less) {
            return Err(PolicyError::InvalidThresholds {
                down: scale_down_value,
                up: scale_up_value,
            });
        }
        Ok(Self {
            scale_up_value,
            scale_up_by,
            scale_down_value,
            scale_down_by,
            warm_up: Duration::ZERO,
            lock: Mutex::new(()),
        })
    }

    pub fn with_warm_up(mut self, warm_up: Duration) -> Self {
        self.warm_up = warm_up;
        self
    }
}

impl Policy for ValuePolicy {
    fn scale(&self, notifier: &dyn MetricNotifier, current: u32, value: f64) -> u32 {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());

        let new_count = if value <= self.scale_down_value {
            current.saturating_sub(self.scale_down_by)
        } else if value >= self.scale_up_value {
            current.saturating_add(self.scale_up_by)
        } else {
            current
        };

        debug!(current, value, new_count, "value policy evaluated");
        notify(notifier, current, new_count);
        new_count
    }

    fn warm_up(&self) -> Duration {
        self.warm_up
    }
}

// ── Rule policy ─────────────────────────────────────────────────

/// Applies the step of the first matching rule in a [`ScaleRuleSet`].
#[derive(Debug)]
pub struct RulePolicy {
    rules: ScaleRuleSet,
    warm_up: Duration,
    lock: Mutex<()>,
}

impl RulePolicy {
    pub fn new(rules: ScaleRuleSet) -> Self {
        Self {
            rules,
            warm_up: Duration::ZERO,
            lock: Mutex::new(()),
        }
    }

    pub fn with_warm_up(mut self, warm_up: Duration) -> Self {
        self.warm_up = warm_up;
        self
    }
}

impl Policy for RulePolicy {
    fn scale(&self, notifier: &dyn MetricNotifier, current: u32, value: f64) -> u32 {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());

        let step = self.rules.find_action(i64::from(current), value);
        let target = (i64::from(current) + step).clamp(0, i64::from(u32::MAX));
        let new_count = u32::try_from(target).unwrap_or(u32::MAX);

        debug!(current, value, step, new_count, "rule policy evaluated");
        notify(notifier, current, new_count);
        new_count
    }

    fn warm_up(&self) -> Duration {
        self.warm_up
    }
}

/// Build the policy described by a group's configuration.
pub fn build_policy(config: &PolicyConfig) -> Result<Box<dyn Policy>, PolicyError> {
    let warm_up = config.warm_up();
    match config {
        PolicyConfig::Value {
            scale_up_value,
            scale_up_by,
            scale_down_value,
            scale_down_by,
            ..
        } => {
            let policy =
                ValuePolicy::new(*scale_up_value, *scale_up_by, *scale_down_value, *scale_down_by)?
                    .with_warm_up(warm_up);
            Ok(Box::new(policy))
        }
        PolicyConfig::RuleBased { rules, .. } => {
            let mut set = ScaleRuleSet::new();
            for rule in rules {
                set.add_rule(
                    rule.count_lower,
                    rule.count_upper,
                    rule.step,
                    rule.metric_lower,
                    rule.metric_upper,
                )?;
            }
            Ok(Box::new(RulePolicy::new(set).with_warm_up(warm_up)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetscale_metrics::{MetricsError, MetricsResult};
    use fleetscale_state::RuleConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingNotifier {
        calls: AtomicUsize,
    }

    impl MetricNotifier for CountingNotifier {
        fn metric_notify(&self) -> MetricsResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingNotifier;

    impl MetricNotifier for FailingNotifier {
        fn metric_notify(&self) -> MetricsResult<()> {
            Err(MetricsError::Update {
                group: "web".into(),
                reason: "down".into(),
            })
        }
    }

    fn standard() -> ValuePolicy {
        ValuePolicy::new(0.8, 2, 0.2, 1).unwrap()
    }

    #[test]
    fn value_policy_decisions() {
        let policy = standard();
        let notifier = CountingNotifier::default();

        assert_eq!(policy.scale(&notifier, 5, 0.5), 5);
        assert_eq!(policy.scale(&notifier, 5, 0.1), 4);
        assert_eq!(policy.scale(&notifier, 5, 0.8), 7);
        assert_eq!(policy.scale(&notifier, 1, 0.1), 0);
    }

    #[test]
    fn value_policy_never_negative() {
        let policy = ValuePolicy::new(0.8, 1, 0.2, 10).unwrap();
        let notifier = CountingNotifier::default();

        assert_eq!(policy.scale(&notifier, 3, 0.0), 0);
        assert_eq!(policy.scale(&notifier, 0, 0.2), 0);
    }

    #[test]
    fn dead_zone_does_not_notify() {
        let policy = standard();
        let notifier = CountingNotifier::default();

        assert_eq!(policy.scale(&notifier, 5, 0.5), 5);
        assert_eq!(policy.scale(&notifier, 5, 0.21), 5);
        assert_eq!(notifier.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn change_notifies_once() {
        let policy = standard();
        let notifier = CountingNotifier::default();

        policy.scale(&notifier, 5, 0.9);
        assert_eq!(notifier.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn floored_at_zero_without_change_does_not_notify() {
        let policy = standard();
        let notifier = CountingNotifier::default();

        assert_eq!(policy.scale(&notifier, 0, 0.1), 0);
        assert_eq!(notifier.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn notify_failure_does_not_change_decision() {
        let policy = standard();
        assert_eq!(policy.scale(&FailingNotifier, 5, 0.9), 7);
    }

    #[test]
    fn value_policy_rejects_inverted_thresholds() {
        assert!(matches!(
            ValuePolicy::new(0.2, 1, 0.8, 1),
            Err(PolicyError::InvalidThresholds { .. })
        ));
        assert!(ValuePolicy::new(0.5, 1, 0.5, 1).is_err());
    }

    #[test]
    fn rule_policy_applies_step() {
        let mut rules = ScaleRuleSet::new();
        rules.add_rule(0, 10, 3, 0.7, 1.0).unwrap();
        rules.add_rule(0, 10, -2, 0.0, 0.3).unwrap();
        let policy = RulePolicy::new(rules);
        let notifier = CountingNotifier::default();

        assert_eq!(policy.scale(&notifier, 4, 0.9), 7);
        assert_eq!(policy.scale(&notifier, 1, 0.1), 0);
        assert_eq!(policy.scale(&notifier, 4, 0.5), 4);
        assert_eq!(notifier.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn build_value_policy_from_config() {
        let config = PolicyConfig::Value {
            scale_up_value: 0.8,
            scale_up_by: 2,
            scale_down_value: 0.2,
            scale_down_by: 1,
            warm_up_duration: "30s".into(),
        };
        let policy = build_policy(&config).unwrap();
        assert_eq!(policy.warm_up(), Duration::from_secs(30));
        assert_eq!(policy.scale(&CountingNotifier::default(), 5, 0.9), 7);
    }

    #[test]
    fn build_rule_policy_from_config() {
        let config = PolicyConfig::RuleBased {
            rules: vec![
                RuleConfig {
                    count_lower: 0,
                    count_upper: 5,
                    step: 1,
                    metric_lower: 0.5,
                    metric_upper: 1.0,
                },
                RuleConfig {
                    count_lower: 3,
                    count_upper: 8,
                    step: 2,
                    metric_lower: 0.6,
                    metric_upper: 0.9,
                },
            ],
            warm_up_duration: "1s".into(),
        };
        assert!(matches!(
            build_policy(&config),
            Err(PolicyError::Overlap(_))
        ));
    }

    #[test]
    fn concurrent_scale_calls() {
        let policy = std::sync::Arc::new(standard());
        let notifier = std::sync::Arc::new(CountingNotifier::default());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let policy = policy.clone();
                let notifier = notifier.clone();
                std::thread::spawn(move || policy.scale(notifier.as_ref(), 5, 0.9))
            })
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap(), 7);
        }
        assert_eq!(notifier.calls.load(Ordering::SeqCst), 8);
    }
}
