//! Check — one scaling decision for one group.
//!
//! Loads the group, measures its metric, asks the group's policy for a new
//! count and drives the resource backend to it. After a topology change the
//! metrics backend is told about the new instances and the check waits out
//! the policy's warm-up before reporting. Nothing is retried.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use fleetscale_metrics::{MetricNotifier, Metrics, MetricsRegistry, MetricsResult};
use fleetscale_scheduler::{ActionError, ActionOutcome, ActionStatus, GroupAction};
use fleetscale_state::{Group, PolicyConfig, Repository};

use crate::policy::{Policy, build_policy};
use crate::resource::ResourceManagerFactory;

/// A built policy and the configuration it came from.
struct CachedPolicy {
    config: PolicyConfig,
    policy: Arc<dyn Policy>,
}

struct Inner {
    repo: Arc<dyn Repository>,
    resources: Arc<dyn ResourceManagerFactory>,
    metrics: MetricsRegistry,
    /// group id → policy, so one group's decisions share one lock.
    policies: Mutex<HashMap<String, CachedPolicy>>,
}

/// The scheduler's scaling action. Clones share the policy cache.
#[derive(Clone)]
pub struct Check {
    inner: Arc<Inner>,
}

impl Check {
    pub fn new(
        repo: Arc<dyn Repository>,
        resources: Arc<dyn ResourceManagerFactory>,
        metrics: MetricsRegistry,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                repo,
                resources,
                metrics,
                policies: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Run one scaling decision for `group_id` to completion.
    pub async fn scale(&self, group_id: &str) -> Result<ActionOutcome, ActionError> {
        let group = self.inner.repo.get_group(group_id).map_err(|e| {
            if e.is_not_found() {
                self.forget(group_id);
                ActionError::GroupNotFound(group_id.to_string())
            } else {
                ActionError::Repository(e.to_string())
            }
        })?;

        let resource = self
            .inner
            .resources
            .resource_for(&group)
            .map_err(|e| ActionError::Resource(e.to_string()))?;
        let metrics = self
            .inner
            .metrics
            .resolve(&group)
            .map_err(|e| ActionError::Resource(e.to_string()))?;
        let policy = self.policy_for(&group)?;

        let value = metrics
            .measure(&group.name)
            .await
            .map_err(|e| ActionError::Measure(e.to_string()))?;
        let count = resource
            .count()
            .await
            .map_err(|e| ActionError::Resource(e.to_string()))?;

        let notifier = GroupNotifier {
            group: &group,
            metrics: metrics.as_ref(),
        };
        let new_count = policy.scale(&notifier, count, value);
        let delta = i64::from(new_count) - i64::from(count);
        debug!(group_id = %group.id, value, count, new_count, "policy evaluated");

        let changed = resource
            .scale(&group, delta)
            .await
            .map_err(|e| ActionError::Scale(e.to_string()))?;

        if changed {
            info!(
                group_id = %group.id,
                metric = %group.metric_type,
                value,
                new_count,
                delta,
                "group changed"
            );

            let allocations = resource
                .allocated()
                .await
                .map_err(|e| ActionError::Resource(e.to_string()))?;
            metrics
                .update(&group.name, &allocations)
                .map_err(|e| ActionError::MetricNotify(e.to_string()))?;

            let warm_up = policy.warm_up();
            info!(group_id = %group.id, ?warm_up, "waiting for new resources to warm up");
            tokio::time::sleep(warm_up).await;
            debug!(group_id = %group.id, "warm up finished");
        }

        Ok(ActionOutcome {
            delta,
            count: new_count,
        })
    }

    /// Drop the cached policy of a group that no longer exists.
    fn forget(&self, group_id: &str) {
        let mut policies = self
            .inner
            .policies
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        if policies.remove(group_id).is_some() {
            debug!(%group_id, "cached policy dropped");
        }
    }

    /// The cached policy for a group, rebuilt when its configuration changed.
    fn policy_for(&self, group: &Group) -> Result<Arc<dyn Policy>, ActionError> {
        let mut policies = self
            .inner
            .policies
            .lock()
            .unwrap_or_else(|e| e.into_inner());

        if let Some(cached) = policies
            .get(&group.id)
            .filter(|cached| cached.config == group.policy)
        {
            return Ok(Arc::clone(&cached.policy));
        }

        let policy: Arc<dyn Policy> = Arc::from(
            build_policy(&group.policy).map_err(|e| ActionError::Policy(e.to_string()))?,
        );
        debug!(group_id = %group.id, policy = group.policy_type(), "policy built");
        policies.insert(
            group.id.clone(),
            CachedPolicy {
                config: group.policy.clone(),
                policy: Arc::clone(&policy),
            },
        );
        Ok(policy)
    }
}

impl GroupAction for Check {
    fn perform(&self, group_id: &str) -> ActionStatus {
        let (reporter, status) = ActionStatus::channel();
        let check = self.clone();
        let group_id = group_id.to_string();
        tokio::spawn(async move {
            reporter.complete(check.scale(&group_id).await);
        });
        status
    }
}

/// Forwards a policy's count-change announcement to the group's metrics backend.
struct GroupNotifier<'a> {
    group: &'a Group,
    metrics: &'a dyn Metrics,
}

impl MetricNotifier for GroupNotifier<'_> {
    fn metric_notify(&self) -> MetricsResult<()> {
        debug!(group_id = %self.group.id, "count change announced");
        self.metrics.notify(&self.group.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    use fleetscale_metrics::{FileLoad, MeasureFuture, Metrics, MetricsError, ResourceAllocation};
    use fleetscale_state::{MetricConfig, RuleConfig, StateStore};

    use crate::error::ResourceError;
    use crate::resource::{LocalResourceFactory, ResourceFuture, ResourceManager};

    fn test_group(policy: PolicyConfig) -> Group {
        Group {
            id: "id".to_string(),
            name: "test-group".to_string(),
            base_name: "test-group".to_string(),
            template_name: "small".to_string(),
            metric_type: "load".to_string(),
            policy,
            metric: MetricConfig::FileLoad { stats_dir: None },
            created_at: 0,
            updated_at: 0,
        }
    }

    fn value_policy(warm_up: &str) -> PolicyConfig {
        PolicyConfig::Value {
            scale_up_value: 0.8,
            scale_up_by: 2,
            scale_down_value: 0.2,
            scale_down_by: 1,
            warm_up_duration: warm_up.to_string(),
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        store: StateStore,
        resources: LocalResourceFactory,
        check: Check,
    }

    async fn fixture(load: &str, policy: PolicyConfig, initial: i64) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("test-group"), load).unwrap();

        let store = StateStore::open_in_memory().unwrap();
        let group = test_group(policy);
        store.put_group(&group).unwrap();

        let resources = LocalResourceFactory::new();
        resources.local(&group.id).scale(&group, initial).await.unwrap();

        let registry = MetricsRegistry::new().with("load", Arc::new(FileLoad::new(dir.path()).unwrap()));
        let check = Check::new(
            Arc::new(store.clone()),
            Arc::new(resources.clone()),
            registry,
        );
        Fixture {
            _dir: dir,
            store,
            resources,
            check,
        }
    }

    #[tokio::test]
    async fn scales_by_measured_load() {
        let cases = [("0.5", 0, 3), ("0.1", -1, 2), ("0.8", 2, 5)];

        for (load, delta, count) in cases {
            let f = fixture(load, value_policy("0s"), 3).await;
            let outcome = f.check.scale("id").await.unwrap();

            assert_eq!(outcome.delta, delta, "load {load}");
            assert_eq!(outcome.count, count, "load {load}");
            assert_eq!(f.resources.local("id").count().await.unwrap(), count);
        }
    }

    #[tokio::test]
    async fn unknown_group() {
        let f = fixture("0.5", value_policy("0s"), 3).await;
        assert_eq!(
            f.check.scale("missing").await,
            Err(ActionError::GroupNotFound("missing".into()))
        );
    }

    #[tokio::test]
    async fn missing_metric_file_is_measure_error() {
        let f = fixture("0.5", value_policy("0s"), 3).await;
        let mut group = f.store.get_group("id").unwrap().unwrap();
        group.name = "other-group".to_string();
        f.store.put_group(&group).unwrap();

        assert!(matches!(
            f.check.scale("id").await,
            Err(ActionError::Measure(_))
        ));
    }

    #[tokio::test]
    async fn unregistered_metric_is_resource_error() {
        let f = fixture("0.5", value_policy("0s"), 3).await;
        let mut group = f.store.get_group("id").unwrap().unwrap();
        group.metric_type = "prometheus".to_string();
        group.metric = MetricConfig::PrometheusLoad { query: None };
        f.store.put_group(&group).unwrap();

        assert!(matches!(
            f.check.scale("id").await,
            Err(ActionError::Resource(_))
        ));
    }

    #[tokio::test]
    async fn overlapping_rules_are_policy_error() {
        let rule = RuleConfig {
            count_lower: 0,
            count_upper: 5,
            step: 1,
            metric_lower: 0.0,
            metric_upper: 1.0,
        };
        let policy = PolicyConfig::RuleBased {
            rules: vec![rule.clone(), rule],
            warm_up_duration: "0s".into(),
        };
        let f = fixture("0.5", policy, 3).await;

        assert!(matches!(
            f.check.scale("id").await,
            Err(ActionError::Policy(_))
        ));
    }

    #[tokio::test]
    async fn rule_policy_group() {
        let policy = PolicyConfig::RuleBased {
            rules: vec![RuleConfig {
                count_lower: 0,
                count_upper: 10,
                step: 3,
                metric_lower: 0.5,
                metric_upper: 1.0,
            }],
            warm_up_duration: "0s".into(),
        };
        let f = fixture("0.6", policy, 1).await;

        let outcome = f.check.scale("id").await.unwrap();
        assert_eq!(outcome, ActionOutcome { delta: 3, count: 4 });
    }

    #[tokio::test]
    async fn waits_for_warm_up_after_change() {
        let f = fixture("0.9", value_policy("50ms"), 1).await;

        let started = Instant::now();
        f.check.scale("id").await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn no_warm_up_without_change() {
        let f = fixture("0.5", value_policy("1h"), 1).await;

        let outcome = tokio::time::timeout(Duration::from_secs(1), f.check.scale("id"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome.delta, 0);
    }

    #[tokio::test]
    async fn policy_cached_until_config_changes() {
        let f = fixture("0.5", value_policy("0s"), 3).await;
        let group = f.store.get_group("id").unwrap().unwrap();

        let first = f.check.policy_for(&group).unwrap();
        let again = f.check.policy_for(&group).unwrap();
        assert!(Arc::ptr_eq(&first, &again));

        let mut changed = group.clone();
        changed.policy = value_policy("5s");
        let rebuilt = f.check.policy_for(&changed).unwrap();
        assert!(!Arc::ptr_eq(&first, &rebuilt));
        assert_eq!(rebuilt.warm_up(), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn perform_reports_through_status() {
        let f = fixture("0.1", value_policy("0s"), 3).await;

        let outcome = f
            .check
            .perform("id")
            .wait(Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(outcome, ActionOutcome { delta: -1, count: 2 });
    }

    // ── Failing backends ──────────────────────────────────────────

    struct BrokenResource;

    impl ResourceManager for BrokenResource {
        fn count(&self) -> ResourceFuture<'_, u32> {
            Box::pin(async { Ok(1) })
        }

        fn scale<'a>(&'a self, _group: &'a Group, _delta: i64) -> ResourceFuture<'a, bool> {
            Box::pin(async { Err(ResourceError::Backend("quota exceeded".into())) })
        }

        fn allocated(&self) -> ResourceFuture<'_, Vec<ResourceAllocation>> {
            Box::pin(async { Ok(Vec::new()) })
        }
    }

    struct BrokenFactory;

    impl ResourceManagerFactory for BrokenFactory {
        fn resource_for(&self, _group: &Group) -> Result<Arc<dyn ResourceManager>, ResourceError> {
            Ok(Arc::new(BrokenResource))
        }
    }

    struct StuckMetric;

    impl Metrics for StuckMetric {
        fn measure<'a>(&'a self, _group_name: &'a str) -> MeasureFuture<'a> {
            Box::pin(async { Ok(0.9) })
        }

        fn update(&self, group_name: &str, _allocations: &[ResourceAllocation]) -> MetricsResult<()> {
            Err(MetricsError::Update {
                group: group_name.to_string(),
                reason: "reload failed".into(),
            })
        }
    }

    /// Fixed load that counts change announcements.
    struct RecordingMetric {
        value: f64,
        notifies: AtomicUsize,
    }

    impl RecordingMetric {
        fn new(value: f64) -> Arc<Self> {
            Arc::new(Self {
                value,
                notifies: AtomicUsize::new(0),
            })
        }

        fn notifies(&self) -> usize {
            self.notifies.load(Ordering::SeqCst)
        }
    }

    impl Metrics for RecordingMetric {
        fn measure<'a>(&'a self, _group_name: &'a str) -> MeasureFuture<'a> {
            Box::pin(async move { Ok(self.value) })
        }

        fn notify(&self, group_name: &str) -> MetricsResult<()> {
            assert_eq!(group_name, "test-group");
            self.notifies.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn update(&self, _group_name: &str, _allocations: &[ResourceAllocation]) -> MetricsResult<()> {
            Ok(())
        }
    }

    fn store_with_group() -> StateStore {
        let store = StateStore::open_in_memory().unwrap();
        store.put_group(&test_group(value_policy("0s"))).unwrap();
        store
    }

    #[tokio::test]
    async fn scale_failure() {
        let check = Check::new(
            Arc::new(store_with_group()),
            Arc::new(BrokenFactory),
            MetricsRegistry::new().with("load", Arc::new(StuckMetric)),
        );
        assert_eq!(
            check.scale("id").await,
            Err(ActionError::Scale(
                "resource backend error: quota exceeded".into()
            ))
        );
    }

    #[tokio::test]
    async fn metric_update_failure() {
        let check = Check::new(
            Arc::new(store_with_group()),
            Arc::new(LocalResourceFactory::new()),
            MetricsRegistry::new().with("load", Arc::new(StuckMetric)),
        );
        assert!(matches!(
            check.scale("id").await,
            Err(ActionError::MetricNotify(_))
        ));
    }

    #[tokio::test]
    async fn backend_notified_once_per_count_change() {
        let cases = [(0.9, 1), (0.1, 1), (0.5, 0)];

        for (value, expected) in cases {
            let metric = RecordingMetric::new(value);
            let resources = LocalResourceFactory::new();
            let group = test_group(value_policy("0s"));
            resources.local(&group.id).scale(&group, 3).await.unwrap();
            let check = Check::new(
                Arc::new(store_with_group()),
                Arc::new(resources),
                MetricsRegistry::new().with("load", metric.clone()),
            );

            check.scale("id").await.unwrap();
            assert_eq!(metric.notifies(), expected, "load {value}");
        }
    }

    #[tokio::test]
    async fn deleted_group_policy_is_dropped() {
        let f = fixture("0.5", value_policy("0s"), 3).await;
        f.check.scale("id").await.unwrap();
        assert_eq!(f.check.inner.policies.lock().unwrap().len(), 1);

        f.store.delete_group("id").unwrap();
        assert_eq!(
            f.check.scale("id").await,
            Err(ActionError::GroupNotFound("id".into()))
        );
        assert!(f.check.inner.policies.lock().unwrap().is_empty());
    }
}
