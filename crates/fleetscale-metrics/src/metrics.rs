//! Metrics backend contract and the registry that resolves a backend for a group.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::info;

use fleetscale_state::{Group, MetricConfig};

use crate::error::{MetricsError, MetricsResult};
use crate::file_load::FileLoad;

/// Boxed future returned by [`Metrics::measure`].
pub type MeasureFuture<'a> = Pin<Box<dyn Future<Output = MetricsResult<f64>> + Send + 'a>>;

/// An instance currently allocated to a group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceAllocation {
    pub name: String,
    /// Reachable address of the instance, empty when unknown.
    pub address: String,
}

/// A source of load values for groups.
pub trait Metrics: Send + Sync {
    /// Measure the current value for a group.
    fn measure<'a>(&'a self, group_name: &'a str) -> MeasureFuture<'a>;

    /// Called once before a group's instance count changes. Backends that
    /// aggregate over instances can use it to drop stale samples.
    fn notify(&self, _group_name: &str) -> MetricsResult<()> {
        Ok(())
    }

    /// Reconfigure the backend with the group's current instances.
    fn update(&self, group_name: &str, allocations: &[ResourceAllocation]) -> MetricsResult<()>;
}

/// Hook invoked by a scaling policy when the resource count is about to change.
pub trait MetricNotifier: Send + Sync {
    fn metric_notify(&self) -> MetricsResult<()>;
}

/// Metrics backends keyed by metric type.
///
/// Built once at startup and shared read-only afterwards.
#[derive(Default, Clone)]
pub struct MetricsRegistry {
    backends: HashMap<String, Arc<dyn Metrics>>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the backend for a metric type.
    pub fn register(&mut self, metric_type: impl Into<String>, metrics: Arc<dyn Metrics>) {
        let metric_type = metric_type.into();
        info!(%metric_type, "registering metric");
        self.backends.insert(metric_type, metrics);
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, metric_type: impl Into<String>, metrics: Arc<dyn Metrics>) -> Self {
        self.register(metric_type, metrics);
        self
    }

    /// Look up the backend registered for a metric type.
    pub fn get(&self, metric_type: &str) -> MetricsResult<Arc<dyn Metrics>> {
        self.backends
            .get(metric_type)
            .cloned()
            .ok_or_else(|| MetricsError::UnknownMetric(metric_type.to_string()))
    }

    /// Resolve the backend for a group.
    ///
    /// A file-load group with its own `stats_dir` gets a dedicated
    /// [`FileLoad`]; every other group uses the backend registered for its
    /// metric type.
    pub fn resolve(&self, group: &Group) -> MetricsResult<Arc<dyn Metrics>> {
        match &group.metric {
            MetricConfig::FileLoad {
                stats_dir: Some(dir),
            } => Ok(Arc::new(FileLoad::new(dir)?)),
            _ => self.get(&group.metric_type),
        }
    }

    /// Registered metric types, sorted.
    pub fn metric_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.backends.keys().cloned().collect();
        types.sort();
        types
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetscale_state::PolicyConfig;

    struct FixedMetric(f64);

    impl Metrics for FixedMetric {
        fn measure<'a>(&'a self, _group_name: &'a str) -> MeasureFuture<'a> {
            let value = self.0;
            Box::pin(async move { Ok(value) })
        }

        fn update(&self, _group_name: &str, _allocations: &[ResourceAllocation]) -> MetricsResult<()> {
            Ok(())
        }
    }

    fn test_group(metric_type: &str, metric: MetricConfig) -> Group {
        Group {
            id: "g1".to_string(),
            name: "web".to_string(),
            base_name: "web".to_string(),
            template_name: "small".to_string(),
            metric_type: metric_type.to_string(),
            policy: PolicyConfig::default(),
            metric,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[tokio::test]
    async fn get_returns_registered_backend() {
        let registry = MetricsRegistry::new().with("load", Arc::new(FixedMetric(0.5)));

        let metrics = registry.get("load").unwrap();
        assert_eq!(metrics.measure("web").await.unwrap(), 0.5);
    }

    #[test]
    fn get_unknown_metric_fails() {
        let registry = MetricsRegistry::new();
        let err = registry.get("load").err().unwrap();
        assert_eq!(err, MetricsError::UnknownMetric("load".to_string()));
    }

    #[tokio::test]
    async fn resolve_uses_metric_type_by_default() {
        let registry = MetricsRegistry::new().with("load", Arc::new(FixedMetric(0.25)));
        let group = test_group("load", MetricConfig::FileLoad { stats_dir: None });

        let metrics = registry.resolve(&group).unwrap();
        assert_eq!(metrics.measure("web").await.unwrap(), 0.25);
    }

    #[tokio::test]
    async fn resolve_honours_group_stats_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("web"), "0.75\n").unwrap();

        let registry = MetricsRegistry::new();
        let group = test_group(
            "load",
            MetricConfig::FileLoad {
                stats_dir: Some(dir.path().to_string_lossy().into_owned()),
            },
        );

        let metrics = registry.resolve(&group).unwrap();
        assert_eq!(metrics.measure("web").await.unwrap(), 0.75);
    }

    #[test]
    fn resolve_prometheus_without_backend_fails() {
        let registry = MetricsRegistry::new();
        let group = test_group("prometheus", MetricConfig::PrometheusLoad { query: None });
        assert!(matches!(
            registry.resolve(&group),
            Err(MetricsError::UnknownMetric(_))
        ));
    }

    #[test]
    fn metric_types_sorted() {
        let registry = MetricsRegistry::new()
            .with("load", Arc::new(FixedMetric(0.0)))
            .with("cpu", Arc::new(FixedMetric(0.0)));
        assert_eq!(registry.metric_types(), vec!["cpu", "load"]);
    }
}
