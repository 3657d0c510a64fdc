//! File-backed load metric.
//!
//! Reads the current load of a group from `<stats_dir>/<group name>`. Lets
//! the autoscaler run against hand-written values with no metrics server.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{MetricsError, MetricsResult};
use crate::metrics::{MeasureFuture, Metrics, ResourceAllocation};

/// Default directory for load files.
pub const DEFAULT_STATS_DIR: &str = "/tmp";

/// Load values read from plain files, one file per group.
#[derive(Debug, Clone)]
pub struct FileLoad {
    stats_dir: PathBuf,
}

impl FileLoad {
    /// Create a file load metric rooted at `stats_dir`, which must be a directory.
    pub fn new(stats_dir: impl AsRef<Path>) -> MetricsResult<Self> {
        let stats_dir = stats_dir.as_ref();
        let meta = std::fs::metadata(stats_dir).map_err(|e| {
            MetricsError::Config(format!("unable to stat {}: {e}", stats_dir.display()))
        })?;
        if !meta.is_dir() {
            return Err(MetricsError::Config(format!(
                "{} is not a directory",
                stats_dir.display()
            )));
        }
        Ok(Self {
            stats_dir: stats_dir.to_path_buf(),
        })
    }

    pub fn stats_dir(&self) -> &Path {
        &self.stats_dir
    }
}

impl Metrics for FileLoad {
    fn measure<'a>(&'a self, group_name: &'a str) -> MeasureFuture<'a> {
        Box::pin(async move {
            let path = self.stats_dir.join(group_name);
            let raw = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| MetricsError::Measure {
                    group: group_name.to_string(),
                    reason: format!("{}: {e}", path.display()),
                })?;
            let value = raw
                .trim()
                .parse::<f64>()
                .map_err(|e| MetricsError::Measure {
                    group: group_name.to_string(),
                    reason: format!("{:?}: {e}", raw.trim()),
                })?;
            debug!(group = %group_name, value, "file load measured");
            Ok(value)
        })
    }

    fn update(&self, _group_name: &str, _allocations: &[ResourceAllocation]) -> MetricsResult<()> {
        // Values are written by hand; nothing to reconfigure.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_rejects_missing_dir() {
        let err = FileLoad::new("/definitely/not/here").unwrap_err();
        assert!(matches!(err, MetricsError::Config(_)));
    }

    #[test]
    fn new_rejects_plain_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let err = FileLoad::new(file.path()).unwrap_err();
        assert!(matches!(err, MetricsError::Config(_)));
    }

    #[tokio::test]
    async fn measure_reads_trimmed_value() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("web"), "  0.42\n").unwrap();

        let load = FileLoad::new(dir.path()).unwrap();
        assert_eq!(load.measure("web").await.unwrap(), 0.42);
    }

    #[tokio::test]
    async fn measure_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let load = FileLoad::new(dir.path()).unwrap();

        let err = load.measure("web").await.unwrap_err();
        assert!(matches!(err, MetricsError::Measure { ref group, .. } if group == "web"));
    }

    #[tokio::test]
    async fn measure_garbage_fails() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("web"), "high").unwrap();

        let load = FileLoad::new(dir.path()).unwrap();
        assert!(load.measure("web").await.is_err());
    }

    #[test]
    fn update_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let load = FileLoad::new(dir.path()).unwrap();
        let allocations = vec![ResourceAllocation {
            name: "web-1".to_string(),
            address: "10.0.0.1".to_string(),
        }];
        assert!(load.update("web", &allocations).is_ok());
    }
}
