//! Report repository
//!
//! Persists pipeline reports and other run artifacts in the shared-data
//! directory, keyed by run id.

use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;
use weave_core::domain::pipeline::PipelineReport;

use super::{ensure_dir, write_atomic};
use crate::error::{Error, Result};

/// Repository trait for run artifacts
#[async_trait]
pub trait ReportRepository: Send + Sync {
    /// Stores a pipeline report as `pipeline_report_<run_id>.json`
    async fn save_report(&self, report: &PipelineReport) -> Result<PathBuf>;

    /// Loads a previously stored report
    async fn load_report(&self, run_id: &str) -> Result<PipelineReport>;

    /// Stores an arbitrary JSON artifact under `name`
    async fn save_artifact(&self, name: &str, value: &serde_json::Value) -> Result<PathBuf>;
}

/// Filesystem implementation of ReportRepository
#[derive(Debug, Clone)]
pub struct FileReportRepository {
    shared_data_dir: PathBuf,
}

impl FileReportRepository {
    pub fn new(shared_data_dir: impl Into<PathBuf>) -> Self {
        Self {
            shared_data_dir: shared_data_dir.into(),
        }
    }

    pub fn report_path(&self, run_id: &str) -> PathBuf {
        self.shared_data_dir
            .join(format!("pipeline_report_{}.json", run_id))
    }

    async fn write_json<T: Serialize + Sync>(&self, path: &Path, value: &T) -> Result<()> {
        ensure_dir(&self.shared_data_dir).await?;
        let body = serde_json::to_vec_pretty(value)?;
        write_atomic(path, &body).await
    }
}

#[async_trait]
impl ReportRepository for FileReportRepository {
    async fn save_report(&self, report: &PipelineReport) -> Result<PathBuf> {
        let path = self.report_path(&report.run_id);
        self.write_json(&path, report).await?;
        info!("Report for run {} saved to {}", report.run_id, path.display());
        Ok(path)
    }

    async fn load_report(&self, run_id: &str) -> Result<PipelineReport> {
        let path = self.report_path(run_id);
        let raw = tokio::fs::read(&path)
            .await
            .map_err(|e| Error::io(&path, e))?;
        Ok(serde_json::from_slice(&raw)?)
    }

    async fn save_artifact(&self, name: &str, value: &serde_json::Value) -> Result<PathBuf> {
        let path = self.shared_data_dir.join(name);
        self.write_json(&path, value).await?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use weave_core::domain::pipeline::RunState;

    #[tokio::test]
    async fn test_save_and_load_report() {
        let dir = tempfile::tempdir().unwrap();
        let repository = FileReportRepository::new(dir.path().join("shared_data"));

        let report = PipelineReport {
            run_id: "abc123".to_string(),
            pipeline: "optimization".to_string(),
            state: RunState::Succeeded,
            succeeded: true,
            inputs: vec!["hero.png".to_string()],
            total_inputs: 1,
            stages: Vec::new(),
            processing_chain: vec!["analyze".to_string()],
            started_at: Utc::now(),
            completed_at: Utc::now(),
            duration_ms: 42,
        };

        let path = repository.save_report(&report).await.unwrap();
        assert!(path.ends_with("pipeline_report_abc123.json"));

        let loaded = repository.load_report("abc123").await.unwrap();
        assert_eq!(loaded, report);
    }

    #[tokio::test]
    async fn test_load_missing_report() {
        let dir = tempfile::tempdir().unwrap();
        let repository = FileReportRepository::new(dir.path());
        assert!(matches!(
            repository.load_report("nope").await,
            Err(Error::Io { .. })
        ));
    }

    #[tokio::test]
    async fn test_save_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let repository = FileReportRepository::new(dir.path().join("shared"));
        let path = repository
            .save_artifact("unified_color_system.json", &serde_json::json!({"version": "1.0.0"}))
            .await
            .unwrap();
        let raw = std::fs::read_to_string(path).unwrap();
        assert!(raw.contains("1.0.0"));
    }
}
