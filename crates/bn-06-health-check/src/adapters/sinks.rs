//! Report sinks: structured logs and the JSON cache file.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::domain::errors::HealthError;
use crate::domain::report::HealthCheckReport;
use crate::ports::outbound::ReportSink;

/// Items logged per failing check; the rest are counted.
const MAX_LOGGED_ITEMS: usize = 10;

#[derive(Debug, Default, Clone, Copy)]
pub struct LogReportSink;

#[async_trait]
impl ReportSink for LogReportSink {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn publish(&self, report: &HealthCheckReport) -> Result<(), HealthError> {
        for result in report.failing() {
            for item in result.items.iter().take(MAX_LOGGED_ITEMS) {
                warn!(
                    check = %result.check,
                    subject = %item.subject,
                    detail = %item.detail,
                    "[bn-06] Health check failing"
                );
            }
            if result.items.len() > MAX_LOGGED_ITEMS {
                warn!(check = %result.check, more = result.items.len() - MAX_LOGGED_ITEMS, "[bn-06] More failing items not logged");
            }
            if let Some(error) = &result.error {
                warn!(check = %result.check, %error, "[bn-06] Health check could not run");
            }
        }
        info!(
            report_id = %report.id,
            healthy = report.is_healthy(),
            failing = report.failing().count(),
            checks = report.results.len(),
            "[bn-06] Health report"
        );
        Ok(())
    }
}

/// Writes the latest report to a JSON file, replacing it atomically.
#[derive(Debug, Clone)]
pub struct FileReportSink {
    path: PathBuf,
}

impl FileReportSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn error(&self, e: impl std::fmt::Display) -> HealthError {
        HealthError::Sink {
            sink: "file",
            message: format!("{}: {e}", self.path.display()),
        }
    }
}

#[async_trait]
impl ReportSink for FileReportSink {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn publish(&self, report: &HealthCheckReport) -> Result<(), HealthError> {
        let json = serde_json::to_vec_pretty(report).map_err(|e| self.error(e))?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.error(e))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await.map_err(|e| self.error(e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| self.error(e))?;
        Ok(())
    }
}

/// Read a cached report back.
pub async fn read_cached(path: &Path) -> Result<HealthCheckReport, HealthError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| HealthError::Sink {
        sink: "file",
        message: format!("{}: {e}", path.display()),
    })?;
    serde_json::from_slice(&bytes).map_err(|e| HealthError::Sink {
        sink: "file",
        message: format!("{}: {e}", path.display()),
    })
}
