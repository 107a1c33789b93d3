use std::io::{self, Write};

use camino::{Utf8Path, Utf8PathBuf};
use tracing::{info, warn};

use crate::error::SyncError;
use crate::pipeline::{DomainStatus, RunReport};
use crate::pool::{ProgressEvent, ProgressSink};

/// Logs one line per finished transfer.
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn event(&self, event: ProgressEvent) {
        if event.failed {
            warn!(
                "[{}/{}] {} {}",
                event.completed, event.total, event.label, event.target
            )
        } else {
            info!(
                "[{}/{}] {} {}",
                event.completed, event.total, event.label, event.target
            )
        }
    }
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn report_path(data_root: &Utf8Path, rank: usize) -> Utf8PathBuf {
        data_root.join(format!("run_report_rank{rank}.json"))
    }

    pub fn write_report(data_root: &Utf8Path, report: &RunReport) -> Result<Utf8PathBuf, SyncError> {
        let path = Self::report_path(data_root, report.rank);
        let json = serde_json::to_vec_pretty(report)
            .map_err(|err| SyncError::Filesystem(err.to_string()))?;
        let mut temp = tempfile::Builder::new()
            .prefix(".report")
            .tempfile_in(data_root.as_std_path())
            .map_err(|err| SyncError::Filesystem(err.to_string()))?;
        temp.write_all(&json)
            .map_err(|err| SyncError::Filesystem(err.to_string()))?;
        temp.persist(path.as_std_path())
            .map_err(|err| SyncError::Filesystem(err.to_string()))?;
        Ok(path)
    }
}

pub fn print_summary(report: &RunReport) -> io::Result<()> {
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "worker {}/{} summary", report.rank, report.size)?;
    for failure in &report.catalog_failures {
        writeln!(stdout, "  catalog {}: {}", failure.domain, failure.reason)?;
    }
    for domain in &report.domains {
        match &domain.status {
            DomainStatus::Completed => writeln!(
                stdout,
                "  {:<10} rows {}..{} of {}: {} downloaded, {} skipped, {} failed, {} unavailable",
                domain.domain,
                domain.partition.start,
                domain.partition.end,
                domain.selected_rows,
                domain.succeeded,
                domain.skipped,
                domain.failed,
                domain.unavailable
            )?,
            DomainStatus::CatalogMissing => {
                writeln!(stdout, "  {:<10} skipped: catalog not found", domain.domain)?
            }
            DomainStatus::CatalogInvalid { reason } => {
                writeln!(stdout, "  {:<10} skipped: {reason}", domain.domain)?
            }
            DomainStatus::OutputUnavailable { reason } => {
                writeln!(stdout, "  {:<10} skipped: {reason}", domain.domain)?
            }
        }
    }
    Ok(())
}
