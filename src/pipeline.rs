use std::ops::Range;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::catalog::{self, CategoryFilter};
use crate::coordinator::WorkerIdentity;
use crate::domain::Domain;
use crate::error::SyncError;
use crate::partition::partition_range;
use crate::pool::{self, ProgressSink};
use crate::transfer::{Fetcher, Outcome};

#[derive(Debug, Clone, Serialize)]
pub struct CatalogFailure {
    pub domain: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DomainStatus {
    Completed,
    CatalogMissing,
    CatalogInvalid { reason: String },
    OutputUnavailable { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct DomainReport {
    pub domain: String,
    pub status: DomainStatus,
    pub catalog_rows: usize,
    pub selected_rows: usize,
    pub partition: Range<usize>,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub unavailable: usize,
    pub failures: Vec<Outcome>,
}

impl DomainReport {
    fn skipped_domain(domain: &Domain, status: DomainStatus) -> Self {
        Self {
            domain: domain.name.to_string(),
            status,
            catalog_rows: 0,
            selected_rows: 0,
            partition: 0..0,
            succeeded: 0,
            skipped: 0,
            failed: 0,
            unavailable: 0,
            failures: Vec::new(),
        }
    }

}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub rank: usize,
    pub size: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub catalog_failures: Vec<CatalogFailure>,
    pub domains: Vec<DomainReport>,
}

impl RunReport {
    pub fn start(identity: WorkerIdentity) -> Self {
        Self {
            rank: identity.rank(),
            size: identity.size(),
            started_at: Utc::now(),
            finished_at: None,
            catalog_failures: Vec::new(),
            domains: Vec::new(),
        }
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn total_failed(&self) -> usize {
        self.domains.iter().map(|domain| domain.failed).sum()
    }
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub data_root: Utf8PathBuf,
    pub domains: Vec<Domain>,
    pub concurrency: usize,
    pub refresh_catalogs: bool,
    /// Apply category allow-lists when more than one worker runs.
    pub filter_distributed: bool,
}

/// Catalog retrieval and per-domain download for one worker.
pub struct CatalogPipeline<'a, F: Fetcher + ?Sized> {
    fetcher: &'a F,
    options: PipelineOptions,
}

impl<'a, F: Fetcher + ?Sized> CatalogPipeline<'a, F> {
    pub fn new(fetcher: &'a F, options: PipelineOptions) -> Self {
        Self { fetcher, options }
    }

    pub fn domains(&self) -> &[Domain] {
        &self.options.domains
    }

    pub fn prepare(&self, domain: &Domain) -> Result<(), SyncError> {
        info!(domain = %domain.name, url = %domain.catalog_url, "downloading catalog");
        catalog::fetch_catalog(
            self.fetcher,
            &domain.catalog_url,
            &domain.catalog_path(&self.options.data_root),
            self.options.refresh_catalogs,
        )
    }

    /// Fetches every catalog; a failure only affects its own domain.
    pub fn prepare_all(&self) -> Vec<CatalogFailure> {
        let mut failures = Vec::new();
        for domain in &self.options.domains {
            if let Err(err) = self.prepare(domain) {
                warn!(domain = %domain.name, error = %err, "catalog unavailable, skipping domain");
                failures.push(CatalogFailure {
                    domain: domain.name.to_string(),
                    reason: err.to_string(),
                });
            }
        }
        failures
    }

    /// Loads the catalog, keeps this rank's partition and downloads it.
    pub fn process(
        &self,
        domain: &Domain,
        identity: WorkerIdentity,
        sink: &dyn ProgressSink,
    ) -> DomainReport {
        let catalog_path = domain.catalog_path(&self.options.data_root);
        if !catalog_path.as_std_path().exists() {
            warn!(domain = %domain.name, path = %catalog_path, "catalog not found, skipping domain");
            return DomainReport::skipped_domain(domain, DomainStatus::CatalogMissing);
        }
        let entries = match catalog::load_catalog(&catalog_path) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(domain = %domain.name, error = %err, "catalog unreadable, skipping domain");
                return DomainReport::skipped_domain(
                    domain,
                    DomainStatus::CatalogInvalid {
                        reason: err.to_string(),
                    },
                );
            }
        };
        let catalog_rows = entries.len();
        let allowed = domain
            .categories
            .as_ref()
            .filter(|_| identity.size() == 1 || self.options.filter_distributed);
        let entries = match allowed {
            Some(allowed) => CategoryFilter::new(allowed.as_slice()).apply(entries),
            None => entries,
        };

        let output_dir = domain.output_dir(&self.options.data_root);
        if let Err(err) = ensure_dir(&output_dir) {
            warn!(domain = %domain.name, error = %err, "cannot create output directory");
            return DomainReport::skipped_domain(
                domain,
                DomainStatus::OutputUnavailable {
                    reason: err.to_string(),
                },
            );
        }

        let range = partition_range(entries.len(), identity.size(), identity.rank());
        let (descriptors, unavailable) =
            catalog::to_descriptors(&entries[range.clone()], &output_dir, domain.name.as_str());
        info!(
            domain = %domain.name,
            rows = catalog_rows,
            selected = entries.len(),
            start = range.start,
            end = range.end,
            "downloading partition"
        );

        let outcomes = pool::run_all(self.fetcher, descriptors, self.options.concurrency, sink);
        let mut report = DomainReport {
            domain: domain.name.to_string(),
            status: DomainStatus::Completed,
            catalog_rows,
            selected_rows: entries.len(),
            partition: range,
            succeeded: 0,
            skipped: 0,
            failed: 0,
            unavailable,
            failures: Vec::new(),
        };
        for outcome in outcomes {
            match outcome {
                Outcome::Success { .. } => report.succeeded += 1,
                Outcome::Skipped { .. } => report.skipped += 1,
                Outcome::Failed { .. } => {
                    report.failed += 1;
                    report.failures.push(outcome);
                }
            }
        }
        info!(
            domain = %report.domain,
            succeeded = report.succeeded,
            skipped = report.skipped,
            failed = report.failed,
            "domain finished"
        );
        report
    }
}

pub fn ensure_dir(dir: &Utf8Path) -> Result<(), SyncError> {
    std::fs::create_dir_all(dir.as_std_path())
        .map_err(|err| SyncError::Filesystem(format!("create {dir}: {err}")))
}
