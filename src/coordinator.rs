//! Worker identity and the barrier that separates the shared catalog download
//! from the independent per-rank download phase.

use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::sync::Barrier;
use std::thread;
use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, info_span, warn};

use crate::error::SyncError;
use crate::pipeline::{CatalogPipeline, RunReport};
use crate::pool::ProgressSink;
use crate::transfer::Fetcher;

/// Launcher variable pairs, checked in order.
const IDENTITY_VARS: &[(&str, &str)] = &[
    ("OMPI_COMM_WORLD_RANK", "OMPI_COMM_WORLD_SIZE"),
    ("PMI_RANK", "PMI_SIZE"),
    ("SLURM_PROCID", "SLURM_NTASKS"),
    ("RANK", "WORLD_SIZE"),
];

/// Launcher job identifiers, checked in order.
const JOB_ID_VARS: &[&str] = &["SLURM_JOB_ID", "OMPI_MCA_ess_base_jobid", "PMI_JOBID"];

/// Job id of the current launch, if the launcher exports one.
pub fn launcher_job_id() -> Option<String> {
    launcher_job_id_from(|key| std::env::var(key).ok())
}

pub fn launcher_job_id_from<L>(lookup: L) -> Option<String>
where
    L: Fn(&str) -> Option<String>,
{
    JOB_ID_VARS.iter().find_map(|var| {
        lookup(var)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WorkerIdentity {
    rank: usize,
    size: usize,
}

impl WorkerIdentity {
    pub fn new(rank: usize, size: usize) -> Result<Self, SyncError> {
        if size == 0 {
            return Err(SyncError::Identity("worker count must be at least 1".to_string()));
        }
        if rank >= size {
            return Err(SyncError::Identity(format!(
                "rank {rank} out of range for {size} workers"
            )));
        }
        Ok(Self { rank, size })
    }

    pub fn single() -> Self {
        Self { rank: 0, size: 1 }
    }

    pub fn from_env() -> Result<Self, SyncError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<L>(lookup: L) -> Result<Self, SyncError>
    where
        L: Fn(&str) -> Option<String>,
    {
        for &(rank_var, size_var) in IDENTITY_VARS {
            match (lookup(rank_var), lookup(size_var)) {
                (None, None) => continue,
                (Some(rank), Some(size)) => {
                    let parse = |name: &str, value: &str| {
                        value.trim().parse::<usize>().map_err(|_| {
                            SyncError::Identity(format!("{name}={value:?} is not an integer"))
                        })
                    };
                    return Self::new(parse(rank_var, &rank)?, parse(size_var, &size)?);
                }
                _ => {
                    return Err(SyncError::Identity(format!(
                        "{rank_var} and {size_var} must be set together"
                    )));
                }
            }
        }
        Ok(Self::single())
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_leader(&self) -> bool {
        self.rank == 0
    }
}

impl fmt::Display for WorkerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.rank, self.size)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    Prereq,
    Barrier,
    Independent,
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Init => write!(f, "init"),
            Phase::Prereq => write!(f, "prereq"),
            Phase::Barrier => write!(f, "barrier"),
            Phase::Independent => write!(f, "independent"),
            Phase::Done => write!(f, "done"),
        }
    }
}

/// Rendezvous between all ranks. `wait` returns only once every rank has
/// called it; the leader calls it after finishing the prerequisite phase.
pub trait Rendezvous: Send + Sync {
    fn open(&self, _identity: WorkerIdentity) -> Result<(), SyncError> {
        Ok(())
    }

    fn wait(&self, identity: WorkerIdentity) -> Result<(), SyncError>;

    fn close(&self, _identity: WorkerIdentity) -> Result<(), SyncError> {
        Ok(())
    }
}

/// For ranks that are threads of one process.
pub struct ThreadRendezvous {
    barrier: Barrier,
}

impl ThreadRendezvous {
    pub fn new(size: usize) -> Self {
        Self {
            barrier: Barrier::new(size.max(1)),
        }
    }
}

impl Rendezvous for ThreadRendezvous {
    fn wait(&self, _identity: WorkerIdentity) -> Result<(), SyncError> {
        self.barrier.wait();
        Ok(())
    }
}

const PREREQ_DONE: &str = "prereq-done";
const RELEASE: &str = "release";

/// For ranks that are separate processes sharing a filesystem. Markers carry
/// the leader's session token, so only markers of the current run count.
/// Tokens are prefixed with the launcher job id when one is known, and ranks
/// ignore a published token from another job.
pub struct FileRendezvous {
    dir: Utf8PathBuf,
    poll_interval: Duration,
    timeout: Duration,
    session: Option<String>,
}

impl FileRendezvous {
    pub fn new(dir: impl Into<Utf8PathBuf>, poll_interval: Duration, timeout: Duration) -> Self {
        Self {
            dir: dir.into(),
            poll_interval,
            timeout,
            session: None,
        }
    }

    pub fn with_session(mut self, session: Option<String>) -> Self {
        self.session = session;
        self
    }

    fn session_prefix(&self) -> String {
        format!("{}:", self.session.as_deref().unwrap_or("local"))
    }

    fn is_current(&self, token: &str) -> bool {
        token.starts_with(&self.session_prefix())
    }

    fn marker(&self, name: &str) -> Utf8PathBuf {
        self.dir.join(name)
    }

    fn read_marker(&self, name: &str) -> Result<Option<String>, SyncError> {
        match fs::read_to_string(self.marker(name).as_std_path()) {
            Ok(content) => Ok(Some(content.trim().to_string())),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(SyncError::Rendezvous(format!("read {name}: {err}"))),
        }
    }

    fn write_marker(&self, name: &str, token: &str) -> Result<(), SyncError> {
        let rendezvous_err = |err: io::Error| SyncError::Rendezvous(format!("write {name}: {err}"));
        fs::create_dir_all(self.dir.as_std_path()).map_err(rendezvous_err)?;
        let mut temp = tempfile::Builder::new()
            .prefix(".marker")
            .tempfile_in(self.dir.as_std_path())
            .map_err(rendezvous_err)?;
        temp.write_all(token.as_bytes()).map_err(rendezvous_err)?;
        temp.persist(self.marker(name).as_std_path())
            .map_err(|err| rendezvous_err(err.error))?;
        Ok(())
    }

    fn current_token(&self) -> Result<String, SyncError> {
        self.read_marker(PREREQ_DONE)?
            .ok_or_else(|| SyncError::Rendezvous("no session token published".to_string()))
    }

    /// Polls `ready` until it returns a value or the timeout elapses.
    fn poll<T>(
        &self,
        mut ready: impl FnMut() -> Result<Option<T>, SyncError>,
    ) -> Result<T, SyncError> {
        let started = Instant::now();
        loop {
            if let Some(value) = ready()? {
                return Ok(value);
            }
            if started.elapsed() >= self.timeout {
                return Err(SyncError::BarrierTimeout(self.timeout));
            }
            thread::sleep(self.poll_interval);
        }
    }

    fn all_marked(&self, prefix: &str, size: usize, token: &str) -> Result<bool, SyncError> {
        for rank in 1..size {
            if self.read_marker(&format!("{prefix}-{rank}"))?.as_deref() != Some(token) {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl Rendezvous for FileRendezvous {
    fn open(&self, identity: WorkerIdentity) -> Result<(), SyncError> {
        if !identity.is_leader() || identity.size() == 1 {
            return Ok(());
        }
        if self.dir.as_std_path().exists() {
            debug!(dir = %self.dir, "clearing stale rendezvous markers");
            fs::remove_dir_all(self.dir.as_std_path())
                .map_err(|err| SyncError::Rendezvous(err.to_string()))?;
        }
        fs::create_dir_all(self.dir.as_std_path())
            .map_err(|err| SyncError::Rendezvous(err.to_string()))
    }

    fn wait(&self, identity: WorkerIdentity) -> Result<(), SyncError> {
        if identity.size() == 1 {
            return Ok(());
        }
        if identity.is_leader() {
            let token = format!(
                "{}{}-{}",
                self.session_prefix(),
                std::process::id(),
                Utc::now().timestamp_nanos_opt().unwrap_or_default()
            );
            self.write_marker(PREREQ_DONE, &token)?;
            self.poll(|| {
                let arrived = self.all_marked("arrived", identity.size(), &token)?;
                Ok(arrived.then_some(()))
            })?;
            self.write_marker(RELEASE, &token)?;
            debug!(token = %token, "barrier released");
            return Ok(());
        }

        let arrived = format!("arrived-{}", identity.rank());
        let token = self.poll(|| {
            let Some(token) = self
                .read_marker(PREREQ_DONE)?
                .filter(|token| self.is_current(token))
            else {
                return Ok(None);
            };
            if self.read_marker(&arrived)?.as_deref() != Some(token.as_str()) {
                self.write_marker(&arrived, &token)?;
            }
            let released = self.read_marker(RELEASE)?.as_deref() == Some(token.as_str());
            Ok(released.then_some(token))
        })?;
        self.write_marker(&format!("departed-{}", identity.rank()), &token)
    }

    fn close(&self, identity: WorkerIdentity) -> Result<(), SyncError> {
        if !identity.is_leader() || identity.size() == 1 {
            return Ok(());
        }
        let token = self.current_token()?;
        match self.poll(|| {
            let departed = self.all_marked("departed", identity.size(), &token)?;
            Ok(departed.then_some(()))
        }) {
            Ok(()) => fs::remove_dir_all(self.dir.as_std_path())
                .map_err(|err| SyncError::Rendezvous(err.to_string())),
            Err(err) => {
                warn!(dir = %self.dir, error = %err, "ranks still pending, leaving markers in place");
                Ok(())
            }
        }
    }
}

/// Drives one worker through init, prerequisite, barrier and independent phases.
pub struct Coordinator<'a, F: Fetcher + ?Sized, R: Rendezvous + ?Sized> {
    identity: WorkerIdentity,
    rendezvous: &'a R,
    pipeline: &'a CatalogPipeline<'a, F>,
}

impl<'a, F: Fetcher + ?Sized, R: Rendezvous + ?Sized> Coordinator<'a, F, R> {
    pub fn new(
        identity: WorkerIdentity,
        rendezvous: &'a R,
        pipeline: &'a CatalogPipeline<'a, F>,
    ) -> Self {
        Self {
            identity,
            rendezvous,
            pipeline,
        }
    }

    pub fn run(&self, sink: &dyn ProgressSink) -> Result<RunReport, SyncError> {
        let identity = self.identity;
        let span = info_span!("worker", rank = identity.rank(), size = identity.size());
        let _guard = span.enter();
        let mut report = RunReport::start(identity);

        info!(phase = %Phase::Init, "worker started");
        self.rendezvous.open(identity)?;

        if identity.is_leader() {
            info!(phase = %Phase::Prereq, "fetching catalogs");
            report.catalog_failures = self.pipeline.prepare_all();
        }

        info!(phase = %Phase::Barrier, "waiting for all workers");
        self.rendezvous.wait(identity)?;

        info!(phase = %Phase::Independent, "processing partitions");
        for domain in self.pipeline.domains() {
            report.domains.push(self.pipeline.process(domain, identity, sink));
        }

        self.rendezvous.close(identity)?;
        report.finish();
        info!(phase = %Phase::Done, "worker finished");
        Ok(report)
    }
}
