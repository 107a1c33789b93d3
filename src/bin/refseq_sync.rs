use std::process::ExitCode;

use clap::Parser;
use miette::IntoDiagnostic;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use refseq_sync::config::ConfigLoader;
use refseq_sync::coordinator::{Coordinator, FileRendezvous, WorkerIdentity, launcher_job_id};
use refseq_sync::error::SyncError;
use refseq_sync::output::{JsonOutput, LogProgress, print_summary};
use refseq_sync::pipeline::{CatalogPipeline, PipelineOptions, ensure_dir};
use refseq_sync::transfer::HttpFetcher;

#[derive(Parser)]
#[command(name = "refseq-sync")]
#[command(about = "Download RefSeq assembly catalogs and genomes, partitioned across workers")]
#[command(version)]
struct Cli {
    /// Concurrent downloads per worker
    #[arg(default_value_t = 10)]
    concurrency: usize,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<SyncError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &SyncError) -> u8 {
    match error {
        _ if !error.is_fatal() => 1,
        SyncError::ConfigRead(_) | SyncError::ConfigParse(_) => 2,
        SyncError::Identity(_) => 3,
        _ => 4,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let identity = WorkerIdentity::from_env()?;
    let config = ConfigLoader::resolve(None)?;
    ensure_dir(&config.data_root)?;

    let fetcher = HttpFetcher::new(config.http)?;
    let pipeline = CatalogPipeline::new(
        &fetcher,
        PipelineOptions {
            data_root: config.data_root.clone(),
            domains: config.domains.clone(),
            concurrency: cli.concurrency,
            refresh_catalogs: config.refresh_catalogs,
            filter_distributed: config.filter_distributed,
        },
    );
    let rendezvous = FileRendezvous::new(
        config.rendezvous_dir(),
        config.barrier_poll,
        config.barrier_timeout,
    )
    .with_session(launcher_job_id());

    let report = Coordinator::new(identity, &rendezvous, &pipeline).run(&LogProgress)?;

    match JsonOutput::write_report(&config.data_root, &report) {
        Ok(path) => info!(path = %path, "run report written"),
        Err(err) => warn!(error = %err, "could not write run report"),
    }
    print_summary(&report).into_diagnostic()?;
    if report.total_failed() > 0 {
        warn!(failed = report.total_failed(), "some transfers failed; rerun to retry them");
    }
    Ok(())
}
