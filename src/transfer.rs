use std::io::{self, Write};
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::domain::Descriptor;
use crate::error::SyncError;

/// Retrieves one remote resource into a writer. Implementations report
/// network failures as `Transfer`/`TransferStatus`/`UnsupportedLocator`.
pub trait Fetcher: Send + Sync {
    fn fetch_into(&self, url: &str, sink: &mut dyn Write) -> Result<u64, SyncError>;
}

#[derive(Debug, Clone, Copy)]
pub struct HttpOptions {
    pub connect_timeout: Duration,
    pub transfer_timeout: Duration,
    pub use_system_proxy: bool,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            transfer_timeout: Duration::from_secs(1800),
            use_system_proxy: true,
        }
    }
}

#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(options: HttpOptions) -> Result<Self, SyncError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("refseq-sync/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| SyncError::Transfer(err.to_string()))?,
        );
        let mut builder = Client::builder()
            .default_headers(headers)
            .connect_timeout(options.connect_timeout)
            .timeout(options.transfer_timeout);
        if !options.use_system_proxy {
            builder = builder.no_proxy();
        }
        let client = builder
            .build()
            .map_err(|err| SyncError::Transfer(err.to_string()))?;
        Ok(Self { client })
    }
}

impl Fetcher for HttpFetcher {
    fn fetch_into(&self, url: &str, sink: &mut dyn Write) -> Result<u64, SyncError> {
        if !is_http_locator(url) {
            return Err(SyncError::UnsupportedLocator(url.to_string()));
        }
        let mut response = self
            .client
            .get(url)
            .send()
            .map_err(|err| SyncError::Transfer(err.to_string()))?;
        if !response.status().is_success() {
            return Err(SyncError::TransferStatus {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }
        io::copy(&mut response, sink).map_err(|err| SyncError::Transfer(err.to_string()))
    }
}

fn is_http_locator(url: &str) -> bool {
    let lower = url.trim_start().to_ascii_lowercase();
    lower.starts_with("https://") || lower.starts_with("http://")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum Outcome {
    Success { target: String },
    Skipped { target: String },
    Failed { source_url: String, cause: String },
}

impl Outcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Success { .. } => "downloaded",
            Outcome::Skipped { .. } => "skipped",
            Outcome::Failed { .. } => "failed",
        }
    }
}

/// Runs one transfer. Never returns an error: every failure becomes
/// `Outcome::Failed` so the caller can keep going.
pub fn fetch<F: Fetcher + ?Sized>(fetcher: &F, descriptor: &Descriptor) -> Outcome {
    let target = descriptor.target_path.to_string();
    if descriptor.target_path.as_std_path().exists() {
        debug!(path = %target, "already present");
        return Outcome::Skipped { target };
    }
    match write_target(fetcher, descriptor) {
        Ok(Written::Created(bytes)) => {
            info!(path = %target, bytes, "downloaded");
            Outcome::Success { target }
        }
        Ok(Written::Raced) => {
            debug!(path = %target, "created concurrently, keeping existing file");
            Outcome::Skipped { target }
        }
        Err(err) => {
            warn!(url = %descriptor.source_url, error = %err, "transfer failed");
            Outcome::Failed {
                source_url: descriptor.source_url.clone(),
                cause: err.to_string(),
            }
        }
    }
}

enum Written {
    Created(u64),
    Raced,
}

fn write_target<F: Fetcher + ?Sized>(
    fetcher: &F,
    descriptor: &Descriptor,
) -> Result<Written, SyncError> {
    let parent = descriptor
        .target_path
        .parent()
        .ok_or_else(|| SyncError::Filesystem("invalid destination path".to_string()))?;
    let mut temp = tempfile::Builder::new()
        .prefix(".partial")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| SyncError::Filesystem(format!("{parent}: {err}")))?;
    let bytes = fetcher.fetch_into(&descriptor.source_url, temp.as_file_mut())?;
    temp.as_file_mut()
        .flush()
        .map_err(|err| SyncError::Filesystem(err.to_string()))?;
    match temp.persist_noclobber(descriptor.target_path.as_std_path()) {
        Ok(_) => Ok(Written::Created(bytes)),
        Err(err) if err.error.kind() == io::ErrorKind::AlreadyExists => Ok(Written::Raced),
        Err(err) => Err(SyncError::Filesystem(err.error.to_string())),
    }
}
