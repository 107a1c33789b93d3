use std::path::PathBuf;
use std::time::Duration;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum SyncError {
    #[error("catalog request failed: {0}")]
    CatalogFetch(String),

    #[error("catalog server returned status {status} for {url}")]
    CatalogStatus { status: u16, url: String },

    #[error("malformed catalog: {0}")]
    CatalogParse(String),

    #[error("transfer failed: {0}")]
    Transfer(String),

    #[error("server returned status {status} for {url}")]
    TransferStatus { status: u16, url: String },

    #[error("unsupported source locator: {0}")]
    UnsupportedLocator(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("cannot resolve worker identity: {0}")]
    #[diagnostic(help("launch with matching rank/size variables, or with none for a single worker"))]
    Identity(String),

    #[error("rendezvous failed: {0}")]
    Rendezvous(String),

    #[error("barrier not released after {0:?}")]
    BarrierTimeout(Duration),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),
}

impl SyncError {
    /// Errors that abort the whole process rather than one domain or one item.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SyncError::Identity(_)
                | SyncError::Rendezvous(_)
                | SyncError::BarrierTimeout(_)
                | SyncError::ConfigRead(_)
                | SyncError::ConfigParse(_)
        )
    }
}
