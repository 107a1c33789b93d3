use std::fmt;
use std::str::FromStr;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::error::SyncError;

pub const GENOMIC_SUFFIX: &str = "_genomic.fna.gz";

const REFSEQ_BASE: &str = "https://ftp.ncbi.nlm.nih.gov/genomes/refseq";

/// Taxonomic grouping used to namespace catalogs and output directories.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DomainName(String);

impl DomainName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DomainName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DomainName {
    type Err = SyncError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_lowercase();
        let is_valid = !normalized.is_empty()
            && normalized
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-');
        if !is_valid {
            return Err(SyncError::ConfigParse(format!("invalid domain name: {value}")));
        }
        Ok(Self(normalized))
    }
}

impl TryFrom<String> for DomainName {
    type Error = SyncError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DomainName> for String {
    fn from(value: DomainName) -> Self {
        value.0
    }
}

/// One catalog to mirror: where it lives and which rows to keep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Domain {
    pub name: DomainName,
    pub catalog_url: String,
    /// Allowed `refseq_category` values; `None` keeps every row.
    #[serde(default)]
    pub categories: Option<Vec<String>>,
}

impl Domain {
    pub fn new(name: &str, catalog_url: impl Into<String>) -> Result<Self, SyncError> {
        Ok(Self {
            name: name.parse()?,
            catalog_url: catalog_url.into(),
            categories: None,
        })
    }

    pub fn with_categories(mut self, categories: &[&str]) -> Self {
        self.categories = Some(categories.iter().map(|value| value.to_string()).collect());
        self
    }

    pub fn catalog_path(&self, data_root: &Utf8Path) -> Utf8PathBuf {
        data_root.join(format!("assembly_summary_{}.txt", self.name))
    }

    pub fn output_dir(&self, data_root: &Utf8Path) -> Utf8PathBuf {
        data_root.join(format!("{}_genomes", self.name))
    }
}

pub fn default_domains() -> Vec<Domain> {
    let refseq = |path: &str| format!("{REFSEQ_BASE}/{path}/assembly_summary.txt");
    vec![
        Domain {
            name: DomainName("archaea".to_string()),
            catalog_url: refseq("archaea"),
            categories: None,
        },
        Domain {
            name: DomainName("bacteria".to_string()),
            catalog_url: refseq("bacteria"),
            categories: Some(vec![
                "representative genome".to_string(),
                "reference genome".to_string(),
            ]),
        },
        Domain {
            name: DomainName("viral".to_string()),
            catalog_url: refseq("viral"),
            categories: None,
        },
        Domain {
            name: DomainName("fungi".to_string()),
            catalog_url: refseq("fungi"),
            categories: None,
        },
        Domain {
            name: DomainName("human".to_string()),
            catalog_url: refseq("vertebrate_mammalian/Homo_sapiens"),
            categories: None,
        },
    ]
}

/// A fully resolved (source, destination) pair ready for transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Descriptor {
    pub source_url: String,
    pub target_path: Utf8PathBuf,
    pub domain: String,
}

impl Descriptor {
    /// Derives the genome file locator and local path from an assembly's
    /// remote directory. Returns `None` when the directory has no final segment.
    pub fn from_remote_dir(remote_dir: &str, output_dir: &Utf8Path, domain: &str) -> Option<Self> {
        let trimmed = remote_dir.trim().trim_end_matches('/');
        let basename = trimmed.rsplit('/').next().filter(|segment| {
            !segment.is_empty() && !segment.ends_with(':')
        })?;
        let filename = format!("{basename}{GENOMIC_SUFFIX}");
        Some(Self {
            source_url: format!("{trimmed}/{filename}"),
            target_path: output_dir.join(filename),
            domain: domain.to_string(),
        })
    }
}
