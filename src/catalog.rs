//! Assembly summary catalogs: retrieval, header handling and the typed row
//! schema that descriptors are derived from.

use std::fs;
use std::io::Write;

use camino::Utf8Path;
use serde::Serialize;
use tracing::{info, warn};

use crate::domain::Descriptor;
use crate::error::SyncError;
use crate::transfer::Fetcher;

const COMMENT_MARKER: char = '#';
const PLACEHOLDER: &str = "na";

/// Header plus string cells, after the archive's comment conventions are removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTable {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    /// The first line of an assembly summary is free text and the second is
    /// the `#`-prefixed column header. The first line is dropped whenever the
    /// second starts with `#`; otherwise the first line is the header.
    pub fn parse(text: &str) -> Result<Self, SyncError> {
        let mut lines = text
            .lines()
            .enumerate()
            .map(|(idx, line)| (idx + 1, line.trim_end_matches('\r')))
            .filter(|(_, line)| !line.trim().is_empty())
            .peekable();

        let (_, first) = lines
            .next()
            .ok_or_else(|| SyncError::CatalogParse("catalog is empty".to_string()))?;
        let leading_comment = lines
            .peek()
            .is_some_and(|(_, next)| next.starts_with(COMMENT_MARKER));
        let header_line = if leading_comment {
            lines.next().map(|(_, line)| line).unwrap_or(first)
        } else {
            first
        };

        let header = header_line
            .trim_start_matches(COMMENT_MARKER)
            .split('\t')
            .map(|cell| cell.trim().to_string())
            .collect::<Vec<_>>();
        if header.iter().all(|cell| cell.is_empty()) {
            return Err(SyncError::CatalogParse("header line has no columns".to_string()));
        }

        let mut rows = Vec::new();
        for (line_no, line) in lines {
            let mut cells = line.split('\t').map(str::to_string).collect::<Vec<_>>();
            if cells.len() > header.len() {
                return Err(SyncError::CatalogParse(format!(
                    "line {line_no}: expected {} fields, found {}",
                    header.len(),
                    cells.len()
                )));
            }
            cells.resize(header.len(), String::new());
            rows.push(cells);
        }
        Ok(Self { header, rows })
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.header.iter().position(|cell| cell == name)
    }
}

/// Integer column value; placeholder text such as `na` becomes `Missing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GeneCount {
    Known(u64),
    Missing,
}

impl GeneCount {
    pub fn parse(value: &str) -> Self {
        value
            .trim()
            .parse::<u64>()
            .map(GeneCount::Known)
            .unwrap_or(GeneCount::Missing)
    }

    pub fn known(self) -> Option<u64> {
        match self {
            GeneCount::Known(value) => Some(value),
            GeneCount::Missing => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogEntry {
    pub assembly_accession: Option<String>,
    pub organism_name: Option<String>,
    pub refseq_category: String,
    pub ftp_path: String,
    pub total_gene_count: GeneCount,
    pub protein_coding_gene_count: GeneCount,
    pub non_coding_gene_count: GeneCount,
}

impl CatalogEntry {
    /// Whether the row points at a downloadable remote directory.
    pub fn is_available(&self) -> bool {
        let path = self.ftp_path.trim();
        !path.is_empty() && !path.eq_ignore_ascii_case(PLACEHOLDER)
    }
}

pub fn parse_catalog(text: &str) -> Result<Vec<CatalogEntry>, SyncError> {
    let table = RawTable::parse(text)?;
    let required = |name: &str| {
        table
            .column(name)
            .ok_or_else(|| SyncError::CatalogParse(format!("missing column {name}")))
    };
    let ftp_path = required("ftp_path")?;
    let refseq_category = required("refseq_category")?;
    let accession = table.column("assembly_accession");
    let organism = table.column("organism_name");
    let total = table.column("total_gene_count");
    let protein_coding = table.column("protein_coding_gene_count");
    let non_coding = table.column("non_coding_gene_count");

    let text_at = |row: &[String], idx: Option<usize>| {
        idx.map(|idx| row[idx].trim().to_string())
            .filter(|value| !value.is_empty())
    };
    let count_at = |row: &[String], idx: Option<usize>| {
        idx.map(|idx| GeneCount::parse(&row[idx]))
            .unwrap_or(GeneCount::Missing)
    };

    Ok(table
        .rows
        .iter()
        .map(|row| CatalogEntry {
            assembly_accession: text_at(row, accession),
            organism_name: text_at(row, organism),
            refseq_category: row[refseq_category].trim().to_string(),
            ftp_path: row[ftp_path].trim().to_string(),
            total_gene_count: count_at(row, total),
            protein_coding_gene_count: count_at(row, protein_coding),
            non_coding_gene_count: count_at(row, non_coding),
        })
        .collect())
}

/// Keeps rows whose `refseq_category` is in the allow-list, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryFilter {
    allowed: Vec<String>,
}

impl CategoryFilter {
    pub fn new<S: AsRef<str>>(allowed: &[S]) -> Self {
        Self {
            allowed: allowed.iter().map(|value| value.as_ref().to_string()).collect(),
        }
    }

    pub fn matches(&self, entry: &CatalogEntry) -> bool {
        self.allowed.iter().any(|value| *value == entry.refseq_category)
    }

    pub fn apply(&self, entries: Vec<CatalogEntry>) -> Vec<CatalogEntry> {
        entries.into_iter().filter(|entry| self.matches(entry)).collect()
    }
}

/// Descriptors for every available entry plus the number of rows without a
/// usable remote directory.
pub fn to_descriptors(
    entries: &[CatalogEntry],
    output_dir: &Utf8Path,
    domain: &str,
) -> (Vec<Descriptor>, usize) {
    let mut descriptors = Vec::with_capacity(entries.len());
    let mut unavailable = 0usize;
    for entry in entries {
        let descriptor = entry
            .is_available()
            .then(|| Descriptor::from_remote_dir(&entry.ftp_path, output_dir, domain))
            .flatten();
        match descriptor {
            Some(descriptor) => descriptors.push(descriptor),
            None => {
                unavailable += 1;
                warn!(
                    domain,
                    accession = entry.assembly_accession.as_deref().unwrap_or("?"),
                    "no remote directory for assembly, skipping"
                );
            }
        }
    }
    (descriptors, unavailable)
}

/// Downloads a catalog to `destination`, replacing any previous copy only once
/// the new one is complete. With `refresh == false` an existing file is reused.
pub fn fetch_catalog<F: Fetcher + ?Sized>(
    fetcher: &F,
    url: &str,
    destination: &Utf8Path,
    refresh: bool,
) -> Result<(), SyncError> {
    if !refresh && destination.as_std_path().exists() {
        info!(path = %destination, "catalog already present, reusing");
        return Ok(());
    }
    let parent = destination
        .parent()
        .ok_or_else(|| SyncError::Filesystem("invalid catalog path".to_string()))?;
    fs::create_dir_all(parent.as_std_path())
        .map_err(|err| SyncError::Filesystem(err.to_string()))?;
    let mut temp = tempfile::Builder::new()
        .prefix(".catalog")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| SyncError::Filesystem(err.to_string()))?;
    fetcher.fetch_into(url, temp.as_file_mut()).map_err(|err| match err {
        SyncError::Transfer(message) => SyncError::CatalogFetch(message),
        SyncError::TransferStatus { status, url } => SyncError::CatalogStatus { status, url },
        other => other,
    })?;
    temp.as_file_mut()
        .flush()
        .map_err(|err| SyncError::Filesystem(err.to_string()))?;
    temp.persist(destination.as_std_path())
        .map_err(|err| SyncError::Filesystem(err.to_string()))?;
    info!(path = %destination, "catalog downloaded");
    Ok(())
}

pub fn load_catalog(path: &Utf8Path) -> Result<Vec<CatalogEntry>, SyncError> {
    let bytes = fs::read(path.as_std_path())
        .map_err(|err| SyncError::Filesystem(format!("read {path}: {err}")))?;
    parse_catalog(&String::from_utf8_lossy(&bytes))
}
