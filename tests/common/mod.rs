#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::sync::Mutex;
use std::thread;

use camino::Utf8PathBuf;

use refseq_sync::error::SyncError;
use refseq_sync::transfer::Fetcher;

/// Serves fixed bodies by URL and records every request.
#[derive(Default)]
pub struct MockFetcher {
    bodies: HashMap<String, Vec<u8>>,
    calls: Mutex<Vec<String>>,
}

impl MockFetcher {
    pub fn with(mut self, url: &str, body: &[u8]) -> Self {
        self.bodies.insert(url.to_string(), body.to_vec());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl Fetcher for MockFetcher {
    fn fetch_into(&self, url: &str, sink: &mut dyn Write) -> Result<u64, SyncError> {
        self.calls.lock().unwrap().push(url.to_string());
        let body = self
            .bodies
            .get(url)
            .ok_or_else(|| SyncError::Transfer(format!("dns error: {url}")))?;
        sink.write_all(body)
            .map_err(|err| SyncError::Transfer(err.to_string()))?;
        Ok(body.len() as u64)
    }
}

pub fn utf8_tempdir() -> (tempfile::TempDir, Utf8PathBuf) {
    let temp = tempfile::tempdir().unwrap();
    let path = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    (temp, path)
}

pub fn assembly_summary(ftp_paths: &[(&str, &str)]) -> String {
    let mut text = String::from("##   See ftp://ftp.ncbi.nlm.nih.gov/genomes/README_assembly_summary.txt\n");
    text.push_str(
        "#assembly_accession\trefseq_category\torganism_name\tftp_path\ttotal_gene_count\n",
    );
    for (idx, (category, ftp_path)) in ftp_paths.iter().enumerate() {
        text.push_str(&format!(
            "GCF_{idx:09}.1\t{category}\tOrganism {idx}\t{ftp_path}\tna\n"
        ));
    }
    text
}

/// Minimal HTTP/1.1 server answering `requests` connections from `routes`,
/// 404 for anything else. Returns the base URL.
pub fn serve(routes: Vec<(&'static str, &'static [u8])>, requests: usize) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    thread::spawn(move || {
        for stream in listener.incoming().take(requests) {
            let mut stream = stream.unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut request_line = String::new();
            reader.read_line(&mut request_line).unwrap();
            loop {
                let mut line = String::new();
                if reader.read_line(&mut line).unwrap() == 0 || line == "\r\n" {
                    break;
                }
            }
            let path = request_line.split_whitespace().nth(1).unwrap_or("/").to_string();
            let response = match routes.iter().find(|(route, _)| *route == path) {
                Some((_, body)) => {
                    let mut bytes = format!(
                        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                        body.len()
                    )
                    .into_bytes();
                    bytes.extend_from_slice(body);
                    bytes
                }
                None => b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                    .to_vec(),
            };
            stream.write_all(&response).unwrap();
        }
    });
    format!("http://{addr}")
}
