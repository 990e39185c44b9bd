//! Data service client: paginated file metadata over HTTP.
//!
//! Wire contract: `GET {base}/files?page=N` returns
//! `{ "data": [FileRecord, ...], "total_pages": N, ... }` for a 1-based
//! page number. An empty or missing `data` array means zero results.
//! `FileService` is the injection seam so the page controller can be
//! exercised without a network.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};

/// One stored file's metadata, as returned by the service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_number: Option<i64>,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub file_size: Option<String>,
    pub image_url: String,
    pub share_link: String,
}

/// One page of records plus paging totals.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct FilePage {
    #[serde(default)]
    pub data: Vec<FileRecord>,
    #[serde(default)]
    pub total_pages: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_items: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_page: Option<u32>,
}

/// Fetches one page of file records by 1-based page number.
pub trait FileService {
    fn fetch_page(&self, page: u32) -> Result<FilePage>;
}

/// Production implementation over HTTP.
pub struct HttpService {
    agent: ureq::Agent,
    base: String,
}

impl HttpService {
    /// `base_url` is the service root (no query string); a trailing
    /// slash is tolerated.
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build();
        Self {
            agent: ureq::Agent::new_with_config(config),
            base: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn files_url(&self, page: u32) -> String {
        format!("{}/files?page={page}", self.base)
    }
}

impl FileService for HttpService {
    fn fetch_page(&self, page: u32) -> Result<FilePage> {
        let url = self.files_url(page.max(1));
        debug!("service: GET {url}");
        let start = Instant::now();

        let mut response = match self.agent.get(&url).call() {
            Ok(r) => r,
            // The service 404s a page past the end instead of returning
            // an empty list; both mean "no rows here".
            Err(ureq::Error::StatusCode(404)) => {
                info!("service: page {page} has no rows (404)");
                return Ok(FilePage::default());
            }
            Err(e) => return Err(e).with_context(|| format!("GET {url} failed")),
        };

        let body = response
            .body_mut()
            .read_to_string()
            .with_context(|| format!("reading response body of {url}"))?;
        let file_page: FilePage = serde_json::from_str(&body)
            .with_context(|| format!("parsing response of {url}"))?;

        info!(
            "service: page {page} fetched in {:.2}s ({} records, {} pages total)",
            start.elapsed().as_secs_f64(),
            file_page.data.len(),
            file_page.total_pages
        );
        Ok(file_page)
    }
}
