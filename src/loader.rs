//! Thumbnail fetch worker: fetches image bytes over HTTP, downscales
//! them to the card's pixel box, and re-encodes PNG for the terminal.
//!
//! A single worker thread serializes loads, and the main loop paces its
//! dispatches, so at most one image request is ever in flight. Results
//! return over a channel tagged with the page epoch they belong to;
//! stale results are dropped by the controller.

use std::io::Cursor;
use std::sync::Arc;
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use image::ImageFormat;
use image::imageops::FilterType;
use log::{debug, error};

use crate::controller::Dispatch;

/// Fetches raw image bytes for a URL. Injection seam so the drain can
/// be exercised without a network.
pub trait ImageFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// Production fetcher over HTTP.
pub struct HttpFetcher {
    agent: ureq::Agent,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build();
        Self {
            agent: ureq::Agent::new_with_config(config),
        }
    }
}

impl ImageFetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let mut response = self
            .agent
            .get(url)
            .call()
            .with_context(|| format!("GET {url} failed"))?;
        response
            .body_mut()
            .read_to_vec()
            .with_context(|| format!("reading body of {url}"))
    }
}

/// Bounding box for prepared thumbnails, in pixels.
#[derive(Debug, Clone, Copy)]
pub struct ThumbSpec {
    pub max_w: u32,
    pub max_h: u32,
}

/// Decode, downscale to fit `spec` (aspect preserved), re-encode PNG.
/// Images already inside the box are re-encoded unscaled.
pub fn prepare_thumbnail(bytes: &[u8], spec: ThumbSpec) -> Result<Vec<u8>> {
    let img = image::load_from_memory(bytes).context("decoding image")?;
    let img = if img.width() > spec.max_w || img.height() > spec.max_h {
        img.resize(spec.max_w.max(1), spec.max_h.max(1), FilterType::Triangle)
    } else {
        img
    };
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png)
        .context("encoding PNG")?;
    Ok(out.into_inner())
}

/// A finished load, tagged with the page epoch it belongs to.
#[derive(Debug)]
pub struct LoadResult {
    pub epoch: u64,
    pub card: usize,
    pub png: Result<Vec<u8>>,
}

/// Spawn the single fetch-and-decode worker. It exits when the request
/// channel closes (sender dropped) or the result channel is orphaned.
pub fn spawn_worker(
    req_rx: mpsc::Receiver<Dispatch>,
    res_tx: mpsc::Sender<LoadResult>,
    fetcher: Arc<dyn ImageFetcher>,
    spec: ThumbSpec,
) -> JoinHandle<()> {
    thread::spawn(move || {
        debug!("loader worker: started");
        while let Ok(req) = req_rx.recv() {
            let start = Instant::now();
            let png = fetcher
                .fetch(&req.url)
                .and_then(|bytes| prepare_thumbnail(&bytes, spec));
            match &png {
                Ok(data) => debug!(
                    "loader worker: card {} done in {:.1}ms ({} bytes)",
                    req.card,
                    start.elapsed().as_secs_f64() * 1000.0,
                    data.len()
                ),
                Err(e) => error!("loader worker: card {} failed: {e:#}", req.card),
            }
            let result = LoadResult {
                epoch: req.epoch,
                card: req.card,
                png,
            };
            if res_tx.send(result).is_err() {
                break;
            }
        }
        debug!("loader worker: channel closed, exiting");
    })
}
