use std::path::PathBuf;
use std::time::Duration;

use log::{debug, info};
use serde::Deserialize;

// ---------------------------------------------------------------------------
// ConfigFile — deserialized from TOML (all fields optional)
// ---------------------------------------------------------------------------

#[derive(Default, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub base_url: Option<String>,
    pub placeholder_url: Option<String>,
    pub preload_margin_px: Option<u32>,
    pub visibility_threshold: Option<f32>,
    pub pacing_ms: Option<u64>,
    pub request_timeout_ms: Option<u64>,
    #[serde(default)]
    pub viewer: ViewerConfigFile,
}

#[derive(Default, Deserialize)]
#[serde(default)]
pub struct ViewerConfigFile {
    pub scroll_step: Option<u32>,
    pub frame_budget_ms: Option<u64>,
    pub card_rows: Option<u16>,
    pub thumb_cols: Option<u16>,
}

// ---------------------------------------------------------------------------
// Config — resolved (all fields concrete)
// ---------------------------------------------------------------------------

pub struct Config {
    /// Library root URL; required but may come from the CLI instead.
    pub base_url: Option<String>,
    /// Image substituted as the source when a thumbnail fails to load.
    pub placeholder_url: String,
    /// Extra block-axis region around the viewport eligible for preload.
    pub preload_margin_px: u32,
    /// Fraction of a card that must be inside the extended viewport.
    pub visibility_threshold: f32,
    /// Fixed delay between consecutive thumbnail loads.
    pub pacing: Duration,
    pub request_timeout: Duration,
    pub viewer: ViewerConfig,
}

pub struct ViewerConfig {
    pub scroll_step: u32,
    pub frame_budget: Duration,
    /// Terminal rows per card.
    pub card_rows: u16,
    /// Columns reserved for the thumbnail at the left of each card.
    pub thumb_cols: u16,
}

impl ConfigFile {
    /// Merge CLI values (overwrites non-None fields).
    pub fn merge_cli(&mut self, base_url: Option<String>, placeholder_url: Option<String>) {
        if let Some(ref v) = base_url {
            debug!("config: CLI override base_url={v}");
            self.base_url = base_url;
        }
        if let Some(ref v) = placeholder_url {
            debug!("config: CLI override placeholder_url={v}");
            self.placeholder_url = placeholder_url;
        }
    }

    /// Resolve to a Config by applying defaults to missing fields.
    pub fn resolve(self) -> Config {
        let config = Config {
            base_url: self.base_url,
            placeholder_url: self
                .placeholder_url
                .unwrap_or_else(|| "https://via.placeholder.com/150".into()),
            preload_margin_px: self.preload_margin_px.unwrap_or(50),
            visibility_threshold: self.visibility_threshold.unwrap_or(0.1),
            pacing: Duration::from_millis(self.pacing_ms.unwrap_or(200)),
            request_timeout: Duration::from_millis(self.request_timeout_ms.unwrap_or(10_000)),
            viewer: ViewerConfig {
                scroll_step: self.viewer.scroll_step.unwrap_or(3),
                frame_budget: Duration::from_millis(self.viewer.frame_budget_ms.unwrap_or(32)),
                card_rows: self.viewer.card_rows.unwrap_or(4).max(1),
                thumb_cols: self.viewer.thumb_cols.unwrap_or(10).max(1),
            },
        };
        info!(
            "config: resolved base_url={:?}, placeholder_url={}, preload_margin_px={}, \
             visibility_threshold={}, pacing={}ms, request_timeout={}ms, scroll_step={}, \
             frame_budget={}ms, card_rows={}, thumb_cols={}",
            config.base_url,
            config.placeholder_url,
            config.preload_margin_px,
            config.visibility_threshold,
            config.pacing.as_millis(),
            config.request_timeout.as_millis(),
            config.viewer.scroll_step,
            config.viewer.frame_budget.as_millis(),
            config.viewer.card_rows,
            config.viewer.thumb_cols,
        );
        config
    }
}

/// Resolve the XDG config path for shelv.
fn config_path() -> Option<PathBuf> {
    let config_dir = std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
    Some(config_dir.join("shelv").join("config.toml"))
}

/// Load config file. Returns `ConfigFile::default()` if no file exists.
/// Returns an error if the file exists but cannot be parsed.
pub fn load_config() -> anyhow::Result<ConfigFile> {
    let path = match config_path() {
        Some(p) => p,
        None => {
            info!("config: no HOME or XDG_CONFIG_HOME set, using defaults");
            return Ok(ConfigFile::default());
        }
    };
    debug!("config: looking for {}", path.display());
    match std::fs::read_to_string(&path) {
        Ok(text) => {
            info!("config: loaded from {}", path.display());
            let cfg: ConfigFile = toml::from_str(&text)
                .map_err(|e| anyhow::anyhow!("failed to parse {}: {e}", path.display()))?;
            Ok(cfg)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!("config: {} not found, using defaults", path.display());
            Ok(ConfigFile::default())
        }
        Err(e) => Err(anyhow::anyhow!("failed to read {}: {e}", path.display())),
    }
}
