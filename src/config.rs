use anyhow::{bail, Result};
use clap::Parser;
use std::{net::SocketAddr, path::PathBuf, time::Duration};

use crate::map::MapSettings;

pub const DEFAULT_DATA_URL: &str = "https://data.rennesmetropole.fr/api/explore/v2.1/catalog/datasets/etat-du-trafic-en-temps-reel/exports/json?lang=fr&timezone=Europe%2FBerlin&use_labels=true&delimiter=%3B";

/// Live traffic map with hourly congestion prediction.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Settings {
    /// Interface to listen on.
    #[clap(long, env = "BIND_ADDR", default_value = "0.0.0.0")]
    pub bind: String,

    #[clap(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// Traffic feed returning a JSON array of sensor readings.
    #[clap(long, env = "DATA_URL", default_value = DEFAULT_DATA_URL)]
    pub data_url: String,

    /// Classifier file: `.json` dense export, or `.pt` TorchScript with the `torch` feature.
    #[clap(long, env = "MODEL_PATH", default_value = "models/model.json")]
    pub model_path: PathBuf,

    #[clap(long, env = "FETCH_TIMEOUT_SECS", default_value_t = 30)]
    pub fetch_timeout_secs: u64,

    #[clap(long, env = "LOG_FILE", default_value = "app.log")]
    pub log_file: PathBuf,

    #[clap(long, env = "LOG_MAX_BYTES", default_value_t = 10_000)]
    pub log_max_bytes: u64,

    #[clap(long, env = "LOG_BACKUPS", default_value_t = 1)]
    pub log_backups: usize,

    /// Handlers slower than this log a warning.
    #[clap(long, env = "RESPONSE_TIME_THRESHOLD_SECS", default_value_t = 2.0)]
    pub response_time_threshold_secs: f64,

    /// Share of 5xx responses above which a warning is logged.
    #[clap(long, env = "ERROR_RATE_THRESHOLD", default_value_t = 0.05)]
    pub error_rate_threshold: f64,

    /// Number of recent responses the error rate is computed over.
    #[clap(long, env = "ERROR_RATE_WINDOW", default_value_t = 100)]
    pub error_rate_window: usize,

    #[clap(long, env = "MAP_TITLE", default_value = "Real-time traffic")]
    pub map_title: String,

    #[clap(long, env = "MAP_ZOOM", default_value_t = 10.0)]
    pub map_zoom: f64,

    #[clap(long, env = "MAP_HEIGHT", default_value_t = 500)]
    pub map_height: u32,
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.error_rate_threshold) {
            bail!(
                "error rate threshold must be within 0..=1, got {}",
                self.error_rate_threshold
            );
        }
        if !self.response_time_threshold_secs.is_finite() || self.response_time_threshold_secs < 0.0 {
            bail!(
                "response time threshold must be a non-negative number of seconds, got {}",
                self.response_time_threshold_secs
            );
        }
        if self.error_rate_window == 0 {
            bail!("error rate window must hold at least one response");
        }
        if !self.map_zoom.is_finite() {
            bail!("map zoom must be a number, got {}", self.map_zoom);
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        let addr = format!("{}:{}", self.bind, self.port);
        Ok(addr.parse()?)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn response_time_threshold(&self) -> Duration {
        Duration::from_secs_f64(self.response_time_threshold_secs)
    }

    pub fn map_settings(&self) -> MapSettings {
        MapSettings {
            title: self.map_title.clone(),
            zoom: self.map_zoom,
            height: self.map_height,
            ..MapSettings::default()
        }
    }
}
