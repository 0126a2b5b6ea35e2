use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context as AnyhowContext, Result};
use clap::{Args, Parser};
use serde::Deserialize;

/// Parameters of the pyramidal Lucas-Kanade correspondence search.
#[derive(Debug, Clone, Args, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    /// side of the square integration window, odd
    #[clap(long, default_value = "31")]
    pub win_size: usize,

    /// index of the coarsest pyramid level (0 = no pyramid)
    #[clap(long, default_value = "2")]
    pub max_level: usize,

    #[clap(long, default_value = "20")]
    pub max_iterations: usize,

    /// stop iterating once the update is shorter than this (px)
    #[clap(long, default_value = "0.03")]
    pub epsilon: f64,

    /// minimum eigenvalue of the normalized spatial gradient matrix
    #[clap(long, default_value = "1e-5")]
    pub min_eig_threshold: f64,
}

impl Default for FlowConfig {
    fn default() -> Self {
        FlowConfig {
            win_size: 31,
            max_level: 2,
            max_iterations: 20,
            epsilon: 0.03,
            min_eig_threshold: 1e-5,
        }
    }
}

/// Parameters of the strong-corner detector.
#[derive(Debug, Clone, Args, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// fraction of the strongest response a corner must reach
    #[clap(long, default_value = "0.01")]
    pub quality_level: f64,

    /// minimum euclidean distance between returned corners (px)
    #[clap(long, default_value = "10")]
    pub min_distance: f64,

    #[clap(long, default_value = "3")]
    pub block_size: usize,

    #[clap(long)]
    pub use_harris: bool,

    #[clap(long, default_value = "0.04")]
    pub harris_k: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        DetectorConfig {
            quality_level: 0.01,
            min_distance: 10.,
            block_size: 3,
            use_harris: false,
            harris_k: 0.04,
        }
    }
}

#[derive(Debug, Clone, Args, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// upper bound handed to the corner detector per replenishment
    #[clap(long, default_value = "1000")]
    pub max_feature_count: usize,

    /// replenish whenever fewer features than this survive pruning
    #[clap(long, default_value = "300")]
    pub min_feature_count: usize,

    #[clap(long, default_value = "2000")]
    pub feature_lifetime_ms: u64,

    #[clap(long, default_value = "1000")]
    pub append_interval_ms: u64,

    /// displacements longer than this are treated as mistracks (px)
    #[clap(long, default_value = "50")]
    pub max_tracking_displacement: f64,

    #[clap(flatten)]
    pub flow: FlowConfig,

    #[clap(flatten)]
    pub detector: DetectorConfig,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        TrackerConfig {
            max_feature_count: 1000,
            min_feature_count: 300,
            feature_lifetime_ms: 2000,
            append_interval_ms: 1000,
            max_tracking_displacement: 50.,
            flow: FlowConfig::default(),
            detector: DetectorConfig::default(),
        }
    }
}

impl TrackerConfig {
    pub fn feature_lifetime(&self) -> Duration {
        Duration::from_millis(self.feature_lifetime_ms)
    }

    pub fn append_interval(&self) -> Duration {
        Duration::from_millis(self.append_interval_ms)
    }

    /// Read a JSON tracker configuration. Missing keys keep their defaults.
    pub fn from_json_file(path: &Path) -> Result<TrackerConfig> {
        let file = File::open(path)
            .with_context(|| format!("cannot open tracker config {}", path.display()))?;
        let config = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("invalid tracker config {}", path.display()))?;
        Ok(config)
    }
}

#[derive(Debug, Parser)]
#[clap(about = "Track user-placed regions through a video stream by sparse optical flow")]
pub struct AppConfig {
    /// side of the square region created by a click (px)
    #[clap(long, default_value = "60")]
    pub region_size: i32,

    /// number of frames to process, 0 runs until the source ends
    #[clap(long, default_value = "300")]
    pub frames: u64,

    /// JSON-lines file of commands to replay
    #[clap(long)]
    pub script: Option<PathBuf>,

    /// JSON file overriding the tracker options
    #[clap(long)]
    pub config: Option<PathBuf>,

    /// rerun recording written by the display sink
    #[clap(long, default_value = "./logs/flow_objects.rrd")]
    pub recording: PathBuf,

    /// read frames from this capture device instead of the synthetic scene
    /// (needs the `opencv` feature)
    #[clap(long)]
    pub device: Option<i32>,

    #[clap(long, default_value = "0")]
    pub seed: u64,

    #[clap(flatten)]
    pub tracker: TrackerConfig,
}

impl AppConfig {
    /// Tracker options, taken from `--config` when given.
    pub fn tracker_config(&self) -> Result<TrackerConfig> {
        match &self.config {
            Some(path) => TrackerConfig::from_json_file(path),
            None => Ok(self.tracker.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults_match_default_impl() {
        let app = AppConfig::parse_from(["flow-objects"]);
        let default = TrackerConfig::default();
        assert_eq!(app.region_size, 60);
        assert_eq!(app.tracker.max_feature_count, default.max_feature_count);
        assert_eq!(app.tracker.min_feature_count, default.min_feature_count);
        assert_eq!(app.tracker.feature_lifetime(), Duration::from_millis(2000));
        assert_eq!(app.tracker.append_interval(), Duration::from_millis(1000));
        assert_eq!(app.tracker.max_tracking_displacement, 50.);
        assert_eq!(app.tracker.flow.win_size, default.flow.win_size);
        assert_eq!(app.tracker.flow.max_level, 2);
        assert_eq!(app.tracker.flow.min_eig_threshold, 1e-5);
        assert_eq!(app.tracker.detector.block_size, 3);
        assert!(!app.tracker.detector.use_harris);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: TrackerConfig =
            serde_json::from_str(r#"{"min_feature_count": 50, "flow": {"win_size": 21}}"#).unwrap();
        assert_eq!(config.min_feature_count, 50);
        assert_eq!(config.max_feature_count, 1000);
        assert_eq!(config.flow.win_size, 21);
        assert_eq!(config.flow.max_iterations, 20);
        assert_eq!(config.detector.quality_level, 0.01);
    }
}
