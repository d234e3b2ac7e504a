//! Startup configuration: an optional JSON file, then command-line overrides.
//!
//! Nothing here is fatal. A missing or malformed file falls back to the
//! defaults and the caller logs the returned error as a warning once logging
//! is up.

use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::LevelFilter;
use pothole_camera::CaptureSettings;
use serde::{Deserialize, Serialize};

/// Capture backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Opencv,
    Gstreamer,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Device index opened at startup
    pub index: i32,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub backend: BackendKind,
    /// `/available_cameras` probes indices `0..probe_count`
    pub probe_count: i32,
    /// Pause after releasing a device before opening another
    pub release_delay_ms: u64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        let capture = CaptureSettings::default();
        Self {
            index: 0,
            width: capture.width,
            height: capture.height,
            fps: capture.fps,
            backend: BackendKind::Opencv,
            probe_count: 5,
            release_delay_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Model input size
    pub input_width: u32,
    pub input_height: u32,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    /// Class names indexed by class id
    pub labels: Vec<String>,
    pub jpeg_quality: i32,
    pub enabled_on_start: bool,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            input_width: 640,
            input_height: 640,
            confidence_threshold: pothole_detect::DEFAULT_CONF_THR,
            iou_threshold: pothole_detect::DEFAULT_IOU_THR,
            labels: vec!["pothole".to_string()],
            jpeg_quality: 95,
            enabled_on_start: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub bind: String,
    pub model_path: PathBuf,
    pub events_path: PathBuf,
    pub log_file: PathBuf,
    pub camera: CameraConfig,
    pub detection: DetectionConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:5000".to_string(),
            model_path: PathBuf::from("best.onnx"),
            events_path: PathBuf::from("detections.csv"),
            log_file: PathBuf::from("pothole_server.log"),
            camera: CameraConfig::default(),
            detection: DetectionConfig::default(),
        }
    }
}

/// Command line. Every option overrides the matching config-file value.
#[derive(Parser, Debug)]
#[command(name = "pothole-server", version, about = "Live camera viewer with pothole detection")]
pub struct Cli {
    /// JSON settings file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Listen address, e.g. 0.0.0.0:5000
    #[arg(long)]
    pub bind: Option<String>,

    /// ONNX detection model
    #[arg(long)]
    pub model: Option<PathBuf>,

    /// CSV event log
    #[arg(long)]
    pub events: Option<PathBuf>,

    /// Initial camera index
    #[arg(long)]
    pub camera: Option<i32>,

    #[arg(long, value_enum)]
    pub backend: Option<BackendKind>,

    #[arg(long)]
    pub log_file: Option<PathBuf>,

    #[arg(long, default_value = "info")]
    pub log_level: LevelFilter,
}

impl Settings {
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("cannot read config {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("invalid config {}", path.display()))
    }

    /// Resolve the effective settings. The error, if any, is a config file
    /// that could not be used; defaults were substituted for it.
    pub fn load(cli: &Cli) -> (Self, Option<anyhow::Error>) {
        let (mut settings, warning) = match &cli.config {
            Some(path) => match Self::from_file(path) {
                Ok(settings) => (settings, None),
                Err(e) => (Self::default(), Some(e)),
            },
            None => (Self::default(), None),
        };
        settings.apply_overrides(cli);
        (settings, warning)
    }

    fn apply_overrides(&mut self, cli: &Cli) {
        if let Some(bind) = &cli.bind {
            self.bind = bind.clone();
        }
        if let Some(model) = &cli.model {
            self.model_path = model.clone();
        }
        if let Some(events) = &cli.events {
            self.events_path = events.clone();
        }
        if let Some(index) = cli.camera {
            self.camera.index = index;
        }
        if let Some(backend) = cli.backend {
            self.camera.backend = backend;
        }
        if let Some(log_file) = &cli.log_file {
            self.log_file = log_file.clone();
        }
    }

    pub fn capture_settings(&self) -> CaptureSettings {
        CaptureSettings {
            width: self.camera.width,
            height: self.camera.height,
            fps: self.camera.fps,
        }
    }

    pub fn release_delay(&self) -> Duration {
        Duration::from_millis(self.camera.release_delay_ms)
    }
}
