//! Geotagged detection log, persisted as CSV.
//!
//! Columns are fixed: `timestamp,latitude,longitude,confidence,pothole_count`.
//! Appends from concurrent requests are serialised in-process so rows never
//! interleave; the file is the only store.

use std::{
    fs::{self, OpenOptions},
    io,
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard, PoisonError},
};

use chrono::Local;
use log::info;
use serde::{de, Deserialize, Deserializer, Serialize};
use thiserror::Error;

pub const HEADER: [&str; 5] = ["timestamp", "latitude", "longitude", "confidence", "pothole_count"];
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One persisted detection event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionEvent {
    /// Local wall-clock time, `YYYY-MM-DD HH:MM:SS`
    pub timestamp: String,
    pub latitude: f64,
    pub longitude: f64,
    pub confidence: f64,
    pub pothole_count: u32,
}

/// Body of `POST /save_detection`. Coordinates are required, the rest default.
///
/// Browsers send numbers as JSON numbers or strings depending on the form,
/// so every field accepts either; counts may arrive as `2.0`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewDetection {
    #[serde(default, deserialize_with = "loose_f64")]
    pub latitude: Option<f64>,
    #[serde(default, deserialize_with = "loose_f64")]
    pub longitude: Option<f64>,
    #[serde(default, deserialize_with = "loose_f64")]
    pub confidence: Option<f64>,
    #[serde(default, deserialize_with = "loose_count")]
    pub pothole_count: Option<u32>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Loose {
    Number(f64),
    Text(String),
}

fn loose_f64<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<f64>, D::Error> {
    match Option::<Loose>::deserialize(d)? {
        None => Ok(None),
        Some(Loose::Number(n)) => Ok(Some(n)),
        Some(Loose::Text(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| de::Error::custom(format!("`{s}` is not a number"))),
    }
}

fn loose_count<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<u32>, D::Error> {
    match loose_f64(d)? {
        None => Ok(None),
        Some(n) if n.fract() == 0.0 && (0.0..=u32::MAX as f64).contains(&n) => Ok(Some(n as u32)),
        Some(n) => Err(de::Error::custom(format!("{n} is not a valid count"))),
    }
}

#[derive(Debug, Error)]
pub enum EventLogError {
    #[error("GPS coordinates missing")]
    MissingCoordinates,
    #[error("event log I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error("event log is malformed: {0}")]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, EventLogError>;

pub struct EventLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl EventLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), write_lock: Mutex::new(()) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // Missing and zero-length files both still need their header row.
    fn is_blank(&self) -> bool {
        fs::metadata(&self.path).map(|m| m.len() == 0).unwrap_or(true)
    }

    /// Every stored event in file order. A missing or empty log gets just
    /// the header and reads as empty.
    pub fn list_all(&self) -> Result<Vec<DetectionEvent>> {
        if self.is_blank() {
            self.write_header()?;
            return Ok(Vec::new());
        }
        let mut reader = csv::Reader::from_path(&self.path)?;
        let events: Vec<DetectionEvent> = reader.deserialize().collect::<std::result::Result<_, _>>()?;
        Ok(events)
    }

    fn write_header(&self) -> Result<()> {
        let _guard = self.lock();
        // an append may have landed while we waited for the lock
        if !self.is_blank() {
            return Ok(());
        }
        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        let mut writer = csv::Writer::from_writer(file);
        writer.write_record(HEADER)?;
        writer.flush()?;
        info!("created event log {}", self.path.display());
        Ok(())
    }

    /// Stamp `new` with the current local time and append it.
    pub fn append(&self, new: NewDetection) -> Result<DetectionEvent> {
        let (Some(latitude), Some(longitude)) = (new.latitude, new.longitude) else {
            return Err(EventLogError::MissingCoordinates);
        };
        let event = DetectionEvent {
            timestamp: Local::now().format(TIMESTAMP_FORMAT).to_string(),
            latitude,
            longitude,
            confidence: new.confidence.unwrap_or(0.0),
            pothole_count: new.pothole_count.unwrap_or(1),
        };

        let _guard = self.lock();
        let fresh = self.is_blank();
        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        let mut writer = csv::WriterBuilder::new().has_headers(fresh).from_writer(file);
        writer.serialize(&event)?;
        writer.flush()?;
        Ok(event)
    }
}
