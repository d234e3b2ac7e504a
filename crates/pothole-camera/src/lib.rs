// pothole-camera/src/lib.rs
// ============================================================
// Camera capture crate for the pothole viewer
// One capture handle per process, shared by every stream and
// guarded by a single mutex. Frames are BGR `opencv::core::Mat`.
// ------------------------------------------------------------
// Public API:
//   * CameraManager::acquire() – open the active device if needed
//   * CameraManager::read()    – next frame from the open device
//   * CameraManager::switch()  – close, open + verify another index
//   * CameraManager::probe()   – list devices that yield a frame
//   * placeholder::error_frame() – captioned stand-in frame
// ------------------------------------------------------------
// Build notes
//   * OpenCV `videoio` backend is always compiled.
//   * `--features gstreamer` adds a v4l2src → appsink backend.
// ============================================================

//! Pothole viewer – camera capture layer
//!
//! A [`CameraBackend`] knows how to open a device index and hand back a
//! boxed [`FrameSource`]. The [`CameraManager`] owns the single shared
//! source, opens it lazily, reopens it after a read failure and swaps it
//! out on [`CameraManager::switch`]. Callers never see a panic from a
//! missing device: every failure comes back as a [`CameraError`] so the
//! stream layer can render a placeholder frame instead.

use opencv::core::Mat;
use thiserror::Error;

mod cv_backend;
#[cfg(feature = "gstreamer")]
mod gst_backend;
mod manager;
pub mod placeholder;

pub use cv_backend::OpenCvBackend;
#[cfg(feature = "gstreamer")]
pub use gst_backend::GstBackend;
pub use manager::{CameraManager, ProbedCamera, SwitchOutcome, DEFAULT_RELEASE_DELAY};

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("camera {index} could not be opened")]
    Open { index: i32 },
    #[error("camera {index} delivered no frame")]
    Read { index: i32 },
    #[error("invalid camera index {0}")]
    InvalidIndex(i32),
    #[error("no camera is open")]
    NotOpen,
    #[error("OpenCV error: {0}")]
    Cv(#[from] opencv::Error),
    #[cfg(feature = "gstreamer")]
    #[error("GStreamer init failed: {0}")]
    GstInit(#[source] gst::glib::Error),
    #[cfg(feature = "gstreamer")]
    #[error("Failed to parse pipeline: {0}")]
    ParsePipeline(#[source] gst::glib::Error),
    #[cfg(feature = "gstreamer")]
    #[error("Pipeline is not a gst::Pipeline")]
    NotPipeline,
    #[cfg(feature = "gstreamer")]
    #[error("AppSink element not found")]
    AppSinkNotFound,
    #[cfg(feature = "gstreamer")]
    #[error("AppSink element downcast failed")]
    AppSinkDowncastFailed,
    #[cfg(feature = "gstreamer")]
    #[error("Failed to set pipeline to Playing: {0}")]
    StateChange(#[source] gst::StateChangeError),
    #[cfg(feature = "gstreamer")]
    #[error("Sample has no buffer")]
    MissingBuffer,
    #[cfg(feature = "gstreamer")]
    #[error("Sample has no caps")]
    MissingCaps,
    #[cfg(feature = "gstreamer")]
    #[error("Caps missing struct")]
    MissingStructure,
    #[cfg(feature = "gstreamer")]
    #[error("Failed to get field value: {0}")]
    FieldError(String),
    #[cfg(feature = "gstreamer")]
    #[error("Buffer map failed: {0}")]
    BufferMap(String),
}

pub type Result<T> = std::result::Result<T, CameraError>;

/// Requested capture format. Drivers are free to pick something close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self { width: 1280, height: 720, fps: 30 }
    }
}

/// What the open device actually negotiated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraInfo {
    pub index: i32,
    pub width: i32,
    pub height: i32,
    pub fps: f64,
}

/// An open device yielding sequential BGR frames.
pub trait FrameSource: Send {
    /// Blocking read of the next frame.
    fn read(&mut self) -> Result<Mat>;

    fn info(&self) -> Result<CameraInfo>;
}

/// Opens devices by index.
pub trait CameraBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn open(&self, index: i32, settings: &CaptureSettings) -> Result<Box<dyn FrameSource>>;
}
