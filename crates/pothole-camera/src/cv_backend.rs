// pothole-camera/src/cv_backend.rs
use log::debug;
use opencv::{core::Mat, prelude::*, videoio};

use crate::{CameraBackend, CameraError, CameraInfo, CaptureSettings, FrameSource, Result};

#[cfg(target_os = "windows")]
const PREFERRED_API: i32 = videoio::CAP_DSHOW;
#[cfg(target_os = "linux")]
const PREFERRED_API: i32 = videoio::CAP_V4L2;
#[cfg(target_os = "macos")]
const PREFERRED_API: i32 = videoio::CAP_AVFOUNDATION;
#[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
const PREFERRED_API: i32 = videoio::CAP_ANY;

// V4L2 uses 3 for "aperture priority" (auto), DirectShow uses 1.
#[cfg(target_os = "linux")]
const AUTO_EXPOSURE_ON: f64 = 3.0;
#[cfg(not(target_os = "linux"))]
const AUTO_EXPOSURE_ON: f64 = 1.0;

/// `videoio::VideoCapture` backend.
///
/// Tries the platform's native capture API first and falls back to
/// `CAP_ANY` when that refuses the device.
#[derive(Debug, Default, Clone, Copy)]
pub struct OpenCvBackend;

impl CameraBackend for OpenCvBackend {
    fn name(&self) -> &'static str {
        "opencv"
    }

    fn open(&self, index: i32, settings: &CaptureSettings) -> Result<Box<dyn FrameSource>> {
        if index < 0 {
            return Err(CameraError::InvalidIndex(index));
        }

        let mut cap = videoio::VideoCapture::new(index, PREFERRED_API)?;
        if !cap.is_opened()? {
            debug!("camera {index}: native capture API refused, trying CAP_ANY");
            cap = videoio::VideoCapture::new(index, videoio::CAP_ANY)?;
        }
        if !cap.is_opened()? {
            return Err(CameraError::Open { index });
        }

        apply_settings(&mut cap, settings)?;
        Ok(Box::new(OpenCvSource { cap, index }))
    }
}

fn apply_settings(cap: &mut videoio::VideoCapture, settings: &CaptureSettings) -> Result<()> {
    let props = [
        (videoio::CAP_PROP_FRAME_WIDTH, settings.width as f64),
        (videoio::CAP_PROP_FRAME_HEIGHT, settings.height as f64),
        (videoio::CAP_PROP_FPS, settings.fps as f64),
        (videoio::CAP_PROP_BUFFERSIZE, 1.0),
        (videoio::CAP_PROP_AUTO_EXPOSURE, AUTO_EXPOSURE_ON),
        (videoio::CAP_PROP_AUTOFOCUS, 1.0),
    ];
    for (prop, value) in props {
        // `false` only means the driver ignored the hint
        if !cap.set(prop, value)? {
            debug!("capture property {prop} = {value} not supported by driver");
        }
    }
    Ok(())
}

struct OpenCvSource {
    cap: videoio::VideoCapture,
    index: i32,
}

impl FrameSource for OpenCvSource {
    fn read(&mut self) -> Result<Mat> {
        let mut frame = Mat::default();
        if !self.cap.read(&mut frame)? || frame.empty() {
            return Err(CameraError::Read { index: self.index });
        }
        Ok(frame)
    }

    fn info(&self) -> Result<CameraInfo> {
        Ok(CameraInfo {
            index: self.index,
            width: self.cap.get(videoio::CAP_PROP_FRAME_WIDTH)? as i32,
            height: self.cap.get(videoio::CAP_PROP_FRAME_HEIGHT)? as i32,
            fps: self.cap.get(videoio::CAP_PROP_FPS)?,
        })
    }
}

impl Drop for OpenCvSource {
    fn drop(&mut self) {
        let _ = self.cap.release();
    }
}
