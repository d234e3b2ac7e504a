// pothole-camera/src/gst_backend.rs
// GStreamer capture: v4l2src → videoconvert → BGR appsink.
// Frames are mapped and copied row by row into a Mat so the
// rest of the pipeline never sees GStreamer types.

use gst::prelude::*;
use log::debug;
use opencv::{
    core::{Mat, Scalar, CV_8UC3},
    prelude::*,
};

use crate::{CameraBackend, CameraError, CameraInfo, CaptureSettings, FrameSource, Result};

/// How long a pull may block before the device is considered lost.
const PULL_TIMEOUT_SECS: u64 = 2;

#[derive(Debug, Default, Clone, Copy)]
pub struct GstBackend;

impl CameraBackend for GstBackend {
    fn name(&self) -> &'static str {
        "gstreamer"
    }

    fn open(&self, index: i32, settings: &CaptureSettings) -> Result<Box<dyn FrameSource>> {
        if index < 0 {
            return Err(CameraError::InvalidIndex(index));
        }
        gst::init().map_err(CameraError::GstInit)?;

        let pipe_str = format!(
            "v4l2src device=/dev/video{index} ! videoconvert ! videoscale \
            ! video/x-raw,format=BGR,width={w},height={h},framerate={f}/1 \
            ! queue leaky=2 max-size-buffers=2 ! appsink name=sink sync=false max-buffers=1 drop=true",
            index = index, w = settings.width, h = settings.height, f = settings.fps
        );
        debug!("camera {index}: launching `{pipe_str}`");

        let pipeline = gst::parse::launch(&pipe_str)
            .map_err(CameraError::ParsePipeline)?
            .downcast::<gst::Pipeline>()
            .map_err(|_| CameraError::NotPipeline)?;

        let appsink = pipeline
            .by_name("sink")
            .ok_or(CameraError::AppSinkNotFound)?
            .downcast::<gst_app::AppSink>()
            .map_err(|_| CameraError::AppSinkDowncastFailed)?;

        // Built before the state change so Drop tears the pipeline down on failure.
        let source = GstSource {
            pipeline,
            appsink,
            index,
            width: settings.width as i32,
            height: settings.height as i32,
            fps: settings.fps as f64,
        };

        source
            .pipeline
            .set_state(gst::State::Playing)
            .map_err(CameraError::StateChange)?;
        let (res, _, _) = source
            .pipeline
            .state(gst::ClockTime::from_seconds(PULL_TIMEOUT_SECS));
        if res.is_err() {
            return Err(CameraError::Open { index });
        }

        Ok(Box::new(source))
    }
}

struct GstSource {
    pipeline: gst::Pipeline,
    appsink: gst_app::AppSink,
    index: i32,
    width: i32,
    height: i32,
    fps: f64,
}

impl GstSource {
    /// Copy a BGR `gst::Sample` into an owned Mat, honouring row padding.
    fn sample_to_mat(&mut self, sample: gst::Sample) -> Result<Mat> {
        let buffer = sample.buffer().ok_or(CameraError::MissingBuffer)?;
        let caps = sample.caps().ok_or(CameraError::MissingCaps)?;
        let s = caps.structure(0).ok_or(CameraError::MissingStructure)?;
        let width = s.get::<i32>("width").map_err(|e| CameraError::FieldError(e.to_string()))?;
        let height = s.get::<i32>("height").map_err(|e| CameraError::FieldError(e.to_string()))?;

        let map = buffer
            .map_readable()
            .map_err(|e| CameraError::BufferMap(e.to_string()))?;
        let bytes = map.as_slice();
        let row_bytes = width as usize * 3;
        let stride = bytes.len() / height.max(1) as usize;
        if stride < row_bytes {
            return Err(CameraError::BufferMap(format!(
                "{} bytes is too short for {width}x{height} BGR",
                bytes.len()
            )));
        }

        let mut mat = Mat::new_rows_cols_with_default(height, width, CV_8UC3, Scalar::all(0.0))?;
        let dst = mat.data_bytes_mut()?;
        for (y, row) in dst.chunks_exact_mut(row_bytes).enumerate() {
            let start = y * stride;
            row.copy_from_slice(&bytes[start..start + row_bytes]);
        }

        self.width = width;
        self.height = height;
        Ok(mat)
    }
}

impl FrameSource for GstSource {
    fn read(&mut self) -> Result<Mat> {
        let sample = self
            .appsink
            .try_pull_sample(gst::ClockTime::from_seconds(PULL_TIMEOUT_SECS))
            .ok_or(CameraError::Read { index: self.index })?;
        self.sample_to_mat(sample)
    }

    fn info(&self) -> Result<CameraInfo> {
        Ok(CameraInfo {
            index: self.index,
            width: self.width,
            height: self.height,
            fps: self.fps,
        })
    }
}

impl Drop for GstSource {
    fn drop(&mut self) {
        let _ = self.pipeline.set_state(gst::State::Null);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[ignore]
    #[serial]
    fn capture_one() {
        let mut src = GstBackend.open(0, &CaptureSettings { width: 640, height: 480, fps: 30 }).expect("create");
        let frame = src.read().expect("frame");
        assert_eq!(frame.cols(), 640);
        assert_eq!(frame.rows(), 480);
    }
}
