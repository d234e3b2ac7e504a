// Shared fakes for the server integration tests.
#![allow(dead_code)]

use std::{
    path::Path,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use opencv::core::{Mat, Scalar, CV_8UC3};
use pothole_camera::{
    CameraBackend, CameraError, CameraInfo, CameraManager, CaptureSettings, FrameSource,
};
use pothole_detect::{DetectError, Detection, Detector, Overlay};
use pothole_server::{detection::DetectionControl, events::EventLog, AppState};

/// Devices in `working` stream frames; `blind` ones open but never deliver.
/// Setting `unplugged` makes every device fail both reads and opens.
#[derive(Default)]
pub struct FakeBackend {
    pub working: Vec<i32>,
    pub blind: Vec<i32>,
    pub unplugged: Arc<AtomicBool>,
}

impl FakeBackend {
    pub fn new(working: &[i32], blind: &[i32]) -> Arc<Self> {
        Arc::new(Self { working: working.to_vec(), blind: blind.to_vec(), ..Default::default() })
    }

    pub fn unplug(&self, gone: bool) {
        self.unplugged.store(gone, Ordering::SeqCst);
    }
}

struct FakeSource {
    index: i32,
    blind: bool,
    unplugged: Arc<AtomicBool>,
}

impl FrameSource for FakeSource {
    fn read(&mut self) -> pothole_camera::Result<Mat> {
        if self.blind || self.unplugged.load(Ordering::SeqCst) {
            return Err(CameraError::Read { index: self.index });
        }
        Ok(Mat::new_rows_cols_with_default(48, 64, CV_8UC3, Scalar::all(40.0 * self.index as f64))?)
    }

    fn info(&self) -> pothole_camera::Result<CameraInfo> {
        Ok(CameraInfo { index: self.index, width: 64, height: 48, fps: 30.0 })
    }
}

impl CameraBackend for FakeBackend {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn open(&self, index: i32, _: &CaptureSettings) -> pothole_camera::Result<Box<dyn FrameSource>> {
        if self.unplugged.load(Ordering::SeqCst) {
            return Err(CameraError::Open { index });
        }
        let blind = self.blind.contains(&index);
        if self.working.contains(&index) || blind {
            Ok(Box::new(FakeSource { index, blind, unplugged: self.unplugged.clone() }))
        } else {
            Err(CameraError::Open { index })
        }
    }
}

pub struct CentreBox;

impl Detector for CentreBox {
    fn detect(&self, _frame: &Mat) -> pothole_detect::Result<Vec<Detection>> {
        Ok(vec![Detection { bbox: [0.25, 0.25, 0.75, 0.75], score: 0.8, class: 0 }])
    }
}

pub fn missing_model() -> DetectionControl {
    DetectionControl::new(
        Box::new(|| Err(DetectError::ModelNotFound("missing.onnx".into()))),
        false,
    )
}

pub fn one_box_model(enabled: bool) -> DetectionControl {
    DetectionControl::new(
        Box::new(|| Ok(Overlay::new(Box::new(CentreBox), vec!["pothole".into()]))),
        enabled,
    )
}

pub fn state_for(dir: &Path, backend: Arc<FakeBackend>, detection: DetectionControl) -> AppState {
    let camera = CameraManager::new(backend, CaptureSettings::default(), 0)
        .with_release_delay(Duration::ZERO);
    AppState::new(camera, EventLog::new(dir.join("detections.csv")), detection)
}

pub fn state_with(dir: &Path, working: &[i32], detection: DetectionControl) -> AppState {
    state_for(dir, FakeBackend::new(working, &[]), detection)
}

pub fn state(dir: &Path, working: &[i32]) -> AppState {
    state_with(dir, working, missing_model())
}
