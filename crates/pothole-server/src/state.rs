use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use log::info;
use pothole_camera::{CameraBackend, CameraManager, OpenCvBackend};

use crate::{
    config::{BackendKind, Settings},
    detection::DetectionControl,
    events::EventLog,
};

/// Shared handles passed to every route and stream worker.
#[derive(Clone)]
pub struct AppState {
    pub camera: Arc<CameraManager>,
    pub events: Arc<EventLog>,
    pub detection: Arc<DetectionControl>,
    pub jpeg_quality: i32,
    pub probe_count: i32,
    closing: Arc<AtomicBool>,
}

impl AppState {
    pub fn new(camera: CameraManager, events: EventLog, detection: DetectionControl) -> Self {
        Self {
            camera: Arc::new(camera),
            events: Arc::new(events),
            detection: Arc::new(detection),
            jpeg_quality: 95,
            probe_count: 5,
            closing: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        let camera = CameraManager::new(
            backend_for(settings.camera.backend),
            settings.capture_settings(),
            settings.camera.index,
        )
        .with_release_delay(settings.release_delay());
        info!(
            "camera {} via {} backend, events in {}",
            settings.camera.index,
            camera.backend_name(),
            settings.events_path.display()
        );

        let detection =
            DetectionControl::from_config(settings.model_path.clone(), &settings.detection);

        Self {
            jpeg_quality: settings.detection.jpeg_quality,
            probe_count: settings.camera.probe_count,
            ..Self::new(camera, EventLog::new(settings.events_path.clone()), detection)
        }
    }

    /// Ask stream workers to stop so graceful shutdown can finish.
    pub fn begin_shutdown(&self) {
        self.closing.store(true, Ordering::SeqCst);
    }

    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }
}

fn backend_for(kind: BackendKind) -> Arc<dyn CameraBackend> {
    match kind {
        BackendKind::Opencv => Arc::new(OpenCvBackend),
        #[cfg(feature = "gstreamer")]
        BackendKind::Gstreamer => Arc::new(pothole_camera::GstBackend),
        #[cfg(not(feature = "gstreamer"))]
        BackendKind::Gstreamer => {
            log::warn!("built without the gstreamer feature; using the OpenCV backend");
            Arc::new(OpenCvBackend)
        }
    }
}
