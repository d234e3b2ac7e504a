//! Process-wide detection toggle and the lazily built overlay.
//!
//! The overlay (model session + drawing style) is built the first time a
//! stream renders a frame with detection on. A failed build is remembered:
//! detection is switched off, later frames show a warning caption, and the
//! model is not retried until restart.

use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
};

use log::{debug, error, info, warn};
use opencv::core::Mat;
use pothole_camera::placeholder::{caption, green, red};
use pothole_detect::{DetectError, OrtYolo, Overlay};

use crate::config::DetectionConfig;

pub type OverlayFactory = Box<dyn Fn() -> Result<Overlay, DetectError> + Send + Sync>;

pub const CAPTION_OFF: &str = "Live camera (detection off)";
pub const CAPTION_UNAVAILABLE: &str = "WARNING: detector unavailable - raw frame";
pub const CAPTION_FAILED: &str = "WARNING: detection error - raw frame";

enum OverlaySlot {
    Unloaded,
    Ready(Arc<Overlay>),
    Failed,
}

pub struct DetectionControl {
    enabled: AtomicBool,
    error_logged: AtomicBool,
    last_count: AtomicUsize,
    slot: Mutex<OverlaySlot>,
    factory: OverlayFactory,
}

impl DetectionControl {
    pub fn new(factory: OverlayFactory, enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
            error_logged: AtomicBool::new(false),
            last_count: AtomicUsize::new(0),
            slot: Mutex::new(OverlaySlot::Unloaded),
            factory,
        }
    }

    /// Overlay backed by the ONNX model at `model_path`.
    pub fn from_config(model_path: PathBuf, config: &DetectionConfig) -> Self {
        let config = config.clone();
        let factory: OverlayFactory = Box::new(move || {
            let detector = OrtYolo::new(&model_path, config.input_width, config.input_height)?
                .with_thresholds(config.confidence_threshold, config.iou_threshold);
            Ok(Overlay::new(Box::new(detector), config.labels.clone()))
        });
        Self::new(factory, config.enabled_on_start)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Flip the toggle, returning the new state.
    pub fn toggle(&self) -> bool {
        let enabled = !self.enabled.fetch_xor(true, Ordering::SeqCst);
        info!("detection {}", if enabled { "enabled" } else { "disabled" });
        enabled
    }

    /// Boxes drawn on the most recent frame that went through detection.
    pub fn last_count(&self) -> usize {
        self.last_count.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, OverlaySlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The shared overlay, building it on first use. `None` once a build has failed.
    pub fn overlay(&self) -> Option<Arc<Overlay>> {
        let mut slot = self.lock();
        match &*slot {
            OverlaySlot::Ready(overlay) => return Some(overlay.clone()),
            OverlaySlot::Failed => return None,
            OverlaySlot::Unloaded => {}
        }

        info!("loading detection model");
        match (self.factory)() {
            Ok(overlay) => {
                let overlay = Arc::new(overlay);
                *slot = OverlaySlot::Ready(overlay.clone());
                info!("detection model ready");
                Some(overlay)
            }
            Err(e) => {
                error!("could not load detection model: {e}; detection disabled");
                *slot = OverlaySlot::Failed;
                self.enabled.store(false, Ordering::SeqCst);
                None
            }
        }
    }

    /// Draw boxes or a status caption onto `frame`.
    ///
    /// Detection failures never fail the frame; only drawing the caption can.
    pub fn apply(&self, frame: &mut Mat) -> pothole_camera::Result<()> {
        if !self.is_enabled() {
            self.last_count.store(0, Ordering::SeqCst);
            return caption(frame, CAPTION_OFF, green());
        }

        let Some(overlay) = self.overlay() else {
            self.last_count.store(0, Ordering::SeqCst);
            return caption(frame, CAPTION_UNAVAILABLE, red());
        };

        match overlay.process(frame) {
            Ok(count) => {
                self.last_count.store(count, Ordering::SeqCst);
                Ok(())
            }
            Err(e) => {
                self.note_error(&e);
                self.last_count.store(0, Ordering::SeqCst);
                caption(frame, CAPTION_FAILED, red())
            }
        }
    }

    // First failure at WARN, repeats at DEBUG so a broken model can't flood the log.
    fn note_error(&self, e: &DetectError) {
        if self.error_logged.swap(true, Ordering::SeqCst) {
            debug!("detection failed: {e}");
        } else {
            warn!("detection failed: {e}; showing raw frames");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::{
        core::{Scalar, Vec3b, CV_8UC3},
        prelude::*,
    };
    use pothole_detect::{Detection, Detector};

    struct OneBox;

    impl Detector for OneBox {
        fn detect(&self, _frame: &Mat) -> pothole_detect::Result<Vec<Detection>> {
            Ok(vec![Detection { bbox: [0.25, 0.25, 0.75, 0.75], score: 0.9, class: 0 }])
        }
    }

    struct Broken;

    impl Detector for Broken {
        fn detect(&self, _frame: &Mat) -> pothole_detect::Result<Vec<Detection>> {
            Err(DetectError::InvalidOutputShape(vec![]))
        }
    }

    fn one_box() -> Box<dyn Detector> {
        Box::new(OneBox)
    }

    fn broken() -> Box<dyn Detector> {
        Box::new(Broken)
    }

    fn frame() -> Mat {
        Mat::new_rows_cols_with_default(120, 160, CV_8UC3, Scalar::all(0.0)).unwrap()
    }

    fn changed(frame: &Mat) -> bool {
        frame.data_bytes().unwrap().iter().any(|&b| b != 0)
    }

    fn counting(builds: Arc<AtomicUsize>, detector: fn() -> Box<dyn Detector>) -> OverlayFactory {
        Box::new(move || {
            builds.fetch_add(1, Ordering::SeqCst);
            Ok(Overlay::new(detector(), vec!["pothole".into()]))
        })
    }

    #[test]
    fn toggle_flips_and_reports() {
        let control = DetectionControl::new(counting(Arc::default(), one_box), false);
        assert!(control.toggle());
        assert!(control.is_enabled());
        assert!(!control.toggle());
        assert!(!control.is_enabled());
    }

    #[test]
    fn disabled_draws_green_caption_without_loading() {
        let builds = Arc::new(AtomicUsize::new(0));
        let control = DetectionControl::new(counting(builds.clone(), one_box), false);
        let mut f = frame();
        control.apply(&mut f).unwrap();
        assert!(changed(&f));
        assert_eq!(builds.load(Ordering::SeqCst), 0);
        assert_eq!(control.last_count(), 0);
    }

    #[test]
    fn overlay_is_built_once_and_counts() {
        let builds = Arc::new(AtomicUsize::new(0));
        let control = DetectionControl::new(counting(builds.clone(), one_box), true);
        for _ in 0..3 {
            let mut f = frame();
            control.apply(&mut f).unwrap();
            // box edge at x = 40
            assert_eq!(f.at_2d::<Vec3b>(60, 40).unwrap().0, [255, 85, 0]);
        }
        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert_eq!(control.last_count(), 1);
    }

    #[test]
    fn failed_build_disables_detection_for_good() {
        let builds = Arc::new(AtomicUsize::new(0));
        let counter = builds.clone();
        let control = DetectionControl::new(
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(DetectError::ModelNotFound("missing.onnx".into()))
            }),
            true,
        );

        let mut f = frame();
        control.apply(&mut f).unwrap();
        assert!(changed(&f));
        assert!(!control.is_enabled());

        assert!(control.toggle());
        control.apply(&mut frame()).unwrap();
        assert!(control.overlay().is_none());
        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn detection_errors_fall_back_to_raw_frame() {
        let builds = Arc::new(AtomicUsize::new(0));
        let control = DetectionControl::new(counting(builds, broken), true);
        for _ in 0..2 {
            let mut f = frame();
            control.apply(&mut f).unwrap();
            assert!(changed(&f));
        }
        assert!(control.is_enabled());
        assert_eq!(control.last_count(), 0);
    }
}
