// pothole-detect/src/lib.rs
// ============================================================
// pothole-detect  –  Object-detection overlay for the viewer
// Runs a YOLOv8/YOLO11-style ONNX export through ONNX Runtime
// and draws the surviving boxes onto the live frame.
// ------------------------------------------------------------
// Pipeline: Mat (BGR) → Array4<f32> → Vec<Detection> → Mat
// ------------------------------------------------------------
// Public API
//   * OrtYolo::new(path, w, h)  – load & optimise ONNX
//   * Detector::detect(frame)   – returns Vec<Detection>
//   * Overlay::process(frame)   – detect + annotate, returns count
// ============================================================

//! Pothole viewer – detection layer
//!
//! A backend-agnostic [`Detector`] trait plus a concrete [`OrtYolo`]
//! implementation. Output is a vector of [`Detection`]s with normalised
//! corner boxes, so callers can scale them onto frames of any size.
//! [`Overlay`] pairs a detector with the drawing routine and is what the
//! streaming layer actually holds.

use std::path::{Path, PathBuf};

use log::info;
use ndarray::{ArrayView2, Axis, Ix2};
use opencv::core::Mat;
use ort::session::{builder::GraphOptimizationLevel, Session};
use pothole_preprocess::Preprocessor;
use thiserror::Error;

mod annotate;
pub use annotate::{draw_detections, Overlay, OverlayStyle};

pub const DEFAULT_CONF_THR: f32 = 0.25;
pub const DEFAULT_IOU_THR: f32 = 0.45;
const MAX_DETECTIONS: usize = 300;

#[derive(Debug, Error)]
pub enum DetectError {
    #[error("model file {} not found", .0.display())]
    ModelNotFound(PathBuf),
    #[error("ONNX Runtime error: {0}")]
    Ort(#[from] ort::Error),
    #[error("OpenCV error: {0}")]
    Cv(#[from] opencv::Error),
    #[error("preprocess failed: {0}")]
    Preprocess(#[source] anyhow::Error),
    #[error("Invalid output shape: expected [1, 4+classes, N], got {0:?}")]
    InvalidOutputShape(Vec<usize>),
}

pub type Result<T> = std::result::Result<T, DetectError>;

/// A single detection: bounding box [x1,y1,x2,y2] in normalized coords plus score.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub bbox:  [f32; 4],
    pub score: f32,
    pub class: usize,
}

/// Trait for object detectors.
pub trait Detector: Send + Sync {
    fn detect(&self, frame: &Mat) -> Result<Vec<Detection>>;
}

// ------------------------------------------------------------
// helpers: IoU • NMS • decode
// ------------------------------------------------------------
fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let ix1 = a[0].max(b[0]);
    let iy1 = a[1].max(b[1]);
    let ix2 = a[2].min(b[2]);
    let iy2 = a[3].min(b[3]);
    let iw  = (ix2 - ix1).max(0.0);
    let ih  = (iy2 - iy1).max(0.0);
    let inter = iw * ih;
    let area_a = (a[2] - a[0]) * (a[3] - a[1]);
    let area_b = (b[2] - b[0]) * (b[3] - b[1]);
    inter / (area_a + area_b - inter + 1e-6)
}

/// Greedy, class-agnostic NMS. Highest score wins.
pub fn non_max_suppression(mut dets: Vec<Detection>, iou_thr: f32) -> Vec<Detection> {
    dets.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut keep: Vec<Detection> = Vec::with_capacity(dets.len());

    'outer: for d in dets {
        for k in &keep {
            if iou(&d.bbox, &k.bbox) > iou_thr {
                continue 'outer;
            }
        }
        keep.push(d);
        if keep.len() >= MAX_DETECTIONS { break }
    }
    keep
}

/// Decode a `[4 + classes, anchors]` prediction matrix.
///
/// Rows 0‑3 are centre-x, centre-y, width, height in input pixels; the
/// remaining rows are per-class scores (already sigmoid-activated in
/// ultralytics exports).
pub fn decode(preds: ArrayView2<'_, f32>, input_w: f32, input_h: f32, conf_thr: f32) -> Vec<Detection> {
    let rows = preds.shape()[0];
    let mut dets = Vec::new();
    if rows < 5 {
        return dets;
    }

    for (anchor, col) in preds.axis_iter(Axis(1)).enumerate() {
        let Some((class, score)) = (4..rows)
            .map(|r| (r - 4, col[r]))
            .max_by(|a, b| a.1.total_cmp(&b.1))
        else {
            continue;
        };
        if score < conf_thr {
            continue;
        }

        let (cx, cy, w, h) = (col[0], col[1], col[2], col[3]);
        dets.push(Detection {
            bbox: [
                ((cx - w / 2.0) / input_w).clamp(0.0, 1.0),
                ((cy - h / 2.0) / input_h).clamp(0.0, 1.0),
                ((cx + w / 2.0) / input_w).clamp(0.0, 1.0),
                ((cy + h / 2.0) / input_h).clamp(0.0, 1.0),
            ],
            score,
            class,
        });
        log::trace!("anchor {anchor}: class {class} score {score:.3}");
    }
    dets
}

/// ONNX Runtime powered YOLO detector.
pub struct OrtYolo {
    session: Session,
    preprocessor: Preprocessor,
    input_name: String,
    output_name: String,
    conf_thr: f32,
    iou_thr: f32,
}

impl OrtYolo {
    /// Load and optimize the ONNX model for a `width`×`height` input.
    pub fn new(model_path: impl AsRef<Path>, width: u32, height: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        if !model_path.exists() {
            return Err(DetectError::ModelNotFound(model_path.to_path_buf()));
        }

        let threads = num_cpus::get().saturating_sub(1).max(1);
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(threads)?
            .commit_from_file(model_path)?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .unwrap_or_else(|| "images".to_string());
        let output_name = session
            .outputs
            .first()
            .map(|o| o.name.clone())
            .unwrap_or_else(|| "output0".to_string());

        info!(
            "loaded {} ({}×{}, input `{}`, {} intra threads)",
            model_path.display(), width, height, input_name, threads
        );

        Ok(Self {
            session,
            preprocessor: Preprocessor::new(width, height),
            input_name,
            output_name,
            conf_thr: DEFAULT_CONF_THR,
            iou_thr: DEFAULT_IOU_THR,
        })
    }

    pub fn with_thresholds(mut self, conf_thr: f32, iou_thr: f32) -> Self {
        self.conf_thr = conf_thr;
        self.iou_thr = iou_thr;
        self
    }
}

impl Detector for OrtYolo {
    fn detect(&self, frame: &Mat) -> Result<Vec<Detection>> {
        // 1) BGR frame → [1,3,H,W] tensor
        let input = self.preprocessor.run(frame).map_err(DetectError::Preprocess)?;

        // 2) Run the model
        let outputs = self
            .session
            .run(ort::inputs![self.input_name.as_str() => input.view()]?)?;
        let output = outputs[self.output_name.as_str()].try_extract_tensor::<f32>()?;

        // 3) [1, 4+nc, N] → [4+nc, N]
        let shape = output.shape().to_vec();
        if shape.len() != 3 || shape[0] != 1 {
            return Err(DetectError::InvalidOutputShape(shape));
        }
        let preds = output
            .index_axis(Axis(0), 0)
            .into_dimensionality::<Ix2>()
            .map_err(|_| DetectError::InvalidOutputShape(shape.clone()))?;

        // 4) decode + NMS
        let (w, h) = self.preprocessor.dims();
        let dets = decode(preds, w as f32, h as f32, self.conf_thr);
        Ok(non_max_suppression(dets, self.iou_thr))
    }
}
