//! pothole‑preprocess – resize + normalize BGR frames into model tensors.
//!
//! The detector consumes a `[1, 3, H, W]` RGB tensor with values in 0‑1.
//! Frames arrive as 8‑bit BGR `Mat`s straight from the camera, in whatever
//! resolution the driver negotiated. No letterboxing: the frame is stretched
//! to the model size and boxes come back normalised, so the overlay can scale
//! them to any frame size.

use anyhow::{bail, Result};
use ndarray::Array4;
use opencv::{
    core::{Mat, CV_8UC3},
    prelude::*,
};
use resize::{Pixel, Type};
use rgb::FromSlice;

#[derive(Debug, Clone)]
pub struct Preprocessor {
    dst_w: u32,
    dst_h: u32,
}

impl Preprocessor {
    /// Create a pre‑processor that outputs a 1×3×H×W RGB tensor (0‑1.0f32).
    pub fn new(dst_w: u32, dst_h: u32) -> Self {
        Self { dst_w, dst_h }
    }

    /// Output `(width, height)`.
    pub fn dims(&self) -> (u32, u32) {
        (self.dst_w, self.dst_h)
    }

    pub fn run(&self, frame: &Mat) -> Result<Array4<f32>> {
        if frame.typ() != CV_8UC3 {
            bail!("expected an 8-bit 3-channel frame, got Mat type {}", frame.typ());
        }
        if frame.empty() {
            bail!("empty frame");
        }

        // 1. contiguous BGR bytes (ROIs are strided, copy those)
        let owned;
        let frame = if frame.is_continuous() {
            frame
        } else {
            owned = frame.try_clone()?;
            &owned
        };
        let bgr = frame.data_bytes()?;
        let w = frame.cols() as usize;
        let h = frame.rows() as usize;

        // 2. BGR → RGB
        let mut rgb = vec![0u8; w * h * 3];
        bgr_to_rgb(bgr, &mut rgb);

        // 3. Resize to the model input
        let dw = self.dst_w as usize;
        let dh = self.dst_h as usize;
        let mut dst = vec![0u8; dw * dh * 3];
        let mut resizer = resize::new(w, h, dw, dh, Pixel::RGB8, Type::Triangle)?;
        resizer.resize(rgb.as_rgb(), dst.as_rgb_mut())?;

        // 4. Normalize to 0‑1 and lay out as NCHW
        Ok(Array4::from_shape_fn((1, 3, dh, dw), |(_, c, y, x)| {
            dst[(y * dw + x) * 3 + c] as f32 / 255.0
        }))
    }
}

fn bgr_to_rgb(bgr: &[u8], out: &mut [u8]) {
    for (src, dst) in bgr.chunks_exact(3).zip(out.chunks_exact_mut(3)) {
        dst[0] = src[2];
        dst[1] = src[1];
        dst[2] = src[0];
    }
}
