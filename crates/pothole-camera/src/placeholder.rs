//! Stand-in frames and captions drawn with OpenCV's Hershey fonts.

use opencv::{
    core::{Mat, Point, Scalar, CV_8UC3},
    imgproc,
};

use crate::Result;

pub const PLACEHOLDER_WIDTH: i32 = 640;
pub const PLACEHOLDER_HEIGHT: i32 = 480;

/// BGR red.
pub fn red() -> Scalar {
    Scalar::new(0.0, 0.0, 255.0, 0.0)
}

/// BGR green.
pub fn green() -> Scalar {
    Scalar::new(0.0, 255.0, 0.0, 0.0)
}

/// Black 640×480 frame with one red caption per line, the first one larger.
pub fn error_frame(lines: &[&str]) -> Result<Mat> {
    let mut frame = Mat::new_rows_cols_with_default(
        PLACEHOLDER_HEIGHT,
        PLACEHOLDER_WIDTH,
        CV_8UC3,
        Scalar::all(0.0),
    )?;
    let top = PLACEHOLDER_HEIGHT / 2 - 20 * lines.len() as i32;
    for (i, line) in lines.iter().enumerate() {
        let scale = if i == 0 { 0.7 } else { 0.6 };
        put_line(&mut frame, line, Point::new(50, top + 40 * i as i32), scale, red())?;
    }
    Ok(frame)
}

/// Status line in the top-left corner of a live frame.
pub fn caption(frame: &mut Mat, text: &str, color: Scalar) -> Result<()> {
    put_line(frame, text, Point::new(10, 30), 0.7, color)
}

fn put_line(frame: &mut Mat, text: &str, org: Point, scale: f64, color: Scalar) -> Result<()> {
    imgproc::put_text(
        frame,
        text,
        org,
        imgproc::FONT_HERSHEY_SIMPLEX,
        scale,
        color,
        2,
        imgproc::LINE_8,
        false,
    )?;
    Ok(())
}
