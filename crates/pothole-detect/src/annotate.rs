// pothole-detect/src/annotate.rs
use opencv::{
    core::{Mat, Point, Rect, Scalar},
    imgproc,
    prelude::*,
};

use crate::{Detection, Detector, Result};

/// Box and label appearance.
#[derive(Debug, Clone)]
pub struct OverlayStyle {
    pub box_color: Scalar,
    pub text_color: Scalar,
    pub thickness: i32,
    pub text_scale: f64,
    pub text_thickness: i32,
    pub text_padding: i32,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            box_color: Scalar::new(255.0, 85.0, 0.0, 0.0), // #0055FF in BGR
            text_color: Scalar::new(255.0, 255.0, 255.0, 0.0),
            thickness: 2,
            text_scale: 0.7,
            text_thickness: 1,
            text_padding: 10,
        }
    }
}

/// A detector plus the routine that draws its output.
pub struct Overlay {
    detector: Box<dyn Detector>,
    labels: Vec<String>,
    style: OverlayStyle,
}

impl Overlay {
    pub fn new(detector: Box<dyn Detector>, labels: Vec<String>) -> Self {
        Self { detector, labels, style: OverlayStyle::default() }
    }

    pub fn with_style(mut self, style: OverlayStyle) -> Self {
        self.style = style;
        self
    }

    /// Detect on `frame`, draw the boxes in place and return how many there were.
    pub fn process(&self, frame: &mut Mat) -> Result<usize> {
        let dets = self.detector.detect(frame)?;
        draw_detections(frame, &dets, &self.labels, &self.style)?;
        Ok(dets.len())
    }
}

fn label_for(labels: &[String], det: &Detection) -> String {
    match labels.get(det.class) {
        Some(name) => format!("{name} {:.2}", det.score),
        None => format!("c{} {:.2}", det.class, det.score),
    }
}

/// Draw normalised boxes with a filled label tab above each one.
pub fn draw_detections(
    frame: &mut Mat,
    detections: &[Detection],
    labels: &[String],
    style: &OverlayStyle,
) -> Result<()> {
    let (frame_width, frame_height) = (frame.cols() as f32, frame.rows() as f32);

    for detection in detections {
        let [x1, y1, x2, y2] = detection.bbox;

        // normalized → pixel coordinates
        let px1 = (x1 * frame_width) as i32;
        let py1 = (y1 * frame_height) as i32;
        let px2 = (x2 * frame_width) as i32;
        let py2 = (y2 * frame_height) as i32;

        imgproc::rectangle(
            frame,
            Rect::new(px1, py1, px2 - px1, py2 - py1),
            style.box_color,
            style.thickness,
            imgproc::LINE_8,
            0,
        )?;

        let label = label_for(labels, detection);
        let mut baseline = 0;
        let text = imgproc::get_text_size(
            &label,
            imgproc::FONT_HERSHEY_SIMPLEX,
            style.text_scale,
            style.text_thickness,
            &mut baseline,
        )?;
        let pad = style.text_padding;
        let tab_h = text.height + 2 * pad;
        // tab sits above the box unless that would leave the frame
        let tab_top = if py1 - tab_h >= 0 { py1 - tab_h } else { py1 };

        imgproc::rectangle(
            frame,
            Rect::new(px1, tab_top, text.width + 2 * pad, tab_h),
            style.box_color,
            imgproc::FILLED,
            imgproc::LINE_8,
            0,
        )?;
        imgproc::put_text(
            frame,
            &label,
            Point::new(px1 + pad, tab_top + pad + text.height),
            imgproc::FONT_HERSHEY_SIMPLEX,
            style.text_scale,
            style.text_color,
            style.text_thickness,
            imgproc::LINE_8,
            false,
        )?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DetectError;
    use opencv::core::CV_8UC3;

    struct FixedDetector(Vec<Detection>);

    impl Detector for FixedDetector {
        fn detect(&self, _frame: &Mat) -> Result<Vec<Detection>> {
            Ok(self.0.clone())
        }
    }

    struct BrokenDetector;

    impl Detector for BrokenDetector {
        fn detect(&self, _frame: &Mat) -> Result<Vec<Detection>> {
            Err(DetectError::InvalidOutputShape(vec![1]))
        }
    }

    fn black() -> Mat {
        Mat::new_rows_cols_with_default(200, 200, CV_8UC3, Scalar::all(0.0)).unwrap()
    }

    #[test]
    fn process_counts_and_draws() {
        let overlay = Overlay::new(
            Box::new(FixedDetector(vec![
                Detection { bbox: [0.25, 0.5, 0.75, 0.9], score: 0.87, class: 0 },
                Detection { bbox: [0.0, 0.0, 0.1, 0.1], score: 0.4, class: 0 },
            ])),
            vec!["pothole".into()],
        );
        let mut frame = black();
        assert_eq!(overlay.process(&mut frame).unwrap(), 2);

        // left edge of the first box, halfway down it
        let px = frame.at_2d::<opencv::core::Vec3b>(140, 50).unwrap();
        assert_eq!(px.0, [255, 85, 0]);
    }

    #[test]
    fn empty_detections_leave_frame_alone() {
        let overlay = Overlay::new(Box::new(FixedDetector(vec![])), vec![]);
        let mut frame = black();
        assert_eq!(overlay.process(&mut frame).unwrap(), 0);
        assert!(frame.data_bytes().unwrap().iter().all(|&b| b == 0));
    }

    #[test]
    fn detector_errors_propagate() {
        let overlay = Overlay::new(Box::new(BrokenDetector), vec![]);
        assert!(overlay.process(&mut black()).is_err());
    }

    #[test]
    fn unknown_class_gets_numeric_label() {
        let det = Detection { bbox: [0.0; 4], score: 0.5, class: 3 };
        assert_eq!(label_for(&["pothole".into()], &det), "c3 0.50");
        assert_eq!(label_for(&[], &Detection { class: 0, ..det.clone() }), "c0 0.50");
    }
}
