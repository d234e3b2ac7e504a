// examples/visualize.rs
// ------------------------------------------------------------
// Visual smoke-test: run YOLO on one image, draw boxes, save it.
// cargo run -p pothole-detect --example visualize -- <model> <image> [out.jpg]
// ------------------------------------------------------------
use anyhow::{bail, Context, Result};
use opencv::{core::Vector, imgcodecs, prelude::*};
use pothole_detect::{Detector, Overlay, OrtYolo};

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        eprintln!("usage: visualize <model.onnx> <image.jpg> [out.jpg]");
        std::process::exit(1);
    }
    let model_path = &args[1];
    let image_path = &args[2];
    let out_path = args.get(3).map(String::as_str).unwrap_or("annotated.jpg");

    let mut mat = imgcodecs::imread(image_path, imgcodecs::IMREAD_COLOR)
        .with_context(|| format!("reading {}", image_path))?;
    if mat.empty() {
        bail!("{} is not a readable image", image_path);
    }

    let detector = OrtYolo::new(model_path, 640, 640)?;
    for det in detector.detect(&mat)? {
        eprintln!("det box={:?} score={:.3} class={}", det.bbox, det.score, det.class);
    }

    let overlay = Overlay::new(Box::new(detector), vec!["pothole".into()]);
    let count = overlay.process(&mut mat)?;
    eprintln!("visualize: {} detections", count);

    imgcodecs::imwrite(out_path, &mat, &Vector::new())
        .with_context(|| format!("writing {}", out_path))?;
    println!("wrote {}", out_path);
    Ok(())
}
