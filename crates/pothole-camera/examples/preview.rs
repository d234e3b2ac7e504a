// examples/preview.rs
// ------------------------------------------------------------
// Probe devices 0-4, open the first one that works and report FPS.
// cargo run -p pothole-camera --example preview -- [frames]
// ------------------------------------------------------------
use pothole_camera::{CameraManager, CaptureSettings, OpenCvBackend};
use std::{collections::VecDeque, sync::Arc, time::Instant};

const FPS_WINDOW_SIZE: usize = 30;

fn calculate_fps(window: &VecDeque<Instant>) -> f64 {
    match (window.front(), window.back()) {
        (Some(first), Some(last)) if window.len() >= 2 => {
            (window.len() - 1) as f64 / last.duration_since(*first).as_secs_f64()
        }
        _ => 0.0,
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let frames: usize = std::env::args()
        .nth(1)
        .and_then(|a| a.parse().ok())
        .unwrap_or(150);

    let cams = CameraManager::new(Arc::new(OpenCvBackend), CaptureSettings::default(), 0);
    let found = cams.probe(5);
    println!("found {} camera(s): {:?}", found.len(), found);

    let Some(first) = found.first() else {
        eprintln!("no working camera");
        return Ok(());
    };
    let outcome = cams.switch(first.index);
    println!("{}", outcome.message);

    let info = cams.acquire()?;
    println!("{}x{} @ {:.1} fps (driver)", info.width, info.height, info.fps);

    let mut fps_times: VecDeque<Instant> = VecDeque::with_capacity(FPS_WINDOW_SIZE);
    for count in 1..=frames {
        cams.read()?;
        fps_times.push_back(Instant::now());
        if fps_times.len() > FPS_WINDOW_SIZE {
            fps_times.pop_front();
        }
        if count % 30 == 0 {
            eprintln!("frame {count}: {:.1} FPS", calculate_fps(&fps_times));
        }
    }

    cams.release();
    Ok(())
}
