mod common;

use std::thread;

use opencv::{
    core::Vector,
    imgcodecs::{self, IMREAD_COLOR},
    prelude::*,
};

use pothole_server::stream::StreamWorker;
use tempfile::tempdir;
use tokio::sync::mpsc;

fn jpeg_of(part: &[u8]) -> &[u8] {
    let start = part.windows(4).position(|w| w == b"\r\n\r\n").unwrap() + 4;
    &part[start..part.len() - 2]
}

fn content_length(part: &[u8]) -> usize {
    let text = String::from_utf8_lossy(part);
    let line = text.lines().find(|l| l.starts_with("Content-Length: ")).unwrap();
    line["Content-Length: ".len()..].parse().unwrap()
}

// Width of the JPEG carried by a part: 64 for the fake camera, 640 for placeholders.
fn width_of(part: &[u8]) -> i32 {
    let buf = Vector::<u8>::from_slice(jpeg_of(part));
    imgcodecs::imdecode(&buf, IMREAD_COLOR).unwrap().cols()
}

const LIVE: i32 = 64;
const PLACEHOLDER: i32 = 640;

#[test]
fn live_frame_is_a_complete_jpeg_part() {
    let dir = tempdir().unwrap();
    let mut worker = StreamWorker::new(common::state(dir.path(), &[0]));
    let part = worker.next_part().unwrap();
    let jpeg = jpeg_of(&part);
    assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    assert_eq!(content_length(&part), jpeg.len());
    assert_eq!(width_of(&part), LIVE);
}

#[test]
fn missing_camera_yields_placeholder() {
    let dir = tempdir().unwrap();
    let state = common::state(dir.path(), &[]);
    let mut worker = StreamWorker::new(state.clone());
    let part = worker.next_part().unwrap();
    assert_eq!(width_of(&part), PLACEHOLDER);
    assert!(!state.camera.is_open());
}

#[test]
fn device_that_never_delivers_gets_placeholder() {
    let dir = tempdir().unwrap();
    let state = common::state_for(dir.path(), common::FakeBackend::new(&[], &[0]), common::missing_model());
    let mut worker = StreamWorker::new(state);
    for _ in 0..3 {
        let part = worker.next_part().expect("a part every iteration");
        assert_eq!(width_of(&part), PLACEHOLDER);
    }
}

#[test]
fn unplugged_camera_shows_placeholder_then_recovers() {
    let dir = tempdir().unwrap();
    let backend = common::FakeBackend::new(&[0], &[]);
    let state = common::state_for(dir.path(), backend.clone(), common::missing_model());
    let mut worker = StreamWorker::new(state.clone());

    assert_eq!(width_of(&worker.next_part().unwrap()), LIVE);

    backend.unplug(true);
    let part = worker.next_part().unwrap();
    assert_eq!(width_of(&part), PLACEHOLDER);
    assert!(!state.camera.is_open());

    backend.unplug(false);
    assert_eq!(width_of(&worker.next_part().unwrap()), LIVE);
    assert!(state.camera.is_open());
}

#[test]
fn detection_runs_and_counts() {
    let dir = tempdir().unwrap();
    let state = common::state_with(dir.path(), &[0], common::one_box_model(true));
    let mut worker = StreamWorker::new(state.clone());
    assert!(worker.next_part().is_some());
    assert_eq!(state.detection.last_count(), 1);
}

#[test]
fn broken_model_keeps_streaming_and_disables_detection() {
    let dir = tempdir().unwrap();
    let state = common::state(dir.path(), &[0]);
    state.detection.toggle();
    let mut worker = StreamWorker::new(state.clone());
    assert!(worker.next_part().is_some());
    assert!(worker.next_part().is_some());
    assert!(!state.detection.is_enabled());
}

#[test]
fn worker_stops_when_consumer_drops() {
    let dir = tempdir().unwrap();
    let state = common::state(dir.path(), &[0]);
    let worker = StreamWorker::new(state.clone());
    let (tx, mut rx) = mpsc::channel(1);
    let handle = thread::spawn(move || worker.run(tx));

    assert!(rx.blocking_recv().is_some());
    drop(rx);
    handle.join().unwrap();

    // the next viewer still gets the camera
    let (tx, mut rx) = mpsc::channel(1);
    let handle = thread::spawn(move || StreamWorker::new(state).run(tx));
    let part = rx.blocking_recv().unwrap();
    assert_eq!(width_of(&part), LIVE);
    drop(rx);
    handle.join().unwrap();
}

#[test]
fn worker_stops_on_shutdown() {
    let dir = tempdir().unwrap();
    let state = common::state(dir.path(), &[0]);
    state.begin_shutdown();
    let (tx, mut rx) = mpsc::channel(1);
    StreamWorker::new(state).run(tx);
    assert!(rx.blocking_recv().is_none());
}

#[test]
fn streams_share_one_camera() {
    let dir = tempdir().unwrap();
    let state = common::state(dir.path(), &[0]);
    let mut a = StreamWorker::new(state.clone());
    let mut b = StreamWorker::new(state.clone());
    for _ in 0..3 {
        assert!(a.next_part().is_some());
        assert!(b.next_part().is_some());
    }
    assert_eq!(state.camera.current_index(), 0);
    assert!(state.camera.is_open());
}
