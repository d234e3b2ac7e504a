// pothole-server/src/stream.rs
//
// One worker thread per connected viewer:
//   camera → mirror → overlay/caption → JPEG → multipart part → channel
// The bounded channel is the back-pressure; the worker stops when the
// consumer is dropped or the server starts shutting down.

use std::{thread, time::Duration};

use anyhow::Context;
use axum::body::Bytes;
use futures_core::Stream;
use log::{debug, error, info, warn};
use opencv::{
    core::{self, Mat, Vector},
    imgcodecs,
    prelude::*,
};
use pothole_camera::placeholder::error_frame;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::state::AppState;

pub const BOUNDARY: &str = "frame";
pub const CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

const DEPTH: usize = 4;
const OPEN_RETRY: Duration = Duration::from_secs(1);

/// Wrap one JPEG as a part of the `multipart/x-mixed-replace` body.
pub fn multipart_part(jpeg: &[u8]) -> Bytes {
    let head = format!(
        "--{BOUNDARY}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        jpeg.len()
    );
    let mut part = Vec::with_capacity(head.len() + jpeg.len() + 2);
    part.extend_from_slice(head.as_bytes());
    part.extend_from_slice(jpeg);
    part.extend_from_slice(b"\r\n");
    Bytes::from(part)
}

pub fn encode_jpeg(frame: &Mat, quality: i32) -> anyhow::Result<Vec<u8>> {
    let mut buf = Vector::<u8>::new();
    let params = Vector::from_slice(&[imgcodecs::IMWRITE_JPEG_QUALITY, quality]);
    let ok = imgcodecs::imencode(".jpg", frame, &mut buf, &params)?;
    anyhow::ensure!(ok, "JPEG encoder rejected the frame");
    Ok(buf.to_vec())
}

/// Endless MJPEG body for one client.
pub fn mjpeg_stream(state: AppState) -> impl Stream<Item = Bytes> {
    let (tx, rx) = mpsc::channel(DEPTH);
    let worker = StreamWorker::new(state);

    if let Err(e) = thread::Builder::new()
        .name("mjpeg".into())
        .spawn(move || worker.run(tx))
    {
        // dropping the sender ends the body straight away
        error!("could not start stream worker: {e}");
    }

    ReceiverStream::new(rx)
}

pub struct StreamWorker {
    state: AppState,
    sent: u64,
    placeholder_failed: bool,
}

impl StreamWorker {
    pub fn new(state: AppState) -> Self {
        Self { state, sent: 0, placeholder_failed: false }
    }

    pub fn run(mut self, tx: mpsc::Sender<Bytes>) {
        info!("stream started (camera {})", self.state.camera.current_index());
        while !tx.is_closed() && !self.state.is_closing() {
            let Some(part) = self.next_part() else {
                continue;
            };
            if tx.blocking_send(part).is_err() {
                break; // consumer dropped
            }
            self.sent += 1;
        }
        info!("stream ended after {} frames", self.sent);
    }

    /// Produce the next part, or `None` when this iteration yields nothing to send.
    pub fn next_part(&mut self) -> Option<Bytes> {
        let camera = self.state.camera.clone();

        if let Err(e) = camera.acquire() {
            let index = camera.current_index();
            warn!("camera {index} unavailable: {e}");
            let part = self.placeholder(&[
                "Camera could not be opened!",
                &format!("Trying camera index: {index}"),
            ]);
            thread::sleep(OPEN_RETRY);
            return part;
        }

        let frame = camera.read().or_else(|e| {
            warn!("camera read failed ({e}), reopening");
            camera.reopen().and_then(|_| camera.read())
        });
        match frame {
            Ok(frame) => self.live(&frame),
            Err(e) => {
                warn!("camera {} lost: {e}", camera.current_index());
                self.placeholder(&["Camera connection lost!"])
            }
        }
    }

    fn live(&self, frame: &Mat) -> Option<Bytes> {
        match self.render(frame) {
            Ok(jpeg) => Some(multipart_part(&jpeg)),
            Err(e) => {
                warn!("dropping frame: {e:#}");
                None
            }
        }
    }

    fn render(&self, frame: &Mat) -> anyhow::Result<Vec<u8>> {
        let mut mirrored = Mat::default();
        core::flip(frame, &mut mirrored, 1).context("mirror")?;
        self.state.detection.apply(&mut mirrored).context("overlay")?;
        encode_jpeg(&mirrored, self.state.jpeg_quality)
    }

    fn placeholder(&mut self, lines: &[&str]) -> Option<Bytes> {
        let jpeg = error_frame(lines)
            .map_err(anyhow::Error::from)
            .and_then(|frame| encode_jpeg(&frame, self.state.jpeg_quality));
        match jpeg {
            Ok(jpeg) => Some(multipart_part(&jpeg)),
            Err(e) => {
                if self.placeholder_failed {
                    debug!("placeholder frame failed: {e:#}");
                } else {
                    warn!("placeholder frame failed: {e:#}");
                    self.placeholder_failed = true;
                }
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::core::{Scalar, CV_8UC3};

    #[test]
    fn part_layout() {
        let part = multipart_part(b"JPEG");
        assert_eq!(
            &part[..],
            b"--frame\r\nContent-Type: image/jpeg\r\nContent-Length: 4\r\n\r\nJPEG\r\n"
        );
    }

    #[test]
    fn encodes_jpeg_with_soi_marker() {
        let frame = Mat::new_rows_cols_with_default(48, 64, CV_8UC3, Scalar::all(90.0)).unwrap();
        let jpeg = encode_jpeg(&frame, 95).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        let smaller = encode_jpeg(&frame, 10).unwrap();
        assert!(smaller.len() <= jpeg.len());
    }

    #[test]
    fn empty_frame_does_not_encode() {
        assert!(encode_jpeg(&Mat::default(), 95).is_err());
    }
}
