//! Pothole viewer – HTTP server
//!
//! Serves the live page, an MJPEG feed with the optional detection overlay,
//! camera selection, and the CSV log of geotagged detections.

pub mod config;
pub mod detection;
pub mod error;
pub mod events;
pub mod logging;
mod pages;
pub mod routes;
pub mod state;
pub mod stream;

pub use routes::router;
pub use state::AppState;
