//! HTTP surface. Camera and file work runs on the blocking pool so a slow
//! device open or probe never stalls the async workers.

use std::{convert::Infallible, io};

use axum::{
    body::Body,
    extract::{Path, State},
    http::header,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use log::{error, info, warn};
use serde_json::{json, Value};
use tokio::task::spawn_blocking;
use tokio_stream::StreamExt;

use crate::{
    error::ServerError,
    events::{EventLogError, NewDetection},
    pages,
    state::AppState,
    stream::{self, mjpeg_stream},
};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/test", get(health))
        .route("/video_feed", get(video_feed))
        .route("/detection_count", get(detection_count))
        .route("/camera_info", get(camera_info))
        .route("/available_cameras", get(available_cameras))
        .route("/switch_camera/:index", get(switch_camera))
        .route("/toggle_yolo", get(toggle_yolo))
        .route("/yolo_status", get(yolo_status))
        .route("/map", get(map))
        .route("/get_detections", get(get_detections))
        .route("/save_detection", post(save_detection))
        .route("/download_csv", get(download_csv))
        .with_state(state)
}

async fn index() -> Html<&'static str> {
    Html(pages::INDEX)
}

async fn map() -> Html<&'static str> {
    Html(pages::MAP)
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "OK",
        "message": "Server is running",
        "camera_index": state.camera.current_index(),
    }))
}

async fn video_feed(State(state): State<AppState>) -> impl IntoResponse {
    info!("video feed requested");
    let body = Body::from_stream(mjpeg_stream(state).map(Ok::<_, Infallible>));
    (
        [
            (header::CONTENT_TYPE, stream::CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        body,
    )
}

async fn detection_count(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "detections": state.detection.last_count() }))
}

async fn camera_info(State(state): State<AppState>) -> Result<Json<Value>, ServerError> {
    let camera = state.camera.clone();
    let (info, index) = spawn_blocking(move || (camera.info(), camera.current_index())).await?;
    let body = match info {
        Some(info) => json!({
            "available": true,
            "index": index,
            "width": info.width,
            "height": info.height,
            "fps": info.fps,
        }),
        None => json!({
            "available": false,
            "index": index,
            "message": "Camera is starting or not available",
        }),
    };
    Ok(Json(body))
}

async fn available_cameras(State(state): State<AppState>) -> Result<Json<Value>, ServerError> {
    let camera = state.camera.clone();
    let count = state.probe_count;
    let (cameras, current) =
        spawn_blocking(move || (camera.probe(count), camera.current_index())).await?;
    info!("found {} camera(s)", cameras.len());
    let cameras: Vec<Value> = cameras
        .into_iter()
        .map(|c| json!({ "index": c.index, "name": c.name }))
        .collect();
    Ok(Json(json!({ "cameras": cameras, "current": current })))
}

async fn switch_camera(
    State(state): State<AppState>,
    Path(index): Path<i32>,
) -> Result<Json<Value>, ServerError> {
    let camera = state.camera.clone();
    let outcome = spawn_blocking(move || camera.switch(index)).await?;
    Ok(Json(json!({
        "success": outcome.success,
        "message": outcome.message,
        "index": outcome.index,
    })))
}

async fn toggle_yolo(State(state): State<AppState>) -> Json<Value> {
    let enabled = state.detection.toggle();
    let status = if enabled { "enabled" } else { "disabled" };
    Json(json!({
        "success": true,
        "yolo_enabled": enabled,
        "message": format!("Pothole detection {status}"),
    }))
}

async fn yolo_status(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "yolo_enabled": state.detection.is_enabled() }))
}

async fn get_detections(State(state): State<AppState>) -> Result<Json<Value>, ServerError> {
    let events = state.events.clone();
    let body = match spawn_blocking(move || events.list_all()).await? {
        Ok(detections) => json!({ "detections": detections }),
        Err(e) => {
            error!("reading detections failed: {e}");
            json!({ "detections": [], "error": e.to_string() })
        }
    };
    Ok(Json(body))
}

async fn save_detection(
    State(state): State<AppState>,
    Json(new): Json<NewDetection>,
) -> Result<Json<Value>, ServerError> {
    let events = state.events.clone();
    match spawn_blocking(move || events.append(new)).await? {
        Ok(event) => {
            info!(
                "detection saved at ({}, {}), confidence {}%, {} pothole(s)",
                event.latitude, event.longitude, event.confidence, event.pothole_count
            );
            Ok(Json(json!({
                "success": true,
                "message": "Detection saved",
                "timestamp": event.timestamp,
            })))
        }
        Err(e @ EventLogError::MissingCoordinates) => {
            warn!("detection rejected: {e}");
            Err(e.into())
        }
        Err(e) => {
            error!("saving detection failed: {e}");
            Err(e.into())
        }
    }
}

async fn download_csv(State(state): State<AppState>) -> Result<Response, ServerError> {
    match tokio::fs::read(state.events.path()).await {
        Ok(bytes) => Ok((
            [
                (header::CONTENT_TYPE, "text/csv"),
                (
                    header::CONTENT_DISPOSITION,
                    "attachment; filename=\"pothole_detections.csv\"",
                ),
            ],
            bytes,
        )
            .into_response()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(ServerError::NoData),
        Err(e) => Err(EventLogError::Io(e).into()),
    }
}
