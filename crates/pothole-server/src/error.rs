use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::events::EventLogError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Events(#[from] EventLogError),
    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("No data available")]
    NoData,
}

impl ServerError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Events(EventLogError::MissingCoordinates) => StatusCode::BAD_REQUEST,
            Self::NoData => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "success": false, "error": self.to_string() }));
        (self.status(), body).into_response()
    }
}
