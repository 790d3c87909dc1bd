//! Receiver-side fault taxonomy.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Why an upload was rejected. Client-caused variants map to 400 and store
/// nothing; storage and rendering failures are the server's problem.
#[derive(Debug, thiserror::Error)]
pub enum DecodeFault {
    #[error("empty body")]
    Empty,

    #[error("missing header: {0}")]
    MissingHeader(&'static str),

    #[error("unparseable header: {0}")]
    BadHeader(&'static str),

    #[error("body length {got} does not match declared {width}x{height} {format} ({expected})")]
    LengthMismatch {
        width: u32,
        height: u32,
        format: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("body does not decode as an image: {0}")]
    NotAnImage(String),

    #[error("rendering failed: {0}")]
    Render(#[from] image::ImageError),

    #[error("storage failed: {0}")]
    Storage(#[from] std::io::Error),
}

impl DecodeFault {
    fn status(&self) -> StatusCode {
        match self {
            DecodeFault::Empty
            | DecodeFault::MissingHeader(_)
            | DecodeFault::BadHeader(_)
            | DecodeFault::LengthMismatch { .. }
            | DecodeFault::NotAnImage(_) => StatusCode::BAD_REQUEST,
            DecodeFault::Render(_) | DecodeFault::Storage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for DecodeFault {
    fn into_response(self) -> Response {
        let status = self.status();
        tracing::warn!("upload rejected: {self}");
        (status, Json(json!({ "ok": false, "err": self.to_string() }))).into_response()
    }
}
