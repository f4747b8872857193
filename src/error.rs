use std::io;
use std::path::PathBuf;

use axum::response::{IntoResponse, Response};
use axum::Json;
use http::StatusCode;
use thiserror::Error;
use tracing::error;

use crate::dto::ErrorResponse;
use crate::formats;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Everything a conversion or upload can be rejected or fail with.
#[derive(Debug, Error)]
pub enum Error {
    #[error("input file not found: {}", .0.display())]
    InputNotFound(PathBuf),

    #[error(
        "unsupported output format '{format}', supported formats: {}",
        formats::OUTPUT_FORMATS.join(", ")
    )]
    UnsupportedFormat { format: String },

    #[error("no video stream found in {}", .0.display())]
    NoVideoStream(PathBuf),

    #[error("file is empty")]
    EmptyFile,

    #[error("file size {size} exceeds the limit of {limit} bytes")]
    TooLarge { size: u64, limit: u64 },

    #[error(
        "invalid file extension '{extension}', allowed extensions: {}",
        formats::UPLOAD_EXTENSIONS.join(", ")
    )]
    InvalidExtension { extension: String },

    #[error("cannot store the file: {0}")]
    StorageFailure(#[source] io::Error),

    #[error("converter has already been disposed")]
    AlreadyDisposed,

    #[error("conversion was cancelled")]
    Cancelled,

    #[error("transcoder failure: {0}")]
    TranscoderFailure(#[from] EngineError),
}

/// Failures raised by the media engine itself (process spawn, pipes, output parsing).
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to spawn {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: io::Error,
    },

    #[error("i/o error while running {tool}: {source}")]
    Io {
        tool: String,
        #[source]
        source: io::Error,
    },

    #[error("{tool} exited with {status}: {detail}")]
    Exited {
        tool: String,
        status: String,
        detail: String,
    },

    #[error("could not parse {tool} output: {message}")]
    Parse { tool: String, message: String },

    #[cfg(feature = "libav")]
    #[error("libav: {0}")]
    Libav(#[from] ffmpeg_next::Error),

    #[cfg(feature = "libav")]
    #[error("analyzer task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::InputNotFound(_) => StatusCode::NOT_FOUND,
            Error::UnsupportedFormat { .. }
            | Error::NoVideoStream(_)
            | Error::EmptyFile
            | Error::InvalidExtension { .. } => StatusCode::BAD_REQUEST,
            Error::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Error::AlreadyDisposed => StatusCode::SERVICE_UNAVAILABLE,
            Error::Cancelled => StatusCode::REQUEST_TIMEOUT,
            Error::StorageFailure(_) | Error::TranscoderFailure(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = if status.is_server_error() && status != StatusCode::SERVICE_UNAVAILABLE {
            error!(error = %self, "request failed");
            "internal server error".to_string()
        } else {
            self.to_string()
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}
