//! Upload error types.
//!
//! Every variant maps to an HTTP status.  The enum implements
//! [`axum::response::IntoResponse`] so handlers can simply return
//! `Err(UploadError::FileTooLarge)`.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::error;

/// Generate a 16-character hex request ID.
pub fn generate_request_id() -> String {
    let bytes: [u8; 8] = rand::random();
    hex::encode(bytes).to_uppercase()
}

/// Failures of the upload endpoint.
#[derive(Debug, Error)]
pub enum UploadError {
    /// No `file` part with a filename was sent.
    #[error("No file was provided.")]
    MissingFile,

    /// More `file` parts than the configured maximum.
    #[error("Exceeded the maximum number of files allowed.")]
    TooManyFiles,

    /// The file is larger than the configured ceiling.
    #[error("File size exceeds the limit.")]
    FileTooLarge,

    /// The filename's extension is not in the allowed set.
    #[error("Invalid file extension. Please use jpg, jpeg, svg or png.")]
    InvalidExtension,

    /// Storage, database, or request decoding failure.
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl UploadError {
    /// Return the appropriate HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            UploadError::MissingFile
            | UploadError::TooManyFiles
            | UploadError::FileTooLarge
            | UploadError::InvalidExtension => StatusCode::BAD_REQUEST,
            UploadError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short label used for the `outcome` metric.
    pub fn outcome(&self) -> &'static str {
        match self {
            UploadError::MissingFile => "missing_file",
            UploadError::TooManyFiles => "too_many_files",
            UploadError::FileTooLarge => "file_too_large",
            UploadError::InvalidExtension => "invalid_extension",
            UploadError::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for UploadError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match self {
            // A missing file gets a bare 400, unlike the other validation errors.
            UploadError::MissingFile => status.into_response(),
            UploadError::Internal(err) => {
                error!("upload failed: {:#}", err);
                status.into_response()
            }
            other => (
                status,
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                other.to_string(),
            )
                .into_response(),
        }
    }
}
