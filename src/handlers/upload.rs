//! `POST /api/upload` -- accept one image file and store it.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::{Multipart, RawQuery, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::{Bytes, BytesMut};
use tracing::debug;

use crate::config::UploadConfig;
use crate::errors::UploadError;
use crate::metrics;
use crate::service::ValidatedUpload;
use crate::AppState;

/// Name of the multipart part carrying the file.
pub const FILE_FIELD: &str = "file";

/// Query parameter selecting the target container.
pub const CONTAINER_PARAM: &str = "containerName";

/// Number of `file` parts accepted per request.
pub const MAX_FILES: usize = 1;

/// Content type recorded when the part does not declare one.
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// A `file` part as read from the request, before validation.
#[derive(Debug)]
pub struct IncomingFile {
    pub file_name: String,
    pub content_type: String,
    pub data: Bytes,
    /// Reading stopped because the part outgrew the size ceiling.
    pub truncated: bool,
}

// -- Query parameter parsing helper ------------------------------------------

/// Parse raw query string into a HashMap.  Later duplicates win.
fn parse_query(raw: Option<String>) -> HashMap<String, String> {
    let mut map = HashMap::new();
    if let Some(qs) = raw {
        for part in qs.split('&').filter(|p| !p.is_empty()) {
            let (k, v) = part.split_once('=').unwrap_or((part, ""));
            let decode = |s: &str| {
                percent_encoding::percent_decode_str(&s.replace('+', " "))
                    .decode_utf8_lossy()
                    .into_owned()
            };
            map.insert(decode(k), decode(v));
        }
    }
    map
}

/// Resolve the target container, falling back to `default` when the
/// parameter is absent or empty.  The parameter name is matched
/// case-insensitively; an exact-case match wins over other spellings.
pub fn resolve_container(query: &HashMap<String, String>, default: &str) -> String {
    query
        .get(CONTAINER_PARAM)
        .filter(|name| !name.is_empty())
        .or_else(|| {
            query
                .iter()
                .filter(|(k, v)| k.eq_ignore_ascii_case(CONTAINER_PARAM) && !v.is_empty())
                .map(|(_, v)| v)
                .min()
        })
        .cloned()
        .unwrap_or_else(|| default.to_string())
}

// -- Validation ---------------------------------------------------------------

/// Extension of the final path component, lower-cased and including the
/// dot.  Empty when there is none or the name ends with a dot.
pub fn file_extension(file_name: &str) -> String {
    let base = file_name
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or(file_name);
    match base.rfind('.') {
        Some(idx) if idx + 1 < base.len() => base[idx..].to_lowercase(),
        _ => String::new(),
    }
}

/// Apply the size and extension rules to a single file.
pub fn validate_file(file: &IncomingFile, rules: &UploadConfig) -> Result<(), UploadError> {
    if file.truncated || file.data.len() as u64 > rules.max_file_size {
        return Err(UploadError::FileTooLarge);
    }

    let extension = file_extension(&file.file_name);
    if !rules.allowed_extensions.iter().any(|e| *e == extension) {
        return Err(UploadError::InvalidExtension);
    }

    Ok(())
}

// -- Multipart reading --------------------------------------------------------

/// Read the `file` part of the request.
///
/// Parts with another name, and `file` parts without a filename or with
/// an empty one (a form submitted with no file chosen), are skipped.  A second `file` part rejects the request before anything is
/// stored.  A part is buffered only up to `max_file_size` bytes.
async fn read_file_part(
    multipart: &mut Multipart,
    max_file_size: u64,
) -> Result<Option<IncomingFile>, UploadError> {
    let mut found: Option<IncomingFile> = None;
    let mut file_parts = 0usize;

    loop {
        let next = multipart.next_field().await;
        let mut field = match next {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return Err(read_error(&found, e)),
        };

        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let Some(file_name) = field
            .file_name()
            .filter(|name| !name.is_empty())
            .map(str::to_string)
        else {
            continue;
        };

        file_parts += 1;
        if file_parts > MAX_FILES {
            return Err(UploadError::TooManyFiles);
        }

        let content_type = field
            .content_type()
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();

        let mut buf = BytesMut::new();
        let mut truncated = false;
        loop {
            match field.chunk().await {
                Ok(Some(chunk)) => {
                    if (buf.len() + chunk.len()) as u64 > max_file_size {
                        truncated = true;
                        break;
                    }
                    buf.extend_from_slice(&chunk);
                }
                Ok(None) => break,
                Err(e) => return Err(read_error(&found, e)),
            }
        }

        found = Some(IncomingFile {
            file_name,
            content_type,
            data: buf.freeze(),
            truncated,
        });
    }

    Ok(found)
}

/// Map a multipart decoding failure.  The body limit cutting the request
/// off, or any failure after the file already outgrew the ceiling, is
/// reported to the client as an oversized file.
fn read_error(found: &Option<IncomingFile>, err: MultipartError) -> UploadError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE
        || found.as_ref().is_some_and(|f| f.truncated)
    {
        debug!("multipart read stopped on oversized body: {}", err);
        return UploadError::FileTooLarge;
    }
    UploadError::Internal(anyhow::anyhow!("failed to read multipart body: {}", err))
}

// -- Handler ------------------------------------------------------------------

/// `POST /api/upload` -- Validate and store one uploaded image.
#[utoipa::path(
    post,
    path = "/api/upload",
    tag = "Upload",
    operation_id = "Upload",
    params(
        ("containerName" = Option<String>, Query, description = "Target container (default `files`)"),
    ),
    request_body(content = Vec<u8>, content_type = "multipart/form-data", description = "Form with a single `file` part"),
    responses(
        (status = 200, description = "File stored", body = crate::metadata::store::UploadedFileRecord),
        (status = 400, description = "Missing file, too many files, file too large, or invalid extension"),
        (status = 500, description = "Storage or database failure")
    )
)]
pub async fn upload(
    State(state): State<Arc<AppState>>,
    RawQuery(raw_query): RawQuery,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, UploadError> {
    let result = handle_upload(&state, raw_query, multipart).await;
    match &result {
        Ok((_, size)) => metrics::record_upload("stored", *size),
        Err(e) => metrics::record_upload(e.outcome(), 0),
    }
    result.map(|(response, _)| response)
}

async fn handle_upload(
    state: &AppState,
    raw_query: Option<String>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<(Response, u64), UploadError> {
    let rules = &state.config.upload;

    // A body that is not multipart/form-data carries no file part.
    let mut multipart = match multipart {
        Ok(m) => m,
        Err(rejection) => {
            debug!("upload without multipart body: {}", rejection);
            return Err(UploadError::MissingFile);
        }
    };

    let file = read_file_part(&mut multipart, rules.max_file_size)
        .await?
        .ok_or(UploadError::MissingFile)?;
    validate_file(&file, rules)?;

    let query = parse_query(raw_query);
    let container = resolve_container(&query, &rules.default_container);

    let size = file.data.len() as u64;
    let record = state
        .files
        .store(ValidatedUpload {
            original_name: file.file_name,
            content_type: file.content_type,
            container,
            data: file.data,
        })
        .await?;

    Ok((Json(record).into_response(), size))
}
