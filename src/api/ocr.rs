//! OCR endpoints
//!
//! All three take a multipart upload with the image in the `file` field.

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, instrument};
use uuid::Uuid;

use super::AppState;
use crate::receipt::ReceiptParseResult;
use crate::service::group_lines;
use crate::vision::{ErrorKind, OcrError, WordRecord};

const INVALID_FILE_TYPE: &str = "Invalid file type. Please upload an image.";

#[derive(Debug, Serialize)]
pub struct OcrResponse {
    pub filename: String,
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct OcrErrorResponse {
    pub filename: String,
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct ReceiptWord {
    pub text: String,
    pub conf: i32,
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
    pub line_num: u32,
    pub word_num: u32,
}

impl From<&WordRecord> for ReceiptWord {
    fn from(word: &WordRecord) -> Self {
        Self {
            text: word.text.clone(),
            conf: word.confidence.round() as i32,
            left: word.bounds.left,
            top: word.bounds.top,
            width: word.bounds.width,
            height: word.bounds.height,
            line_num: word.line_num,
            word_num: word.word_num,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReceiptResponse {
    pub filename: String,
    pub lines: Vec<String>,
    pub words: Vec<ReceiptWord>,
}

#[derive(Debug, Serialize)]
pub struct ReceiptParsed {
    pub filename: String,
    #[serde(flatten)]
    pub parsed: ReceiptParseResult,
}

/// Error body with the status it is sent under
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    filename: String,
    error: String,
}

impl ApiError {
    fn bad_request(filename: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            filename: filename.into(),
            error: error.into(),
        }
    }

    fn from_ocr(filename: &str, err: OcrError) -> Self {
        match err.kind() {
            ErrorKind::BadInput => {
                info!("Rejected {}: {}", filename, err);
                Self::bad_request(filename, err.to_string())
            }
            ErrorKind::Internal => {
                error!("OCR failed for {}: {}", filename, err);
                Self {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    filename: filename.to_string(),
                    error: format!("An unexpected error occurred: {}", err),
                }
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = OcrErrorResponse {
            filename: self.filename,
            error: self.error,
        };
        (self.status, Json(body)).into_response()
    }
}

struct Upload {
    filename: String,
    bytes: Arc<[u8]>,
}

/// Read the `file` part, insisting on an image content type
async fn read_upload(mut multipart: Multipart) -> Result<Upload, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request("", e.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        let is_image = field
            .content_type()
            .map(|ct| ct.starts_with("image/"))
            .unwrap_or(false);
        if !is_image {
            return Err(ApiError::bad_request(filename, INVALID_FILE_TYPE));
        }

        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(filename.as_str(), e.to_string()))?;

        info!("Received {} ({} bytes)", filename, bytes.len());
        return Ok(Upload {
            filename,
            bytes: Arc::from(&bytes[..]),
        });
    }

    Err(ApiError::bad_request(
        "",
        "No file uploaded. Send the image in a multipart field named 'file'.",
    ))
}

/// Handler for `POST /api/v1/ocr/extract-text/`
#[instrument(skip_all, fields(request_id = %Uuid::new_v4()))]
pub async fn extract_text(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<OcrResponse>, ApiError> {
    let upload = read_upload(multipart).await?;
    let text = state
        .service
        .extract_text(upload.bytes)
        .await
        .map_err(|e| ApiError::from_ocr(&upload.filename, e))?;

    Ok(Json(OcrResponse {
        filename: upload.filename,
        text,
    }))
}

/// Handler for `POST /api/v1/ocr/extract-receipt/`
#[instrument(skip_all, fields(request_id = %Uuid::new_v4()))]
pub async fn extract_receipt(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<ReceiptParsed>, ApiError> {
    let upload = read_upload(multipart).await?;
    let parsed = state
        .service
        .extract_receipt(upload.bytes)
        .await
        .map_err(|e| ApiError::from_ocr(&upload.filename, e))?;

    Ok(Json(ReceiptParsed {
        filename: upload.filename,
        parsed,
    }))
}

/// Handler for `POST /api/v1/ocr/extract-words/`
#[instrument(skip_all, fields(request_id = %Uuid::new_v4()))]
pub async fn extract_words(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<ReceiptResponse>, ApiError> {
    let upload = read_upload(multipart).await?;
    let words = state
        .service
        .extract_words(upload.bytes)
        .await
        .map_err(|e| ApiError::from_ocr(&upload.filename, e))?;

    Ok(Json(ReceiptResponse {
        filename: upload.filename,
        lines: group_lines(&words),
        words: words.iter().map(ReceiptWord::from).collect(),
    }))
}
