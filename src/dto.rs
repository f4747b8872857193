use axum_typed_multipart::{FieldData, TryFromMultipart};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::upload::StoredUpload;

#[derive(TryFromMultipart)]
pub struct UploadRequest {
    // The upload gate enforces the size ceiling itself.
    #[form_data(limit = "unlimited")]
    pub file: FieldData<NamedTempFile>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub file_name: String,
    pub original_name: String,
    pub file_size: u64,
    pub file_type: String,
}

impl From<StoredUpload> for UploadResponse {
    fn from(stored: StoredUpload) -> Self {
        UploadResponse {
            file_name: stored.file_name,
            original_name: stored.original_name,
            file_size: stored.size,
            file_type: stored.content_type,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertRequest {
    pub file_name: String,
    pub output_format: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertResponse {
    pub original_file: String,
    pub converted_file: String,
    /// Seconds.
    pub duration: f64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeResponse {
    pub file_name: String,
    /// Seconds.
    pub duration: f64,
    pub has_video: bool,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormatsResponse {
    pub output_formats: Vec<String>,
    pub upload_extensions: Vec<String>,
    pub max_upload_size: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
