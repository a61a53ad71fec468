use crate::models::ImageDimension;
use bytes::Bytes;
use validator::Validate;

#[derive(Debug, Clone, Validate)]
pub struct UploadRequest {
    pub content: Bytes,
    #[validate(length(min = 1, message = "Filename is required"))]
    pub original_filename: String,
    pub content_type: Option<String>,
    /// Display name overriding `original_filename` when not blank
    pub custom_filename: Option<String>,
    #[validate(range(min = 1, message = "Expiry must be at least one day"))]
    pub expiry_days: Option<i64>,
    pub thumbnail_dimensions: Vec<ImageDimension>,
}

impl UploadRequest {
    pub fn new(content: impl Into<Bytes>, original_filename: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            original_filename: original_filename.into(),
            content_type: None,
            custom_filename: None,
            expiry_days: None,
            thumbnail_dimensions: Vec::new(),
        }
    }

    pub fn effective_filename(&self) -> &str {
        match self.custom_filename.as_deref() {
            Some(name) if !name.trim().is_empty() => name.trim(),
            _ => self.original_filename.trim(),
        }
    }

    /// Declared content type, or sniffed from the bytes when missing or generic
    pub fn resolved_content_type(&self) -> String {
        match self.content_type.as_deref().map(str::trim) {
            Some(declared) if !declared.is_empty() && declared != "application/octet-stream" => {
                declared.to_string()
            }
            _ => infer::get(&self.content)
                .map(|kind| kind.mime_type().to_string())
                .unwrap_or_else(|| mime::APPLICATION_OCTET_STREAM.to_string()),
        }
    }
}

/// Metadata changes. Blank names and non-positive expiry are ignored.
#[derive(Debug, Clone, Default)]
pub struct FileUpdate {
    pub filename: Option<String>,
    pub expiry_days: Option<i64>,
}
