use crate::entities::{file_thumbnails, files, share_links};
use crate::error::AppError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use validator::Validate;

/// Access level carried by a share link. `Write` implies `Read`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SharePermission {
    Read,
    Write,
}

impl SharePermission {
    pub fn as_str(&self) -> &'static str {
        match self {
            SharePermission::Read => "READ",
            SharePermission::Write => "WRITE",
        }
    }

    /// Whether a link holding `self` may perform an operation gated on `required`
    pub fn satisfies(self, required: SharePermission) -> bool {
        self >= required
    }
}

impl fmt::Display for SharePermission {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SharePermission {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "READ" => Ok(SharePermission::Read),
            "WRITE" => Ok(SharePermission::Write),
            _ => Err(AppError::InvalidInput(format!(
                "Invalid permission '{}'. Must be READ or WRITE",
                s
            ))),
        }
    }
}

/// Permission names accepted by the permission administration calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FilePermission {
    Read,
    Write,
    Delete,
}

impl FromStr for FilePermission {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "READ" => Ok(FilePermission::Read),
            "WRITE" => Ok(FilePermission::Write),
            "DELETE" => Ok(FilePermission::Delete),
            _ => Err(AppError::InvalidInput(format!(
                "Unknown permission type: {}",
                s
            ))),
        }
    }
}

/// Requested thumbnail bounding box
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct ImageDimension {
    #[validate(range(min = 1, message = "Width must be at least 1 pixel"))]
    pub width: i32,
    #[validate(range(min = 1, message = "Height must be at least 1 pixel"))]
    pub height: i32,
}

impl ImageDimension {
    pub fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }
}

/// One `(object, relation, user)` fact held by the authorization engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FgaRelation {
    pub object: String,
    pub relation: String,
    pub user: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThumbnailDto {
    pub path: String,
    pub width: i32,
    pub height: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileDto {
    pub id: String,
    pub filename: String,
    pub content_type: String,
    pub path: String,
    pub size: i64,
    pub owner: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub thumbnails: Vec<ThumbnailDto>,
    pub download_url: String,
}

impl FileDto {
    pub fn from_model(
        file: &files::Model,
        thumbnails: &[file_thumbnails::Model],
        download_url: String,
    ) -> Self {
        Self {
            id: file.id.clone(),
            filename: file.filename.clone(),
            content_type: file.content_type.clone(),
            path: object_path(&file.bucket_name, &file.object_name),
            size: file.size,
            owner: file.owner.clone(),
            created_at: file.created_at,
            updated_at: file.updated_at,
            expires_at: file.expires_at,
            thumbnails: thumbnails
                .iter()
                .map(|t| ThumbnailDto {
                    path: object_path(&file.bucket_name, &t.object_name),
                    width: t.width,
                    height: t.height,
                })
                .collect(),
            download_url,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShareLinkDto {
    pub token: String,
    pub file_id: String,
    pub file_url: String,
    pub permission: String,
    pub created_by: String,
    pub expires_at: DateTime<Utc>,
}

impl ShareLinkDto {
    pub fn from_model(link: &share_links::Model, file_url: String) -> Self {
        Self {
            token: link.token.clone(),
            file_id: link.file_id.clone(),
            file_url,
            permission: link.permission.clone(),
            created_by: link.created_by.clone(),
            expires_at: link.expires_at,
        }
    }
}

/// `/<bucket>/<object>` reference used in file and thumbnail paths
pub fn object_path(bucket: &str, object_name: &str) -> String {
    format!("/{}/{}", bucket, object_name)
}

/// `now` plus `days` whole days, or `InvalidInput` when the result is out of range
pub fn expires_after(now: DateTime<Utc>, days: i64) -> Result<DateTime<Utc>, AppError> {
    chrono::Duration::try_days(days)
        .and_then(|span| now.checked_add_signed(span))
        .ok_or_else(|| AppError::InvalidInput(format!("Expiry of {} days is out of range", days)))
}
