use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Access Denied: {0}")]
    AccessDenied(String),

    #[error("Invalid Input: {0}")]
    InvalidInput(String),

    /// The scan gate classified the content as unsafe
    #[error("File rejected: {0}")]
    ScanRejected(String),

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("Permission update failed: {0}")]
    PermissionMutationFailed(String),

    #[error("Internal Server Error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable machine-readable code for this error
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::NotFound(_) => "FILE_NOT_FOUND",
            AppError::AccessDenied(_) => "ACCESS_DENIED",
            AppError::InvalidInput(_) => "INVALID_INPUT",
            AppError::ScanRejected(_) => "INVALID_FILE_TYPE",
            AppError::UploadFailed(_) => "FILE_UPLOAD_FAILED",
            AppError::DeleteFailed(_) => "FILE_DELETE_FAILED",
            AppError::PermissionMutationFailed(_) => "PERMISSION_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Client-caused errors are returned as-is and never retried.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            AppError::NotFound(_)
                | AppError::AccessDenied(_)
                | AppError::InvalidInput(_)
                | AppError::ScanRejected(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(AppError::NotFound("x".into()).code(), "FILE_NOT_FOUND");
        assert_eq!(AppError::AccessDenied("x".into()).code(), "ACCESS_DENIED");
        assert_eq!(
            AppError::PermissionMutationFailed("x".into()).code(),
            "PERMISSION_ERROR"
        );
    }

    #[test]
    fn test_client_errors() {
        assert!(AppError::InvalidInput("bad".into()).is_client_error());
        assert!(AppError::ScanRejected("virus".into()).is_client_error());
        assert!(!AppError::UploadFailed("s3".into()).is_client_error());
        assert!(!AppError::DeleteFailed("s3".into()).is_client_error());
        assert!(!AppError::Internal("boom".into()).is_client_error());
    }
}
