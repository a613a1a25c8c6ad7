//! Maps Axum's extractor rejections onto [`AppError`].

use axum::extract::rejection::{PathRejection, QueryRejection};

use super::error::AppError;

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::RequestFormat(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::RequestFormat(rejection.body_text())
    }
}
