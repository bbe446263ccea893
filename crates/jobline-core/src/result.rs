//! Convenience result type alias for Jobline.

use crate::error::AppError;

/// A specialized `Result` type for Jobline operations.
pub type AppResult<T> = Result<T, AppError>;
