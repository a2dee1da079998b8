//! Convenience result type alias for hookhost.

use crate::error::AppError;

/// A specialized `Result` type for hookhost operations.
pub type AppResult<T> = Result<T, AppError>;
