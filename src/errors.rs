use std::fmt;

/// Application-specific error types.
#[derive(Debug)]
pub enum AppError {
    /// Error returned by the relational store driver.
    DatabaseError(sqlx::Error),
    /// Store failure raised by a non-SQL store implementation.
    StoreError(String),
    /// Cache-layer failure. Absorbed by the cache gateway on read/write-through.
    CacheError(String),
    /// The tenant's monthly quota cannot cover the requested amount.
    QuotaExceeded {
        /// Usage already consumed in the current window.
        consumed: i64,
        /// The tenant's limit for the window.
        limit: i64,
    },
    /// Resource not found error.
    NotFound(String),
    /// Bad request error (invalid operator input).
    BadRequest(String),
    /// The caller cancelled the request.
    Cancelled,
    /// The caller-supplied deadline elapsed.
    Timeout,
    /// Internal error.
    InternalError(String),
    /// Error with context chain for better debugging.
    WithContext {
        /// The underlying source of the error.
        source: Box<AppError>,
        /// Additional context message.
        context: String,
    },
}

impl AppError {
    /// Returns true when this error, or the error it wraps, is a quota rejection.
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self.root(), AppError::QuotaExceeded { .. })
    }

    /// Returns true when the request was cancelled or ran out of time.
    pub fn is_cancellation(&self) -> bool {
        matches!(self.root(), AppError::Cancelled | AppError::Timeout)
    }

    /// Unwraps any context layers and returns the innermost error.
    pub fn root(&self) -> &AppError {
        match self {
            AppError::WithContext { source, .. } => source.root(),
            other => other,
        }
    }
}

impl fmt::Display for AppError {
    /// Formats the error for display.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::DatabaseError(e) => write!(f, "Database error: {}", e),
            AppError::StoreError(msg) => write!(f, "Store error: {}", msg),
            AppError::CacheError(msg) => write!(f, "Cache error: {}", msg),
            AppError::QuotaExceeded { consumed, limit } => write!(
                f,
                "Monthly quota exceeded: {} of {} already used",
                consumed, limit
            ),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::Cancelled => write!(f, "Request cancelled"),
            AppError::Timeout => write!(f, "Request deadline exceeded"),
            AppError::InternalError(msg) => write!(f, "Internal error: {}", msg),
            AppError::WithContext { source, context } => {
                write!(f, "{}: {}", context, source)
            }
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::DatabaseError(e) => Some(e),
            AppError::WithContext { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for AppError {
    /// Converts a `sqlx::Error` into an `AppError`.
    fn from(err: sqlx::Error) -> Self {
        AppError::DatabaseError(err)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InternalError(format!("Serialization failed: {}", err))
    }
}

/// Extension trait for adding context to errors.
/// Similar to `anyhow::Context` but for our `AppError` type.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, context: impl Into<String>) -> Result<T, AppError>;
}

impl<T> ResultExt<T> for Result<T, AppError> {
    fn context(self, context: impl Into<String>) -> Result<T, AppError> {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(e),
            context: context.into(),
        })
    }
}

/// Extension for sqlx::Error to add context
impl<T> ResultExt<T> for Result<T, sqlx::Error> {
    fn context(self, context: impl Into<String>) -> Result<T, AppError> {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(AppError::DatabaseError(e)),
            context: context.into(),
        })
    }
}
