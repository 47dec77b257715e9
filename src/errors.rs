use std::fmt;

/// Error type shared by the inspection, patch, cache and smoke layers.
#[derive(Debug)]
pub enum OpsError {
    /// Database-related errors.
    Database(sqlx::Error),
    /// Cache (Redis) errors.
    Cache(redis::RedisError),
    /// The platform API answered with an unexpected status.
    Http {
        /// HTTP status code returned by the server.
        status: u16,
        /// Raw response body, kept for reporting.
        body: String,
    },
    /// The request never produced a response (connection refused, timeout, bad body).
    Transport(String),
    /// Lookup target does not exist.
    NotFound(String),
    /// Operator supplied an argument the command cannot act on.
    InvalidInput(String),
    /// Data in the database is not in the shape the command expects.
    Unexpected(String),
    /// Error with context chain for better debugging.
    WithContext {
        /// The underlying source of the error.
        source: Box<OpsError>,
        /// Additional context message.
        context: String,
    },
}

impl OpsError {
    /// Process exit code for this error.
    ///
    /// Operator mistakes (unknown email, bad index) exit with 2 so wrappers can
    /// tell them apart from infrastructure failures, which exit with 1.
    pub fn exit_code(&self) -> i32 {
        match self {
            OpsError::NotFound(_) | OpsError::InvalidInput(_) => 2,
            OpsError::WithContext { source, .. } => source.exit_code(),
            _ => 1,
        }
    }

    /// The innermost error, with context layers stripped.
    pub fn root(&self) -> &OpsError {
        match self {
            OpsError::WithContext { source, .. } => source.root(),
            other => other,
        }
    }
}

impl fmt::Display for OpsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpsError::Database(e) => write!(f, "Database error: {}", e),
            OpsError::Cache(e) => write!(f, "Cache error: {}", e),
            OpsError::Http { status, body } => {
                write!(f, "HTTP {}: {}", status, truncate(body, 500))
            }
            OpsError::Transport(msg) => write!(f, "Request failed: {}", msg),
            OpsError::NotFound(msg) => write!(f, "Not found: {}", msg),
            OpsError::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            OpsError::Unexpected(msg) => write!(f, "Unexpected data: {}", msg),
            OpsError::WithContext { source, context } => {
                write!(f, "{}: {}", context, source)
            }
        }
    }
}

impl std::error::Error for OpsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            OpsError::Database(e) => Some(e),
            OpsError::Cache(e) => Some(e),
            OpsError::WithContext { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for OpsError {
    fn from(err: sqlx::Error) -> Self {
        OpsError::Database(err)
    }
}

impl From<redis::RedisError> for OpsError {
    fn from(err: redis::RedisError) -> Self {
        OpsError::Cache(err)
    }
}

impl From<reqwest::Error> for OpsError {
    fn from(err: reqwest::Error) -> Self {
        OpsError::Transport(err.to_string())
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Extension trait for adding context to errors.
/// Similar to `anyhow::Context` but for our `OpsError` type.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, context: impl Into<String>) -> Result<T, OpsError>;

    /// Add context lazily (only evaluated on error).
    fn with_context<F>(self, f: F) -> Result<T, OpsError>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T, OpsError> {
    fn context(self, context: impl Into<String>) -> Result<T, OpsError> {
        self.map_err(|e| OpsError::WithContext {
            source: Box::new(e),
            context: context.into(),
        })
    }

    fn with_context<F>(self, f: F) -> Result<T, OpsError>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| OpsError::WithContext {
            source: Box::new(e),
            context: f(),
        })
    }
}

/// Extension for sqlx::Error to add context
impl<T> ResultExt<T> for Result<T, sqlx::Error> {
    fn context(self, context: impl Into<String>) -> Result<T, OpsError> {
        self.map_err(|e| OpsError::WithContext {
            source: Box::new(OpsError::Database(e)),
            context: context.into(),
        })
    }

    fn with_context<F>(self, f: F) -> Result<T, OpsError>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| OpsError::WithContext {
            source: Box::new(OpsError::Database(e)),
            context: f(),
        })
    }
}

impl<T> ResultExt<T> for Result<T, redis::RedisError> {
    fn context(self, context: impl Into<String>) -> Result<T, OpsError> {
        self.map_err(|e| OpsError::WithContext {
            source: Box::new(OpsError::Cache(e)),
            context: context.into(),
        })
    }

    fn with_context<F>(self, f: F) -> Result<T, OpsError>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| OpsError::WithContext {
            source: Box::new(OpsError::Cache(e)),
            context: f(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(OpsError::NotFound("x".into()).exit_code(), 2);
        assert_eq!(OpsError::InvalidInput("x".into()).exit_code(), 2);
        assert_eq!(OpsError::Transport("x".into()).exit_code(), 1);
        assert_eq!(
            OpsError::Http {
                status: 500,
                body: String::new()
            }
            .exit_code(),
            1
        );
    }

    #[test]
    fn test_context_keeps_root_exit_code() {
        let res: Result<(), OpsError> = Err(OpsError::NotFound("user a@b.com".into()));
        let err = res.context("looking up user").unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert_eq!(err.to_string(), "looking up user: Not found: user a@b.com");
        assert!(matches!(err.root(), OpsError::NotFound(_)));
    }

    #[test]
    fn test_sqlx_context() {
        let res: Result<(), sqlx::Error> = Err(sqlx::Error::RowNotFound);
        let err = res.with_context(|| "loading plans".to_string()).unwrap_err();
        assert!(err.to_string().starts_with("loading plans: Database error"));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_http_body_is_truncated() {
        let err = OpsError::Http {
            status: 502,
            body: "x".repeat(2_000),
        };
        assert!(err.to_string().len() < 600);
    }
}
