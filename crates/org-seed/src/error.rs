//! Error types for the seeding library.

use thiserror::Error;

/// Main error type for seeding operations.
#[derive(Error, Debug)]
pub enum SeedError {
    /// Invalid seed plan (missing root, bad count, duplicate children, etc.)
    #[error("Plan error: {0}")]
    Plan(String),

    /// Org authentication / credential resolution error
    #[error("Auth error: {0}")]
    Auth(String),

    /// HTTP transport error from the underlying client
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The platform API returned a non-success status
    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// Schema discovery failed for an object
    #[error("Schema error: {0}")]
    Schema(String),

    /// A query response was malformed (e.g. more pages promised but no cursor)
    #[error("Query error: {0}")]
    Query(String),

    /// A client-side request was invalid (e.g. batch over the platform limit)
    #[error("Request error: {0}")]
    Request(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error (auth file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The operator backed out of the interactive prompt loop
    #[error("Seeding cancelled")]
    Cancelled,
}

impl SeedError {
    /// Create an Api error from a status and response body.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        SeedError::Api {
            status,
            message: message.into(),
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        // Add error chain for wrapped errors
        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            SeedError::Cancelled => 130,
            SeedError::Plan(_) | SeedError::Auth(_) => 2,
            _ => 1,
        }
    }
}

/// Result type alias for seeding operations.
pub type Result<T> = std::result::Result<T, SeedError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(SeedError::Plan("bad plan".into()).exit_code(), 2);
        assert_eq!(SeedError::Auth("no such org".into()).exit_code(), 2);
        assert_eq!(SeedError::Cancelled.exit_code(), 130);
        assert_eq!(SeedError::api(500, "boom").exit_code(), 1);
        assert_eq!(SeedError::Query("cursor missing".into()).exit_code(), 1);
    }

    #[test]
    fn test_api_error_display() {
        let err = SeedError::api(401, "INVALID_SESSION_ID: Session expired");
        assert_eq!(
            err.to_string(),
            "API error (HTTP 401): INVALID_SESSION_ID: Session expired"
        );
    }

    #[test]
    fn test_format_detailed_leads_with_the_error() {
        let err = SeedError::Io(std::io::Error::other("disk gone"));
        assert!(err.format_detailed().starts_with("Error: IO error"));
    }
}
