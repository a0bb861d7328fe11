//! Error types for sitecrawler.
//!
//! Library crates use [`SitecrawlerError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//! Per-node probe failures are *not* errors — they are the closed
//! [`FailureReason`] set carried inside a page's status.

use std::path::PathBuf;

/// Top-level error type for all sitecrawler operations.
#[derive(Debug, thiserror::Error)]
pub enum SitecrawlerError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Root URL could not be parsed or is unusable for crawling.
    #[error("url error: {message}")]
    Url { message: String },

    /// HTTP client construction or other network-layer setup error.
    #[error("network error: {0}")]
    Network(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Report rendering error (sitemap/JSON output).
    #[error("render error: {0}")]
    Render(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, SitecrawlerError>;

impl SitecrawlerError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a url error from any displayable message.
    pub fn url(msg: impl Into<String>) -> Self {
        Self::Url {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

// ---------------------------------------------------------------------------
// FailureReason
// ---------------------------------------------------------------------------

/// Why a probed URL was classified dead or uncrawlable.
///
/// A closed set rather than sentinel error values: every per-node failure
/// a crawl can observe maps onto one of these, and they travel inside the
/// node's [`Status`](crate::Status) instead of aborting the run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    /// DNS, connect, TLS, or timeout failure before any HTTP status was seen.
    #[error("transport error: {message}")]
    Transport { message: String },

    /// The URL responded outside the 200–299 window, possibly dead.
    #[error("url path failed to respond, possible dead")]
    PageFailed,

    /// The URL is live but points to a non-HTML resource.
    #[error("path points to a non html resource")]
    NonHtml,
}

impl FailureReason {
    /// Create a transport failure from any displayable cause.
    pub fn transport(cause: impl std::fmt::Display) -> Self {
        Self::Transport {
            message: cause.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = SitecrawlerError::config("missing defaults section");
        assert_eq!(err.to_string(), "config error: missing defaults section");

        let err = SitecrawlerError::url("relative URL without a base");
        assert!(err.to_string().contains("relative URL"));
    }

    #[test]
    fn failure_reason_display() {
        let reason = FailureReason::transport("connection refused");
        assert_eq!(reason.to_string(), "transport error: connection refused");
        assert!(FailureReason::PageFailed.to_string().contains("possible dead"));
        assert!(FailureReason::NonHtml.to_string().contains("non html"));
    }
}
