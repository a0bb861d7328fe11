//! Core domain types for sitecrawler reports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::FailureReason;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Reachability classification for one probed URL.
///
/// Computed once by the prober (or re-derived at fetch time) and attached
/// to exactly one [`LinkReport`]; never mutated afterwards except for the
/// fetch-failure downgrade of `is_live`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Status {
    /// Whether the URL responded within the 2xx window.
    pub is_live: bool,
    /// Whether the response content type allows link extraction.
    pub is_crawlable: bool,
    /// Last HTTP status observed; `None` when the transport failed before
    /// any status line arrived.
    pub last_status: Option<u16>,
    /// When the probe happened.
    pub checked_at: DateTime<Utc>,
    /// Why the URL is dead or uncrawlable, if it is.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<FailureReason>,
}

impl Status {
    /// Transport-level failure: not live, no HTTP status observed.
    pub fn transport(checked_at: DateTime<Utc>, cause: impl std::fmt::Display) -> Self {
        Self {
            is_live: false,
            is_crawlable: false,
            last_status: None,
            checked_at,
            reason: Some(FailureReason::transport(cause)),
        }
    }

    /// Responded outside 2xx: not live.
    pub fn page_failed(checked_at: DateTime<Utc>, code: u16) -> Self {
        Self {
            is_live: false,
            is_crawlable: false,
            last_status: Some(code),
            checked_at,
            reason: Some(FailureReason::PageFailed),
        }
    }

    /// 2xx but not an HTML content type: live, not worth fetching.
    pub fn non_html(checked_at: DateTime<Utc>, code: u16) -> Self {
        Self {
            is_live: true,
            is_crawlable: false,
            last_status: Some(code),
            checked_at,
            reason: Some(FailureReason::NonHtml),
        }
    }

    /// 2xx HTML: live and crawlable.
    pub fn crawlable(checked_at: DateTime<Utc>, code: u16) -> Self {
        Self {
            is_live: true,
            is_crawlable: true,
            last_status: Some(code),
            checked_at,
            reason: None,
        }
    }
}

// ---------------------------------------------------------------------------
// LinkReport
// ---------------------------------------------------------------------------

/// The report emitted for one crawled node.
///
/// `points_to` holds only the immediate, same-host, status-annotated links
/// discovered on this page — it is a one-level tree, not a recursively
/// assembled site map. Downstream consumers reconstruct the full structure
/// from the flat report stream if they need it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkReport {
    /// The crawled URL.
    pub path: Url,
    /// Reachability status attached to this node.
    pub status: Status,
    /// Immediate same-host children, each with its own probed status.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub points_to: Vec<LinkReport>,
}

impl LinkReport {
    /// A childless report for a URL with the given status.
    pub fn leaf(path: Url, status: Status) -> Self {
        Self {
            path,
            status,
            points_to: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Path normalization
// ---------------------------------------------------------------------------

/// Dedup identity of a URL within a crawl run: its path with any trailing
/// slashes stripped; an empty path maps to the root marker `/`.
pub fn normalized_path(url: &Url) -> String {
    let trimmed = url.path().trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}
