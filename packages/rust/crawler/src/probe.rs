//! Status probing and page fetching.
//!
//! The prober issues a lightweight HEAD request and folds every outcome into
//! a [`Status`] — probing never fails as such, it classifies. The fetcher
//! retrieves the body with a GET and re-applies the same classification,
//! since a page's status can change between probe and fetch.

use chrono::Utc;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use url::Url;

use sitecrawler_shared::{FailureReason, Status};

/// Whether the response advertises a content type the crawler can descend
/// into. A missing or unreadable content type counts as non-HTML.
fn is_html(response: &reqwest::Response) -> bool {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|ct| ct.contains("text/html") || ct.contains("text/xhtml"))
        .unwrap_or(false)
}

/// Probe a URL for existence and classify it.
///
/// | outcome | classification |
/// |---|---|
/// | transport/connect/timeout error | dead, transport reason |
/// | status outside 200–299 | dead, page failed |
/// | 2xx, non-HTML content type | live, not crawlable |
/// | 2xx, HTML | live, crawlable |
pub async fn probe(client: &Client, target: &Url) -> Status {
    let checked_at = Utc::now();

    let response = match client.head(target.as_str()).send().await {
        Ok(response) => response,
        Err(err) => return Status::transport(checked_at, err),
    };

    let code = response.status().as_u16();
    if !response.status().is_success() {
        return Status::page_failed(checked_at, code);
    }
    if !is_html(&response) {
        return Status::non_html(checked_at, code);
    }

    Status::crawlable(checked_at, code)
}

/// Retrieve a page body for link extraction.
///
/// Only called for URLs the prober marked crawlable; still validates the
/// response, because the answer may differ by the time the GET lands.
pub async fn fetch_page(client: &Client, target: &Url) -> Result<String, FailureReason> {
    let response = client
        .get(target.as_str())
        .send()
        .await
        .map_err(FailureReason::transport)?;

    if !response.status().is_success() {
        return Err(FailureReason::PageFailed);
    }
    if !is_html(&response) {
        return Err(FailureReason::NonHtml);
    }

    response.text().await.map_err(FailureReason::transport)
}
