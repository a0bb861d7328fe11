//! HTML link extraction.
//!
//! Pure with respect to shared state: one HTML document plus a base URL in,
//! a deduplicated list of resolved candidate URLs out. Host filtering is the
//! coordinator's job, not the extractor's — external links, stylesheets and
//! scripts all come back here and are filtered (or probed) downstream.

use std::collections::HashSet;

use scraper::{Html, Selector};
use url::Url;

/// Placeholder href used by scripted anchors; never a real destination.
const JS_VOID: &str = "javascript:void(0)";

/// Extract every candidate link URL from `html`, resolved against `base`.
///
/// Inspects the `href`, `src`, and `srcset` attributes of every element.
/// Absolute values pass through unchanged; relative values resolve against
/// `base`; malformed values are dropped without failing the extraction.
/// Each resolved URL appears at most once, in document order.
pub fn extract_links(html: &str, base: &Url) -> Vec<Url> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("[href], [src], [srcset]").expect("static selector");

    let mut resolved = HashSet::new();
    let mut links = Vec::new();

    for element in document.select(&selector) {
        for (name, value) in element.value().attrs() {
            match name {
                "href" | "src" => {
                    push_candidate(value, base, &mut resolved, &mut links);
                }
                "srcset" => {
                    // Comma-separated candidates, each "URL [descriptor]".
                    for candidate in value.split(',') {
                        if let Some(url_token) = candidate.split_whitespace().next() {
                            push_candidate(url_token, base, &mut resolved, &mut links);
                        }
                    }
                }
                _ => {}
            }
        }
    }

    links
}

/// Resolve one attribute value and record it if new and well-formed.
fn push_candidate(raw: &str, base: &Url, resolved: &mut HashSet<String>, out: &mut Vec<Url>) {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.contains(JS_VOID) {
        return;
    }

    let url = match Url::parse(trimmed) {
        Ok(url) => url,
        // Likely a relative reference, combine with the base.
        Err(_) => match base.join(trimmed) {
            Ok(url) => url,
            Err(_) => return,
        },
    };

    if resolved.insert(url.to_string()) {
        out.push(url);
    }
}
