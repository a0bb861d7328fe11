//! Report rendering: sitemap XML and JSON.

use color_eyre::eyre::Result;

use sitecrawler_shared::LinkReport;

/// Render the report stream as a sitemap-style XML document.
///
/// One `<url>` entry per crawled page, carrying its reachability fields and
/// a `<connects>` block listing the immediate same-host links found on it.
pub(crate) fn render_sitemap(reports: &[LinkReport]) -> String {
    let mut out = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <urlset xmlns=\"http://www.sitemaps.org/schemas/sitemap/0.9\">\n",
    );

    for report in reports {
        out.push_str("\t<url>\n");
        push_tag(&mut out, "loc", report.path.as_str());
        push_tag(
            &mut out,
            "laststatus",
            &report
                .status
                .last_status
                .map(|code| code.to_string())
                .unwrap_or_default(),
        );
        push_tag(
            &mut out,
            "lastchecked",
            &report.status.checked_at.to_rfc3339(),
        );
        push_tag(&mut out, "reachable", &report.status.is_live.to_string());
        push_tag(
            &mut out,
            "crawlable",
            &report.status.is_crawlable.to_string(),
        );
        if let Some(reason) = &report.status.reason {
            push_tag(&mut out, "reachable_error", &reason.to_string());
        }

        out.push_str("\t\t<connects>\n");
        for link in &report.points_to {
            out.push_str("\t\t\t<link>");
            out.push_str(&escape_xml(link.path.as_str()));
            out.push_str("</link>\n");
        }
        out.push_str("\t\t</connects>\n");
        out.push_str("\t</url>\n");
    }

    out.push_str("</urlset>\n");
    out
}

/// Render the report stream as pretty-printed JSON.
pub(crate) fn render_json(reports: &[LinkReport]) -> Result<String> {
    Ok(serde_json::to_string_pretty(reports)?)
}

fn push_tag(out: &mut String, tag: &str, value: &str) {
    out.push_str("\t\t<");
    out.push_str(tag);
    out.push('>');
    out.push_str(&escape_xml(value));
    out.push_str("</");
    out.push_str(tag);
    out.push_str(">\n");
}

fn escape_xml(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sitecrawler_shared::Status;
    use url::Url;

    fn sample() -> Vec<LinkReport> {
        let now = Utc::now();
        let mut root = LinkReport::leaf(
            Url::parse("https://example.com/").unwrap(),
            Status::crawlable(now, 200),
        );
        root.points_to.push(LinkReport::leaf(
            Url::parse("https://example.com/a?x=1&y=2").unwrap(),
            Status::crawlable(now, 200),
        ));
        let dead = LinkReport::leaf(
            Url::parse("https://example.com/gone").unwrap(),
            Status::page_failed(now, 404),
        );
        vec![root, dead]
    }

    #[test]
    fn sitemap_lists_every_report() {
        let xml = render_sitemap(&sample());
        assert!(xml.starts_with("<?xml version=\"1.0\""));
        assert!(xml.contains("<loc>https://example.com/</loc>"));
        assert!(xml.contains("<loc>https://example.com/gone</loc>"));
        assert!(xml.contains("<reachable>false</reachable>"));
        assert!(xml.contains("<laststatus>404</laststatus>"));
        assert!(xml.ends_with("</urlset>\n"));
    }

    #[test]
    fn sitemap_escapes_query_strings() {
        let xml = render_sitemap(&sample());
        assert!(xml.contains("<link>https://example.com/a?x=1&amp;y=2</link>"));
    }

    #[test]
    fn dead_pages_carry_a_reachable_error() {
        let xml = render_sitemap(&sample());
        assert!(xml.contains("<reachable_error>"));
    }

    #[test]
    fn transport_failures_render_an_empty_laststatus() {
        let report = LinkReport::leaf(
            Url::parse("https://example.com/down").unwrap(),
            Status::transport(Utc::now(), "connection refused"),
        );
        let xml = render_sitemap(&[report]);
        assert!(xml.contains("<laststatus></laststatus>"));
    }

    #[test]
    fn json_renders_the_full_stream() {
        let json = render_json(&sample()).unwrap();
        assert!(json.contains("\"is_live\": true"));
        assert!(json.contains("\"points_to\""));
    }
}
