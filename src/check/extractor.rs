//! Link extraction from page HTML with a caller-supplied CSS selector.

use scraper::{ElementRef, Html, Node, Selector};
use tracing::{debug, warn};
use url::Url;

use super::error::CheckError;

/// A link as it appears on the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedLink {
    /// Visible text, whitespace-collapsed, with image title/alt substituted
    /// for images that carry no text.
    pub title: String,
    /// Absolute target, or the raw attribute value when it cannot be resolved.
    pub href: String,
}

/// Compiled selector that turns page bodies into links.
#[derive(Debug, Clone)]
pub struct LinkExtractor {
    selector: Selector,
}

impl LinkExtractor {
    /// Compiles `css_selector`.
    ///
    /// # Errors
    ///
    /// Returns [`CheckError::NoLinksMatched`] when the selector does not parse,
    /// the same outcome as a selector that matches nothing.
    pub fn new(css_selector: &str) -> Result<Self, CheckError> {
        let selector = Selector::parse(css_selector).map_err(|e| {
            warn!(selector = %css_selector, error = ?e, "invalid css selector");
            CheckError::NoLinksMatched
        })?;
        Ok(Self { selector })
    }

    /// Returns every matched anchor with an href, in document order.
    ///
    /// Relative hrefs resolve against `<base href>` when present, else
    /// against `page_url`; an empty href therefore points at the base itself.
    /// Matched elements that are not anchors, or that have no href, are skipped.
    #[must_use]
    pub fn extract(&self, body: &str, page_url: &str) -> Vec<ExtractedLink> {
        let document = Html::parse_document(body);
        let base = document_base(&document, page_url);

        let mut links = Vec::new();
        for element in document.select(&self.selector) {
            let tag = element.value().name();
            if tag != "a" {
                debug!(tag, "skipping non-anchor match");
                continue;
            }

            let Some(raw_href) = element.value().attr("href").map(str::trim) else {
                continue;
            };

            links.push(ExtractedLink {
                title: anchor_text(element),
                href: resolve_href(base.as_ref(), raw_href),
            });
        }
        links
    }
}

/// Extracts links from `body` and fails when there are none.
///
/// # Errors
///
/// Returns [`CheckError::NoLinksMatched`] for an invalid selector or an empty result.
pub fn extract_links(
    body: &str,
    page_url: &str,
    css_selector: &str,
) -> Result<Vec<ExtractedLink>, CheckError> {
    let links = LinkExtractor::new(css_selector)?.extract(body, page_url);
    if links.is_empty() {
        return Err(CheckError::NoLinksMatched);
    }
    Ok(links)
}

fn document_base(document: &Html, page_url: &str) -> Option<Url> {
    let page = Url::parse(page_url).ok();
    let base_href = Selector::parse("base[href]").ok().and_then(|selector| {
        document
            .select(&selector)
            .next()
            .and_then(|base| base.value().attr("href"))
            .map(str::trim)
            .filter(|href| !href.is_empty())
            .map(str::to_owned)
    });

    match (base_href, page) {
        (Some(href), Some(page)) => page.join(&href).ok().or(Some(page)),
        (Some(href), None) => Url::parse(&href).ok(),
        (None, page) => page,
    }
}

fn resolve_href(base: Option<&Url>, raw: &str) -> String {
    base.and_then(|base| base.join(raw).ok())
        .map_or_else(|| raw.to_string(), String::from)
}

/// Visible text of an anchor, whitespace-collapsed.
///
/// Image fallback text is padded with spaces so `New<img alt="icon">item`
/// reads `New icon item` rather than fusing into one word.
fn anchor_text(anchor: ElementRef<'_>) -> String {
    let mut raw = String::new();
    for node in anchor.descendants() {
        match node.value() {
            Node::Text(text) => raw.push_str(text),
            Node::Element(element) if element.name() == "img" => {
                if let Some(fallback) = ElementRef::wrap(node).and_then(image_text) {
                    raw.push(' ');
                    raw.push_str(fallback);
                    raw.push(' ');
                }
            }
            _ => {}
        }
    }
    collapse_whitespace(&raw)
}

/// Title, else alt, for an image with no text of its own.
fn image_text(image: ElementRef<'_>) -> Option<&str> {
    if image.text().any(|text| !text.trim().is_empty()) {
        return None;
    }
    let element = image.value();
    element
        .attr("title")
        .filter(|title| !title.is_empty())
        .or_else(|| element.attr("alt").filter(|alt| !alt.is_empty()))
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const PAGE: &str = "https://example.com/news/index.html";

    fn extract(body: &str, selector: &str) -> Vec<ExtractedLink> {
        LinkExtractor::new(selector).unwrap().extract(body, PAGE)
    }

    // ==================== Resolution ====================

    #[test]
    fn test_relative_hrefs_resolve_against_page() {
        let links = extract(
            r#"<ul><li><a href="a.html">A</a></li><li><a href="/b">B</a></li></ul>"#,
            "li a",
        );
        assert_eq!(
            links,
            vec![
                ExtractedLink {
                    title: "A".to_string(),
                    href: "https://example.com/news/a.html".to_string(),
                },
                ExtractedLink {
                    title: "B".to_string(),
                    href: "https://example.com/b".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_base_href_overrides_page_url() {
        let links = extract(
            r#"<html><head><base href="https://cdn.example.org/root/"></head>
               <body><a href="item">Item</a></body></html>"#,
            "a",
        );
        assert_eq!(links[0].href, "https://cdn.example.org/root/item");
    }

    #[test]
    fn test_absolute_href_kept() {
        let links = extract(r#"<a href="https://other.org/x">X</a>"#, "a");
        assert_eq!(links[0].href, "https://other.org/x");
    }

    #[test]
    fn test_unresolvable_href_kept_verbatim() {
        let links = LinkExtractor::new("a")
            .unwrap()
            .extract(r#"<a href="relative/path">R</a>"#, "not a url");
        assert_eq!(links[0].href, "relative/path");
    }

    // ==================== Filtering ====================

    #[test]
    fn test_anchors_without_href_are_skipped() {
        let links = extract(r#"<a name="top">Top</a><a href="/x">X</a>"#, "a");
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].title, "X");
    }

    #[test]
    fn test_empty_href_resolves_to_page() {
        let links = extract(r#"<a href="">Here</a><a href="  ">Blank</a>"#, "a");
        let hrefs: Vec<_> = links.iter().map(|l| l.href.as_str()).collect();
        assert_eq!(hrefs, vec![PAGE, PAGE]);
    }

    #[test]
    fn test_empty_href_resolves_to_base_href() {
        let links = extract(
            r#"<head><base href="https://cdn.example.org/root/"></head><a href="">Root</a>"#,
            "a",
        );
        assert_eq!(links[0].href, "https://cdn.example.org/root/");
    }

    #[test]
    fn test_non_anchor_matches_are_skipped() {
        let links = extract(
            r#"<div class="item">Not a link</div><a class="item" href="/y">Y</a>"#,
            ".item",
        );
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].href, "https://example.com/y");
    }

    #[test]
    fn test_document_order_and_duplicates_kept() {
        let links = extract(r#"<a href="/b">B</a><a href="/a">A</a><a href="/b">B2</a>"#, "a");
        let titles: Vec<_> = links.iter().map(|l| l.title.as_str()).collect();
        assert_eq!(titles, vec!["B", "A", "B2"]);
    }

    // ==================== Titles ====================

    #[test]
    fn test_title_whitespace_is_collapsed() {
        let links = extract("<a href=\"/x\">\n   Hello\n\t <b>big</b>   world  </a>", "a");
        assert_eq!(links[0].title, "Hello big world");
    }

    #[test]
    fn test_image_title_preferred_over_alt() {
        let links = extract(r#"<a href="/x"><img title="T" alt="A"></a>"#, "a");
        assert_eq!(links[0].title, "T");
    }

    #[test]
    fn test_image_alt_used_without_title() {
        let links = extract(r#"<a href="/x"><img alt="A"></a>"#, "a");
        assert_eq!(links[0].title, "A");
    }

    #[test]
    fn test_image_empty_title_falls_back_to_alt() {
        let links = extract(r#"<a href="/x"><img title="" alt="A"></a>"#, "a");
        assert_eq!(links[0].title, "A");
    }

    #[test]
    fn test_image_without_attributes_adds_nothing() {
        let links = extract(r#"<a href="/x">Label <img src="i.png"></a>"#, "a");
        assert_eq!(links[0].title, "Label");
    }

    #[test]
    fn test_image_text_joins_surrounding_text() {
        let links = extract(r#"<a href="/x">New<img alt="icon">item</a>"#, "a");
        assert_eq!(links[0].title, "New icon item");
    }

    #[test]
    fn test_extraction_leaves_body_untouched() {
        let body = r#"<a href="/x"><img alt="A"></a>"#;
        let before = body.to_string();
        let _ = extract(body, "a");
        assert_eq!(body, before);
    }

    // ==================== Errors ====================

    #[test]
    fn test_extract_links_empty_result_is_error() {
        let err = extract_links("<p>nothing</p>", PAGE, "a.news").unwrap_err();
        assert_eq!(err.to_string(), "no link found. check your css_selector.");
    }

    #[test]
    fn test_invalid_selector_reports_no_links() {
        let err = extract_links(r#"<a href="/x">X</a>"#, PAGE, "a[").unwrap_err();
        assert_eq!(err, CheckError::NoLinksMatched);
    }

    #[test]
    fn test_extract_links_returns_matches() {
        let links = extract_links(r#"<a href="/x">X</a>"#, PAGE, "a").unwrap();
        assert_eq!(links.len(), 1);
    }
}
