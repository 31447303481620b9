//! Main-content extraction for documentation pages.
//!
//! Given a parsed HTML document this crate isolates the "main" content block,
//! collects its heading outline and text, reads the document title, and
//! resolves the page's outbound links. Extraction never fails: missing markup
//! degrades to empty values. [`to_markdown`] renders the same container as
//! Markdown through `htmd`.

mod cleanup;

use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};
use tracing::{debug, instrument};
use url::Url;

use doccrew_shared::{DoccrewError, Result, Section};

/// Main-content candidates, highest priority first.
pub const CONTAINER_SELECTORS: [&str; 4] = ["article", "main", "div.content", "div.document"];

/// Elements whose text never counts as body text.
const SKIPPED_TEXT_TAGS: [&str; 3] = ["script", "style", "noscript"];

static CONTAINERS: LazyLock<Vec<(&'static str, Selector)>> = LazyLock::new(|| {
    CONTAINER_SELECTORS
        .iter()
        .map(|s| (*s, Selector::parse(s).expect("valid selector")))
        .collect()
});
static TITLE_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("title").expect("valid selector"));
static HEADING_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h1, h2, h3").expect("valid selector"));
static LINK_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("valid selector"));

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// What [`extract`] pulls out of a page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extracted {
    /// `<title>` text, or empty.
    pub title: String,
    /// Container text, one trimmed text node per line.
    pub body_text: String,
    /// H1–H3 headings inside the container, in document order.
    pub outline: Vec<Section>,
    /// Selector of the container that matched, if any.
    pub container: Option<&'static str>,
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

/// Extract title, body text and section outline from a parsed page.
pub fn extract(doc: &Html) -> Extracted {
    let title = extract_title(doc);

    let Some((selector, container)) = main_container(doc) else {
        debug!("no main-content container found");
        return Extracted {
            title,
            ..Default::default()
        };
    };

    Extracted {
        title,
        body_text: container_text(container),
        outline: outline(container),
        container: Some(selector),
    }
}

/// Find the first matching main-content container in priority order.
pub fn main_container(doc: &Html) -> Option<(&'static str, ElementRef<'_>)> {
    CONTAINERS
        .iter()
        .find_map(|(name, sel)| doc.select(sel).next().map(|el| (*name, el)))
}

fn extract_title(doc: &Html) -> String {
    doc.select(&TITLE_SEL)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .unwrap_or_default()
}

fn outline(container: ElementRef<'_>) -> Vec<Section> {
    container
        .select(&HEADING_SEL)
        .map(|el| {
            let level = el.value().name()[1..].parse().unwrap_or(1);
            Section::new(level, collapse_whitespace(el.text()))
        })
        .collect()
}

fn container_text(container: ElementRef<'_>) -> String {
    let mut lines = Vec::new();

    for node in container.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node
            .ancestors()
            .filter_map(ElementRef::wrap)
            .any(|el| SKIPPED_TEXT_TAGS.contains(&el.value().name()));
        if hidden {
            continue;
        }
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            lines.push(trimmed);
        }
    }

    lines.join("\n")
}

fn collapse_whitespace<'a>(parts: impl Iterator<Item = &'a str>) -> String {
    parts
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

// ---------------------------------------------------------------------------
// Links
// ---------------------------------------------------------------------------

/// Resolve every `a[href]` against `base`, in document order.
///
/// Fragment-only, `javascript:` and `mailto:` hrefs are skipped and fragments
/// are stripped from the resolved URLs.
pub fn extract_links(doc: &Html, base: &Url) -> Vec<Url> {
    let mut links = Vec::new();

    for el in doc.select(&LINK_SEL) {
        let Some(href) = el.value().attr("href") else {
            continue;
        };
        let href = href.trim();
        if href.is_empty()
            || href.starts_with('#')
            || href.starts_with("javascript:")
            || href.starts_with("mailto:")
        {
            continue;
        }

        if let Ok(mut resolved) = base.join(href) {
            resolved.set_fragment(None);
            links.push(resolved);
        }
    }

    links
}

// ---------------------------------------------------------------------------
// Markdown
// ---------------------------------------------------------------------------

/// Render the main-content container as cleaned-up Markdown.
///
/// Returns an empty string when the page has no candidate container.
#[instrument(skip_all, fields(url = base_url.map(Url::as_str).unwrap_or("")))]
pub fn to_markdown(doc: &Html, base_url: Option<&Url>) -> Result<String> {
    let Some((_, container)) = main_container(doc) else {
        return Ok(String::new());
    };

    let converter = htmd::HtmlToMarkdown::builder()
        .skip_tags(vec!["script", "style", "nav", "iframe", "noscript", "svg"])
        .build();

    let raw = converter
        .convert(&container.inner_html())
        .map_err(|e| DoccrewError::parse(format!("htmd conversion failed: {e}")))?;

    debug!(raw_len = raw.len(), "htmd conversion complete");
    Ok(cleanup::run_pipeline(&raw, base_url))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
