//! Same-origin link discovery for documentation sites.
//!
//! Starting from a seed URL, every reachable page on the seed's origin is
//! visited once, depth-first, and its outbound links are followed. The
//! traversal uses an explicit stack, so depth is bounded by
//! [`WalkLimits::max_depth`] rather than by the call stack.
//!
//! The HTTP helpers here ([`build_client`], [`fetch_page`]) are shared with
//! the web content source in `doccrew-crawler`.

use std::collections::BTreeSet;
use std::time::Duration;

use doccrew_shared::{DoccrewError, Result, WalkLimits};
use reqwest::Client;
use scraper::Html;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Maximum number of redirects to follow per request.
const MAX_REDIRECTS: usize = 5;

/// Default timeout in seconds for page requests.
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// User-Agent string for every doccrew HTTP request.
pub const USER_AGENT: &str = concat!("doccrew/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Options & results
// ---------------------------------------------------------------------------

/// Configuration for a discovery run.
#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    /// Timeout for each HTTP request in seconds.
    pub timeout_secs: u64,
    /// Depth and page-count caps.
    pub limits: WalkLimits,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            limits: WalkLimits::default(),
        }
    }
}

/// Outcome of a discovery run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Discovery {
    /// Every URL a fetch was attempted for, seed included.
    pub visited: BTreeSet<String>,
    /// Set when the page cap stopped the traversal early.
    pub truncated: bool,
}

/// A fetched page. Non-success statuses are returned, not raised.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Final URL after redirects.
    pub url: Url,
    pub status: u16,
    pub body: String,
}

impl FetchedPage {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

// ---------------------------------------------------------------------------
// Main entry point
// ---------------------------------------------------------------------------

/// Visit every same-origin page reachable from `seed`.
///
/// Only an invalid seed is an error. Pages that fail to load are logged and
/// their branch is abandoned.
#[instrument(skip_all, fields(seed = %seed))]
pub async fn discover(seed: &Url, opts: &DiscoveryOptions) -> Result<Discovery> {
    let seed = normalize_seed(seed)?;
    let client = build_client(opts.timeout_secs)?;

    info!(
        max_depth = opts.limits.max_depth,
        max_pages = opts.limits.max_nodes,
        "starting link discovery"
    );

    let mut visited = BTreeSet::new();
    let mut truncated = false;
    let mut stack = vec![(seed.clone(), 0u32)];

    while let Some((url, depth)) = stack.pop() {
        if visited.contains(url.as_str()) {
            continue;
        }
        if visited.len() >= opts.limits.max_nodes {
            truncated = true;
            warn!(max_pages = opts.limits.max_nodes, "page limit reached, stopping");
            break;
        }
        visited.insert(url.to_string());

        let page = match fetch_page(&client, &url).await {
            Ok(page) => page,
            Err(e) => {
                warn!(%url, error = %e, "request failed, abandoning branch");
                continue;
            }
        };
        if !page.is_success() {
            debug!(%url, status = page.status, "non-success status, abandoning branch");
            continue;
        }
        if depth >= opts.limits.max_depth {
            debug!(%url, depth, "depth limit reached, not following links");
            continue;
        }

        let links = {
            let doc = Html::parse_document(&page.body);
            doccrew_extract::extract_links(&doc, &page.url)
        };

        // Reverse so the first link on the page is visited first.
        for link in links.into_iter().rev() {
            if same_origin(&link, &seed) && !visited.contains(link.as_str()) {
                stack.push((link, depth + 1));
            }
        }
    }

    info!(pages = visited.len(), truncated, "link discovery complete");
    Ok(Discovery { visited, truncated })
}

// ---------------------------------------------------------------------------
// HTTP helpers
// ---------------------------------------------------------------------------

/// Build a reqwest client with the doccrew user agent and a request timeout.
pub fn build_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| DoccrewError::Network(format!("failed to build HTTP client: {e}")))
}

/// GET a page and read its body.
///
/// Only transport failures are errors; the status is left to the caller.
pub async fn fetch_page(client: &Client, url: &Url) -> Result<FetchedPage> {
    debug!(%url, "fetching page");

    let response = client
        .get(url.clone())
        .send()
        .await
        .map_err(|e| DoccrewError::Network(format!("{url}: {e}")))?;

    let status = response.status().as_u16();
    let final_url = response.url().clone();
    let body = response
        .text()
        .await
        .map_err(|e| DoccrewError::Network(format!("{url}: failed to read body: {e}")))?;

    Ok(FetchedPage {
        url: final_url,
        status,
        body,
    })
}

/// Whether two URLs share scheme, host and port.
pub fn same_origin(a: &Url, b: &Url) -> bool {
    a.origin() == b.origin()
}

/// Check that a seed is an http(s) URL with a host, and strip its fragment.
pub fn normalize_seed(seed: &Url) -> Result<Url> {
    if !matches!(seed.scheme(), "http" | "https") {
        return Err(DoccrewError::validation(format!(
            "seed URL must use http or https: {seed}"
        )));
    }
    if seed.host_str().is_none() {
        return Err(DoccrewError::validation(format!("seed URL has no host: {seed}")));
    }

    let mut seed = seed.clone();
    seed.set_fragment(None);
    Ok(seed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn html(body: &str) -> ResponseTemplate {
        ResponseTemplate::new(200)
            .insert_header("content-type", "text/html")
            .set_body_string(format!("<html><body>{body}</body></html>"))
    }

    async fn page(server: &MockServer, at: &str, body: &str) {
        Mock::given(method("GET"))
            .and(path(at))
            .respond_with(html(body))
            .expect(1)
            .mount(server)
            .await;
    }

    #[test]
    fn origin_compares_scheme_host_and_port() {
        let a = Url::parse("https://docs.example.com/a").unwrap();
        let b = Url::parse("https://docs.example.com/b?x=1").unwrap();
        let c = Url::parse("http://docs.example.com/a").unwrap();
        let d = Url::parse("https://docs.example.com:8443/a").unwrap();
        assert!(same_origin(&a, &b));
        assert!(!same_origin(&a, &c));
        assert!(!same_origin(&a, &d));
    }

    #[test]
    fn seed_validation() {
        let ok = normalize_seed(&Url::parse("https://docs.example.com/#top").unwrap()).unwrap();
        assert_eq!(ok.as_str(), "https://docs.example.com/");

        let file = Url::parse("file:///tmp/docs").unwrap();
        assert!(matches!(
            normalize_seed(&file),
            Err(DoccrewError::Validation { .. })
        ));
    }

    #[tokio::test]
    async fn invalid_seed_is_an_error() {
        let seed = Url::parse("mailto:docs@example.com").unwrap();
        assert!(discover(&seed, &DiscoveryOptions::default()).await.is_err());
    }

    #[tokio::test]
    async fn visits_each_page_once() {
        let server = MockServer::start().await;
        page(&server, "/", r#"<a href="/a">A</a><a href="/b">B</a>"#).await;
        page(&server, "/a", r#"<a href="/">home</a><a href="/b#part">B</a>"#).await;
        page(&server, "/b", r#"<a href="/a">A</a><a href="/">home</a>"#).await;

        let seed = Url::parse(&server.uri()).unwrap();
        let found = discover(&seed, &DiscoveryOptions::default()).await.unwrap();

        let base = server.uri();
        let expected: BTreeSet<String> = [
            format!("{base}/"),
            format!("{base}/a"),
            format!("{base}/b"),
        ]
        .into_iter()
        .collect();
        assert_eq!(found.visited, expected);
        assert!(!found.truncated);
    }

    #[tokio::test]
    async fn cross_origin_links_are_not_followed() {
        let server = MockServer::start().await;
        let other = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(html("elsewhere"))
            .expect(0)
            .mount(&other)
            .await;

        let body = format!(r#"<a href="{}/page">external</a>"#, other.uri());
        page(&server, "/", &body).await;

        let seed = Url::parse(&server.uri()).unwrap();
        let found = discover(&seed, &DiscoveryOptions::default()).await.unwrap();

        assert_eq!(found.visited.len(), 1);
        assert!(found.visited.contains(&format!("{}/", server.uri())));
    }

    #[tokio::test]
    async fn failed_pages_abandon_their_branch() {
        let server = MockServer::start().await;
        page(&server, "/", r#"<a href="/missing">gone</a><a href="/ok">ok</a>"#).await;
        page(&server, "/ok", "<p>leaf</p>").await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let seed = Url::parse(&server.uri()).unwrap();
        let found = discover(&seed, &DiscoveryOptions::default()).await.unwrap();

        assert_eq!(found.visited.len(), 3);
        assert!(found.visited.contains(&format!("{}/missing", server.uri())));
    }

    #[tokio::test]
    async fn page_cap_truncates() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(html(r#"<a href="/1">1</a><a href="/2">2</a><a href="/3">3</a>"#))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(html("<p>leaf</p>"))
            .mount(&server)
            .await;

        let opts = DiscoveryOptions {
            limits: WalkLimits {
                max_depth: 32,
                max_nodes: 2,
            },
            ..Default::default()
        };
        let seed = Url::parse(&server.uri()).unwrap();
        let found = discover(&seed, &opts).await.unwrap();

        assert_eq!(found.visited.len(), 2);
        assert!(found.truncated);
        assert!(found.visited.contains(&format!("{}/1", server.uri())));
    }

    #[tokio::test]
    async fn depth_cap_stops_following_links() {
        let server = MockServer::start().await;
        page(&server, "/", r#"<a href="/deep">deeper</a>"#).await;
        Mock::given(method("GET"))
            .and(path("/deep"))
            .respond_with(html(r#"<a href="/deeper">x</a>"#))
            .expect(0)
            .mount(&server)
            .await;

        let opts = DiscoveryOptions {
            limits: WalkLimits {
                max_depth: 0,
                max_nodes: 100,
            },
            ..Default::default()
        };
        let seed = Url::parse(&server.uri()).unwrap();
        let found = discover(&seed, &opts).await.unwrap();

        assert_eq!(found.visited.len(), 1);
    }
}
