//! Documentation website source.
//!
//! Every page is a leaf. Reading a page records its same-origin links, and
//! listing the page returns them, so the walk follows the site's link graph.

use std::collections::HashMap;
use std::sync::Mutex;

use doccrew_discovery::{fetch_page, normalize_seed, same_origin};
use doccrew_shared::{BodyFormat, Entry, Result, SourceKind};
use reqwest::Client;
use scraper::Html;
use tracing::{instrument, warn};
use url::Url;

use crate::source::{ContentSource, Node};

/// Pages reachable from a seed URL on the same origin.
pub struct WebSource {
    client: Client,
    seed: Url,
    body_format: BodyFormat,
    /// Links recorded by `read_text`, consumed by `list_children`.
    links: Mutex<HashMap<String, Vec<Url>>>,
}

impl WebSource {
    /// Fails when the seed is not an http(s) URL with a host.
    pub fn new(client: Client, seed: &Url) -> Result<Self> {
        Ok(Self {
            client,
            seed: normalize_seed(seed)?,
            body_format: BodyFormat::default(),
            links: Mutex::new(HashMap::new()),
        })
    }

    pub fn with_body_format(mut self, body_format: BodyFormat) -> Self {
        self.body_format = body_format;
        self
    }

    pub fn seed(&self) -> &Url {
        &self.seed
    }

    fn remember_links(&self, key: &str, links: Vec<Url>) {
        if let Ok(mut cache) = self.links.lock() {
            cache.insert(key.to_string(), links);
        }
    }

    /// Build the entry for a successfully fetched page.
    fn page_entry(&self, key: &str, page_url: &Url, body: &str) -> (Entry, Vec<Url>) {
        let doc = Html::parse_document(body);
        let extracted = doccrew_extract::extract(&doc);

        let mut links: Vec<Url> = Vec::new();
        for link in doccrew_extract::extract_links(&doc, page_url) {
            if same_origin(&link, &self.seed) && !links.contains(&link) {
                links.push(link);
            }
        }

        let content = match self.body_format {
            BodyFormat::Text => extracted.body_text,
            BodyFormat::Markdown => match doccrew_extract::to_markdown(&doc, Some(page_url)) {
                Ok(md) => md,
                Err(e) => {
                    warn!(%key, error = %e, "markdown conversion failed, keeping plain text");
                    extracted.body_text
                }
            },
        };

        let entry = Entry::text(key, SourceKind::Web, content)
            .with_title(extracted.title)
            .with_outline(extracted.outline)
            .with_links(links.iter().map(Url::to_string));

        (entry, links)
    }
}

impl ContentSource for WebSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Web
    }

    fn root(&self) -> Node {
        Node::page(self.seed.as_str())
    }

    async fn list_children(&self, node: &Node) -> Result<Vec<Node>> {
        let links = match self.links.lock() {
            Ok(mut cache) => cache.remove(&node.key).unwrap_or_default(),
            Err(_) => Vec::new(),
        };
        Ok(links.into_iter().map(|url| Node::page(url.as_str())).collect())
    }

    fn is_leaf(&self, _node: &Node) -> bool {
        true
    }

    #[instrument(skip_all, fields(url = %node.key))]
    async fn read_text(&self, node: &Node) -> Entry {
        let url = match Url::parse(&node.key) {
            Ok(url) => url,
            Err(e) => return Entry::failed(&node.key, SourceKind::Web, format!("Error fetching page: {e}")),
        };

        let page = match fetch_page(&self.client, &url).await {
            Ok(page) => page,
            Err(e) => return Entry::failed(&node.key, SourceKind::Web, format!("Error fetching page: {e}")),
        };
        if !page.is_success() {
            return Entry::failed(
                &node.key,
                SourceKind::Web,
                format!("Error fetching page: HTTP {}", page.status),
            );
        }

        let (entry, links) = self.page_entry(&node.key, &page.url, &page.body);
        self.remember_links(&node.key, links);
        entry
    }
}

#[cfg(test)]
mod tests {
    use doccrew_shared::{Section, WalkLimits};
    use doccrew_storage::DocumentReader;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::walk;

    async fn page(server: &MockServer, at: &str, status: u16, html: &str) {
        Mock::given(method("GET"))
            .and(path(at))
            .respond_with(
                ResponseTemplate::new(status)
                    .insert_header("content-type", "text/html")
                    .set_body_string(html),
            )
            .expect(1)
            .mount(server)
            .await;
    }

    fn source(server: &MockServer) -> WebSource {
        WebSource::new(Client::new(), &Url::parse(&server.uri()).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn harvests_same_origin_pages() {
        let server = MockServer::start().await;
        let other = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&other)
            .await;

        page(
            &server,
            "/",
            200,
            &format!(
                r#"<html><head><title>Home</title></head><body><main>
                <h1>Welcome</h1><a href="/guide">Guide</a><a href="{}/x">Ext</a>
                </main></body></html>"#,
                other.uri()
            ),
        )
        .await;
        page(
            &server,
            "/guide",
            200,
            r#"<html><body><article><h1>Guide</h1><h2>Install</h2><p>Run it.</p>
            <a href="/">Home</a><a href="/missing">Missing</a></article></body></html>"#,
        )
        .await;
        page(&server, "/missing", 404, "").await;

        let outcome = walk(&source(&server), &WalkLimits::default()).await.unwrap();
        let base = server.uri();

        assert_eq!(outcome.store.len(), 3);
        assert_eq!(outcome.stats.failed, 1);

        let home = outcome.store.get(&format!("{base}/")).unwrap();
        assert_eq!(home.title, "Home");
        assert!(home.links.contains(&format!("{base}/guide")));
        assert_eq!(home.links.len(), 1);

        let guide = outcome.store.get(&format!("{base}/guide")).unwrap();
        assert_eq!(guide.content, "Guide\nInstall\nRun it.\nHome\nMissing");
        assert_eq!(
            guide.outline,
            vec![Section::new(1, "Guide"), Section::new(2, "Install")]
        );

        assert_eq!(
            outcome.store.read(&format!("{base}/missing")),
            Some("Error fetching page: HTTP 404")
        );
    }

    #[tokio::test]
    async fn markdown_body_format() {
        let server = MockServer::start().await;
        page(
            &server,
            "/",
            200,
            "<html><body><article><h1>Title</h1><p>Body text.</p></article></body></html>",
        )
        .await;

        let src = source(&server).with_body_format(BodyFormat::Markdown);
        let outcome = walk(&src, &WalkLimits::default()).await.unwrap();

        let entry = outcome.store.get(&format!("{}/", server.uri())).unwrap();
        assert!(entry.content.contains("# Title"));
        assert!(entry.content.contains("Body text."));
    }

    #[test]
    fn rejects_non_http_seed() {
        let seed = Url::parse("ftp://example.com/docs").unwrap();
        assert!(WebSource::new(Client::new(), &seed).is_err());
    }
}
