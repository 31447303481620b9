//! GitHub contents API source.

use doccrew_shared::{DoccrewError, Entry, Result, SourceKind};
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use tracing::{debug, instrument};
use url::Url;

use crate::source::{ContentSource, Node, NodeKind, is_markdown};

const GITHUB_ACCEPT: &str = "application/vnd.github+json";

/// One item of a contents listing.
#[derive(Debug, Deserialize)]
struct ContentItem {
    path: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    download_url: Option<String>,
}

/// Markdown files of a GitHub repository, read through the contents API.
pub struct GithubSource {
    client: Client,
    api_root: Url,
    git_ref: Option<String>,
    token: Option<String>,
}

impl GithubSource {
    /// `api_root` is the repository API URL,
    /// e.g. `https://api.github.com/repos/<owner>/<repo>`.
    pub fn new(client: Client, api_root: &str) -> Result<Self> {
        let api_root = Url::parse(api_root.trim_end_matches('/'))
            .map_err(|e| DoccrewError::config(format!("invalid GitHub repo base '{api_root}': {e}")))?;
        if api_root.cannot_be_a_base() {
            return Err(DoccrewError::config(format!(
                "invalid GitHub repo base '{api_root}'"
            )));
        }

        Ok(Self {
            client,
            api_root,
            git_ref: None,
            token: None,
        })
    }

    /// Branch, tag or commit to read instead of the default branch.
    pub fn with_ref(mut self, git_ref: Option<String>) -> Self {
        self.git_ref = git_ref;
        self
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    fn contents_url(&self, path: &str) -> Url {
        let mut url = self.api_root.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("contents");
            segments.extend(path.split('/').filter(|s| !s.is_empty()));
        }
        if let Some(git_ref) = &self.git_ref {
            url.query_pairs_mut().append_pair("ref", git_ref);
        }
        url
    }

    fn get(&self, url: &str) -> RequestBuilder {
        let request = self.client.get(url).header(ACCEPT, GITHUB_ACCEPT);
        match &self.token {
            Some(token) => request.header(AUTHORIZATION, format!("Bearer {token}")),
            None => request,
        }
    }
}

impl ContentSource for GithubSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Github
    }

    fn root(&self) -> Node {
        Node::dir("")
    }

    #[instrument(skip_all, fields(path = %node.key))]
    async fn list_children(&self, node: &Node) -> Result<Vec<Node>> {
        if node.kind != NodeKind::Dir {
            return Ok(Vec::new());
        }

        let url = self.contents_url(&node.key);
        debug!(%url, "listing directory");

        let response = self
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| DoccrewError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if status == StatusCode::FORBIDDEN {
            let reset = response
                .headers()
                .get("x-ratelimit-reset")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            return Err(DoccrewError::RateLimited {
                provider: "github".into(),
                reset,
            });
        }
        if !status.is_success() {
            return Err(DoccrewError::Network(format!("{url}: HTTP {status}")));
        }

        let items: Vec<ContentItem> = response
            .json()
            .await
            .map_err(|e| DoccrewError::parse(format!("{url}: unexpected contents listing: {e}")))?;

        Ok(items
            .into_iter()
            .filter_map(|item| match item.kind.as_str() {
                "dir" => Some(Node::dir(item.path)),
                "file" => {
                    let node = Node::file(item.path);
                    Some(match item.download_url {
                        Some(location) => node.with_location(location),
                        None => node,
                    })
                }
                _ => None,
            })
            .collect())
    }

    fn is_leaf(&self, node: &Node) -> bool {
        node.kind == NodeKind::File && is_markdown(node.name(), true)
    }

    #[instrument(skip_all, fields(path = %node.key))]
    async fn read_text(&self, node: &Node) -> Entry {
        let Some(location) = &node.location else {
            return Entry::failed(&node.key, SourceKind::Github, "Error reading file: no download URL");
        };

        let response = match self.get(location).send().await {
            Ok(response) => response,
            Err(e) => {
                return Entry::failed(&node.key, SourceKind::Github, format!("Error reading file: {e}"));
            }
        };

        let status = response.status();
        if !status.is_success() {
            return Entry::failed(
                &node.key,
                SourceKind::Github,
                format!("Error downloading file: {status}"),
            );
        }

        match response.text().await {
            Ok(text) => Entry::text(&node.key, SourceKind::Github, text),
            Err(e) => Entry::failed(&node.key, SourceKind::Github, format!("Error reading file: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use doccrew_shared::WalkLimits;
    use doccrew_storage::DocumentReader;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::walk;

    fn source(server: &MockServer) -> GithubSource {
        GithubSource::new(Client::new(), &format!("{}/repos/acme/docs", server.uri())).unwrap()
    }

    async fn listing(server: &MockServer, at: &str, body: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path(at))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }

    async fn raw(server: &MockServer, at: &str, status: u16, body: &str) {
        Mock::given(method("GET"))
            .and(path(at))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(server)
            .await;
    }

    async fn mount_docs_tree(server: &MockServer) {
        let base = server.uri();
        listing(
            server,
            "/repos/acme/docs/contents",
            json!([
                {"name": "docs", "path": "docs", "type": "dir", "download_url": null},
                {"name": "LICENSE", "path": "LICENSE", "type": "file",
                 "download_url": format!("{base}/raw/LICENSE")}
            ]),
        )
        .await;
        listing(
            server,
            "/repos/acme/docs/contents/docs",
            json!([
                {"name": "a.md", "path": "docs/a.md", "type": "file",
                 "download_url": format!("{base}/raw/docs/a.md")},
                {"name": "sub", "path": "docs/sub", "type": "dir", "download_url": null}
            ]),
        )
        .await;
        listing(
            server,
            "/repos/acme/docs/contents/docs/sub",
            json!([
                {"name": "b.md", "path": "docs/sub/b.md", "type": "file",
                 "download_url": format!("{base}/raw/docs/sub/b.md")}
            ]),
        )
        .await;
        raw(server, "/raw/docs/a.md", 200, "X").await;
        raw(server, "/raw/docs/sub/b.md", 200, "Y").await;
    }

    #[test]
    fn contents_url_shapes() {
        let src = GithubSource::new(Client::new(), "https://api.github.com/repos/o/r/")
            .unwrap()
            .with_ref(Some("v1.0".into()));

        assert_eq!(
            src.contents_url("").as_str(),
            "https://api.github.com/repos/o/r/contents?ref=v1.0"
        );
        assert_eq!(
            src.contents_url("docs/sub").as_str(),
            "https://api.github.com/repos/o/r/contents/docs/sub?ref=v1.0"
        );
    }

    #[tokio::test]
    async fn harvests_nested_markdown_by_full_path() {
        let server = MockServer::start().await;
        mount_docs_tree(&server).await;

        let outcome = walk(&source(&server), &WalkLimits::default()).await.unwrap();

        assert_eq!(outcome.store.list_keys(), vec!["docs/a.md", "docs/sub/b.md"]);
        assert_eq!(outcome.store.read("docs/a.md"), Some("X"));
        assert_eq!(outcome.store.read("docs/sub/b.md"), Some("Y"));
        assert!(outcome.store.get("LICENSE").is_none());
    }

    #[tokio::test]
    async fn forbidden_top_level_listing_is_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/docs/contents"))
            .respond_with(
                ResponseTemplate::new(403).insert_header("X-RateLimit-Reset", "1700000000"),
            )
            .mount(&server)
            .await;

        let err = walk(&source(&server), &WalkLimits::default())
            .await
            .unwrap_err();

        match err {
            DoccrewError::RateLimited { provider, reset } => {
                assert_eq!(provider, "github");
                assert_eq!(reset.as_deref(), Some("1700000000"));
            }
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn other_listing_errors_are_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/docs/contents"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = walk(&source(&server), &WalkLimits::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DoccrewError::Network(_)));
    }

    #[tokio::test]
    async fn failed_download_is_stored_in_band() {
        let server = MockServer::start().await;
        let base = server.uri();
        listing(
            &server,
            "/repos/acme/docs/contents",
            json!([
                {"name": "gone.md", "path": "gone.md", "type": "file",
                 "download_url": format!("{base}/raw/gone.md")},
                {"name": "ok.md", "path": "ok.md", "type": "file",
                 "download_url": format!("{base}/raw/ok.md")}
            ]),
        )
        .await;
        raw(&server, "/raw/gone.md", 404, "").await;
        raw(&server, "/raw/ok.md", 200, "fine").await;

        let outcome = walk(&source(&server), &WalkLimits::default()).await.unwrap();

        assert_eq!(outcome.stats.failed, 1);
        assert_eq!(
            outcome.store.read("gone.md"),
            Some("Error downloading file: 404 Not Found")
        );
        assert_eq!(outcome.store.read("ok.md"), Some("fine"));
    }

    #[tokio::test]
    async fn sends_ref_and_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/docs/contents"))
            .and(query_param("ref", "dev"))
            .and(header("authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let src = source(&server)
            .with_ref(Some("dev".into()))
            .with_token(Some("secret".into()));
        let outcome = walk(&src, &WalkLimits::default()).await.unwrap();
        assert!(outcome.store.is_empty());
    }
}
