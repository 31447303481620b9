//! GitLab repository API source.
//!
//! Tree listings are paged through `X-Next-Page`. Every call site retries
//! once after an HTTP 429, sleeping until the `RateLimit-Reset` instant.

use std::collections::HashSet;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use doccrew_shared::{DoccrewError, Entry, Result, SourceKind, WalkLimits};
use reqwest::header::HeaderMap;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::source::{ContentSource, Node, NodeKind, is_markdown};

/// Tree entries requested per page.
const PER_PAGE: &str = "100";

const TOKEN_HEADER: &str = "PRIVATE-TOKEN";

/// One entry of a repository tree listing.
#[derive(Debug, Deserialize)]
struct TreeItem {
    path: String,
    #[serde(rename = "type")]
    kind: String,
}

/// Markdown files of a GitLab project, read through the repository API.
pub struct GitlabSource {
    client: Client,
    project_root: Url,
    branch: String,
    token: Option<String>,
    /// Paging through one directory stops once this many entries are listed.
    max_children: usize,
}

impl GitlabSource {
    /// `project_root` is the project API URL,
    /// e.g. `https://gitlab.com/api/v4/projects/42`.
    pub fn new(client: Client, project_root: &str, branch: impl Into<String>) -> Result<Self> {
        let project_root = Url::parse(project_root.trim_end_matches('/')).map_err(|e| {
            DoccrewError::config(format!("invalid GitLab project root '{project_root}': {e}"))
        })?;
        if project_root.cannot_be_a_base() {
            return Err(DoccrewError::config(format!(
                "invalid GitLab project root '{project_root}'"
            )));
        }

        Ok(Self {
            client,
            project_root,
            branch: branch.into(),
            token: None,
            max_children: WalkLimits::default().max_nodes,
        })
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    /// Bound the entries collected from a single tree listing. A walk capped
    /// at `max_nodes` never needs more than that from one directory.
    pub fn with_max_children(mut self, max_children: usize) -> Self {
        self.max_children = max_children.max(1);
        self
    }

    fn tree_url(&self, path: &str, page: Option<&str>) -> Url {
        let mut url = self.project_root.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(["repository", "tree"]);
        }
        {
            let mut query = url.query_pairs_mut();
            if !path.is_empty() {
                query.append_pair("path", path);
            }
            query
                .append_pair("ref", &self.branch)
                .append_pair("per_page", PER_PAGE);
            if let Some(page) = page {
                query.append_pair("page", page);
            }
        }
        url
    }

    /// Raw-file URL; the whole path is one percent-encoded segment.
    fn raw_url(&self, path: &str) -> Url {
        let mut url = self.project_root.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["repository", "files"])
                .push(path)
                .push("raw");
        }
        url.query_pairs_mut().append_pair("ref", &self.branch);
        url
    }

    async fn send(&self, url: &Url) -> reqwest::Result<Response> {
        let request = self.client.get(url.clone());
        let request = match &self.token {
            Some(token) => request.header(TOKEN_HEADER, token),
            None => request,
        };
        request.send().await
    }

    /// GET `url`, retrying exactly once after a 429.
    ///
    /// The second response is returned whatever its status.
    async fn get_with_retry(&self, url: &Url) -> reqwest::Result<Response> {
        let response = self.send(url).await?;
        if response.status() != StatusCode::TOO_MANY_REQUESTS {
            return Ok(response);
        }

        let wait = reset_delay(response.headers(), SystemTime::now());
        warn!(%url, wait_secs = wait.as_secs(), "rate limited by gitlab, retrying once");
        tokio::time::sleep(wait).await;

        self.send(url).await
    }
}

/// Time left until the `RateLimit-Reset` epoch second; zero when the header
/// is missing, malformed, or in the past.
fn reset_delay(headers: &HeaderMap, now: SystemTime) -> Duration {
    let Some(reset) = headers
        .get("ratelimit-reset")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
    else {
        return Duration::ZERO;
    };

    let reset = UNIX_EPOCH + Duration::from_secs(reset);
    reset.duration_since(now).unwrap_or(Duration::ZERO)
}

impl ContentSource for GitlabSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Gitlab
    }

    fn root(&self) -> Node {
        Node::dir("")
    }

    #[instrument(skip_all, fields(path = %node.key))]
    async fn list_children(&self, node: &Node) -> Result<Vec<Node>> {
        if node.kind != NodeKind::Dir {
            return Ok(Vec::new());
        }

        let mut children = Vec::new();
        let mut page: Option<String> = None;
        let mut requested: HashSet<Option<String>> = HashSet::new();

        loop {
            requested.insert(page.clone());
            let url = self.tree_url(&node.key, page.as_deref());
            debug!(%url, "listing tree page");

            let response = self
                .get_with_retry(&url)
                .await
                .map_err(|e| DoccrewError::Network(format!("{url}: {e}")))?;

            let status = response.status();
            if status == StatusCode::TOO_MANY_REQUESTS {
                let reset = response
                    .headers()
                    .get("ratelimit-reset")
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                return Err(DoccrewError::RateLimited {
                    provider: "gitlab".into(),
                    reset,
                });
            }
            if !status.is_success() {
                return Err(DoccrewError::Network(format!("{url}: HTTP {status}")));
            }

            let next = response
                .headers()
                .get("x-next-page")
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string);

            let items: Vec<TreeItem> = response
                .json()
                .await
                .map_err(|e| DoccrewError::parse(format!("{url}: unexpected tree listing: {e}")))?;

            children.extend(items.into_iter().filter_map(|item| match item.kind.as_str() {
                "tree" => Some(Node::dir(item.path)),
                "blob" => Some(Node::file(item.path)),
                _ => None,
            }));

            if children.len() >= self.max_children {
                if next.is_some() {
                    warn!(
                        max_children = self.max_children,
                        "tree listing cap reached, ignoring remaining pages"
                    );
                }
                break;
            }

            match next {
                Some(n) if requested.contains(&Some(n.clone())) => {
                    return Err(DoccrewError::parse(format!(
                        "{url}: X-Next-Page points back to page {n}"
                    )));
                }
                Some(n) => page = Some(n),
                None => break,
            }
        }

        Ok(children)
    }

    fn is_leaf(&self, node: &Node) -> bool {
        node.kind == NodeKind::File && is_markdown(node.name(), false)
    }

    #[instrument(skip_all, fields(path = %node.key))]
    async fn read_text(&self, node: &Node) -> Entry {
        let url = self.raw_url(&node.key);

        let response = match self.get_with_retry(&url).await {
            Ok(response) => response,
            Err(e) => {
                return Entry::failed(&node.key, SourceKind::Gitlab, format!("Error reading file: {e}"));
            }
        };

        let status = response.status();
        if !status.is_success() {
            return Entry::failed(
                &node.key,
                SourceKind::Gitlab,
                format!("Error downloading file: {status}"),
            );
        }

        match response.text().await {
            Ok(text) => Entry::text(&node.key, SourceKind::Gitlab, text),
            Err(e) => Entry::failed(&node.key, SourceKind::Gitlab, format!("Error reading file: {e}")),
        }
    }
}
