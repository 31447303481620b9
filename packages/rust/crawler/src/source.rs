//! The capability set every harvestable source implements.

use std::future::Future;

use doccrew_shared::{Entry, Result, SourceKind};

/// What a node in a source tree is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// A directory; expanded, never read.
    Dir,
    /// A file; read when the source accepts it as a leaf.
    File,
    /// A web page; both read and expanded.
    Page,
}

/// One position in a source tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    /// Full relative path (repositories, local) or URL (web). Root is `""`
    /// for path-keyed sources.
    pub key: String,
    pub kind: NodeKind,
    /// Where to fetch the node's bytes when that differs from `key`.
    pub location: Option<String>,
}

impl Node {
    pub fn dir(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            kind: NodeKind::Dir,
            location: None,
        }
    }

    pub fn file(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            kind: NodeKind::File,
            location: None,
        }
    }

    pub fn page(url: impl Into<String>) -> Self {
        Self {
            key: url.into(),
            kind: NodeKind::Page,
            location: None,
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Final path component of the key.
    pub fn name(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }
}

/// A tree of documents that [`walk`](crate::walk) can traverse.
///
/// Listing failures are returned as errors and abort the walk. Read failures
/// are reported in-band as an [`Entry::failed`] so the walk can continue.
pub trait ContentSource: Send + Sync {
    /// Which kind of source this is; stamped on every entry.
    fn kind(&self) -> SourceKind;

    /// The node the walk starts from.
    fn root(&self) -> Node;

    /// Direct children of `node`, in listing order.
    fn list_children(&self, node: &Node) -> impl Future<Output = Result<Vec<Node>>> + Send;

    /// Whether `node` is a document to read.
    fn is_leaf(&self, node: &Node) -> bool;

    /// Read a leaf into an entry.
    fn read_text(&self, node: &Node) -> impl Future<Output = Entry> + Send;
}

/// Whether a file name carries the Markdown extension.
pub(crate) fn is_markdown(name: &str, case_sensitive: bool) -> bool {
    if case_sensitive {
        name.ends_with(".md")
    } else {
        name.to_ascii_lowercase().ends_with(".md")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_name_is_last_component() {
        assert_eq!(Node::file("docs/sub/b.md").name(), "b.md");
        assert_eq!(Node::file("README.md").name(), "README.md");
        assert_eq!(Node::dir("").name(), "");
    }

    #[test]
    fn markdown_extension_rules() {
        assert!(is_markdown("a.md", true));
        assert!(!is_markdown("A.MD", true));
        assert!(is_markdown("A.MD", false));
        assert!(!is_markdown("a.mdx", false));
    }
}
