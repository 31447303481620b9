//! Local directory source.

use std::path::{Path, PathBuf};

use doccrew_shared::{DoccrewError, Entry, Result, SourceKind};
use tracing::{debug, instrument};

use crate::source::{ContentSource, Node, NodeKind, is_markdown};

/// Markdown files under a directory on disk, keyed by path relative to it.
#[derive(Debug, Clone)]
pub struct LocalSource {
    root: PathBuf,
}

impl LocalSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root_dir(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, key: &str) -> PathBuf {
        key.split('/')
            .filter(|s| !s.is_empty())
            .fold(self.root.clone(), |path, part| path.join(part))
    }
}

impl ContentSource for LocalSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Local
    }

    fn root(&self) -> Node {
        Node::dir("")
    }

    #[instrument(skip_all, fields(path = %node.key))]
    async fn list_children(&self, node: &Node) -> Result<Vec<Node>> {
        if node.kind != NodeKind::Dir {
            return Ok(Vec::new());
        }

        let dir = self.resolve(&node.key);
        let mut reader = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| DoccrewError::io(&dir, e))?;

        let mut children = Vec::new();
        while let Some(item) = reader.next_entry().await.map_err(|e| DoccrewError::io(&dir, e))? {
            let file_type = item
                .file_type()
                .await
                .map_err(|e| DoccrewError::io(item.path(), e))?;
            let name = item.file_name().to_string_lossy().into_owned();
            let key = if node.key.is_empty() {
                name
            } else {
                format!("{}/{name}", node.key)
            };

            if file_type.is_dir() {
                children.push(Node::dir(key));
            } else if file_type.is_file() {
                children.push(Node::file(key));
            } else {
                debug!(%key, "skipping non-regular entry");
            }
        }

        children.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(children)
    }

    fn is_leaf(&self, node: &Node) -> bool {
        node.kind == NodeKind::File && is_markdown(node.name(), true)
    }

    async fn read_text(&self, node: &Node) -> Entry {
        match tokio::fs::read_to_string(self.resolve(&node.key)).await {
            Ok(text) => Entry::text(&node.key, SourceKind::Local, text),
            Err(e) => Entry::failed(&node.key, SourceKind::Local, format!("Error reading file: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use doccrew_shared::WalkLimits;
    use doccrew_storage::DocumentReader;

    use super::*;
    use crate::walk;

    #[tokio::test]
    async fn reads_markdown_recursively() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("docs/sub")).unwrap();
        fs::write(dir.path().join("docs/a.md"), "X").unwrap();
        fs::write(dir.path().join("docs/sub/b.md"), "Y").unwrap();
        fs::write(dir.path().join("docs/notes.txt"), "ignored").unwrap();
        fs::write(dir.path().join("docs/UPPER.MD"), "case").unwrap();

        let outcome = walk(&LocalSource::new(dir.path()), &WalkLimits::default())
            .await
            .unwrap();

        assert_eq!(outcome.store.list_keys(), vec!["docs/a.md", "docs/sub/b.md"]);
        assert_eq!(outcome.store.read("docs/a.md"), Some("X"));
        assert_eq!(outcome.store.read("docs/sub/b.md"), Some("Y"));
    }

    #[tokio::test]
    async fn invalid_utf8_is_stored_in_band() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("bin.md"), [0xff, 0xfe, 0x00]).unwrap();
        fs::write(dir.path().join("ok.md"), "fine").unwrap();

        let outcome = walk(&LocalSource::new(dir.path()), &WalkLimits::default())
            .await
            .unwrap();

        assert_eq!(outcome.stats.failed, 1);
        let text = outcome.store.read("bin.md").unwrap();
        assert!(text.starts_with("Error reading file:"));
        assert_eq!(outcome.store.read("ok.md"), Some("fine"));
    }

    #[tokio::test]
    async fn missing_root_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let source = LocalSource::new(dir.path().join("absent"));

        let err = walk(&source, &WalkLimits::default()).await.unwrap_err();
        assert!(matches!(err, DoccrewError::Io { .. }));
    }

    #[test]
    fn keys_resolve_under_root() {
        let source = LocalSource::new("/srv/docs");
        assert_eq!(source.resolve("guide/intro.md"), PathBuf::from("/srv/docs/guide/intro.md"));
        assert_eq!(source.resolve(""), PathBuf::from("/srv/docs"));
    }
}
