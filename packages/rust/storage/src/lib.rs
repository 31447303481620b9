//! In-memory document store with JSON persistence.
//!
//! The [`DocumentStore`] maps keys (page URLs or repository-relative paths) to
//! harvested [`Entry`] records. It persists either as a flat `key -> text`
//! JSON object ([`DocumentStore::save`]) or as full entry records
//! ([`DocumentStore::save_entries`]).
//!
//! Consumers that only need to read documents go through [`DocumentReader`].

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use doccrew_shared::{DoccrewError, Entry, Result, SourceKind};
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use tracing::{debug, info};

/// Indentation widths accepted by the JSON writers.
pub const SUPPORTED_INDENTS: [usize; 2] = [2, 4];

// ---------------------------------------------------------------------------
// DocumentReader
// ---------------------------------------------------------------------------

/// Read-only view of a document collection.
pub trait DocumentReader {
    /// All keys, in sorted order.
    fn list_keys(&self) -> Vec<String>;

    /// Text for `key`: the content, or the error message of a failed read.
    fn read(&self, key: &str) -> Option<&str>;
}

// ---------------------------------------------------------------------------
// DocumentStore
// ---------------------------------------------------------------------------

/// Key-ordered collection of harvested entries.
#[derive(Debug, Clone, Default)]
pub struct DocumentStore {
    entries: BTreeMap<String, Entry>,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry, replacing any previous entry with the same key.
    pub fn put(&mut self, entry: Entry) {
        if let Some(old) = self.entries.insert(entry.key.clone(), entry) {
            debug!(key = %old.key, "replaced existing entry");
        }
    }

    pub fn get(&self, key: &str) -> Option<&Entry> {
        self.entries.get(key)
    }

    pub fn get_all(&self) -> &BTreeMap<String, Entry> {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries recording a failed read.
    pub fn error_count(&self) -> usize {
        self.entries.values().filter(|e| e.is_error()).count()
    }

    /// Fold `other` into this store. Entries from `other` win on key clashes.
    pub fn merge(&mut self, other: DocumentStore) {
        self.entries.extend(other.entries);
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    /// Write the flat `key -> text` JSON object to `path`.
    pub fn save(&self, path: &Path, indent: usize) -> Result<()> {
        let flat: BTreeMap<&str, &str> = self
            .entries
            .iter()
            .map(|(key, entry)| (key.as_str(), entry.flat_text()))
            .collect();

        write_json(path, &flat, indent)?;
        info!(path = %path.display(), entries = flat.len(), "document store saved");
        Ok(())
    }

    /// Write every entry with its full metadata to `path`.
    pub fn save_entries(&self, path: &Path, indent: usize) -> Result<()> {
        let entries: Vec<&Entry> = self.entries.values().collect();
        write_json(path, &entries, indent)?;
        info!(path = %path.display(), entries = entries.len(), "entry dump saved");
        Ok(())
    }

    /// Read a flat `key -> text` JSON object written by [`save`](Self::save).
    ///
    /// Every value becomes a plain entry attributed to `source`.
    pub fn load(path: &Path, source: SourceKind) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|e| DoccrewError::io(path, e))?;
        let flat: BTreeMap<String, String> = serde_json::from_str(&raw).map_err(|e| {
            DoccrewError::Serialization(format!("{}: {e}", path.display()))
        })?;

        let mut store = Self::new();
        for (key, text) in flat {
            store.put(Entry::text(key, source, text));
        }
        debug!(path = %path.display(), entries = store.len(), "document store loaded");
        Ok(store)
    }

    /// Read a full entry dump written by [`save_entries`](Self::save_entries).
    pub fn load_entries(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|e| DoccrewError::io(path, e))?;
        let entries: Vec<Entry> = serde_json::from_str(&raw).map_err(|e| {
            DoccrewError::Serialization(format!("{}: {e}", path.display()))
        })?;

        Ok(entries.into_iter().collect())
    }
}

impl FromIterator<Entry> for DocumentStore {
    fn from_iter<I: IntoIterator<Item = Entry>>(iter: I) -> Self {
        let mut store = Self::new();
        for entry in iter {
            store.put(entry);
        }
        store
    }
}

impl DocumentReader for DocumentStore {
    fn list_keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    fn read(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(Entry::flat_text)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T, indent: usize) -> Result<()> {
    if !SUPPORTED_INDENTS.contains(&indent) {
        return Err(DoccrewError::validation(format!(
            "unsupported JSON indent {indent}: expected 2 or 4"
        )));
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| DoccrewError::io(parent, e))?;
    }

    let pad = " ".repeat(indent);
    let mut buf = Vec::new();
    let mut ser =
        serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(pad.as_bytes()));
    value
        .serialize(&mut ser)
        .map_err(|e| DoccrewError::Serialization(e.to_string()))?;
    buf.push(b'\n');

    fs::write(path, buf).map_err(|e| DoccrewError::io(path, e))
}
