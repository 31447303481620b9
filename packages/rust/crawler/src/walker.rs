//! Depth-first traversal over any [`ContentSource`].

use std::collections::HashSet;

use doccrew_shared::{Result, WalkLimits};
use doccrew_storage::DocumentStore;
use tracing::{debug, info, instrument, warn};

use crate::source::{ContentSource, Node, NodeKind};

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Counters from a completed walk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalkStats {
    /// Nodes taken off the stack and processed.
    pub visited: usize,
    /// Leaves read successfully.
    pub stored: usize,
    /// Leaves whose read failed (stored as error entries).
    pub failed: usize,
    /// Nodes dropped for exceeding the depth limit.
    pub skipped_depth: usize,
    /// Set when the node limit stopped the walk early.
    pub truncated: bool,
}

/// Documents plus counters from a walk.
#[derive(Debug, Clone, Default)]
pub struct WalkOutcome {
    pub store: DocumentStore,
    pub stats: WalkStats,
}

// ---------------------------------------------------------------------------
// Walk
// ---------------------------------------------------------------------------

/// Walk `source` from its root, reading every leaf into a [`DocumentStore`].
///
/// Children are visited in listing order. A listing failure aborts the walk
/// and no partial store is returned.
#[instrument(skip_all, fields(source = %source.kind()))]
pub async fn walk<S: ContentSource>(source: &S, limits: &WalkLimits) -> Result<WalkOutcome> {
    let mut store = DocumentStore::new();
    let mut stats = WalkStats::default();
    let mut visited: HashSet<String> = HashSet::new();
    let mut stack: Vec<(Node, u32)> = vec![(source.root(), 0)];

    info!(
        max_depth = limits.max_depth,
        max_nodes = limits.max_nodes,
        "starting walk"
    );

    while let Some((node, depth)) = stack.pop() {
        if visited.contains(&node.key) {
            continue;
        }
        let leaf = source.is_leaf(&node);
        if node.kind == NodeKind::File && !leaf {
            continue;
        }
        if depth > limits.max_depth {
            debug!(key = %node.key, depth, "beyond depth limit, skipping");
            stats.skipped_depth += 1;
            continue;
        }
        if visited.len() >= limits.max_nodes {
            warn!(max_nodes = limits.max_nodes, "node limit reached, stopping");
            stats.truncated = true;
            break;
        }
        visited.insert(node.key.clone());
        stats.visited += 1;

        if leaf {
            let entry = source.read_text(&node).await;
            if let Some(err) = &entry.error {
                warn!(key = %entry.key, error = %err, "read failed");
                stats.failed += 1;
            } else {
                debug!(key = %entry.key, bytes = entry.content.len(), "stored");
                stats.stored += 1;
            }
            store.put(entry);
        }

        let children = source.list_children(&node).await?;
        for child in children.into_iter().rev() {
            if !visited.contains(&child.key) {
                stack.push((child, depth + 1));
            }
        }
    }

    info!(
        visited = stats.visited,
        stored = stats.stored,
        failed = stats.failed,
        skipped_depth = stats.skipped_depth,
        truncated = stats.truncated,
        "walk complete"
    );

    Ok(WalkOutcome { store, stats })
}
