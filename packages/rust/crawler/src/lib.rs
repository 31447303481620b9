//! Tree walking over documentation sources.
//!
//! This crate provides:
//! - [`ContentSource`]: the capability set a harvestable source implements
//! - [`walk`]: depth-first traversal with depth and node caps
//! - [`sources`]: GitHub, GitLab, local directory and website adapters

pub mod source;
pub mod sources;
pub mod walker;

pub use source::{ContentSource, Node, NodeKind};
pub use sources::{GithubSource, GitlabSource, LocalSource, WebSource};
pub use walker::{WalkOutcome, WalkStats, walk};
