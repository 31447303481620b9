//! Shared types, error model, and configuration for doccrew.
//!
//! This crate is the foundation depended on by all other doccrew crates.
//! It provides:
//! - [`DoccrewError`], the unified error type
//! - Domain types ([`Entry`], [`Section`], [`SourceKind`])
//! - Configuration ([`AppConfig`], [`WalkLimits`], config loading, env overrides)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AgentsConfig, AppConfig, BodyFormat, DefaultsConfig, GithubConfig, GitlabConfig, WalkLimits,
    WebConfig, apply_env, config_dir, config_file_path, init_config, load_config,
    load_config_from, load_dotenv, require, validate_api_key,
};
pub use error::{DoccrewError, Result};
pub use types::{Entry, Section, SourceKind, content_hash};
