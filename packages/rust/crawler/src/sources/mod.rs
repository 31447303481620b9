//! Built-in [`ContentSource`](crate::ContentSource) adapters.

mod github;
mod gitlab;
mod local;
mod web;

pub use github::GithubSource;
pub use gitlab::GitlabSource;
pub use local::LocalSource;
pub use web::WebSource;
