//! End-to-end harvest: target → source → walk → document store.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use tracing::{info, instrument};
use url::Url;

use doccrew_crawler::{
    ContentSource, GithubSource, GitlabSource, LocalSource, WalkStats, WebSource, walk,
};
use doccrew_shared::config::{ENV_GITHUB_REPO_BASE, ENV_GITLAB_PROJECT_ID};
use doccrew_shared::{
    AppConfig, BodyFormat, DoccrewError, Result, SourceKind, WalkLimits, require,
};
use doccrew_storage::DocumentStore;

/// Directory read by the local source when no path is given.
pub const DEFAULT_LOCAL_DIR: &str = "docs";

/// Characters shown per document in a harvest preview.
pub const PREVIEW_CHARS: usize = 200;

// ---------------------------------------------------------------------------
// Targets
// ---------------------------------------------------------------------------

/// A fully resolved thing to harvest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HarvestTarget {
    Web {
        seed: Url,
        body_format: BodyFormat,
    },
    Github {
        repo_base: String,
        git_ref: Option<String>,
        token: Option<String>,
    },
    Gitlab {
        project_root: String,
        branch: String,
        token: Option<String>,
    },
    Local {
        root: PathBuf,
    },
}

impl HarvestTarget {
    pub fn kind(&self) -> SourceKind {
        match self {
            Self::Web { .. } => SourceKind::Web,
            Self::Github { .. } => SourceKind::Github,
            Self::Gitlab { .. } => SourceKind::Gitlab,
            Self::Local { .. } => SourceKind::Local,
        }
    }

    /// Resolve a target from the source kind, an optional explicit target
    /// (seed URL, repo base, project id, or directory) and the config.
    ///
    /// Missing required settings are config errors, raised before any I/O.
    pub fn resolve(kind: SourceKind, target: Option<&str>, config: &AppConfig) -> Result<Self> {
        match kind {
            SourceKind::Web => {
                let seed = target
                    .or(config.web.seed_url.as_deref())
                    .ok_or_else(|| DoccrewError::config("no seed URL given and [web].seed_url is unset"))?;
                let seed = Url::parse(seed)
                    .map_err(|e| DoccrewError::validation(format!("invalid seed URL '{seed}': {e}")))?;
                Ok(Self::Web {
                    seed,
                    body_format: config.web.body_format,
                })
            }
            SourceKind::Github => {
                let repo_base =
                    require(target.or(config.github.repo_base.as_deref()), ENV_GITHUB_REPO_BASE)?;
                Ok(Self::Github {
                    repo_base: repo_base.to_string(),
                    git_ref: config.github.git_ref.clone(),
                    token: config.github.token(),
                })
            }
            SourceKind::Gitlab => {
                let mut gitlab = config.gitlab.clone();
                if let Some(id) = target {
                    require(Some(id), ENV_GITLAB_PROJECT_ID)?;
                    gitlab.project_id = Some(id.to_string());
                    gitlab.repo_base = None;
                }
                Ok(Self::Gitlab {
                    project_root: gitlab.project_root()?,
                    token: gitlab.token(),
                    branch: gitlab.branch,
                })
            }
            SourceKind::Local => Ok(Self::Local {
                root: PathBuf::from(target.unwrap_or(DEFAULT_LOCAL_DIR)),
            }),
        }
    }
}

impl std::fmt::Display for HarvestTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Web { seed, .. } => write!(f, "{seed}"),
            Self::Github { repo_base, .. } => f.write_str(repo_base),
            Self::Gitlab {
                project_root,
                branch,
                ..
            } => write!(f, "{project_root} ({branch})"),
            Self::Local { root } => write!(f, "{}", root.display()),
        }
    }
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Result of a harvest.
#[derive(Debug)]
pub struct HarvestResult {
    pub kind: SourceKind,
    pub store: DocumentStore,
    pub stats: WalkStats,
    pub elapsed: Duration,
}

/// Progress callback for reporting harvest status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called when the harvest completes.
    fn done(&self, result: &HarvestResult);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn done(&self, _result: &HarvestResult) {}
}

// ---------------------------------------------------------------------------
// Harvest
// ---------------------------------------------------------------------------

/// Walk `target` and collect its documents.
#[instrument(skip_all, fields(source = %target.kind(), target = %target))]
pub async fn harvest(
    target: &HarvestTarget,
    limits: &WalkLimits,
    timeout_secs: u64,
    progress: &dyn ProgressReporter,
) -> Result<HarvestResult> {
    let start = Instant::now();
    info!("starting harvest");

    progress.phase(match target {
        HarvestTarget::Web { .. } => "Crawling documentation site",
        HarvestTarget::Github { .. } => "Reading GitHub repository",
        HarvestTarget::Gitlab { .. } => "Reading GitLab repository",
        HarvestTarget::Local { .. } => "Reading local directory",
    });

    let (store, stats) = match target {
        HarvestTarget::Web { seed, body_format } => {
            let client = doccrew_discovery::build_client(timeout_secs)?;
            let source = WebSource::new(client, seed)?.with_body_format(*body_format);
            run(&source, limits).await?
        }
        HarvestTarget::Github {
            repo_base,
            git_ref,
            token,
        } => {
            let client = doccrew_discovery::build_client(timeout_secs)?;
            let source = GithubSource::new(client, repo_base)?
                .with_ref(git_ref.clone())
                .with_token(token.clone());
            run(&source, limits).await?
        }
        HarvestTarget::Gitlab {
            project_root,
            branch,
            token,
        } => {
            let client = doccrew_discovery::build_client(timeout_secs)?;
            let source = GitlabSource::new(client, project_root, branch.clone())?
                .with_token(token.clone())
                .with_max_children(limits.max_nodes);
            run(&source, limits).await?
        }
        HarvestTarget::Local { root } => run(&LocalSource::new(root.clone()), limits).await?,
    };

    let result = HarvestResult {
        kind: target.kind(),
        store,
        stats,
        elapsed: start.elapsed(),
    };

    info!(
        documents = result.store.len(),
        failed = result.stats.failed,
        elapsed_ms = result.elapsed.as_millis() as u64,
        "harvest complete"
    );
    progress.done(&result);

    Ok(result)
}

async fn run<S: ContentSource>(source: &S, limits: &WalkLimits) -> Result<(DocumentStore, WalkStats)> {
    let outcome = walk(source, limits).await?;
    Ok((outcome.store, outcome.stats))
}

/// The first `max_chars` characters of `text`, with `...` when cut.
pub fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use doccrew_storage::DocumentReader;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[test]
    fn preview_cuts_on_char_boundaries() {
        assert_eq!(preview("short", 200), "short");
        assert_eq!(preview("héllo wörld", 5), "héllo...");
        assert_eq!(preview("", 3), "");
    }

    #[test]
    fn resolve_requires_repo_base() {
        let config = AppConfig::default();
        let err = HarvestTarget::resolve(SourceKind::Github, None, &config).unwrap_err();
        assert!(matches!(err, DoccrewError::Config { .. }));
        assert!(err.to_string().contains("GITHUB_REPO_BASE"));
    }

    #[test]
    fn resolve_gitlab_from_project_id() {
        let mut config = AppConfig::default();
        config.gitlab.branch = "develop".into();

        let target = HarvestTarget::resolve(SourceKind::Gitlab, Some("42"), &config).unwrap();
        assert_eq!(
            target,
            HarvestTarget::Gitlab {
                project_root: "https://gitlab.com/api/v4/projects/42".into(),
                branch: "develop".into(),
                token: config.gitlab.token(),
            }
        );

        let err = HarvestTarget::resolve(SourceKind::Gitlab, None, &config).unwrap_err();
        assert!(err.to_string().contains("GITLAB_PROJECT_ID"));
    }

    #[test]
    fn resolve_web_and_local() {
        let config = AppConfig::default();

        let web =
            HarvestTarget::resolve(SourceKind::Web, Some("https://docs.example.com/"), &config)
                .unwrap();
        assert_eq!(web.kind(), SourceKind::Web);
        assert!(HarvestTarget::resolve(SourceKind::Web, Some("not a url"), &config).is_err());
        assert!(HarvestTarget::resolve(SourceKind::Web, None, &config).is_err());

        let local = HarvestTarget::resolve(SourceKind::Local, None, &config).unwrap();
        assert_eq!(
            local,
            HarvestTarget::Local {
                root: PathBuf::from("docs")
            }
        );
    }

    #[tokio::test]
    async fn harvests_local_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("guide")).unwrap();
        fs::write(dir.path().join("guide/setup.md"), "# Setup").unwrap();

        let target = HarvestTarget::Local {
            root: dir.path().to_path_buf(),
        };
        let result = harvest(&target, &WalkLimits::default(), 10, &SilentProgress)
            .await
            .unwrap();

        assert_eq!(result.kind, SourceKind::Local);
        assert_eq!(result.store.read("guide/setup.md"), Some("# Setup"));
    }

    #[tokio::test]
    async fn harvests_github_repository() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/o/r/contents"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"name": "README.md", "path": "README.md", "type": "file",
                 "download_url": format!("{}/raw/README.md", server.uri())}
            ])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/raw/README.md"))
            .respond_with(ResponseTemplate::new(200).set_body_string("hello"))
            .mount(&server)
            .await;

        let target = HarvestTarget::Github {
            repo_base: format!("{}/repos/o/r", server.uri()),
            git_ref: None,
            token: None,
        };
        let result = harvest(&target, &WalkLimits::default(), 10, &SilentProgress)
            .await
            .unwrap();

        assert_eq!(result.store.read("README.md"), Some("hello"));
        assert_eq!(result.stats.stored, 1);
    }
}
