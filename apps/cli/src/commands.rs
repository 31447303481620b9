//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use doccrew_core::{
    BridgeConfig, BridgeRunner, HarvestResult, HarvestTarget, PREVIEW_CHARS, PayloadMode,
    ProgressReporter, harvest, preview, run_pipeline,
};
use doccrew_discovery::DiscoveryOptions;
use doccrew_shared::{
    AppConfig, BodyFormat, SourceKind, WalkLimits, init_config, load_config, validate_api_key,
};
use doccrew_storage::DocumentStore;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;
use url::Url;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// doccrew: harvest documentation and hand it to an agent crew.
#[derive(Parser)]
#[command(
    name = "doccrew",
    version,
    about = "Harvest documentation from websites, repositories or local folders into JSON, and ask questions about it.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Options shared by every harvesting command.
#[derive(Args, Debug, Clone, Default)]
pub(crate) struct HarvestArgs {
    /// Flat JSON output path (defaults to `[defaults].output`).
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    /// Also write full entry records (title, outline, links, errors) here.
    #[arg(long)]
    pub entries: Option<PathBuf>,

    /// JSON indentation: 2 or 4.
    #[arg(long)]
    pub indent: Option<usize>,

    /// Deepest level followed from the root.
    #[arg(long)]
    pub max_depth: Option<u32>,

    /// Maximum number of pages or tree nodes visited.
    #[arg(long)]
    pub max_pages: Option<usize>,

    /// Skip the per-document preview.
    #[arg(long)]
    pub no_preview: bool,
}

impl HarvestArgs {
    fn limits(&self, config: &AppConfig) -> WalkLimits {
        let defaults = WalkLimits::from(config);
        WalkLimits {
            max_depth: self.max_depth.unwrap_or(defaults.max_depth),
            max_nodes: self.max_pages.unwrap_or(defaults.max_nodes),
        }
    }
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// List every same-origin page reachable from a URL.
    Discover {
        /// Seed URL.
        url: String,

        /// Deepest link level followed from the seed.
        #[arg(long)]
        max_depth: Option<u32>,

        /// Maximum number of pages visited.
        #[arg(long)]
        max_pages: Option<usize>,
    },

    /// Crawl a documentation website into JSON.
    Crawl {
        /// Seed URL (defaults to `[web].seed_url`).
        url: Option<String>,

        /// Store pages as Markdown instead of plain text.
        #[arg(long)]
        markdown: bool,

        #[command(flatten)]
        harvest: HarvestArgs,
    },

    /// Collect the Markdown files of a GitHub repository.
    Github {
        /// Repository API root (overrides GITHUB_REPO_BASE).
        #[arg(long)]
        repo_base: Option<String>,

        /// Branch, tag or commit to read.
        #[arg(long = "ref")]
        git_ref: Option<String>,

        #[command(flatten)]
        harvest: HarvestArgs,
    },

    /// Collect the Markdown files of a GitLab project.
    Gitlab {
        /// Project id (overrides GITLAB_PROJECT_ID).
        #[arg(long)]
        project_id: Option<String>,

        /// Branch to read (overrides GITLAB_BRANCH).
        #[arg(long)]
        branch: Option<String>,

        #[command(flatten)]
        harvest: HarvestArgs,
    },

    /// Collect the Markdown files under a local directory.
    Local {
        /// Directory to read (defaults to `docs`).
        dir: Option<String>,

        #[command(flatten)]
        harvest: HarvestArgs,
    },

    /// Harvest a source, then ask the agent crew a question about it.
    Ask {
        /// Where the documentation lives: web, github, gitlab, or local.
        #[arg(long, default_value = "web")]
        source: SourceKind,

        /// Seed URL, repo base, project id, or directory for the source.
        #[arg(long)]
        target: Option<String>,

        /// The question to answer.
        #[arg(short, long)]
        query: String,

        /// Extra context about the asker (experience level, focus).
        #[arg(short, long, default_value = "")]
        context: String,

        /// Payload mode: auto, batch, or per-page (defaults to `[agents].payload`).
        #[arg(long)]
        payload: Option<String>,

        #[command(flatten)]
        harvest: HarvestArgs,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Env var consulted for a log filter before `RUST_LOG`.
const LOG_ENV: &str = "DOCCREW_LOG";

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "doccrew=info",
        1 => "doccrew=debug",
        _ => "doccrew=trace",
    };

    let env_filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Discover {
            url,
            max_depth,
            max_pages,
        } => cmd_discover(&url, max_depth, max_pages).await,
        Command::Crawl {
            url,
            markdown,
            harvest,
        } => {
            let mut config = load_config()?;
            if markdown {
                config.web.body_format = BodyFormat::Markdown;
            }
            cmd_harvest(SourceKind::Web, url.as_deref(), &config, &harvest).await
        }
        Command::Github {
            repo_base,
            git_ref,
            harvest,
        } => {
            let mut config = load_config()?;
            if git_ref.is_some() {
                config.github.git_ref = git_ref;
            }
            cmd_harvest(SourceKind::Github, repo_base.as_deref(), &config, &harvest).await
        }
        Command::Gitlab {
            project_id,
            branch,
            harvest,
        } => {
            let mut config = load_config()?;
            if let Some(branch) = branch {
                config.gitlab.branch = branch;
            }
            cmd_harvest(SourceKind::Gitlab, project_id.as_deref(), &config, &harvest).await
        }
        Command::Local { dir, harvest } => {
            let config = load_config()?;
            cmd_harvest(SourceKind::Local, dir.as_deref(), &config, &harvest).await
        }
        Command::Ask {
            source,
            target,
            query,
            context,
            payload,
            harvest,
        } => cmd_ask(source, target.as_deref(), query, context, payload, &harvest).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_discover(url: &str, max_depth: Option<u32>, max_pages: Option<usize>) -> Result<()> {
    let config = load_config()?;
    let seed = Url::parse(url).map_err(|e| eyre!("invalid URL '{url}': {e}"))?;

    let defaults = WalkLimits::from(&config);
    let opts = DiscoveryOptions {
        timeout_secs: config.defaults.timeout_secs,
        limits: WalkLimits {
            max_depth: max_depth.unwrap_or(defaults.max_depth),
            max_nodes: max_pages.unwrap_or(defaults.max_nodes),
        },
    };

    info!(url, "discovering links");
    let found = doccrew_discovery::discover(&seed, &opts).await?;

    for page in &found.visited {
        println!("{page}");
    }
    if found.truncated {
        eprintln!(
            "note: stopped after {} pages (raise --max-pages to continue)",
            found.visited.len()
        );
    }
    Ok(())
}

async fn cmd_harvest(
    kind: SourceKind,
    target: Option<&str>,
    config: &AppConfig,
    args: &HarvestArgs,
) -> Result<()> {
    let target = HarvestTarget::resolve(kind, target, config)?;
    let result = run_harvest(&target, config, args).await?;
    let out = save_outputs(&result.store, config, args)?;

    print_summary(&result, &out);
    if !args.no_preview {
        print_previews(&result.store);
    }
    Ok(())
}

async fn cmd_ask(
    source: SourceKind,
    target: Option<&str>,
    query: String,
    context: String,
    payload: Option<String>,
    args: &HarvestArgs,
) -> Result<()> {
    // Fail on missing settings before any network traffic.
    let config = load_config()?;
    validate_api_key(&config)?;
    let mode = PayloadMode::resolve(payload.as_deref().unwrap_or(&config.agents.payload), source)?;
    let target = HarvestTarget::resolve(source, target, &config)?;

    let result = run_harvest(&target, &config, args).await?;
    if args.out.is_some() || args.entries.is_some() {
        save_outputs(&result.store, &config, args)?;
    }
    if result.store.is_empty() {
        return Err(eyre!("no documents were found at {target}"));
    }

    info!(?mode, documents = result.store.len(), "handing documents to the agent crew");
    let reporter = CliProgress::new();
    reporter.phase("Running agent crew");

    let mut runner = BridgeRunner::new(BridgeConfig::from(&config.agents));
    let store = result.store;
    let answer = tokio::task::spawn_blocking(move || {
        run_pipeline(&store, mode, &query, &context, &mut runner)
    })
    .await??;
    reporter.finish();

    println!("{answer}");
    Ok(())
}

async fn run_harvest(
    target: &HarvestTarget,
    config: &AppConfig,
    args: &HarvestArgs,
) -> Result<HarvestResult> {
    info!(source = %target.kind(), %target, "harvesting documentation");

    let reporter = CliProgress::new();
    let result = harvest(
        target,
        &args.limits(config),
        config.defaults.timeout_secs,
        &reporter,
    )
    .await?;
    Ok(result)
}

/// Write the flat dump (and the entry dump, if requested). Returns the flat path.
fn save_outputs(store: &DocumentStore, config: &AppConfig, args: &HarvestArgs) -> Result<PathBuf> {
    let indent = args.indent.unwrap_or(config.defaults.json_indent);
    let out = args
        .out
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.defaults.output));

    store.save(&out, indent)?;
    if let Some(entries) = &args.entries {
        store.save_entries(entries, indent)?;
    }
    Ok(out)
}

fn print_summary(result: &HarvestResult, out: &std::path::Path) {
    println!();
    println!("  Harvest complete!");
    println!("  Source:    {}", result.kind);
    println!("  Documents: {}", result.store.len());
    println!("  Failed:    {}", result.stats.failed);
    if result.stats.skipped_depth > 0 {
        println!("  Too deep:  {}", result.stats.skipped_depth);
    }
    if result.stats.truncated {
        println!("  Truncated: yes (raise --max-pages to continue)");
    }
    println!("  Output:    {}", out.display());
    println!("  Time:      {:.1}s", result.elapsed.as_secs_f64());
    println!();
}

fn print_previews(store: &DocumentStore) {
    if store.is_empty() {
        println!("No content was harvested. Check the source settings and permissions.");
        return;
    }

    println!("Preview of harvested content:");
    for (key, entry) in store.get_all() {
        println!("\nFile: {key}\n{}\n{}", "-".repeat(40), preview(entry.flat_text(), PREVIEW_CHARS));
    }
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg} [{elapsed}]") {
            spinner.set_style(
                style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
            );
        }
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn done(&self, _result: &HarvestResult) {
        self.finish();
    }
}
