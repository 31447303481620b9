//! Agent pipeline driver.
//!
//! Harvested documents are handed to an external agent runtime together with
//! three fixed stage definitions (crawl, analyze, assist). The runtime lives
//! in a subprocess that speaks a JSON-lines protocol over stdin/stdout:
//!
//! ```text
//! runner → {"type":"ready"}
//! doccrew → {"type":"kickoff","id":"req-1","request":{...}}
//! runner → {"type":"result","id":"req-1","text":"..."}   (or {"type":"error",...})
//! doccrew → {"type":"shutdown"}
//! ```

use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use doccrew_shared::{AgentsConfig, DoccrewError, Result, SourceKind};
use doccrew_storage::DocumentReader;

/// Tool kind handed to the runner for each page in per-page mode.
pub const DOCS_SEARCH_TOOL: &str = "docs_search";

// ---------------------------------------------------------------------------
// Stages
// ---------------------------------------------------------------------------

/// One of the three fixed pipeline stages, run in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Crawl,
    Analyze,
    Assist,
}

/// Static definition of a stage's agent and task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageSpec {
    pub role: &'static str,
    pub goal: &'static str,
    pub backstory: &'static str,
    pub description: &'static str,
    pub expected_output: &'static str,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Crawl, Stage::Analyze, Stage::Assist];

    pub fn spec(&self) -> StageSpec {
        match self {
            Stage::Crawl => StageSpec {
                role: "Documentation Crawler",
                goal: "Thoroughly crawl and extract content from documentation pages",
                backstory: "You are an expert web crawler specialized in technical documentation. \
                    Your mission is to systematically explore and extract content from documentation \
                    pages while maintaining the proper structure and hierarchy.",
                description: "1. Crawl the documentation starting from the provided documents\n\
                    2. Extract content from each page\n\
                    3. Maintain documentation hierarchy\n\
                    4. Collect all relevant links and content\n\
                    5. Store the extracted information",
                expected_output: "A structured dictionary containing:\n\
                    - Extracted content from all documentation pages\n\
                    - Hierarchical structure of the documentation\n\
                    - All relevant links and their relationships\n\
                    - Metadata for each page\n\
                    - Error logs if any pages failed to crawl",
            },
            Stage::Analyze => StageSpec {
                role: "Content Analyzer",
                goal: "Process and organize documentation content for efficient retrieval",
                backstory: "You are an expert in analyzing technical documentation and creating \
                    structured knowledge bases. Your role is to process raw content, create summaries, \
                    and organize information in an easily searchable format.",
                description: "1. Process the crawled documentation content\n\
                    2. Generate summaries for each section\n\
                    3. Create a searchable knowledge base\n\
                    4. Identify key concepts and their relationships\n\
                    5. Prepare content for user queries",
                expected_output: "A processed knowledge base containing:\n\
                    - Section summaries\n\
                    - Key concepts and their definitions\n\
                    - Relationship mappings between concepts\n\
                    - Indexed content for quick search\n\
                    - Metadata for content organization",
            },
            Stage::Assist => StageSpec {
                role: "Documentation Guide",
                goal: "Help users understand and apply documentation effectively",
                backstory: "You are an expert technical assistant who helps users navigate \
                    and understand documentation. You can break down complex problems into \
                    step-by-step solutions and provide clear, actionable guidance.",
                description: "1. Understand user {query} about the documentation and the {user_context}\n\
                    2. Search the processed knowledge base\n\
                    3. Provide step-by-step solutions\n\
                    4. Explain concepts clearly\n\
                    5. Guide users through implementation",
                expected_output: "Clear and actionable responses including:\n\
                    - Direct answers to user {query}\n\
                    - Step-by-step implementation of the answer\n\
                    - Relevant documentation references\n\
                    - Troubleshooting suggestions if needed",
            },
        }
    }
}

/// Substitute `{query}` and `{user_context}` placeholders.
fn render(template: &str, query: &str, user_context: &str) -> String {
    template
        .replace("{query}", query)
        .replace("{user_context}", user_context)
}

// ---------------------------------------------------------------------------
// Payload
// ---------------------------------------------------------------------------

/// How harvested documents are handed to the runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadMode {
    /// One payload carrying every document.
    Batch,
    /// One search tool per page URL.
    PerPage,
}

impl PayloadMode {
    /// Resolve a configured mode (`auto`, `batch`, `per-page`) for a source.
    ///
    /// `auto` picks per-page tools for web harvests and a batch otherwise.
    pub fn resolve(setting: &str, source: SourceKind) -> Result<Self> {
        match setting.to_ascii_lowercase().as_str() {
            "auto" => Ok(match source {
                SourceKind::Web => Self::PerPage,
                _ => Self::Batch,
            }),
            "batch" => Ok(Self::Batch),
            "per-page" | "per_page" => Ok(Self::PerPage),
            other => Err(DoccrewError::config(format!(
                "unknown payload mode '{other}': expected auto, batch, or per-page"
            ))),
        }
    }
}

/// One document of a batch payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub key: String,
    pub text: String,
}

/// A per-page search tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub kind: String,
    pub docs_url: String,
}

/// Materialized documents for the runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Payload {
    Batch { documents: Vec<Document> },
    PerPage { tools: Vec<ToolSpec> },
}

impl Payload {
    /// Build a payload from every document in `reader`.
    pub fn materialize(reader: &dyn DocumentReader, mode: PayloadMode) -> Self {
        let keys = reader.list_keys();
        match mode {
            PayloadMode::Batch => Payload::Batch {
                documents: keys
                    .into_iter()
                    .filter_map(|key| {
                        let text = reader.read(&key)?.to_string();
                        Some(Document { key, text })
                    })
                    .collect(),
            },
            PayloadMode::PerPage => Payload::PerPage {
                tools: keys
                    .into_iter()
                    .map(|docs_url| ToolSpec {
                        kind: DOCS_SEARCH_TOOL.to_string(),
                        docs_url,
                    })
                    .collect(),
            },
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Payload::Batch { documents } => documents.len(),
            Payload::PerPage { tools } => tools.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// Kickoff request
// ---------------------------------------------------------------------------

/// A rendered stage as sent to the runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRequest {
    pub stage: Stage,
    pub role: String,
    pub goal: String,
    pub backstory: String,
    pub description: String,
    pub expected_output: String,
}

/// User inputs for the assist stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inputs {
    pub query: String,
    pub user_context: String,
}

/// Everything the runner needs for one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KickoffRequest {
    pub stages: Vec<StageRequest>,
    pub payload: Payload,
    pub inputs: Inputs,
}

impl KickoffRequest {
    pub fn new(payload: Payload, query: &str, user_context: &str) -> Self {
        let stages = Stage::ALL
            .iter()
            .map(|stage| {
                let spec = stage.spec();
                StageRequest {
                    stage: *stage,
                    role: spec.role.to_string(),
                    goal: spec.goal.to_string(),
                    backstory: spec.backstory.to_string(),
                    description: render(spec.description, query, user_context),
                    expected_output: render(spec.expected_output, query, user_context),
                }
            })
            .collect();

        Self {
            stages,
            payload,
            inputs: Inputs {
                query: query.to_string(),
                user_context: user_context.to_string(),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Runner boundary
// ---------------------------------------------------------------------------

/// Executes a pipeline run and returns the final answer text.
pub trait AgentRunner {
    fn kickoff(&mut self, request: &KickoffRequest) -> Result<String>;
}

/// Run the three-stage pipeline over every document in `reader`.
#[instrument(skip_all, fields(mode = ?mode))]
pub fn run_pipeline(
    reader: &dyn DocumentReader,
    mode: PayloadMode,
    query: &str,
    user_context: &str,
    runner: &mut dyn AgentRunner,
) -> Result<String> {
    let payload = Payload::materialize(reader, mode);
    if payload.is_empty() {
        return Err(DoccrewError::validation(
            "no documents were harvested; nothing to hand to the agents",
        ));
    }

    info!(documents = payload.len(), "starting agent pipeline");
    let request = KickoffRequest::new(payload, query, user_context);
    let text = runner.kickoff(&request)?;
    info!(answer_len = text.len(), "agent pipeline complete");

    Ok(text)
}

// ---------------------------------------------------------------------------
// Bridge protocol
// ---------------------------------------------------------------------------

/// Settings forwarded to the runner process with each kickoff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunnerSettings {
    pub model: String,
    pub embedder_model: String,
    pub api_key_env: String,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RequestMessage<'a> {
    Kickoff {
        id: String,
        settings: &'a RunnerSettings,
        request: &'a KickoffRequest,
    },
    Shutdown,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseMessage {
    Ready,
    Result {
        id: String,
        text: String,
    },
    Error {
        #[allow(dead_code)]
        #[serde(default)]
        id: Option<String>,
        error: String,
    },
}

/// Configuration for the runner subprocess.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub command: String,
    pub args: Vec<String>,
    pub settings: RunnerSettings,
}

impl From<&AgentsConfig> for BridgeConfig {
    fn from(config: &AgentsConfig) -> Self {
        Self {
            command: config.runner_cmd.clone(),
            args: config.runner_args.clone(),
            settings: RunnerSettings {
                model: config.model.clone(),
                embedder_model: config.embedder_model.clone(),
                api_key_env: config.api_key_env.clone(),
            },
        }
    }
}

/// [`AgentRunner`] backed by an external process speaking JSON lines.
///
/// A fresh process is spawned for each kickoff and shut down afterwards.
pub struct BridgeRunner {
    config: BridgeConfig,
    request_counter: u64,
}

impl BridgeRunner {
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            config,
            request_counter: 0,
        }
    }
}

impl AgentRunner for BridgeRunner {
    fn kickoff(&mut self, request: &KickoffRequest) -> Result<String> {
        self.request_counter += 1;
        let id = format!("req-{}", self.request_counter);

        let mut bridge = BridgeHandle::spawn(&self.config)?;
        let outcome = bridge.send_kickoff(&id, &self.config.settings, request);
        bridge.shutdown();
        outcome
    }
}

/// Handle to the spawned runner subprocess.
struct BridgeHandle {
    child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
}

impl BridgeHandle {
    fn spawn(config: &BridgeConfig) -> Result<Self> {
        info!(cmd = %config.command, args = ?config.args, "spawning agent runner");

        let mut child = Command::new(&config.command)
            .args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| {
                DoccrewError::Agent(format!(
                    "failed to spawn runner: {e}. Is `{}` installed?",
                    config.command
                ))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| DoccrewError::Agent("failed to capture runner stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DoccrewError::Agent("failed to capture runner stdout".into()))?;

        let mut handle = Self {
            child,
            stdin,
            reader: BufReader::new(stdout),
        };

        match handle.read_message() {
            Ok(ResponseMessage::Ready) => {
                info!("agent runner is ready");
                Ok(handle)
            }
            Err(e) => {
                handle.kill();
                Err(e)
            }
            Ok(other) => {
                handle.shutdown();
                Err(DoccrewError::Agent(format!(
                    "expected ready message, got {other:?}"
                )))
            }
        }
    }

    /// Read the next protocol message, skipping lines that are not JSON
    /// objects (agent frameworks print progress to stdout).
    fn read_message(&mut self) -> Result<ResponseMessage> {
        loop {
            let mut line = String::new();
            let read = self
                .reader
                .read_line(&mut line)
                .map_err(|e| DoccrewError::Agent(format!("runner read error: {e}")))?;
            if read == 0 {
                return Err(DoccrewError::Agent("runner closed stdout unexpectedly".into()));
            }

            let trimmed = line.trim();
            if !trimmed.starts_with('{') {
                debug!(line = trimmed, "skipping runner output");
                continue;
            }

            return serde_json::from_str(trimmed).map_err(|e| {
                let cut = trimmed.char_indices().nth(200).map_or(trimmed.len(), |(i, _)| i);
                DoccrewError::Agent(format!("invalid runner message: {e} (got: {})", &trimmed[..cut]))
            });
        }
    }

    fn write_message(&mut self, message: &RequestMessage<'_>) -> Result<()> {
        let json = serde_json::to_string(message)
            .map_err(|e| DoccrewError::Agent(format!("failed to serialize request: {e}")))?;
        writeln!(self.stdin, "{json}")
            .and_then(|()| self.stdin.flush())
            .map_err(|e| DoccrewError::Agent(format!("failed to write to runner stdin: {e}")))
    }

    fn send_kickoff(
        &mut self,
        id: &str,
        settings: &RunnerSettings,
        request: &KickoffRequest,
    ) -> Result<String> {
        self.write_message(&RequestMessage::Kickoff {
            id: id.to_string(),
            settings,
            request,
        })?;

        match self.read_message()? {
            ResponseMessage::Result { id: resp_id, text } => {
                if resp_id != id {
                    warn!(expected = id, got = %resp_id, "runner answered with a different id");
                }
                Ok(text)
            }
            ResponseMessage::Error { error, .. } => Err(DoccrewError::Agent(error)),
            ResponseMessage::Ready => Err(DoccrewError::Agent(
                "unexpected ready message during kickoff".into(),
            )),
        }
    }

    /// Kill the runner without a shutdown message and reap it.
    fn kill(mut self) {
        drop(self.stdin);
        if let Err(e) = self.child.kill() {
            debug!(error = %e, "runner already exited");
        }
        match self.child.wait() {
            Ok(status) => info!(?status, "agent runner killed"),
            Err(e) => warn!("runner wait error: {e}"),
        }
    }

    /// Send shutdown and wait for the runner to exit.
    fn shutdown(mut self) {
        if let Err(e) = self.write_message(&RequestMessage::Shutdown) {
            debug!(error = %e, "runner already gone");
        }
        drop(self.stdin);

        match self.child.wait() {
            Ok(status) => info!(?status, "agent runner exited"),
            Err(e) => warn!("runner wait error: {e}"),
        }
    }
}
