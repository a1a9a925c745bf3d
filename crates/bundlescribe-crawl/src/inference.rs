//! Single-flight streaming client for the local chat endpoint
//!
//! The model runner behind the endpoint is stateful and cannot take
//! concurrent requests, so every call in the process goes through one
//! single-permit gate, held for the whole retry sequence. Replies arrive as
//! newline-delimited JSON chunks whose `message.content` pieces are joined.
//! When a failure shows the runner crashed, a [`RecoveryHook`] runs before
//! the next attempt. Exhausted calls return an error sentinel string.

use std::io;
use std::process::Command;
use std::time::Duration;

use bundlescribe_core::{RetryPolicy, SHARED_RUNTIME, Semaphore, http_client, retry_with_delay};
use bundlescribe_store::{error_sentinel, mentions_runner_crash};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncBufReadExt;

/// Process-wide gate: at most one request reaches the backend at a time.
static INFERENCE_GATE: Semaphore = Semaphore::new(1);

/// Failure text kept from a stream that produced no content.
const MAX_FAILURE_DETAIL: usize = 2048;

/// Endpoint and generation settings.
#[derive(Debug, Clone)]
pub struct InferenceConfig {
    pub url: String,
    pub model: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub retry: RetryPolicy,
    /// Deadline for one attempt, connection to last chunk.
    pub timeout: Duration,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:11434/api/chat".to_string(),
            model: "llama3.2".to_string(),
            temperature: 0.8,
            max_output_tokens: 1024,
            retry: RetryPolicy::default(),
            timeout: Duration::from_secs(600),
        }
    }
}

/// Why a single attempt failed.
#[derive(Debug)]
pub enum InferenceError {
    /// Connection failure or non-success status
    Http {
        status: Option<u16>,
        message: String,
    },
    /// Attempt ran past the configured deadline
    Timeout(Duration),
    /// Success status but no usable content in the stream
    EmptyResponse { detail: String },
    /// Body stream broke mid-read
    Io(io::Error),
}

impl std::fmt::Display for InferenceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Http {
                status: Some(s),
                message,
            } => write!(f, "HTTP {s}: {message}"),
            Self::Http {
                status: None,
                message,
            } => write!(f, "HTTP error: {message}"),
            Self::Timeout(d) => write!(f, "no complete reply within {}s", d.as_secs()),
            Self::EmptyResponse { detail } if detail.is_empty() => {
                write!(f, "empty response")
            }
            Self::EmptyResponse { detail } => write!(f, "empty response: {detail}"),
            Self::Io(e) => write!(f, "IO error: {e}"),
        }
    }
}

impl std::error::Error for InferenceError {}

impl InferenceError {
    fn from_reqwest(e: &reqwest::Error) -> Self {
        Self::Http {
            status: e.status().map(|s| s.as_u16()),
            message: e.to_string(),
        }
    }

    /// Whether the failure text shows the model runner process died.
    pub fn is_runner_crash(&self) -> bool {
        match self {
            Self::Http { message, .. } => mentions_runner_crash(message),
            Self::EmptyResponse { detail } => mentions_runner_crash(detail),
            Self::Timeout(_) | Self::Io(_) => false,
        }
    }
}

/// Side effect run before retrying after a runner crash.
pub trait RecoveryHook: Send + Sync {
    fn recover(&self) -> anyhow::Result<()>;
}

/// Runs an external command, e.g. `ollama stop all`.
#[derive(Debug, Clone)]
pub struct CommandRecovery {
    program: String,
    args: Vec<String>,
}

impl CommandRecovery {
    /// Build from an argv list; `None` when the list is empty.
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }
}

impl RecoveryHook for CommandRecovery {
    fn recover(&self) -> anyhow::Result<()> {
        log::warn!("Backend runner crashed, running `{} {}`", self.program, self.args.join(" "));
        let status = Command::new(&self.program)
            .args(&self.args)
            .status()
            .map_err(|e| anyhow::anyhow!("cannot run {}: {e}", self.program))?;
        if !status.success() {
            log::warn!("Recovery command exited with {status}");
        }
        Ok(())
    }
}

/// Anything that turns a (system, user) prompt pair into reply text.
///
/// Implementations never fail: errors come back as sentinel text.
pub trait Annotate {
    fn annotate(&self, system: &str, user: &str) -> String;
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatOptions {
    temperature: f32,
    #[serde(rename = "num_predict")]
    max_output_tokens: u32,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    stream: bool,
    options: ChatOptions,
}

#[derive(Deserialize)]
struct ChatChunk {
    #[serde(default)]
    message: Option<ChunkMessage>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct ChunkMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct InferenceClient {
    config: InferenceConfig,
    recovery: Option<Box<dyn RecoveryHook>>,
}

impl InferenceClient {
    pub fn new(config: InferenceConfig) -> Self {
        Self {
            config,
            recovery: None,
        }
    }

    /// Install the hook run when an attempt fails with a runner crash.
    pub fn with_recovery(mut self, hook: Box<dyn RecoveryHook>) -> Self {
        self.recovery = Some(hook);
        self
    }

    pub fn config(&self) -> &InferenceConfig {
        &self.config
    }

    /// Send one prompt pair; returns the reply or an error sentinel. Never fails.
    pub fn query(&self, system: &str, user: &str) -> String {
        match self.try_query(system, user) {
            Ok(text) => text,
            Err(e) => error_sentinel(e),
        }
    }

    /// Like [`query`](Self::query) but hands back the last error on exhaustion.
    pub fn try_query(&self, system: &str, user: &str) -> Result<String, InferenceError> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            stream: true,
            options: ChatOptions {
                temperature: self.config.temperature,
                max_output_tokens: self.config.max_output_tokens,
            },
        };

        let _permit = INFERENCE_GATE.acquire();
        retry_with_delay(
            "inference",
            &self.config.retry,
            |attempt| {
                log::debug!("inference attempt {attempt} to {}", self.config.url);
                self.attempt(&request)
            },
            |e| {
                if e.is_runner_crash() {
                    if let Some(hook) = &self.recovery {
                        if let Err(err) = hook.recover() {
                            log::warn!("Recovery hook failed: {err:#}");
                        }
                    }
                }
            },
        )
    }

    fn attempt(&self, request: &ChatRequest<'_>) -> Result<String, InferenceError> {
        let timeout = self.config.timeout;
        SHARED_RUNTIME.handle().block_on(async {
            match tokio::time::timeout(timeout, stream_chat(&self.config.url, request)).await {
                Ok(result) => result,
                Err(_) => Err(InferenceError::Timeout(timeout)),
            }
        })
    }
}

impl Annotate for InferenceClient {
    fn annotate(&self, system: &str, user: &str) -> String {
        self.query(system, user)
    }
}

/// POST the request and fold the NDJSON reply into one string.
async fn stream_chat(url: &str, request: &ChatRequest<'_>) -> Result<String, InferenceError> {
    let response = http_client()
        .post(url)
        .json(request)
        .send()
        .await
        .map_err(|e| InferenceError::from_reqwest(&e))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(InferenceError::Http {
            status: Some(status.as_u16()),
            message: body.trim().to_string(),
        });
    }

    let stream = response.bytes_stream().map(|r| r.map_err(io::Error::other));
    let mut reader = Box::pin(tokio_util::io::StreamReader::new(stream));

    let mut answer = String::new();
    let mut detail = String::new();
    let mut line = Vec::new();
    loop {
        line.clear();
        let n = reader
            .read_until(b'\n', &mut line)
            .await
            .map_err(InferenceError::Io)?;
        if n == 0 {
            break;
        }
        let raw = line.trim_ascii();
        if raw.is_empty() {
            continue;
        }
        match serde_json::from_slice::<ChatChunk>(raw) {
            Ok(chunk) => {
                if let Some(content) = chunk.message.and_then(|m| m.content) {
                    answer.push_str(&content);
                }
                if let Some(error) = chunk.error {
                    note_detail(&mut detail, &error);
                }
            }
            // Malformed chunks are skipped but kept for crash detection
            Err(_) => note_detail(&mut detail, &String::from_utf8_lossy(raw)),
        }
    }

    let answer = answer.trim();
    if answer.is_empty() {
        return Err(InferenceError::EmptyResponse { detail });
    }
    Ok(answer.to_string())
}

fn note_detail(detail: &mut String, text: &str) {
    if detail.len() >= MAX_FAILURE_DETAIL {
        return;
    }
    if !detail.is_empty() {
        detail.push_str("; ");
    }
    detail.extend(text.chars().take(MAX_FAILURE_DETAIL));
}
