//! Remote compile-and-run for C and C++ through the Judge0 CE API (RapidAPI).
//!
//! Programs are submitted once and then polled until they reach a terminal
//! status. Interactive stdin is not possible on this shape, so programs that
//! look like they read input get one stdin blob collected up front.

use super::traits::ExecutionBackend;
use crate::config::Judge0Config;
use crate::console::RunHandlers;
use crate::languages::Language;
use crate::util::{single_line, truncate_with_ellipsis};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub const INPUT_PROMPT: &str = "Enter input values: ";

const INPUT_GUIDANCE: &[&str] = &[
    "This program requires input.\n",
    "Tip: Enter all input values separated by spaces or new lines.\n",
    "Example: For two numbers, enter: 10 20\n",
    "After entering input, the program will execute automatically.\n\n",
];

const MAX_ERROR_BODY_CHARS: usize = 500;

// ── Error type ──────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum Judge0Error {
    #[error("RapidAPI key not configured. Set judge0.api_key in config.toml or RAPIDAPI_KEY")]
    MissingKey,
    #[error("{operation} failed: {status} - {body}")]
    Http {
        operation: &'static str,
        status: u16,
        body: String,
    },
    #[error("Execution timeout - program took too long to complete")]
    Timeout { attempts: u32 },
}

// ── Data types ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct SubmissionRequest<'a> {
    pub language_id: u32,
    pub source_code: &'a str,
    pub stdin: &'a str,
}

#[derive(Debug, Deserialize)]
struct SubmissionToken {
    token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmissionStatus {
    pub id: u32,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmissionResult {
    pub status: SubmissionStatus,
    #[serde(default)]
    pub stdout: Option<String>,
    #[serde(default)]
    pub stderr: Option<String>,
    #[serde(default)]
    pub compile_output: Option<String>,
}

impl SubmissionResult {
    /// In Queue (1) and Processing (2) are the only non-terminal statuses.
    pub fn is_pending(&self) -> bool {
        self.status.id <= 2
    }
}

/// Human label for a terminal Judge0 status id.
pub fn status_label(id: u32) -> String {
    let label = match id {
        3 => "Accepted",
        4 => "Wrong Answer",
        5 => "Time Limit Exceeded",
        6 => "Compilation Error",
        7 => "Runtime Error (SIGSEGV)",
        8 => "Runtime Error (SIGXFSZ)",
        9 => "Runtime Error (SIGFPE)",
        10 => "Runtime Error (SIGABRT)",
        11 => "Runtime Error (NZEC)",
        12 => "Runtime Error (Other)",
        13 => "Internal Error",
        14 => "Exec Format Error",
        other => return format!("Status {other}"),
    };
    label.to_string()
}

fn non_blank(field: Option<&String>) -> Option<&str> {
    field.map(String::as_str).filter(|s| !s.trim().is_empty())
}

/// Console text for a finished submission.
pub fn compose_output(result: &SubmissionResult) -> String {
    let mut output = String::new();
    let mut has_error = false;

    if let Some(compile) = non_blank(result.compile_output.as_ref()) {
        output.push_str(&format!("Compilation Errors:\n{compile}\n\n"));
        has_error = true;
    }
    if let Some(stderr) = non_blank(result.stderr.as_ref()) {
        output.push_str(&format!("Runtime Errors:\n{stderr}\n\n"));
        has_error = true;
    }
    if let Some(stdout) = non_blank(result.stdout.as_ref()) {
        output.push_str(&format!("Program Output:\n{stdout}\n"));
    } else if !has_error {
        output.push_str("Program executed successfully (no output)\n");
    }

    if result.status.id != 3 {
        output.push_str(&format!(
            "\nExecution Status: {}\n",
            status_label(result.status.id)
        ));
    }
    output
}

/// Whether `source` looks like it reads from stdin.
pub fn needs_stdin(language: Language, source: &str) -> bool {
    let markers: &[&str] = match language {
        Language::C => &["scanf", "getchar", "gets"],
        Language::Cpp => &["cin", "getline"],
        _ => &[],
    };
    markers.iter().any(|marker| source.contains(marker))
}

// ── Client ──────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Judge0Client {
    http: reqwest::Client,
    api_url: String,
    api_host: String,
    api_key: Option<String>,
    c_language_id: u32,
    cpp_language_id: u32,
    poll_interval: Duration,
    max_poll_attempts: u32,
}

impl Judge0Client {
    pub fn new(config: &Judge0Config) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            http,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            api_host: config.api_host.clone(),
            api_key: config
                .api_key
                .clone()
                .filter(|key| !key.trim().is_empty()),
            c_language_id: config.c_language_id,
            cpp_language_id: config.cpp_language_id,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            max_poll_attempts: config.max_poll_attempts,
        })
    }

    // ── Helpers ─────────────────────────────────────────────────

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.api_url)
    }

    pub fn require_key(&self) -> Result<&str, Judge0Error> {
        self.api_key.as_deref().ok_or(Judge0Error::MissingKey)
    }

    pub fn language_id(&self, language: Language) -> Option<u32> {
        match language {
            Language::C => Some(self.c_language_id),
            Language::Cpp => Some(self.cpp_language_id),
            _ => None,
        }
    }

    fn get(&self, path: &str) -> Result<reqwest::RequestBuilder, Judge0Error> {
        let key = self.require_key()?;
        Ok(self
            .http
            .get(self.url(path))
            .header("X-RapidAPI-Host", &self.api_host)
            .header("X-RapidAPI-Key", key))
    }

    async fn handle_error(operation: &'static str, resp: reqwest::Response) -> Judge0Error {
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        Judge0Error::Http {
            operation,
            status,
            body: truncate_with_ellipsis(body.trim(), MAX_ERROR_BODY_CHARS),
        }
    }

    // ── API ─────────────────────────────────────────────────────

    /// Connectivity probe. Returns how many languages the service offers.
    /// GET /languages
    pub async fn check_connection(&self) -> anyhow::Result<usize> {
        let resp = self.get("/languages")?.send().await?;
        if !resp.status().is_success() {
            return Err(Self::handle_error("API connection", resp).await.into());
        }
        let languages: Vec<serde_json::Value> = resp.json().await?;
        Ok(languages.len())
    }

    /// Create a submission and return its token.
    /// POST /submissions?base64_encoded=false&wait=false
    pub async fn submit(&self, language_id: u32, source: &str, stdin: &str) -> anyhow::Result<String> {
        let key = self.require_key()?;
        let payload = SubmissionRequest {
            language_id,
            source_code: source,
            stdin,
        };
        let resp = self
            .http
            .post(self.url("/submissions?base64_encoded=false&wait=false"))
            .header("X-RapidAPI-Host", &self.api_host)
            .header("X-RapidAPI-Key", key)
            .json(&payload)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(Self::handle_error("Submission", resp).await.into());
        }
        let token: SubmissionToken = resp.json().await?;
        tracing::debug!(token = %token.token, language_id, "judge0.submitted");
        Ok(token.token)
    }

    /// GET /submissions/{token}?base64_encoded=false
    pub async fn fetch(&self, token: &str) -> anyhow::Result<SubmissionResult> {
        let path = format!("/submissions/{}?base64_encoded=false", urlencoding::encode(token));
        let resp = self.get(&path)?.send().await?;
        if !resp.status().is_success() {
            return Err(Self::handle_error("Result fetch", resp).await.into());
        }
        Ok(resp.json().await?)
    }

    /// Poll until the submission reaches a terminal status.
    ///
    /// Sleeps before every poll; gives up after `max_poll_attempts` pending
    /// answers.
    pub async fn wait_for_result(&self, token: &str) -> anyhow::Result<SubmissionResult> {
        for attempt in 1..=self.max_poll_attempts {
            tokio::time::sleep(self.poll_interval).await;
            let result = self.fetch(token).await?;
            tracing::debug!(token, attempt, status = result.status.id, "judge0.poll");
            if !result.is_pending() {
                return Ok(result);
            }
        }
        Err(Judge0Error::Timeout {
            attempts: self.max_poll_attempts,
        }
        .into())
    }
}

// ── Backend ─────────────────────────────────────────────────────────

pub struct Judge0Backend {
    client: Arc<Judge0Client>,
    language: Language,
}

impl Judge0Backend {
    pub fn new(client: Arc<Judge0Client>, language: Language) -> Self {
        Self { client, language }
    }

    /// Collect the stdin blob for programs that read input.
    ///
    /// `None` means the session ended while waiting.
    async fn collect_stdin(&self, source: &str, handlers: &RunHandlers) -> Option<String> {
        if !needs_stdin(self.language, source) {
            return Some(String::new());
        }
        for line in INPUT_GUIDANCE {
            handlers.output(line);
        }
        let value = handlers.input(INPUT_PROMPT).await?;
        let value = value.trim().to_string();
        if value.is_empty() {
            handlers.output("No input provided. Executing without input...\n");
        }
        Some(value)
    }
}

#[async_trait]
impl ExecutionBackend for Judge0Backend {
    fn name(&self) -> &str {
        "judge0"
    }

    async fn run(&self, source: &str, handlers: &RunHandlers) -> anyhow::Result<()> {
        self.client.require_key()?;
        let language_id = self
            .client
            .language_id(self.language)
            .ok_or_else(|| anyhow::anyhow!("Judge0 cannot compile {}", self.language.label()))?;

        let Some(stdin) = self.collect_stdin(source, handlers).await else {
            tracing::debug!(session = %handlers.session_id(), "judge0.input_abandoned");
            return Ok(());
        };

        handlers.output(&format!(
            "Compiling {} code (Language ID: {language_id})...\n",
            self.language.id().to_uppercase()
        ));
        if !stdin.is_empty() {
            handlers.output(&format!("Input provided: {}\n", single_line(&stdin)));
        }

        let token = self.client.submit(language_id, source, &stdin).await?;
        handlers.output("Running program...\n\n");

        let result = self.client.wait_for_result(&token).await?;
        tracing::info!(
            session = %handlers.session_id(),
            status = result.status.id,
            description = %result.status.description,
            "judge0.finished"
        );
        handlers.output(&compose_output(&result));
        Ok(())
    }
}
