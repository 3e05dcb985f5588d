//! Delegation to a Piston-compatible execution service.
//!
//! `POST {base_url}/execute` with
//!
//! ```json
//! { "language": "java", "version": "*", "files": [{ "name": "Main.java", "content": "..." }],
//!   "stdin": "", "compile_timeout": 10000, "run_timeout": 3000 }
//! ```
//!
//! and a response carrying a `run` stage, an optional `compile` stage and, on
//! service-side rejection, a top-level `message`.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::RemoteConfig;
use crate::error::{PolyrunError, Result};
use crate::language::EngineBinding;
use crate::output::{ansi, ExecutionOutput, SERVER_FAILURE_MARKER};
use crate::sandbox::traits::{BackendCapabilities, ExecutionBackend, ExecutionJob};

const UNREACHABLE_HINT: &str =
    "This language runs on a remote execution service. Check your connection and try again.";

#[derive(Debug, Serialize)]
struct ExecuteRequest<'a> {
    language: &'a str,
    version: String,
    files: Vec<RequestFile<'a>>,
    stdin: &'a str,
    compile_timeout: u64,
    run_timeout: u64,
}

#[derive(Debug, Serialize)]
struct RequestFile<'a> {
    name: &'a str,
    content: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct StageResult {
    #[serde(default)]
    stdout: String,
    #[serde(default)]
    stderr: String,
    #[serde(default)]
    output: String,
    code: Option<i32>,
    signal: Option<String>,
}

impl StageResult {
    fn failed(&self) -> bool {
        self.code.map_or(false, |code| code != 0) || self.signal.is_some()
    }
}

#[derive(Debug, Default, Deserialize)]
struct ExecuteResponse {
    #[serde(default)]
    run: StageResult,
    compile: Option<StageResult>,
    message: Option<String>,
}

pub struct RemoteBackend {
    client: reqwest::Client,
    config: RemoteConfig,
}

impl RemoteBackend {
    pub fn new(config: RemoteConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()
            .map_err(|e| PolyrunError::Config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    async fn submit(&self, request: &ExecuteRequest<'_>) -> Result<ExecuteResponse> {
        let url = format!("{}/execute", self.config.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| PolyrunError::RemoteTransport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            // Piston reports rejected requests (unknown runtime, bad payload) as 4xx with a message
            if status.is_client_error() {
                if let Ok(body) = response.json::<ExecuteResponse>().await {
                    if body.message.is_some() {
                        return Ok(body);
                    }
                }
            }
            return Err(PolyrunError::RemoteTransport(format!("HTTP {}", status)));
        }

        response
            .json()
            .await
            .map_err(|e| PolyrunError::RemoteTransport(format!("invalid response: {}", e)))
    }
}

/// Map a service response onto the Output Model.
fn into_output(response: &ExecuteResponse) -> ExecutionOutput {
    if let Some(message) = &response.message {
        let mut lines = vec![ansi::red(message)];
        if !response.run.stderr.trim().is_empty() {
            lines.push(response.run.stderr.trim_end().to_string());
        }
        return ExecutionOutput::failure(lines.join("\n"));
    }

    let compile_failed = response.compile.as_ref().map_or(false, StageResult::failed);

    let mut lines = Vec::new();
    if !response.run.stdout.trim().is_empty() {
        lines.push(response.run.stdout.trim_end().to_string());
    }
    if !response.run.stderr.trim().is_empty() {
        lines.push(ansi::red(response.run.stderr.trim_end()));
    }
    if let Some(compile) = &response.compile {
        let text = if compile.output.trim().is_empty() {
            compile.stderr.trim_end()
        } else {
            compile.output.trim_end()
        };
        if !text.trim().is_empty() {
            lines.push(if compile_failed {
                ansi::red(text)
            } else {
                text.to_string()
            });
        }
    }
    if let Some(signal) = &response.run.signal {
        lines.push(ansi::red(&format!("Process terminated by {}", signal)));
    }

    let text = lines.join("\n");
    if compile_failed || response.run.failed() {
        ExecutionOutput::failure(if text.is_empty() {
            ansi::red(&format!(
                "Process exited with code {}",
                response.run.code.unwrap_or(-1)
            ))
        } else {
            text
        })
    } else {
        ExecutionOutput::console(text)
    }
}

fn transport_failure(error: &PolyrunError) -> ExecutionOutput {
    let detail = match error {
        PolyrunError::RemoteTransport(detail) => detail.clone(),
        other => other.to_string(),
    };
    ExecutionOutput::infrastructure(
        &format!("{}: {}", SERVER_FAILURE_MARKER, detail),
        UNREACHABLE_HINT,
    )
}

#[async_trait]
impl ExecutionBackend for RemoteBackend {
    fn name(&self) -> &str {
        "remote"
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            lazy_runtime: false,
            persistent_state: false,
            networking: true,
            multi_file: true,
        }
    }

    async fn execute(&self, job: &ExecutionJob) -> Result<ExecutionOutput> {
        let EngineBinding::Remote {
            service_language,
            entry_file,
        } = job.language.binding
        else {
            return Err(PolyrunError::BackendNotAvailable {
                backend: "remote".to_string(),
                reason: format!("{} is not a remote language", job.language.name),
            });
        };

        let mut files = vec![RequestFile {
            name: entry_file,
            content: &job.code,
        }];
        files.extend(job.files.iter().map(|file| RequestFile {
            name: &file.path,
            content: &file.content,
        }));

        let request = ExecuteRequest {
            language: service_language,
            version: self.config.version_for(service_language),
            files,
            stdin: "",
            compile_timeout: self.config.compile_timeout_ms,
            run_timeout: self.config.run_timeout_ms,
        };

        debug!(language = service_language, files = request.files.len(), "Submitting to execution service");
        match self.submit(&request).await {
            Ok(response) => Ok(into_output(&response)),
            Err(e) => {
                warn!(error = %e, "Execution service unreachable");
                Ok(transport_failure(&e))
            }
        }
    }
}
