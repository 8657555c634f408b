//! Client for the code-synthesis backend.

use async_trait::async_trait;
use mcpforge_core::model::WorkflowSpec;
use mcpforge_core::{ForgeError, ForgeResult};
use serde::{Deserialize, Serialize};

use crate::config::SynthConfig;

/// Turns a workflow spec into artifact source text.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Short result meant for human review. No side effects.
    async fn preview(&self, spec: &WorkflowSpec) -> ForgeResult<String>;

    /// Full result that becomes the artifact.
    async fn synthesize(&self, spec: &WorkflowSpec) -> ForgeResult<String>;
}

/// Body posted to the synthesis backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SynthesisRequest {
    /// Instruction header followed by the spec as JSON.
    pub prompt: String,
    /// Upper bound on the generated length.
    pub max_tokens: u32,
}

/// Builds the prompt: a fixed instruction header followed by the full spec as
/// pretty JSON.
pub fn build_prompt(spec: &WorkflowSpec) -> ForgeResult<String> {
    let mut prompt = format!(
        "# Generate an MCP STDIO server for workflow: {} v{}\n",
        spec.name, spec.version
    );
    prompt.push_str("# Resolve every secret through get_secret(vault_ref); never embed secret values.\n");
    prompt.push_str("# Serve one JSON request per stdin line and answer with one JSON line on stdout.\n");
    prompt.push_str("# The output must be directly runnable as-is.\n\n");
    let body = serde_json::to_string_pretty(spec).map_err(|e| ForgeError::Validation(e.to_string()))?;
    prompt.push_str(&body);
    Ok(prompt)
}

/// Synthesizer talking to an HTTP text-generation backend.
pub struct HttpSynthesizer {
    client: reqwest::Client,
    config: SynthConfig,
}

impl HttpSynthesizer {
    /// Builds the HTTP client with the configured timeout.
    pub fn new(config: SynthConfig) -> ForgeResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ForgeError::Synthesis {
                status: None,
                body: format!("http client init failed: {e}"),
            })?;
        Ok(Self { client, config })
    }

    async fn request(&self, spec: &WorkflowSpec, max_tokens: u32) -> ForgeResult<String> {
        let req = SynthesisRequest {
            prompt: build_prompt(spec)?,
            max_tokens,
        };

        let resp = self
            .client
            .post(&self.config.url)
            .json(&req)
            .send()
            .await
            .map_err(|e| ForgeError::Synthesis {
                status: None,
                body: e.to_string(),
            })?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| ForgeError::Synthesis {
            status: Some(status.as_u16()),
            body: format!("failed to read response body: {e}"),
        })?;

        if !status.is_success() {
            tracing::warn!(%status, workflow = %spec.name, "synthesis backend rejected request");
            return Err(ForgeError::Synthesis {
                status: Some(status.as_u16()),
                body,
            });
        }

        tracing::debug!(workflow = %spec.name, max_tokens, bytes = body.len(), "synthesis ok");
        Ok(body)
    }
}

#[async_trait]
impl Synthesizer for HttpSynthesizer {
    async fn preview(&self, spec: &WorkflowSpec) -> ForgeResult<String> {
        self.request(spec, self.config.preview_max_tokens).await
    }

    async fn synthesize(&self, spec: &WorkflowSpec) -> ForgeResult<String> {
        self.request(spec, self.config.max_tokens).await
    }
}
