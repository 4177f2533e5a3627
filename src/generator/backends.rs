//! Generation service backends.
//!
//! ## Backends
//!
//! - `template` - Rule-based, no API calls (default)
//! - `openai` - OpenAI chat completions API (or compatible)

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::prompt::GenerationContext;
use super::ChunkSink;
use crate::artifact::ArtifactItem;
use crate::settings::{get_with_env_fallback, OpenAiSettings};

/// Backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Rule-based plan generation (no API calls)
    #[default]
    Template,
    /// OpenAI API (or compatible)
    OpenAi,
}

impl std::str::FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "template" => Ok(BackendKind::Template),
            "openai" => Ok(BackendKind::OpenAi),
            _ => bail!("Unknown generation backend: {}", s),
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Template => write!(f, "template"),
            BackendKind::OpenAi => write!(f, "openai"),
        }
    }
}

/// One call to the generation service.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// The full instruction text
    pub prompt: String,
    /// Structured context the prompt was built from
    pub context: GenerationContext,
}

/// The external generation service.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Produce the raw response text for `request`, forwarding any fragments
    /// to `chunks` as they arrive.
    async fn complete(&self, request: &CompletionRequest, chunks: &ChunkSink) -> Result<String>;

    /// Get the backend name
    fn backend_name(&self) -> &'static str;
}

/// Rule-based client that derives the next plan from the latest record.
pub struct TemplateClient;

/// Starter plan used when there is no history.
const STARTER_PLAN: &[(&str, f64, Option<f64>)] = &[
    ("Back Squat", 40.0, Some(8.0)),
    ("Bench Press", 30.0, Some(8.0)),
    ("Barbell Row", 30.0, Some(8.0)),
    ("Plank", 30.0, None),
];

/// Load added per progression step.
const LOAD_STEP: f64 = 2.5;

impl TemplateClient {
    pub fn new() -> Self {
        Self
    }

    fn plan(context: &GenerationContext) -> Vec<ArtifactItem> {
        let Some(latest) = context.records.first() else {
            return STARTER_PLAN
                .iter()
                .map(|(name, primary, secondary)| ArtifactItem::new(*name, *primary, *secondary))
                .collect();
        };

        // Alternate between adding load and adding a repetition on each rejection
        let add_reps = context.rejections() % 2 == 1;
        latest
            .items
            .iter()
            .map(|item| match (add_reps, item.secondary) {
                (true, Some(reps)) => ArtifactItem::new(item.name.clone(), item.primary, Some(reps + 1.0)),
                _ => ArtifactItem::new(item.name.clone(), item.primary + LOAD_STEP, item.secondary),
            })
            .collect()
    }
}

impl Default for TemplateClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CompletionClient for TemplateClient {
    async fn complete(&self, request: &CompletionRequest, chunks: &ChunkSink) -> Result<String> {
        let items: Vec<serde_json::Value> = Self::plan(&request.context)
            .into_iter()
            .map(|item| {
                let mut value = serde_json::json!({
                    "name": item.name,
                    "primary": item.primary,
                });
                if let Some(secondary) = item.secondary {
                    value["secondary"] = serde_json::json!(secondary);
                }
                value
            })
            .collect();
        let text = serde_json::to_string(&serde_json::json!({ "items": items }))?;

        tracing::debug!("Template backend produced {} items", items.len());
        chunks.send(&text);
        Ok(text)
    }

    fn backend_name(&self) -> &'static str {
        "template"
    }
}

/// OpenAI-based client (also works with compatible APIs)
pub struct OpenAiClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiClient {
    pub fn new(config: &OpenAiSettings) -> Result<Self> {
        let api_key = get_with_env_fallback(&config.api_key, &["OPENAI_API_KEY"], None)
            .context("OpenAI API key not configured")?;

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            model: config.model.clone(),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn complete(&self, request: &CompletionRequest, chunks: &ChunkSink) -> Result<String> {
        let request_body = serde_json::json!({
            "model": self.model,
            "messages": [
                {
                    "role": "user",
                    "content": request.prompt
                }
            ],
            "max_tokens": self.max_tokens,
            "temperature": self.temperature
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url.trim_end_matches('/')))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request_body)
            .send()
            .await
            .context("Failed to send request to OpenAI")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("OpenAI API error ({}): {}", status, body);
        }

        let response_body: serde_json::Value = response.json().await?;
        let text = response_body["choices"][0]["message"]["content"]
            .as_str()
            .context("Invalid response format from OpenAI")?
            .trim()
            .to_string();

        chunks.send(&text);
        Ok(text)
    }

    fn backend_name(&self) -> &'static str {
        "openai"
    }
}
