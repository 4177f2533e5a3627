//! Artifact generation: prompt, one call to the generation service, parse.
//!
//! ```text
//! GenerationContext --build_prompt--> CompletionClient::complete (once)
//!                                          |
//!                                          +--> ChunkSink (content fragments)
//!                                          v
//!                                    parse_artifact --> Artifact | GenerationError
//! ```

mod backends;
mod parse;
mod prompt;

use std::sync::Arc;

use thiserror::Error;

use crate::artifact::Artifact;
use crate::settings::GenerationSettings;

pub use backends::{BackendKind, CompletionClient, CompletionRequest, OpenAiClient, TemplateClient};
pub use parse::{parse_artifact, ParseError, ParseStrategy};
pub use prompt::{
    build_prompt, GenerationContext, PromptProfile, OUTPUT_FORMAT_DIRECTIVE,
    PROGRESSION_DIRECTIVE, REJECTION_PREFIX, WORKOUT_PLAN_TASK,
};

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generation service failed: {0}")]
    Service(String),

    #[error("could not parse generated output: {0}")]
    Parse(#[from] ParseError),
}

/// Receiver for incremental text fragments.
#[derive(Clone, Default)]
pub struct ChunkSink(Option<Arc<dyn Fn(&str) + Send + Sync>>);

impl ChunkSink {
    pub fn new(f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        Self(Some(Arc::new(f)))
    }

    /// A sink that discards everything.
    pub fn none() -> Self {
        Self(None)
    }

    pub fn send(&self, chunk: &str) {
        if let Some(f) = &self.0 {
            if !chunk.is_empty() {
                f(chunk);
            }
        }
    }
}

/// Builds prompts, calls the generation service and parses its output.
pub struct ContentGenerator {
    client: Arc<dyn CompletionClient>,
    profile: PromptProfile,
}

impl ContentGenerator {
    pub fn new(client: Arc<dyn CompletionClient>, profile: PromptProfile) -> Self {
        Self { client, profile }
    }

    /// Build a generator from settings, selecting the configured backend.
    pub fn from_settings(settings: &GenerationSettings) -> anyhow::Result<Self> {
        let backend: BackendKind = settings.backend.parse()?;
        let client: Arc<dyn CompletionClient> = match backend {
            BackendKind::Template => Arc::new(TemplateClient::new()),
            BackendKind::OpenAi => Arc::new(OpenAiClient::new(&settings.openai)?),
        };
        let profile = match settings.task.as_deref().map(str::trim) {
            Some(task) if !task.is_empty() => PromptProfile::with_task(task),
            _ => PromptProfile::workout_plan(),
        };
        tracing::info!("Using {} generation backend", client.backend_name());
        Ok(Self::new(client, profile))
    }

    pub fn backend_name(&self) -> &'static str {
        self.client.backend_name()
    }

    /// Produce one validated artifact. Calls the service exactly once; there
    /// is no retry here.
    pub async fn generate(
        &self,
        context: &GenerationContext,
        chunks: &ChunkSink,
    ) -> Result<Artifact, GenerationError> {
        let request = CompletionRequest {
            prompt: build_prompt(&self.profile, context),
            context: context.clone(),
        };

        let text = self
            .client
            .complete(&request, chunks)
            .await
            .map_err(|e| GenerationError::Service(format!("{:#}", e)))?;

        let (artifact, strategy) = parse_artifact(&text)?;
        tracing::debug!(
            "Parsed {} items via {:?} from {} backend",
            artifact.len(),
            strategy,
            self.client.backend_name()
        );
        Ok(artifact)
    }
}
