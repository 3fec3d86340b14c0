//! Generation: run one step's prompt against the text-generation backend.
//!
//! All prompt text lives in [`crate::steps`]; this module only builds the
//! messages, applies the per-step timeout and turns every failure into a
//! [`StepError`] so the orchestrator never sees an `Err`.

use crate::config::AnalysisConfig;
use crate::error::{AnalyzerError, StepError};
use crate::output::StepResult;
use crate::steps::StepDefinition;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::time::{timeout, Duration};
use tracing::{debug, warn};

const DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// Text returned by a backend, with token accounting when available.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Generation {
    pub text: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
}

impl Generation {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

/// Why a backend produced no text.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// The `edgequake-llm` provider call failed (network, auth, quota, content filter).
    #[error("provider error: {0}")]
    Provider(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// A custom backend refused the request.
    #[error("{0}")]
    Backend(String),
}

/// Prompt in, text out. May fail or hang.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// `system` carries the step persona, `prompt` the rendered instructions.
    async fn generate(&self, system: &str, prompt: &str) -> Result<Generation, GenerationError>;
}

/// [`TextGenerator`] over any `edgequake-llm` provider.
pub struct LlmGenerator {
    provider: Arc<dyn LLMProvider>,
    options: CompletionOptions,
}

impl LlmGenerator {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &AnalysisConfig) -> Self {
        Self {
            provider,
            options: build_options(config),
        }
    }

    /// Resolve a provider from `config` / the environment and wrap it.
    pub fn from_config(config: &AnalysisConfig) -> Result<Self, AnalyzerError> {
        Ok(Self::new(resolve_provider(config)?, config))
    }
}

#[async_trait]
impl TextGenerator for LlmGenerator {
    async fn generate(&self, system: &str, prompt: &str) -> Result<Generation, GenerationError> {
        let messages = vec![ChatMessage::system(system), ChatMessage::user(prompt)];
        let response = self
            .provider
            .chat(&messages, Some(&self.options))
            .await
            .map_err(|e| GenerationError::Provider(Box::new(e)))?;

        Ok(Generation {
            text: response.content,
            input_tokens: response.prompt_tokens,
            output_tokens: response.completion_tokens,
        })
    }
}

/// Build `CompletionOptions` from the analysis config.
fn build_options(config: &AnalysisConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

/// Resolve the LLM provider, from most-specific to least-specific:
///
/// 1. `config.provider` — used as-is.
/// 2. `config.provider_name` (+ `config.model`) via [`ProviderFactory::create_llm_provider`].
/// 3. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`, when both are set.
/// 4. `OPENAI_API_KEY` present → OpenAI.
/// 5. [`ProviderFactory::from_env`] auto-detection.
pub fn resolve_provider(config: &AnalysisConfig) -> Result<Arc<dyn LLMProvider>, AnalyzerError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return create_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_provider(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
            return create_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| AnalyzerError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, AnalyzerError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        AnalyzerError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Run a single step.
///
/// Always returns a `StepResult`: failures, timeouts and empty answers are
/// recorded with a placeholder output and `success = false`. No retry.
pub async fn run_step(
    generator: &dyn TextGenerator,
    step: &StepDefinition,
    query: &str,
    report_text: &str,
    references: Option<&str>,
    config: &AnalysisConfig,
) -> StepResult {
    let start = Instant::now();
    let prompt = step.render_prompt(query, report_text, references);
    let limit = Duration::from_secs(config.step_timeout_secs);

    let outcome = match timeout(limit, generator.generate(&step.persona, &prompt)).await {
        Ok(Ok(generation)) if generation.text.trim().is_empty() => Err(StepError::EmptyOutput {
            role: step.role.clone(),
        }),
        Ok(Ok(generation)) => Ok(generation),
        Ok(Err(e)) => Err(StepError::GenerationFailed {
            role: step.role.clone(),
            detail: e.to_string(),
        }),
        Err(_) => Err(StepError::Timeout {
            role: step.role.clone(),
            secs: config.step_timeout_secs,
        }),
    };
    let duration_ms = start.elapsed().as_millis() as u64;

    match outcome {
        Ok(generation) => {
            debug!(
                "Step '{}': {} input tokens, {} output tokens, {}ms",
                step.role, generation.input_tokens, generation.output_tokens, duration_ms
            );
            StepResult {
                role: step.role.clone(),
                output: generation.text,
                success: true,
                error: None,
                input_tokens: generation.input_tokens,
                output_tokens: generation.output_tokens,
                duration_ms,
            }
        }
        Err(error) => {
            warn!("{}", error);
            StepResult::failed(&step.role, error, duration_ms)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl TextGenerator for Echo {
        async fn generate(&self, system: &str, prompt: &str) -> Result<Generation, GenerationError> {
            Ok(Generation {
                text: format!("[{system}] {prompt}"),
                input_tokens: 7,
                output_tokens: 3,
            })
        }
    }

    struct Broken;

    #[async_trait]
    impl TextGenerator for Broken {
        async fn generate(&self, _system: &str, _prompt: &str) -> Result<Generation, GenerationError> {
            Err(GenerationError::Backend("HTTP 503".into()))
        }
    }

    struct Blank;

    #[async_trait]
    impl TextGenerator for Blank {
        async fn generate(&self, _system: &str, _prompt: &str) -> Result<Generation, GenerationError> {
            Ok(Generation::text("  \n"))
        }
    }

    struct Hangs;

    #[async_trait]
    impl TextGenerator for Hangs {
        async fn generate(&self, _system: &str, _prompt: &str) -> Result<Generation, GenerationError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Generation::text("late"))
        }
    }

    fn step() -> StepDefinition {
        StepDefinition::new("doctor", "persona", "{query}|{report_text}")
    }

    #[test]
    fn build_options_defaults() {
        let config = AnalysisConfig::default();
        let opts = build_options(&config);
        assert_eq!(opts.temperature, Some(0.2));
        assert_eq!(opts.max_tokens, Some(2048));
    }

    #[tokio::test]
    async fn successful_step_keeps_output_and_tokens() {
        let config = AnalysisConfig::default();
        let result = run_step(&Echo, &step(), "q", "report", None, &config).await;
        assert!(result.success);
        assert_eq!(result.output, "[persona] q|report");
        assert_eq!(result.input_tokens, 7);
        assert_eq!(result.output_tokens, 3);
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn backend_error_becomes_placeholder() {
        let config = AnalysisConfig::default();
        let result = run_step(&Broken, &step(), "q", "r", None, &config).await;
        assert!(!result.success);
        assert_eq!(
            result.output,
            "An error occurred during analysis: step 'doctor': generation failed: HTTP 503"
        );
    }

    #[tokio::test]
    async fn blank_output_is_a_failure() {
        let config = AnalysisConfig::default();
        let result = run_step(&Blank, &step(), "q", "r", None, &config).await;
        assert!(!result.success);
        assert!(matches!(result.error, Some(StepError::EmptyOutput { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn hung_backend_times_out() {
        let config = AnalysisConfig::builder().step_timeout_secs(5).build().unwrap();
        let result = run_step(&Hangs, &step(), "q", "r", None, &config).await;
        assert!(!result.success);
        assert_eq!(
            result.error,
            Some(StepError::Timeout {
                role: "doctor".into(),
                secs: 5
            })
        );
    }

    struct Disconnected;

    #[async_trait]
    impl TextGenerator for Disconnected {
        async fn generate(
            &self,
            _system: &str,
            _prompt: &str,
        ) -> Result<Generation, GenerationError> {
            Err(GenerationError::Provider(Box::new(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "socket closed",
            ))))
        }
    }

    #[tokio::test]
    async fn provider_error_keeps_its_source() {
        let config = AnalysisConfig::default();
        let result = run_step(&Disconnected, &step(), "q", "r", None, &config).await;
        assert_eq!(
            result.output,
            "An error occurred during analysis: step 'doctor': generation failed: provider error: socket closed"
        );

        let err = GenerationError::Provider(Box::new(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "socket closed",
        )));
        let source = std::error::Error::source(&err).unwrap();
        assert_eq!(source.to_string(), "socket closed");
    }
}
