//! Configuration types for report analysis and the HTTP service.
//!
//! All pipeline behaviour is controlled through [`AnalysisConfig`], built via
//! its [`AnalysisConfigBuilder`]. The listener side lives in
//! [`ServerConfig`], which only the `serve` entry point needs.

use crate::error::AnalyzerError;
use crate::progress::ProgressCallback;
use crate::steps::{default_steps, StepDefinition};
use edgequake_llm::LLMProvider;
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Query used when the caller leaves the field blank.
pub const DEFAULT_QUERY: &str = "Summarize my Blood Test Report";

/// Configuration for one analysis run.
///
/// Built via [`AnalysisConfig::builder()`] or using
/// [`AnalysisConfig::default()`].
///
/// # Example
/// ```rust
/// use bloodtest_analyzer::AnalysisConfig;
///
/// let config = AnalysisConfig::builder()
///     .max_report_chars(5000)
///     .step_delay_ms(0)
///     .model("gpt-4.1-mini")
///     .build()
///     .unwrap();
/// ```
///
/// The step list is only settable through the builder, which rejects
/// duplicate roles. A struct literal cannot bypass it:
///
/// ```compile_fail
/// use bloodtest_analyzer::{AnalysisConfig, StepDefinition};
///
/// let config = AnalysisConfig {
///     steps: vec![
///         StepDefinition::new("doctor", "a", "{report_text}"),
///         StepDefinition::new("doctor", "b", "{report_text}"),
///     ],
///     ..AnalysisConfig::default()
/// };
/// ```
#[derive(Clone)]
pub struct AnalysisConfig {
    /// Ordered step list with unique roles. Default: [`default_steps()`].
    pub(crate) steps: Vec<StepDefinition>,

    /// Character budget for the extracted report text. Default: 3000.
    ///
    /// Every step receives the full report, so the budget bounds the prompt
    /// size of each call. Longer reports are cut and marked as truncated.
    pub max_report_chars: usize,

    /// Pause between consecutive steps in milliseconds. Default: 1000.
    ///
    /// A crude guard for per-minute rate limits on the generation backend.
    /// Not applied before the first step or after the last one.
    pub step_delay_ms: u64,

    /// Per-step generation timeout in seconds. Default: 120.
    pub step_timeout_secs: u64,

    /// LLM model identifier, e.g. "gpt-4.1-nano". If None, uses provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.2.
    pub temperature: f32,

    /// Maximum tokens generated per step. Default: 2048.
    pub max_tokens: usize,

    /// Query used when the caller supplies an empty one.
    pub default_query: String,

    /// Number of web-search snippets requested for search-enabled steps. Default: 5.
    pub search_results: usize,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Optional per-step progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            steps: default_steps(),
            max_report_chars: 3000,
            step_delay_ms: 1000,
            step_timeout_secs: 120,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.2,
            max_tokens: 2048,
            default_query: DEFAULT_QUERY.to_string(),
            search_results: 5,
            download_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for AnalysisConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisConfig")
            .field(
                "steps",
                &self.steps.iter().map(|s| s.role.as_str()).collect::<Vec<_>>(),
            )
            .field("max_report_chars", &self.max_report_chars)
            .field("step_delay_ms", &self.step_delay_ms)
            .field("step_timeout_secs", &self.step_timeout_secs)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("default_query", &self.default_query)
            .field("search_results", &self.search_results)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn PipelineProgressCallback>"),
            )
            .finish()
    }
}

impl AnalysisConfig {
    /// Create a new builder for `AnalysisConfig`.
    pub fn builder() -> AnalysisConfigBuilder {
        AnalysisConfigBuilder {
            config: Self::default(),
        }
    }

    /// The validated, ordered step list.
    pub fn steps(&self) -> &[StepDefinition] {
        &self.steps
    }

    /// Trim the caller's query, falling back to [`Self::default_query`] when blank.
    pub fn effective_query(&self, query: Option<&str>) -> String {
        match query.map(str::trim) {
            Some(q) if !q.is_empty() => q.to_string(),
            _ => self.default_query.clone(),
        }
    }
}

/// Builder for [`AnalysisConfig`].
#[derive(Debug)]
pub struct AnalysisConfigBuilder {
    config: AnalysisConfig,
}

impl AnalysisConfigBuilder {
    pub fn steps(mut self, steps: Vec<StepDefinition>) -> Self {
        self.config.steps = steps;
        self
    }

    pub fn max_report_chars(mut self, n: usize) -> Self {
        self.config.max_report_chars = n;
        self
    }

    pub fn step_delay_ms(mut self, ms: u64) -> Self {
        self.config.step_delay_ms = ms;
        self
    }

    pub fn step_timeout_secs(mut self, secs: u64) -> Self {
        self.config.step_timeout_secs = secs.max(1);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn default_query(mut self, query: impl Into<String>) -> Self {
        self.config.default_query = query.into();
        self
    }

    pub fn search_results(mut self, n: usize) -> Self {
        self.config.search_results = n;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<AnalysisConfig, AnalyzerError> {
        let c = &self.config;
        if c.max_report_chars == 0 {
            return Err(AnalyzerError::InvalidConfig(
                "max_report_chars must be ≥ 1".into(),
            ));
        }
        if c.default_query.trim().is_empty() {
            return Err(AnalyzerError::InvalidConfig(
                "default query may not be empty".into(),
            ));
        }

        let mut seen = HashSet::new();
        for step in &c.steps {
            if step.role.trim().is_empty() {
                return Err(AnalyzerError::InvalidConfig(
                    "step roles may not be empty".into(),
                ));
            }
            if !seen.insert(step.role.as_str()) {
                return Err(AnalyzerError::InvalidConfig(format!(
                    "duplicate step role '{}'",
                    step.role
                )));
            }
        }
        Ok(self.config)
    }
}

/// Listener-side settings for [`crate::server::serve`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address to bind, e.g. `0.0.0.0:8000`.
    pub listen_addr: String,
    /// Scratch directory for staged uploads.
    pub data_dir: PathBuf,
    /// JSON-lines file receiving one record per request. `None` keeps records in memory.
    pub store_path: Option<PathBuf>,
    /// Request body cap for uploads, in bytes. Default: 20 MiB.
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8000".to_string(),
            data_dir: PathBuf::from("data"),
            store_path: None,
            max_upload_bytes: 20 * 1024 * 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = AnalysisConfig::default();
        assert_eq!(c.steps.len(), 4);
        assert_eq!(c.max_report_chars, 3000);
        assert_eq!(c.step_delay_ms, 1000);
        assert_eq!(c.default_query, DEFAULT_QUERY);
    }

    #[test]
    fn builder_rejects_duplicate_roles() {
        let steps = vec![
            StepDefinition::new("doctor", "p", "{report_text}"),
            StepDefinition::new("doctor", "p", "{report_text}"),
        ];
        let err = AnalysisConfig::builder().steps(steps).build().unwrap_err();
        assert!(err.to_string().contains("duplicate step role 'doctor'"));
    }

    #[test]
    fn builder_rejects_zero_budget() {
        assert!(AnalysisConfig::builder().max_report_chars(0).build().is_err());
    }

    #[test]
    fn builder_allows_empty_step_list() {
        let config = AnalysisConfig::builder().steps(vec![]).build().unwrap();
        assert!(config.steps.is_empty());
    }

    #[test]
    fn effective_query_trims_and_falls_back() {
        let c = AnalysisConfig::default();
        assert_eq!(c.effective_query(Some("  is my iron low? ")), "is my iron low?");
        assert_eq!(c.effective_query(Some("   ")), DEFAULT_QUERY);
        assert_eq!(c.effective_query(None), DEFAULT_QUERY);
    }

    #[test]
    fn debug_hides_provider() {
        let dbg = format!("{:?}", AnalysisConfig::default());
        assert!(dbg.contains("exercise_specialist"));
        assert!(dbg.contains("provider: None"));
    }
}
