//! Pipeline orchestration: extraction, sequential steps, persistence.
//!
//! [`run_pipeline`] is the core. It walks the configured step list exactly
//! once, in order, and always returns one [`StepResult`] per step. A failing
//! step records a placeholder and the loop moves on; nothing is retried and
//! nothing runs in parallel.
//!
//! [`Analyzer`] wraps the pipeline with the I/O around it: staging an upload
//! (or resolving a path/URL), extracting text, and appending the resulting
//! [`AnalysisRecord`] to a store.

use crate::config::AnalysisConfig;
use crate::error::AnalyzerError;
use crate::output::{
    Analysis, AnalysisOutcome, AnalysisRecord, PipelineOutput, PipelineStats, Report, StepResult,
};
use crate::pipeline::extract::{self, PdfiumExtractor, TextExtractor};
use crate::pipeline::generate::{self, LlmGenerator, TextGenerator};
use crate::pipeline::input::{self, ResolvedInput};
use crate::pipeline::postprocess;
use crate::pipeline::search::{self, SearchBackend, SerperSearch};
use crate::steps::StepDefinition;
use crate::store::{AnalysisStore, MemoryStore};
use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Run every configured step against one extracted report.
///
/// Returns exactly `config.steps.len()` results in step order, whatever the
/// backend does. Outputs are already cleaned by [`postprocess::clean_step`].
pub async fn run_pipeline(
    generator: &dyn TextGenerator,
    search: Option<&dyn SearchBackend>,
    query: &str,
    report_text: &str,
    config: &AnalysisConfig,
) -> PipelineOutput {
    let start = Instant::now();
    let total = config.steps.len();
    info!("Running {} analysis steps", total);

    if let Some(ref cb) = config.progress_callback {
        cb.on_pipeline_start(total);
    }

    let references = fetch_references(search, &config.steps, query, config.search_results).await;

    let mut results = Vec::with_capacity(total);
    for (index, step) in config.steps.iter().enumerate() {
        if index > 0 {
            pause_between_steps(config.step_delay_ms).await;
        }

        if let Some(ref cb) = config.progress_callback {
            cb.on_step_start(index, total, &step.role);
        }

        let mut result = generate::run_step(
            generator,
            step,
            query,
            report_text,
            references.as_deref(),
            config,
        )
        .await;
        postprocess::clean_step(&mut result);

        report_step(config, index, total, &result);
        results.push(result);
    }

    let analysis = Analysis::new(results);
    let stats = compute_stats(&analysis, start.elapsed().as_millis() as u64);

    info!(
        "Analysis complete: {}/{} steps succeeded, {}ms",
        stats.succeeded_steps, stats.total_steps, stats.total_duration_ms
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_pipeline_complete(total, stats.succeeded_steps);
    }

    PipelineOutput { analysis, stats }
}

/// Run the search once when at least one step wants reference material.
///
/// Any failure is logged and treated as "no references".
pub(crate) async fn fetch_references(
    search: Option<&dyn SearchBackend>,
    steps: &[StepDefinition],
    query: &str,
    limit: usize,
) -> Option<String> {
    let backend = search?;
    if limit == 0 || !steps.iter().any(|s| s.uses_search) {
        return None;
    }

    match backend.search(query, limit).await {
        Ok(snippets) if snippets.is_empty() => {
            debug!("Search returned no snippets");
            None
        }
        Ok(snippets) => Some(search::format_references(&snippets)),
        Err(e) => {
            warn!("Web search failed, continuing without references: {}", e);
            None
        }
    }
}

pub(crate) async fn pause_between_steps(delay_ms: u64) {
    if delay_ms > 0 {
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }
}

pub(crate) fn report_step(config: &AnalysisConfig, index: usize, total: usize, result: &StepResult) {
    let Some(ref cb) = config.progress_callback else {
        return;
    };
    match &result.error {
        None => cb.on_step_complete(index, total, &result.role, result.output.chars().count()),
        Some(e) => cb.on_step_error(index, total, &result.role, &e.to_string()),
    }
}

fn compute_stats(analysis: &Analysis, total_duration_ms: u64) -> PipelineStats {
    PipelineStats {
        total_steps: analysis.len(),
        succeeded_steps: analysis.succeeded(),
        failed_steps: analysis.failed(),
        total_input_tokens: analysis.iter().map(|s| s.input_tokens as u64).sum(),
        total_output_tokens: analysis.iter().map(|s| s.output_tokens as u64).sum(),
        total_duration_ms,
    }
}

/// The end-to-end flow with its collaborators wired in.
///
/// Cheap to share behind an `Arc`; the HTTP server holds exactly one.
pub struct Analyzer {
    extractor: Arc<dyn TextExtractor>,
    generator: Arc<dyn TextGenerator>,
    search: Option<Arc<dyn SearchBackend>>,
    store: Arc<dyn AnalysisStore>,
    config: AnalysisConfig,
}

impl std::fmt::Debug for Analyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Analyzer")
            .field("search", &self.search.as_ref().map(|_| "<dyn SearchBackend>"))
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Analyzer {
    pub fn new(
        extractor: Arc<dyn TextExtractor>,
        generator: Arc<dyn TextGenerator>,
        store: Arc<dyn AnalysisStore>,
        config: AnalysisConfig,
    ) -> Self {
        Self {
            extractor,
            generator,
            search: None,
            store,
            config,
        }
    }

    /// Production wiring: pdfium extraction, an `edgequake-llm` provider
    /// resolved from `config`, Serper search when `SERPER_API_KEY` is set.
    pub fn from_config(
        config: AnalysisConfig,
        store: Option<Arc<dyn AnalysisStore>>,
    ) -> Result<Self, AnalyzerError> {
        let generator = LlmGenerator::from_config(&config)?;
        let store = store.unwrap_or_else(|| Arc::new(MemoryStore::new()));
        let mut analyzer = Self::new(
            Arc::new(PdfiumExtractor::new()),
            Arc::new(generator),
            store,
            config,
        );

        match SerperSearch::from_env() {
            Some(Ok(serper)) => {
                info!("Web search enabled (Serper)");
                analyzer = analyzer.with_search(Arc::new(serper));
            }
            Some(Err(e)) => warn!("Web search disabled: {}", e),
            None => debug!("SERPER_API_KEY not set, web search disabled"),
        }
        Ok(analyzer)
    }

    pub fn with_search(mut self, search: Arc<dyn SearchBackend>) -> Self {
        self.search = Some(search);
        self
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub(crate) fn generator(&self) -> Arc<dyn TextGenerator> {
        Arc::clone(&self.generator)
    }

    pub(crate) fn search(&self) -> Option<Arc<dyn SearchBackend>> {
        self.search.clone()
    }

    /// Analyze uploaded bytes: stage under `data_dir`, extract, run, store.
    ///
    /// The staged copy is removed as soon as extraction finishes. Rejected
    /// uploads and failed extractions return `Err` without any generation
    /// call being made.
    pub async fn analyze_upload(
        &self,
        data_dir: &Path,
        file_name: &str,
        bytes: &[u8],
        query: Option<&str>,
    ) -> Result<AnalysisOutcome, AnalyzerError> {
        info!("Analyzing upload '{}' ({} bytes)", file_name, bytes.len());
        let staged = input::stage_upload(data_dir, file_name, bytes).await?;
        self.analyze_resolved(staged, query).await
    }

    /// Analyze a local path or HTTP(S) URL.
    pub async fn analyze_input(
        &self,
        input_str: &str,
        query: Option<&str>,
    ) -> Result<AnalysisOutcome, AnalyzerError> {
        info!("Analyzing {}", input_str);
        let resolved = input::resolve_input(input_str, self.config.download_timeout_secs).await?;
        self.analyze_resolved(resolved, query).await
    }

    /// Extraction only. Needs no generation backend.
    pub async fn inspect(&self, input_str: &str) -> Result<(Report, String), AnalyzerError> {
        inspect_with(self.extractor.as_ref(), input_str, &self.config).await
    }

    /// Extract the report behind `resolved`, dropping the staged file afterwards.
    pub(crate) async fn extract(
        &self,
        resolved: ResolvedInput,
    ) -> Result<(Report, String), AnalyzerError> {
        let file_name = resolved.file_name();
        let extracted = extract::extract_report(
            self.extractor.as_ref(),
            resolved.path(),
            &file_name,
            self.config.max_report_chars,
        )
        .await;
        drop(resolved);
        extracted
    }

    async fn analyze_resolved(
        &self,
        resolved: ResolvedInput,
        query: Option<&str>,
    ) -> Result<AnalysisOutcome, AnalyzerError> {
        let query = self.config.effective_query(query);
        let (report, user_name) = self.extract(resolved).await?;
        debug!(
            "Extracted {} chars from {} pages (truncated: {})",
            report.text.chars().count(),
            report.page_count,
            report.truncated
        );

        let PipelineOutput { analysis, stats } = run_pipeline(
            self.generator.as_ref(),
            self.search.as_deref(),
            &query,
            &report.text,
            &self.config,
        )
        .await;

        let record = AnalysisRecord {
            id: Uuid::new_v4(),
            user_name: user_name.clone(),
            query: query.clone(),
            analysis: analysis.clone(),
            report_id: report.id,
            original_file_name: report.file_name.clone(),
            created_at: Utc::now(),
        };
        let record_id = match self.store.insert(&record).await {
            Ok(id) => Some(id),
            Err(e) => {
                warn!("Failed to persist analysis record: {}", e);
                None
            }
        };

        Ok(AnalysisOutcome {
            user_name,
            query,
            report,
            analysis,
            stats,
            record_id,
        })
    }
}

/// Resolve `input_str` and extract it with `extractor`.
pub async fn inspect_with(
    extractor: &dyn TextExtractor,
    input_str: &str,
    config: &AnalysisConfig,
) -> Result<(Report, String), AnalyzerError> {
    let resolved = input::resolve_input(input_str, config.download_timeout_secs).await?;
    let file_name = resolved.file_name();
    extract::extract_report(extractor, resolved.path(), &file_name, config.max_report_chars).await
}
