//! Streaming API: emit step results as the sequential pipeline produces them.
//!
//! [`crate::orchestrator::run_pipeline`] returns only after the last step.
//! [`run_pipeline_stream`] yields each [`StepResult`] as soon as its step
//! finishes, which lets a caller print the doctor's summary while the
//! remaining specialists are still running.
//!
//! Ordering, delays and failure handling are identical to the eager path:
//! results arrive in step order, the inter-step delay is applied before
//! every step but the first, and failed steps yield a placeholder result.
//! Progress events match too, with `on_pipeline_complete` fired right after
//! the last step's result is produced. An empty step list yields an empty
//! stream and no events. The stream variants never write to a store.

use crate::config::AnalysisConfig;
use crate::error::AnalyzerError;
use crate::orchestrator::{fetch_references, pause_between_steps, report_step, Analyzer};
use crate::output::{Report, StepResult};
use crate::pipeline::generate::{self, TextGenerator};
use crate::pipeline::input;
use crate::pipeline::postprocess;
use crate::pipeline::search::SearchBackend;
use futures::stream::{self, StreamExt};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tokio_stream::Stream;
use tracing::info;

/// A boxed stream of step results, in step order.
pub type StepStream = Pin<Box<dyn Stream<Item = StepResult> + Send>>;

/// Extracted report plus the stream that will analyze it.
pub struct AnalysisStream {
    pub user_name: String,
    pub query: String,
    pub report: Report,
    pub steps: StepStream,
}

impl std::fmt::Debug for AnalysisStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisStream")
            .field("user_name", &self.user_name)
            .field("query", &self.query)
            .field("report", &self.report)
            .finish_non_exhaustive()
    }
}

/// Lazily run the configured steps, yielding one result per step.
///
/// Nothing happens until the stream is polled. The web search (if any step
/// wants it) runs once, before the first step.
pub fn run_pipeline_stream(
    generator: Arc<dyn TextGenerator>,
    search: Option<Arc<dyn SearchBackend>>,
    query: impl Into<String>,
    report_text: impl Into<String>,
    config: &AnalysisConfig,
) -> StepStream {
    let config = Arc::new(config.clone());
    let query: Arc<str> = Arc::from(query.into());
    let report_text: Arc<str> = Arc::from(report_text.into());
    let references: Arc<OnceCell<Option<String>>> = Arc::new(OnceCell::new());
    let succeeded = Arc::new(AtomicUsize::new(0));
    let total = config.steps.len();

    let steps = config.steps.clone();
    let s = stream::iter(steps.into_iter().enumerate()).then(move |(index, step)| {
        let generator = Arc::clone(&generator);
        let search = search.clone();
        let config = Arc::clone(&config);
        let query = Arc::clone(&query);
        let report_text = Arc::clone(&report_text);
        let references = Arc::clone(&references);
        let succeeded = Arc::clone(&succeeded);
        async move {
            if index == 0 {
                if let Some(ref cb) = config.progress_callback {
                    cb.on_pipeline_start(total);
                }
            }
            let refs = references
                .get_or_init(|| {
                    fetch_references(
                        search.as_deref(),
                        &config.steps,
                        &query,
                        config.search_results,
                    )
                })
                .await;

            if index > 0 {
                pause_between_steps(config.step_delay_ms).await;
            }
            if let Some(ref cb) = config.progress_callback {
                cb.on_step_start(index, total, &step.role);
            }

            let mut result = generate::run_step(
                generator.as_ref(),
                &step,
                &query,
                &report_text,
                refs.as_deref(),
                &config,
            )
            .await;
            postprocess::clean_step(&mut result);
            report_step(&config, index, total, &result);

            if result.success {
                succeeded.fetch_add(1, Ordering::SeqCst);
            }
            if index + 1 == total {
                let success_count = succeeded.load(Ordering::SeqCst);
                info!("Streamed analysis complete: {}/{} steps succeeded", success_count, total);
                if let Some(ref cb) = config.progress_callback {
                    cb.on_pipeline_complete(total, success_count);
                }
            }
            result
        }
    });

    Box::pin(s)
}

impl Analyzer {
    /// Resolve and extract `input_str`, then hand back a lazy step stream.
    ///
    /// # Errors
    /// Input and extraction failures surface here, before any step runs.
    pub async fn analyze_stream(
        &self,
        input_str: &str,
        query: Option<&str>,
    ) -> Result<AnalysisStream, AnalyzerError> {
        info!("Starting streaming analysis: {}", input_str);
        let query = self.config().effective_query(query);
        let resolved =
            input::resolve_input(input_str, self.config().download_timeout_secs).await?;
        let (report, user_name) = self.extract(resolved).await?;

        let steps = run_pipeline_stream(
            self.generator(),
            self.search(),
            query.clone(),
            report.text.clone(),
            self.config(),
        );

        Ok(AnalysisStream {
            user_name,
            query,
            report,
            steps,
        })
    }
}
