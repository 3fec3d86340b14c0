//! # bloodtest-analyzer
//!
//! Analyse blood-test report PDFs with a fixed sequence of role-specialised
//! LLM steps (doctor, verifier, nutritionist, exercise specialist).
//!
//! ## Pipeline Overview
//!
//! ```text
//! upload / path / URL
//!  │
//!  ├─ 1. Input     stage the upload, check the %PDF magic bytes
//!  ├─ 2. Extract   pdfium text layer, truncated to a character budget
//!  ├─ 3. Search    optional web snippets for steps that cite references
//!  ├─ 4. Steps     one LLM call per role, sequential, fixed delay between
//!  ├─ 5. Cleanup   strip URLs and formatting artefacts
//!  └─ 6. Store     append one record per request
//! ```
//!
//! A failing step never aborts the run: it records a placeholder under its
//! role and the next step starts. The caller always gets one entry per step.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bloodtest_analyzer::{AnalysisConfig, Analyzer};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / …
//!     let analyzer = Analyzer::from_config(AnalysisConfig::default(), None)?;
//!     let outcome = analyzer.analyze_input("report.pdf", Some("Is my iron low?")).await?;
//!     for step in outcome.analysis.iter() {
//!         println!("## {}\n{}\n", step.role, step.output);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `bloodtest` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod server;
pub mod steps;
pub mod store;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{AnalysisConfig, AnalysisConfigBuilder, ServerConfig, DEFAULT_QUERY};
pub use error::{AnalyzerError, StepError};
pub use orchestrator::{inspect_with, run_pipeline, Analyzer};
pub use output::{
    Analysis, AnalysisOutcome, AnalysisRecord, PipelineOutput, PipelineStats, Report, StepResult,
};
pub use pipeline::extract::{PdfiumExtractor, TextExtractor};
pub use pipeline::generate::{Generation, GenerationError, LlmGenerator, TextGenerator};
pub use pipeline::search::{SearchBackend, SerperSearch, Snippet};
pub use progress::{NoopProgressCallback, PipelineProgressCallback, ProgressCallback};
pub use server::{build_router, serve, AppState};
pub use steps::{default_steps, StepDefinition};
pub use store::{AnalysisStore, JsonlStore, MemoryStore, StoreError};
pub use stream::{run_pipeline_stream, AnalysisStream, StepStream};
