//! Mock collaborators shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bloodtest_analyzer::pipeline::extract::{ExtractedText, TextExtractor};
use bloodtest_analyzer::{
    AnalysisConfig, AnalysisRecord, AnalysisStore, Analyzer, AnalyzerError, Generation,
    GenerationError, MemoryStore, StepDefinition, StoreError, TextGenerator,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Smallest body that passes the upload magic-byte check.
pub const FAKE_PDF: &[u8] = b"%PDF-1.4\n% test document\n";

pub const REPORT_TEXT: &str = "Name : Jane Doe\nHemoglobin 13.2 g/dL\n\nFerritin 9 ng/mL (low)";

/// Returns fixed pages, or fails like an unreadable PDF.
pub struct FakeExtractor {
    pages: Option<Vec<String>>,
    pub calls: AtomicUsize,
}

impl FakeExtractor {
    pub fn with_text(text: &str) -> Arc<Self> {
        Arc::new(Self {
            pages: Some(vec![text.to_string()]),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            pages: None,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl TextExtractor for FakeExtractor {
    async fn extract(&self, path: &Path) -> Result<ExtractedText, AnalyzerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert!(path.exists(), "extractor must see the staged file");
        match &self.pages {
            Some(pages) => Ok(ExtractedText::new(pages.clone())),
            None => Err(AnalyzerError::CorruptPdf {
                path: path.to_path_buf(),
                detail: "xref table damaged".into(),
            }),
        }
    }
}

/// Records every prompt; fails for personas listed in `fail_for`.
#[derive(Default)]
pub struct RecordingGenerator {
    pub fail_for: Vec<String>,
    pub prompts: Mutex<Vec<String>>,
    pub calls: AtomicUsize,
}

impl RecordingGenerator {
    pub fn failing_for(personas: &[&str]) -> Self {
        Self {
            fail_for: personas.iter().map(|p| p.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextGenerator for RecordingGenerator {
    async fn generate(&self, system: &str, prompt: &str) -> Result<Generation, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        if self.fail_for.iter().any(|p| p == system) {
            return Err(GenerationError::Backend(format!("{system} backend down")));
        }
        Ok(Generation {
            text: format!("{system} says: looks fine. See https://example.org/ref"),
            input_tokens: 10,
            output_tokens: 5,
        })
    }
}

/// Always refuses to persist.
pub struct BrokenStore;

#[async_trait]
impl AnalysisStore for BrokenStore {
    async fn insert(&self, _record: &AnalysisRecord) -> Result<String, StoreError> {
        Err(StoreError::Io {
            path: PathBuf::from("/unreachable/analyses.jsonl"),
            source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
        })
    }
}

/// Cheap steps whose persona equals their role.
pub fn steps(roles: &[&str]) -> Vec<StepDefinition> {
    roles
        .iter()
        .map(|r| StepDefinition::new(*r, *r, "Q: {query}\nREPORT:\n{report_text}"))
        .collect()
}

pub fn fast_config(roles: &[&str]) -> AnalysisConfig {
    AnalysisConfig::builder()
        .steps(steps(roles))
        .step_delay_ms(0)
        .build()
        .unwrap()
}

pub fn analyzer(
    extractor: Arc<FakeExtractor>,
    generator: Arc<RecordingGenerator>,
    store: Arc<dyn AnalysisStore>,
    config: AnalysisConfig,
) -> Analyzer {
    Analyzer::new(extractor, generator, store, config)
}

pub fn memory_store() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::new())
}
