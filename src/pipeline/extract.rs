//! Text extraction: PDF → plain text bounded by a character budget.
//!
//! pdfium wraps a C++ library with thread-local state, so every call runs
//! inside `tokio::task::spawn_blocking`. The extractor is a trait so the
//! HTTP layer and the tests can substitute their own backend.

use crate::error::AnalyzerError;
use crate::output::Report;
use async_trait::async_trait;
use chrono::Utc;
use once_cell::sync::Lazy;
use pdfium_render::prelude::*;
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Appended to a report cut at the character budget.
pub const TRUNCATION_MARKER: &str = "\n\n[...TRUNCATED DUE TO SIZE LIMIT...]";

/// Returned by [`extract_user_name`] when no name line is found.
pub const UNKNOWN_USER: &str = "Unknown User";

/// Raw per-page text as produced by an extraction backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedText {
    pub pages: Vec<String>,
}

impl ExtractedText {
    pub fn new(pages: Vec<String>) -> Self {
        Self { pages }
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Join pages into one document.
    ///
    /// Blank-line pairs inside a page collapse to a single newline and every
    /// page is terminated by `\n`.
    pub fn joined(&self) -> String {
        let mut out = String::new();
        for page in &self.pages {
            out.push_str(&page.replace("\n\n", "\n"));
            out.push('\n');
        }
        out
    }
}

/// Anything that can turn a document on disk into per-page text.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, path: &Path) -> Result<ExtractedText, AnalyzerError>;
}

/// [`TextExtractor`] backed by pdfium.
///
/// The library is located via `PDFIUM_LIB_PATH` (a file or a directory),
/// then the working directory, then the system library search path.
#[derive(Debug, Clone, Default)]
pub struct PdfiumExtractor {
    library_path: Option<PathBuf>,
}

impl PdfiumExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind to a specific pdfium library instead of searching for one.
    pub fn with_library_path(path: impl Into<PathBuf>) -> Self {
        Self {
            library_path: Some(path.into()),
        }
    }
}

#[async_trait]
impl TextExtractor for PdfiumExtractor {
    async fn extract(&self, path: &Path) -> Result<ExtractedText, AnalyzerError> {
        let path = path.to_path_buf();
        let library_path = self.library_path.clone();

        tokio::task::spawn_blocking(move || extract_blocking(&path, library_path.as_deref()))
            .await
            .map_err(|e| AnalyzerError::Internal(format!("Extraction task panicked: {}", e)))?
    }
}

fn extract_blocking(
    pdf_path: &Path,
    library_path: Option<&Path>,
) -> Result<ExtractedText, AnalyzerError> {
    let pdfium = load_pdfium(library_path)?;

    let document = pdfium.load_pdf_from_file(pdf_path, None).map_err(|e| {
        let err_str = format!("{:?}", e);
        if err_str.contains("Password") || err_str.contains("password") {
            AnalyzerError::PasswordRequired {
                path: pdf_path.to_path_buf(),
            }
        } else {
            AnalyzerError::CorruptPdf {
                path: pdf_path.to_path_buf(),
                detail: err_str,
            }
        }
    })?;

    let mut pages = Vec::new();
    for (index, page) in document.pages().iter().enumerate() {
        let text = page
            .text()
            .map_err(|e| AnalyzerError::PageTextFailed {
                page: index + 1,
                detail: format!("{:?}", e),
            })?
            .all();
        debug!("Page {}: {} chars of text", index + 1, text.chars().count());
        pages.push(text);
    }

    info!("PDF loaded: {} pages", pages.len());
    Ok(ExtractedText::new(pages))
}

fn load_pdfium(library_path: Option<&Path>) -> Result<Pdfium, AnalyzerError> {
    let explicit = library_path
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os("PDFIUM_LIB_PATH").map(PathBuf::from));

    if let Some(path) = explicit {
        let lib = if path.is_dir() {
            Pdfium::pdfium_platform_library_name_at_path(&path)
        } else {
            path
        };
        return Pdfium::bind_to_library(&lib)
            .map(Pdfium::new)
            .map_err(|e| AnalyzerError::PdfiumBindingFailed(format!("{}: {:?}", lib.display(), e)));
    }

    match Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./")) {
        Ok(bindings) => Ok(Pdfium::new(bindings)),
        Err(local_err) => Pdfium::bind_to_system_library()
            .map(Pdfium::new)
            .map_err(|_| AnalyzerError::PdfiumBindingFailed(format!("{:?}", local_err))),
    }
}

/// Cut `text` to `budget` characters and append [`TRUNCATION_MARKER`].
///
/// Returns the text unchanged when it fits. The boolean reports whether a
/// cut happened.
pub fn truncate_to_budget(text: &str, budget: usize) -> (String, bool) {
    match text.char_indices().nth(budget) {
        None => (text.to_string(), false),
        Some((byte_idx, _)) => {
            let mut cut = String::with_capacity(byte_idx + TRUNCATION_MARKER.len());
            cut.push_str(&text[..byte_idx]);
            cut.push_str(TRUNCATION_MARKER);
            (cut, true)
        }
    }
}

static NAME_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*name[^:\n]*:\s*(.*)$").expect("valid regex"));

/// Best-effort patient name: the value of the first `Name: …` line.
pub fn extract_user_name(text: &str) -> String {
    text.lines()
        .find_map(|line| {
            NAME_LINE
                .captures(line)
                .map(|c| c.get(1).map_or("", |m| m.as_str()).trim().to_string())
        })
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| UNKNOWN_USER.to_string())
}

/// Run `extractor` on `path` and shape the result into a [`Report`].
///
/// Also returns the best-effort user name, read from the untruncated text.
///
/// # Errors
/// [`AnalyzerError::EmptyExtraction`] when the document holds no text, plus
/// whatever the extractor itself reports.
pub async fn extract_report(
    extractor: &dyn TextExtractor,
    path: &Path,
    file_name: &str,
    budget: usize,
) -> Result<(Report, String), AnalyzerError> {
    let extracted = extractor.extract(path).await?;
    let full_text = extracted.joined();

    if full_text.trim().is_empty() {
        warn!("No content extracted from {}", path.display());
        return Err(AnalyzerError::EmptyExtraction {
            path: path.to_path_buf(),
        });
    }

    let user_name = extract_user_name(&full_text);
    let (text, truncated) = truncate_to_budget(&full_text, budget);
    if truncated {
        info!(
            "Report '{}' truncated from {} to {} chars",
            file_name,
            full_text.chars().count(),
            budget
        );
    }

    let report = Report {
        id: Uuid::new_v4(),
        file_name: file_name.to_string(),
        text,
        truncated,
        page_count: extracted.page_count(),
        uploaded_at: Utc::now(),
    };

    Ok((report, user_name))
}
