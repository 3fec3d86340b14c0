//! Error types for the bloodtest-analyzer library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`AnalyzerError`] — **Fatal**: the analysis cannot proceed at all
//!   (bad upload, unreadable PDF, nothing extracted, provider not
//!   configured). Returned as `Err(AnalyzerError)` from the top-level
//!   `analyze*` functions and mapped to a 4xx/5xx by the HTTP layer.
//!
//! * [`StepError`] — **Non-fatal**: one generation step failed but every
//!   other step is unaffected. Stored inside [`crate::output::StepResult`]
//!   next to the placeholder text that replaced the missing output.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the bloodtest-analyzer library.
///
/// Step-level failures use [`StepError`] and never surface here.
#[derive(Debug, Error)]
pub enum AnalyzerError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'")]
    DownloadTimeout { url: String, secs: u64 },

    /// The uploaded file name does not carry a `.pdf` extension.
    #[error("Only PDF files are supported (got '{file_name}')")]
    UnsupportedFileType { file_name: String },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── Extraction errors ─────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password.
    #[error("PDF '{path}' is encrypted and cannot be read")]
    PasswordRequired { path: PathBuf },

    /// pdfium could not read the text layer of a page.
    #[error("Text extraction failed for page {page}: {detail}")]
    PageTextFailed { page: usize, detail: String },

    /// The document was read but no text came out of it.
    #[error("No content extracted from the PDF '{path}'")]
    EmptyExtraction { path: PathBuf },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium, place the library in the working\n\
directory, or install it system-wide.\n"
    )]
    PdfiumBindingFailed(String),

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not stage an upload on disk.
    #[error("Failed to stage upload '{file_name}': {source}")]
    StagingFailed {
        file_name: String,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AnalyzerError {
    /// Whether the error was caused by the caller's input rather than by
    /// this service or one of its collaborators.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            AnalyzerError::FileNotFound { .. }
                | AnalyzerError::PermissionDenied { .. }
                | AnalyzerError::InvalidInput { .. }
                | AnalyzerError::UnsupportedFileType { .. }
                | AnalyzerError::NotAPdf { .. }
        )
    }

    /// Whether the error came out of the text-extraction stage.
    pub fn is_extraction_error(&self) -> bool {
        matches!(
            self,
            AnalyzerError::CorruptPdf { .. }
                | AnalyzerError::PasswordRequired { .. }
                | AnalyzerError::PageTextFailed { .. }
                | AnalyzerError::EmptyExtraction { .. }
        )
    }
}

/// A non-fatal error for a single pipeline step.
///
/// The pipeline records it next to a placeholder output and moves on to the
/// next step.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum StepError {
    /// The generation backend returned an error.
    #[error("step '{role}': generation failed: {detail}")]
    GenerationFailed { role: String, detail: String },

    /// The generation call did not finish in time.
    #[error("step '{role}': generation timed out after {secs}s")]
    Timeout { role: String, secs: u64 },

    /// The backend answered with nothing but whitespace.
    #[error("step '{role}': no analysis returned")]
    EmptyOutput { role: String },
}

impl StepError {
    pub fn role(&self) -> &str {
        match self {
            StepError::GenerationFailed { role, .. }
            | StepError::Timeout { role, .. }
            | StepError::EmptyOutput { role } => role,
        }
    }
}
