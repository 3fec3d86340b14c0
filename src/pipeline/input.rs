//! Input resolution: put the report somewhere pdfium can open it.
//!
//! pdfium requires a file-system path. Uploads and downloads are therefore
//! written into a `TempDir`, which removes the file automatically once the
//! [`ResolvedInput`] is dropped, i.e. as soon as extraction is over. The PDF
//! magic bytes (`%PDF`) are checked before returning so callers get a
//! meaningful error rather than a pdfium failure.

use crate::error::AnalyzerError;
use std::io::Read;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};

const PDF_MAGIC: &[u8; 4] = b"%PDF";

/// The resolved input — either a local path or a file inside a temp directory.
#[derive(Debug)]
pub enum ResolvedInput {
    /// Input was already a local file.
    Local(PathBuf),
    /// Input was uploaded or downloaded into a temp directory that lives as
    /// long as this value.
    Staged { path: PathBuf, _temp_dir: TempDir },
}

impl ResolvedInput {
    /// Get the path to the PDF file regardless of how it was resolved.
    pub fn path(&self) -> &Path {
        match self {
            ResolvedInput::Local(p) => p,
            ResolvedInput::Staged { path, .. } => path,
        }
    }

    /// File name used as the report's file reference.
    pub fn file_name(&self) -> String {
        self.path()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "report.pdf".to_string())
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Whether an uploaded file name carries a `.pdf` extension (case-insensitive).
pub fn has_pdf_extension(file_name: &str) -> bool {
    file_name.to_ascii_lowercase().ends_with(".pdf")
}

/// Resolve the input string to a local PDF file path.
///
/// If the input is a URL, download it to a temporary directory.
/// If the input is a local file, validate it exists and is readable.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<ResolvedInput, AnalyzerError> {
    if input.trim().is_empty() {
        return Err(AnalyzerError::InvalidInput {
            input: input.to_string(),
        });
    }
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        resolve_local(input)
    }
}

/// Write uploaded bytes into a fresh temp directory under `data_dir`.
///
/// Rejects names without a `.pdf` extension and content without the PDF
/// magic bytes before anything touches the disk.
pub async fn stage_upload(
    data_dir: &Path,
    file_name: &str,
    bytes: &[u8],
) -> Result<ResolvedInput, AnalyzerError> {
    if !has_pdf_extension(file_name) {
        return Err(AnalyzerError::UnsupportedFileType {
            file_name: file_name.to_string(),
        });
    }
    check_magic(bytes, Path::new(file_name))?;

    let staging_err = |source: std::io::Error| AnalyzerError::StagingFailed {
        file_name: file_name.to_string(),
        source,
    };

    tokio::fs::create_dir_all(data_dir).await.map_err(staging_err)?;
    let temp_dir = tempfile::Builder::new()
        .prefix("blood_test_report_")
        .tempdir_in(data_dir)
        .map_err(staging_err)?;

    let path = temp_dir.path().join(sanitize_file_name(file_name));
    tokio::fs::write(&path, bytes).await.map_err(staging_err)?;

    debug!("Staged upload '{}' at {}", file_name, path.display());
    Ok(ResolvedInput::Staged {
        path,
        _temp_dir: temp_dir,
    })
}

/// Resolve a local file path, validating existence and PDF magic bytes.
fn resolve_local(path_str: &str) -> Result<ResolvedInput, AnalyzerError> {
    let path = PathBuf::from(path_str);

    if !path.exists() {
        return Err(AnalyzerError::FileNotFound { path });
    }

    match std::fs::File::open(&path) {
        Ok(mut f) => {
            let mut magic = [0u8; 4];
            if f.read_exact(&mut magic).is_ok() && &magic != PDF_MAGIC {
                return Err(AnalyzerError::NotAPdf { path, magic });
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(AnalyzerError::PermissionDenied { path });
        }
        Err(_) => {
            return Err(AnalyzerError::FileNotFound { path });
        }
    }

    debug!("Resolved local PDF: {}", path.display());
    Ok(ResolvedInput::Local(path))
}

/// Download a URL to a temporary directory and return the path.
async fn download_url(url: &str, timeout_secs: u64) -> Result<ResolvedInput, AnalyzerError> {
    info!("Downloading PDF from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| AnalyzerError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            AnalyzerError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            AnalyzerError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(AnalyzerError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let filename = filename_from_url(url);

    let bytes = response
        .bytes()
        .await
        .map_err(|e| AnalyzerError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let temp_dir = TempDir::new().map_err(|e| AnalyzerError::Internal(e.to_string()))?;
    let file_path = temp_dir.path().join(&filename);
    check_magic(&bytes, &file_path)?;

    tokio::fs::write(&file_path, &bytes)
        .await
        .map_err(|e| AnalyzerError::Internal(format!("Failed to write temp file: {}", e)))?;

    info!("Downloaded to: {}", file_path.display());

    Ok(ResolvedInput::Staged {
        path: file_path,
        _temp_dir: temp_dir,
    })
}

fn check_magic(bytes: &[u8], path: &Path) -> Result<(), AnalyzerError> {
    if bytes.len() < 4 || &bytes[..4] != PDF_MAGIC {
        let mut magic = [0u8; 4];
        let n = bytes.len().min(4);
        magic[..n].copy_from_slice(&bytes[..n]);
        return Err(AnalyzerError::NotAPdf {
            path: path.to_path_buf(),
            magic,
        });
    }
    Ok(())
}

/// Last URL path segment if it looks like a file name.
fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return sanitize_file_name(last);
                }
            }
        }
    }

    "downloaded.pdf".to_string()
}

/// Keep only characters that are safe in a single path component.
fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "report.pdf".to_string()
    } else {
        cleaned.to_string()
    }
}
