//! Pipeline stages for blood-test report analysis.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ extract ──▶ [search] ──▶ generate × N ──▶ postprocess
//! (upload)   (pdfium)    (snippets)    (LLM steps)      (cleanup)
//! ```
//!
//! 1. [`input`]       — stage an upload or resolve a path/URL to a local PDF
//! 2. [`extract`]     — pull and truncate the text layer; runs in
//!    `spawn_blocking` because pdfium is not async-safe
//! 3. [`search`]      — optional ranked snippets for search-enabled steps
//! 4. [`generate`]    — one LLM call per step; failures become placeholders
//! 5. [`postprocess`] — strip URLs and formatting artefacts from outputs
//!
//! Sequencing of these stages lives in [`crate::orchestrator`].

pub mod extract;
pub mod generate;
pub mod input;
pub mod postprocess;
pub mod search;
