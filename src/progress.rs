//! Progress-callback trait for per-step pipeline events.
//!
//! Inject an [`Arc<dyn PipelineProgressCallback>`] via
//! [`crate::config::AnalysisConfigBuilder::progress_callback`] to receive
//! events as the orchestrator walks the step list.
//!
//! # Example
//!
//! ```rust
//! use bloodtest_analyzer::{AnalysisConfig, PipelineProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: AtomicUsize,
//! }
//!
//! impl PipelineProgressCallback for CountingCallback {
//!     fn on_step_complete(&self, index: usize, total: usize, role: &str, output_len: usize) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("step {}/{} ({role}) done: {output_len} chars", index + 1, total);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { completed: AtomicUsize::new(0) });
//!
//! let config = AnalysisConfig::builder()
//!     .progress_callback(counter as Arc<dyn PipelineProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the orchestrator as it processes each step.
///
/// Steps run one at a time, but a single callback may be shared by many
/// concurrent requests, hence `Send + Sync`. All methods default to no-ops.
/// `index` is 0-based.
pub trait PipelineProgressCallback: Send + Sync {
    /// Called once before the first step.
    fn on_pipeline_start(&self, total_steps: usize) {
        let _ = total_steps;
    }

    /// Called just before a step's generation call.
    fn on_step_start(&self, index: usize, total: usize, role: &str) {
        let _ = (index, total, role);
    }

    /// Called when a step produced output. `output_len` counts characters.
    fn on_step_complete(&self, index: usize, total: usize, role: &str, output_len: usize) {
        let _ = (index, total, role, output_len);
    }

    /// Called when a step failed and a placeholder was recorded instead.
    fn on_step_error(&self, index: usize, total: usize, role: &str, error: &str) {
        let _ = (index, total, role, error);
    }

    /// Called once after every step has been attempted.
    fn on_pipeline_complete(&self, total_steps: usize, success_count: usize) {
        let _ = (total_steps, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl PipelineProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::AnalysisConfig`].
pub type ProgressCallback = Arc<dyn PipelineProgressCallback>;

/// Records every event as a short string, in the order received.
#[cfg(test)]
#[derive(Default)]
pub(crate) struct EventLog {
    events: std::sync::Mutex<Vec<String>>,
}

#[cfg(test)]
impl EventLog {
    pub(crate) fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

#[cfg(test)]
impl PipelineProgressCallback for EventLog {
    fn on_pipeline_start(&self, total_steps: usize) {
        self.push(format!("start {total_steps}"));
    }

    fn on_step_start(&self, index: usize, _total: usize, role: &str) {
        self.push(format!("begin {index} {role}"));
    }

    fn on_step_complete(&self, index: usize, _total: usize, role: &str, output_len: usize) {
        self.push(format!("ok {index} {role} {output_len}"));
    }

    fn on_step_error(&self, index: usize, _total: usize, role: &str, _error: &str) {
        self.push(format!("err {index} {role}"));
    }

    fn on_pipeline_complete(&self, total_steps: usize, success_count: usize) {
        self.push(format!("done {success_count}/{total_steps}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_pipeline_start(4);
        cb.on_step_start(0, 4, "doctor");
        cb.on_step_complete(0, 4, "doctor", 42);
        cb.on_step_error(1, 4, "verifier", "timeout");
        cb.on_pipeline_complete(4, 3);
    }
}
