//! Output types: extracted reports, per-step results and persisted records.

use crate::error::StepError;
use chrono::{DateTime, Utc};
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use uuid::Uuid;

/// Text pulled out of an uploaded document.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub id: Uuid,
    /// Original file name as supplied by the caller.
    pub file_name: String,
    /// Extracted text, bounded by `AnalysisConfig::max_report_chars` plus the truncation marker.
    pub text: String,
    pub truncated: bool,
    pub page_count: usize,
    pub uploaded_at: DateTime<Utc>,
}

/// Outcome of a single pipeline step.
#[derive(Debug, Clone, Serialize)]
pub struct StepResult {
    pub role: String,
    /// Generated text, or a placeholder when the step failed.
    pub output: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<StepError>,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub duration_ms: u64,
}

impl StepResult {
    /// Placeholder text recorded for a failed step.
    pub fn failure_placeholder(error: &StepError) -> String {
        format!("An error occurred during analysis: {error}")
    }

    pub(crate) fn failed(role: &str, error: StepError, duration_ms: u64) -> Self {
        Self {
            role: role.to_string(),
            output: Self::failure_placeholder(&error),
            success: false,
            error: Some(error),
            input_tokens: 0,
            output_tokens: 0,
            duration_ms,
        }
    }
}

/// Ordered role → [`StepResult`] mapping.
///
/// Serialised as a JSON object in step order, each value being
/// `{"output": …, "success": …}`.
#[derive(Debug, Clone, Default)]
pub struct Analysis {
    steps: Vec<StepResult>,
}

impl Analysis {
    pub fn new(steps: Vec<StepResult>) -> Self {
        Self { steps }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn get(&self, role: &str) -> Option<&StepResult> {
        self.steps.iter().find(|s| s.role == role)
    }

    pub fn roles(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().map(|s| s.role.as_str())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, StepResult> {
        self.steps.iter()
    }

    pub fn succeeded(&self) -> usize {
        self.steps.iter().filter(|s| s.success).count()
    }

    pub fn failed(&self) -> usize {
        self.steps.len() - self.succeeded()
    }
}

impl IntoIterator for Analysis {
    type Item = StepResult;
    type IntoIter = std::vec::IntoIter<StepResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.steps.into_iter()
    }
}

#[derive(Serialize)]
struct StepEntry<'a> {
    output: &'a str,
    success: bool,
}

impl Serialize for Analysis {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.steps.len()))?;
        for step in &self.steps {
            map.serialize_entry(
                &step.role,
                &StepEntry {
                    output: &step.output,
                    success: step.success,
                },
            )?;
        }
        map.end()
    }
}

/// Aggregate numbers for one pipeline run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineStats {
    pub total_steps: usize,
    pub succeeded_steps: usize,
    pub failed_steps: usize,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_duration_ms: u64,
}

/// What [`crate::orchestrator::run_pipeline`] returns.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutput {
    pub analysis: Analysis,
    pub stats: PipelineStats,
}

/// The document appended to the store once per request.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisRecord {
    pub id: Uuid,
    pub user_name: String,
    pub query: String,
    pub analysis: Analysis,
    pub report_id: Uuid,
    pub original_file_name: String,
    pub created_at: DateTime<Utc>,
}

/// Everything an end-to-end analysis produces.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisOutcome {
    pub user_name: String,
    pub query: String,
    pub report: Report,
    pub analysis: Analysis,
    pub stats: PipelineStats,
    /// Id assigned by the store, `None` when persisting failed.
    pub record_id: Option<String>,
}
