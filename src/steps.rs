//! Step definitions for the analysis pipeline.
//!
//! Every step is a `(role, persona, instructions)` triple. The list is plain
//! data: the orchestrator in [`crate::orchestrator`] walks it once, in order,
//! and never inspects anything beyond what is declared here.
//!
//! Instructions may reference two placeholders that are substituted before
//! the call:
//!
//! | Placeholder     | Replaced with                              |
//! |-----------------|--------------------------------------------|
//! | `{query}`       | the caller's free-text question            |
//! | `{report_text}` | the extracted (and possibly truncated) PDF |
//!
//! Callers can replace the default list via
//! [`crate::config::AnalysisConfigBuilder::steps`].

use serde::{Deserialize, Serialize};

/// One role-specific generation call over the shared report text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepDefinition {
    /// Key under which the step's output is stored. Must be unique in a list.
    pub role: String,
    /// System message describing who the model should act as.
    pub persona: String,
    /// User message template with `{query}` / `{report_text}` placeholders.
    pub instructions: String,
    /// Append web-search snippets for the query, when a search backend is configured.
    pub uses_search: bool,
}

impl StepDefinition {
    pub fn new(
        role: impl Into<String>,
        persona: impl Into<String>,
        instructions: impl Into<String>,
    ) -> Self {
        Self {
            role: role.into(),
            persona: persona.into(),
            instructions: instructions.into(),
            uses_search: false,
        }
    }

    pub fn with_search(mut self) -> Self {
        self.uses_search = true;
        self
    }

    /// Substitute the placeholders and attach reference material if any.
    pub fn render_prompt(&self, query: &str, report_text: &str, references: Option<&str>) -> String {
        let mut prompt = self
            .instructions
            .replace("{query}", query)
            .replace("{report_text}", report_text);

        if self.uses_search {
            if let Some(refs) = references.filter(|r| !r.trim().is_empty()) {
                prompt.push_str("\n\nReference material:\n");
                prompt.push_str(refs);
            }
        }

        prompt
    }
}

const DOCTOR_PERSONA: &str = "You are a senior physician who reads laboratory reports carefully. \
You explain results in plain language, never invent values that are not in the report, \
and always recommend consulting a doctor for decisions about treatment.";

const DOCTOR_INSTRUCTIONS: &str = r#"The patient asks: {query}

You are given this blood report text:

{report_text}

Your job is to:
- Summarize key lab findings in plain language.
- Identify any abnormal values and explain possible medical implications.
- Provide lifestyle or dietary advice if appropriate."#;

const VERIFIER_PERSONA: &str = "You are a clinical laboratory specialist who checks whether a \
document is a blood test report before anyone relies on it.";

const VERIFIER_INSTRUCTIONS: &str = r#"Assess whether the provided text appears to be a blood test report.

{report_text}

Respond with:
- Yes/No conclusion.
- Any reasons for your determination."#;

const NUTRITIONIST_PERSONA: &str = "You are a certified clinical nutritionist. Your recommendations \
are evidence-based and tied to the markers present in the report.";

const NUTRITIONIST_INSTRUCTIONS: &str = r#"The patient asks: {query}

Analyze the blood report data and:
- Provide evidence-based dietary recommendations.
- Suggest foods to prioritize or avoid based on key markers.
- Advise on supplements only if scientifically justified.

{report_text}"#;

const EXERCISE_PERSONA: &str = "You are an exercise physiologist who designs safe training plans \
for people with a wide range of health profiles.";

const EXERCISE_INSTRUCTIONS: &str = r#"The patient asks: {query}

Analyze the blood report data and:
- Recommend suitable exercise regimens.
- Tailor intensity and type of exercise to the individual's health profile.
- Highlight any contraindications from abnormal lab values.

{report_text}"#;

/// The built-in four-step pipeline, in execution order.
pub fn default_steps() -> Vec<StepDefinition> {
    vec![
        StepDefinition::new("doctor", DOCTOR_PERSONA, DOCTOR_INSTRUCTIONS),
        StepDefinition::new("verifier", VERIFIER_PERSONA, VERIFIER_INSTRUCTIONS),
        StepDefinition::new("nutritionist", NUTRITIONIST_PERSONA, NUTRITIONIST_INSTRUCTIONS)
            .with_search(),
        StepDefinition::new("exercise_specialist", EXERCISE_PERSONA, EXERCISE_INSTRUCTIONS)
            .with_search(),
    ]
}
