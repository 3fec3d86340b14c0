//! Post-processing: deterministic cleanup of generated step output.
//!
//! Rules (applied in order to successful outputs):
//! 1. Normalise line endings (CRLF → LF)
//! 2. Strip an outer ```` ``` ```` fence wrapping the whole answer
//! 3. Remove `http(s)://` URLs
//! 4. Strip invisible Unicode (zero-width spaces, BOM, …)
//! 5. Trim trailing whitespace per line and collapse runs of blank lines
//!
//! Failed steps only go through rule 3, since their placeholder may quote a
//! backend error that embeds an endpoint URL. An output that is empty after
//! cleaning is turned into a failure carrying [`NO_ANALYSIS_PLACEHOLDER`].

use crate::error::StepError;
use crate::output::StepResult;
use once_cell::sync::Lazy;
use regex::Regex;

/// Output recorded for a step whose answer was empty after cleanup.
pub const NO_ANALYSIS_PLACEHOLDER: &str = "No analysis returned from agent.";

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[a-zA-Z]*\n(.*)\n```\s*$").unwrap());

static RE_URL: Lazy<Regex> = Lazy::new(|| Regex::new(r"https?://\S+").unwrap());

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

/// Clean a single step in place.
pub fn clean_step(step: &mut StepResult) {
    if !step.success {
        step.output = strip_urls(&step.output);
        return;
    }

    let cleaned = clean_output(&step.output);
    if cleaned.is_empty() {
        step.success = false;
        step.error = Some(StepError::EmptyOutput {
            role: step.role.clone(),
        });
        step.output = NO_ANALYSIS_PLACEHOLDER.to_string();
    } else {
        step.output = cleaned;
    }
}

/// Apply rules 1–5 to a single output.
pub fn clean_output(input: &str) -> String {
    let s = normalise_line_endings(input);
    let s = strip_outer_fences(&s);
    let s = strip_urls(&s);
    let s = remove_invisible_chars(&s);
    tidy_whitespace(&s)
}

fn strip_outer_fences(input: &str) -> String {
    if let Some(caps) = RE_OUTER_FENCES.captures(input.trim()) {
        caps[1].to_string()
    } else {
        input.to_string()
    }
}

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

/// Remove every `http://` / `https://` URL.
pub fn strip_urls(input: &str) -> String {
    RE_URL.replace_all(input, "").into_owned()
}

fn remove_invisible_chars(input: &str) -> String {
    input
        .chars()
        .filter(|c| {
            !matches!(
                c,
                '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{2060}' | '\u{FEFF}' | '\u{00AD}'
            )
        })
        .collect()
}

fn tidy_whitespace(input: &str) -> String {
    let trimmed_lines = input
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n");
    RE_BLANK_LINES
        .replace_all(&trimmed_lines, "\n\n")
        .trim()
        .to_string()
}
