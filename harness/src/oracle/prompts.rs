//! Prompt templates for the oracle's four jobs
//!
//! Each prompt is a unit struct with a `build` function producing the prompt
//! text and a `parse_response` function turning the model's reply back into
//! typed data. Models do not reliably follow output formats, so every parser
//! accepts either the JSON shape the prompt asks for or loose plain text.

use crate::scorer::ScoreValue;
use crate::task::{EvaluationTask, QaPair};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::ops::RangeInclusive;

/// Scores the rubric scale allows.
pub const SCORE_RANGE: RangeInclusive<f64> = 1.0..=5.0;

static LIST_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:[-*•]|\d+[.)]|[Qq]\d+[.):]?)\s*").expect("Invalid list marker regex")
});

static SCORE_FIELD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)score\s*(?:of|is)?\s*[:=]?\s*\**\s*(\d+(?:\.\d+)?)")
        .expect("Invalid score regex")
});

static BARE_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(\d+(?:\.\d+)?)\s*(?:/\s*5)?\s*$").expect("Invalid number regex"));

/// Settings prompt - asks the model to choose suitable settings from a catalog
///
/// # Example
/// ```
/// use persona_harness::oracle::prompts::SettingsPrompt;
///
/// let candidates = vec!["a courtroom".to_string(), "a hospital".to_string()];
/// let prompt = SettingsPrompt::build("A night-shift nurse", &candidates);
/// assert!(prompt.contains("A night-shift nurse"));
/// assert!(prompt.contains("- a hospital"));
///
/// let picked = SettingsPrompt::parse_response(r#"["a hospital"]"#);
/// assert_eq!(picked, vec!["a hospital".to_string()]);
/// ```
pub struct SettingsPrompt;

impl SettingsPrompt {
    pub fn build(persona: &str, candidates: &[String]) -> String {
        format!(
            "You are designing an evaluation of a role-playing agent.\n\
             PERSONA: {}\n\n\
             CANDIDATE SETTINGS:\n{}\n\n\
             Select the settings in which this persona is most likely to be found.\n\
             Respond with a JSON array of the chosen settings, copied verbatim.",
            persona,
            bullet_list(candidates)
        )
    }

    pub fn parse_response(response: &str) -> Vec<String> {
        string_list(response)
    }
}

/// Question prompt - asks for a batch of questions probing one task
pub struct QuestionPrompt;

impl QuestionPrompt {
    pub fn build(persona: &str, settings: &[String], task: EvaluationTask, count: usize) -> String {
        let settings = if settings.is_empty() {
            "- any setting natural to the persona".to_string()
        } else {
            bullet_list(settings)
        };
        format!(
            "You are writing questions to test whether an agent stays in character.\n\
             PERSONA: {}\n\
             SETTINGS:\n{}\n\
             TASK: {}\n\
             TASK DESCRIPTION: {}\n\n\
             Write {} distinct questions addressed directly to the persona, each \
             grounded in one of the settings.\n\
             Respond with a JSON array of {} strings.",
            persona,
            settings,
            task,
            task.description(),
            count,
            count
        )
    }

    /// Parsed questions, truncated to `count`.
    pub fn parse_response(response: &str, count: usize) -> Vec<String> {
        let mut questions = string_list(response);
        questions.truncate(count);
        questions
    }
}

/// Mutation prompt - rewrites a bank template for a persona and setting
///
/// # Example
/// ```
/// use persona_harness::oracle::prompts::MutationPrompt;
///
/// let prompt = MutationPrompt::build("A pilot", "a cockpit", "What do you check first?");
/// assert!(prompt.contains("a cockpit"));
/// assert_eq!(
///     MutationPrompt::parse_response("Question: \"What do you check before takeoff?\""),
///     Some("What do you check before takeoff?".to_string())
/// );
/// ```
pub struct MutationPrompt;

impl MutationPrompt {
    pub fn build(persona: &str, setting: &str, template: &str) -> String {
        format!(
            "Rewrite the question template below so it is addressed to the persona \
             and set in the given setting. Keep what the template is testing.\n\
             PERSONA: {}\n\
             SETTING: {}\n\
             TEMPLATE: {}\n\n\
             Respond with the rewritten question only.",
            persona, setting, template
        )
    }

    pub fn parse_response(response: &str) -> Option<String> {
        let line = response.lines().map(str::trim).find(|l| !l.is_empty())?;
        let line = strip_label(line, "question");
        let line = line.trim().trim_matches('"').trim();
        if line.is_empty() {
            None
        } else {
            Some(line.to_string())
        }
    }
}

/// Scoring prompt - grades one answer against a task rubric
pub struct ScoringPrompt;

#[derive(Deserialize)]
struct ScoreReply {
    score: serde_json::Value,
    #[serde(default, alias = "rationale", alias = "justification")]
    reason: Option<String>,
}

impl ScoringPrompt {
    pub fn build(persona: &str, task: EvaluationTask, rubric: &str, qa: &QaPair) -> String {
        format!(
            "You are an impartial judge of how well an agent plays a persona.\n\
             PERSONA: {}\n\
             TASK: {}\n\n\
             RUBRIC:\n{}\n\n\
             QUESTION: {}\n\
             ANSWER: {}\n\n\
             Score the answer from 1 to 5 using the rubric.\n\
             Respond with JSON: {{\"score\": <number>, \"reason\": \"<one sentence>\"}}",
            persona,
            task,
            rubric.trim(),
            qa.question,
            qa.answer
        )
    }

    /// Score and rationale. Replies with no recognisable score, or with a
    /// score outside [`SCORE_RANGE`], come back as [`ScoreValue::Unparsed`]
    /// holding the raw text.
    pub fn parse_response(response: &str) -> (ScoreValue, String) {
        let trimmed = response.trim();

        if let Some(reply) = json_slice(response, '{', '}')
            .and_then(|slice| serde_json::from_str::<ScoreReply>(slice).ok())
        {
            let score = match &reply.score {
                serde_json::Value::Number(n) => n.as_f64(),
                serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
                _ => None,
            };
            if let Some(score) = score {
                return match in_range(score) {
                    Some(score) => (ScoreValue::Numeric(score), reply.reason.unwrap_or_default()),
                    None => (ScoreValue::Unparsed(trimmed.to_string()), String::new()),
                };
            }
        }

        let captured = SCORE_FIELD
            .captures(trimmed)
            .or_else(|| BARE_NUMBER.captures(trimmed))
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<f64>().ok())
            .and_then(in_range);

        match captured {
            Some(score) => (ScoreValue::Numeric(score), trimmed.to_string()),
            None => (ScoreValue::Unparsed(trimmed.to_string()), String::new()),
        }
    }
}

fn in_range(score: f64) -> Option<f64> {
    SCORE_RANGE.contains(&score).then_some(score)
}

fn bullet_list(items: &[String]) -> String {
    items
        .iter()
        .map(|item| format!("- {}", item))
        .collect::<Vec<_>>()
        .join("\n")
}

/// A JSON array of strings if one is embedded in `response`, otherwise the
/// non-empty lines with list markers stripped.
fn string_list(response: &str) -> Vec<String> {
    if let Some(items) = json_slice(response, '[', ']')
        .and_then(|slice| serde_json::from_str::<Vec<String>>(slice).ok())
    {
        return items
            .into_iter()
            .map(|item| item.trim().to_string())
            .filter(|item| !item.is_empty())
            .collect();
    }

    response
        .lines()
        .map(|line| LIST_MARKER.replace(line, "").trim().trim_matches('"').to_string())
        .filter(|line| !line.is_empty() && !line.starts_with("```"))
        .collect()
}

fn json_slice(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    (end > start).then(|| &text[start..=end])
}

fn strip_label<'a>(line: &'a str, label: &str) -> &'a str {
    match line.split_once(':') {
        Some((head, rest)) if head.trim().eq_ignore_ascii_case(label) => rest,
        _ => line,
    }
}
