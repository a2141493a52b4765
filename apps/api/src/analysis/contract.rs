//! Response contract — turns raw model output into a trusted `AnalysisResult`.
//!
//! Validation is all-or-nothing: the first violated rule fails the whole response.
//! Checks run in a fixed order (presence → types → score range → list lengths),
//! so the reported field is stable for a given input.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

const DIAGNOSTIC_PREVIEW_CHARS: usize = 200;

/// The validated analysis contract returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub match_score: u8, // 0 – 100
    pub missing_skills: Vec<String>,
    pub score_explanation: Vec<String>,   // 2 – 3 entries
    pub resume_improvements: Vec<String>, // exactly 3
    pub cover_letter: String,
    pub interview_questions: Vec<String>, // exactly 5
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ContractError {
    #[error("Malformed model response: {reason}")]
    MalformedResponse {
        reason: String,
        /// Leading characters of the offending text, for diagnostics.
        preview: Option<String>,
    },

    #[error("Schema violation in '{field}': {reason}")]
    SchemaViolation { field: &'static str, reason: String },
}

impl ContractError {
    fn violation(field: &'static str, reason: impl Into<String>) -> Self {
        ContractError::SchemaViolation {
            field,
            reason: reason.into(),
        }
    }
}

#[derive(Clone, Copy)]
enum FieldType {
    Number,
    StringList,
    Text,
}

/// Required fields, in validation order.
const SCHEMA: &[(&str, FieldType)] = &[
    ("matchScore", FieldType::Number),
    ("missingSkills", FieldType::StringList),
    ("scoreExplanation", FieldType::StringList),
    ("resumeImprovements", FieldType::StringList),
    ("coverLetter", FieldType::Text),
    ("interviewQuestions", FieldType::StringList),
];

/// Extracts the JSON object from `raw` and validates it against the contract.
pub fn extract_and_validate(raw: &str) -> Result<AnalysisResult, ContractError> {
    let candidate = unwrap_fences(raw.trim());

    let json_text = match (candidate.find('{'), candidate.rfind('}')) {
        (Some(start), Some(end)) if end > start => &candidate[start..=end],
        _ => {
            return Err(ContractError::MalformedResponse {
                reason: "no valid JSON found".to_string(),
                preview: None,
            })
        }
    };

    let value: Value =
        serde_json::from_str(json_text).map_err(|e| ContractError::MalformedResponse {
            reason: format!("invalid JSON: {e}"),
            preview: Some(json_text.chars().take(DIAGNOSTIC_PREVIEW_CHARS).collect()),
        })?;

    let object = value.as_object().ok_or_else(|| ContractError::MalformedResponse {
        reason: "top-level JSON value is not an object".to_string(),
        preview: Some(json_text.chars().take(DIAGNOSTIC_PREVIEW_CHARS).collect()),
    })?;

    validate(object)
}

/// Returns the content of the first ```json fence pair, else the first generic
/// fence pair, else the input unchanged.
fn unwrap_fences(text: &str) -> &str {
    fenced_block(text, "```json")
        .or_else(|| fenced_block(text, "```"))
        .unwrap_or(text)
}

fn fenced_block<'a>(text: &'a str, opening: &str) -> Option<&'a str> {
    let start = text.find(opening)? + opening.len();
    let end = text[start..].find("```")? + start;
    Some(text[start..end].trim())
}

fn validate(object: &Map<String, Value>) -> Result<AnalysisResult, ContractError> {
    for (field, _) in SCHEMA {
        if !object.contains_key(*field) {
            return Err(ContractError::violation(*field, "required field is missing"));
        }
    }

    for (field, expected) in SCHEMA {
        let value = &object[*field];
        let ok = match expected {
            FieldType::Number => value.is_number(),
            FieldType::Text => value.is_string(),
            FieldType::StringList => value
                .as_array()
                .is_some_and(|items| items.iter().all(Value::is_string)),
        };
        if !ok {
            let wanted = match expected {
                FieldType::Number => "a number",
                FieldType::Text => "a string",
                FieldType::StringList => "an array of strings",
            };
            return Err(ContractError::violation(*field, format!("expected {wanted}")));
        }
    }

    let raw_score = object["matchScore"].as_f64().unwrap_or(f64::NAN);
    if !(0.0..=100.0).contains(&raw_score) {
        return Err(ContractError::violation(
            "matchScore",
            format!("must be between 0 and 100, got {raw_score}"),
        ));
    }

    let resume_improvements = string_list(object, "resumeImprovements");
    if resume_improvements.len() != 3 {
        return Err(ContractError::violation(
            "resumeImprovements",
            format!("expected exactly 3 items, got {}", resume_improvements.len()),
        ));
    }

    let interview_questions = string_list(object, "interviewQuestions");
    if interview_questions.len() != 5 {
        return Err(ContractError::violation(
            "interviewQuestions",
            format!("expected exactly 5 items, got {}", interview_questions.len()),
        ));
    }

    let score_explanation = string_list(object, "scoreExplanation");
    if !(2..=3).contains(&score_explanation.len()) {
        return Err(ContractError::violation(
            "scoreExplanation",
            format!("expected 2 or 3 items, got {}", score_explanation.len()),
        ));
    }

    Ok(AnalysisResult {
        match_score: raw_score.round() as u8,
        missing_skills: string_list(object, "missingSkills"),
        score_explanation,
        resume_improvements,
        cover_letter: object["coverLetter"].as_str().unwrap_or_default().to_string(),
        interview_questions,
    })
}

/// Reads a field already checked to be an array of strings.
fn string_list(object: &Map<String, Value>, field: &str) -> Vec<String> {
    object
        .get(field)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}
