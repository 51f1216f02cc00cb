//! Structured output: coercing free-form model text into typed records.
//!
//! The model is not trusted to honour a native JSON mode, so the schema is
//! shown to it as a literal example and the reply is parsed with three
//! strategies in order:
//!
//! 1. the whole (trimmed) reply as JSON
//! 2. the body of the first fenced code block
//! 3. each balanced top-level `{ ... }` span, scanning string-aware
//!
//! Every strategy must produce a JSON *object*. Records are then built with
//! serde, which rejects missing fields and wrong types instead of coercing.

use llmcraft_core::error::ExtractionError;
use llmcraft_core::message::Message;
use regex_lite::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::LazyLock;

const SNIPPET_CHARS: usize = 200;

static FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json)?\s*(.*?)\s*```").unwrap());

/// Pull the first JSON object out of `text`.
pub fn extract_json(text: &str) -> Result<serde_json::Value, ExtractionError> {
    let trimmed = text.trim();

    if let Some(value) = parse_object(trimmed) {
        return Ok(value);
    }

    if let Some(value) = FENCE_RE
        .captures(trimmed)
        .and_then(|caps| caps.get(1))
        .and_then(|body| parse_object(body.as_str()))
    {
        return Ok(value);
    }

    if let Some(value) = brace_spans(trimmed).into_iter().find_map(parse_object) {
        return Ok(value);
    }

    Err(ExtractionError::NoJson {
        snippet: text.chars().take(SNIPPET_CHARS).collect(),
    })
}

fn parse_object(candidate: &str) -> Option<serde_json::Value> {
    match serde_json::from_str::<serde_json::Value>(candidate) {
        Ok(value) if value.is_object() => Some(value),
        _ => None,
    }
}

/// Top-level `{ ... }` spans, ignoring braces inside JSON strings.
fn brace_spans(text: &str) -> Vec<&str> {
    let mut spans = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' if depth > 0 => in_string = true,
            '{' => {
                if depth == 0 {
                    start = i;
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    spans.push(&text[start..=i]);
                }
            }
            _ => {}
        }
    }
    spans
}

/// A record the model can be asked to produce.
pub trait StructuredRecord: DeserializeOwned + Serialize + Sized {
    /// Name used in error messages.
    const NAME: &'static str;

    /// Literal JSON example shown to the model.
    fn schema_example() -> &'static str;

    /// Checks serde cannot express.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }

    fn from_json(value: serde_json::Value) -> Result<Self, ExtractionError> {
        let record: Self = serde_json::from_value(value).map_err(|e| ExtractionError::Schema {
            record: Self::NAME.into(),
            reason: e.to_string(),
        })?;
        record.validate().map_err(|reason| ExtractionError::Schema {
            record: Self::NAME.into(),
            reason,
        })?;
        Ok(record)
    }
}

/// Extract and validate a record from raw model text.
pub fn extract<R: StructuredRecord>(text: &str) -> Result<R, ExtractionError> {
    R::from_json(extract_json(text)?)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSection {
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub title: String,
    pub summary: String,
    pub sections: Vec<ReportSection>,
    pub conclusion: String,
}

impl StructuredRecord for Report {
    const NAME: &'static str = "Report";

    fn schema_example() -> &'static str {
        r#"{
    "title": "Report title",
    "summary": "Report summary, under 100 words",
    "sections": [
        {"title": "Section 1 title", "content": "Section 1 content"},
        {"title": "Section 2 title", "content": "Section 2 content"}
    ],
    "conclusion": "Conclusion"
}"#
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeReview {
    /// Quality score, 1 to 10.
    pub score: u8,
    pub issues: Vec<String>,
    pub suggestions: Vec<String>,
    pub summary: String,
}

impl StructuredRecord for CodeReview {
    const NAME: &'static str = "CodeReview";

    fn schema_example() -> &'static str {
        r#"{
    "score": 8,
    "issues": ["Issue 1", "Issue 2"],
    "suggestions": ["Suggestion 1", "Suggestion 2"],
    "summary": "Overall assessment"
}"#
    }

    fn validate(&self) -> Result<(), String> {
        if (1..=10).contains(&self.score) {
            Ok(())
        } else {
            Err(format!("score must be between 1 and 10, got {}", self.score))
        }
    }
}

/// Which record a structured request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaTag {
    Report,
    CodeReview,
}

impl FromStr for SchemaTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "report" => Ok(Self::Report),
            "code_review" | "code-review" => Ok(Self::CodeReview),
            other => Err(format!("unknown schema '{other}' (expected report or code_review)")),
        }
    }
}

/// A record of either kind, tagged with its schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "schema", content = "record", rename_all = "snake_case")]
pub enum StructuredOutput {
    Report(Report),
    CodeReview(CodeReview),
}

pub const DEFAULT_REVIEW_LANGUAGE: &str = "python";

pub fn report_messages(topic: &str) -> Vec<Message> {
    vec![
        Message::system(format!(
            "You are an expert technical report writer.\n\
             Write a technical report on the given topic. Output it strictly in the \
             following JSON format and output nothing else:\n{}",
            Report::schema_example()
        )),
        Message::user(format!(
            "Write a technical report about \"{topic}\". Output JSON only."
        )),
    ]
}

pub fn review_messages(code: &str, language: &str) -> Vec<Message> {
    vec![
        Message::system(format!(
            "You are a {language} code review expert.\n\
             Review the code and output your assessment in the following JSON format, \
             outputting nothing else:\n{}",
            CodeReview::schema_example()
        )),
        Message::user(format!(
            "Review the following code, output JSON only:\n```{language}\n{code}\n```"
        )),
    ]
}
