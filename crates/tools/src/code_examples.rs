//! Code example lookup: a small built-in snippet catalogue.
//!
//! Keys are `(language, topic)`. The language is matched case-insensitively;
//! topics match exactly, and each entry lists its accepted spellings.

use async_trait::async_trait;
use llmcraft_core::error::ToolError;
use llmcraft_core::tool::{Tool, ToolResult};

struct Example {
    language: &'static str,
    topics: &'static [&'static str],
    code: &'static str,
}

const CATALOGUE: &[Example] = &[
    Example {
        language: "python",
        topics: &["排序", "sorting"],
        code: r#"
# Python sorting
numbers = [3, 1, 4, 1, 5, 9, 2, 6]

# sorted() returns a new list
sorted_numbers = sorted(numbers)

# list.sort() sorts in place
numbers.sort()

# custom key
students = [{"name": "Alice", "score": 85}, {"name": "Bob", "score": 92}]
students.sort(key=lambda x: x["score"], reverse=True)
"#,
    },
    Example {
        language: "python",
        topics: &["文件读写", "file io"],
        code: r#"
# Python file I/O

# read
with open("file.txt", "r", encoding="utf-8") as f:
    content = f.read()

# write
with open("output.txt", "w", encoding="utf-8") as f:
    f.write("Hello, World!")

# append
with open("log.txt", "a", encoding="utf-8") as f:
    f.write("New log entry\n")
"#,
    },
    Example {
        language: "rust",
        topics: &["排序", "sorting"],
        code: r#"
// Rust sorting
let mut numbers = vec![3, 1, 4, 1, 5, 9, 2, 6];

// in place, stable
numbers.sort();

// floats need an explicit total order
let mut scores = vec![2.5_f64, 0.5, 1.5];
scores.sort_by(|a, b| a.total_cmp(b));

// by key, descending
let mut students = vec![("Alice", 85), ("Bob", 92)];
students.sort_by_key(|&(_, score)| std::cmp::Reverse(score));
"#,
    },
    Example {
        language: "rust",
        topics: &["文件读写", "file io"],
        code: r#"
// Rust file I/O
use std::fs;
use std::io::Write;

// read
let content = fs::read_to_string("file.txt")?;

// write
fs::write("output.txt", "Hello, World!")?;

// append
let mut log = fs::OpenOptions::new().append(true).create(true).open("log.txt")?;
writeln!(log, "New log entry")?;
"#,
    },
];

/// Look up a snippet, or the error text the model should see.
pub fn find_example(language: &str, topic: &str) -> Result<&'static str, String> {
    CATALOGUE
        .iter()
        .find(|e| e.language.eq_ignore_ascii_case(language) && e.topics.contains(&topic))
        .map(|e| e.code)
        .ok_or_else(|| format!("[error]: no code example found for {language} about {topic}"))
}

pub struct CodeExampleTool;

#[async_trait]
impl Tool for CodeExampleTool {
    fn name(&self) -> &str {
        "search_code_example"
    }

    fn description(&self) -> &str {
        "Search for a code example. Use this when the user wants sample code in a \
         programming language. `language` is e.g. python, `topic` is e.g. sorting."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "language": {
                    "type": "string",
                    "description": "Programming language, e.g. 'python'"
                },
                "topic": {
                    "type": "string",
                    "description": "What the example should show, e.g. 'sorting'"
                }
            },
            "required": ["language", "topic"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let language = arguments["language"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'language' argument".into()))?;
        let topic = arguments["topic"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'topic' argument".into()))?;

        Ok(match find_example(language, topic) {
            Ok(code) => ToolResult::ok(self.name(), code),
            Err(message) => ToolResult::failed(self.name(), message),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_is_case_insensitive() {
        let code = find_example("Python", "排序").unwrap();
        assert!(code.contains("sorted("));
    }

    #[test]
    fn topic_aliases_resolve_to_same_snippet() {
        assert_eq!(find_example("python", "sorting"), find_example("python", "排序"));
    }

    #[test]
    fn unknown_pair_reports_error_text() {
        let err = find_example("cobol", "sorting").unwrap_err();
        assert_eq!(err, "[error]: no code example found for cobol about sorting");
    }

    #[tokio::test]
    async fn tool_execute() {
        let result = CodeExampleTool
            .execute(serde_json::json!({"language": "rust", "topic": "file io"}))
            .await
            .unwrap();
        assert!(result.success);
        assert!(result.output.contains("read_to_string"));

        let missing = CodeExampleTool
            .execute(serde_json::json!({"language": "go", "topic": "sorting"}))
            .await
            .unwrap();
        assert!(!missing.success);
        assert!(missing.output.starts_with("[error]"));
    }

    #[tokio::test]
    async fn missing_topic_is_invalid() {
        let err = CodeExampleTool
            .execute(serde_json::json!({"language": "python"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
