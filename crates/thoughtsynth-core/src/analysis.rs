//! Parsing of free-form model output into a fixed-shape [`Analysis`].
//!
//! Language models often wrap the requested JSON in prose or code fences.
//! [`parse_analysis`] scans the response for the first balanced `{...}`
//! object that parses as JSON, then coerces it field by field:
//!
//! | Field | Absent / wrong type |
//! |-------|---------------------|
//! | `summary` | `""` |
//! | every list field | `[]` |
//! | non-string list entries | dropped |
//!
//! The result never carries `null`, regardless of what the provider sent.

use serde_json::Value;
use thiserror::Error;

use crate::models::Analysis;

/// Tag that marks an analysis produced without a language model.
pub const UNPROCESSED_TAG: &str = "unprocessed";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AnalysisParseError {
    #[error("no JSON object found in model response")]
    NoJsonObject,
}

/// Parse a model response into an [`Analysis`].
pub fn parse_analysis(response: &str) -> Result<Analysis, AnalysisParseError> {
    let value = find_json_object(response).ok_or(AnalysisParseError::NoJsonObject)?;
    Ok(coerce_analysis(&value))
}

/// Return the first balanced `{...}` span in `text` that parses as a JSON object.
///
/// Braces inside JSON string literals are ignored while balancing. A span
/// that balances but fails to parse is skipped and scanning resumes at the
/// next opening brace.
pub fn find_json_object(text: &str) -> Option<Value> {
    let bytes = text.as_bytes();
    let mut start = 0;
    while let Some(offset) = text[start..].find('{') {
        let open = start + offset;
        if let Some(close) = balanced_end(bytes, open) {
            if let Ok(value @ Value::Object(_)) = serde_json::from_str(&text[open..=close]) {
                return Some(value);
            }
        }
        start = open + 1;
    }
    None
}

/// Index of the `}` matching the `{` at `open`, if any.
fn balanced_end(bytes: &[u8], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(open) {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Coerce an arbitrary JSON value into an [`Analysis`].
pub fn coerce_analysis(value: &Value) -> Analysis {
    Analysis {
        summary: value
            .get("summary")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        core_concepts: string_list(value, "coreConcepts"),
        key_insights: string_list(value, "keyInsights"),
        notable_quotes: string_list(value, "notableQuotes"),
        related_topics: string_list(value, "relatedTopics"),
        actionable_takeaways: string_list(value, "actionableTakeaways"),
        tags: string_list(value, "tags"),
    }
}

fn string_list(value: &Value, key: &str) -> Vec<String> {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Labeled stand-in analysis used when no language model is configured.
///
/// Every list is non-empty and `tags` always contains [`UNPROCESSED_TAG`],
/// so downstream tag creation and storage behave the same as with a live
/// model.
pub fn placeholder_analysis(title: &str, credential_env: &str) -> Analysis {
    Analysis {
        summary: format!(
            "Analysis of \"{}\": This content requires AI analysis. \
             Set {} to enable full content analysis.",
            title, credential_env
        ),
        core_concepts: vec![
            "Content Analysis".into(),
            "AI Integration".into(),
            "Knowledge Synthesis".into(),
        ],
        key_insights: vec![
            "AI-powered analysis not available".into(),
            "Manual review recommended".into(),
        ],
        notable_quotes: vec!["API key required for quote extraction".into()],
        related_topics: vec![
            "AI Services".into(),
            "Content Processing".into(),
            "Knowledge Management".into(),
        ],
        actionable_takeaways: vec![format!("Set {} to enable analysis", credential_env)],
        tags: vec![
            UNPROCESSED_TAG.into(),
            "manual-review".into(),
            "ai-pending".into(),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_json_wrapped_in_prose() {
        let text = "Sure! Here is the analysis:\n```json\n{\"summary\": \"Short.\", \"tags\": [\"rust\", \"async\"]}\n```\nHope that helps.";
        let analysis = parse_analysis(text).unwrap();
        assert_eq!(analysis.summary, "Short.");
        assert_eq!(analysis.tags, vec!["rust", "async"]);
        assert!(analysis.core_concepts.is_empty());
    }

    #[test]
    fn braces_inside_strings_do_not_break_balancing() {
        let text = r#"{"summary": "uses {braces} and \"quotes\"", "keyInsights": ["a}"]}"#;
        let analysis = parse_analysis(text).unwrap();
        assert_eq!(analysis.summary, "uses {braces} and \"quotes\"");
        assert_eq!(analysis.key_insights, vec!["a}"]);
    }

    #[test]
    fn malformed_fields_coerce_to_defaults() {
        let text = r#"{"summary": 42, "coreConcepts": "not a list", "keyInsights": null,
                      "notableQuotes": ["ok", 3, {"x": 1}], "tags": []}"#;
        let analysis = parse_analysis(text).unwrap();
        assert_eq!(analysis.summary, "");
        assert!(analysis.core_concepts.is_empty());
        assert!(analysis.key_insights.is_empty());
        assert_eq!(analysis.notable_quotes, vec!["ok"]);
        assert!(analysis.related_topics.is_empty());
        assert!(analysis.actionable_takeaways.is_empty());
    }

    #[test]
    fn skips_unparseable_brace_spans() {
        let text = "set {a, b} then {\"summary\": \"real\"}";
        assert_eq!(parse_analysis(text).unwrap().summary, "real");
    }

    #[test]
    fn missing_object_is_an_error() {
        assert_eq!(
            parse_analysis("I could not analyze this."),
            Err(AnalysisParseError::NoJsonObject)
        );
        assert_eq!(
            parse_analysis("{ unterminated"),
            Err(AnalysisParseError::NoJsonObject)
        );
    }

    #[test]
    fn placeholder_is_fully_populated() {
        let analysis = placeholder_analysis("Title", "ANTHROPIC_API_KEY");
        assert!(analysis.summary.contains("Title"));
        for list in [
            &analysis.core_concepts,
            &analysis.key_insights,
            &analysis.notable_quotes,
            &analysis.related_topics,
            &analysis.actionable_takeaways,
            &analysis.tags,
        ] {
            assert!(!list.is_empty());
        }
        assert!(analysis.tags.iter().any(|t| t == UNPROCESSED_TAG));
    }
}
