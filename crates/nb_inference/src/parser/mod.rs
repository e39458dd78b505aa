//! Turns a free-text model reply into analysis fields.
//!
//! Strategies are tried in order and the first that yields an object wins:
//! a fenced code block, the first balanced `{...}` in the text, the whole
//! reply as JSON, and finally per-field line matching. The last one always
//! succeeds, possibly with every field empty.

use nb_core::topics::value_to_string;
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;
use tracing::{debug, warn};

pub const MAX_TOPICS: usize = 5;

static FENCED_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)```(?:json)?\s*(\{.*?\})\s*```").unwrap());
static SUMMARY_FIELD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?im)"?summary"?(?:\*\*)?\s*:(?:\*\*)?[ \t]*(.*)"#).unwrap());
static SENTIMENT_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?im)"?sentiment(?:[_ ]score)?"?(?:\*\*)?\s*:(?:\*\*)?[ \t]*"?(-?\d+(?:\.\d*)?)"#).unwrap()
});
pub static TOPICS_FIELD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?im)"?(?:main[ \t]+)?topics"?(?:\*\*)?\s*:(?:\*\*)?[ \t]*(.*)"#).unwrap());
pub static ENTITIES_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?im)"?(?:key[_ \t]+)?entities"?(?:\*\*)?\s*:(?:\*\*)?[ \t]*(.*)"#).unwrap()
});

/// Validated analysis fields, whatever strategy produced them.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AnalysisFields {
    pub summary: String,
    pub sentiment_score: f64,
    pub topics: Vec<String>,
    pub entities: Vec<String>,
}

impl AnalysisFields {
    /// Coerces a parsed JSON object: missing or mistyped fields fall back
    /// to empty values, topics are capped and every list item stringified.
    pub fn from_object(object: &Map<String, Value>) -> Self {
        let summary = match object.get("summary") {
            None | Some(Value::Null) => String::new(),
            Some(value) => value_to_string(value).trim().to_string(),
        };

        let sentiment_score = match object.get("sentiment_score") {
            Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
            Some(Value::String(s)) => s.trim().parse::<f64>().unwrap_or(0.0),
            Some(Value::Bool(b)) => f64::from(u8::from(*b)),
            _ => 0.0,
        };
        let sentiment_score = if sentiment_score.is_finite() { sentiment_score } else { 0.0 };

        let topics = match object.get("topics") {
            Some(Value::Array(items)) => items.iter().map(value_to_string).take(MAX_TOPICS).collect(),
            Some(_) => {
                warn!("Topics field was not a list, resetting");
                Vec::new()
            }
            None => Vec::new(),
        };

        let entities = match object.get("entities") {
            Some(Value::Array(items)) => items.iter().map(value_to_string).collect(),
            Some(_) => {
                warn!("Entities field was not a list, resetting");
                Vec::new()
            }
            None => Vec::new(),
        };

        Self { summary, sentiment_score, topics, entities }
    }

    /// Number of fields holding something other than their default.
    pub fn populated_fields(&self) -> usize {
        [
            !self.summary.is_empty(),
            self.sentiment_score != 0.0,
            !self.topics.is_empty(),
            !self.entities.is_empty(),
        ]
        .iter()
        .filter(|populated| **populated)
        .count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    FencedBlock,
    EmbeddedObject,
    WholeResponse,
    LineFieldHeuristic,
}

/// Order in which strategies are attempted.
pub const STRATEGIES: [Strategy; 4] = [
    Strategy::FencedBlock,
    Strategy::EmbeddedObject,
    Strategy::WholeResponse,
    Strategy::LineFieldHeuristic,
];

impl Strategy {
    pub fn is_structured(&self) -> bool {
        !matches!(self, Strategy::LineFieldHeuristic)
    }

    pub fn apply(&self, text: &str) -> Option<AnalysisFields> {
        match self {
            Strategy::FencedBlock => FENCED_BLOCK
                .captures(text)
                .and_then(|caps| caps.get(1))
                .and_then(|m| parse_object(m.as_str())),
            Strategy::EmbeddedObject => first_object(text).and_then(parse_object),
            Strategy::WholeResponse => parse_object(text.trim()),
            Strategy::LineFieldHeuristic => Some(extract_fields(text)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedResponse {
    pub strategy: Strategy,
    pub fields: AnalysisFields,
}

/// Runs the strategy chain over a model reply. Never fails.
pub fn parse_response(text: &str) -> ParsedResponse {
    for strategy in STRATEGIES {
        if let Some(fields) = strategy.apply(text) {
            debug!("Parsed model response with {:?}", strategy);
            return ParsedResponse { strategy, fields };
        }
    }
    // the heuristic strategy always yields
    ParsedResponse {
        strategy: Strategy::LineFieldHeuristic,
        fields: AnalysisFields::default(),
    }
}

fn parse_object(candidate: &str) -> Option<AnalysisFields> {
    match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Object(object)) => Some(AnalysisFields::from_object(&object)),
        _ => None,
    }
}

/// The first balanced `{...}` span, skipping braces inside JSON strings.
fn first_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, c) in text[start..].char_indices() {
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
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// A `Label:` value with markdown emphasis and JSON punctuation removed.
/// A quoted value ends at its closing quote.
fn clean_scalar(value: &str) -> &str {
    let value = value.trim().trim_start_matches('*').trim();
    if let Some(quoted) = value.strip_prefix('"') {
        let mut escaped = false;
        for (i, c) in quoted.char_indices() {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => return quoted[..i].trim(),
                _ => {}
            }
        }
        return quoted.trim_end_matches(',').trim();
    }
    value.trim_end_matches(',').trim()
}

fn extract_fields(text: &str) -> AnalysisFields {
    let summary = SUMMARY_FIELD
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| clean_scalar(m.as_str()).to_string())
        .unwrap_or_default();

    let sentiment_score = SENTIMENT_FIELD
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().parse::<f64>().unwrap_or_else(|e| {
            warn!("Could not read sentiment '{}': {}", m.as_str(), e);
            0.0
        }))
        .unwrap_or(0.0);

    let fields = AnalysisFields {
        summary,
        sentiment_score,
        topics: extract_list_field(text, &TOPICS_FIELD),
        entities: extract_list_field(text, &ENTITIES_FIELD),
    };

    match fields.populated_fields() {
        0 => warn!("Fallback extraction found no fields"),
        n => debug!("Fallback extraction found {}/4 fields", n),
    }
    fields
}

/// `**AI**` -> `AI`. A lone leading `*` is left alone; it may be a bullet.
fn strip_bold(value: &str) -> &str {
    let value = value.trim();
    let value = value.strip_prefix("**").unwrap_or(value);
    value.strip_suffix("**").unwrap_or(value).trim()
}

fn strip_bullet(line: &str) -> Option<&str> {
    let line = strip_bold(line);
    line.strip_prefix('-')
        .or_else(|| line.strip_prefix('*'))
        .or_else(|| line.strip_prefix('•'))
        .map(strip_bold)
}

fn split_items(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|item| strip_bold(item).trim_matches(|c| matches!(c, '"' | '\'' | '[' | ']')).trim())
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// Reads a list after a `Label:` match. Prefers a bracketed JSON list, then
/// a run of bullet lines, then comma-separated items. At most five items.
pub fn extract_list_field(text: &str, pattern: &Regex) -> Vec<String> {
    let Some(caps) = pattern.captures(text) else {
        return Vec::new();
    };
    let (Some(whole), Some(value)) = (caps.get(0), caps.get(1)) else {
        return Vec::new();
    };
    let value = strip_bold(value.as_str()).trim_end_matches(',').trim();

    if value.starts_with('[') && value.ends_with(']') {
        let items = match serde_json::from_str::<Value>(value) {
            Ok(Value::Array(items)) => items.iter().map(value_to_string).collect(),
            _ => split_items(&value[1..value.len() - 1]),
        };
        return items.into_iter().take(MAX_TOPICS).collect();
    }

    let following = text[whole.end()..].lines();
    let mut bullets = Vec::new();
    for line in std::iter::once(value).chain(following) {
        let line = line.trim();
        match strip_bullet(line) {
            Some(item) => {
                if !item.is_empty() {
                    bullets.push(item.to_string());
                }
            }
            None if line.is_empty() => continue,
            None => break,
        }
    }
    if !bullets.is_empty() {
        bullets.truncate(MAX_TOPICS);
        return bullets;
    }

    let mut items = split_items(value);
    items.truncate(MAX_TOPICS);
    items
}

#[cfg(test)]
mod tests {
    use super::*;

    const OBJECT: &str = r#"{
  "summary": "Parliament passed the budget.",
  "sentiment_score": 0.4,
  "topics": ["budget", "parliament"],
  "entities": ["Parliament", "Treasury"]
}"#;

    fn expected() -> AnalysisFields {
        AnalysisFields {
            summary: "Parliament passed the budget.".to_string(),
            sentiment_score: 0.4,
            topics: vec!["budget".to_string(), "parliament".to_string()],
            entities: vec!["Parliament".to_string(), "Treasury".to_string()],
        }
    }

    #[test]
    fn test_same_result_across_wrappings() {
        let fenced = format!("Here you go:\n```json\n{}\n```\nThanks", OBJECT);
        let embedded = format!("Sure! {} Hope that helps.", OBJECT);

        let parsed = parse_response(&fenced);
        assert_eq!(parsed.strategy, Strategy::FencedBlock);
        assert_eq!(parsed.fields, expected());

        let parsed = parse_response(&embedded);
        assert_eq!(parsed.strategy, Strategy::EmbeddedObject);
        assert_eq!(parsed.fields, expected());

        let parsed = parse_response(OBJECT);
        assert_eq!(parsed.strategy, Strategy::EmbeddedObject);
        assert_eq!(parsed.fields, expected());
        assert_eq!(Strategy::WholeResponse.apply(OBJECT), Some(expected()));
    }

    #[test]
    fn test_fence_without_language_tag() {
        let fenced = format!("```\n{}\n```", OBJECT);
        assert_eq!(Strategy::FencedBlock.apply(&fenced), Some(expected()));
    }

    #[test]
    fn test_nested_braces_in_strings() {
        let text = r#"Result: {"summary": "Uses {curly} braces", "topics": ["a"]} trailing"#;
        let parsed = parse_response(text);
        assert!(parsed.strategy.is_structured());
        assert_eq!(parsed.fields.summary, "Uses {curly} braces");
    }

    #[test]
    fn test_validation_coerces_fields() {
        let text = r#"{"summary": 42, "sentiment_score": "-0.75", "topics": ["a", 2, true, "d", "e", "f", "g"], "entities": "nobody"}"#;
        let fields = parse_response(text).fields;
        assert_eq!(fields.summary, "42");
        assert_eq!(fields.sentiment_score, -0.75);
        assert_eq!(fields.topics, vec!["a", "2", "true", "d", "e"]);
        assert!(fields.entities.is_empty());
    }

    #[test]
    fn test_invalid_sentiment_defaults() {
        let fields = parse_response(r#"{"sentiment_score": "very positive", "topics": "x"}"#).fields;
        assert_eq!(fields.sentiment_score, 0.0);
        assert!(fields.topics.is_empty());
        assert_eq!(fields.summary, "");
    }

    #[test]
    fn test_non_object_json_falls_through() {
        let parsed = parse_response(r#"["not", "an", "object"]"#);
        assert_eq!(parsed.strategy, Strategy::LineFieldHeuristic);
    }

    #[test]
    fn test_line_fallback() {
        let text = "Summary: Storms hit the coast.\nSentiment Score: -0.6\nTopics: weather, \"coast\", 'storms'\nKey Entities: [\"NOAA\", \"Florida\"]";
        let parsed = parse_response(text);
        assert_eq!(parsed.strategy, Strategy::LineFieldHeuristic);
        assert_eq!(parsed.fields.summary, "Storms hit the coast.");
        assert_eq!(parsed.fields.sentiment_score, -0.6);
        assert_eq!(parsed.fields.topics, vec!["weather", "coast", "storms"]);
        assert_eq!(parsed.fields.entities, vec!["NOAA", "Florida"]);
    }

    #[test]
    fn test_broken_json_uses_line_fallback() {
        let text = r#"{"summary": "Markets rallied", "sentiment_score": 0.5, "topics": ["stocks", "#;
        let parsed = parse_response(text);
        assert_eq!(parsed.strategy, Strategy::LineFieldHeuristic);
        assert_eq!(parsed.fields.summary, "Markets rallied");
        assert_eq!(parsed.fields.sentiment_score, 0.5);
    }

    #[test]
    fn test_plain_text_yields_empty_fields() {
        let parsed = parse_response("I cannot help with that.");
        assert_eq!(parsed.strategy, Strategy::LineFieldHeuristic);
        assert_eq!(parsed.fields.populated_fields(), 0);
    }

    #[test]
    fn test_extract_list_field_bullets() {
        let topics = extract_list_field("Topics: - AI\n- Policy\n- Markets", &TOPICS_FIELD);
        assert_eq!(topics, vec!["AI", "Policy", "Markets"]);
    }

    #[test]
    fn test_extract_list_field_bullets_on_following_lines() {
        let text = "Topics:\n* AI\n\n• Policy\nEntities: OpenAI";
        assert_eq!(extract_list_field(text, &TOPICS_FIELD), vec!["AI", "Policy"]);
        assert_eq!(extract_list_field(text, &ENTITIES_FIELD), vec!["OpenAI"]);
    }

    #[test]
    fn test_bold_labels() {
        assert_eq!(
            extract_list_field("**Topics:** AI, Policy", &TOPICS_FIELD),
            vec!["AI", "Policy"]
        );
        assert_eq!(
            extract_list_field("**Key Entities**: OpenAI, EU", &ENTITIES_FIELD),
            vec!["OpenAI", "EU"]
        );
        assert_eq!(
            extract_list_field("**Topics:**\n- **AI**\n- Policy", &TOPICS_FIELD),
            vec!["AI", "Policy"]
        );
        assert_eq!(
            extract_list_field("Topics: * AI\n* Policy", &TOPICS_FIELD),
            vec!["AI", "Policy"]
        );

        let parsed = parse_response(
            "**Summary:** Rates rise again.\n**Sentiment score:** -0.3\n**Topics:** economy, rates\n**Key Entities:** Fed",
        );
        assert_eq!(parsed.strategy, Strategy::LineFieldHeuristic);
        assert_eq!(parsed.fields.summary, "Rates rise again.");
        assert_eq!(parsed.fields.sentiment_score, -0.3);
        assert_eq!(parsed.fields.topics, vec!["economy", "rates"]);
        assert_eq!(parsed.fields.entities, vec!["Fed"]);
    }

    #[test]
    fn test_extract_list_field_caps_at_five() {
        let text = "Topics: a, b, c, d, e, f";
        assert_eq!(extract_list_field(text, &TOPICS_FIELD).len(), 5);
        let text = "Topics: [\"a\", \"b\", \"c\", \"d\", \"e\", \"f\"]";
        assert_eq!(extract_list_field(text, &TOPICS_FIELD).len(), 5);
    }

    #[test]
    fn test_extract_list_field_malformed_brackets() {
        let text = "Topics: ['AI', 'Policy']";
        assert_eq!(extract_list_field(text, &TOPICS_FIELD), vec!["AI", "Policy"]);
        assert!(extract_list_field("nothing here", &TOPICS_FIELD).is_empty());
    }
}
