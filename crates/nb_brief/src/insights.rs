use std::sync::LazyLock;
use nb_core::SentimentLabel;
use regex::Regex;

use crate::summary::ClusterSummary;

pub const MAX_INSIGHTS: usize = 5;

static LINE_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:[-•*]|\d+[.)])(?:\s+|$)").unwrap());

pub fn build_prompt(label: SentimentLabel, digest: &str) -> String {
    format!(
        r#"I have analyzed today's news articles and found the following patterns.

Overall sentiment: {label}

Top clusters:
{digest}

Based on this data, write 3-5 key insights about today's news. Each insight is a single sentence that captures an important trend, pattern or observation across the articles. Look for major themes, significant developments, geographic or demographic patterns, contrasting perspectives and underlying causes.

Write one insight per line, without bullet points, numbering or other formatting."#
    )
}

/// Splits a model reply into insight sentences. Lines lose their bullet or
/// number marker; when no line survives, sentences longer than 20
/// characters are used instead. At most five.
pub fn parse_insights(text: &str) -> Vec<String> {
    let mut insights: Vec<String> = text
        .lines()
        .map(str::trim)
        .map(|line| LINE_MARKER.replace(line, "").trim().to_string())
        .filter(|line| !line.is_empty())
        .collect();

    if insights.is_empty() {
        insights = text
            .split('.')
            .map(str::trim)
            .filter(|sentence| sentence.chars().count() > 20)
            .map(|sentence| format!("{}.", sentence))
            .collect();
    }

    insights.truncate(MAX_INSIGHTS);
    insights
}

/// Canned insights used when the service call fails.
pub fn fallback_insights(label: SentimentLabel) -> Vec<String> {
    vec![
        "Today's news coverage shows a mix of domestic and international stories.".to_string(),
        format!("The overall tone of today's coverage is {}.", label),
        "Multiple sources are covering the same major events, indicating widespread interest.".to_string(),
    ]
}

pub fn digest(summaries: &[ClusterSummary]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(summaries)
}
