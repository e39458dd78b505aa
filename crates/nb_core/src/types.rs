use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An article as produced by the external fetcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: i64,
    pub url: String,
    pub title: String,
    pub content: Option<String>,
    pub summary: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    /// Name of the feed the article came from.
    pub source: Option<String>,
    #[serde(default)]
    pub analyzed: bool,
}

impl Article {
    /// Text to analyze: the content when present, otherwise the feed summary.
    pub fn analysis_text(&self) -> Option<&str> {
        [self.content.as_deref(), self.summary.as_deref()]
            .into_iter()
            .flatten()
            .find(|text| !text.trim().is_empty())
    }
}

/// Article fields supplied by the producer; the store assigns the id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewArticle {
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub source: Option<String>,
}

/// Structured metadata derived from one article. At most one per article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub article_id: i64,
    pub summary: String,
    pub sentiment_score: f64,
    pub topics: Vec<String>,
    pub entities: Vec<String>,
    pub embedding: Vec<f32>,
    pub created_at: DateTime<Utc>,
}

/// State transition produced by a successful analysis. The store applies
/// both halves in one write so they cannot diverge.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisOutcome {
    pub record: AnalysisRecord,
    pub mark_source_analyzed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub run_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewCluster {
    pub name: String,
    pub description: String,
    pub run_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterMembership {
    pub cluster_id: i64,
    pub article_id: i64,
    pub similarity_score: f64,
}

/// A rendered brief. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsBrief {
    pub filename: String,
    pub content: String,
    pub article_count: usize,
    pub cluster_count: usize,
    pub created_at: DateTime<Utc>,
}

/// Coarse sentiment bucket used in briefs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Positive,
    Negative,
    Neutral,
}

impl SentimentLabel {
    pub fn from_score(score: f64) -> Self {
        if score > 0.3 {
            Self::Positive
        } else if score < -0.3 {
            Self::Negative
        } else {
            Self::Neutral
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Negative => "negative",
            Self::Neutral => "neutral",
        }
    }

    pub fn capitalized(&self) -> &'static str {
        match self {
            Self::Positive => "Positive",
            Self::Negative => "Negative",
            Self::Neutral => "Neutral",
        }
    }
}

impl std::fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
