use std::collections::BTreeSet;
use nb_cluster::{ClusteredArticle, ViewCluster};
use nb_core::topics::top_topics;
use nb_core::SentimentLabel;
use serde::Serialize;

/// Per-cluster digest used both for rendering and for the insight prompt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterSummary {
    pub title: String,
    pub summary: String,
    pub sentiment: f64,
    #[serde(skip)]
    pub label: SentimentLabel,
    pub topics: Vec<String>,
    pub sources: Vec<String>,
    pub article_count: usize,
}

/// The newest member. Undated articles sort last; ties keep cluster order.
pub fn representative(cluster: &ViewCluster) -> Option<&ClusteredArticle> {
    let mut best: Option<&ClusteredArticle> = None;
    for member in &cluster.members {
        match best {
            Some(current) if member.article.published_at <= current.article.published_at => {}
            _ => best = Some(member),
        }
    }
    best
}

/// Mean of the finite sentiment scores, 0.0 when there are none.
pub fn average_sentiment<I: IntoIterator<Item = f64>>(scores: I) -> f64 {
    let (sum, count) = scores
        .into_iter()
        .filter(|s| s.is_finite())
        .fold((0.0, 0usize), |(sum, count), s| (sum + s, count + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

impl ClusterSummary {
    /// `None` for an empty cluster.
    pub fn from_cluster(cluster: &ViewCluster) -> Option<Self> {
        let main = representative(cluster)?;
        let sentiment = average_sentiment(cluster.members.iter().map(|m| m.analysis.sentiment_score));
        let topics = top_topics(cluster.members.iter().flat_map(|m| m.analysis.topics.iter()), 3);
        let sources: BTreeSet<String> = cluster.members.iter()
            .filter_map(|m| m.article.source.clone())
            .filter(|s| !s.trim().is_empty())
            .collect();

        Some(Self {
            title: main.article.title.clone(),
            summary: main.analysis.summary.clone(),
            sentiment,
            label: SentimentLabel::from_score(sentiment),
            topics,
            sources: sources.into_iter().collect(),
            article_count: cluster.len(),
        })
    }
}

/// Sentiment label of the mean cluster sentiment.
pub fn overall_label(summaries: &[ClusterSummary]) -> SentimentLabel {
    SentimentLabel::from_score(average_sentiment(summaries.iter().map(|s| s.sentiment)))
}
