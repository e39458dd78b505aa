use std::collections::BTreeMap;
use std::fmt;
use nb_core::{AnalysisRecord, Article, ClusterMembership, NewCluster, Result, UnitOfWork};
use serde::Serialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::dbscan::{self, NOISE};
use crate::naming::{name_cluster, ClusterLabel};
use crate::similarity::{centroid, cosine_similarity, distance_matrix, Metric};

pub const VIEW_EPS: f64 = 0.3;
pub const VIEW_MIN_SAMPLES: usize = 1;

/// Settings for a persisting run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClusterParams {
    pub min_articles: usize,
    /// Maximum Euclidean distance between neighbours.
    pub eps: f64,
    pub min_samples: usize,
}

impl Default for ClusterParams {
    fn default() -> Self {
        Self {
            min_articles: 10,
            eps: 0.2,
            min_samples: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterStatus {
    InsufficientData,
    InsufficientEmbeddings,
    Success,
    Error,
}

impl ClusterStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClusterStatus::InsufficientData => "insufficient_data",
            ClusterStatus::InsufficientEmbeddings => "insufficient_embeddings",
            ClusterStatus::Success => "success",
            ClusterStatus::Error => "error",
        }
    }
}

impl fmt::Display for ClusterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Report of one persisting run. Every input article is counted exactly
/// once across clustered members, `noise_count` and `skipped_count`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterStats {
    pub status: ClusterStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    pub article_count: usize,
    pub valid_embeddings: usize,
    pub cluster_count: usize,
    pub noise_count: usize,
    pub skipped_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ClusterStats {
    fn with_status(status: ClusterStatus, article_count: usize) -> Self {
        Self {
            status,
            run_id: None,
            article_count,
            valid_embeddings: 0,
            cluster_count: 0,
            noise_count: 0,
            skipped_count: 0,
            error: None,
        }
    }

    fn failed(message: String) -> Self {
        Self {
            error: Some(message),
            ..Self::with_status(ClusterStatus::Error, 0)
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ClusterStatus::Success
    }
}

/// An article together with its analysis record.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusteredArticle {
    pub article: Article,
    pub analysis: AnalysisRecord,
}

/// A group produced by view mode. Not persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewCluster {
    pub id: i32,
    pub members: Vec<ClusteredArticle>,
}

impl ViewCluster {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

struct Points {
    members: Vec<ClusteredArticle>,
    skipped: usize,
}

impl Points {
    fn embeddings(&self) -> Vec<&[f32]> {
        self.members.iter().map(|m| m.analysis.embedding.as_slice()).collect()
    }
}

/// Keeps records whose embedding is non-empty and has the dimension of
/// the first such record.
fn consistent_points(candidates: Vec<ClusteredArticle>) -> Points {
    let mut expected: Option<usize> = None;
    let mut members = Vec::with_capacity(candidates.len());
    let mut skipped = 0;

    for candidate in candidates {
        let dimension = candidate.analysis.embedding.len();
        if dimension == 0 {
            warn!("Article {} has no embedding, skipping", candidate.article.id);
            skipped += 1;
            continue;
        }
        match expected {
            None => {
                debug!("Expected embedding dimension is {}", dimension);
                expected = Some(dimension);
            }
            Some(expected) if expected != dimension => {
                warn!(
                    "Article {} has embedding dimension {} (expected {}), skipping",
                    candidate.article.id, dimension, expected
                );
                skipped += 1;
                continue;
            }
            Some(_) => {}
        }
        members.push(candidate);
    }

    Points { members, skipped }
}

/// Similarity matrix plus density partition, shared by both modes.
pub fn partition<V: AsRef<[f32]>>(points: &[V], metric: Metric, eps: f64, min_samples: usize) -> Vec<i32> {
    dbscan::dbscan(&distance_matrix(points, metric), eps, min_samples)
}

/// Member indices per non-noise label, in ascending label order.
fn group_by_label(labels: &[i32]) -> BTreeMap<i32, Vec<usize>> {
    let mut groups: BTreeMap<i32, Vec<usize>> = BTreeMap::new();
    for (index, &label) in labels.iter().enumerate() {
        if label != NOISE {
            groups.entry(label).or_default().push(index);
        }
    }
    groups
}

/// Groups analyzed articles by embedding density.
///
/// `run` clusters raw embeddings in Euclidean space and writes one cluster
/// row per label and one membership per member under a fresh run id, all
/// in a single transaction. `view` clusters by cosine distance and returns
/// the groups without writing anything.
#[derive(Debug, Clone)]
pub struct ClusterEngine {
    view_eps: f64,
    view_min_samples: usize,
}

impl Default for ClusterEngine {
    fn default() -> Self {
        Self {
            view_eps: VIEW_EPS,
            view_min_samples: VIEW_MIN_SAMPLES,
        }
    }
}

impl ClusterEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_view_params(mut self, eps: f64, min_samples: usize) -> Self {
        self.view_eps = eps;
        self.view_min_samples = min_samples;
        self
    }

    /// Runs a persisting clustering pass. Never fails: problems are
    /// reported through [`ClusterStats::status`].
    pub async fn run(&self, uow: &mut dyn UnitOfWork, params: &ClusterParams) -> ClusterStats {
        match self.try_run(uow, params).await {
            Ok(stats) => stats,
            Err(e) => {
                error!("❌ Error during clustering: {}", e);
                ClusterStats::failed(e.to_string())
            }
        }
    }

    async fn try_run(&self, uow: &mut dyn UnitOfWork, params: &ClusterParams) -> Result<ClusterStats> {
        let articles = uow.analyzed_articles().await?;
        let article_count = articles.len();
        info!("📊 Got {} analyzed articles for clustering", article_count);

        if article_count < params.min_articles {
            warn!("Not enough articles for clustering, need at least {}", params.min_articles);
            return Ok(ClusterStats::with_status(ClusterStatus::InsufficientData, article_count));
        }

        let mut candidates = Vec::with_capacity(article_count);
        let mut missing = 0;
        for article in articles {
            match uow.find_analysis(article.id).await? {
                Some(analysis) => candidates.push(ClusteredArticle { article, analysis }),
                None => missing += 1,
            }
        }

        let points = consistent_points(candidates);
        let skipped_count = points.skipped + missing;
        let valid_embeddings = points.members.len();
        if valid_embeddings < params.min_articles {
            warn!(
                "Not enough valid embeddings for clustering: got {}, need {}",
                valid_embeddings, params.min_articles
            );
            return Ok(ClusterStats {
                valid_embeddings,
                skipped_count,
                ..ClusterStats::with_status(ClusterStatus::InsufficientEmbeddings, article_count)
            });
        }

        let labels = partition(&points.embeddings(), Metric::Euclidean, params.eps, params.min_samples);
        let cluster_count = dbscan::cluster_count(&labels);
        let noise_count = dbscan::noise_count(&labels);
        info!("🧩 Found {} clusters and {} noise points", cluster_count, noise_count);

        let run_id = Uuid::new_v4().to_string();
        uow.begin().await?;
        let result = match persist_run(uow, &run_id, &points.members, &labels).await {
            Ok(()) => uow.commit().await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            if let Err(rollback) = uow.rollback().await {
                warn!("Rollback failed: {}", rollback);
            }
            return Err(e);
        }
        info!("✅ Stored clustering run {}", run_id);

        Ok(ClusterStats {
            status: ClusterStatus::Success,
            run_id: Some(run_id),
            article_count,
            valid_embeddings,
            cluster_count,
            noise_count,
            skipped_count,
            error: None,
        })
    }

    /// Clusters every analysis with a usable embedding by cosine distance.
    /// Returns at least one group whenever one valid embedding exists.
    pub async fn view(&self, uow: &mut dyn UnitOfWork) -> Result<Vec<ViewCluster>> {
        let analyses = uow.analyses().await?;
        if analyses.is_empty() {
            warn!("No analyzed articles found for clustering");
            return Ok(Vec::new());
        }

        let mut candidates = Vec::with_capacity(analyses.len());
        for analysis in analyses {
            match uow.get_article(analysis.article_id).await? {
                Some(article) => candidates.push(ClusteredArticle { article, analysis }),
                None => warn!("Article {} not found for its analysis, skipping", analysis.article_id),
            }
        }

        let points = consistent_points(candidates);
        if points.members.is_empty() {
            warn!("No valid embeddings found for clustering");
            return Ok(Vec::new());
        }

        let mut labels = partition(
            &points.embeddings(),
            Metric::Cosine,
            self.view_eps,
            self.view_min_samples,
        );
        if labels.iter().all(|&label| label == NOISE) {
            debug!("Every point is noise, using a single cluster");
            labels = vec![0; labels.len()];
        }

        let mut groups: BTreeMap<i32, Vec<ClusteredArticle>> = BTreeMap::new();
        for (label, member) in labels.into_iter().zip(points.members) {
            if label != NOISE {
                groups.entry(label).or_default().push(member);
            }
        }

        let clusters: Vec<ViewCluster> = groups
            .into_iter()
            .map(|(id, members)| ViewCluster { id, members })
            .collect();
        info!("🧩 View clustering found {} clusters", clusters.len());
        Ok(clusters)
    }
}

async fn persist_run(
    uow: &mut dyn UnitOfWork,
    run_id: &str,
    members: &[ClusteredArticle],
    labels: &[i32],
) -> Result<()> {
    for (label, indices) in group_by_label(labels) {
        let topics: Vec<&[String]> = indices.iter()
            .map(|&i| members[i].analysis.topics.as_slice())
            .collect();
        let ClusterLabel { name, description } = name_cluster(label, &topics);

        let cluster_id = uow.insert_cluster(&NewCluster {
            name: name.clone(),
            description,
            run_id: run_id.to_string(),
        }).await?;

        let embeddings: Vec<&[f32]> = indices.iter()
            .map(|&i| members[i].analysis.embedding.as_slice())
            .collect();
        let center = centroid(&embeddings);
        for &i in &indices {
            uow.insert_membership(&ClusterMembership {
                cluster_id,
                article_id: members[i].article.id,
                similarity_score: cosine_similarity(&members[i].analysis.embedding, &center),
            }).await?;
        }
        debug!("Cluster {} '{}' has {} articles", cluster_id, name, indices.len());
    }
    Ok(())
}
