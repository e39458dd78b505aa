use std::path::{Path, PathBuf};
use nb_brief::BriefComposer;
use nb_cluster::{ClusterEngine, ClusterParams, ClusterStats};
use nb_core::{Result, ServiceConfig, UnitOfWork};
use nb_inference::{ContentAnalyzer, Models};
use tracing::info;

pub const DEFAULT_ANALYZE_LIMIT: usize = 60;

/// What one pipeline tick did.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub analyzed: usize,
    pub clustering: ClusterStats,
    /// Set when clustering succeeded and a brief was written.
    pub brief: Option<PathBuf>,
}

/// The fixed-order pipeline: analyze, cluster, compose.
#[derive(Debug)]
pub struct Pipeline {
    analyzer: ContentAnalyzer,
    engine: ClusterEngine,
    composer: BriefComposer,
}

impl Pipeline {
    pub fn new(config: &ServiceConfig, models: &Models) -> Self {
        Self {
            analyzer: ContentAnalyzer::new(config, models),
            engine: ClusterEngine::new(),
            composer: BriefComposer::new(config, models.language.clone()),
        }
    }

    pub async fn analyze_batch(&self, uow: &mut dyn UnitOfWork, limit: usize) -> Result<usize> {
        self.analyzer.analyze_batch(uow, limit).await
    }

    pub async fn run_clustering(&self, uow: &mut dyn UnitOfWork, params: &ClusterParams) -> ClusterStats {
        self.engine.run(uow, params).await
    }

    /// Groups the current analyses in view mode and writes a brief from them.
    pub async fn compose_brief(&self, uow: &mut dyn UnitOfWork, output_path: &Path) -> Result<PathBuf> {
        let clusters = self.engine.view(uow).await?;
        let brief = self.composer.compose(uow, &clusters, output_path).await?;
        Ok(PathBuf::from(brief.filename))
    }

    /// One tick. A brief is composed only after a successful clustering run.
    pub async fn run_once(&self, uow: &mut dyn UnitOfWork, output_path: &Path) -> Result<RunSummary> {
        info!("🚀 Starting news processing pipeline");

        let analyzed = self.analyze_batch(uow, DEFAULT_ANALYZE_LIMIT).await?;
        info!("Analyzed {} articles", analyzed);

        let clustering = self.run_clustering(uow, &ClusterParams::default()).await;
        let brief = if clustering.is_success() {
            info!("Created {} clusters", clustering.cluster_count);
            let path = self.compose_brief(uow, output_path).await?;
            info!("📝 Generated news brief: {}", path.display());
            Some(path)
        } else {
            info!("Clustering not performed: {}", clustering.status);
            None
        };

        info!("✅ Pipeline completed");
        Ok(RunSummary {
            analyzed,
            clustering,
            brief,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nb_core::NewArticle;
    use nb_inference::{create_models, Provider};
    use nb_storage::MemoryStore;

    fn pipeline() -> Pipeline {
        let config = ServiceConfig::default();
        let models = create_models(&config, Provider::Dummy).unwrap();
        Pipeline::new(&config, &models)
    }

    async fn seed(uow: &mut dyn UnitOfWork, count: usize) {
        for n in 0..count {
            uow.insert_article(&NewArticle {
                url: format!("https://news.example/{}", n),
                title: format!("Story {}", n),
                content: Some("Lawmakers Approve the Annual Budget after a long debate".to_string()),
                summary: None,
                published_at: None,
                source: Some("Wire".to_string()),
            }).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_run_once_skips_brief_without_enough_articles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("news_brief.md");
        let store = MemoryStore::new();
        let mut uow = store.unit();
        seed(&mut uow, 3).await;

        let summary = pipeline().run_once(&mut uow, &path).await.unwrap();
        assert_eq!(summary.analyzed, 3);
        assert_eq!(summary.clustering.status, nb_cluster::ClusterStatus::InsufficientData);
        assert!(summary.brief.is_none());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_run_once_writes_brief() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("news_brief.md");
        let store = MemoryStore::new();
        let mut uow = store.unit();
        seed(&mut uow, 12).await;

        let summary = pipeline().run_once(&mut uow, &path).await.unwrap();
        assert_eq!(summary.analyzed, 12);
        assert!(summary.clustering.is_success());
        assert_eq!(summary.brief.as_deref(), Some(path.as_path()));

        let brief = uow.latest_brief().await.unwrap().unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), brief.content);
        assert_eq!(brief.article_count, 12);
    }
}
