use async_trait::async_trait;
use chrono::Utc;
use nb_core::{
    AnalysisOutcome, AnalysisRecord, Article, Cluster, ClusterMembership, Error, NewArticle,
    NewCluster, NewsBrief, Result, Store, UnitOfWork,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Tables held by the in-memory store.
#[derive(Debug, Clone, Default)]
pub struct MemoryState {
    articles: BTreeMap<i64, Article>,
    analyses: BTreeMap<i64, AnalysisRecord>,
    clusters: BTreeMap<i64, Cluster>,
    memberships: Vec<ClusterMembership>,
    briefs: Vec<NewsBrief>,
    next_article_id: i64,
    next_cluster_id: i64,
}

impl MemoryState {
    fn insert_article(&mut self, article: &NewArticle) -> Result<i64> {
        if self.articles.values().any(|a| a.url == article.url) {
            return Err(Error::Storage(format!("Article already stored: {}", article.url)));
        }
        self.next_article_id += 1;
        let id = self.next_article_id;
        self.articles.insert(id, Article {
            id,
            url: article.url.clone(),
            title: article.title.clone(),
            content: article.content.clone(),
            summary: article.summary.clone(),
            published_at: article.published_at,
            source: article.source.clone(),
            analyzed: false,
        });
        Ok(id)
    }

    fn pending_articles(&self, limit: Option<usize>) -> Vec<Article> {
        let mut articles: Vec<Article> = self.articles.values()
            .filter(|a| !self.analyses.contains_key(&a.id))
            .filter(|a| a.content.is_some() || a.summary.is_some())
            .cloned()
            .collect();
        // newest first, undated last
        articles.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        if let Some(limit) = limit {
            articles.truncate(limit);
        }
        articles
    }

    fn apply_analysis(&mut self, outcome: &AnalysisOutcome) -> Result<()> {
        let article_id = outcome.record.article_id;
        if self.analyses.contains_key(&article_id) {
            return Err(Error::Storage(format!("Article {} already has an analysis", article_id)));
        }
        let article = self.articles.get_mut(&article_id)
            .ok_or_else(|| Error::Storage(format!("Unknown article {}", article_id)))?;
        if outcome.mark_source_analyzed {
            article.analyzed = true;
        }
        self.analyses.insert(article_id, outcome.record.clone());
        Ok(())
    }

    fn insert_cluster(&mut self, cluster: &NewCluster) -> i64 {
        self.next_cluster_id += 1;
        let id = self.next_cluster_id;
        self.clusters.insert(id, Cluster {
            id,
            name: cluster.name.clone(),
            description: cluster.description.clone(),
            run_id: cluster.run_id.clone(),
            created_at: Utc::now(),
        });
        id
    }

    fn insert_membership(&mut self, membership: &ClusterMembership) -> Result<()> {
        if !self.clusters.contains_key(&membership.cluster_id) {
            return Err(Error::Storage(format!("Unknown cluster {}", membership.cluster_id)));
        }
        if !self.articles.contains_key(&membership.article_id) {
            return Err(Error::Storage(format!("Unknown article {}", membership.article_id)));
        }
        self.memberships.push(membership.clone());
        Ok(())
    }
}

/// Process-local record store. Cloning shares the same tables.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<MemoryState>>,
    fail_writes: Arc<AtomicBool>,
    fail_commits: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent write fail with a storage error until reset.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Makes `commit` fail while staged writes still succeed.
    pub fn set_fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    pub fn unit(&self) -> MemoryUnitOfWork {
        MemoryUnitOfWork {
            state: self.state.clone(),
            fail_writes: self.fail_writes.clone(),
            fail_commits: self.fail_commits.clone(),
            staged: None,
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn unit_of_work(&self) -> Result<Box<dyn UnitOfWork>> {
        Ok(Box::new(self.unit()))
    }
}

/// Unit of work over a [`MemoryStore`]. A transaction works on a private
/// copy of the tables that replaces the shared state on commit.
pub struct MemoryUnitOfWork {
    state: Arc<RwLock<MemoryState>>,
    fail_writes: Arc<AtomicBool>,
    fail_commits: Arc<AtomicBool>,
    staged: Option<MemoryState>,
}

impl MemoryUnitOfWork {
    async fn read<T>(&self, f: impl FnOnce(&MemoryState) -> T) -> T {
        match &self.staged {
            Some(staged) => f(staged),
            None => f(&*self.state.read().await),
        }
    }

    async fn write<T>(&mut self, f: impl FnOnce(&mut MemoryState) -> Result<T>) -> Result<T> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::Storage("Write rejected by memory store".to_string()));
        }
        match &mut self.staged {
            Some(staged) => f(staged),
            None => f(&mut *self.state.write().await),
        }
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn begin(&mut self) -> Result<()> {
        if self.staged.is_some() {
            return Err(Error::Storage("Transaction already open".to_string()));
        }
        self.staged = Some(self.state.read().await.clone());
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        let staged = self.staged.take()
            .ok_or_else(|| Error::Storage("No transaction to commit".to_string()))?;
        if self.fail_writes.load(Ordering::SeqCst) || self.fail_commits.load(Ordering::SeqCst) {
            return Err(Error::Storage("Commit rejected by memory store".to_string()));
        }
        *self.state.write().await = staged;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.staged = None;
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.staged.is_some()
    }

    async fn insert_article(&mut self, article: &NewArticle) -> Result<i64> {
        self.write(|state| state.insert_article(article)).await
    }

    async fn get_article(&mut self, id: i64) -> Result<Option<Article>> {
        Ok(self.read(|state| state.articles.get(&id).cloned()).await)
    }

    async fn pending_articles(&mut self, limit: Option<usize>) -> Result<Vec<Article>> {
        Ok(self.read(|state| state.pending_articles(limit)).await)
    }

    async fn analyzed_articles(&mut self) -> Result<Vec<Article>> {
        Ok(self.read(|state| {
            state.articles.values()
                .filter(|a| a.analyzed && state.analyses.contains_key(&a.id))
                .cloned()
                .collect()
        }).await)
    }

    async fn find_analysis(&mut self, article_id: i64) -> Result<Option<AnalysisRecord>> {
        Ok(self.read(|state| state.analyses.get(&article_id).cloned()).await)
    }

    async fn analyses(&mut self) -> Result<Vec<AnalysisRecord>> {
        Ok(self.read(|state| state.analyses.values().cloned().collect()).await)
    }

    async fn apply_analysis(&mut self, outcome: &AnalysisOutcome) -> Result<()> {
        self.write(|state| state.apply_analysis(outcome)).await
    }

    async fn insert_cluster(&mut self, cluster: &NewCluster) -> Result<i64> {
        self.write(|state| Ok(state.insert_cluster(cluster))).await
    }

    async fn insert_membership(&mut self, membership: &ClusterMembership) -> Result<()> {
        self.write(|state| state.insert_membership(membership)).await
    }

    async fn clusters_for_run(&mut self, run_id: &str) -> Result<Vec<Cluster>> {
        Ok(self.read(|state| {
            state.clusters.values()
                .filter(|c| c.run_id == run_id)
                .cloned()
                .collect()
        }).await)
    }

    async fn memberships(&mut self, cluster_id: i64) -> Result<Vec<ClusterMembership>> {
        Ok(self.read(|state| {
            state.memberships.iter()
                .filter(|m| m.cluster_id == cluster_id)
                .cloned()
                .collect()
        }).await)
    }

    async fn insert_brief(&mut self, brief: &NewsBrief) -> Result<i64> {
        self.write(|state| {
            state.briefs.push(brief.clone());
            Ok(state.briefs.len() as i64)
        }).await
    }

    async fn latest_brief(&mut self) -> Result<Option<NewsBrief>> {
        Ok(self.read(|state| state.briefs.last().cloned()).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_article(url: &str) -> NewArticle {
        NewArticle {
            url: url.to_string(),
            title: "Test Article".to_string(),
            content: Some("This is a test article about politics.".to_string()),
            summary: None,
            published_at: Some(Utc::now()),
            source: Some("test".to_string()),
        }
    }

    fn outcome(article_id: i64) -> AnalysisOutcome {
        AnalysisOutcome {
            record: AnalysisRecord {
                article_id,
                summary: "summary".to_string(),
                sentiment_score: 0.2,
                topics: vec!["politics".to_string()],
                entities: vec![],
                embedding: vec![0.1, 0.2],
                created_at: Utc::now(),
            },
            mark_source_analyzed: true,
        }
    }

    #[tokio::test]
    async fn test_memory_storage() {
        let store = MemoryStore::new();
        let mut uow = store.unit();
        let id = uow.insert_article(&new_article("http://test.com")).await.unwrap();
        assert_eq!(uow.pending_articles(None).await.unwrap().len(), 1);

        uow.apply_analysis(&outcome(id)).await.unwrap();
        assert!(uow.pending_articles(None).await.unwrap().is_empty());
        assert!(uow.get_article(id).await.unwrap().unwrap().analyzed);
        assert_eq!(uow.analyzed_articles().await.unwrap().len(), 1);
        assert!(uow.apply_analysis(&outcome(id)).await.is_err());
    }

    #[tokio::test]
    async fn test_rollback_discards_writes() {
        let store = MemoryStore::new();
        let mut uow = store.unit();
        uow.begin().await.unwrap();
        uow.insert_article(&new_article("http://a.com")).await.unwrap();
        assert_eq!(uow.pending_articles(None).await.unwrap().len(), 1);
        uow.rollback().await.unwrap();

        assert!(!uow.in_transaction());
        assert!(uow.pending_articles(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_commit_publishes_to_other_units() {
        let store = MemoryStore::new();
        let mut writer = store.unit();
        let mut reader = store.unit();

        writer.begin().await.unwrap();
        let cluster_id = writer.insert_cluster(&NewCluster {
            name: "a".to_string(),
            description: String::new(),
            run_id: "run-1".to_string(),
        }).await.unwrap();
        assert!(reader.clusters_for_run("run-1").await.unwrap().is_empty());
        writer.commit().await.unwrap();

        let clusters = reader.clusters_for_run("run-1").await.unwrap();
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].id, cluster_id);
    }

    #[tokio::test]
    async fn test_fail_writes() {
        let store = MemoryStore::new();
        store.set_fail_writes(true);
        let mut uow = store.unit();
        assert!(uow.insert_article(&new_article("http://a.com")).await.is_err());
        store.set_fail_writes(false);
        assert!(uow.insert_article(&new_article("http://a.com")).await.is_ok());
    }

    #[tokio::test]
    async fn test_fail_commits_discards_staged_writes() {
        let store = MemoryStore::new();
        store.set_fail_commits(true);
        let mut uow = store.unit();
        uow.begin().await.unwrap();
        uow.insert_article(&new_article("http://a.com")).await.unwrap();
        assert!(uow.commit().await.is_err());
        assert!(!uow.in_transaction());
        assert!(uow.pending_articles(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_pending_orders_newest_first() {
        let store = MemoryStore::new();
        let mut uow = store.unit();
        let mut old = new_article("http://old.com");
        old.published_at = Some(Utc::now() - chrono::Duration::days(1));
        let mut undated = new_article("http://undated.com");
        undated.published_at = None;
        uow.insert_article(&old).await.unwrap();
        uow.insert_article(&undated).await.unwrap();
        uow.insert_article(&new_article("http://new.com")).await.unwrap();

        let urls: Vec<String> = uow.pending_articles(Some(2)).await.unwrap()
            .into_iter().map(|a| a.url).collect();
        assert_eq!(urls, vec!["http://new.com", "http://old.com"]);
    }
}
