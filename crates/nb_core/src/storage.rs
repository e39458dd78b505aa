use async_trait::async_trait;
use crate::types::{
    AnalysisOutcome, AnalysisRecord, Article, Cluster, ClusterMembership, NewArticle, NewCluster,
    NewsBrief,
};
use crate::Result;

/// One handle on the record store, owned by the caller for the length of a
/// pipeline run and passed into each component.
///
/// Writes issued between `begin` and `commit` become visible together, or
/// not at all after `rollback`. Writes outside a transaction commit
/// immediately. Reads inside a transaction see its own uncommitted writes.
#[async_trait]
pub trait UnitOfWork: Send {
    async fn begin(&mut self) -> Result<()>;

    async fn commit(&mut self) -> Result<()>;

    /// Discards the open transaction. A no-op when none is open.
    async fn rollback(&mut self) -> Result<()>;

    fn in_transaction(&self) -> bool;

    /// Stores an article handed over by the fetcher and returns its id.
    async fn insert_article(&mut self, article: &NewArticle) -> Result<i64>;

    async fn get_article(&mut self, id: i64) -> Result<Option<Article>>;

    /// Articles with usable text and no analysis record, newest first.
    async fn pending_articles(&mut self, limit: Option<usize>) -> Result<Vec<Article>>;

    /// Articles flagged as analyzed that have an analysis record.
    async fn analyzed_articles(&mut self) -> Result<Vec<Article>>;

    async fn find_analysis(&mut self, article_id: i64) -> Result<Option<AnalysisRecord>>;

    /// Every analysis record, in article id order.
    async fn analyses(&mut self) -> Result<Vec<AnalysisRecord>>;

    /// Writes the record and flips the source article's flag together.
    async fn apply_analysis(&mut self, outcome: &AnalysisOutcome) -> Result<()>;

    async fn insert_cluster(&mut self, cluster: &NewCluster) -> Result<i64>;

    async fn insert_membership(&mut self, membership: &ClusterMembership) -> Result<()>;

    async fn clusters_for_run(&mut self, run_id: &str) -> Result<Vec<Cluster>>;

    async fn memberships(&mut self, cluster_id: i64) -> Result<Vec<ClusterMembership>>;

    async fn insert_brief(&mut self, brief: &NewsBrief) -> Result<i64>;

    async fn latest_brief(&mut self) -> Result<Option<NewsBrief>>;
}

/// A record store that hands out units of work.
#[async_trait]
pub trait Store: Send + Sync {
    fn name(&self) -> &str;

    async fn unit_of_work(&self) -> Result<Box<dyn UnitOfWork>>;
}
