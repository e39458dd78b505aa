use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nb_core::topics::parse_topics;
use nb_core::{
    AnalysisOutcome, AnalysisRecord, Article, Cluster, ClusterMembership, Error, NewArticle,
    NewCluster, NewsBrief, Result, Store, UnitOfWork,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite, Transaction};
use std::path::{Path, PathBuf};

const MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS articles (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        url TEXT NOT NULL UNIQUE,
        title TEXT NOT NULL,
        content TEXT,
        summary TEXT,
        published_at TEXT,
        source TEXT,
        analyzed INTEGER NOT NULL DEFAULT 0
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS article_analyses (
        article_id INTEGER PRIMARY KEY REFERENCES articles(id),
        summary TEXT NOT NULL,
        sentiment_score REAL NOT NULL,
        topics TEXT NOT NULL,
        key_entities TEXT NOT NULL,
        embedding TEXT NOT NULL,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS clusters (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        description TEXT NOT NULL,
        run_id TEXT NOT NULL,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS cluster_memberships (
        cluster_id INTEGER NOT NULL REFERENCES clusters(id),
        article_id INTEGER NOT NULL REFERENCES articles(id),
        similarity_score REAL NOT NULL,
        PRIMARY KEY (cluster_id, article_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS news_briefs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        filename TEXT NOT NULL,
        content TEXT NOT NULL,
        article_count INTEGER NOT NULL,
        cluster_count INTEGER NOT NULL,
        created_at TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_clusters_run_id ON clusters(run_id)",
];

fn db_error(context: &str) -> impl Fn(sqlx::Error) -> Error + '_ {
    move |e| Error::Database(format!("{}: {}", context, e))
}

/// Runs a query against the open transaction, or the pool when none is open.
macro_rules! on_conn {
    ($uow:expr, $query:expr, $method:ident) => {
        match $uow.tx.as_mut() {
            Some(tx) => $query.$method(&mut **tx).await,
            None => $query.$method(&$uow.pool).await,
        }
    };
}

pub struct SQLiteStore {
    pool: SqlitePool,
    db_path: PathBuf,
}

impl SQLiteStore {
    pub async fn new_with_path(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .connect_with(options)
            .await
            .map_err(db_error("Failed to connect to database"))?;

        for (i, migration) in MIGRATIONS.iter().enumerate() {
            sqlx::query(migration)
                .execute(&pool)
                .await
                .map_err(|e| Error::Database(format!("Failed to run migration {}: {}", i, e)))?;
        }

        Ok(Self {
            pool,
            db_path: db_path.to_path_buf(),
        })
    }

    pub fn get_db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn unit(&self) -> SQLiteUnitOfWork {
        SQLiteUnitOfWork {
            pool: self.pool.clone(),
            tx: None,
        }
    }
}

#[async_trait]
impl Store for SQLiteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn unit_of_work(&self) -> Result<Box<dyn UnitOfWork>> {
        Ok(Box::new(self.unit()))
    }
}

/// Unit of work over a SQLite pool. An open transaction that is dropped
/// without commit is rolled back by sqlx.
pub struct SQLiteUnitOfWork {
    pool: SqlitePool,
    tx: Option<Transaction<'static, Sqlite>>,
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Database(format!("Failed to parse date '{}': {}", raw, e)))
}

fn article_from_row(row: &SqliteRow) -> Result<Article> {
    let published_at = row.get::<Option<String>, _>("published_at")
        .map(|raw| parse_timestamp(&raw))
        .transpose()?;
    Ok(Article {
        id: row.get("id"),
        url: row.get("url"),
        title: row.get("title"),
        content: row.get("content"),
        summary: row.get("summary"),
        published_at,
        source: row.get("source"),
        analyzed: row.get::<i64, _>("analyzed") != 0,
    })
}

fn analysis_from_row(row: &SqliteRow) -> Result<AnalysisRecord> {
    let entities: String = row.get("key_entities");
    let embedding: String = row.get("embedding");
    Ok(AnalysisRecord {
        article_id: row.get("article_id"),
        summary: row.get("summary"),
        sentiment_score: row.get("sentiment_score"),
        topics: parse_topics(&row.get::<String, _>("topics")),
        entities: serde_json::from_str(&entities)?,
        embedding: serde_json::from_str(&embedding)?,
        created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
    })
}

fn cluster_from_row(row: &SqliteRow) -> Result<Cluster> {
    Ok(Cluster {
        id: row.get("id"),
        name: row.get("name"),
        description: row.get("description"),
        run_id: row.get("run_id"),
        created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
    })
}

fn brief_from_row(row: &SqliteRow) -> Result<NewsBrief> {
    Ok(NewsBrief {
        filename: row.get("filename"),
        content: row.get("content"),
        article_count: row.get::<i64, _>("article_count") as usize,
        cluster_count: row.get::<i64, _>("cluster_count") as usize,
        created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
    })
}

#[async_trait]
impl UnitOfWork for SQLiteUnitOfWork {
    async fn begin(&mut self) -> Result<()> {
        if self.tx.is_some() {
            return Err(Error::Storage("Transaction already open".to_string()));
        }
        self.tx = Some(self.pool.begin().await.map_err(db_error("Failed to begin transaction"))?);
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        let tx = self.tx.take()
            .ok_or_else(|| Error::Storage("No transaction to commit".to_string()))?;
        tx.commit().await.map_err(db_error("Failed to commit transaction"))
    }

    async fn rollback(&mut self) -> Result<()> {
        match self.tx.take() {
            Some(tx) => tx.rollback().await.map_err(db_error("Failed to roll back transaction")),
            None => Ok(()),
        }
    }

    fn in_transaction(&self) -> bool {
        self.tx.is_some()
    }

    async fn insert_article(&mut self, article: &NewArticle) -> Result<i64> {
        let query = sqlx::query(
            r#"
            INSERT INTO articles (url, title, content, summary, published_at, source)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&article.url)
        .bind(&article.title)
        .bind(article.content.as_deref())
        .bind(article.summary.as_deref())
        .bind(article.published_at.map(|dt| dt.to_rfc3339()))
        .bind(article.source.as_deref());
        let result = on_conn!(self, query, execute).map_err(db_error("Failed to store article"))?;
        Ok(result.last_insert_rowid())
    }

    async fn get_article(&mut self, id: i64) -> Result<Option<Article>> {
        let query = sqlx::query("SELECT * FROM articles WHERE id = ?").bind(id);
        let row = on_conn!(self, query, fetch_optional).map_err(db_error("Failed to load article"))?;
        row.as_ref().map(article_from_row).transpose()
    }

    async fn pending_articles(&mut self, limit: Option<usize>) -> Result<Vec<Article>> {
        // SQLite treats a negative LIMIT as unbounded
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let query = sqlx::query(
            r#"
            SELECT * FROM articles
            WHERE (content IS NOT NULL OR summary IS NOT NULL)
              AND id NOT IN (SELECT article_id FROM article_analyses)
            ORDER BY published_at IS NULL, published_at DESC
            LIMIT ?
            "#,
        )
        .bind(limit);
        let rows = on_conn!(self, query, fetch_all).map_err(db_error("Failed to load pending articles"))?;
        rows.iter().map(article_from_row).collect()
    }

    async fn analyzed_articles(&mut self) -> Result<Vec<Article>> {
        let query = sqlx::query(
            r#"
            SELECT a.* FROM articles a
            JOIN article_analyses x ON x.article_id = a.id
            WHERE a.analyzed = 1
            ORDER BY a.id
            "#,
        );
        let rows = on_conn!(self, query, fetch_all).map_err(db_error("Failed to load analyzed articles"))?;
        rows.iter().map(article_from_row).collect()
    }

    async fn find_analysis(&mut self, article_id: i64) -> Result<Option<AnalysisRecord>> {
        let query = sqlx::query("SELECT * FROM article_analyses WHERE article_id = ?").bind(article_id);
        let row = on_conn!(self, query, fetch_optional).map_err(db_error("Failed to load analysis"))?;
        row.as_ref().map(analysis_from_row).transpose()
    }

    async fn analyses(&mut self) -> Result<Vec<AnalysisRecord>> {
        let query = sqlx::query("SELECT * FROM article_analyses ORDER BY article_id");
        let rows = on_conn!(self, query, fetch_all).map_err(db_error("Failed to load analyses"))?;
        rows.iter().map(analysis_from_row).collect()
    }

    async fn apply_analysis(&mut self, outcome: &AnalysisOutcome) -> Result<()> {
        let record = &outcome.record;
        let topics = serde_json::to_string(&record.topics)?;
        let entities = serde_json::to_string(&record.entities)?;
        let embedding = serde_json::to_string(&record.embedding)?;

        // both statements must land together
        let owns_tx = self.tx.is_none();
        if owns_tx {
            self.begin().await?;
        }
        let result = async {
            let insert = sqlx::query(
                r#"
                INSERT INTO article_analyses
                (article_id, summary, sentiment_score, topics, key_entities, embedding, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(record.article_id)
            .bind(&record.summary)
            .bind(record.sentiment_score)
            .bind(&topics)
            .bind(&entities)
            .bind(&embedding)
            .bind(record.created_at.to_rfc3339());
            on_conn!(self, insert, execute).map_err(db_error("Failed to store analysis"))?;

            if outcome.mark_source_analyzed {
                let update = sqlx::query("UPDATE articles SET analyzed = 1 WHERE id = ?")
                    .bind(record.article_id);
                on_conn!(self, update, execute).map_err(db_error("Failed to mark article analyzed"))?;
            }
            Ok::<_, Error>(())
        }
        .await;

        match (result, owns_tx) {
            (Ok(()), true) => self.commit().await,
            (Ok(()), false) => Ok(()),
            (Err(e), true) => {
                self.rollback().await?;
                Err(e)
            }
            (Err(e), false) => Err(e),
        }
    }

    async fn insert_cluster(&mut self, cluster: &NewCluster) -> Result<i64> {
        let query = sqlx::query(
            "INSERT INTO clusters (name, description, run_id, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&cluster.name)
        .bind(&cluster.description)
        .bind(&cluster.run_id)
        .bind(Utc::now().to_rfc3339());
        let result = on_conn!(self, query, execute).map_err(db_error("Failed to store cluster"))?;
        Ok(result.last_insert_rowid())
    }

    async fn insert_membership(&mut self, membership: &ClusterMembership) -> Result<()> {
        let query = sqlx::query(
            "INSERT INTO cluster_memberships (cluster_id, article_id, similarity_score) VALUES (?, ?, ?)",
        )
        .bind(membership.cluster_id)
        .bind(membership.article_id)
        .bind(membership.similarity_score);
        on_conn!(self, query, execute).map_err(db_error("Failed to store cluster membership"))?;
        Ok(())
    }

    async fn clusters_for_run(&mut self, run_id: &str) -> Result<Vec<Cluster>> {
        let query = sqlx::query("SELECT * FROM clusters WHERE run_id = ? ORDER BY id").bind(run_id);
        let rows = on_conn!(self, query, fetch_all).map_err(db_error("Failed to load clusters"))?;
        rows.iter().map(cluster_from_row).collect()
    }

    async fn memberships(&mut self, cluster_id: i64) -> Result<Vec<ClusterMembership>> {
        let query = sqlx::query(
            "SELECT * FROM cluster_memberships WHERE cluster_id = ? ORDER BY article_id",
        )
        .bind(cluster_id);
        let rows = on_conn!(self, query, fetch_all).map_err(db_error("Failed to load memberships"))?;
        Ok(rows.iter()
            .map(|row| ClusterMembership {
                cluster_id: row.get("cluster_id"),
                article_id: row.get("article_id"),
                similarity_score: row.get("similarity_score"),
            })
            .collect())
    }

    async fn insert_brief(&mut self, brief: &NewsBrief) -> Result<i64> {
        let query = sqlx::query(
            r#"
            INSERT INTO news_briefs (filename, content, article_count, cluster_count, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&brief.filename)
        .bind(&brief.content)
        .bind(brief.article_count as i64)
        .bind(brief.cluster_count as i64)
        .bind(brief.created_at.to_rfc3339());
        let result = on_conn!(self, query, execute).map_err(db_error("Failed to store news brief"))?;
        Ok(result.last_insert_rowid())
    }

    async fn latest_brief(&mut self) -> Result<Option<NewsBrief>> {
        let query = sqlx::query("SELECT * FROM news_briefs ORDER BY id DESC LIMIT 1");
        let row = on_conn!(self, query, fetch_optional).map_err(db_error("Failed to load news brief"))?;
        row.as_ref().map(brief_from_row).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn new_article(url: &str) -> NewArticle {
        NewArticle {
            url: url.to_string(),
            title: "Test Article".to_string(),
            content: Some("Test content".to_string()),
            summary: None,
            published_at: Some(Utc::now()),
            source: Some("test".to_string()),
        }
    }

    #[tokio::test]
    async fn test_sqlite_storage() {
        let temp_dir = tempdir().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let store = SQLiteStore::new_with_path(&db_path).await.unwrap();
        let mut uow = store.unit();
        let id = uow.insert_article(&new_article("http://example.com")).await.unwrap();
        assert_eq!(uow.pending_articles(Some(10)).await.unwrap().len(), 1);

        let outcome = AnalysisOutcome {
            record: AnalysisRecord {
                article_id: id,
                summary: "A summary".to_string(),
                sentiment_score: -0.4,
                topics: vec!["economy".to_string(), "trade".to_string()],
                entities: vec!["WTO".to_string()],
                embedding: vec![0.5, -0.25, 1.0],
                created_at: Utc::now(),
            },
            mark_source_analyzed: true,
        };
        uow.apply_analysis(&outcome).await.unwrap();

        let stored = uow.find_analysis(id).await.unwrap().unwrap();
        assert_eq!(stored.topics, outcome.record.topics);
        assert_eq!(stored.embedding, outcome.record.embedding);
        assert!(uow.pending_articles(None).await.unwrap().is_empty());
        assert_eq!(uow.analyzed_articles().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_sqlite_rollback() {
        let temp_dir = tempdir().unwrap();
        let store = SQLiteStore::new_with_path(&temp_dir.path().join("test.db")).await.unwrap();
        let mut uow = store.unit();
        let article_id = uow.insert_article(&new_article("http://example.com")).await.unwrap();

        uow.begin().await.unwrap();
        let cluster_id = uow.insert_cluster(&NewCluster {
            name: "economy".to_string(),
            description: "Single article on economy".to_string(),
            run_id: "run-1".to_string(),
        }).await.unwrap();
        uow.insert_membership(&ClusterMembership {
            cluster_id,
            article_id,
            similarity_score: 1.0,
        }).await.unwrap();
        assert_eq!(uow.clusters_for_run("run-1").await.unwrap().len(), 1);
        uow.rollback().await.unwrap();

        assert!(uow.clusters_for_run("run-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sqlite_briefs() {
        let temp_dir = tempdir().unwrap();
        let store = SQLiteStore::new_with_path(&temp_dir.path().join("test.db")).await.unwrap();
        let mut uow = store.unit();
        assert!(uow.latest_brief().await.unwrap().is_none());
        for content in ["first", "second"] {
            uow.insert_brief(&NewsBrief {
                filename: "news_brief.md".to_string(),
                content: content.to_string(),
                article_count: 3,
                cluster_count: 1,
                created_at: Utc::now(),
            }).await.unwrap();
        }
        assert_eq!(uow.latest_brief().await.unwrap().unwrap().content, "second");
    }

    #[tokio::test]
    async fn test_comma_separated_topics_are_accepted() {
        let temp_dir = tempdir().unwrap();
        let store = SQLiteStore::new_with_path(&temp_dir.path().join("test.db")).await.unwrap();
        let mut uow = store.unit();
        let id = uow.insert_article(&new_article("http://example.com")).await.unwrap();
        sqlx::query(
            r#"
            INSERT INTO article_analyses
            (article_id, summary, sentiment_score, topics, key_entities, embedding, created_at)
            VALUES (?, '', 0.0, 'economy, trade', '[]', '[1.0]', ?)
            "#,
        )
        .bind(id)
        .bind(Utc::now().to_rfc3339())
        .execute(&store.pool)
        .await
        .unwrap();

        let record = uow.find_analysis(id).await.unwrap().unwrap();
        assert_eq!(record.topics, vec!["economy", "trade"]);
    }
}
