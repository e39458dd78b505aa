use std::fmt;
use std::sync::Arc;
use chrono::Utc;
use nb_core::{
    AnalysisOutcome, AnalysisRecord, Article, GenerationParams, LanguageModel, Result,
    ServiceConfig, UnitOfWork,
};
use tracing::{debug, error, info, warn};

use crate::embeddings::EmbeddingGenerator;
use crate::models::Models;
use crate::parser::{parse_response, AnalysisFields};

/// Result of analyzing one article.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisStatus {
    /// A record was derived; the caller applies the outcome.
    Analyzed(AnalysisOutcome),
    /// The article already has a record.
    Skipped,
    Failed(String),
}

pub fn build_prompt(title: &str, content: &str) -> String {
    format!(
        r#"Analyze the following news article.

Title: {title}

Content: {content}

Provide:
1. A concise summary (1-2 sentences)
2. A sentiment score, a single float from -1.0 (very negative) to 1.0 (very positive)
3. The main topics, a JSON list of up to 5 keywords or short phrases
4. The key entities mentioned, a JSON list of people, organizations and places

Respond only with a JSON object with exactly the keys "summary", "sentiment_score", "topics" and "entities", for example:
{{
  "summary": "One sentence.",
  "sentiment_score": 0.2,
  "topics": ["topic one", "topic two"],
  "entities": ["Entity"]
}}"#
    )
}

/// Derives an [`AnalysisRecord`] for one article at a time.
pub struct ContentAnalyzer {
    model: Arc<dyn LanguageModel>,
    embeddings: EmbeddingGenerator,
    params: GenerationParams,
}

impl fmt::Debug for ContentAnalyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentAnalyzer")
            .field("model", &self.model.name())
            .field("embeddings", &self.embeddings)
            .field("params", &self.params)
            .finish()
    }
}

impl ContentAnalyzer {
    pub fn new(config: &ServiceConfig, models: &Models) -> Self {
        Self {
            model: models.language.clone(),
            embeddings: EmbeddingGenerator::new(models.embedding.clone(), &config.embedding),
            params: config.analysis_params,
        }
    }

    /// One completion call, then the parser chain. Only a service failure
    /// is an error; an unparseable reply yields empty fields.
    pub async fn analyze_content(&self, title: &str, content: &str) -> Result<AnalysisFields> {
        info!("🤖 Calling {} for: {}", self.model.name(), title);
        let response = self.model.generate(&build_prompt(title, content), &self.params).await?;
        debug!("Raw response for '{}':\n{}", title, response);

        let parsed = parse_response(&response);
        if parsed.strategy.is_structured() {
            info!("✅ Parsed analysis for '{}'", title);
        } else {
            warn!(
                "⚠️ No JSON in response for '{}', extracted {}/4 fields",
                title,
                parsed.fields.populated_fields()
            );
        }
        Ok(parsed.fields)
    }

    /// Analyzes `article` without writing anything. Errors only when the
    /// store cannot be read.
    pub async fn analyze(&self, uow: &mut dyn UnitOfWork, article: &Article) -> Result<AnalysisStatus> {
        if uow.find_analysis(article.id).await?.is_some() {
            info!("Article {} already analyzed, skipping", article.id);
            return Ok(AnalysisStatus::Skipped);
        }

        let Some(content) = article.analysis_text() else {
            warn!("Article {} has no content or summary", article.id);
            return Ok(AnalysisStatus::Failed("no usable text".to_string()));
        };

        info!("🔍 Analyzing article {}: {}", article.id, article.title);
        let fields = match self.analyze_content(&article.title, content).await {
            Ok(fields) => fields,
            Err(e) => {
                if e.is_service_error() {
                    warn!("⚠️ Analysis service failed for article {}: {}", article.id, e);
                } else {
                    error!("❌ Analysis call failed for article {}: {}", article.id, e);
                }
                return Ok(AnalysisStatus::Failed(e.to_string()));
            }
        };

        let Some(embedding) = self.embeddings.embed(content).await else {
            error!("❌ No embedding for article {}", article.id);
            return Ok(AnalysisStatus::Failed("embedding unavailable".to_string()));
        };

        Ok(AnalysisStatus::Analyzed(AnalysisOutcome {
            record: AnalysisRecord {
                article_id: article.id,
                summary: fields.summary,
                sentiment_score: fields.sentiment_score,
                topics: fields.topics,
                entities: fields.entities,
                embedding,
                created_at: Utc::now(),
            },
            mark_source_analyzed: true,
        }))
    }

    /// Analyzes up to `limit` pending articles, newest first, committing
    /// each one separately. Failures are logged and skipped. Returns the
    /// number of records written.
    pub async fn analyze_batch(&self, uow: &mut dyn UnitOfWork, limit: usize) -> Result<usize> {
        let articles = uow.pending_articles(Some(limit)).await?;
        info!("📰 Found {} articles to analyze", articles.len());

        let mut analyzed = 0;
        for article in &articles {
            let outcome = match self.analyze(uow, article).await {
                Ok(AnalysisStatus::Analyzed(outcome)) => outcome,
                Ok(AnalysisStatus::Skipped) => continue,
                Ok(AnalysisStatus::Failed(reason)) => {
                    warn!("Skipping article {}: {}", article.id, reason);
                    continue;
                }
                Err(e) if e.is_persistence_error() => {
                    error!("❌ Could not read analysis state for article {}: {}", article.id, e);
                    continue;
                }
                Err(e) => {
                    warn!("Could not analyze article {}: {}", article.id, e);
                    continue;
                }
            };

            match apply_outcome(uow, &outcome).await {
                Ok(()) => {
                    analyzed += 1;
                    info!("✅ Article {} analyzed", article.id);
                }
                Err(e) => error!("❌ Could not store analysis for article {}: {}", article.id, e),
            }
        }

        info!("Analyzed {}/{} articles", analyzed, articles.len());
        Ok(analyzed)
    }
}

/// Applies one outcome in its own transaction, rolling back on failure.
pub async fn apply_outcome(uow: &mut dyn UnitOfWork, outcome: &AnalysisOutcome) -> Result<()> {
    uow.begin().await?;
    let result = match uow.apply_analysis(outcome).await {
        Ok(()) => uow.commit().await,
        Err(e) => Err(e),
    };
    if result.is_err() {
        if let Err(e) = uow.rollback().await {
            warn!("Rollback failed: {}", e);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ScriptedModel;
    use nb_core::{EmbeddingFallback, NewArticle};
    use nb_storage::MemoryStore;

    const REPLY: &str = "```json\n{\"summary\": \"Rates rise.\", \"sentiment_score\": -0.4, \"topics\": [\"economy\", \"rates\"], \"entities\": [\"Central Bank\"]}\n```";

    fn analyzer(model: ScriptedModel, fallback: EmbeddingFallback) -> ContentAnalyzer {
        let model = Arc::new(model);
        let models = Models {
            language: model.clone(),
            embedding: model,
        };
        let config = ServiceConfig::default().with_embedding_fallback(fallback);
        ContentAnalyzer::new(&config, &models)
    }

    fn article(n: usize) -> NewArticle {
        NewArticle {
            url: format!("https://news.example/{}", n),
            title: format!("Story {}", n),
            content: Some(format!("Body of story {}", n)),
            summary: None,
            published_at: None,
            source: Some("Example".to_string()),
        }
    }

    #[test]
    fn test_prompt_contract() {
        let prompt = build_prompt("Headline", "Body");
        assert!(prompt.contains("Title: Headline"));
        assert!(prompt.contains("Content: Body"));
        for key in ["\"summary\"", "\"sentiment_score\"", "\"topics\"", "\"entities\""] {
            assert!(prompt.contains(key));
        }
    }

    #[tokio::test]
    async fn test_analyze_batch_writes_records() {
        let store = MemoryStore::new();
        let mut uow = store.unit();
        uow.insert_article(&article(1)).await.unwrap();
        uow.insert_article(&article(2)).await.unwrap();

        let model = ScriptedModel::new()
            .reply(REPLY).embedding(vec![0.1; 768])
            .reply(REPLY).embedding(vec![0.2; 768]);
        let analyzer = analyzer(model, EmbeddingFallback::RandomNormal);

        assert_eq!(analyzer.analyze_batch(&mut uow, 60).await.unwrap(), 2);
        let record = uow.find_analysis(1).await.unwrap().unwrap();
        assert_eq!(record.summary, "Rates rise.");
        assert_eq!(record.sentiment_score, -0.4);
        assert_eq!(record.topics, vec!["economy", "rates"]);
        assert_eq!(record.embedding.len(), 768);
        assert!(uow.get_article(1).await.unwrap().unwrap().analyzed);
        assert!(uow.pending_articles(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failure_is_isolated() {
        let store = MemoryStore::new();
        let mut uow = store.unit();
        uow.insert_article(&article(1)).await.unwrap();
        uow.insert_article(&article(2)).await.unwrap();

        let model = ScriptedModel::new()
            .fail("503 Service Unavailable")
            .reply(REPLY)
            .embedding(vec![0.3; 768]);
        let analyzer = analyzer(model, EmbeddingFallback::RandomNormal);

        assert_eq!(analyzer.analyze_batch(&mut uow, 60).await.unwrap(), 1);
        assert!(uow.find_analysis(1).await.unwrap().is_none());
        assert!(uow.find_analysis(2).await.unwrap().is_some());
        assert!(!uow.get_article(1).await.unwrap().unwrap().analyzed);
    }

    #[tokio::test]
    async fn test_service_error_becomes_failed_status() {
        let store = MemoryStore::new();
        let mut uow = store.unit();
        uow.insert_article(&article(1)).await.unwrap();
        let stored = uow.get_article(1).await.unwrap().unwrap();

        let direct = analyzer(ScriptedModel::new().fail("quota exceeded"), EmbeddingFallback::RandomNormal);
        let err = direct.analyze_content(&stored.title, "body").await.unwrap_err();
        assert!(err.is_service_error());

        let batch = analyzer(ScriptedModel::new().fail("quota exceeded"), EmbeddingFallback::RandomNormal);
        match batch.analyze(&mut uow, &stored).await.unwrap() {
            AnalysisStatus::Failed(reason) => assert!(reason.contains("quota exceeded")),
            other => panic!("unexpected status {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_reanalysis_is_noop() {
        let store = MemoryStore::new();
        let mut uow = store.unit();
        let id = uow.insert_article(&article(1)).await.unwrap();

        let model = ScriptedModel::new().reply(REPLY).embedding(vec![0.1; 768]);
        let analyzer = analyzer(model, EmbeddingFallback::RandomNormal);
        assert_eq!(analyzer.analyze_batch(&mut uow, 10).await.unwrap(), 1);
        let before = uow.analyses().await.unwrap();

        let article = uow.get_article(id).await.unwrap().unwrap();
        let status = analyzer.analyze(&mut uow, &article).await.unwrap();
        assert_eq!(status, AnalysisStatus::Skipped);
        assert_eq!(uow.analyses().await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_missing_text_fails() {
        let store = MemoryStore::new();
        let mut uow = store.unit();
        let mut new = article(1);
        new.content = Some("   ".to_string());
        let id = uow.insert_article(&new).await.unwrap();

        let analyzer = analyzer(ScriptedModel::new(), EmbeddingFallback::RandomNormal);
        let article = uow.get_article(id).await.unwrap().unwrap();
        let status = analyzer.analyze(&mut uow, &article).await.unwrap();
        assert!(matches!(status, AnalysisStatus::Failed(_)));
    }

    #[tokio::test]
    async fn test_unavailable_embedding_fails_article() {
        let store = MemoryStore::new();
        let mut uow = store.unit();
        uow.insert_article(&article(1)).await.unwrap();

        let model = ScriptedModel::new().reply(REPLY).embedding_failure("quota exceeded");
        let analyzer = analyzer(model, EmbeddingFallback::Unavailable);
        assert_eq!(analyzer.analyze_batch(&mut uow, 10).await.unwrap(), 0);
        assert!(uow.analyses().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_plain_text_reply_is_stored() {
        let store = MemoryStore::new();
        let mut uow = store.unit();
        uow.insert_article(&article(1)).await.unwrap();

        let model = ScriptedModel::new()
            .reply("Summary: Quiet day.\nSentiment: 0.1\nTopics: - weather\n- calm")
            .embedding(vec![0.1; 768]);
        let analyzer = analyzer(model, EmbeddingFallback::RandomNormal);
        assert_eq!(analyzer.analyze_batch(&mut uow, 10).await.unwrap(), 1);

        let record = uow.find_analysis(1).await.unwrap().unwrap();
        assert_eq!(record.summary, "Quiet day.");
        assert_eq!(record.topics, vec!["weather", "calm"]);
        assert!(record.entities.is_empty());
    }

    #[tokio::test]
    async fn test_write_failure_rolls_back() {
        let store = MemoryStore::new();
        let mut uow = store.unit();
        uow.insert_article(&article(1)).await.unwrap();
        store.set_fail_writes(true);

        let model = ScriptedModel::new().reply(REPLY).embedding(vec![0.1; 768]);
        let analyzer = analyzer(model, EmbeddingFallback::RandomNormal);
        assert_eq!(analyzer.analyze_batch(&mut uow, 10).await.unwrap(), 0);
        assert!(!uow.in_transaction());

        store.set_fail_writes(false);
        assert!(uow.analyses().await.unwrap().is_empty());
        assert_eq!(uow.pending_articles(None).await.unwrap().len(), 1);
    }
}
