use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use crate::Result;

/// Sampling parameters sent with every completion request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_output_tokens: u32,
}

impl GenerationParams {
    /// Low-temperature settings for structured analysis.
    pub const fn analysis() -> Self {
        Self {
            temperature: 0.1,
            top_p: 0.95,
            top_k: 0,
            max_output_tokens: 1024,
        }
    }

    /// Looser settings for free-text insight generation.
    pub const fn insights() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.95,
            top_k: 0,
            max_output_tokens: 2048,
        }
    }
}

/// Hint passed to the embedding service about how the vector will be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskType {
    #[default]
    RetrievalDocument,
    RetrievalQuery,
    Clustering,
    SemanticSimilarity,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::RetrievalDocument => "RETRIEVAL_DOCUMENT",
            TaskType::RetrievalQuery => "RETRIEVAL_QUERY",
            TaskType::Clustering => "CLUSTERING",
            TaskType::SemanticSimilarity => "SEMANTIC_SIMILARITY",
        }
    }
}

/// Generative-language service: one prompt in, free text out.
#[async_trait]
pub trait LanguageModel: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String>;
}

/// Embedding service: text in, fixed-dimension vector out.
#[async_trait]
pub trait EmbeddingModel: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    async fn embed(&self, text: &str, task: TaskType) -> Result<Vec<f32>>;
}
