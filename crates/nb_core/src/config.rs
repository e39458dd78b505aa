use std::fmt;
use std::str::FromStr;
use serde::{Deserialize, Serialize};
use url::Url;
use crate::models::{GenerationParams, TaskType};
use crate::{Error, Result};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/";
pub const DEFAULT_ANALYSIS_MODEL: &str = "gemini-1.5-pro";
pub const DEFAULT_EMBEDDING_MODEL: &str = "models/embedding-001";
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 768;
/// Roughly 2500 tokens.
pub const DEFAULT_EMBEDDING_CHAR_BUDGET: usize = 10_000;

/// What the embedding generator hands back when the service fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingFallback {
    /// Standard-normal noise of the configured dimension.
    #[default]
    RandomNormal,
    /// No vector; the article is reported as failed.
    Unavailable,
}

impl FromStr for EmbeddingFallback {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "random" | "random_normal" => Ok(EmbeddingFallback::RandomNormal),
            "unavailable" | "none" => Ok(EmbeddingFallback::Unavailable),
            other => Err(Error::Config(format!(
                "Unknown embedding fallback '{}'. Use random or unavailable",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub model: String,
    pub dimension: usize,
    pub char_budget: usize,
    pub task_type: TaskType,
    pub fallback: EmbeddingFallback,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            dimension: DEFAULT_EMBEDDING_DIMENSION,
            char_budget: DEFAULT_EMBEDDING_CHAR_BUDGET,
            task_type: TaskType::RetrievalDocument,
            fallback: EmbeddingFallback::RandomNormal,
        }
    }
}

/// Settings for the external services, built once at startup and passed by
/// reference into every component that talks to a model.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(skip_serializing, default)]
    pub api_key: Option<String>,
    pub base_url: Url,
    pub model_name: String,
    pub analysis_params: GenerationParams,
    pub insight_params: GenerationParams,
    pub embedding: EmbeddingConfig,
}

impl fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("api_key", &self.api_key.as_deref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url.as_str())
            .field("model_name", &self.model_name)
            .field("analysis_params", &self.analysis_params)
            .field("insight_params", &self.insight_params)
            .field("embedding", &self.embedding)
            .finish()
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            model_name: DEFAULT_ANALYSIS_MODEL.to_string(),
            analysis_params: GenerationParams::analysis(),
            insight_params: GenerationParams::insights(),
            embedding: EmbeddingConfig::default(),
        }
    }
}

fn default_base_url() -> Url {
    match Url::parse(DEFAULT_BASE_URL) {
        Ok(url) => url,
        Err(_) => unreachable!("default base url is a valid literal"),
    }
}

impl ServiceConfig {
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Parses and sets the service base URL. A trailing slash is added so
    /// that relative model paths join underneath it.
    pub fn with_base_url(mut self, url: &str) -> Result<Self> {
        let normalized = if url.ends_with('/') {
            url.to_string()
        } else {
            format!("{}/", url)
        };
        self.base_url = Url::parse(&normalized)
            .map_err(|e| Error::Config(format!("Invalid base URL '{}': {}", url, e)))?;
        Ok(self)
    }

    pub fn with_model_name(mut self, model_name: impl Into<String>) -> Self {
        self.model_name = model_name.into();
        self
    }

    pub fn with_embedding_fallback(mut self, fallback: EmbeddingFallback) -> Self {
        self.embedding.fallback = fallback;
        self
    }

    /// Checks the settings a remote provider needs.
    pub fn validate(&self, requires_api_key: bool) -> Result<()> {
        if requires_api_key && self.api_key.as_deref().map_or(true, |k| k.trim().is_empty()) {
            return Err(Error::Config("GEMINI_API_KEY is not set".to_string()));
        }
        if self.embedding.dimension == 0 {
            return Err(Error::Config("Embedding dimension must be positive".to_string()));
        }
        if self.embedding.char_budget == 0 {
            return Err(Error::Config("Embedding character budget must be positive".to_string()));
        }
        Ok(())
    }
}
