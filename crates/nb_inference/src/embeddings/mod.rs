use std::sync::Arc;
use nb_core::{EmbeddingConfig, EmbeddingFallback, EmbeddingModel};
use rand::Rng;
use rand_distr::StandardNormal;
use tracing::{info, warn};

/// Wraps the embedding service with truncation and a fallback policy.
#[derive(Debug, Clone)]
pub struct EmbeddingGenerator {
    model: Arc<dyn EmbeddingModel>,
    config: EmbeddingConfig,
}

/// First `budget` characters of `text`, cut on a char boundary.
pub fn truncate_chars(text: &str, budget: usize) -> &str {
    match text.char_indices().nth(budget) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

pub fn random_normal_vector(dimension: usize) -> Vec<f32> {
    let mut rng = rand::thread_rng();
    (0..dimension).map(|_| rng.sample(StandardNormal)).collect()
}

impl EmbeddingGenerator {
    pub fn new(model: Arc<dyn EmbeddingModel>, config: &EmbeddingConfig) -> Self {
        Self {
            model,
            config: config.clone(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.config.dimension
    }

    /// Embeds `text`, or applies the fallback policy when the service fails
    /// or returns an empty vector. `None` only under
    /// [`EmbeddingFallback::Unavailable`].
    pub async fn embed(&self, text: &str) -> Option<Vec<f32>> {
        let input = truncate_chars(text, self.config.char_budget);
        info!("🧬 Generating embedding using {}", self.model.name());

        let reason = match self.model.embed(input, self.config.task_type).await {
            Ok(vector) if !vector.is_empty() => return Some(vector),
            Ok(_) => "service returned an empty vector".to_string(),
            Err(e) => e.to_string(),
        };

        match self.config.fallback {
            EmbeddingFallback::RandomNormal => {
                warn!("⚠️ Embedding failed ({}), using random vector", reason);
                Some(random_normal_vector(self.config.dimension))
            }
            EmbeddingFallback::Unavailable => {
                warn!("⚠️ Embedding unavailable: {}", reason);
                None
            }
        }
    }
}
