use std::fmt;
use nb_core::{EmbeddingModel, GenerationParams, LanguageModel, Result, TaskType};

/// Offline provider. Answers analysis prompts with a JSON object built from
/// the prompt text and embeds by bucketed character frequency.
pub struct DummyModel {
    dimension: usize,
}

impl fmt::Debug for DummyModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DummyModel")
            .field("dimension", &self.dimension)
            .finish()
    }
}

impl DummyModel {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

/// The paragraph following the last `Content:` marker, or the whole prompt.
fn prompt_body(prompt: &str) -> &str {
    match prompt.rfind("Content:") {
        Some(i) => {
            let body = &prompt[i + "Content:".len()..];
            body.split("\n\n").next().unwrap_or(body)
        }
        None => prompt,
    }
}

#[async_trait::async_trait]
impl LanguageModel for DummyModel {
    fn name(&self) -> &str {
        "Dummy"
    }

    async fn generate(&self, prompt: &str, _params: &GenerationParams) -> Result<String> {
        // Take first 20 words and join them
        let words: Vec<&str> = prompt_body(prompt).split_whitespace().take(20).collect();
        let topics: Vec<String> = words.iter()
            .filter(|w| w.len() > 3 && w.chars().next().is_some_and(char::is_uppercase))
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
            .filter(|w| !w.is_empty())
            .take(5)
            .collect();
        let response = serde_json::json!({
            "summary": words.join(" "),
            "sentiment_score": 0.0,
            "topics": topics,
            "entities": [],
        });
        Ok(response.to_string())
    }
}

#[async_trait::async_trait]
impl EmbeddingModel for DummyModel {
    fn name(&self) -> &str {
        "Dummy"
    }

    async fn embed(&self, text: &str, _task: TaskType) -> Result<Vec<f32>> {
        let mut embedding = vec![0.0; self.dimension];
        if self.dimension == 0 {
            return Ok(embedding);
        }

        let text_len = text.chars().count().max(1) as f32;
        embedding[0] = text_len / 1000.0;

        let buckets = self.dimension - 1;
        if buckets > 0 {
            for c in text.chars() {
                embedding[1 + (c as usize % buckets)] += 1.0 / text_len;
            }
        }
        Ok(embedding)
    }
}
