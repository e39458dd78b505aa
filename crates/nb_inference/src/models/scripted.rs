use async_trait::async_trait;
use nb_core::{EmbeddingModel, Error, GenerationParams, LanguageModel, Result, TaskType};
use std::collections::VecDeque;
use std::sync::Mutex;

/// Replays canned replies in order, one per call, and records every prompt.
/// Once the script runs out, each call fails with a service error.
#[derive(Debug, Default)]
pub struct ScriptedModel {
    replies: Mutex<VecDeque<std::result::Result<String, String>>>,
    embeddings: Mutex<VecDeque<std::result::Result<Vec<f32>, String>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, text: impl Into<String>) -> Self {
        self.push_reply(Ok(text.into()));
        self
    }

    pub fn fail(self, message: impl Into<String>) -> Self {
        self.push_reply(Err(message.into()));
        self
    }

    pub fn embedding(self, vector: Vec<f32>) -> Self {
        self.push_embedding(Ok(vector));
        self
    }

    pub fn embedding_failure(self, message: impl Into<String>) -> Self {
        self.push_embedding(Err(message.into()));
        self
    }

    fn push_reply(&self, reply: std::result::Result<String, String>) {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(reply);
        }
    }

    fn push_embedding(&self, vector: std::result::Result<Vec<f32>, String>) {
        if let Ok(mut embeddings) = self.embeddings.lock() {
            embeddings.push_back(vector);
        }
    }

    /// Prompts received so far.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn name(&self) -> &str {
        "Scripted"
    }

    async fn generate(&self, prompt: &str, _params: &GenerationParams) -> Result<String> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        let next = self.replies.lock().ok().and_then(|mut r| r.pop_front());
        match next {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(Error::Inference(message)),
            None => Err(Error::Inference("script exhausted".to_string())),
        }
    }
}

#[async_trait]
impl EmbeddingModel for ScriptedModel {
    fn name(&self) -> &str {
        "Scripted"
    }

    async fn embed(&self, _text: &str, _task: TaskType) -> Result<Vec<f32>> {
        let next = self.embeddings.lock().ok().and_then(|mut e| e.pop_front());
        match next {
            Some(Ok(vector)) => Ok(vector),
            Some(Err(message)) => Err(Error::Embedding(message)),
            None => Err(Error::Embedding("script exhausted".to_string())),
        }
    }
}
