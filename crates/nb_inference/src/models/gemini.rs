use async_trait::async_trait;
use nb_core::{
    EmbeddingModel, Error, GenerationParams, LanguageModel, Result, ServiceConfig, TaskType,
};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<u32>,
    max_output_tokens: u32,
}

impl From<&GenerationParams> for GenerationConfig {
    fn from(params: &GenerationParams) -> Self {
        Self {
            temperature: params.temperature,
            top_p: params.top_p,
            // zero means "unset"
            top_k: (params.top_k > 0).then_some(params.top_k),
            max_output_tokens: params.max_output_tokens,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedRequest<'a> {
    model: &'a str,
    content: Content<'a>,
    task_type: &'static str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: EmbeddingValues,
}

#[derive(Deserialize)]
struct EmbeddingValues {
    #[serde(default)]
    values: Vec<f32>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiError,
}

#[derive(Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

/// Client for the Gemini generative-language REST API.
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: Url,
    model_name: String,
    embedding_model: String,
}

impl fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiClient")
            .field("client", &"<reqwest::Client>")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url.as_str())
            .field("model_name", &self.model_name)
            .field("embedding_model", &self.embedding_model)
            .finish()
    }
}

/// Model names may be given with or without the `models/` prefix.
fn model_path(name: &str) -> String {
    if name.starts_with("models/") {
        name.to_string()
    } else {
        format!("models/{}", name)
    }
}

impl GeminiClient {
    pub fn new(config: &ServiceConfig) -> Result<Self> {
        let api_key = config.api_key.clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| Error::Config("Gemini API key is required".to_string()))?;
        Ok(Self {
            client: Client::new(),
            api_key,
            base_url: config.base_url.clone(),
            model_name: model_path(&config.model_name),
            embedding_model: model_path(&config.embedding.model),
        })
    }

    fn endpoint(&self, model: &str, method: &str) -> Result<Url> {
        self.base_url
            .join(&format!("{}:{}", model, method))
            .map_err(|e| Error::Config(format!("Invalid endpoint for {}: {}", model, e)))
    }

    async fn post<B, R>(&self, url: Url, body: &B, fail: fn(String) -> Error) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let response = self.client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            let detail = serde_json::from_str::<ApiErrorBody>(&text)
                .map(|b| format!("{} {}", b.error.status, b.error.message))
                .unwrap_or(text);
            return Err(fail(format!("{}: {}", status, detail.trim())));
        }
        Ok(serde_json::from_str(&text)?)
    }
}

/// Concatenated text of the first candidate.
fn candidate_text(response: GenerateResponse) -> Option<String> {
    let content = response.candidates.into_iter().next()?.content?;
    let text: String = content.parts.into_iter().map(|p| p.text).collect();
    (!text.is_empty()).then_some(text)
}

#[async_trait]
impl LanguageModel for GeminiClient {
    fn name(&self) -> &str {
        "Gemini"
    }

    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String> {
        let request = GenerateRequest {
            contents: vec![Content {
                role: Some("user"),
                parts: vec![Part { text: prompt }],
            }],
            generation_config: params.into(),
        };
        let url = self.endpoint(&self.model_name, "generateContent")?;
        let response: GenerateResponse = self.post(url, &request, Error::Inference).await?;
        candidate_text(response)
            .ok_or_else(|| Error::Inference("Gemini returned no candidates".to_string()))
    }
}

#[async_trait]
impl EmbeddingModel for GeminiClient {
    fn name(&self) -> &str {
        "Gemini"
    }

    async fn embed(&self, text: &str, task: TaskType) -> Result<Vec<f32>> {
        let request = EmbedRequest {
            model: &self.embedding_model,
            content: Content {
                role: None,
                parts: vec![Part { text }],
            },
            task_type: task.as_str(),
        };
        let url = self.endpoint(&self.embedding_model, "embedContent")?;
        let response: EmbedResponse = self.post(url, &request, Error::Embedding).await?;
        Ok(response.embedding.values)
    }
}
