use std::str::FromStr;
use std::sync::Arc;
use nb_core::{EmbeddingModel, Error, LanguageModel, Result, ServiceConfig};

pub mod dummy;
pub mod gemini;
#[cfg(any(test, feature = "test-util"))]
pub mod scripted;

pub use dummy::DummyModel;
pub use gemini::GeminiClient;
#[cfg(any(test, feature = "test-util"))]
pub use scripted::ScriptedModel;

/// Which backend answers model calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Provider {
    #[default]
    Gemini,
    Dummy,
}

impl Provider {
    pub fn requires_api_key(&self) -> bool {
        matches!(self, Provider::Gemini)
    }
}

impl FromStr for Provider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "gemini" => Ok(Provider::Gemini),
            "dummy" => Ok(Provider::Dummy),
            other => Err(Error::Config(format!(
                "Unknown provider '{}'. Available providers: gemini (default), dummy",
                other
            ))),
        }
    }
}

/// The pair of service handles a pipeline needs.
#[derive(Debug, Clone)]
pub struct Models {
    pub language: Arc<dyn LanguageModel>,
    pub embedding: Arc<dyn EmbeddingModel>,
}

pub fn create_models(config: &ServiceConfig, provider: Provider) -> Result<Models> {
    config.validate(provider.requires_api_key())?;
    match provider {
        Provider::Gemini => {
            let client = Arc::new(GeminiClient::new(config)?);
            Ok(Models {
                language: client.clone(),
                embedding: client,
            })
        }
        Provider::Dummy => {
            let model = Arc::new(DummyModel::new(config.embedding.dimension));
            Ok(Models {
                language: model.clone(),
                embedding: model,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_parsing() {
        assert_eq!("gemini".parse::<Provider>().unwrap(), Provider::Gemini);
        assert_eq!("DUMMY".parse::<Provider>().unwrap(), Provider::Dummy);
        assert!("ollama".parse::<Provider>().is_err());
    }

    #[test]
    fn test_create_models() {
        let models = create_models(&ServiceConfig::default(), Provider::Dummy).unwrap();
        assert_eq!(models.language.name(), "Dummy");
        assert!(create_models(&ServiceConfig::default(), Provider::Gemini).is_err());

        let config = ServiceConfig::default().with_api_key("key");
        let models = create_models(&config, Provider::Gemini).unwrap();
        assert_eq!(models.embedding.name(), "Gemini");
    }
}
