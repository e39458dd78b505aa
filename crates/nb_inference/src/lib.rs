pub mod analyzer;
pub mod embeddings;
pub mod models;
pub mod parser;

pub use analyzer::{AnalysisStatus, ContentAnalyzer};
pub use embeddings::EmbeddingGenerator;
pub use models::{create_models, Models, Provider};
pub use parser::{extract_list_field, parse_response, AnalysisFields, Strategy};

pub mod prelude {
    pub use super::analyzer::{AnalysisStatus, ContentAnalyzer};
    pub use super::embeddings::EmbeddingGenerator;
    pub use super::models::{create_models, DummyModel, GeminiClient, Models, Provider};
    pub use nb_core::{Error, LanguageModel, EmbeddingModel, Result, ServiceConfig};
}
