pub mod config;
pub mod error;
pub mod models;
pub mod storage;
pub mod topics;
pub mod types;

pub use config::{EmbeddingConfig, EmbeddingFallback, ServiceConfig};
pub use error::Error;
pub use models::{EmbeddingModel, GenerationParams, LanguageModel, TaskType};
pub use storage::{Store, UnitOfWork};
pub use types::*;

pub type Result<T> = std::result::Result<T, Error>;
