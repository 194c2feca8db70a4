//! Ollama API client: request construction and streaming response decode.

mod types;
pub mod ollama;

pub use types::{
    ChunkMessage, CompletionRequest, Endpoint, ModelInfo, ProviderError, Result, StreamChunk,
};

pub use ollama::OllamaClient;
