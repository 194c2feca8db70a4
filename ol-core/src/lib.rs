//! ol-core - Library behind the `ol` command-line Ollama wrapper.
//!
//! Provides the pieces the CLI composes into a single API call:
//! - Layered YAML configuration with deep merge (`config`)
//! - File classification and prompt assembly (`input`)
//! - Base URL resolution from flags and environment (`host`)
//! - Streaming Ollama HTTP client (`provider`)

pub mod config;
pub mod host;
pub mod input;
pub mod provider;

pub use config::{deep_merge, default_config, Config, ConfigError, ModelKind};
pub use host::{resolve_base_url, DEFAULT_BASE_URL, OLLAMA_HOST_VAR};
pub use input::{
    assemble_prompt, classify_files, encode_image, expand_user, is_image_file, ClassifiedFiles,
    InputError,
};
pub use provider::{CompletionRequest, Endpoint, ModelInfo, OllamaClient, ProviderError};
