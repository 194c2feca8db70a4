//! Request and response types for the Ollama HTTP API.

use serde::Deserialize;
use thiserror::Error;

/// Errors that can occur when talking to the Ollama API.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request to {endpoint} failed: {source}")]
    Request {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{endpoint} returned {status}: {body}")]
    Api {
        endpoint: String,
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("failed to write response output: {0}")]
    Output(#[source] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ProviderError>;

/// The two generation endpoints. Chosen purely by whether images are attached;
/// there is no fallback from one to the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Generate,
    Chat,
}

impl Endpoint {
    pub fn for_images(has_images: bool) -> Self {
        if has_images {
            Endpoint::Chat
        } else {
            Endpoint::Generate
        }
    }

    pub fn path(&self) -> &'static str {
        match self {
            Endpoint::Generate => "/api/generate",
            Endpoint::Chat => "/api/chat",
        }
    }
}

/// One resolved request: model, assembled prompt, base64 image payloads in
/// input order, and temperature. Constructed fresh per invocation.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub prompt: String,
    pub images: Vec<String>,
    pub temperature: f64,
}

impl CompletionRequest {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            images: Vec::new(),
            temperature: 0.7,
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_images(mut self, images: Vec<String>) -> Self {
        self.images = images;
        self
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint::for_images(!self.images.is_empty())
    }

    /// Build the endpoint-specific JSON body.
    ///
    /// Text-only requests carry a top-level `prompt` and no `messages` or
    /// `images` keys; image-bearing requests carry a single user message with
    /// the images attached and no top-level `prompt`.
    pub fn payload(&self) -> serde_json::Value {
        match self.endpoint() {
            Endpoint::Generate => serde_json::json!({
                "model": self.model,
                "prompt": self.prompt,
                "temperature": self.temperature,
                "stream": true,
            }),
            Endpoint::Chat => serde_json::json!({
                "model": self.model,
                "messages": [{
                    "role": "user",
                    "content": self.prompt,
                    "images": self.images,
                }],
                "temperature": self.temperature,
                "stream": true,
            }),
        }
    }
}

/// One newline-delimited record of a streaming response.
///
/// Generate responses carry the fragment in `response`; chat responses carry
/// it in `message.content`. Either way `done` marks the terminal record.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamChunk {
    #[serde(default)]
    pub response: Option<String>,

    #[serde(default)]
    pub message: Option<ChunkMessage>,

    #[serde(default)]
    pub done: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChunkMessage {
    #[serde(default)]
    pub content: String,
}

impl StreamChunk {
    /// The incremental text fragment, if this record carries one.
    pub fn fragment(&self) -> Option<&str> {
        self.response
            .as_deref()
            .or_else(|| self.message.as_ref().map(|m| m.content.as_str()))
    }
}

/// A model installed on the Ollama host, as reported by `/api/tags`.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    #[serde(default)]
    pub size: u64,
}
