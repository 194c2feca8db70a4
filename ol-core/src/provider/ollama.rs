//! Streaming Ollama HTTP client.
//!
//! Issues a single POST against the endpoint selected by the request and
//! decodes the newline-delimited JSON response incrementally. Each line is
//! parsed independently; a malformed line is warned and skipped, never fatal.

use super::types::*;
use futures::StreamExt;
use serde::Deserialize;
use tracing::{debug, warn};

/// Ollama HTTP API client.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: String,
    http_client: reqwest::Client,
}

impl OllamaClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http_client: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Stream a completion, invoking the callback for each text fragment in
    /// arrival order. Returns once the terminal record arrives or the body
    /// ends; transport failures, non-success statuses, and callback write
    /// errors abort the stream.
    pub async fn stream<'a>(
        &'a self,
        request: &CompletionRequest,
        mut callback: Box<dyn FnMut(&str) -> std::io::Result<()> + Send + 'a>,
    ) -> Result<()> {
        let endpoint = request.endpoint();
        let url = format!("{}{}", self.base_url, endpoint.path());
        debug!(url = %url, model = %request.model, ?endpoint, "sending completion request");

        let response = self
            .http_client
            .post(&url)
            .json(&request.payload())
            .send()
            .await
            .map_err(|source| ProviderError::Request {
                endpoint: url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                endpoint: url,
                status,
                body,
            });
        }

        let mut stream = response.bytes_stream();
        let mut lines = LineBuffer::default();

        while let Some(chunk_result) = stream.next().await {
            let chunk = chunk_result.map_err(|source| ProviderError::Request {
                endpoint: url.clone(),
                source,
            })?;
            if deliver_lines(lines.push(&chunk), &mut callback)? {
                return Ok(());
            }
        }

        // Server closed the stream without a terminal record; flush any
        // unterminated final line.
        if let Some(line) = lines.take_remainder() {
            deliver_lines(vec![line], &mut callback)?;
        }

        Ok(())
    }

    /// List the models installed on the host via `GET /api/tags`.
    pub async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        #[derive(Deserialize)]
        struct TagsResponse {
            #[serde(default)]
            models: Vec<ModelInfo>,
        }

        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|source| ProviderError::Request {
                endpoint: url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                endpoint: url,
                status,
                body,
            });
        }

        let tags: TagsResponse =
            response
                .json()
                .await
                .map_err(|source| ProviderError::Request {
                    endpoint: url,
                    source,
                })?;
        Ok(tags.models)
    }
}

/// Accumulates raw response bytes and yields complete newline-terminated
/// lines, holding partial lines across chunk boundaries.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buffer: Vec<u8>,
}

impl LineBuffer {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = &line[..line.len() - 1];
            if line.is_empty() {
                continue;
            }
            lines.push(String::from_utf8_lossy(line).into_owned());
        }
        lines
    }

    /// Any trailing bytes not terminated by a newline.
    pub fn take_remainder(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buffer);
        Some(String::from_utf8_lossy(&rest).into_owned())
    }
}

/// Decode a batch of lines and hand each fragment to the callback. Returns
/// `Ok(true)` once the terminal record is seen; a callback failure (a closed
/// stdout pipe, say) aborts instead of silently consuming the rest of the
/// stream.
fn deliver_lines(
    lines: Vec<String>,
    callback: &mut (dyn FnMut(&str) -> std::io::Result<()> + Send),
) -> Result<bool> {
    for line in lines {
        if let Some(record) = decode_line(&line) {
            if let Some(fragment) = record.fragment() {
                callback(fragment).map_err(ProviderError::Output)?;
            }
            if record.done {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

/// Parse one stream line. A malformed line is warned and skipped so decoding
/// continues with subsequent lines.
pub fn decode_line(line: &str) -> Option<StreamChunk> {
    match serde_json::from_str::<StreamChunk>(line) {
        Ok(chunk) => Some(chunk),
        Err(e) => {
            let preview: String = line.chars().take(100).collect();
            warn!(error = %e, line = %preview, "skipping malformed line in stream");
            None
        }
    }
}
