//! KoboldCpp client.
//!
//! Talks to the `/api/extra/*` endpoints of a KoboldCpp server:
//! - token counting and context-size queries (the [`TokenOracle`] side)
//! - SSE streaming generation and abort (the [`TextGenerator`] side)
//!
//! Oracle queries never fail loudly. Any network, status, or decoding
//! problem is logged and reported as `None` so the caller can fall back.

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, trace, warn};
use wannabe_config::AppConfig;
use wannabe_core::error::ProviderError;
use wannabe_core::oracle::{GenerationRequest, TextGenerator, TokenOracle, TokenStream};

/// A KoboldCpp server at a fixed base URL.
pub struct KoboldClient {
    base_url: String,
    query_timeout: Duration,
    client: reqwest::Client,
}

impl KoboldClient {
    /// Create a client for `base_url` (e.g. `http://127.0.0.1:5001`).
    ///
    /// `query_timeout` bounds the short oracle queries. Streaming
    /// generation has no overall timeout.
    pub fn new(base_url: impl Into<String>, query_timeout: Duration) -> Result<Self, ProviderError> {
        let base_url = base_url.into().trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(ProviderError::NotConfigured("empty KoboldCpp base URL".into()));
        }

        let client = reqwest::Client::builder()
            .connect_timeout(query_timeout)
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("HTTP client: {e}")))?;

        Ok(Self {
            base_url,
            query_timeout,
            client,
        })
    }

    /// Create a client from the `[server]` section of the config.
    pub fn from_config(config: &AppConfig) -> Result<Self, ProviderError> {
        Self::new(
            config.server.base_url.clone(),
            Duration::from_secs(config.server.timeout_secs),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api/extra/{}", self.base_url, path)
    }

    async fn fetch_value(&self, request: reqwest::RequestBuilder) -> Result<i64, ProviderError> {
        let response = request
            .timeout(self.query_timeout)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status().as_u16();
        if status != 200 {
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::ApiError {
                status_code: status,
                message,
            });
        }

        let body: ValueResponse = response.json().await.map_err(|e| ProviderError::ApiError {
            status_code: status,
            message: format!("Failed to parse response: {e}"),
        })?;
        Ok(body.value)
    }
}

fn map_reqwest_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout(e.to_string())
    } else {
        ProviderError::Network(e.to_string())
    }
}

#[async_trait]
impl TokenOracle for KoboldClient {
    async fn count_tokens(&self, text: &str) -> Option<u32> {
        let request = self
            .client
            .post(self.endpoint("tokencount"))
            .json(&PromptBody { prompt: text });

        match self.fetch_value(request).await {
            Ok(n) if n >= 0 => {
                trace!(chars = text.chars().count(), tokens = n, "Token count");
                u32::try_from(n).ok()
            }
            Ok(n) => {
                warn!(value = n, "Token count endpoint returned a negative value");
                None
            }
            Err(e) => {
                warn!(error = %e, "Token count query failed");
                None
            }
        }
    }

    async fn true_max_context_length(&self) -> Option<u32> {
        let request = self.client.get(self.endpoint("true_max_context_length"));

        match self.fetch_value(request).await {
            Ok(n) if n > 0 => {
                debug!(context_length = n, "Model context length");
                u32::try_from(n).ok()
            }
            Ok(n) => {
                warn!(value = n, "Context length endpoint returned a non-positive value");
                None
            }
            Err(e) => {
                warn!(error = %e, "Context length query failed");
                None
            }
        }
    }
}

#[async_trait]
impl TextGenerator for KoboldClient {
    fn name(&self) -> &str {
        "koboldcpp"
    }

    async fn generate_stream(&self, request: GenerationRequest) -> Result<TokenStream, ProviderError> {
        let url = self.endpoint("generate/stream");
        let body = StreamBody::from(&request);

        debug!(
            url = %url,
            prompt_chars = request.prompt.chars().count(),
            max_length = request.max_length,
            "Sending streaming request"
        );

        let response = self
            .client
            .post(&url)
            .header("Accept", "text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status().as_u16();
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "KoboldCpp streaming error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let (tx, rx) = tokio::sync::mpsc::channel(64);

        // Read the SSE byte stream and forward tokens
        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut lines = SseLineBuffer::default();

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx
                            .send(Err(ProviderError::StreamInterrupted(e.to_string())))
                            .await;
                        return;
                    }
                };

                for line in lines.push(&bytes) {
                    match line {
                        SseLine::Token(token) => {
                            if tx.send(Ok(token)).await.is_err() {
                                return; // receiver dropped
                            }
                        }
                        SseLine::Done => return,
                        SseLine::Skip => {}
                    }
                }
            }

            if let Some(SseLine::Token(token)) = lines.finish() {
                let _ = tx.send(Ok(token)).await;
            }
        });

        Ok(rx)
    }

    async fn abort(&self) -> Result<bool, ProviderError> {
        let response = self
            .client
            .post(self.endpoint("abort"))
            .json(&serde_json::json!({}))
            .timeout(self.query_timeout)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let ok = response.status().is_success();
        debug!(ok, "Abort requested");
        Ok(ok)
    }
}

/// One decoded line of the generation event stream.
#[derive(Debug, PartialEq, Eq)]
enum SseLine {
    Token(String),
    Done,
    Skip,
}

/// Splits raw stream bytes into event lines.
///
/// Bytes are buffered until a full line arrives, so a UTF-8 character that
/// straddles two chunks is decoded whole.
#[derive(Debug, Default)]
struct SseLineBuffer {
    buffer: Vec<u8>,
}

impl SseLineBuffer {
    /// Add a chunk and decode every line it completes.
    fn push(&mut self, bytes: &[u8]) -> Vec<SseLine> {
        self.buffer.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(line_end) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=line_end).collect();
            let line = String::from_utf8_lossy(&line);
            lines.push(parse_sse_line(line.trim_end_matches(['\r', '\n'])));
        }
        lines
    }

    /// Decode a trailing line that never got its newline.
    fn finish(self) -> Option<SseLine> {
        if self.buffer.is_empty() {
            return None;
        }
        let rest = String::from_utf8_lossy(&self.buffer);
        Some(parse_sse_line(rest.trim_end_matches('\r')))
    }
}

fn parse_sse_line(line: &str) -> SseLine {
    let Some(data) = line.strip_prefix("data:") else {
        return SseLine::Skip;
    };
    let data = data.trim();
    if data == "[DONE]" {
        return SseLine::Done;
    }

    match serde_json::from_str::<StreamEvent>(data) {
        Ok(StreamEvent {
            token: Some(token), ..
        }) if !token.is_empty() => SseLine::Token(token),
        Ok(StreamEvent {
            error: Some(error), ..
        }) => {
            warn!(error = %error, "Error event in generation stream");
            SseLine::Skip
        }
        Ok(_) => SseLine::Skip,
        Err(e) => {
            trace!(data = %data, error = %e, "Ignoring unparseable SSE chunk");
            SseLine::Skip
        }
    }
}

// --- KoboldCpp API types (internal) ---

#[derive(Debug, Serialize)]
struct PromptBody<'a> {
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct ValueResponse {
    value: i64,
}

#[derive(Debug, Serialize)]
struct StreamBody<'a> {
    prompt: &'a str,
    max_length: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    min_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rep_pen: Option<f32>,
    #[serde(skip_serializing_if = "is_empty_slice")]
    stop_sequence: &'a [String],
    #[serde(skip_serializing_if = "is_empty_slice")]
    banned_tokens: &'a [String],
}

impl<'a> From<&'a GenerationRequest> for StreamBody<'a> {
    fn from(req: &'a GenerationRequest) -> Self {
        Self {
            prompt: &req.prompt,
            max_length: req.max_length,
            temperature: req.temperature,
            min_p: req.min_p,
            top_p: req.top_p,
            top_k: req.top_k,
            rep_pen: req.rep_pen,
            stop_sequence: &req.stop_sequences,
            banned_tokens: &req.banned_strings,
        }
    }
}

fn is_empty_slice(items: &&[String]) -> bool {
    items.is_empty()
}

#[derive(Debug, Deserialize)]
struct StreamEvent {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}
