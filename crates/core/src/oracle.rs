//! Inference-server traits.
//!
//! The prompt layer needs exactly two answers from the server: how many
//! tokens a text costs, and how large the model's context window is. Both
//! are modelled as fallible-by-`None` queries so callers can substitute
//! deterministic fallbacks instead of aborting.
//!
//! Streaming generation is consumed by callers *after* a prompt has been
//! produced and is never invoked by the prompt layer itself.

use crate::error::ProviderError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Token accounting against the live model.
#[async_trait]
pub trait TokenOracle: Send + Sync {
    /// Token count for arbitrary text, or `None` if the server could not
    /// answer.
    async fn count_tokens(&self, text: &str) -> Option<u32>;

    /// The model's true maximum context size, or `None` on failure.
    async fn true_max_context_length(&self) -> Option<u32>;
}

/// A streaming generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// The fully assembled prompt
    pub prompt: String,

    /// Maximum tokens to generate
    pub max_length: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_p: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rep_pen: Option<f32>,

    /// Stop sequences
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop_sequences: Vec<String>,

    /// Strings the sampler must never emit
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub banned_strings: Vec<String>,
}

fn default_temperature() -> f32 {
    0.15
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>, max_length: u32) -> Self {
        Self {
            prompt: prompt.into(),
            max_length,
            temperature: default_temperature(),
            min_p: None,
            top_p: None,
            top_k: None,
            rep_pen: None,
            stop_sequences: Vec::new(),
            banned_strings: Vec::new(),
        }
    }
}

/// Receiver side of a token stream.
pub type TokenStream = mpsc::Receiver<Result<String, ProviderError>>;

/// Streaming text generation.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// A human-readable name for this backend (e.g., "koboldcpp").
    fn name(&self) -> &str;

    /// Start generating and return a stream of text fragments.
    async fn generate_stream(&self, request: GenerationRequest) -> Result<TokenStream, ProviderError>;

    /// Generate and collect the whole output.
    ///
    /// Default implementation drains `generate_stream()`.
    async fn generate(&self, request: GenerationRequest) -> Result<String, ProviderError> {
        let mut rx = self.generate_stream(request).await?;
        let mut out = String::new();
        while let Some(fragment) = rx.recv().await {
            out.push_str(&fragment?);
        }
        Ok(out)
    }

    /// Ask the backend to stop an in-flight generation.
    async fn abort(&self) -> Result<bool, ProviderError> {
        Ok(false)
    }
}
