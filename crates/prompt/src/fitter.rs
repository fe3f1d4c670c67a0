//! Context fitting.
//!
//! Shrinks the body of a document until the assembled prompt fits the
//! model's context window minus the tokens reserved for output.
//!
//! ```text
//! Initial → Measuring → Fits
//!              ↑    ↘
//!          Shrinking  Exhausted (body empty, still too long)
//! ```
//!
//! Only the oldest text is discarded: the body is trimmed from the left,
//! so the retained part is always an unaltered suffix of the original.
//! Oracle failures fall back to [`estimate_tokens`] and the configured
//! fallback context length, so a run always terminates with a result
//! unless it is cancelled.

use crate::assembler::{EvaluatedDocument, PromptAssembler, PromptParts, keep_last_chars};
use crate::template::ThreadRngChooser;
use crate::token::estimate_tokens;
use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;
use wannabe_config::{CompressionConfig, CompressionModeKind};
use wannabe_core::error::ProviderError;
use wannabe_core::{DocumentState, Mode, Rating, TaskType, TokenOracle};
use wannabe_providers::KoboldClient;

/// Context size assumed when the server cannot report one.
pub const DEFAULT_FALLBACK_CONTEXT_LENGTH: u32 = 8192;

/// Timeout for oracle queries made by [`fit_prompt_to_budget`].
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(10);

// ── Policy ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum CompressionMode {
    /// Trim `step_chars` characters at a time, re-counting after each step.
    TokenDynamic { step_chars: usize },
    /// Keep the last `max_chars` characters in one step, no token queries.
    CharTrim { max_chars: usize },
    /// Never trim.
    None,
}

impl Default for CompressionMode {
    fn default() -> Self {
        Self::TokenDynamic { step_chars: 100 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CompressionPolicy {
    pub mode: CompressionMode,
    pub fallback_context_length: u32,
}

impl Default for CompressionPolicy {
    fn default() -> Self {
        Self {
            mode: CompressionMode::default(),
            fallback_context_length: DEFAULT_FALLBACK_CONTEXT_LENGTH,
        }
    }
}

impl CompressionPolicy {
    pub fn new(mode: CompressionMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    pub fn from_config(config: &CompressionConfig) -> Self {
        let mode = match config.mode {
            CompressionModeKind::TokenDynamic => CompressionMode::TokenDynamic {
                step_chars: config.step_chars,
            },
            CompressionModeKind::CharTrim => CompressionMode::CharTrim {
                max_chars: config.max_body_chars,
            },
            CompressionModeKind::None => CompressionMode::None,
        };
        Self {
            mode,
            fallback_context_length: config.fallback_context_length,
        }
    }
}

/// When a compressed body is considered too short to write from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QualityThresholds {
    pub min_ratio: f32,
    pub min_chars: usize,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            min_ratio: 0.5,
            min_chars: 400,
        }
    }
}

impl QualityThresholds {
    pub fn from_config(config: &CompressionConfig) -> Self {
        Self {
            min_ratio: config.min_ratio,
            min_chars: config.min_chars,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressionQuality {
    /// Nothing was trimmed.
    Intact,
    /// Trimmed, but enough context remains.
    Compressed,
    /// Trimmed below the thresholds.
    Degraded,
}

// ── Result ────────────────────────────────────────────────────────────────

/// Outcome of one fitting run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompressionResult {
    pub prompt: String,
    pub total_tokens: u32,
    /// The prompt does not fit; generation must not be attempted.
    pub overflow: bool,
    pub original_body_chars: usize,
    pub compressed_body_chars: usize,
    pub available_tokens: u32,
    pub task: TaskType,
}

impl CompressionResult {
    /// Kept / original body characters. 1.0 for an empty body.
    pub fn ratio(&self) -> f32 {
        if self.original_body_chars == 0 {
            return 1.0;
        }
        self.compressed_body_chars as f32 / self.original_body_chars as f32
    }

    pub fn is_compressed(&self) -> bool {
        self.compressed_body_chars < self.original_body_chars
    }

    pub fn quality(&self, thresholds: &QualityThresholds) -> CompressionQuality {
        if !self.is_compressed() {
            CompressionQuality::Intact
        } else if self.ratio() < thresholds.min_ratio
            || self.compressed_body_chars < thresholds.min_chars
        {
            CompressionQuality::Degraded
        } else {
            CompressionQuality::Compressed
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FitError {
    #[error("Fitting run cancelled")]
    Cancelled,

    #[error("Inference server unusable: {0}")]
    Server(#[from] ProviderError),
}

/// Where a fitting run is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitPhase {
    Initial,
    Measuring,
    Shrinking,
    Fits,
    Exhausted,
}

struct FitRun {
    id: Uuid,
    phase: FitPhase,
}

impl FitRun {
    fn start() -> Self {
        Self {
            id: Uuid::new_v4(),
            phase: FitPhase::Initial,
        }
    }

    fn enter(&mut self, phase: FitPhase) {
        debug!(run_id = %self.id, from = ?self.phase, to = ?phase, "Fit phase");
        self.phase = phase;
    }
}

// ── Fitter ────────────────────────────────────────────────────────────────

/// Fits prompts against a [`TokenOracle`].
pub struct PromptFitter<'a, O: TokenOracle + ?Sized> {
    oracle: &'a O,
    assembler: PromptAssembler,
    policy: CompressionPolicy,
    default_rating: Rating,
    cancel: CancellationToken,
}

impl<'a, O: TokenOracle + ?Sized> PromptFitter<'a, O> {
    pub fn new(oracle: &'a O, policy: CompressionPolicy) -> Self {
        Self {
            oracle,
            assembler: PromptAssembler::default(),
            policy,
            default_rating: Rating::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_assembler(mut self, assembler: PromptAssembler) -> Self {
        self.assembler = assembler;
        self
    }

    pub fn with_default_rating(mut self, rating: Rating) -> Self {
        self.default_rating = rating;
        self
    }

    /// Abort the run when `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Snapshot and evaluate `doc`, then fit it.
    pub async fn fit(
        &self,
        mode: &Mode,
        doc: &DocumentState,
        max_output_tokens: u32,
    ) -> Result<CompressionResult, FitError> {
        let snapshot = EvaluatedDocument::evaluate(doc, self.default_rating, &mut ThreadRngChooser);
        self.fit_evaluated(mode, snapshot, max_output_tokens).await
    }

    /// Fit an already evaluated snapshot.
    pub async fn fit_evaluated(
        &self,
        mode: &Mode,
        snapshot: EvaluatedDocument,
        max_output_tokens: u32,
    ) -> Result<CompressionResult, FitError> {
        let mut run = FitRun::start();
        let original_body_chars = snapshot.body.chars().count();
        debug!(
            run_id = %run.id,
            mode = %mode,
            body_chars = original_body_chars,
            policy = ?self.policy.mode,
            "Fitting prompt"
        );

        let available = self.available_tokens(&run, max_output_tokens).await?;

        let result = match self.policy.mode {
            CompressionMode::TokenDynamic { step_chars } => {
                self.shrink_stepwise(&mut run, mode, snapshot, available, step_chars.max(1))
                    .await?
            }
            CompressionMode::CharTrim { max_chars } => {
                run.enter(FitPhase::Measuring);
                let body = keep_last_chars(&snapshot.body, max_chars).to_string();
                let mut working = snapshot.with_body(body);
                let parts = self.build_clamped(mode, &mut working);
                let prompt = parts.render();
                let total_tokens = estimate_tokens(&prompt);
                self.finish(&mut run, prompt, total_tokens, &working, parts.task, available)
            }
            CompressionMode::None => {
                run.enter(FitPhase::Measuring);
                let mut working = snapshot;
                let parts = self.build_clamped(mode, &mut working);
                let prompt = parts.render();
                let total_tokens = self.measure(&run, &prompt).await?;
                self.finish(&mut run, prompt, total_tokens, &working, parts.task, available)
            }
        };

        let result = CompressionResult {
            original_body_chars,
            ..result
        };

        info!(
            run_id = %run.id,
            task = %result.task,
            total_tokens = result.total_tokens,
            available = result.available_tokens,
            overflow = result.overflow,
            kept_chars = result.compressed_body_chars,
            original_chars = result.original_body_chars,
            "Fitting finished"
        );
        Ok(result)
    }

    async fn shrink_stepwise(
        &self,
        run: &mut FitRun,
        mode: &Mode,
        mut working: EvaluatedDocument,
        available: u32,
        step_chars: usize,
    ) -> Result<CompressionResult, FitError> {
        let mut last: Option<(String, u32)> = None;
        loop {
            run.enter(FitPhase::Measuring);
            let parts = self.build_clamped(mode, &mut working);
            let prompt = parts.render();
            let total_tokens = match &last {
                Some((previous, tokens)) if *previous == prompt => *tokens,
                _ => self.measure(run, &prompt).await?,
            };

            if total_tokens <= available || working.body.is_empty() {
                return Ok(self.finish(run, prompt, total_tokens, &working, parts.task, available));
            }

            run.enter(FitPhase::Shrinking);
            if self.cancel.is_cancelled() {
                return Err(FitError::Cancelled);
            }
            working.body = drop_first_chars(&working.body, step_chars).to_string();
            last = Some((prompt, total_tokens));
        }
    }

    /// Build the prompt, first dropping body text the assembler would cut
    /// anyway, so `working.body` is exactly what the prompt carries.
    fn build_clamped(&self, mode: &Mode, working: &mut EvaluatedDocument) -> PromptParts {
        loop {
            let parts = self.assembler.build_for_mode(mode, working);
            match parts.partition.as_ref().map(|p| p.start) {
                Some(start) if start > 0 => {
                    working.body = working.body[start..].to_string();
                }
                _ => return parts,
            }
        }
    }

    fn finish(
        &self,
        run: &mut FitRun,
        prompt: String,
        total_tokens: u32,
        working: &EvaluatedDocument,
        task: TaskType,
        available: u32,
    ) -> CompressionResult {
        let overflow = total_tokens > available;
        run.enter(if overflow {
            FitPhase::Exhausted
        } else {
            FitPhase::Fits
        });

        CompressionResult {
            prompt,
            total_tokens,
            overflow,
            original_body_chars: 0,
            compressed_body_chars: working.body.chars().count(),
            available_tokens: available,
            task,
        }
    }

    async fn available_tokens(&self, run: &FitRun, max_output_tokens: u32) -> Result<u32, FitError> {
        let context = self.guarded(self.oracle.true_max_context_length()).await?;
        let context = context.unwrap_or_else(|| {
            warn!(
                run_id = %run.id,
                fallback = self.policy.fallback_context_length,
                "Context length unavailable, using fallback"
            );
            self.policy.fallback_context_length
        });
        Ok(context.saturating_sub(max_output_tokens))
    }

    async fn measure(&self, run: &FitRun, prompt: &str) -> Result<u32, FitError> {
        let counted = self.guarded(self.oracle.count_tokens(prompt)).await?;
        Ok(counted.unwrap_or_else(|| {
            let estimate = estimate_tokens(prompt);
            warn!(run_id = %run.id, estimate, "Token count unavailable, using estimate");
            estimate
        }))
    }

    /// Race `fut` against cancellation, then re-check the token.
    async fn guarded<F: Future>(&self, fut: F) -> Result<F::Output, FitError> {
        let out = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(FitError::Cancelled),
            out = fut => out,
        };
        if self.cancel.is_cancelled() {
            return Err(FitError::Cancelled);
        }
        Ok(out)
    }
}

fn drop_first_chars(text: &str, n: usize) -> &str {
    match text.char_indices().nth(n) {
        Some((idx, _)) => &text[idx..],
        None => "",
    }
}

/// Fit `document` against the KoboldCpp server at `base_url`.
pub async fn fit_prompt_to_budget(
    base_url: &str,
    mode: &Mode,
    document: &DocumentState,
    policy: &CompressionPolicy,
    max_output_tokens: u32,
) -> Result<CompressionResult, FitError> {
    let client = KoboldClient::new(base_url, DEFAULT_QUERY_TIMEOUT)?;
    PromptFitter::new(&client, *policy)
        .fit(mode, document, max_output_tokens)
        .await
}
