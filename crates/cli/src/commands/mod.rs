//! Subcommand implementations and the plumbing they share.

pub mod build;
pub mod doctor;
pub mod eval;
pub mod fit;
pub mod generate;
pub mod idea;
pub mod onboard;

use std::io::Write;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use wannabe_config::AppConfig;
use wannabe_core::{GenerationRequest, Mode, ProjectFile, TextGenerator, TokenOracle};
use wannabe_prompt::{CompressionPolicy, PromptAssembler, PromptFitter};

pub(crate) fn load_config() -> Result<AppConfig, String> {
    AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))
}

pub(crate) fn load_project(path: &Path) -> Result<ProjectFile, String> {
    ProjectFile::load(path).map_err(|e| format!("Failed to load project: {e}"))
}

/// Output tokens to reserve when the user gave none.
pub(crate) fn default_max_output(config: &AppConfig, mode: &Mode) -> u32 {
    match mode {
        Mode::Idea => config.generation.max_length_idea,
        _ => config.generation.max_length_generate,
    }
}

/// A fitter wired to the configured policy, assembler and rating.
pub(crate) fn fitter<'a, O: TokenOracle + ?Sized>(
    config: &AppConfig,
    oracle: &'a O,
    cancel: CancellationToken,
) -> PromptFitter<'a, O> {
    PromptFitter::new(oracle, CompressionPolicy::from_config(&config.compression))
        .with_assembler(PromptAssembler::from_config(&config.prompt))
        .with_default_rating(config.prompt.default_rating)
        .with_cancellation(cancel)
}

/// Sampler settings from `[generation]`, plus any extra stop sequences.
pub(crate) fn generation_request(
    config: &AppConfig,
    prompt: String,
    max_length: u32,
    extra_stops: Vec<String>,
) -> GenerationRequest {
    let g = &config.generation;
    let mut request = GenerationRequest::new(prompt, max_length);
    request.temperature = g.temperature;
    request.min_p = Some(g.min_p);
    request.top_p = Some(g.top_p);
    request.top_k = Some(g.top_k);
    request.rep_pen = Some(g.rep_pen);
    request.stop_sequences = g.stop_sequences.iter().cloned().chain(extra_stops).collect();
    request.banned_strings = g.banned_tokens.clone();
    request
}

/// A token that is cancelled on Ctrl-C.
pub(crate) fn ctrl_c_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });
    token
}

/// Stream a generation to stdout and return the collected text.
///
/// Cancelling `cancel` asks the server to abort and keeps what arrived.
pub(crate) async fn stream_to_stdout<G: TextGenerator + ?Sized>(
    generator: &G,
    request: GenerationRequest,
    cancel: &CancellationToken,
) -> Result<String, Box<dyn std::error::Error>> {
    let mut rx = generator.generate_stream(request).await?;
    let mut stdout = std::io::stdout();
    let mut text = String::new();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                if let Err(e) = generator.abort().await {
                    warn!(error = %e, "Abort request failed");
                }
                eprintln!("\n  [aborted]");
                break;
            }
            next = rx.recv() => match next {
                Some(Ok(fragment)) => {
                    write!(stdout, "{fragment}")?;
                    stdout.flush()?;
                    text.push_str(&fragment);
                }
                Some(Err(e)) => return Err(e.into()),
                None => break,
            },
        }
    }

    writeln!(stdout)?;
    Ok(text)
}
