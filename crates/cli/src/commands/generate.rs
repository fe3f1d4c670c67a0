//! `wannabe generate`: fit the prompt, then stream a continuation.

use std::path::PathBuf;
use tracing::{info, warn};
use wannabe_core::Mode;
use wannabe_core::project::save_output_text;
use wannabe_prompt::{CompressionQuality, QualityThresholds};
use wannabe_providers::KoboldClient;

pub async fn run(
    project: PathBuf,
    max_output: Option<u32>,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config()?;
    let project = super::load_project(&project)?;
    let mode = Mode::Generate;
    let max_output = max_output.unwrap_or_else(|| super::default_max_output(&config, &mode));

    let client = KoboldClient::from_config(&config)?;
    let cancel = super::ctrl_c_token();
    let result = super::fitter(&config, &client, cancel.clone())
        .fit(&mode, &project.to_document(), max_output)
        .await?;

    if result.overflow {
        return Err(format!(
            "Prompt needs {} tokens but only {} are available. Shorten the details or author's note.",
            result.total_tokens, result.available_tokens
        )
        .into());
    }

    if result.quality(&QualityThresholds::from_config(&config.compression))
        == CompressionQuality::Degraded
    {
        warn!(
            kept = result.compressed_body_chars,
            original = result.original_body_chars,
            "Body heavily trimmed to fit; continuation may lose context"
        );
    }

    info!(
        task = result.task.as_str(),
        tokens = result.total_tokens,
        max_output,
        "Generating"
    );
    let request = super::generation_request(&config, result.prompt, max_output, Vec::new());
    let text = super::stream_to_stdout(&client, request, &cancel).await?;

    if let Some(path) = output {
        let title = project.details.title.trim();
        save_output_text(&path, &text, (!title.is_empty()).then_some(title))?;
        eprintln!("  Saved to {}", path.display());
    }

    Ok(())
}
