//! `wannabe fit`: fit a project's prompt into the server's context window.

use std::path::PathBuf;
use wannabe_core::Mode;
use wannabe_prompt::{CompressionQuality, QualityThresholds};
use wannabe_providers::KoboldClient;

pub async fn run(
    project: PathBuf,
    mode: String,
    max_output: Option<u32>,
    show_prompt: bool,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config()?;
    let project = super::load_project(&project)?;
    let mode = Mode::parse(&mode);
    let max_output = max_output.unwrap_or_else(|| super::default_max_output(&config, &mode));

    let client = KoboldClient::from_config(&config)?;
    let result = super::fitter(&config, &client, super::ctrl_c_token())
        .fit(&mode, &project.to_document(), max_output)
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    let quality = result.quality(&QualityThresholds::from_config(&config.compression));
    println!("  Task:      {}", result.task.as_str());
    println!(
        "  Tokens:    {} / {} available ({} reserved for output)",
        result.total_tokens, result.available_tokens, max_output
    );
    println!(
        "  Body:      {} → {} chars ({:.0}%)",
        result.original_body_chars,
        result.compressed_body_chars,
        result.ratio() * 100.0
    );
    match quality {
        CompressionQuality::Intact => println!("  Quality:   intact"),
        CompressionQuality::Compressed => println!("  Quality:   compressed"),
        CompressionQuality::Degraded => {
            println!("  Quality:   ⚠️  degraded, little of the body is left as context")
        }
    }
    if result.overflow {
        println!("  ❌ Prompt does not fit. Shorten the details or author's note.");
    }

    if show_prompt {
        println!("\n{}", result.prompt);
    }

    Ok(())
}
