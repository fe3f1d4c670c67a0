//! `wannabe idea`: brainstorm story details for a project.

use std::path::PathBuf;
use tracing::{info, warn};
use wannabe_core::{Mode, TokenOracle};
use wannabe_prompt::idea::{filter_output, parse_sections};
use wannabe_prompt::{
    EvaluatedDocument, IdeaMethod, IdeaTarget, PromptAssembler, ThreadRngChooser,
    build_idea_prompt, estimate_tokens, merge_sections,
};
use wannabe_providers::KoboldClient;

pub async fn run(
    project_path: PathBuf,
    target: String,
    method: String,
    apply: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config()?;
    let project = super::load_project(&project_path)?;
    let target: IdeaTarget = target.parse()?;
    let method: IdeaMethod = method.parse()?;

    let mut document = project.to_document();
    let snapshot =
        EvaluatedDocument::evaluate(&document, config.prompt.default_rating, &mut ThreadRngChooser);
    let idea = build_idea_prompt(
        &PromptAssembler::from_config(&config.prompt),
        &snapshot,
        target,
        method,
    );
    if !idea.missing.is_empty() {
        let names: Vec<_> = idea.missing.iter().map(|m| m.key()).collect();
        eprintln!("  ⚠️  Empty earlier details: {}", names.join(", "));
    }

    let client = KoboldClient::from_config(&config)?;
    let max_output = super::default_max_output(&config, &Mode::Idea);
    let tokens = match client.count_tokens(&idea.prompt).await {
        Some(n) => n,
        None => {
            warn!("Token count unavailable, using estimate");
            estimate_tokens(&idea.prompt)
        }
    };
    let context = client
        .true_max_context_length()
        .await
        .unwrap_or(config.compression.fallback_context_length);
    if tokens > context.saturating_sub(max_output) {
        return Err(format!(
            "Idea prompt needs {tokens} tokens but only {} are available.",
            context.saturating_sub(max_output)
        )
        .into());
    }

    info!(task = idea.task.as_str(), tokens, idea = ?target, "Brainstorming");
    let request =
        super::generation_request(&config, idea.prompt, max_output, idea.stop_sequences.clone());
    let cancel = super::ctrl_c_token();
    if !idea.prefill.is_empty() {
        print!("{}", idea.prefill);
    }
    let text = super::stream_to_stdout(&client, request, &cancel).await?;

    let answer = format!("{}{}", idea.prefill, text);
    let section = filter_output(&answer, target);
    if section.is_empty() {
        return Err("The model output has no section for the requested detail.".into());
    }

    if apply {
        let parsed = parse_sections(&section);
        merge_sections(&mut document.metadata, &parsed, target);
        let updated = wannabe_core::ProjectFile::from_document(&document, project.memo_text);
        updated.save(&project_path)?;
        eprintln!("  Updated {}", project_path.display());
    }

    Ok(())
}
