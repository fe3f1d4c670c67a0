//! `wannabe build`: print the prompt for a project file without touching
//! the server.

use std::path::PathBuf;
use wannabe_core::Mode;
use wannabe_prompt::{EvaluatedDocument, PromptAssembler, ThreadRngChooser};

pub async fn run(project: PathBuf, mode: String) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config()?;
    let project = super::load_project(&project)?;
    let mode = Mode::parse(&mode);

    let snapshot = EvaluatedDocument::evaluate(
        &project.to_document(),
        config.prompt.default_rating,
        &mut ThreadRngChooser,
    );
    let parts = PromptAssembler::from_config(&config.prompt).build_for_mode(&mode, &snapshot);

    eprintln!("  Task: {}", parts.task.as_str());
    if let Some(partition) = &parts.partition {
        eprintln!(
            "  Main: {} chars, tail: {} chars, sentence complete: {}",
            partition.main.chars().count(),
            partition.tail.chars().count(),
            partition.sentence_complete
        );
    }
    println!("{}", parts.render());

    Ok(())
}
